//! End-to-end driver scenarios: batches in, artifacts and
//! diagnostics out.

mod helpers;

use hearthscript::codegen::{BinaryProperty, CoreOpcode, PropertyValue};
use hearthscript::diagnostics::DiagnosticKind;
use hearthscript::driver::BinaryUnit;
use hearthscript::Input;
use pretty_assertions::assert_eq;

use helpers::{compiler, compiler_with_override, config_file, script_file};

#[test]
fn test_hello_world_script() {
    let (compiler, _) = compiler();
    let output = compiler
        .compile(Input::emit(vec![script_file(
            "hello.hsc",
            r#"[proc,hello](string $s) return("hi");"#,
        )]))
        .expect("compile");

    let file = output.file("hello.hsc").expect("file");
    assert!(!file.erroneous, "diagnostics: {:?}", file.errors);
    assert_eq!(file.units.len(), 1);
    let unit = &file.units[0];
    assert_eq!(unit.name, "[proc,hello]");

    let Some(BinaryUnit::Script(script)) = &unit.binary else {
        panic!("expected a script binary");
    };
    assert_eq!(script.blocks.len(), 1);
    let ops: Vec<_> = script.instructions().map(|i| i.op).collect();
    assert_eq!(
        ops,
        vec![
            hearthscript::codegen::ir::Op::Core(CoreOpcode::PushStringConstant),
            hearthscript::codegen::ir::Op::Core(CoreOpcode::Return),
        ]
    );
    assert!(unit.encoded.is_some());
}

#[test]
fn test_if_else_lowering_through_pipeline() {
    let (compiler, _) = compiler();
    let output = compiler
        .compile(Input::emit(vec![script_file(
            "p.hsc",
            "[proc,p](int $x)(int) if ($x < 3) { return(1); } else { return(2); }",
        )]))
        .expect("compile");

    let file = output.file("p.hsc").expect("file");
    assert!(!file.erroneous, "diagnostics: {:?}", file.errors);
    let Some(BinaryUnit::Script(script)) = &file.units[0].binary else {
        panic!("expected a script binary");
    };
    // entry + both arms; the unreachable join block is gone
    assert_eq!(script.blocks.len(), 3);
    let entry = &script.blocks[0];
    let tail: Vec<_> = entry
        .instructions
        .iter()
        .rev()
        .take(2)
        .map(|i| i.op)
        .collect();
    assert_eq!(
        tail,
        vec![
            hearthscript::codegen::ir::Op::Core(CoreOpcode::Branch),
            hearthscript::codegen::ir::Op::Core(CoreOpcode::BranchLessThan),
        ]
    );
}

#[test]
fn test_config_emit_empty_rule() {
    let (compiler1, _) = compiler();
    let output = compiler1
        .compile(Input::emit(vec![config_file(
            "a.obj",
            "[obj_a]\nmembers=yes\n",
        )]))
        .expect("compile");
    let unit = &output.file("a.obj").expect("file").units[0];
    // opcode byte with an empty payload, then the terminator
    assert_eq!(unit.encoded.as_deref(), Some(&[0x0a, 0x00][..]));

    let (compiler2, _) = compiler();
    let output = compiler2
        .compile(Input::emit(vec![config_file(
            "b.obj",
            "[obj_b]\nmembers=no\n",
        )]))
        .expect("compile");
    let unit = &output.file("b.obj").expect("file").units[0];
    // property omitted entirely
    assert_eq!(unit.encoded.as_deref(), Some(&[0x00][..]));
}

#[test]
fn test_type_dispatched_property() {
    let (compiler, _) = compiler();
    let output = compiler
        .compile(Input::emit(vec![config_file(
            "v.obj",
            "[obj_v]\ntype=long\nval=99\n",
        )]))
        .expect("compile");
    let file = output.file("v.obj").expect("file");
    assert!(!file.erroneous, "diagnostics: {:?}", file.errors);
    let Some(BinaryUnit::Config(config)) = &file.units[0].binary else {
        panic!("expected a config binary");
    };
    assert_eq!(
        config.properties,
        vec![BinaryProperty::Basic {
            opcode: 0x13,
            values: vec![PropertyValue::Long(99)],
        }]
    );
}

#[test]
fn test_duplicate_script_across_files() {
    let (compiler, _) = compiler();
    let output = compiler
        .compile(Input::emit(vec![
            script_file("first.hsc", "[proc,same] return;"),
            script_file("second.hsc", "[proc,same] return;"),
        ]))
        .expect("compile");

    let first = output.file("first.hsc").expect("first");
    assert!(!first.erroneous, "diagnostics: {:?}", first.errors);
    assert!(first.units[0].encoded.is_some());

    let second = output.file("second.hsc").expect("second");
    assert!(second.erroneous);
    assert!(second
        .errors
        .iter()
        .any(|d| d.kind == DiagnosticKind::DuplicateDeclaration));
    assert!(second.units[0].encoded.is_none());
}

#[test]
fn test_duplicate_script_with_override_allowed() {
    let (compiler, _) = compiler_with_override(true);
    let output = compiler
        .compile(Input::emit(vec![
            script_file("first.hsc", "[proc,same] return;"),
            script_file("second.hsc", "[proc,same] return;"),
        ]))
        .expect("compile");
    assert!(output.is_clean());
}

#[test]
fn test_forward_reference_across_files() {
    let (compiler, _) = compiler();
    let output = compiler
        .compile(Input::emit(vec![
            script_file("a.hsc", "[proc,a] ~b();"),
            script_file("b.hsc", "[proc,b] return;"),
        ]))
        .expect("compile");
    assert!(output.is_clean(), "errors: {:?}", output.errors().collect::<Vec<_>>());
    assert!(output.file("a.hsc").expect("a").units[0].encoded.is_some());
}

#[test]
fn test_clean_batch_has_artifacts_everywhere() {
    let (compiler, _) = compiler();
    let output = compiler
        .compile(Input::emit(vec![
            script_file("s.hsc", "[proc,s](int $x)(int) return($x);"),
            config_file("c.obj", "[obj_c]\nname=\"Candle\"\ncost=5\n"),
        ]))
        .expect("compile");
    assert!(output.is_clean());
    assert_eq!(output.errors().count(), 0);
    for file in output.compiled_files.values() {
        for unit in &file.units {
            assert!(unit.binary.is_some());
            assert!(unit.encoded.is_some());
        }
    }
}

#[test]
fn test_analyze_only_produces_no_artifacts() {
    let (compiler, ids) = compiler();
    let output = compiler
        .compile(Input::analyze(vec![script_file(
            "s.hsc",
            "[proc,s] return;",
        )]))
        .expect("compile");
    assert!(output.is_clean());
    let unit = &output.file("s.hsc").expect("file").units[0];
    assert!(unit.binary.is_none());
    assert!(unit.encoded.is_none());
    // no id generation either
    use hearthscript::binding::ConfigGroup;
    use hearthscript::idgen::IdProvider;
    assert_eq!(ids.find(&ConfigGroup::new("script"), "[proc,s]"), None);
}

#[test]
fn test_id_generation_covers_erroneous_files() {
    let (compiler, ids) = compiler();
    let output = compiler
        .compile(Input::emit(vec![
            // references an unknown command, so it cannot compile
            script_file("bad.hsc", "[proc,broken] widgets();"),
        ]))
        .expect("compile");
    let file = output.file("bad.hsc").expect("file");
    assert!(file.erroneous);
    assert!(file.units[0].encoded.is_none());
    // the name was still interned; clean files may reference it
    use hearthscript::binding::ConfigGroup;
    use hearthscript::idgen::IdProvider;
    assert!(ids.find(&ConfigGroup::new("script"), "[proc,broken]").is_some());
}

#[test]
fn test_empty_script_body_emits_single_return() {
    let (compiler, _) = compiler();
    let output = compiler
        .compile(Input::emit(vec![script_file("e.hsc", "[proc,empty]")]))
        .expect("compile");
    let Some(BinaryUnit::Script(script)) =
        &output.file("e.hsc").expect("file").units[0].binary
    else {
        panic!("expected a script binary");
    };
    assert_eq!(script.instructions().count(), 1);
}

#[test]
fn test_missing_binding_is_hard_failure() {
    let (compiler, _) = compiler();
    let result = compiler.compile(Input::emit(vec![hearthscript::SourceFile::new(
        "x.npc",
        "npc",
        b"[npc_x]\nname=\"X\"\n".to_vec(),
    )]));
    assert!(matches!(
        result,
        Err(hearthscript::CompilerError::MissingBinding(_))
    ));
}

#[test]
fn test_duplicate_binding_registration_fails() {
    let (mut compiler, _) = compiler();
    let result = compiler.register_binding("obj", helpers::obj_binding());
    assert!(matches!(
        result,
        Err(hearthscript::CompilerError::DuplicateBinding(_))
    ));
}

#[test]
fn test_diagnostics_carry_ranges() {
    let (compiler, _) = compiler();
    let source = "[proc,x] $oops = 1;";
    let output = compiler
        .compile(Input::analyze(vec![script_file("x.hsc", source)]))
        .expect("compile");
    let file = output.file("x.hsc").expect("file");
    assert!(file.erroneous);
    let diagnostic = &file.errors[0];
    let index = hearthscript::LineIndex::new(source);
    let span = index.span(diagnostic.range);
    assert_eq!(span.start.line, 1);
    assert!(span.start.col > 1);
}
