//! Shared fixtures: a fully-wired compiler with catalogs, an obj
//! binding, and an in-memory id provider.

use std::sync::Arc;

use hearthscript::binding::{Binding, ConfigGroup, PropertyDescriptor, PropertyKind, PropertyRule};
use hearthscript::catalog::{CommandCatalog, InstructionMap, TriggerCatalog};
use hearthscript::codegen::CoreOpcode;
use hearthscript::idgen::{IdProvider, MemoryIdProvider};
use hearthscript::syntax::PrimitiveType;
use hearthscript::{Compiler, SourceFile};
use smol_str::SmolStr;

pub fn instruction_map() -> InstructionMap {
    let document: String = CoreOpcode::ALL
        .iter()
        .enumerate()
        .map(|(i, op)| {
            let large = matches!(
                op,
                CoreOpcode::PushIntConstant
                    | CoreOpcode::PushLongConstant
                    | CoreOpcode::PushStringConstant
                    | CoreOpcode::GosubWithParams
                    | CoreOpcode::Branch
                    | CoreOpcode::BranchIfTrue
                    | CoreOpcode::BranchEquals
                    | CoreOpcode::BranchLessThan
                    | CoreOpcode::BranchGreaterThan
                    | CoreOpcode::BranchLessThanOrEquals
                    | CoreOpcode::BranchGreaterThanOrEquals
            );
            format!("{} = {{ opcode = {}, large = {} }}\n", op.name(), i, large)
        })
        .collect();
    InstructionMap::from_toml_str(&document).expect("instruction map")
}

pub fn triggers() -> TriggerCatalog {
    TriggerCatalog::from_toml_str(
        r#"
        [[trigger]]
        name = "proc"
        support_arguments = true
        support_returns = true

        [[trigger]]
        name = "clientscript"
        support_arguments = true
        support_returns = false
        "#,
    )
    .expect("trigger catalog")
}

pub fn commands() -> CommandCatalog {
    CommandCatalog::from_toml_str(
        r#"
        [[command]]
        name = "mes"
        opcode = 1000
        arguments = ["string"]

        [[command]]
        name = "stat_level"
        opcode = 1001
        type = ["int"]
        arguments = ["stat"]
        alternative = true
        "#,
    )
    .expect("command catalog")
}

pub fn obj_binding() -> Binding {
    Binding::new(ConfigGroup::new("obj"))
        .define(
            "name",
            PropertyDescriptor::new(PropertyKind::Basic {
                opcode: 0x01,
                components: vec![PrimitiveType::String],
            }),
        )
        .define(
            "cost",
            PropertyDescriptor::new(PropertyKind::Basic {
                opcode: 0x02,
                components: vec![PrimitiveType::Int],
            })
            .with_rule(PropertyRule::Range {
                lo: 0,
                hi: 1_000_000,
            }),
        )
        .define(
            "members",
            PropertyDescriptor::new(PropertyKind::Basic {
                opcode: 0x0a,
                components: vec![PrimitiveType::Boolean],
            })
            .with_rule(PropertyRule::EmitEmptyIfTrue),
        )
        .define("type", PropertyDescriptor::new(PropertyKind::TypeName))
        .define(
            "val",
            PropertyDescriptor::new(PropertyKind::TypeDispatched {
                int_opcode: 0x12,
                long_opcode: 0x13,
                type_property: SmolStr::new("type"),
            }),
        )
}

/// A compiler wired with the standard fixtures.
pub fn compiler() -> (Compiler, Arc<MemoryIdProvider>) {
    compiler_with_override(false)
}

pub fn compiler_with_override(allow_override: bool) -> (Compiler, Arc<MemoryIdProvider>) {
    let ids = Arc::new(MemoryIdProvider::new());
    let provider: Arc<dyn IdProvider> = ids.clone();
    let mut compiler = Compiler::new(
        instruction_map(),
        triggers(),
        &commands(),
        provider,
        allow_override,
    );
    compiler
        .register_binding("obj", obj_binding())
        .expect("binding");
    (compiler, ids)
}

pub fn script_file(path: &str, source: &str) -> SourceFile {
    SourceFile::new(path, "hsc", source.as_bytes().to_vec())
}

pub fn config_file(path: &str, source: &str) -> SourceFile {
    SourceFile::new(path, "obj", source.as_bytes().to_vec())
}
