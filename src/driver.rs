//! The compilation driver.
//!
//! Sequences a batch: per-file lex/parse, batch-wide semantic
//! pre-pass and main pass, optional id generation, optional code
//! generation. User-code problems come back as diagnostics attached
//! to their file; only internal invariant violations (a missing
//! binding, an unmapped opcode, an unresolved id) abort the batch as
//! [`CompilerError`].

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::binding::Binding;
use crate::catalog::{CatalogError, CommandCatalog, InstructionMap, TriggerCatalog};
use crate::codegen::{
    BinaryConfig, BinaryScript, BytecodeWriter, Optimizer, generate_config, generate_script,
    write_config,
};
use crate::diagnostics::{Diagnostic, Reporter};
use crate::idgen::IdProvider;
use crate::lexer::LexicalTable;
use crate::parser::{parse_config_file, parse_script_file};
use crate::semantic::symbol_table::{
    ConfigSymbol, ConstantSymbol, GraphicSymbol, ScriptName, ScriptSymbol, SymbolTable,
};
use crate::semantic::{ConfigChecker, ScriptChecker, declare_config, declare_script};
use crate::syntax::config::ConfigNode;
use crate::syntax::script::ScriptNode;

/// File extension of the script dialect; every other extension must
/// have a registered binding.
pub const SCRIPT_EXTENSION: &str = "hsc";

/// Hard failures: programmer errors surfaced to the driver's caller.
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("no binding registered for extension '{0}'")]
    MissingBinding(String),
    #[error("a binding for extension '{0}' is already registered")]
    DuplicateBinding(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("no id interned for {group}:{name}")]
    UnresolvedSymbolId { group: String, name: String },
    #[error("branch to unknown label while writing '{script}'")]
    UnresolvedLabel { script: String },
    #[error("malformed binary config: {0}")]
    MalformedConfig(String),
}

/// One source document handed to [`Compiler::compile`].
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub extension: SmolStr,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, extension: impl Into<SmolStr>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            extension: extension.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Input {
    pub source_files: Vec<SourceFile>,
    /// Intern a numeric id for every declared name, including names
    /// from erroneous files (they may be referenced elsewhere).
    pub run_id_generation: bool,
    /// Produce binary artifacts for non-erroneous units.
    pub run_code_generation: bool,
}

impl Input {
    /// Analyze-only input: no ids, no artifacts.
    pub fn analyze(source_files: Vec<SourceFile>) -> Self {
        Self {
            source_files,
            run_id_generation: false,
            run_code_generation: false,
        }
    }

    /// Emit-artifacts input: ids and binaries.
    pub fn emit(source_files: Vec<SourceFile>) -> Self {
        Self {
            source_files,
            run_id_generation: true,
            run_code_generation: true,
        }
    }
}

/// A produced binary artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryUnit {
    Script(BinaryScript),
    Config(BinaryConfig),
}

/// One declared script or config record out of a compiled file.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub name: SmolStr,
    /// The binary form; absent in analyze-only mode or for erroneous
    /// files.
    pub binary: Option<BinaryUnit>,
    /// The serialized on-disk bytes, when code generation ran.
    pub encoded: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct CompiledFile {
    pub units: Vec<CompiledUnit>,
    pub errors: Vec<Diagnostic>,
    pub erroneous: bool,
    pub extension: SmolStr,
}

#[derive(Debug, Default)]
pub struct Output {
    /// Per source file, in input order.
    pub compiled_files: IndexMap<String, CompiledFile>,
}

impl Output {
    pub fn file(&self, path: &str) -> Option<&CompiledFile> {
        self.compiled_files.get(path)
    }

    /// All diagnostics across the batch, in discovery order.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.compiled_files.values().flat_map(|f| f.errors.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.compiled_files.values().all(|f| !f.erroneous)
    }
}

enum ParsedUnit {
    Script(ScriptNode),
    Config(ConfigNode),
}

struct FileState {
    path: String,
    extension: SmolStr,
    units: Vec<ParsedUnit>,
    diagnostics: Vec<Diagnostic>,
}

/// The compiler: catalogs, bindings, a seeded root symbol table, and
/// the id provider collaborator.
pub struct Compiler {
    root: SymbolTable,
    instruction_map: InstructionMap,
    triggers: TriggerCatalog,
    bindings: FxHashMap<SmolStr, Binding>,
    id_provider: Arc<dyn IdProvider>,
    allow_override: bool,
    script_table: LexicalTable,
    config_table: LexicalTable,
}

impl Compiler {
    /// Build a driver. The instruction map was validated when it was
    /// loaded, so every core opcode is mapped before any
    /// code-generation work is accepted.
    pub fn new(
        instruction_map: InstructionMap,
        triggers: TriggerCatalog,
        commands: &CommandCatalog,
        id_provider: Arc<dyn IdProvider>,
        allow_override: bool,
    ) -> Self {
        let mut root = SymbolTable::new();
        for symbol in commands.symbols() {
            root.declare_command(symbol, true);
        }
        Self {
            root,
            instruction_map,
            triggers,
            bindings: FxHashMap::default(),
            id_provider,
            allow_override,
            script_table: LexicalTable::script(),
            config_table: LexicalTable::config(),
        }
    }

    /// Register a config-dialect schema for a file extension.
    pub fn register_binding(
        &mut self,
        extension: &str,
        binding: Binding,
    ) -> Result<(), CompilerError> {
        let key = SmolStr::new(extension);
        if self.bindings.contains_key(&key) {
            return Err(CompilerError::DuplicateBinding(extension.to_string()));
        }
        self.bindings.insert(key, binding);
        Ok(())
    }

    /// Seed the root table with a host-provided constant.
    pub fn register_constant(&mut self, symbol: ConstantSymbol) {
        self.root.declare_constant(symbol, true);
    }

    /// Seed the root table with a named graphic resource.
    pub fn register_graphic(&mut self, name: &str, id: i32) {
        self.root.declare_graphic(
            GraphicSymbol {
                name: SmolStr::new(name),
                id,
            },
            true,
        );
    }

    /// Seed the root table with an engine script (predefined id).
    pub fn register_script(&mut self, symbol: ScriptSymbol) {
        self.root.declare_script(symbol, true);
    }

    /// Seed the root table with an engine-declared config record,
    /// e.g. player variables scripts reference by sigil.
    pub fn register_config(&mut self, symbol: ConfigSymbol) {
        let group = symbol.group.clone();
        let name = symbol.name.clone();
        self.root.declare_config(symbol, true);
        self.id_provider.find_or_create(&group, &name);
    }

    pub fn compile(&self, input: Input) -> Result<Output, CompilerError> {
        let _span =
            tracing::debug_span!("compile", files = input.source_files.len()).entered();

        let root = Arc::new(self.root.clone());
        let mut batch = SymbolTable::child(root);

        // Lex and parse every file; keep going through bad files.
        let mut files = Vec::with_capacity(input.source_files.len());
        for source in &input.source_files {
            files.push(self.parse_file(source)?);
        }

        // Pre-pass: declare every unit so forward references resolve.
        for file in &mut files {
            let mut reporter = Reporter::new();
            for unit in &file.units {
                match unit {
                    ParsedUnit::Script(node) => {
                        declare_script(node, &mut batch, self.allow_override, &mut reporter);
                    }
                    ParsedUnit::Config(node) => {
                        let binding = self.binding_for(&file.extension)?;
                        declare_config(
                            node,
                            binding,
                            &mut batch,
                            self.allow_override,
                            &mut reporter,
                        );
                    }
                }
            }
            file.diagnostics.extend(reporter.take());
        }

        // Main pass: resolve and type-check against the batch table.
        for file in &mut files {
            let mut reporter = Reporter::new();
            for unit in &file.units {
                match unit {
                    ParsedUnit::Script(node) => {
                        ScriptChecker::new(&batch, &self.triggers).check(node, &mut reporter);
                    }
                    ParsedUnit::Config(node) => {
                        let binding = self.binding_for(&file.extension)?;
                        ConfigChecker::new(&batch, binding).check(node, &mut reporter);
                    }
                }
            }
            file.diagnostics.extend(reporter.take());
        }

        // Id generation covers erroneous files too: their names may
        // be referenced from clean ones.
        if input.run_id_generation {
            for file in &files {
                for unit in &file.units {
                    match unit {
                        ParsedUnit::Script(node) => {
                            let name = ScriptName::new(
                                node.trigger.name.clone(),
                                node.name.name.clone(),
                            );
                            let predefined = batch
                                .lookup_script(&name)
                                .and_then(|symbol| symbol.predefined_id);
                            if predefined.is_none() {
                                self.id_provider
                                    .find_or_create(&crate::binding::ConfigGroup::new("script"), &name.full());
                            }
                        }
                        ParsedUnit::Config(node) => {
                            let binding = self.binding_for(&file.extension)?;
                            self.id_provider
                                .find_or_create(&binding.group, &node.name.name);
                        }
                    }
                }
            }
        }

        // Code generation for clean files only.
        let mut output = Output::default();
        for file in files {
            let erroneous = file.diagnostics.iter().any(|d| d.severity.is_error());
            let mut units = Vec::with_capacity(file.units.len());
            for unit in &file.units {
                let compiled = match unit {
                    ParsedUnit::Script(node) => {
                        let name =
                            ScriptName::new(node.trigger.name.clone(), node.name.name.clone());
                        let mut compiled = CompiledUnit {
                            name: name.full(),
                            binary: None,
                            encoded: None,
                        };
                        if input.run_code_generation && !erroneous {
                            let mut binary =
                                generate_script(node, &file.path, &file.extension, &batch);
                            Optimizer::new().run(&mut binary);
                            let encoded =
                                BytecodeWriter::new(&self.instruction_map, self.id_provider.as_ref())
                                    .write(&binary)?;
                            compiled.binary = Some(BinaryUnit::Script(binary));
                            compiled.encoded = Some(encoded);
                        }
                        compiled
                    }
                    ParsedUnit::Config(node) => {
                        let mut compiled = CompiledUnit {
                            name: node.name.name.clone(),
                            binary: None,
                            encoded: None,
                        };
                        if input.run_code_generation && !erroneous {
                            let binding = self.binding_for(&file.extension)?;
                            let binary = generate_config(
                                node,
                                binding,
                                &batch,
                                self.id_provider.as_ref(),
                            )?;
                            compiled.encoded = Some(write_config(&binary));
                            compiled.binary = Some(BinaryUnit::Config(binary));
                        }
                        compiled
                    }
                };
                units.push(compiled);
            }
            output.compiled_files.insert(
                file.path,
                CompiledFile {
                    units,
                    errors: file.diagnostics,
                    erroneous,
                    extension: file.extension,
                },
            );
        }
        Ok(output)
    }

    fn binding_for(&self, extension: &SmolStr) -> Result<&Binding, CompilerError> {
        self.bindings
            .get(extension)
            .ok_or_else(|| CompilerError::MissingBinding(extension.to_string()))
    }

    fn parse_file(&self, source: &SourceFile) -> Result<FileState, CompilerError> {
        let text = String::from_utf8_lossy(&source.bytes);
        tracing::debug!(path = %source.path, extension = %source.extension, "parse file");
        if source.extension == SCRIPT_EXTENSION {
            let parse = parse_script_file(&text, &self.script_table);
            Ok(FileState {
                path: source.path.clone(),
                extension: source.extension.clone(),
                units: parse
                    .value
                    .scripts
                    .into_iter()
                    .map(ParsedUnit::Script)
                    .collect(),
                diagnostics: parse.diagnostics,
            })
        } else {
            // A config extension without a binding is a programmer
            // error, checked before any parsing work happens.
            self.binding_for(&source.extension)?;
            let parse = parse_config_file(&text, &self.config_table);
            Ok(FileState {
                path: source.path.clone(),
                extension: source.extension.clone(),
                units: parse
                    .value
                    .configs
                    .into_iter()
                    .map(ParsedUnit::Config)
                    .collect(),
                diagnostics: parse.diagnostics,
            })
        }
    }
}
