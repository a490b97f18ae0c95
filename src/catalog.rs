//! Collaborator tables loaded from TOML documents.
//!
//! The instruction map resolves abstract core opcodes to concrete
//! byte opcodes; the trigger and command catalogs describe the
//! invocation contexts and engine commands scripts may use. All
//! three must be loaded before the driver is built; a hole in any of
//! them is a programmer error, not a user diagnostic.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use smol_str::SmolStr;
use thiserror::Error;

use crate::codegen::ir::CoreOpcode;
use crate::semantic::symbol_table::CommandSymbol;
use crate::syntax::{PrimitiveType, TypeTuple};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed catalog document: {0}")]
    Malformed(#[from] toml::de::Error),
    #[error("instruction map names unknown core opcode '{0}'")]
    UnknownOpcode(String),
    #[error("instruction map is missing core opcode '{0}'")]
    MissingOpcode(&'static str),
    #[error("core opcode '{0}' is not large but its concrete opcode {1} exceeds 255")]
    SmallOpcodeTooWide(&'static str, u16),
}

// =============================================================================
// Instruction map
// =============================================================================

/// Concrete encoding of one core opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Encoding {
    pub opcode: u16,
    /// Selects a 32-bit immediate (and a two-byte opcode) instead of
    /// the one-byte forms.
    #[serde(default)]
    pub large: bool,
}

/// Maps every [`CoreOpcode`] to its concrete encoding.
#[derive(Debug, Clone)]
pub struct InstructionMap {
    entries: FxHashMap<CoreOpcode, Encoding>,
}

impl InstructionMap {
    /// Parse and validate a map document. Entries are keyed by the
    /// core opcode's snake_case name:
    ///
    /// ```toml
    /// push_int_constant = { opcode = 0, large = true }
    /// return = { opcode = 21 }
    /// ```
    pub fn from_toml_str(document: &str) -> Result<Self, CatalogError> {
        let raw: FxHashMap<String, Encoding> = toml::from_str(document)?;
        let mut entries = FxHashMap::default();
        for (name, encoding) in raw {
            let op = CoreOpcode::from_name(&name)
                .ok_or_else(|| CatalogError::UnknownOpcode(name.clone()))?;
            entries.insert(op, encoding);
        }
        let map = Self { entries };
        map.validate()?;
        Ok(map)
    }

    /// Every core opcode must be mapped, and small encodings must fit
    /// in one byte.
    fn validate(&self) -> Result<(), CatalogError> {
        for op in CoreOpcode::ALL {
            match self.entries.get(&op) {
                None => return Err(CatalogError::MissingOpcode(op.name())),
                Some(encoding) if !encoding.large && encoding.opcode > 255 => {
                    return Err(CatalogError::SmallOpcodeTooWide(op.name(), encoding.opcode));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn get(&self, op: CoreOpcode) -> Encoding {
        // validate() ran at construction; every opcode is present.
        self.entries[&op]
    }
}

// =============================================================================
// Trigger catalog
// =============================================================================

/// One invocation context for scripts.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerDef {
    pub name: String,
    #[serde(default)]
    pub sigil: Option<String>,
    #[serde(default)]
    pub opcode: Option<i32>,
    #[serde(default)]
    pub support_arguments: bool,
    #[serde(default)]
    pub support_returns: bool,
    /// Fixed argument types, when the trigger dictates them.
    #[serde(default)]
    pub arguments: Option<Vec<PrimitiveType>>,
    /// Fixed return types, when the trigger dictates them.
    #[serde(default)]
    pub returns: Option<Vec<PrimitiveType>>,
}

#[derive(Debug, Deserialize)]
struct TriggerCatalogFile {
    #[serde(rename = "trigger", default)]
    triggers: Vec<TriggerDef>,
}

#[derive(Debug, Clone, Default)]
pub struct TriggerCatalog {
    triggers: FxHashMap<SmolStr, TriggerDef>,
}

impl TriggerCatalog {
    /// Parse a catalog of `[[trigger]]` entries.
    pub fn from_toml_str(document: &str) -> Result<Self, CatalogError> {
        let file: TriggerCatalogFile = toml::from_str(document)?;
        let mut triggers = FxHashMap::default();
        for trigger in file.triggers {
            triggers.insert(SmolStr::new(&trigger.name), trigger);
        }
        Ok(Self { triggers })
    }

    pub fn get(&self, name: &str) -> Option<&TriggerDef> {
        self.triggers.get(name)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

// =============================================================================
// Command catalog
// =============================================================================

/// One engine command.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandDef {
    pub name: String,
    pub opcode: u16,
    /// Return types; the catalog calls this `type`.
    #[serde(rename = "type", default)]
    pub returns: Vec<PrimitiveType>,
    #[serde(default)]
    pub arguments: Vec<PrimitiveType>,
    /// Whether a `.name(..)` alternative form exists.
    #[serde(default)]
    pub alternative: bool,
    #[serde(default)]
    pub hook: bool,
    /// Transmit-list type for hook commands.
    #[serde(default)]
    pub transmits: Option<PrimitiveType>,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandCatalogFile {
    #[serde(rename = "command", default)]
    commands: Vec<CommandDef>,
}

#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    commands: Vec<CommandDef>,
}

impl CommandCatalog {
    /// Parse a catalog of `[[command]]` entries.
    pub fn from_toml_str(document: &str) -> Result<Self, CatalogError> {
        let file: CommandCatalogFile = toml::from_str(document)?;
        Ok(Self {
            commands: file.commands,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDef> {
        self.commands.iter()
    }

    /// Build the command symbols the driver seeds its root table with.
    pub fn symbols(&self) -> Vec<CommandSymbol> {
        self.commands
            .iter()
            .map(|def| CommandSymbol {
                name: SmolStr::new(&def.name),
                opcode: def.opcode,
                arguments: def.arguments.clone(),
                returns: def.returns.iter().copied().collect::<TypeTuple>(),
                is_hook: def.hook,
                hook_transmit: def.transmits,
                alternative: def.alternative,
                tag: def.tag.as_deref().map(SmolStr::new),
            })
            .collect()
    }
}
