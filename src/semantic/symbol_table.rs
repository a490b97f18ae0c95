//! Hierarchical symbol table.
//!
//! A table is a persistent chain: an immutable `Arc` parent plus
//! mutable maps in the child. Lookup consults the child first, then
//! walks parents. The driver's root table is seeded once; each batch
//! compiles into a fresh child, so a failed batch leaves the root
//! pristine.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::binding::ConfigGroup;
use crate::syntax::{PrimitiveType, TypeTuple};

/// A script's full name: `[trigger,name]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptName {
    pub trigger: SmolStr,
    pub name: SmolStr,
}

impl ScriptName {
    pub fn new(trigger: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            trigger: trigger.into(),
            name: name.into(),
        }
    }

    pub fn full(&self) -> SmolStr {
        SmolStr::new(format!("[{},{}]", self.trigger, self.name))
    }
}

impl std::fmt::Display for ScriptName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.trigger, self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptSymbol {
    pub name: ScriptName,
    pub parameters: Vec<PrimitiveType>,
    pub returns: TypeTuple,
    /// Engine-assigned id for root-seeded scripts; batch scripts are
    /// interned through the id provider instead.
    pub predefined_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandSymbol {
    pub name: SmolStr,
    pub opcode: u16,
    pub arguments: Vec<PrimitiveType>,
    pub returns: TypeTuple,
    pub is_hook: bool,
    pub hook_transmit: Option<PrimitiveType>,
    /// Whether the command has a `.name(..)` alternative form.
    pub alternative: bool,
    pub tag: Option<SmolStr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Boolean(bool),
    String(SmolStr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantSymbol {
    pub name: SmolStr,
    pub ty: PrimitiveType,
    pub value: ConstantValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSymbol {
    pub group: ConfigGroup,
    pub name: SmolStr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicSymbol {
    pub name: SmolStr,
    pub id: i32,
}

/// One scope in the chain.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    parent: Option<Arc<SymbolTable>>,
    scripts: FxHashMap<ScriptName, ScriptSymbol>,
    commands: FxHashMap<SmolStr, CommandSymbol>,
    constants: FxHashMap<SmolStr, ConstantSymbol>,
    configs: FxHashMap<(ConfigGroup, SmolStr), ConfigSymbol>,
    graphics: FxHashMap<SmolStr, GraphicSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child scope over an immutable parent.
    pub fn child(parent: Arc<SymbolTable>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    // =========================================================================
    // Lookup (walks parents)
    // =========================================================================

    pub fn lookup_script(&self, name: &ScriptName) -> Option<&ScriptSymbol> {
        self.scripts
            .get(name)
            .or_else(|| self.parent.as_deref().and_then(|p| p.lookup_script(name)))
    }

    pub fn lookup_command(&self, name: &str) -> Option<&CommandSymbol> {
        self.commands
            .get(name)
            .or_else(|| self.parent.as_deref().and_then(|p| p.lookup_command(name)))
    }

    pub fn lookup_constant(&self, name: &str) -> Option<&ConstantSymbol> {
        self.constants
            .get(name)
            .or_else(|| self.parent.as_deref().and_then(|p| p.lookup_constant(name)))
    }

    pub fn lookup_config(&self, group: &ConfigGroup, name: &str) -> Option<&ConfigSymbol> {
        let key = (group.clone(), SmolStr::new(name));
        self.configs.get(&key).or_else(|| {
            self.parent
                .as_deref()
                .and_then(|p| p.lookup_config(group, name))
        })
    }

    pub fn lookup_graphic(&self, name: &str) -> Option<&GraphicSymbol> {
        self.graphics
            .get(name)
            .or_else(|| self.parent.as_deref().and_then(|p| p.lookup_graphic(name)))
    }

    // =========================================================================
    // Declaration
    // =========================================================================

    /// Declare a script. Returns `false` when the name is already
    /// taken and `allow_override` is off; with override on, the later
    /// declaration replaces the earlier silently.
    pub fn declare_script(&mut self, symbol: ScriptSymbol, allow_override: bool) -> bool {
        if !allow_override && self.lookup_script(&symbol.name).is_some() {
            return false;
        }
        tracing::trace!(name = %symbol.name, "declare script");
        self.scripts.insert(symbol.name.clone(), symbol);
        true
    }

    pub fn declare_command(&mut self, symbol: CommandSymbol, allow_override: bool) -> bool {
        if !allow_override && self.lookup_command(&symbol.name).is_some() {
            return false;
        }
        self.commands.insert(symbol.name.clone(), symbol);
        true
    }

    pub fn declare_constant(&mut self, symbol: ConstantSymbol, allow_override: bool) -> bool {
        if !allow_override && self.lookup_constant(&symbol.name).is_some() {
            return false;
        }
        self.constants.insert(symbol.name.clone(), symbol);
        true
    }

    pub fn declare_config(&mut self, symbol: ConfigSymbol, allow_override: bool) -> bool {
        if !allow_override && self.lookup_config(&symbol.group, &symbol.name).is_some() {
            return false;
        }
        tracing::trace!(group = %symbol.group, name = %symbol.name, "declare config");
        self.configs
            .insert((symbol.group.clone(), symbol.name.clone()), symbol);
        true
    }

    pub fn declare_graphic(&mut self, symbol: GraphicSymbol, allow_override: bool) -> bool {
        if !allow_override && self.lookup_graphic(&symbol.name).is_some() {
            return false;
        }
        self.graphics.insert(symbol.name.clone(), symbol);
        true
    }
}
