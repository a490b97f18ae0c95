//! Per-extension schema for the configuration dialect.
//!
//! A [`Binding`] maps property keys to descriptors that say how each
//! property type-checks and lowers to binary form. Bindings are
//! registered on the driver per file extension; a duplicate
//! registration is a hard failure, not a diagnostic.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::syntax::PrimitiveType;

/// A config group: the namespace a record's numeric id lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigGroup(SmolStr);

impl ConfigGroup {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ConfigGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation rule attached to a property descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyRule {
    /// Boolean property: emit an empty payload when true, omit the
    /// property entirely when false.
    EmitEmptyIfTrue,
    /// The inverse polarity.
    EmitEmptyIfFalse,
    /// Integer values must fall within `lo..=hi`.
    Range { lo: i32, hi: i32 },
    /// The named companion property must appear in the same config.
    Require(SmolStr),
}

/// How a property lowers to binary form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// Fixed opcode, fixed tuple of primitive components.
    Basic {
        opcode: u8,
        components: Vec<PrimitiveType>,
    },
    /// Two opcodes selected by the companion `type` property's stack
    /// class: one for int-stack types, one for long/string-stack.
    TypeDispatched {
        int_opcode: u8,
        long_opcode: u8,
        type_property: SmolStr,
    },
    /// A companion property holding a single type literal. Consumed
    /// by type-dispatched and map descriptors to pick their opcode;
    /// emits no binary property of its own.
    TypeName,
    /// One component of one element of an aggregate record shared by
    /// several source properties at a single opcode.
    SplitArray {
        opcode: u8,
        size_type: PrimitiveType,
        max_size: u16,
        /// 1-based row this property contributes to.
        element: u16,
        /// 0-based column this property fills.
        component: u16,
        component_count: u16,
        component_type: PrimitiveType,
    },
    /// `key=param_ref,value` entries accumulated into one parameter
    /// map at a single opcode.
    Param { opcode: u8 },
    /// Key/value entries accumulated into one map; the value type
    /// comes from a companion property and selects the opcode.
    Map {
        int_opcode: u8,
        long_opcode: u8,
        type_property: SmolStr,
        key_type: PrimitiveType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub kind: PropertyKind,
    pub rules: Vec<PropertyRule>,
}

impl PropertyDescriptor {
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: PropertyRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn has_emit_empty_rule(&self) -> bool {
        self.rules.iter().any(|rule| {
            matches!(
                rule,
                PropertyRule::EmitEmptyIfTrue | PropertyRule::EmitEmptyIfFalse
            )
        })
    }
}

/// Schema for one file extension: target group plus property
/// descriptors keyed by property name.
#[derive(Debug, Clone)]
pub struct Binding {
    pub group: ConfigGroup,
    properties: FxHashMap<SmolStr, PropertyDescriptor>,
}

impl Binding {
    pub fn new(group: ConfigGroup) -> Self {
        Self {
            group,
            properties: FxHashMap::default(),
        }
    }

    pub fn define(mut self, key: impl Into<SmolStr>, descriptor: PropertyDescriptor) -> Self {
        self.properties.insert(key.into(), descriptor);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &PropertyDescriptor)> {
        self.properties.iter()
    }
}
