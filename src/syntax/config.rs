//! Typed syntax tree for the configuration dialect.

use text_size::TextRange;

use super::script::{BoolLit, CoordLit, Ident, IntLit, LongLit, StringLit};
use super::types::PrimitiveType;

/// A parsed config source file: zero or more config records.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub configs: Vec<ConfigNode>,
    pub range: TextRange,
}

/// `[name]` followed by its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigNode {
    pub name: Ident,
    pub properties: Vec<PropertyNode>,
    pub range: TextRange,
}

impl ConfigNode {
    /// First property with the given key, if any.
    pub fn property(&self, key: &str) -> Option<&PropertyNode> {
        self.properties.iter().find(|p| p.key.name == key)
    }
}

/// `key=value,value,...`
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyNode {
    pub key: Ident,
    pub values: Vec<Value>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(StringLit),
    Int(IntLit),
    Long(LongLit),
    Bool(BoolLit),
    CoordGrid(CoordLit),
    Type(TypeLit),
    /// An identifier; resolves to a config or constant in the
    /// semantic pass.
    Reference(Ident),
}

impl Value {
    pub fn range(&self) -> TextRange {
        match self {
            Value::Str(v) => v.range,
            Value::Int(v) => v.range,
            Value::Long(v) => v.range,
            Value::Bool(v) => v.range,
            Value::CoordGrid(v) => v.range,
            Value::Type(v) => v.range,
            Value::Reference(v) => v.range,
        }
    }
}

/// A type name used as a value, e.g. `type=long`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLit {
    pub ty: PrimitiveType,
    pub range: TextRange,
}
