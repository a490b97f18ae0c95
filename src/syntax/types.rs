//! The language type model.
//!
//! Every value in either dialect has a [`PrimitiveType`]; each
//! primitive lives on one of three virtual-machine stacks
//! ([`StackType`]). Tuple types are kept canonically flat in a
//! [`TypeTuple`], so a tuple of one element compares equal to that
//! element.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Which virtual-machine stack an operand lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackType {
    Int,
    Long,
    String,
}

/// A language-level type with a source representation and a stack
/// classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Int,
    Boolean,
    Long,
    String,
    Coord,
    Graphic,
    Obj,
    Loc,
    Npc,
    Param,
    Stat,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 11] = [
        PrimitiveType::Int,
        PrimitiveType::Boolean,
        PrimitiveType::Long,
        PrimitiveType::String,
        PrimitiveType::Coord,
        PrimitiveType::Graphic,
        PrimitiveType::Obj,
        PrimitiveType::Loc,
        PrimitiveType::Npc,
        PrimitiveType::Param,
        PrimitiveType::Stat,
    ];

    /// The spelling used in source text.
    pub fn representation(&self) -> &'static str {
        match self {
            PrimitiveType::Int => "int",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Long => "long",
            PrimitiveType::String => "string",
            PrimitiveType::Coord => "coord",
            PrimitiveType::Graphic => "graphic",
            PrimitiveType::Obj => "obj",
            PrimitiveType::Loc => "loc",
            PrimitiveType::Npc => "npc",
            PrimitiveType::Param => "param",
            PrimitiveType::Stat => "stat",
        }
    }

    pub fn from_representation(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.representation() == name)
    }

    pub fn stack_type(&self) -> StackType {
        match self {
            PrimitiveType::Long => StackType::Long,
            PrimitiveType::String => StackType::String,
            _ => StackType::Int,
        }
    }

    /// The config group a reference of this type resolves against,
    /// when the type names a content record.
    pub fn reference_group(&self) -> Option<&'static str> {
        match self {
            PrimitiveType::Obj => Some("obj"),
            PrimitiveType::Loc => Some("loc"),
            PrimitiveType::Npc => Some("npc"),
            PrimitiveType::Param => Some("param"),
            PrimitiveType::Stat => Some("stat"),
            _ => None,
        }
    }
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.representation())
    }
}

/// A canonically flattened tuple of primitive types.
///
/// The empty tuple is the unit type (no values); a single-element
/// tuple is that scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TypeTuple {
    components: Vec<PrimitiveType>,
}

impl TypeTuple {
    pub fn unit() -> Self {
        Self::default()
    }

    pub fn single(ty: PrimitiveType) -> Self {
        Self {
            components: vec![ty],
        }
    }

    pub fn components(&self) -> &[PrimitiveType] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_unit(&self) -> bool {
        self.components.is_empty()
    }

    pub fn as_single(&self) -> Option<PrimitiveType> {
        match self.components[..] {
            [ty] => Some(ty),
            _ => None,
        }
    }

    pub fn push(&mut self, ty: PrimitiveType) {
        self.components.push(ty);
    }

    /// Append another tuple's components; nesting flattens away.
    pub fn extend(&mut self, other: &TypeTuple) {
        self.components.extend_from_slice(&other.components);
    }

    pub fn display(&self) -> SmolStr {
        if self.is_unit() {
            return SmolStr::new("()");
        }
        let parts: Vec<&str> = self.components.iter().map(|t| t.representation()).collect();
        SmolStr::new(parts.join(","))
    }
}

impl FromIterator<PrimitiveType> for TypeTuple {
    fn from_iter<I: IntoIterator<Item = PrimitiveType>>(iter: I) -> Self {
        Self {
            components: iter.into_iter().collect(),
        }
    }
}

impl From<PrimitiveType> for TypeTuple {
    fn from(ty: PrimitiveType) -> Self {
        Self::single(ty)
    }
}
