//! Symbol resolution and semantic checking.
//!
//! Checking is two-phase. The pre-pass walks every unit in the batch
//! and *declares* its symbol in the batch's child table, which is
//! what makes forward references work. The main pass then resolves
//! names and checks types bottom-up. Both phases buffer diagnostics;
//! neither ever aborts the batch.

mod config;
mod script;
pub mod symbol_table;

pub use config::{ConfigChecker, declare_config};
pub use script::{ScriptChecker, declare_script};

use crate::binding::ConfigGroup;
use crate::syntax::PrimitiveType;
use crate::syntax::script::VarScope;

/// The config group and value type behind each global variable scope.
/// Local scope has no group; locals resolve against the frame.
pub fn var_scope_group(scope: VarScope) -> Option<(ConfigGroup, PrimitiveType)> {
    match scope {
        VarScope::Local => None,
        VarScope::Player => Some((ConfigGroup::new("varp"), PrimitiveType::Int)),
        VarScope::PlayerBit => Some((ConfigGroup::new("varbit"), PrimitiveType::Int)),
        VarScope::ClientInt => Some((ConfigGroup::new("varcint"), PrimitiveType::Int)),
        VarScope::ClientString => Some((ConfigGroup::new("varcstring"), PrimitiveType::String)),
    }
}

/// Sigil shown in messages about a scoped variable.
pub(crate) fn scope_sigil(scope: VarScope) -> &'static str {
    match scope {
        VarScope::Local => "$",
        VarScope::Player => "%",
        VarScope::PlayerBit => "%%",
        VarScope::ClientInt => "&",
        VarScope::ClientString => "^",
    }
}
