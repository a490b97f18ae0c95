//! Typed syntax trees for both dialects and the language type model.

pub mod config;
pub mod script;
mod types;

pub use types::{PrimitiveType, StackType, TypeTuple};
