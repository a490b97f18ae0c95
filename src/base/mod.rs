//! Foundation types: byte-offset ranges and line/column conversion.

mod position;

pub use position::{LineCol, LineIndex, Span};
pub use text_size::{TextRange, TextSize};
