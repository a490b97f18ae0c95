//! Per-dialect lexical table.
//!
//! Maps spellings to keyword token kinds. Populated once per dialect
//! at driver construction; a spelling present in the table never
//! lexes as an identifier.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::TokenKind;
use crate::syntax::PrimitiveType;

#[derive(Debug, Clone, Default)]
pub struct LexicalTable {
    keywords: FxHashMap<SmolStr, TokenKind>,
}

impl LexicalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The script-dialect table: control-flow keywords, boolean
    /// spellings, declaration keywords, and type names.
    pub fn script() -> Self {
        let mut table = Self::new();
        table.register("if", TokenKind::If);
        table.register("else", TokenKind::Else);
        table.register("while", TokenKind::While);
        table.register("return", TokenKind::Return);
        table.register("calc", TokenKind::Calc);
        table.register("true", TokenKind::Boolean);
        table.register("false", TokenKind::Boolean);
        for ty in PrimitiveType::ALL {
            table.register(ty.representation(), TokenKind::Type);
            table.register(&format!("def_{}", ty.representation()), TokenKind::DefType);
        }
        table
    }

    /// The config-dialect table: boolean spellings (including the
    /// `yes`/`no` forms) and type names.
    pub fn config() -> Self {
        let mut table = Self::new();
        table.register("yes", TokenKind::Boolean);
        table.register("no", TokenKind::Boolean);
        table.register("true", TokenKind::Boolean);
        table.register("false", TokenKind::Boolean);
        for ty in PrimitiveType::ALL {
            table.register(ty.representation(), TokenKind::Type);
        }
        table
    }

    pub fn register(&mut self, spelling: &str, kind: TokenKind) {
        self.keywords.insert(SmolStr::new(spelling), kind);
    }

    /// Classify an identifier spelling: keyword wins, identifier
    /// otherwise.
    pub fn classify(&self, spelling: &str) -> TokenKind {
        self.keywords
            .get(spelling)
            .copied()
            .unwrap_or(TokenKind::Identifier)
    }

    pub fn is_keyword(&self, spelling: &str) -> bool {
        self.keywords.contains_key(spelling)
    }
}
