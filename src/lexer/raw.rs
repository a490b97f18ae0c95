//! Raw scanner for both dialects.
//!
//! The logos derive recognizes trivia, literals, operators, and
//! separators. Keywords are deliberately absent: identifier spellings
//! are reclassified through the runtime [`super::LexicalTable`], so a
//! keyword and an identifier with the same spelling can never both
//! match.

use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawToken {
    // =========================================================================
    // TRIVIA
    // =========================================================================
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    #[regex(r"//[^\n]*")]
    LineComment,

    #[regex(r"/\*([^*]|\*[^/])*\*/")]
    BlockComment,

    // =========================================================================
    // LITERALS
    // =========================================================================
    /// Five underscore-separated fields, e.g. `0_50_50_31_3`.
    /// Longest-match beats the plain integer rule.
    #[regex(r"[0-9]+_[0-9]+_[0-9]+_[0-9]+_[0-9]+")]
    CoordGrid,

    #[regex(r"0[xX][0-9a-fA-F]+[lL]?")]
    HexNumber,

    #[regex(r"[0-9]+[lL]?")]
    Number,

    /// A string literal; the closing quote is optional so a string
    /// cut off by a newline or end of input still lexes as one token.
    #[regex(r#""([^"\\\n]|\\[^\n])*"?"#)]
    String,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // =========================================================================
    // MULTI-CHARACTER OPERATORS (before single-char)
    // =========================================================================
    #[token("==")]
    EqEq,

    #[token("<=")]
    LtEq,

    #[token(">=")]
    GtEq,

    #[token("%%")]
    PercentPercent,

    // =========================================================================
    // SINGLE-CHARACTER OPERATORS
    // =========================================================================
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("$")]
    Dollar,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("&")]
    Ampersand,
    #[token("~")]
    Tilde,
    #[token(".")]
    Dot,

    // =========================================================================
    // SEPARATORS
    // =========================================================================
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
}
