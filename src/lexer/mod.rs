//! Lexer: raw scanning, keyword reclassification, look-ahead.
//!
//! [`tokenize`] runs the logos scanner over a document, validates
//! literals (numeric range, string termination, escapes, coordinate
//! fields), reclassifies identifiers through the [`LexicalTable`],
//! and reports every lexical problem as a diagnostic without ever
//! giving up on the stream. [`Lexer`] wraps the token buffer with
//! `peek`/`take`/`remaining` for the parser.

mod raw;
mod table;
mod token;

pub use table::LexicalTable;
pub use token::{Token, TokenKind, kind_to_name};

use logos::Logos;
use text_size::{TextRange, TextSize};

use crate::diagnostics::{DiagnosticKind, Reporter};
use raw::RawToken;

/// Tokenize a document, discarding trivia.
pub fn tokenize(source: &str, table: &LexicalTable, reporter: &mut Reporter) -> Vec<Token> {
    tokenize_impl(source, table, reporter, false)
}

/// Tokenize a document, keeping comment tokens in the stream.
pub fn tokenize_with_comments(
    source: &str,
    table: &LexicalTable,
    reporter: &mut Reporter,
) -> Vec<Token> {
    tokenize_impl(source, table, reporter, true)
}

fn tokenize_impl(
    source: &str,
    table: &LexicalTable,
    reporter: &mut Reporter,
    keep_comments: bool,
) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = RawToken::lexer(source);

    while let Some(result) = lexer.next() {
        let text = lexer.slice();
        let span = lexer.span();
        let range = TextRange::new(TextSize::new(span.start as u32), TextSize::new(span.end as u32));

        let kind = match result {
            Ok(RawToken::Whitespace) => continue,
            Ok(RawToken::LineComment) | Ok(RawToken::BlockComment) => {
                if keep_comments {
                    TokenKind::Comment
                } else {
                    continue;
                }
            }
            Ok(RawToken::Number) => {
                validate_number(text, range, reporter);
                if has_long_suffix(text) {
                    TokenKind::Long
                } else {
                    TokenKind::Integer
                }
            }
            Ok(RawToken::HexNumber) => {
                validate_number(text, range, reporter);
                if has_long_suffix(text) {
                    TokenKind::Long
                } else {
                    TokenKind::Integer
                }
            }
            Ok(RawToken::CoordGrid) => {
                validate_coord_grid(text, range, reporter);
                TokenKind::CoordGrid
            }
            Ok(RawToken::String) => {
                if !string_is_terminated(text) {
                    reporter.error(
                        DiagnosticKind::UnterminatedString,
                        range,
                        "unterminated string literal",
                    );
                } else {
                    validate_string(text, range, reporter);
                }
                TokenKind::String
            }
            Ok(RawToken::Ident) => table.classify(text),
            Ok(RawToken::EqEq) => TokenKind::EqualEqual,
            Ok(RawToken::LtEq) => TokenKind::LessThanOrEqual,
            Ok(RawToken::GtEq) => TokenKind::GreaterThanOrEqual,
            Ok(RawToken::PercentPercent) => TokenKind::PercentPercent,
            Ok(RawToken::Eq) => TokenKind::Equal,
            Ok(RawToken::Lt) => TokenKind::LessThan,
            Ok(RawToken::Gt) => TokenKind::GreaterThan,
            Ok(RawToken::Plus) => TokenKind::Plus,
            Ok(RawToken::Minus) => TokenKind::Minus,
            Ok(RawToken::Star) => TokenKind::Star,
            Ok(RawToken::Slash) => TokenKind::Slash,
            Ok(RawToken::Dollar) => TokenKind::Dollar,
            Ok(RawToken::Percent) => TokenKind::Percent,
            Ok(RawToken::Caret) => TokenKind::Caret,
            Ok(RawToken::Ampersand) => TokenKind::Ampersand,
            Ok(RawToken::Tilde) => TokenKind::Tilde,
            Ok(RawToken::Dot) => TokenKind::Dot,
            Ok(RawToken::LBracket) => TokenKind::LBracket,
            Ok(RawToken::RBracket) => TokenKind::RBracket,
            Ok(RawToken::LParen) => TokenKind::LParen,
            Ok(RawToken::RParen) => TokenKind::RParen,
            Ok(RawToken::LBrace) => TokenKind::LBrace,
            Ok(RawToken::RBrace) => TokenKind::RBrace,
            Ok(RawToken::Comma) => TokenKind::Comma,
            Ok(RawToken::Semicolon) => TokenKind::Semicolon,
            Err(()) => {
                reporter.error(
                    DiagnosticKind::UnknownCharacter,
                    range,
                    format!("unexpected character {:?}", text),
                );
                TokenKind::Error
            }
        };

        tokens.push(Token::new(kind, text, range));
    }

    let end = TextSize::of(source);
    tokens.push(Token::new(TokenKind::Eof, "", TextRange::empty(end)));
    tokens
}

/// Tokenize a slice that sits at `base` within its document, shifting
/// token and diagnostic ranges so they stay absolute. Used to re-lex
/// `<expr>` placeholders inside string literals.
pub fn tokenize_at(
    source: &str,
    base: TextSize,
    table: &LexicalTable,
    reporter: &mut Reporter,
) -> Vec<Token> {
    let mut local = Reporter::new();
    let tokens = tokenize(source, table, &mut local);
    for mut diagnostic in local.take() {
        diagnostic.range += base;
        reporter.report(diagnostic);
    }
    tokens
        .into_iter()
        .map(|token| Token {
            range: token.range + base,
            ..token
        })
        .collect()
}

/// Wraps the token buffer with a cursor; the parser's token source.
///
/// The final token is always [`TokenKind::Eof`]; `take` never
/// advances past it.
pub struct Lexer {
    tokens: Vec<Token>,
    pos: usize,
}

impl Lexer {
    pub fn new(source: &str, table: &LexicalTable, reporter: &mut Reporter) -> Self {
        Self {
            tokens: tokenize(source, table, reporter),
            pos: 0,
        }
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof)));
        Self { tokens, pos: 0 }
    }

    pub fn peek(&self) -> &Token {
        self.nth(0)
    }

    /// Look ahead `n` tokens without consuming.
    pub fn nth(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub fn take(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// Number of unconsumed tokens, not counting the end-of-file
    /// sentinel.
    pub fn remaining(&self) -> usize {
        self.tokens.len() - 1 - self.pos.min(self.tokens.len() - 1)
    }
}

// =============================================================================
// Literal validation and decoding
// =============================================================================

fn has_long_suffix(text: &str) -> bool {
    text.ends_with('l') || text.ends_with('L')
}

fn number_body(text: &str) -> &str {
    if has_long_suffix(text) {
        &text[..text.len() - 1]
    } else {
        text
    }
}

fn validate_number(text: &str, range: TextRange, reporter: &mut Reporter) {
    let body = number_body(text);
    let ok = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        if has_long_suffix(text) {
            u64::from_str_radix(hex, 16).is_ok()
        } else {
            u32::from_str_radix(hex, 16).is_ok()
        }
    } else if has_long_suffix(text) {
        body.parse::<i64>().is_ok()
    } else {
        body.parse::<i32>().is_ok()
    };
    if !ok {
        reporter.error(
            DiagnosticKind::NumericOverflow,
            range,
            format!("numeric literal '{}' out of range", text),
        );
    }
}

/// Value of a validated integer token. Saturates when the literal was
/// already reported as out of range.
pub fn int_value(text: &str) -> i32 {
    let body = number_body(text);
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).unwrap_or(u32::MAX) as i32
    } else {
        body.parse::<i32>().unwrap_or(i32::MAX)
    }
}

/// Value of a validated long token.
pub fn long_value(text: &str) -> i64 {
    let body = number_body(text);
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).unwrap_or(u64::MAX) as i64
    } else {
        body.parse::<i64>().unwrap_or(i64::MAX)
    }
}

const COORD_FIELD_MAX: [u32; 5] = [3, 255, 255, 63, 63];

fn validate_coord_grid(text: &str, range: TextRange, reporter: &mut Reporter) {
    for (field, max) in text.split('_').zip(COORD_FIELD_MAX) {
        match field.parse::<u32>() {
            Ok(value) if value <= max => {}
            _ => {
                reporter.error(
                    DiagnosticKind::MalformedCoordGrid,
                    range,
                    format!("coordinate field '{}' exceeds {}", field, max),
                );
                return;
            }
        }
    }
}

/// Pack a validated coordinate-grid literal:
/// `(level << 28) | (x << 14) | z` with `x = sqx*64 + tilex` and
/// `z = sqz*64 + tilez`.
pub fn pack_coord_grid(text: &str) -> i32 {
    let mut fields = [0u32; 5];
    for (slot, field) in fields.iter_mut().zip(text.split('_')) {
        *slot = field.parse::<u32>().unwrap_or(0);
    }
    let [level, sqx, sqz, tilex, tilez] = fields;
    let x = sqx * 64 + tilex;
    let z = sqz * 64 + tilez;
    ((level << 28) | (x << 14) | z) as i32
}

/// Whether the token's final quote closes the string. Escape pairs
/// are skipped so `"a\"` does not count as terminated.
fn string_is_terminated(text: &str) -> bool {
    let bytes = &text.as_bytes()[1..];
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i == bytes.len() - 1,
            _ => i += 1,
        }
    }
    false
}

const VALID_ESCAPES: [char; 6] = ['\\', '"', '<', '>', 'n', 't'];

fn validate_string(text: &str, range: TextRange, reporter: &mut Reporter) {
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(e) if VALID_ESCAPES.contains(&e) => {}
                Some(e) => reporter.error(
                    DiagnosticKind::BadEscape,
                    range,
                    format!("unknown escape sequence '\\{}'", e),
                ),
                None => {}
            }
        }
    }
}

fn apply_escape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        other => other,
    }
}

/// Decode a string token's text (quotes stripped, escapes applied).
/// Placeholders are not interpreted; use [`split_string_literal`] for
/// the script dialect.
pub fn decode_string(text: &str) -> String {
    let inner = string_inner(text);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(e) = chars.next() {
                out.push(apply_escape(e));
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn string_inner(text: &str) -> &str {
    let text = text.strip_prefix('"').unwrap_or(text);
    text.strip_suffix('"').unwrap_or(text)
}

/// One segment of an interpolated string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringPiece {
    /// Literal text, escapes already applied.
    Text { value: String, range: TextRange },
    /// The source range of an embedded `<expression>`, quotes and
    /// angle brackets excluded.
    Interp { range: TextRange },
}

/// Split a string token into literal text and `<expr>` placeholder
/// pieces. `range` is the token's absolute range; piece ranges are
/// absolute as well, so placeholder sources can be re-lexed in place.
pub fn split_string_literal(text: &str, range: TextRange) -> Vec<StringPiece> {
    let inner = string_inner(text);
    // Byte offset of the inner text within the document.
    let base = u32::from(range.start()) + if text.starts_with('"') { 1 } else { 0 };
    let abs = |offset: usize| TextSize::new(base + offset as u32);

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_start = 0usize;

    let mut chars = inner.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    current.push(apply_escape(escaped));
                }
            }
            '<' => {
                if !current.is_empty() {
                    pieces.push(StringPiece::Text {
                        value: std::mem::take(&mut current),
                        range: TextRange::new(abs(current_start), abs(i)),
                    });
                }
                let expr_start = i + 1;
                let mut expr_end = inner.len();
                let mut after = inner.len();
                let mut depth = 0i32;
                for (j, d) in chars.by_ref() {
                    match d {
                        '(' => depth += 1,
                        ')' => depth -= 1,
                        '>' if depth == 0 => {
                            expr_end = j;
                            after = j + 1;
                            break;
                        }
                        _ => {}
                    }
                }
                pieces.push(StringPiece::Interp {
                    range: TextRange::new(abs(expr_start), abs(expr_end)),
                });
                current_start = after;
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || pieces.is_empty() {
        pieces.push(StringPiece::Text {
            value: current,
            range: TextRange::new(abs(current_start), abs(inner.len())),
        });
    }
    pieces
}
