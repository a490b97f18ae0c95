//! Recursive-descent parsers for both dialects.
//!
//! The [`Parser`] state is shared; the grammars live in
//! [`script`] and [`config`]. On a mismatch the parser reports a
//! diagnostic and performs panic-mode recovery, discarding tokens
//! until a synchronization point, so one malformed construct never
//! aborts the file.

mod config;
mod script;

pub use config::parse_config_file;
pub use script::parse_script_file;

use text_size::{TextRange, TextSize};

use crate::diagnostics::{Diagnostic, DiagnosticKind, Reporter};
use crate::lexer::{Lexer, LexicalTable, Token, TokenKind, kind_to_name};

/// Result of parsing one file: the tree plus everything that went
/// wrong while building it (lexical and syntactic).
#[derive(Debug)]
pub struct Parse<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Parse<T> {
    pub fn ok(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// The parser state: a look-ahead lexer, the source (for placeholder
/// re-lexing), and a diagnostic buffer.
pub(crate) struct Parser<'a> {
    lexer: Lexer,
    source: &'a str,
    table: &'a LexicalTable,
    reporter: Reporter,
    /// End offset of the most recently consumed token; the basis for
    /// node ranges.
    last_end: TextSize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str, table: &'a LexicalTable) -> Self {
        let mut reporter = Reporter::new();
        let lexer = Lexer::new(source, table, &mut reporter);
        Self {
            lexer,
            source,
            table,
            reporter,
            last_end: TextSize::new(0),
        }
    }

    pub(crate) fn from_tokens(tokens: Vec<Token>, source: &'a str, table: &'a LexicalTable) -> Self {
        Self {
            lexer: Lexer::from_tokens(tokens),
            source,
            table,
            reporter: Reporter::new(),
            last_end: TextSize::new(0),
        }
    }

    pub(crate) fn finish<T>(mut self, value: T) -> Parse<T> {
        Parse {
            value,
            diagnostics: self.reporter.take(),
        }
    }

    // =========================================================================
    // Token inspection
    // =========================================================================

    pub(crate) fn current(&self) -> &Token {
        self.lexer.peek()
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.current().kind
    }

    pub(crate) fn nth_kind(&self, n: usize) -> TokenKind {
        self.lexer.nth(n).kind
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    pub(crate) fn at_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.kind())
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.lexer.remaining() == 0
    }

    /// Range of the whole document.
    pub(crate) fn document_range(&self) -> TextRange {
        TextRange::new(TextSize::new(0), TextSize::of(self.source))
    }

    /// Range from a node's start to the last consumed token's end.
    pub(crate) fn span_from(&self, start: TextRange) -> TextRange {
        if self.last_end > start.start() {
            TextRange::new(start.start(), self.last_end)
        } else {
            start
        }
    }

    // =========================================================================
    // Token consumption
    // =========================================================================

    pub(crate) fn bump(&mut self) -> Token {
        let token = self.lexer.take();
        if token.kind != TokenKind::Eof {
            self.last_end = token.range.end();
        }
        token
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consume a token of the given kind, or report and return `None`.
    pub(crate) fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            let message = format!(
                "expected {}, found {}",
                kind_to_name(kind),
                kind_to_name(self.kind())
            );
            self.error_at_current(DiagnosticKind::ExpectedToken, message);
            None
        }
    }

    // =========================================================================
    // Error handling
    // =========================================================================

    pub(crate) fn error_at_current(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let range = self.current().range;
        self.reporter.error(kind, range, message);
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        self.reporter.report(diagnostic);
    }

    /// Drain buffered diagnostics, e.g. to merge a placeholder
    /// sub-parser's problems into the outer parse.
    pub(crate) fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.reporter.take()
    }

    /// Panic-mode recovery: discard tokens until one of `recovery`
    /// (or end of file), always making progress.
    pub(crate) fn recover(&mut self, recovery: &[TokenKind]) {
        let mut consumed = false;
        while !self.at_eof() && !self.at_any(recovery) {
            self.bump();
            consumed = true;
        }
        if !consumed && !self.at_eof() && !self.at_any(recovery) {
            self.bump();
        }
    }
}
