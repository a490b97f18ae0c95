//! Collected diagnostics for user-code problems.
//!
//! Lexical, syntactic, and semantic failures are values buffered on a
//! [`Reporter`]; they never cross a file boundary as `Err`. Only
//! internal invariant violations surface as hard errors from the
//! driver (see [`crate::driver::CompilerError`]).

use text_size::TextRange;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

impl Severity {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// Broad category of a diagnostic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Lexical,
    Syntax,
    Semantic,
}

/// Closed set of diagnostic kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    // =========================================================================
    // Lexical
    // =========================================================================
    /// String literal missing its closing quote
    UnterminatedString,
    /// Unknown escape sequence inside a string literal
    BadEscape,
    /// Numeric literal outside the range of its type
    NumericOverflow,
    /// Character the scanner cannot classify
    UnknownCharacter,
    /// Coordinate-grid literal with an out-of-range field
    MalformedCoordGrid,

    // =========================================================================
    // Syntactic
    // =========================================================================
    /// Token that no production accepts
    UnexpectedToken,
    /// `expect(kind)` mismatch
    ExpectedToken,

    // =========================================================================
    // Semantic
    // =========================================================================
    /// Name that resolves to nothing
    UnresolvedName,
    /// Expression type differs from the required type
    TypeMismatch,
    /// Call with the wrong number of arguments
    ArityMismatch,
    /// Symbol declared twice without override
    DuplicateDeclaration,
    /// Binding rule violated (range bounds, required companion)
    RuleViolation,
    /// Reference that resolves to the wrong kind of thing
    MalformedReference,
    /// Tuple-typed value in a position that takes a scalar, or
    /// mismatched tuple shapes
    TupleShapeMismatch,
}

impl DiagnosticKind {
    pub fn category(&self) -> Category {
        use DiagnosticKind::*;
        match self {
            UnterminatedString | BadEscape | NumericOverflow | UnknownCharacter
            | MalformedCoordGrid => Category::Lexical,
            UnexpectedToken | ExpectedToken => Category::Syntax,
            UnresolvedName | TypeMismatch | ArityMismatch | DuplicateDeclaration
            | RuleViolation | MalformedReference | TupleShapeMismatch => Category::Semantic,
        }
    }
}

/// A single reported problem: what, where, and in which words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub range: TextRange,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, range: TextRange, message: impl Into<String>) -> Self {
        Self {
            kind,
            range,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(kind: DiagnosticKind, range: TextRange, message: impl Into<String>) -> Self {
        Self {
            kind,
            range,
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

/// Buffers diagnostics discovered during one pass over one file.
///
/// Cleared between passes by taking the buffered values.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, kind: DiagnosticKind, range: TextRange, message: impl Into<String>) {
        self.report(Diagnostic::error(kind, range, message));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity.is_error())
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Drain the buffer, leaving the reporter empty for the next pass.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use text_size::TextSize;

    fn range() -> TextRange {
        TextRange::new(TextSize::new(0), TextSize::new(1))
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            DiagnosticKind::UnterminatedString.category(),
            Category::Lexical
        );
        assert_eq!(DiagnosticKind::ExpectedToken.category(), Category::Syntax);
        assert_eq!(DiagnosticKind::TypeMismatch.category(), Category::Semantic);
    }

    #[test]
    fn test_reporter_take_clears() {
        let mut reporter = Reporter::new();
        reporter.error(DiagnosticKind::UnresolvedName, range(), "unknown name");
        assert!(reporter.has_errors());
        let taken = reporter.take();
        assert_eq!(taken.len(), 1);
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_warning_is_not_error() {
        let mut reporter = Reporter::new();
        reporter.report(Diagnostic::warning(
            DiagnosticKind::RuleViolation,
            range(),
            "suspicious",
        ));
        assert!(!reporter.has_errors());
        assert_eq!(reporter.len(), 1);
    }
}
