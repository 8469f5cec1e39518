//! The error taxonomy (§7) and the diagnostic sink (§6) it reports through.
//!
//! Recoverable failures are modeled as `thiserror`-derived enums so call
//! sites can match on failure kind (the CLI driver uses this to distinguish
//! an unreadable include from a malformed macro when choosing an exit code),
//! while [`Diagnostics`] is the append-only sink every stage reports through
//! so a single run can surface more than one error, per §7's propagation
//! policy.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::location::Span;

/// Severity of one reported diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        })
    }
}

/// One reported diagnostic: severity, primary span, optional secondary
/// macro-expansion span (§4.3.1, §7), and a human-readable message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub primary_span: Span,
    pub expansion_span: Option<Span>,
    pub message: String,
}

/// Accumulates diagnostics for one compilation.
///
/// This is a value-level sink kept external to the compilation core (§6);
/// `cfront-core` only requires something that can `report` and later be
/// drained. `cfront-cli` is the concrete collaborator that prints these to
/// stderr.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &mut self,
        severity: Severity,
        primary_span: Span,
        expansion_span: Option<Span>,
        message: impl Into<String>,
    ) {
        self.entries.push(Diagnostic {
            severity,
            primary_span,
            expansion_span,
            message: message.into(),
        });
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Error, span, None, message);
    }

    pub fn error_in_expansion(&mut self, span: Span, expansion_span: Span, message: impl Into<String>) {
        self.report(Severity::Error, span, Some(expansion_span), message);
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Warning, span, None, message);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.entries.iter().filter(|d| d.severity == Severity::Warning).count()
    }
}

/// Lexical failures (§7): unterminated literals/comments, bad escapes,
/// unrecognized bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated block comment")]
    UnterminatedComment { span: Span },
    #[error("unterminated character literal")]
    UnterminatedCharLiteral { span: Span },
    #[error("unterminated string literal")]
    UnterminatedStringLiteral { span: Span },
    #[error("empty character literal")]
    EmptyCharLiteral { span: Span },
    #[error("unrecognized escape sequence")]
    UnknownEscape { span: Span },
    #[error("unrecognized byte")]
    UnrecognizedByte { span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnterminatedComment { span }
            | LexError::UnterminatedCharLiteral { span }
            | LexError::UnterminatedStringLiteral { span }
            | LexError::EmptyCharLiteral { span }
            | LexError::UnknownEscape { span }
            | LexError::UnrecognizedByte { span } => *span,
        }
    }
}

/// Preprocessor failures (§7): directive syntax, conditional-stack
/// mismatches, macro arity/paste errors, `#error` directives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("#{directive} with no matching #endif")]
    UnterminatedConditional { span: Span, directive: String },
    #[error("#endif without matching #if")]
    UnmatchedEndif { span: Span },
    #[error("#else without matching #if")]
    UnmatchedElse { span: Span },
    #[error("#else after #else")]
    DuplicateElse { span: Span },
    #[error("malformed #{directive} directive", directive = .directive)]
    MalformedDirective { span: Span, directive: String },
    #[error("unknown preprocessor directive '{name}'")]
    UnknownDirective { span: Span, name: String },
    #[error("'{name}' redefined with a different replacement list")]
    IncompatibleRedefinition { span: Span, name: String },
    #[error("macro '{name}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        span: Span,
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("'##' paste does not form a single valid token")]
    InvalidPaste { span: Span },
    #[error("#include could not resolve '{target}'")]
    IncludeNotFound { span: Span, target: String },
    #[error("#error {message}")]
    UserError { span: Span, message: String },
    #[error("{message}")]
    Io { span: Span, message: String },
}

impl PreprocessError {
    pub fn span(&self) -> Span {
        match self {
            PreprocessError::UnterminatedConditional { span, .. }
            | PreprocessError::UnmatchedEndif { span }
            | PreprocessError::UnmatchedElse { span }
            | PreprocessError::DuplicateElse { span }
            | PreprocessError::MalformedDirective { span, .. }
            | PreprocessError::UnknownDirective { span, .. }
            | PreprocessError::IncompatibleRedefinition { span, .. }
            | PreprocessError::ArityMismatch { span, .. }
            | PreprocessError::InvalidPaste { span }
            | PreprocessError::IncludeNotFound { span, .. }
            | PreprocessError::UserError { span, .. }
            | PreprocessError::Io { span, .. } => *span,
        }
    }
}

/// Parser failures (§7): missing expected tokens, the typedef problem,
/// duplicate declarations, malformed declarators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    ExpectedToken {
        span: Span,
        expected: String,
        found: String,
    },
    #[error("expected expression")]
    ExpectedExpression { span: Span },
    #[error("undefined variable '{name}'")]
    UndefinedVariable { span: Span, name: String },
    #[error("'{name}' is a variable, not a type")]
    NotAType { span: Span, name: String, hint: Option<String> },
    #[error("duplicate declaration of '{name}' in this scope")]
    DuplicateDeclaration { span: Span, name: String, previous: Span },
    #[error("use of undeclared tag '{name}'")]
    UndeclaredTag { span: Span, name: String },
    #[error("qualifier '{qualifier}' in an invalid position")]
    MisplacedQualifier { span: Span, qualifier: String },
    #[error("malformed declarator")]
    MalformedDeclarator { span: Span },
    #[error("'{name}' names a tag; use '{tag_keyword} {name}'")]
    TagRequired {
        span: Span,
        name: String,
        tag_keyword: &'static str,
    },
    #[error("undefined type '{name}'")]
    UndefinedType { span: Span, name: String },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::ExpectedToken { span, .. }
            | ParseError::ExpectedExpression { span }
            | ParseError::UndefinedVariable { span, .. }
            | ParseError::NotAType { span, .. }
            | ParseError::DuplicateDeclaration { span, .. }
            | ParseError::UndeclaredTag { span, .. }
            | ParseError::MisplacedQualifier { span, .. }
            | ParseError::MalformedDeclarator { span }
            | ParseError::TagRequired { span, .. }
            | ParseError::UndefinedType { span, .. } => *span,
        }
    }
}

/// Fatal, whole-translation-unit failures: failed I/O at load time, or an
/// internal invariant violation. Everything else is recoverable and goes
/// through [`Diagnostics`] instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileId;
    use crate::location::Location;

    fn span() -> Span {
        let loc = Location {
            file_id: FileId(0),
            byte_index: 0,
            line: 0,
            column: 0,
        };
        Span::new(loc, loc)
    }

    #[test]
    fn diagnostics_tracks_error_and_warning_counts() {
        let mut diags = Diagnostics::new();
        diags.error(span(), "bad thing");
        diags.warning(span(), "heads up");
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert!(diags.has_errors());
    }

    #[test]
    fn no_errors_on_empty_sink() {
        let diags = Diagnostics::new();
        assert!(!diags.has_errors());
        assert_eq!(diags.entries().len(), 0);
    }

    #[test]
    fn error_in_expansion_records_secondary_span() {
        let mut diags = Diagnostics::new();
        diags.error_in_expansion(span(), span(), "bad paste");
        assert!(diags.entries()[0].expansion_span.is_some());
    }

    #[test]
    fn lex_error_display_matches_message() {
        let e = LexError::UnterminatedComment { span: span() };
        assert_eq!(e.to_string(), "unterminated block comment");
    }

    #[test]
    fn arity_mismatch_interpolates_fields() {
        let e = PreprocessError::ArityMismatch {
            span: span(),
            name: "FOO".to_string(),
            expected: 2,
            got: 1,
        };
        assert_eq!(e.to_string(), "macro 'FOO' expects 2 argument(s), got 1");
    }
}
