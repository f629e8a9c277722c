//! Error handling for the BIQL lexer, parser, and evaluator.
//!
//! This module provides error types and utilities for representing and
//! displaying lex/parse errors with source location information. Evaluation
//! itself never produces an `Error` (see `evaluator`): a runtime mismatch
//! degrades to `false`/`null` rather than raising.

use std::fmt;
use thiserror::Error;

/// A position in the source query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// The kind of error produced while lexing a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("unterminated string literal")]
    UnterminatedString,
}

/// The kind of error produced while parsing a token stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("expected a field path")]
    ExpectedField,
    #[error("expected an expression")]
    ExpectedExpression,
    #[error("duplicate aggregate column '{0}'; give it an explicit AS alias")]
    DuplicateAggregateColumn(String),
    #[error("invalid syntax: {0}")]
    InvalidSyntax(String),
}

/// Top-level error type shared by the lexer, parser, and the external
/// dataset provider.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("lex error at {span}: {kind}")]
    Lex { kind: LexErrorKind, span: Span },

    #[error("parse error at {span}: {kind}")]
    Parse { kind: ParseErrorKind, span: Span },

    /// Raised by the external dataset provider, never by this crate.
    #[error("dataset error: {0}")]
    Dataset(String),
}

impl Error {
    pub fn lex(kind: LexErrorKind, span: Span) -> Self {
        Error::Lex { kind, span }
    }

    pub fn parse(kind: ParseErrorKind, span: Span) -> Self {
        Error::Parse { kind, span }
    }

    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Error::parse(
            ParseErrorKind::UnexpectedToken {
                expected: expected.into(),
                found: found.into(),
            },
            span,
        )
    }
}

/// A specialized `Result` type for BIQL lex/parse operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_display() {
        let span = Span::new(1, 5);
        assert_eq!(span.to_string(), "line 1, column 5");
    }

    #[test]
    fn lex_error_display() {
        let err = Error::lex(LexErrorKind::UnexpectedCharacter('$'), Span::new(1, 3));
        let msg = err.to_string();
        assert!(msg.contains("unexpected character"));
        assert!(msg.contains('$'));
    }

    #[test]
    fn parse_error_display() {
        let err = Error::unexpected_token("IDENTIFIER", "keyword SELECT", Span::new(2, 1));
        let msg = err.to_string();
        assert!(msg.contains("expected IDENTIFIER"));
    }
}
