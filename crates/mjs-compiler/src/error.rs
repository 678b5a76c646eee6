//! Compiler error taxonomy.
//!
//! Hand-rolled rather than reaching for `thiserror`: a plain enum plus a
//! `Display` impl is enough for a library whose only consumer formats
//! the message and line number into one string.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// Ill-formed source: duplicate label, duplicate strict-mode formal,
    /// `delete` of a bare identifier in strict mode, assignment to
    /// `eval`/`arguments` in strict mode, `return` outside a function,
    /// `with` in strict mode, an unresolved break/continue label, etc.
    Syntax,
    /// Recursion depth exceeded; an operand index out of range when
    /// shuffling is prohibited or impossible; too many constants, inner
    /// functions, or temp registers.
    Range,
    /// Invariant violation during ivalue/ispec coercion — a
    /// should-not-happen path.
    Internal,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompileErrorKind::Syntax => "SyntaxError",
            CompileErrorKind::Range => "RangeError",
            CompileErrorKind::Internal => "InternalError",
        };
        write!(f, "{s}")
    }
}

/// A compilation error. `line` is filled in by whichever call site knows
/// the current token's line; if it's still `None` when the error crosses
/// the top-level driver's protected-call boundary, the driver fills it
/// in from the lexer's last-known line and attaches a `(line N)` suffix.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub line: Option<u32>,
}

impl CompileError {
    pub fn syntax(message: impl Into<String>, line: u32) -> Self {
        CompileError {
            kind: CompileErrorKind::Syntax,
            message: message.into(),
            line: Some(line),
        }
    }

    pub fn range(message: impl Into<String>, line: u32) -> Self {
        CompileError {
            kind: CompileErrorKind::Range,
            message: message.into(),
            line: Some(line),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompileError {
            kind: CompileErrorKind::Internal,
            message: message.into(),
            line: None,
        }
    }

    /// Annotate with a line number if one isn't already attached. Used by
    /// the top-level driver's protected call.
    pub fn with_line_if_missing(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}: {} (line {})", self.kind, self.message, line),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<mjs_lexer::LexError> for CompileError {
    fn from(e: mjs_lexer::LexError) -> Self {
        CompileError::syntax(e.message, e.line)
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_line() {
        let e = CompileError::syntax("unexpected token", 3);
        assert_eq!(e.to_string(), "SyntaxError: unexpected token (line 3)");
    }

    #[test]
    fn with_line_if_missing_only_fills_blank_line() {
        let e = CompileError::internal("bad ivalue").with_line_if_missing(7);
        assert_eq!(e.line, Some(7));
        let e2 = CompileError::syntax("oops", 1).with_line_if_missing(99);
        assert_eq!(e2.line, Some(1));
    }
}
