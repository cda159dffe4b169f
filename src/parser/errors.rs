//! The parser's single structured error type (§7 "Error handling design").

use std::error::Error;
use std::fmt;

/// A surface parse error: a malformed token stream, an unknown predicate, an arity mismatch, a
/// redeclared variable, or an SMT sub-expression the adapter rejected (re-raised here with the
/// offending text, per §7's "SMT parse error... translated to surface parse error").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub offending_text: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize, column: usize, offending_text: impl Into<String>) -> Self {
        SyntaxError {
            message: message.into(),
            line,
            column,
            offending_text: offending_text.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at {}:{}: {}", self.message, self.line, self.column, self.offending_text)
    }
}

impl Error for SyntaxError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_the_documented_format() {
        let err = SyntaxError::new("unknown predicate", 3, 12, "frobnicate(a, b)");
        assert_eq!(err.to_string(), "unknown predicate at 3:12: frobnicate(a, b)");
    }
}
