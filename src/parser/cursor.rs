//! A small read-only cursor over a token slice, shared by [`crate::parser::grammar_parser`] and
//! [`crate::parser::smt_leaf`] so both recursive-descent parsers advance the same way.

use crate::parser::tokenizer::{SpannedToken, Token};

pub struct Cursor<'a> {
    tokens: &'a [SpannedToken],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a [SpannedToken]) -> Self {
        Cursor { tokens, pos: 0 }
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    pub fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn advance(&mut self) -> Option<&'a SpannedToken> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// The position (line, column) of the next token, or of the last token in the stream if the
    /// cursor has run past the end (so an "unexpected end of input" error still points somewhere
    /// useful).
    pub fn here(&self) -> (usize, usize) {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1))
    }
}
