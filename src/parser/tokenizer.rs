//! Tokenizing of constraint-language source text (§6 "Concrete syntax (EBNF sketch)").

use crate::parser::errors::SyntaxError;
use std::iter::Peekable;
use std::str::Chars;

/// Every token kind the grammar_parser consumes. Keywords (`forall`, `and`, ...) are not
/// distinguished at lex time, the same way the teacher's tokenizer leaves proposition names and
/// operator keywords to be told apart by the parser rather than the lexer.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Ident(String),
    Nonterminal(String),
    Str(String),
    Int(i64),
    /// The raw pattern text of a match expression, introduced by `="..."`.
    MatchExprString(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Semicolon,
    Comma,
    Dot,
}

/// A token together with the position of its first character, for [`SyntaxError`] reporting.
#[derive(Clone, Debug, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

/// Tokenizes `source` in full, or fails on the first lexical error with a position-carrying
/// [`SyntaxError`].
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, SyntaxError> {
    let mut chars = source.chars().peekable();
    let mut line = 1usize;
    let mut column = 1usize;
    let mut output = Vec::new();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                advance(&mut chars, &mut line, &mut column);
            }
            '(' => output.push(single(&mut chars, &mut line, &mut column, Token::LParen)),
            ')' => output.push(single(&mut chars, &mut line, &mut column, Token::RParen)),
            '[' => output.push(single(&mut chars, &mut line, &mut column, Token::LBracket)),
            ']' => output.push(single(&mut chars, &mut line, &mut column, Token::RBracket)),
            ':' => output.push(single(&mut chars, &mut line, &mut column, Token::Colon)),
            ';' => output.push(single(&mut chars, &mut line, &mut column, Token::Semicolon)),
            ',' => output.push(single(&mut chars, &mut line, &mut column, Token::Comma)),
            '.' => output.push(single(&mut chars, &mut line, &mut column, Token::Dot)),
            '<' if looks_like_nonterminal(&chars) => output.push(read_nonterminal(&mut chars, &mut line, &mut column)?),
            '<' if peek_is(&chars, 1, '=') => {
                output.push(single(&mut chars, &mut line, &mut column, Token::Ident("<=".to_string())));
                advance(&mut chars, &mut line, &mut column);
            }
            '<' => output.push(single(&mut chars, &mut line, &mut column, Token::Ident("<".to_string()))),
            '>' if peek_is(&chars, 1, '=') => {
                output.push(single(&mut chars, &mut line, &mut column, Token::Ident(">=".to_string())));
                advance(&mut chars, &mut line, &mut column);
            }
            '>' => output.push(single(&mut chars, &mut line, &mut column, Token::Ident(">".to_string()))),
            '"' => output.push(read_string(&mut chars, &mut line, &mut column)?),
            '=' if peek_is(&chars, 1, '"') => output.push(read_equals(&mut chars, &mut line, &mut column)?),
            // A bare `=` (not immediately followed by a quote) is the SMT equality symbol, lexed
            // like any other identifier so `(= a b)` tokenizes the same way predicate names do.
            '=' => output.push(single(&mut chars, &mut line, &mut column, Token::Ident("=".to_string()))),
            '{' if peek_is(&chars, 1, '{') => {
                // `{{` escapes to a literal brace inside match-expression text; outside a match
                // expression it has no meaning, so the grammar_parser is responsible for only
                // calling into match-expression parsing where this is expected.
                output.push(single(&mut chars, &mut line, &mut column, Token::LBrace));
                advance(&mut chars, &mut line, &mut column);
            }
            '{' => output.push(single(&mut chars, &mut line, &mut column, Token::LBrace)),
            '}' if peek_is(&chars, 1, '}') => {
                output.push(single(&mut chars, &mut line, &mut column, Token::RBrace));
                advance(&mut chars, &mut line, &mut column);
            }
            '}' => output.push(single(&mut chars, &mut line, &mut column, Token::RBrace)),
            c if c.is_ascii_digit() => output.push(read_int(&mut chars, &mut line, &mut column)?),
            c if is_ident_start(c) => output.push(read_ident(&mut chars, &mut line, &mut column)),
            // A maximal run of arithmetic-symbol characters becomes one identifier-like token, so
            // that SMT operator symbols such as `str.++` tokenize as `str` `.` `++` (the SMT-leaf
            // parser joins dot-separated runs back into one operator name).
            c if is_symbol_char(c) => output.push(read_symbol_run(&mut chars, &mut line, &mut column)),
            other => {
                let (start_line, start_column) = (line, column);
                advance(&mut chars, &mut line, &mut column);
                return Err(SyntaxError::new(
                    format!("unexpected character '{other}'"),
                    start_line,
                    start_column,
                    other.to_string(),
                ));
            }
        }
    }

    Ok(output)
}

fn peek_is(chars: &Peekable<Chars>, offset: usize, expected: char) -> bool {
    chars.clone().nth(offset) == Some(expected)
}

/// Distinguishes a `<name>` nonterminal token from a bare comparison operator (`<`, `<=`): true
/// when, looking past the leading `<`, there is a run of one or more identifier-ish characters
/// immediately followed by `>`.
fn looks_like_nonterminal(chars: &Peekable<Chars>) -> bool {
    let mut lookahead = chars.clone();
    lookahead.next(); // the leading '<'
    let mut saw_any = false;
    for c in lookahead {
        if c == '>' {
            return saw_any;
        }
        if c.is_alphanumeric() || c == '_' || c == '-' {
            saw_any = true;
        } else {
            return false;
        }
    }
    false
}

fn advance(chars: &mut Peekable<Chars>, line: &mut usize, column: &mut usize) -> Option<char> {
    let c = chars.next()?;
    if c == '\n' {
        *line += 1;
        *column = 1;
    } else {
        *column += 1;
    }
    Some(c)
}

fn single(chars: &mut Peekable<Chars>, line: &mut usize, column: &mut usize, token: Token) -> SpannedToken {
    let spanned = SpannedToken { token, line: *line, column: *column };
    advance(chars, line, column);
    spanned
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_symbol_char(c: char) -> bool {
    matches!(c, '+' | '-' | '*' | '/')
}

fn read_symbol_run(chars: &mut Peekable<Chars>, line: &mut usize, column: &mut usize) -> SpannedToken {
    let (start_line, start_column) = (*line, *column);
    let mut text = String::new();
    while let Some(&c) = chars.peek() {
        if is_symbol_char(c) {
            text.push(c);
            advance(chars, line, column);
        } else {
            break;
        }
    }
    SpannedToken { token: Token::Ident(text), line: start_line, column: start_column }
}

fn read_ident(chars: &mut Peekable<Chars>, line: &mut usize, column: &mut usize) -> SpannedToken {
    let (start_line, start_column) = (*line, *column);
    let mut text = String::new();
    while let Some(&c) = chars.peek() {
        if is_ident_continue(c) {
            text.push(c);
            advance(chars, line, column);
        } else {
            break;
        }
    }
    SpannedToken { token: Token::Ident(text), line: start_line, column: start_column }
}

fn read_int(chars: &mut Peekable<Chars>, line: &mut usize, column: &mut usize) -> Result<SpannedToken, SyntaxError> {
    let (start_line, start_column) = (*line, *column);
    let mut text = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            advance(chars, line, column);
        } else {
            break;
        }
    }
    let value = text
        .parse::<i64>()
        .map_err(|_| SyntaxError::new("malformed integer literal", start_line, start_column, text.clone()))?;
    Ok(SpannedToken { token: Token::Int(value), line: start_line, column: start_column })
}

/// Reads `<name>`, allowing letters, digits, `_` and `-` in the name (e.g. `<xml-open-tag>`).
fn read_nonterminal(chars: &mut Peekable<Chars>, line: &mut usize, column: &mut usize) -> Result<SpannedToken, SyntaxError> {
    let (start_line, start_column) = (*line, *column);
    let mut text = String::new();
    text.push(advance(chars, line, column).expect("caller observed '<'"));

    loop {
        match advance(chars, line, column) {
            Some('>') => {
                text.push('>');
                return Ok(SpannedToken { token: Token::Nonterminal(text), line: start_line, column: start_column });
            }
            Some(c) if c.is_alphanumeric() || c == '_' || c == '-' => text.push(c),
            Some(c) => {
                text.push(c);
                return Err(SyntaxError::new("unterminated nonterminal token", start_line, start_column, text));
            }
            None => return Err(SyntaxError::new("unterminated nonterminal token", start_line, start_column, text)),
        }
    }
}

fn read_escaped_string_body(chars: &mut Peekable<Chars>, line: &mut usize, column: &mut usize) -> Result<String, ()> {
    let mut content = String::new();
    loop {
        match advance(chars, line, column) {
            Some('"') => return Ok(content),
            Some('\\') => match advance(chars, line, column) {
                Some(escaped) => content.push(escaped),
                None => return Err(()),
            },
            Some(c) => content.push(c),
            None => return Err(()),
        }
    }
}

fn read_string(chars: &mut Peekable<Chars>, line: &mut usize, column: &mut usize) -> Result<SpannedToken, SyntaxError> {
    let (start_line, start_column) = (*line, *column);
    advance(chars, line, column); // opening quote
    match read_escaped_string_body(chars, line, column) {
        Ok(content) => Ok(SpannedToken { token: Token::Str(content), line: start_line, column: start_column }),
        Err(()) => Err(SyntaxError::new("unterminated string literal", start_line, start_column, String::new())),
    }
}

/// `=` alone is not a token of this grammar (equality is spelled `(= a b)`); the only place a bare
/// `=` is legal is immediately before a match-expression pattern: `a1="{<var> l1} := {<rhs> r1}"`.
fn read_equals(chars: &mut Peekable<Chars>, line: &mut usize, column: &mut usize) -> Result<SpannedToken, SyntaxError> {
    let (start_line, start_column) = (*line, *column);
    advance(chars, line, column); // '='
    match chars.peek() {
        Some('"') => {
            advance(chars, line, column); // opening quote
            match read_escaped_string_body(chars, line, column) {
                Ok(content) => Ok(SpannedToken {
                    token: Token::MatchExprString(content),
                    line: start_line,
                    column: start_column,
                }),
                Err(()) => Err(SyntaxError::new(
                    "unterminated match-expression string",
                    start_line,
                    start_column,
                    String::new(),
                )),
            }
        }
        _ => Err(SyntaxError::new("expected a string literal after '='", start_line, start_column, "=".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn tokenizes_a_quantifier_header() {
        assert_eq!(
            kinds("forall <var> v in start:"),
            vec![
                Token::Ident("forall".to_string()),
                Token::Nonterminal("<var>".to_string()),
                Token::Ident("v".to_string()),
                Token::Ident("in".to_string()),
                Token::Ident("start".to_string()),
                Token::Colon,
            ]
        );
    }

    #[test]
    fn tokenizes_a_match_expression_string_specially() {
        assert_eq!(
            kinds(r#"a1="{<var> l1} := {<rhs> r1}""#),
            vec![
                Token::Ident("a1".to_string()),
                Token::MatchExprString("{<var> l1} := {<rhs> r1}".to_string()),
            ]
        );
    }

    #[test]
    fn tokenizes_an_smt_sexpr() {
        assert_eq!(
            kinds(r#"(= var_1 "x")"#),
            vec![
                Token::LParen,
                Token::Ident("=".to_string()),
                Token::Ident("var_1".to_string()),
                Token::Str("x".to_string()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn rejects_an_unterminated_string() {
        assert!(tokenize(r#"(= a "b)"#).is_err());
    }

    #[test]
    fn hyphenated_nonterminal_names_are_allowed() {
        assert_eq!(kinds("<xml-open-tag>"), vec![Token::Nonterminal("<xml-open-tag>".to_string())]);
    }

    #[test]
    fn bare_comparison_operators_are_not_mistaken_for_nonterminals() {
        assert_eq!(
            kinds("(< x 3) (<= x 3) (> x 3) (>= x 3)"),
            vec![
                Token::LParen,
                Token::Ident("<".to_string()),
                Token::Ident("x".to_string()),
                Token::Int(3),
                Token::RParen,
                Token::LParen,
                Token::Ident("<=".to_string()),
                Token::Ident("x".to_string()),
                Token::Int(3),
                Token::RParen,
                Token::LParen,
                Token::Ident(">".to_string()),
                Token::Ident("x".to_string()),
                Token::Int(3),
                Token::RParen,
                Token::LParen,
                Token::Ident(">=".to_string()),
                Token::Ident("x".to_string()),
                Token::Int(3),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn dotted_smt_operator_symbols_tokenize_as_ident_dot_ident() {
        assert_eq!(
            kinds("str.++"),
            vec![Token::Ident("str".to_string()), Token::Dot, Token::Ident("++".to_string())]
        );
    }
}
