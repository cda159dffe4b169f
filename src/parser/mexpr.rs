//! The match-expression sub-grammar (§4.4, §6): parses the pattern text introduced by `="..."`
//! into the `Vec<BoundElement>` a [`crate::bind_expression::BindExpression`] is built from.
//!
//! `{<nt> id}` binds a variable, `[...]` marks an optional group, `{{`/`}}` escape literal braces,
//! and any other run of characters becomes a fixed terminal dummy.

use crate::bind_expression::BoundElement;
use crate::parser::errors::SyntaxError;
use crate::variable::Variable;
use std::iter::Peekable;
use std::str::Chars;

/// Parses `pattern` (the already-unescaped `\"` content of a match-expression string) into its
/// bound elements. `line`/`column` locate the owning string literal, for error reporting.
pub fn parse_bind_expression(pattern: &str, line: usize, column: usize) -> Result<Vec<BoundElement>, SyntaxError> {
    let mut chars = pattern.chars().peekable();
    let elements = parse_elements(&mut chars, line, column, false)?;
    Ok(elements)
}

fn parse_elements(
    chars: &mut Peekable<Chars>,
    line: usize,
    column: usize,
    inside_optional: bool,
) -> Result<Vec<BoundElement>, SyntaxError> {
    let mut elements = Vec::new();
    let mut literal = String::new();

    macro_rules! flush_literal {
        () => {
            if !literal.is_empty() {
                elements.push(BoundElement::Variable(Variable::dummy(std::mem::take(&mut literal))));
            }
        };
    }

    while let Some(&c) = chars.peek() {
        match c {
            '{' => {
                chars.next();
                if chars.peek() == Some(&'{') {
                    chars.next();
                    literal.push('{');
                    continue;
                }
                flush_literal!();
                elements.push(parse_binding(chars, line, column)?);
            }
            '}' if chars.clone().nth(1) == Some('}') => {
                chars.next();
                chars.next();
                literal.push('}');
            }
            ']' if inside_optional => break,
            '[' => {
                chars.next();
                flush_literal!();
                let inner = parse_elements(chars, line, column, true)?;
                match chars.next() {
                    Some(']') => {}
                    _ => return Err(SyntaxError::new("unterminated optional group", line, column, "[".to_string())),
                }
                elements.push(BoundElement::Optional(inner));
            }
            other => {
                chars.next();
                literal.push(other);
            }
        }
    }

    flush_literal!();
    Ok(elements)
}

/// Parses the inside of a `{...}` binding: `<nt>` followed by whitespace and an identifier name.
fn parse_binding(chars: &mut Peekable<Chars>, line: usize, column: usize) -> Result<BoundElement, SyntaxError> {
    let mut nt = String::new();
    match chars.next() {
        Some('<') => nt.push('<'),
        _ => return Err(SyntaxError::new("expected a nonterminal inside '{...}'", line, column, nt)),
    }
    loop {
        match chars.next() {
            Some('>') => {
                nt.push('>');
                break;
            }
            Some(c) => nt.push(c),
            None => return Err(SyntaxError::new("unterminated nonterminal in match expression", line, column, nt)),
        }
    }

    while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
        chars.next();
    }

    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c == '}' {
            break;
        }
        name.push(c);
        chars.next();
    }
    match chars.next() {
        Some('}') => {}
        _ => return Err(SyntaxError::new("unterminated binding in match expression", line, column, nt)),
    }

    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(SyntaxError::new("binding is missing a variable name", line, column, nt));
    }
    Ok(BoundElement::Variable(Variable::bound(name, nt)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bindings_and_literal_dummies() {
        let elements = parse_bind_expression("{<var> l1} := {<rhs> r1}", 1, 1).unwrap();
        assert_eq!(elements.len(), 3);
        match &elements[0] {
            BoundElement::Variable(v) => {
                assert_eq!(v.name, "l1");
                assert_eq!(v.n_type, "<var>");
            }
            _ => panic!("expected a variable"),
        }
        match &elements[1] {
            BoundElement::Variable(v) => assert_eq!(v.n_type, " := "),
            _ => panic!("expected a dummy"),
        }
    }

    #[test]
    fn parses_a_trailing_optional_group() {
        let elements = parse_bind_expression("{<var> l1}[!]", 1, 1).unwrap();
        assert_eq!(elements.len(), 2);
        assert!(matches!(elements[1], BoundElement::Optional(_)));
    }

    #[test]
    fn escaped_braces_become_literal_text() {
        let elements = parse_bind_expression("{{literal}}", 1, 1).unwrap();
        assert_eq!(elements.len(), 1);
        match &elements[0] {
            BoundElement::Variable(v) => assert_eq!(v.n_type, "{literal}"),
            _ => panic!("expected a dummy"),
        }
    }
}
