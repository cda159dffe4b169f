//! Parses the s-expression surface syntax of an SMT leaf (§4.4, §4.5, §6 `"(" sexpr ")"`) into an
//! [`SmtExpr`], deferring identifier resolution to the caller so that XPath shorthands and
//! default bindings are handled in one place ([`crate::parser::grammar_parser`]).

use crate::parser::cursor::Cursor;
use crate::parser::errors::SyntaxError;
use crate::parser::tokenizer::Token;
use crate::smt::SmtExpr;
use crate::variable::Variable;

/// Parses one s-expression starting at the cursor's current position (either `(`-delimited
/// application or a single atom). Whenever a bare identifier is encountered in value position
/// (not `true`/`false`, and not an operator symbol in head position), `resolve_expr` is invoked
/// with the cursor positioned right before it; it must consume exactly that `expr` (`ID ("."
/// NT)*`, §6) and return the [`Variable`] it resolves to.
pub fn parse_sexpr(
    cursor: &mut Cursor,
    resolve_expr: &mut dyn FnMut(&mut Cursor) -> Result<Variable, SyntaxError>,
) -> Result<SmtExpr, SyntaxError> {
    match cursor.peek() {
        Some(Token::LParen) => {
            cursor.advance();
            let symbol = parse_operator_symbol(cursor)?;
            let mut args = Vec::new();
            loop {
                match cursor.peek() {
                    Some(Token::RParen) => {
                        cursor.advance();
                        break;
                    }
                    None => {
                        let (line, column) = cursor.here();
                        return Err(SyntaxError::new("unterminated SMT expression", line, column, String::new()));
                    }
                    Some(_) => args.push(parse_sexpr(cursor, resolve_expr)?),
                }
            }
            Ok(SmtExpr::app(symbol, args))
        }
        Some(Token::Str(s)) => {
            let s = s.clone();
            cursor.advance();
            Ok(SmtExpr::Str(s))
        }
        Some(Token::Int(i)) => {
            let i = *i;
            cursor.advance();
            Ok(SmtExpr::Int(i))
        }
        Some(Token::Ident(name)) if name == "true" => {
            cursor.advance();
            Ok(SmtExpr::Bool(true))
        }
        Some(Token::Ident(name)) if name == "false" => {
            cursor.advance();
            Ok(SmtExpr::Bool(false))
        }
        Some(Token::Ident(_)) | Some(Token::Nonterminal(_)) => Ok(SmtExpr::var(resolve_expr(cursor)?)),
        _ => {
            let (line, column) = cursor.here();
            Err(SyntaxError::new("expected an SMT value", line, column, String::new()))
        }
    }
}

/// Reads an operator symbol, joining dot-separated identifier runs back into one name (`str`
/// `.` `++` -> `"str.++"`) since the main tokenizer lexes the main language's `.` (XPath access)
/// and SMT theory symbols with the same token.
fn parse_operator_symbol(cursor: &mut Cursor) -> Result<String, SyntaxError> {
    let mut symbol = match cursor.advance() {
        Some(spanned) => match &spanned.token {
            Token::Ident(name) => name.clone(),
            _ => return Err(SyntaxError::new("expected an operator symbol", spanned.line, spanned.column, String::new())),
        },
        None => return Err(SyntaxError::new("expected an operator symbol", 1, 1, String::new())),
    };

    while matches!(cursor.peek(), Some(Token::Dot)) {
        cursor.advance();
        match cursor.advance() {
            Some(spanned) => match &spanned.token {
                Token::Ident(name) => {
                    symbol.push('.');
                    symbol.push_str(name);
                }
                _ => return Err(SyntaxError::new("expected an operator symbol segment", spanned.line, spanned.column, String::new())),
            },
            None => {
                let (line, column) = cursor.here();
                return Err(SyntaxError::new("expected an operator symbol segment", line, column, String::new()));
            }
        }
    }

    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenizer::tokenize;

    fn no_vars(_: &mut Cursor) -> Result<Variable, SyntaxError> {
        panic!("test expression has no free identifiers")
    }

    #[test]
    fn parses_a_simple_equality() {
        let tokens = tokenize(r#"(= 1 1)"#).unwrap();
        let mut cursor = Cursor::new(&tokens);
        let expr = parse_sexpr(&mut cursor, &mut no_vars).unwrap();
        assert_eq!(expr, SmtExpr::app("=", vec![SmtExpr::Int(1), SmtExpr::Int(1)]));
        assert!(cursor.at_end());
    }

    #[test]
    fn joins_dotted_operator_symbols() {
        let tokens = tokenize(r#"(str.++ "a" "b")"#).unwrap();
        let mut cursor = Cursor::new(&tokens);
        let expr = parse_sexpr(&mut cursor, &mut no_vars).unwrap();
        assert_eq!(
            expr,
            SmtExpr::app("str.++", vec![SmtExpr::Str("a".to_string()), SmtExpr::Str("b".to_string())])
        );
    }

    #[test]
    fn resolves_bare_identifiers_through_the_callback() {
        let tokens = tokenize(r#"(= x "a")"#).unwrap();
        let mut cursor = Cursor::new(&tokens);
        let mut resolve = |cursor: &mut Cursor| {
            cursor.advance();
            Ok(Variable::bound("x", "<var>"))
        };
        let expr = parse_sexpr(&mut cursor, &mut resolve).unwrap();
        assert_eq!(
            expr,
            SmtExpr::app("=", vec![SmtExpr::var(Variable::bound("x", "<var>")), SmtExpr::Str("a".to_string())])
        );
    }
}
