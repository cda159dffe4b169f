//! The inverse of [`crate::parser::grammar_parser`]: renders a [`Formula`] back to the surface
//! syntax of §6. Round-tripping is structural, not textual: `parse(unparse(f))` produces a formula
//! equal to `f` up to quantifier bound-variable naming and whitespace, not byte-identical source.
//!
//! A quantifier is wrapped in parentheses whenever it appears as one of several conjuncts or
//! disjuncts, since `"forall" ... ":" formula` otherwise extends as far right as the grammar
//! allows and would swallow the rest of an unparenthesized `and`/`or` chain on reparse.

use crate::formula::node::{ExistsData, ForallData};
use crate::formula::predicate::PredicateArg;
use crate::formula::Formula;
use crate::variable::Variable;

/// Default indent width (in spaces) per nesting level.
const DEFAULT_INDENT: usize = 2;

/// Renders `formula` with an explicit `const` header naming `const_variable`, using the default
/// indent width.
pub fn unparse(formula: &Formula, const_variable: &Variable) -> String {
    unparse_with_indent(formula, const_variable, DEFAULT_INDENT)
}

pub fn unparse_with_indent(formula: &Formula, const_variable: &Variable, indent_width: usize) -> String {
    let mut out = format!("const {}: {};\n", const_variable.name, const_variable.n_type);
    out.push_str(&render(formula, 0, indent_width, true));
    out.push('\n');
    out
}

fn pad(depth: usize, indent_width: usize) -> String {
    " ".repeat(depth * indent_width)
}

/// Renders `formula` standing alone (not as one of several combinator operands), so a top-level
/// quantifier never needs wrapping parentheses.
fn render(formula: &Formula, depth: usize, indent_width: usize, is_top: bool) -> String {
    match formula {
        Formula::True => "true".to_string(),
        Formula::False => "false".to_string(),
        Formula::Smt(leaf) => leaf.expr.to_sexpr_string(),
        Formula::StructuralPredicate { predicate, args } => render_call(predicate.name, args),
        Formula::SemanticPredicate { predicate, args } => render_call(predicate.name, args),
        Formula::Negated(inner) => format!("not({})", render(inner, depth, indent_width, true)),
        Formula::Conjunctive(parts) => render_combinator(parts, "and", depth, indent_width),
        Formula::Disjunctive(parts) => render_combinator(parts, "or", depth, indent_width),
        Formula::Forall(data) => wrap_unless_top(render_forall(data, depth, indent_width), is_top),
        Formula::Exists(data) => wrap_unless_top(render_exists(data, depth, indent_width), is_top),
        Formula::ForallInt { bound_variable, inner } => {
            wrap_unless_top(render_int_quantifier("forall", bound_variable, inner, depth, indent_width), is_top)
        }
        Formula::ExistsInt { bound_variable, inner } => {
            wrap_unless_top(render_int_quantifier("exists", bound_variable, inner, depth, indent_width), is_top)
        }
    }
}

fn wrap_unless_top(rendered: String, is_top: bool) -> String {
    if is_top {
        rendered
    } else {
        format!("({rendered})")
    }
}

fn is_quantifier(formula: &Formula) -> bool {
    matches!(formula, Formula::Forall(_) | Formula::Exists(_) | Formula::ForallInt { .. } | Formula::ExistsInt { .. })
}

/// `and`/`or` both bind tighter than nothing, but since our recursive-descent parser treats `and`
/// as tighter than `or`, an `or` nested directly inside an `and`'s operand list needs explicit
/// parentheses to reparse with the same grouping; `and` nested inside `or` does not.
fn render_combinator(parts: &[Formula], keyword: &str, depth: usize, indent_width: usize) -> String {
    let rendered: Vec<String> = parts
        .iter()
        .map(|part| {
            let needs_parens = is_quantifier(part) || (keyword == "and" && matches!(part, Formula::Disjunctive(_)));
            let text = render(part, depth, indent_width, true);
            if needs_parens {
                format!("({text})")
            } else {
                text
            }
        })
        .collect();
    rendered.join(&format!(" {keyword} "))
}

fn render_call(name: &str, args: &[PredicateArg]) -> String {
    let rendered: Vec<String> = args
        .iter()
        .map(|arg| match arg {
            PredicateArg::Variable(v) => v.to_string(),
            PredicateArg::Tree(tree) => format!("\"{}\"", tree.to_display_string(false)),
        })
        .collect();
    format!("{name}({})", rendered.join(", "))
}

fn render_forall(data: &ForallData, depth: usize, indent_width: usize) -> String {
    render_quantifier_header("forall", &data.bound_variable, &data.in_variable, data.bind_expression.as_ref(), &data.inner, depth, indent_width)
}

fn render_exists(data: &ExistsData, depth: usize, indent_width: usize) -> String {
    render_quantifier_header("exists", &data.bound_variable, &data.in_variable, data.bind_expression.as_ref(), &data.inner, depth, indent_width)
}

fn render_quantifier_header(
    keyword: &str,
    bound_variable: &Variable,
    in_variable: &Variable,
    bind_expression: Option<&crate::bind_expression::BindExpression>,
    inner: &Formula,
    depth: usize,
    indent_width: usize,
) -> String {
    let mut header = format!("{keyword} {} {}", bound_variable.n_type, bound_variable.name);
    if let Some(bind) = bind_expression {
        header.push_str(&format!("=\"{bind}\""));
    }
    header.push_str(&format!(" in {}", in_variable.name));
    header.push(':');
    format!(
        "{header}\n{}{}",
        pad(depth + 1, indent_width),
        render(inner, depth + 1, indent_width, true)
    )
}

fn render_int_quantifier(keyword: &str, bound_variable: &Variable, inner: &Formula, depth: usize, indent_width: usize) -> String {
    format!(
        "{keyword} int {}:\n{}{}",
        bound_variable.name,
        pad(depth + 1, indent_width),
        render(inner, depth + 1, indent_width, true)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::predicate::BEFORE;
    use crate::parser::grammar_parser::parse;
    use crate::grammar::Grammar;
    use std::collections::HashMap;

    fn assignments_grammar() -> Grammar {
        let mut rules = HashMap::new();
        rules.insert("<start>".to_string(), vec!["<assgn>".to_string()]);
        rules.insert("<assgn>".to_string(), vec!["<var> := <rhs>".to_string()]);
        rules.insert("<rhs>".to_string(), vec!["<var>".to_string()]);
        rules.insert("<var>".to_string(), vec!["x".to_string(), "y".to_string()]);
        Grammar::new(rules)
    }

    #[test]
    fn unparse_emits_a_const_header() {
        let start = Variable::constant("start", "<start>");
        let text = unparse(&Formula::True, &start);
        assert!(text.starts_with("const start: <start>;\n"));
        assert!(text.trim_end().ends_with("true"));
    }

    #[test]
    fn round_trips_a_simple_quantified_equality() {
        let grammar = assignments_grammar();
        let outcome = parse(r#"forall <var> v in start: (= v "x")"#, &grammar).unwrap();
        let text = unparse(&outcome.formula, &outcome.start_variable);
        let reparsed = parse(&text, &grammar).unwrap();
        assert_eq!(reparsed.formula, outcome.formula);
    }

    #[test]
    fn parenthesizes_a_quantifier_nested_inside_a_conjunction() {
        let x = Variable::bound("x", "<var>");
        let start = Variable::constant("start", "<start>");
        let quantified = Formula::forall(x.clone(), start.clone(), None, Formula::True);
        let predicate = Formula::structural_predicate(BEFORE, vec![
            crate::formula::predicate::PredicateArg::Variable(x.clone()),
            crate::formula::predicate::PredicateArg::Variable(x),
        ]);
        let conjunction = quantified.and(predicate);
        let text = render(&conjunction, 0, DEFAULT_INDENT, true);
        assert!(text.contains("(forall"));
    }
}
