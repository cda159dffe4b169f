//! A minimal in-crate stand-in for the external SMT decision procedure (§1.1, §4.5, §9).
//!
//! The formula AST treats an SMT leaf as an opaque value it can do exactly five things with:
//! pull out its free symbols, substitute a tree string in for a variable, push a negation
//! through it, ask whether a ground instance is valid, and print it back out as an s-expression.
//! Everything here exists to support those five operations over a small theory of strings,
//! integers and booleans — it is not a general-purpose solver and never attempts search over
//! unbound variables.

use crate::variable::Variable;
use std::collections::HashSet;
use std::fmt;

/// A ground value produced by [`SmtExpr::eval`].
#[derive(Clone, Debug, PartialEq)]
pub enum SmtValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for SmtValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SmtValue::Str(s) => write!(f, "\"{s}\""),
            SmtValue::Int(i) => write!(f, "{i}"),
            SmtValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// An s-expression over the small theory this adapter understands.
#[derive(Clone, Debug, PartialEq)]
pub enum SmtExpr {
    Var(Variable),
    Str(String),
    Int(i64),
    Bool(bool),
    /// Function or predicate application, e.g. `App("str.++", [a, b])` for string concatenation.
    App(String, Vec<SmtExpr>),
}

impl SmtExpr {
    pub fn var(v: Variable) -> Self {
        SmtExpr::Var(v)
    }

    pub fn app(symbol: impl Into<String>, args: Vec<SmtExpr>) -> Self {
        SmtExpr::App(symbol.into(), args)
    }

    /// Every [`Variable`] referenced anywhere in this expression (symbol extraction).
    pub fn free_variables(&self) -> HashSet<Variable> {
        let mut result = HashSet::new();
        self.collect_free_variables(&mut result);
        result
    }

    fn collect_free_variables(&self, out: &mut HashSet<Variable>) {
        match self {
            SmtExpr::Var(v) => {
                out.insert(v.clone());
            }
            SmtExpr::Str(_) | SmtExpr::Int(_) | SmtExpr::Bool(_) => {}
            SmtExpr::App(_, args) => {
                for arg in args {
                    arg.collect_free_variables(out);
                }
            }
        }
    }

    /// Replaces every occurrence of a variable with the expression given for it. Variables with
    /// no entry in `substitution` are left untouched, matching the deferred-substitution model
    /// of §4.5/§9: a variable tied to a tree that is still open simply has no substitution yet.
    pub fn substitute(&self, substitution: &std::collections::HashMap<Variable, SmtExpr>) -> SmtExpr {
        match self {
            SmtExpr::Var(v) => substitution.get(v).cloned().unwrap_or_else(|| self.clone()),
            SmtExpr::Str(_) | SmtExpr::Int(_) | SmtExpr::Bool(_) => self.clone(),
            SmtExpr::App(symbol, args) => {
                SmtExpr::App(symbol.clone(), args.iter().map(|a| a.substitute(substitution)).collect())
            }
        }
    }

    /// Pushes a negation one level in, using De Morgan's laws and relation complements, instead
    /// of leaving a bare `(not ...)` wrapper. Used by normal-form conversion (§4.4) to keep
    /// negation at the leaves.
    pub fn negate(&self) -> SmtExpr {
        match self {
            SmtExpr::App(op, args) if op == "not" && args.len() == 1 => args[0].clone(),
            SmtExpr::App(op, args) if op == "and" => {
                SmtExpr::app("or", args.iter().map(SmtExpr::negate).collect())
            }
            SmtExpr::App(op, args) if op == "or" => {
                SmtExpr::app("and", args.iter().map(SmtExpr::negate).collect())
            }
            SmtExpr::App(op, args) if args.len() == 2 => {
                if let Some(complement) = complement_relation(op) {
                    SmtExpr::app(complement, args.clone())
                } else {
                    SmtExpr::app("not", vec![self.clone()])
                }
            }
            SmtExpr::Bool(b) => SmtExpr::Bool(!b),
            _ => SmtExpr::app("not", vec![self.clone()]),
        }
    }

    /// Evaluates a ground expression (no free variables) against the small theory.
    pub fn eval(&self) -> Result<SmtValue, String> {
        match self {
            SmtExpr::Var(v) => Err(format!("cannot evaluate unbound variable '{}'", v.name)),
            SmtExpr::Str(s) => Ok(SmtValue::Str(s.clone())),
            SmtExpr::Int(i) => Ok(SmtValue::Int(*i)),
            SmtExpr::Bool(b) => Ok(SmtValue::Bool(*b)),
            SmtExpr::App(op, args) => eval_app(op, args),
        }
    }

    /// Evaluates the expression and checks the result is `true` (the only question the core ever
    /// asks the SMT backend: is this ground formula valid).
    pub fn is_valid(&self) -> Result<bool, String> {
        match self.eval()? {
            SmtValue::Bool(b) => Ok(b),
            other => Err(format!("expected a boolean result, got {other}")),
        }
    }

    /// Prints the expression back out in s-expression form.
    pub fn to_sexpr_string(&self) -> String {
        match self {
            SmtExpr::Var(v) => v.name.clone(),
            SmtExpr::Str(s) => format!("\"{s}\""),
            SmtExpr::Int(i) => i.to_string(),
            SmtExpr::Bool(b) => b.to_string(),
            SmtExpr::App(op, args) if args.is_empty() => op.clone(),
            SmtExpr::App(op, args) => {
                let rendered: Vec<String> = args.iter().map(SmtExpr::to_sexpr_string).collect();
                format!("({op} {})", rendered.join(" "))
            }
        }
    }
}

fn complement_relation(op: &str) -> Option<&'static str> {
    Some(match op {
        "=" => "distinct",
        "distinct" => "=",
        "<" => ">=",
        ">=" => "<",
        ">" => "<=",
        "<=" => ">",
        _ => return None,
    })
}

fn eval_app(op: &str, args: &[SmtExpr]) -> Result<SmtValue, String> {
    let values: Result<Vec<SmtValue>, String> = args.iter().map(SmtExpr::eval).collect();
    let values = values?;

    match (op, values.as_slice()) {
        ("not", [SmtValue::Bool(b)]) => Ok(SmtValue::Bool(!b)),
        ("and", rest) => Ok(SmtValue::Bool(rest.iter().all(|v| matches!(v, SmtValue::Bool(true))))),
        ("or", rest) => Ok(SmtValue::Bool(rest.iter().any(|v| matches!(v, SmtValue::Bool(true))))),
        ("=>", [SmtValue::Bool(a), SmtValue::Bool(b)]) => Ok(SmtValue::Bool(!a || *b)),
        ("=", [a, b]) => Ok(SmtValue::Bool(a == b)),
        ("distinct", [a, b]) => Ok(SmtValue::Bool(a != b)),
        ("ite", [SmtValue::Bool(c), t, e]) => Ok(if *c { t.clone() } else { e.clone() }),
        ("str.++", rest) => {
            let mut out = String::new();
            for v in rest {
                match v {
                    SmtValue::Str(s) => out.push_str(s),
                    other => return Err(format!("str.++ expects strings, got {other}")),
                }
            }
            Ok(SmtValue::Str(out))
        }
        ("str.len", [SmtValue::Str(s)]) => Ok(SmtValue::Int(s.chars().count() as i64)),
        ("str.substr", [SmtValue::Str(s), SmtValue::Int(start), SmtValue::Int(len)]) => {
            let chars: Vec<char> = s.chars().collect();
            let start = (*start).max(0) as usize;
            let len = (*len).max(0) as usize;
            let end = (start + len).min(chars.len());
            let substr = if start >= chars.len() {
                String::new()
            } else {
                chars[start..end].iter().collect()
            };
            Ok(SmtValue::Str(substr))
        }
        ("str.to.int", [SmtValue::Str(s)]) => match s.trim().parse::<i64>() {
            Ok(i) => Ok(SmtValue::Int(i)),
            Err(_) => Ok(SmtValue::Int(-1)),
        },
        ("str.in_re_prefix", [SmtValue::Str(a), SmtValue::Str(b)]) => Ok(SmtValue::Bool(a.starts_with(b.as_str()))),
        ("<", [SmtValue::Int(a), SmtValue::Int(b)]) => Ok(SmtValue::Bool(a < b)),
        ("<=", [SmtValue::Int(a), SmtValue::Int(b)]) => Ok(SmtValue::Bool(a <= b)),
        (">", [SmtValue::Int(a), SmtValue::Int(b)]) => Ok(SmtValue::Bool(a > b)),
        (">=", [SmtValue::Int(a), SmtValue::Int(b)]) => Ok(SmtValue::Bool(a >= b)),
        ("+", [SmtValue::Int(a), SmtValue::Int(b)]) => Ok(SmtValue::Int(a + b)),
        ("-", [SmtValue::Int(a), SmtValue::Int(b)]) => Ok(SmtValue::Int(a - b)),
        _ => Err(format!("unsupported or ill-typed application '{op}' with {} argument(s)", values.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Variable;

    #[test]
    fn free_variables_collects_every_occurrence_once() {
        let x = Variable::bound("x", "<var>");
        let expr = SmtExpr::app("=", vec![SmtExpr::var(x.clone()), SmtExpr::var(x.clone())]);
        let vars = expr.free_variables();
        assert_eq!(vars.len(), 1);
        assert!(vars.contains(&x));
    }

    #[test]
    fn substitute_replaces_bound_occurrences_and_evaluates() {
        let x = Variable::bound("x", "<var>");
        let expr = SmtExpr::app("=", vec![SmtExpr::var(x.clone()), SmtExpr::Str("5".to_string())]);
        let mut subst = std::collections::HashMap::new();
        subst.insert(x, SmtExpr::Str("5".to_string()));
        let grounded = expr.substitute(&subst);
        assert_eq!(grounded.is_valid(), Ok(true));
    }

    #[test]
    fn negate_pushes_through_equality_and_conjunction() {
        let eq = SmtExpr::app("=", vec![SmtExpr::Int(1), SmtExpr::Int(2)]);
        assert_eq!(eq.negate(), SmtExpr::app("distinct", vec![SmtExpr::Int(1), SmtExpr::Int(2)]));

        let conj = SmtExpr::app(
            "and",
            vec![SmtExpr::Bool(true), SmtExpr::app("<", vec![SmtExpr::Int(1), SmtExpr::Int(2)])],
        );
        let negated = conj.negate();
        assert_eq!(
            negated,
            SmtExpr::app("or", vec![SmtExpr::Bool(false), SmtExpr::app(">=", vec![SmtExpr::Int(1), SmtExpr::Int(2)])])
        );
    }

    #[test]
    fn str_len_and_concat_evaluate_correctly() {
        let expr = SmtExpr::app(
            "=",
            vec![
                SmtExpr::app("str.len", vec![SmtExpr::app("str.++", vec![SmtExpr::Str("ab".into()), SmtExpr::Str("cd".into())])]),
                SmtExpr::Int(4),
            ],
        );
        assert_eq!(expr.is_valid(), Ok(true));
    }

    #[test]
    fn to_sexpr_string_round_trips_shape() {
        let expr = SmtExpr::app("=", vec![SmtExpr::Int(1), SmtExpr::Int(1)]);
        assert_eq!(expr.to_sexpr_string(), "(= 1 1)");
    }

    #[test]
    fn eval_on_unbound_variable_fails() {
        let x = Variable::bound("x", "<var>");
        assert!(SmtExpr::var(x).eval().is_err());
    }
}
