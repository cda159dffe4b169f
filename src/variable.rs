//! Variable identities used throughout a constraint: free constants, variables bound by
//! quantifiers or match expressions, and anonymous dummy variables used inside match expressions.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Reserved nonterminal type for integer-valued logical variables (`forall int x: ...`).
pub const NUMERIC_NTYPE: &str = "NUM";

static DUMMY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The three variable kinds of the data model (§3 "Variable").
///
/// Equality and hashing are defined on `(kind, name, n_type)` via the derived traits on
/// [`Variable`] itself, not on this tag alone.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum VariableKind {
    /// A free variable ("constant" in the ISLa sense): the subject of a top-level formula.
    Constant,
    /// Bound by an enclosing quantifier or a match expression.
    BoundVariable,
    /// Anonymous; carries a terminal fragment or nonterminal string as `n_type`, auto-numbered
    /// to keep its identity unique among otherwise-identical dummies.
    DummyVariable,
}

/// `{kind, name, n_type}` as specified in §3. Ordering is defined on `name` alone so that
/// variables can be sorted (e.g. for deterministic priority lists), matching the teacher's
/// variable model, which orders on name as well.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Variable {
    pub kind: VariableKind,
    pub name: String,
    pub n_type: String,
}

impl Variable {
    pub fn new(kind: VariableKind, name: impl Into<String>, n_type: impl Into<String>) -> Self {
        Variable {
            kind,
            name: name.into(),
            n_type: n_type.into(),
        }
    }

    pub fn constant(name: impl Into<String>, n_type: impl Into<String>) -> Self {
        Self::new(VariableKind::Constant, name, n_type)
    }

    pub fn bound(name: impl Into<String>, n_type: impl Into<String>) -> Self {
        Self::new(VariableKind::BoundVariable, name, n_type)
    }

    /// A dummy variable whose `n_type` is either a terminal fragment or a nonterminal label.
    /// Auto-numbered so that two dummies with the same fragment remain distinct identities.
    pub fn dummy(n_type: impl Into<String>) -> Self {
        let id = DUMMY_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
        Variable::new(VariableKind::DummyVariable, format!("DUMMY_{id}"), n_type)
    }

    pub fn is_numeric(&self) -> bool {
        self.n_type == NUMERIC_NTYPE
    }

    pub fn is_dummy(&self) -> bool {
        self.kind == VariableKind::DummyVariable
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            // A dummy variable prints as its nonterminal/fragment, never its synthetic name.
            VariableKind::DummyVariable => write!(f, "{}", self.n_type),
            _ => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_variables_are_pairwise_distinct() {
        let a = Variable::dummy("<var>");
        let b = Variable::dummy("<var>");
        assert_ne!(a, b);
        assert_eq!(a.n_type, b.n_type);
    }

    #[test]
    fn equality_uses_kind_name_and_type() {
        let a = Variable::bound("x", "<var>");
        let b = Variable::bound("x", "<var>");
        let c = Variable::constant("x", "<var>");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn display_shows_name_except_for_dummies() {
        let v = Variable::bound("l1", "<var>");
        assert_eq!(v.to_string(), "l1");
        let d = Variable::dummy(":=");
        assert_eq!(d.to_string(), ":=");
    }
}
