//! The constraint formula AST (§3 "Formula", §4.3).
//!
//! A [`Formula`] is built from SMT leaves, predicate calls, propositional combinators, and
//! quantifiers (nonterminal-typed `forall`/`exists`, and integer-typed `forall int`/`exists int`).
//! Construction is kept simplifying (§10.1): `and`/`or`/`negate` fold away the propositional
//! identities a caller would otherwise have to handle by hand, the same convenience the original
//! implementation got from overloading `&`/`|`/`-` on its formula type.

use crate::bind_expression::BindExpression;
use crate::formula::predicate::{PredicateArg, SemanticPredicate, StructuralPredicate};
use crate::smt::SmtExpr;
use crate::tree::DerivationTree;
use crate::variable::Variable;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

static QUANTIFIER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn fresh_quantifier_id() -> u64 {
    QUANTIFIER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// An SMT leaf together with the (possibly still-open) trees its free variables are tied to.
/// Mirrors the "deferred substitution" behavior of §4.5/§9: a variable bound to an open tree has
/// no entry yet, and the leaf only auto-evaluates once every one of its variables' trees is
/// closed.
#[derive(Clone, Debug, PartialEq)]
pub struct SmtLeaf {
    pub expr: SmtExpr,
    pub instantiations: HashMap<Variable, DerivationTree>,
}

impl SmtLeaf {
    pub fn new(expr: SmtExpr) -> Self {
        SmtLeaf {
            expr,
            instantiations: HashMap::new(),
        }
    }

    /// True once every variable the expression mentions is tied to a closed tree.
    pub fn is_ground(&self) -> bool {
        self.expr
            .free_variables()
            .iter()
            .all(|v| self.instantiations.get(v).is_some_and(DerivationTree::is_complete))
    }

    /// Evaluates the leaf if it is ground, auto-collapsing to a boolean; returns `None` while any
    /// of its trees is still open.
    pub fn try_eval(&self) -> Option<Result<bool, String>> {
        if !self.is_ground() {
            return None;
        }
        let substitution: HashMap<Variable, SmtExpr> = self
            .instantiations
            .iter()
            .map(|(var, tree)| (var.clone(), SmtExpr::Str(tree.to_display_string(false))))
            .collect();
        Some(self.expr.substitute(&substitution).is_valid())
    }
}

/// A universally quantified subformula. Carries a unique identity and a set of tree IDs it has
/// already matched, so that re-evaluating it against a tree that grew (got new open leaves
/// expanded) does not re-fire on the parts it already accounted for. The identity and the
/// already-matched set both belong to *this* formula instance, not to the tree it is matched
/// against (§9 "Open Question", resolved in DESIGN.md).
#[derive(Clone, Debug)]
pub struct ForallData {
    pub id: u64,
    pub bound_variable: Variable,
    pub in_variable: Variable,
    pub bind_expression: Option<BindExpression>,
    pub inner: Box<Formula>,
    pub already_matched: RefCell<HashSet<u64>>,
}

impl ForallData {
    pub fn new(
        bound_variable: Variable,
        in_variable: Variable,
        bind_expression: Option<BindExpression>,
        inner: Formula,
    ) -> Self {
        ForallData {
            id: fresh_quantifier_id(),
            bound_variable,
            in_variable,
            bind_expression,
            inner: Box::new(inner),
            already_matched: RefCell::new(HashSet::new()),
        }
    }

    /// A copy of this quantifier with a fresh identity and an empty already-matched set, used
    /// when a formula built from this one is meant to be tracked independently (e.g. after
    /// substituting it into an unrelated context).
    pub fn with_fresh_identity(&self) -> Self {
        ForallData {
            id: fresh_quantifier_id(),
            bound_variable: self.bound_variable.clone(),
            in_variable: self.in_variable.clone(),
            bind_expression: self.bind_expression.clone(),
            inner: self.inner.clone(),
            already_matched: RefCell::new(HashSet::new()),
        }
    }
}

impl PartialEq for ForallData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// An existentially quantified subformula. Unlike [`ForallData`], no already-matched bookkeeping
/// is needed: the search solver only needs to find one witness, not avoid re-finding the same one.
#[derive(Clone, Debug, PartialEq)]
pub struct ExistsData {
    pub bound_variable: Variable,
    pub in_variable: Variable,
    pub bind_expression: Option<BindExpression>,
    pub inner: Box<Formula>,
}

/// The constraint formula sum type (§3 "Formula").
#[derive(Clone, Debug, PartialEq)]
pub enum Formula {
    Smt(SmtLeaf),
    StructuralPredicate {
        predicate: StructuralPredicate,
        args: Vec<PredicateArg>,
    },
    SemanticPredicate {
        predicate: SemanticPredicate,
        args: Vec<PredicateArg>,
    },
    Negated(Box<Formula>),
    Conjunctive(Vec<Formula>),
    Disjunctive(Vec<Formula>),
    Forall(ForallData),
    Exists(ExistsData),
    ForallInt {
        bound_variable: Variable,
        inner: Box<Formula>,
    },
    ExistsInt {
        bound_variable: Variable,
        inner: Box<Formula>,
    },
    /// The nullary truth values, used as the fixed points of `and`/`or`/`negate` simplification.
    True,
    False,
}

impl Formula {
    pub fn smt(expr: SmtExpr) -> Self {
        Formula::Smt(SmtLeaf::new(expr))
    }

    pub fn structural_predicate(predicate: StructuralPredicate, args: Vec<PredicateArg>) -> Self {
        Formula::StructuralPredicate { predicate, args }
    }

    pub fn semantic_predicate(predicate: SemanticPredicate, args: Vec<PredicateArg>) -> Self {
        Formula::SemanticPredicate { predicate, args }
    }

    pub fn forall(
        bound_variable: Variable,
        in_variable: Variable,
        bind_expression: Option<BindExpression>,
        inner: Formula,
    ) -> Self {
        Formula::Forall(ForallData::new(bound_variable, in_variable, bind_expression, inner))
    }

    pub fn exists(
        bound_variable: Variable,
        in_variable: Variable,
        bind_expression: Option<BindExpression>,
        inner: Formula,
    ) -> Self {
        Formula::Exists(ExistsData {
            bound_variable,
            in_variable,
            bind_expression,
            inner: Box::new(inner),
        })
    }

    pub fn forall_int(bound_variable: Variable, inner: Formula) -> Self {
        Formula::ForallInt {
            bound_variable,
            inner: Box::new(inner),
        }
    }

    pub fn exists_int(bound_variable: Variable, inner: Formula) -> Self {
        Formula::ExistsInt {
            bound_variable,
            inner: Box::new(inner),
        }
    }

    /// Negation with the simplifications the ISLa original got for free from `__neg__`:
    /// double negation cancels, and negating a literal flips it.
    pub fn negate(self) -> Formula {
        match self {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Negated(inner) => *inner,
            other => Formula::Negated(Box::new(other)),
        }
    }

    /// Conjunction with short-circuit simplification: `false` absorbs, `true` is dropped, and a
    /// formula conjoined with its own negation collapses to `false`.
    pub fn and(self, other: Formula) -> Formula {
        if self == Formula::False || other == Formula::False {
            return Formula::False;
        }
        if self == Formula::True {
            return other;
        }
        if other == Formula::True {
            return self;
        }
        if self.negate_of(&other) {
            return Formula::False;
        }

        let mut conjuncts = Vec::new();
        for formula in [self, other] {
            match formula {
                Formula::Conjunctive(inner) => conjuncts.extend(inner),
                other => conjuncts.push(other),
            }
        }
        Formula::Conjunctive(conjuncts)
    }

    /// Disjunction, dual to [`Formula::and`].
    pub fn or(self, other: Formula) -> Formula {
        if self == Formula::True || other == Formula::True {
            return Formula::True;
        }
        if self == Formula::False {
            return other;
        }
        if other == Formula::False {
            return self;
        }
        if self.negate_of(&other) {
            return Formula::True;
        }

        let mut disjuncts = Vec::new();
        for formula in [self, other] {
            match formula {
                Formula::Disjunctive(inner) => disjuncts.extend(inner),
                other => disjuncts.push(other),
            }
        }
        Formula::Disjunctive(disjuncts)
    }

    fn negate_of(&self, other: &Formula) -> bool {
        matches!(self, Formula::Negated(inner) if inner.as_ref() == other)
            || matches!(other, Formula::Negated(inner) if inner.as_ref() == self)
    }

    /// All free variables: constants and bound variables referenced but not bound by an enclosing
    /// quantifier within this formula.
    pub fn free_variables(&self) -> HashSet<Variable> {
        let mut result = HashSet::new();
        self.collect_free_variables(&mut result);
        result
    }

    fn collect_free_variables(&self, out: &mut HashSet<Variable>) {
        match self {
            Formula::Smt(leaf) => out.extend(leaf.expr.free_variables()),
            Formula::StructuralPredicate { args, .. } | Formula::SemanticPredicate { args, .. } => {
                for arg in args {
                    if let PredicateArg::Variable(v) = arg {
                        out.insert(v.clone());
                    }
                }
            }
            Formula::Negated(inner) => inner.collect_free_variables(out),
            Formula::Conjunctive(parts) | Formula::Disjunctive(parts) => {
                for part in parts {
                    part.collect_free_variables(out);
                }
            }
            Formula::Forall(data) => {
                out.insert(data.in_variable.clone());
                let mut inner_free = HashSet::new();
                data.inner.collect_free_variables(&mut inner_free);
                inner_free.remove(&data.bound_variable);
                if let Some(bind) = &data.bind_expression {
                    for bound in bind.all_bound_variables() {
                        inner_free.remove(&bound);
                    }
                }
                out.extend(inner_free);
            }
            Formula::Exists(data) => {
                out.insert(data.in_variable.clone());
                let mut inner_free = HashSet::new();
                data.inner.collect_free_variables(&mut inner_free);
                inner_free.remove(&data.bound_variable);
                if let Some(bind) = &data.bind_expression {
                    for bound in bind.all_bound_variables() {
                        inner_free.remove(&bound);
                    }
                }
                out.extend(inner_free);
            }
            Formula::ForallInt { bound_variable, inner } | Formula::ExistsInt { bound_variable, inner } => {
                let mut inner_free = HashSet::new();
                inner.collect_free_variables(&mut inner_free);
                inner_free.remove(bound_variable);
                out.extend(inner_free);
            }
            Formula::True | Formula::False => {}
        }
    }

    /// Every derivation tree directly embedded in this formula (SMT-leaf instantiations and fixed
    /// tree predicate arguments), not recursing into quantifier bodies' own tree instantiations
    /// until those quantifiers are themselves instantiated.
    pub fn tree_arguments(&self) -> Vec<&DerivationTree> {
        match self {
            Formula::Smt(leaf) => leaf.instantiations.values().collect(),
            Formula::StructuralPredicate { args, .. } | Formula::SemanticPredicate { args, .. } => args
                .iter()
                .filter_map(|arg| match arg {
                    PredicateArg::Tree(tree) => Some(tree),
                    PredicateArg::Variable(_) => None,
                })
                .collect(),
            Formula::Negated(inner) => inner.tree_arguments(),
            Formula::Conjunctive(parts) | Formula::Disjunctive(parts) => {
                parts.iter().flat_map(Formula::tree_arguments).collect()
            }
            Formula::Forall(data) => data.inner.tree_arguments(),
            Formula::Exists(data) => data.inner.tree_arguments(),
            Formula::ForallInt { inner, .. } | Formula::ExistsInt { inner, .. } => inner.tree_arguments(),
            Formula::True | Formula::False => Vec::new(),
        }
    }

    /// Renames every occurrence of a bound/free variable according to `mapping`, leaving
    /// variables absent from `mapping` untouched. Used by bound-variable uniquification.
    pub fn substitute_variables(&self, mapping: &HashMap<Variable, Variable>) -> Formula {
        let rename = |v: &Variable| mapping.get(v).cloned().unwrap_or_else(|| v.clone());
        match self {
            Formula::Smt(leaf) => {
                let expr_subst: HashMap<Variable, SmtExpr> = mapping
                    .iter()
                    .map(|(from, to)| (from.clone(), SmtExpr::Var(to.clone())))
                    .collect();
                let instantiations = leaf
                    .instantiations
                    .iter()
                    .map(|(v, tree)| (rename(v), tree.clone()))
                    .collect();
                Formula::Smt(SmtLeaf {
                    expr: leaf.expr.substitute(&expr_subst),
                    instantiations,
                })
            }
            Formula::StructuralPredicate { predicate, args } => Formula::StructuralPredicate {
                predicate: *predicate,
                args: rename_args(args, &rename),
            },
            Formula::SemanticPredicate { predicate, args } => Formula::SemanticPredicate {
                predicate: *predicate,
                args: rename_args(args, &rename),
            },
            Formula::Negated(inner) => Formula::Negated(Box::new(inner.substitute_variables(mapping))),
            Formula::Conjunctive(parts) => {
                Formula::Conjunctive(parts.iter().map(|p| p.substitute_variables(mapping)).collect())
            }
            Formula::Disjunctive(parts) => {
                Formula::Disjunctive(parts.iter().map(|p| p.substitute_variables(mapping)).collect())
            }
            Formula::Forall(data) => Formula::Forall(ForallData {
                id: data.id,
                bound_variable: rename(&data.bound_variable),
                in_variable: rename(&data.in_variable),
                bind_expression: data.bind_expression.clone(),
                inner: Box::new(data.inner.substitute_variables(mapping)),
                already_matched: RefCell::new(data.already_matched.borrow().clone()),
            }),
            Formula::Exists(data) => Formula::Exists(ExistsData {
                bound_variable: rename(&data.bound_variable),
                in_variable: rename(&data.in_variable),
                bind_expression: data.bind_expression.clone(),
                inner: Box::new(data.inner.substitute_variables(mapping)),
            }),
            Formula::ForallInt { bound_variable, inner } => Formula::ForallInt {
                bound_variable: rename(bound_variable),
                inner: Box::new(inner.substitute_variables(mapping)),
            },
            Formula::ExistsInt { bound_variable, inner } => Formula::ExistsInt {
                bound_variable: rename(bound_variable),
                inner: Box::new(inner.substitute_variables(mapping)),
            },
            Formula::True => Formula::True,
            Formula::False => Formula::False,
        }
    }

    /// Propagates a by-identity tree substitution (as produced when a derivation tree grows) into
    /// every SMT leaf's and predicate argument's embedded trees.
    pub fn substitute_expressions(&self, tree_subst: &HashMap<u64, DerivationTree>) -> Formula {
        match self {
            Formula::Smt(leaf) => Formula::Smt(SmtLeaf {
                expr: leaf.expr.clone(),
                instantiations: leaf
                    .instantiations
                    .iter()
                    .map(|(v, tree)| (v.clone(), tree.substitute(tree_subst)))
                    .collect(),
            }),
            Formula::StructuralPredicate { predicate, args } => Formula::StructuralPredicate {
                predicate: *predicate,
                args: substitute_args(args, tree_subst),
            },
            Formula::SemanticPredicate { predicate, args } => Formula::SemanticPredicate {
                predicate: *predicate,
                args: substitute_args(args, tree_subst),
            },
            Formula::Negated(inner) => Formula::Negated(Box::new(inner.substitute_expressions(tree_subst))),
            Formula::Conjunctive(parts) => {
                Formula::Conjunctive(parts.iter().map(|p| p.substitute_expressions(tree_subst)).collect())
            }
            Formula::Disjunctive(parts) => {
                Formula::Disjunctive(parts.iter().map(|p| p.substitute_expressions(tree_subst)).collect())
            }
            Formula::Forall(data) => {
                let new_inner = data.inner.substitute_expressions(tree_subst);
                if data.bind_expression.is_none() && !new_inner.free_variables().contains(&data.bound_variable) {
                    return new_inner;
                }
                Formula::Forall(ForallData {
                    id: data.id,
                    bound_variable: data.bound_variable.clone(),
                    in_variable: data.in_variable.clone(),
                    bind_expression: data.bind_expression.clone(),
                    inner: Box::new(new_inner),
                    already_matched: RefCell::new(data.already_matched.borrow().clone()),
                })
            }
            Formula::Exists(data) => {
                let new_inner = data.inner.substitute_expressions(tree_subst);
                let new_free = new_inner.free_variables();
                let bind_vars_still_used = data
                    .bind_expression
                    .as_ref()
                    .is_some_and(|bind| bind.all_bound_variables().iter().any(|v| new_free.contains(v)));
                if !bind_vars_still_used && !new_free.contains(&data.bound_variable) {
                    return new_inner;
                }
                Formula::Exists(ExistsData {
                    bound_variable: data.bound_variable.clone(),
                    in_variable: data.in_variable.clone(),
                    bind_expression: data.bind_expression.clone(),
                    inner: Box::new(new_inner),
                })
            }
            Formula::ForallInt { bound_variable, inner } => Formula::ForallInt {
                bound_variable: bound_variable.clone(),
                inner: Box::new(inner.substitute_expressions(tree_subst)),
            },
            Formula::ExistsInt { bound_variable, inner } => Formula::ExistsInt {
                bound_variable: bound_variable.clone(),
                inner: Box::new(inner.substitute_expressions(tree_subst)),
            },
            Formula::True => Formula::True,
            Formula::False => Formula::False,
        }
    }
}

fn rename_args(args: &[PredicateArg], rename: &impl Fn(&Variable) -> Variable) -> Vec<PredicateArg> {
    args.iter()
        .map(|arg| match arg {
            PredicateArg::Variable(v) => PredicateArg::Variable(rename(v)),
            PredicateArg::Tree(tree) => PredicateArg::Tree(tree.clone()),
        })
        .collect()
}

fn substitute_args(args: &[PredicateArg], tree_subst: &HashMap<u64, DerivationTree>) -> Vec<PredicateArg> {
    args.iter()
        .map(|arg| match arg {
            PredicateArg::Variable(v) => PredicateArg::Variable(v.clone()),
            PredicateArg::Tree(tree) => PredicateArg::Tree(tree.substitute(tree_subst)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_absorbs_false_and_drops_true() {
        let p = Formula::smt(SmtExpr::Bool(true));
        assert_eq!(p.clone().and(Formula::False), Formula::False);
        assert_eq!(p.clone().and(Formula::True), p);
    }

    #[test]
    fn and_collapses_formula_conjoined_with_its_negation() {
        let p = Formula::smt(SmtExpr::Bool(true));
        assert_eq!(p.clone().and(p.clone().negate()), Formula::False);
    }

    #[test]
    fn negate_cancels_double_negation() {
        let p = Formula::smt(SmtExpr::Bool(true));
        assert_eq!(p.clone().negate().negate(), p);
    }

    #[test]
    fn free_variables_excludes_the_quantifiers_own_bound_variable() {
        let x = Variable::bound("x", "<var>");
        let start = Variable::constant("start", "<start>");
        let inner = Formula::structural_predicate(
            crate::formula::predicate::BEFORE,
            vec![PredicateArg::Variable(x.clone()), PredicateArg::Variable(x.clone())],
        );
        let forall = Formula::forall(x, start.clone(), None, inner);
        let free = forall.free_variables();
        assert!(free.contains(&start));
        assert_eq!(free.len(), 1);
    }

    #[test]
    fn smt_leaf_auto_evaluates_once_all_trees_are_closed() {
        let x = Variable::bound("x", "<var>");
        let mut leaf = SmtLeaf::new(SmtExpr::app(
            "=",
            vec![SmtExpr::var(x.clone()), SmtExpr::Str("a".to_string())],
        ));
        assert_eq!(leaf.try_eval(), None);
        leaf.instantiations.insert(x, DerivationTree::terminal("a"));
        assert_eq!(leaf.try_eval(), Some(Ok(true)));
    }

    #[test]
    fn forall_instances_get_distinct_identities() {
        let x = Variable::bound("x", "<var>");
        let start = Variable::constant("start", "<start>");
        let a = Formula::forall(x.clone(), start.clone(), None, Formula::True);
        let b = Formula::forall(x, start, None, Formula::True);
        assert_ne!(a, b);
    }

    #[test]
    fn substitute_expressions_collapses_a_forall_whose_bound_variable_goes_unused() {
        let x = Variable::bound("x", "<var>");
        let start = Variable::constant("start", "<start>");
        let y = Variable::bound("y", "<var>");
        let inner = Formula::structural_predicate(
            crate::formula::predicate::BEFORE,
            vec![PredicateArg::Variable(y.clone()), PredicateArg::Variable(y)],
        );
        let forall = Formula::forall(x, start, None, inner.clone());
        let result = forall.substitute_expressions(&HashMap::new());
        assert_eq!(result, inner);
    }

    #[test]
    fn substitute_expressions_keeps_a_forall_whose_bound_variable_is_still_used() {
        let x = Variable::bound("x", "<var>");
        let start = Variable::constant("start", "<start>");
        let inner = Formula::structural_predicate(
            crate::formula::predicate::BEFORE,
            vec![PredicateArg::Variable(x.clone()), PredicateArg::Variable(x.clone())],
        );
        let forall = Formula::forall(x, start, None, inner);
        let result = forall.substitute_expressions(&HashMap::new());
        assert!(matches!(result, Formula::Forall(_)));
    }

    #[test]
    fn substitute_expressions_keeps_an_exists_whose_bind_expression_still_binds_a_used_variable() {
        use crate::bind_expression::{BindExpression, BoundElement};

        let x = Variable::bound("x", "<assgn>");
        let start = Variable::constant("start", "<start>");
        let l1 = Variable::bound("l1", "<var>");
        let bind = BindExpression::new(vec![BoundElement::Variable(l1.clone())]);
        let inner = Formula::structural_predicate(
            crate::formula::predicate::BEFORE,
            vec![PredicateArg::Variable(l1.clone()), PredicateArg::Variable(l1)],
        );
        let exists = Formula::exists(x, start, Some(bind), inner);
        let result = exists.substitute_expressions(&HashMap::new());
        assert!(matches!(result, Formula::Exists(_)));
    }
}
