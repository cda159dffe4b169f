//! The visitor protocol shared by collectors, filters and rewriters (§4.3 "Formula AST +
//! visitors").
//!
//! A [`FormulaVisitor`] is offered every node on the way down; each `visit_*` method returns
//! whether the walk should continue into that node's children (`do_continue`). Implementors that
//! only care about a subset of node kinds can rely on the default `true` for the rest.

use crate::formula::node::Formula;
use crate::variable::Variable;
use std::collections::HashSet;

pub trait FormulaVisitor {
    fn visit_smt(&mut self, _formula: &Formula) -> bool {
        true
    }
    fn visit_predicate(&mut self, _formula: &Formula) -> bool {
        true
    }
    fn visit_negated(&mut self, _formula: &Formula) -> bool {
        true
    }
    fn visit_conjunctive(&mut self, _formula: &Formula) -> bool {
        true
    }
    fn visit_disjunctive(&mut self, _formula: &Formula) -> bool {
        true
    }
    fn visit_forall(&mut self, _formula: &Formula) -> bool {
        true
    }
    fn visit_exists(&mut self, _formula: &Formula) -> bool {
        true
    }
    fn visit_forall_int(&mut self, _formula: &Formula) -> bool {
        true
    }
    fn visit_exists_int(&mut self, _formula: &Formula) -> bool {
        true
    }
}

/// Walks `formula` depth-first, dispatching each node to the matching `visit_*` method and
/// descending into children only when it returns `true`.
pub fn walk(formula: &Formula, visitor: &mut dyn FormulaVisitor) {
    let do_continue = match formula {
        Formula::Smt(_) => visitor.visit_smt(formula),
        Formula::StructuralPredicate { .. } | Formula::SemanticPredicate { .. } => visitor.visit_predicate(formula),
        Formula::Negated(_) => visitor.visit_negated(formula),
        Formula::Conjunctive(_) => visitor.visit_conjunctive(formula),
        Formula::Disjunctive(_) => visitor.visit_disjunctive(formula),
        Formula::Forall(_) => visitor.visit_forall(formula),
        Formula::Exists(_) => visitor.visit_exists(formula),
        Formula::ForallInt { .. } => visitor.visit_forall_int(formula),
        Formula::ExistsInt { .. } => visitor.visit_exists_int(formula),
        Formula::True | Formula::False => true,
    };

    if !do_continue {
        return;
    }

    match formula {
        Formula::Negated(inner) => walk(inner, visitor),
        Formula::Conjunctive(parts) | Formula::Disjunctive(parts) => {
            for part in parts {
                walk(part, visitor);
            }
        }
        Formula::Forall(data) => walk(&data.inner, visitor),
        Formula::Exists(data) => walk(&data.inner, visitor),
        Formula::ForallInt { inner, .. } | Formula::ExistsInt { inner, .. } => walk(inner, visitor),
        Formula::Smt(_)
        | Formula::StructuralPredicate { .. }
        | Formula::SemanticPredicate { .. }
        | Formula::True
        | Formula::False => {}
    }
}

/// Collects every variable bound anywhere in the formula: quantifier bound variables, and every
/// bound variable mentioned in a match expression.
#[derive(Default)]
pub struct VariablesCollector {
    pub bound: HashSet<Variable>,
}

impl VariablesCollector {
    pub fn collect(formula: &Formula) -> HashSet<Variable> {
        let mut collector = VariablesCollector::default();
        walk(formula, &mut collector);
        collector.bound
    }
}

impl FormulaVisitor for VariablesCollector {
    fn visit_forall(&mut self, formula: &Formula) -> bool {
        if let Formula::Forall(data) = formula {
            self.bound.insert(data.bound_variable.clone());
            if let Some(bind) = &data.bind_expression {
                self.bound.extend(bind.all_bound_variables());
            }
        }
        true
    }

    fn visit_exists(&mut self, formula: &Formula) -> bool {
        if let Formula::Exists(data) = formula {
            self.bound.insert(data.bound_variable.clone());
            if let Some(bind) = &data.bind_expression {
                self.bound.extend(bind.all_bound_variables());
            }
        }
        true
    }

    fn visit_forall_int(&mut self, formula: &Formula) -> bool {
        if let Formula::ForallInt { bound_variable, .. } = formula {
            self.bound.insert(bound_variable.clone());
        }
        true
    }

    fn visit_exists_int(&mut self, formula: &Formula) -> bool {
        if let Formula::ExistsInt { bound_variable, .. } = formula {
            self.bound.insert(bound_variable.clone());
        }
        true
    }
}

/// A visitor that records every subformula matching a predicate, stopping descent as soon as a
/// node is accepted (the first matching ancestor "shadows" anything nested inside it, the same
/// shallow-match behavior the normal-form rewriters rely on when looking for, say, the outermost
/// conjunction).
pub struct FilterVisitor<'a> {
    predicate: Box<dyn Fn(&Formula) -> bool + 'a>,
    pub matches: Vec<Formula>,
}

impl<'a> FilterVisitor<'a> {
    pub fn new(predicate: impl Fn(&Formula) -> bool + 'a) -> Self {
        FilterVisitor {
            predicate: Box::new(predicate),
            matches: Vec::new(),
        }
    }

    fn visit_any(&mut self, formula: &Formula) -> bool {
        if (self.predicate)(formula) {
            self.matches.push(formula.clone());
            false
        } else {
            true
        }
    }
}

impl FormulaVisitor for FilterVisitor<'_> {
    fn visit_smt(&mut self, formula: &Formula) -> bool {
        self.visit_any(formula)
    }
    fn visit_predicate(&mut self, formula: &Formula) -> bool {
        self.visit_any(formula)
    }
    fn visit_negated(&mut self, formula: &Formula) -> bool {
        self.visit_any(formula)
    }
    fn visit_conjunctive(&mut self, formula: &Formula) -> bool {
        self.visit_any(formula)
    }
    fn visit_disjunctive(&mut self, formula: &Formula) -> bool {
        self.visit_any(formula)
    }
    fn visit_forall(&mut self, formula: &Formula) -> bool {
        self.visit_any(formula)
    }
    fn visit_exists(&mut self, formula: &Formula) -> bool {
        self.visit_any(formula)
    }
    fn visit_forall_int(&mut self, formula: &Formula) -> bool {
        self.visit_any(formula)
    }
    fn visit_exists_int(&mut self, formula: &Formula) -> bool {
        self.visit_any(formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::node::Formula;
    use crate::smt::SmtExpr;

    #[test]
    fn variables_collector_finds_both_quantifier_kinds() {
        let x = Variable::bound("x", "<var>");
        let n = Variable::bound("n", crate::variable::NUMERIC_NTYPE);
        let start = Variable::constant("start", "<start>");
        let inner = Formula::forall_int(n.clone(), Formula::True);
        let formula = Formula::forall(x.clone(), start, None, inner);
        let bound = VariablesCollector::collect(&formula);
        assert!(bound.contains(&x));
        assert!(bound.contains(&n));
    }

    #[test]
    fn filter_visitor_stops_at_the_first_match() {
        let leaf = Formula::smt(SmtExpr::Bool(true));
        let formula = leaf.clone().negate();
        let mut visitor = FilterVisitor::new(|f| matches!(f, Formula::Negated(_)));
        walk(&formula, &mut visitor);
        assert_eq!(visitor.matches.len(), 1);
    }
}
