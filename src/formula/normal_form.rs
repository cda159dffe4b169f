//! Normal-form rewriters (§4.4): negation normal form, disjunctive normal form, bound-variable
//! uniquification, and the handful of formula-shape utilities (§10.2, §10.3) that downstream
//! consumers use to iterate a formula's top-level clauses.

use crate::bind_expression::BindExpression;
use crate::formula::node::{ExistsData, ForallData, Formula, SmtLeaf};
use crate::tree::DerivationTree;
use crate::variable::{Variable, VariableKind};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Pushes every negation down to an SMT or predicate leaf, swapping quantifiers and flipping
/// propositional combinators along the way. Already-negation-normal input is left unchanged.
pub fn convert_to_nnf(formula: &Formula) -> Formula {
    match formula {
        Formula::Negated(inner) => negate_into_nnf(inner),
        Formula::Conjunctive(parts) => Formula::Conjunctive(parts.iter().map(convert_to_nnf).collect()),
        Formula::Disjunctive(parts) => Formula::Disjunctive(parts.iter().map(convert_to_nnf).collect()),
        Formula::Forall(data) => Formula::Forall(clone_forall_with_inner(data, convert_to_nnf(&data.inner))),
        Formula::Exists(data) => Formula::Exists(ExistsData {
            bound_variable: data.bound_variable.clone(),
            in_variable: data.in_variable.clone(),
            bind_expression: data.bind_expression.clone(),
            inner: Box::new(convert_to_nnf(&data.inner)),
        }),
        Formula::ForallInt { bound_variable, inner } => Formula::ForallInt {
            bound_variable: bound_variable.clone(),
            inner: Box::new(convert_to_nnf(inner)),
        },
        Formula::ExistsInt { bound_variable, inner } => Formula::ExistsInt {
            bound_variable: bound_variable.clone(),
            inner: Box::new(convert_to_nnf(inner)),
        },
        leaf @ (Formula::Smt(_) | Formula::StructuralPredicate { .. } | Formula::SemanticPredicate { .. } | Formula::True | Formula::False) => {
            leaf.clone()
        }
    }
}

/// Negation normal form of `not(inner)`, assuming `inner` has not yet itself been processed.
fn negate_into_nnf(inner: &Formula) -> Formula {
    match inner {
        Formula::Negated(doubly_negated) => convert_to_nnf(doubly_negated),
        Formula::Conjunctive(parts) => {
            Formula::Disjunctive(parts.iter().map(|p| negate_into_nnf_after_recursing(p)).collect())
        }
        Formula::Disjunctive(parts) => {
            Formula::Conjunctive(parts.iter().map(|p| negate_into_nnf_after_recursing(p)).collect())
        }
        Formula::Forall(data) => Formula::Exists(ExistsData {
            bound_variable: data.bound_variable.clone(),
            in_variable: data.in_variable.clone(),
            bind_expression: data.bind_expression.clone(),
            inner: Box::new(negate_into_nnf_after_recursing(&data.inner)),
        }),
        Formula::Exists(data) => {
            Formula::Forall(ForallData::new(
                data.bound_variable.clone(),
                data.in_variable.clone(),
                data.bind_expression.clone(),
                negate_into_nnf_after_recursing(&data.inner),
            ))
        }
        Formula::ForallInt { bound_variable, inner } => Formula::ExistsInt {
            bound_variable: bound_variable.clone(),
            inner: Box::new(negate_into_nnf_after_recursing(inner)),
        },
        Formula::ExistsInt { bound_variable, inner } => Formula::ForallInt {
            bound_variable: bound_variable.clone(),
            inner: Box::new(negate_into_nnf_after_recursing(inner)),
        },
        Formula::Smt(leaf) => Formula::Smt(SmtLeaf {
            expr: leaf.expr.negate(),
            instantiations: leaf.instantiations.clone(),
        }),
        Formula::True => Formula::False,
        Formula::False => Formula::True,
        // Predicates have no generic negation push-in; the negation stays at the leaf.
        predicate @ (Formula::StructuralPredicate { .. } | Formula::SemanticPredicate { .. }) => {
            Formula::Negated(Box::new(predicate.clone()))
        }
    }
}

fn negate_into_nnf_after_recursing(formula: &Formula) -> Formula {
    negate_into_nnf(&convert_to_nnf(formula))
}

fn clone_forall_with_inner(data: &ForallData, inner: Formula) -> ForallData {
    ForallData {
        id: data.id,
        bound_variable: data.bound_variable.clone(),
        in_variable: data.in_variable.clone(),
        bind_expression: data.bind_expression.clone(),
        inner: Box::new(inner),
        already_matched: RefCell::new(data.already_matched.borrow().clone()),
    }
}

/// The top-level conjuncts of `formula`: itself in a singleton list if it is not a conjunction.
pub fn get_conjuncts(formula: &Formula) -> Vec<Formula> {
    match formula {
        Formula::Conjunctive(parts) => parts.clone(),
        other => vec![other.clone()],
    }
}

/// The top-level disjuncts of `formula`: itself in a singleton list if it is not a disjunction.
pub fn get_disjuncts(formula: &Formula) -> Vec<Formula> {
    match formula {
        Formula::Disjunctive(parts) => parts.clone(),
        other => vec![other.clone()],
    }
}

pub fn split_conjunction(formula: Formula) -> Vec<Formula> {
    match formula {
        Formula::Conjunctive(parts) => parts,
        other => vec![other],
    }
}

pub fn split_disjunction(formula: Formula) -> Vec<Formula> {
    match formula {
        Formula::Disjunctive(parts) => parts,
        other => vec![other],
    }
}

/// Disjunctive normal form: a disjunction of conjunctions of literals, with quantifiers and SMT
/// leaves treated as atomic (their own bodies are independently converted, since distributing
/// across a quantifier is not a valid rewrite). Callers are expected to pass NNF input; this
/// function does not negate anything itself.
pub fn convert_to_dnf(formula: &Formula) -> Formula {
    match formula {
        Formula::Conjunctive(parts) => {
            let dnf_parts: Vec<Formula> = parts.iter().map(convert_to_dnf).collect();
            cartesian_conjunction(&dnf_parts)
        }
        Formula::Disjunctive(parts) => {
            let dnf_parts: Vec<Formula> = parts.iter().map(convert_to_dnf).collect();
            flatten_disjunction(&dnf_parts)
        }
        Formula::Negated(inner) => Formula::Negated(Box::new(convert_to_dnf(inner))),
        Formula::Forall(data) => Formula::Forall(clone_forall_with_inner(data, convert_to_dnf(&data.inner))),
        Formula::Exists(data) => Formula::Exists(ExistsData {
            bound_variable: data.bound_variable.clone(),
            in_variable: data.in_variable.clone(),
            bind_expression: data.bind_expression.clone(),
            inner: Box::new(convert_to_dnf(&data.inner)),
        }),
        Formula::ForallInt { bound_variable, inner } => Formula::ForallInt {
            bound_variable: bound_variable.clone(),
            inner: Box::new(convert_to_dnf(inner)),
        },
        Formula::ExistsInt { bound_variable, inner } => Formula::ExistsInt {
            bound_variable: bound_variable.clone(),
            inner: Box::new(convert_to_dnf(inner)),
        },
        leaf => leaf.clone(),
    }
}

fn cartesian_conjunction(parts: &[Formula]) -> Formula {
    let mut combinations: Vec<Vec<Formula>> = vec![Vec::new()];
    for part in parts {
        let disjuncts = get_disjuncts(part);
        let mut next = Vec::with_capacity(combinations.len() * disjuncts.len());
        for combination in &combinations {
            for disjunct in &disjuncts {
                let mut extended = combination.clone();
                extended.push(disjunct.clone());
                next.push(extended);
            }
        }
        combinations = next;
    }

    let mut result = Formula::False;
    let mut seen: Vec<Formula> = Vec::new();
    for combination in combinations {
        let conjunction = combination
            .into_iter()
            .fold(Formula::True, |acc, literal| acc.and(literal));
        if !seen.contains(&conjunction) {
            seen.push(conjunction.clone());
            result = result.or(conjunction);
        }
    }
    result
}

fn flatten_disjunction(parts: &[Formula]) -> Formula {
    let mut result = Formula::False;
    let mut seen: Vec<Formula> = Vec::new();
    for part in parts {
        for disjunct in get_disjuncts(part) {
            if !seen.contains(&disjunct) {
                seen.push(disjunct.clone());
                result = result.or(disjunct);
            }
        }
    }
    result
}

pub(crate) fn fresh_name(base: &str, used_names: &HashSet<String>) -> String {
    if !used_names.contains(base) {
        return base.to_string();
    }
    let mut index = 0;
    loop {
        let candidate = format!("{base}_{index}");
        if !used_names.contains(&candidate) {
            return candidate;
        }
        index += 1;
    }
}

fn uniquify_variable(var: &Variable, used_names: &mut HashSet<String>) -> Variable {
    let name = fresh_name(&var.name, used_names);
    used_names.insert(name.clone());
    Variable::new(var.kind, name, var.n_type.clone())
}

fn uniquify_bind_expression(
    bind: &BindExpression,
    used_names: &mut HashSet<String>,
    mapping: &mut HashMap<Variable, Variable>,
) -> BindExpression {
    bind.map_variables(&mut |v: &Variable| {
        if v.is_dummy() {
            return v.clone();
        }
        let renamed = uniquify_variable(v, used_names);
        mapping.insert(v.clone(), renamed.clone());
        renamed
    })
}

/// Renames every quantifier-bound variable (and every bound variable inside its match
/// expression, if any) so that no two quantifiers in the whole formula share a name, threading a
/// single `used_names` set through the recursion and only introducing a `{name}_{index}` suffix
/// when a collision would otherwise occur.
pub fn ensure_unique_bound_variables(formula: &Formula) -> Formula {
    let mut used_names: HashSet<String> = formula.free_variables().iter().map(|v| v.name.clone()).collect();
    rename_quantifiers(formula, &mut used_names)
}

fn rename_quantifiers(formula: &Formula, used_names: &mut HashSet<String>) -> Formula {
    match formula {
        Formula::Forall(data) => {
            let mut mapping = HashMap::new();
            let new_bound = uniquify_variable(&data.bound_variable, used_names);
            mapping.insert(data.bound_variable.clone(), new_bound.clone());
            let new_bind_expression = data
                .bind_expression
                .as_ref()
                .map(|bind| uniquify_bind_expression(bind, used_names, &mut mapping));
            let renamed_inner = data.inner.substitute_variables(&mapping);
            Formula::Forall(ForallData {
                id: data.id,
                bound_variable: new_bound,
                in_variable: data.in_variable.clone(),
                bind_expression: new_bind_expression,
                inner: Box::new(rename_quantifiers(&renamed_inner, used_names)),
                already_matched: RefCell::new(data.already_matched.borrow().clone()),
            })
        }
        Formula::Exists(data) => {
            let mut mapping = HashMap::new();
            let new_bound = uniquify_variable(&data.bound_variable, used_names);
            mapping.insert(data.bound_variable.clone(), new_bound.clone());
            let new_bind_expression = data
                .bind_expression
                .as_ref()
                .map(|bind| uniquify_bind_expression(bind, used_names, &mut mapping));
            let renamed_inner = data.inner.substitute_variables(&mapping);
            Formula::Exists(ExistsData {
                bound_variable: new_bound,
                in_variable: data.in_variable.clone(),
                bind_expression: new_bind_expression,
                inner: Box::new(rename_quantifiers(&renamed_inner, used_names)),
            })
        }
        Formula::ForallInt { bound_variable, inner } => {
            let mut mapping = HashMap::new();
            let new_bound = uniquify_variable(bound_variable, used_names);
            mapping.insert(bound_variable.clone(), new_bound.clone());
            let renamed_inner = inner.substitute_variables(&mapping);
            Formula::ForallInt {
                bound_variable: new_bound,
                inner: Box::new(rename_quantifiers(&renamed_inner, used_names)),
            }
        }
        Formula::ExistsInt { bound_variable, inner } => {
            let mut mapping = HashMap::new();
            let new_bound = uniquify_variable(bound_variable, used_names);
            mapping.insert(bound_variable.clone(), new_bound.clone());
            let renamed_inner = inner.substitute_variables(&mapping);
            Formula::ExistsInt {
                bound_variable: new_bound,
                inner: Box::new(rename_quantifiers(&renamed_inner, used_names)),
            }
        }
        Formula::Negated(inner) => Formula::Negated(Box::new(rename_quantifiers(inner, used_names))),
        Formula::Conjunctive(parts) => {
            Formula::Conjunctive(parts.iter().map(|p| rename_quantifiers(p, used_names)).collect())
        }
        Formula::Disjunctive(parts) => {
            Formula::Disjunctive(parts.iter().map(|p| rename_quantifiers(p, used_names)).collect())
        }
        leaf => leaf.clone(),
    }
}

/// A fresh variable of `kind` whose name is not among `used_names`.
pub fn fresh_variable(base: &str, n_type: &str, kind: VariableKind, used_names: &HashSet<String>) -> Variable {
    Variable::new(kind, fresh_name(base, used_names), n_type)
}

pub fn fresh_constant(base: &str, n_type: &str, used_names: &HashSet<String>) -> Variable {
    fresh_variable(base, n_type, VariableKind::Constant, used_names)
}

pub fn fresh_bound_variable(base: &str, n_type: &str, used_names: &HashSet<String>) -> Variable {
    fresh_variable(base, n_type, VariableKind::BoundVariable, used_names)
}

/// Top-down, single-pass replacement: wherever `replace` returns `Some`, that subformula (and
/// everything beneath it) is swapped in verbatim, without recursing further into the
/// replacement. Elsewhere the node is rebuilt with its children replaced recursively.
pub fn replace_formula(formula: &Formula, replace: &impl Fn(&Formula) -> Option<Formula>) -> Formula {
    if let Some(replacement) = replace(formula) {
        return replacement;
    }

    match formula {
        Formula::Negated(inner) => Formula::Negated(Box::new(replace_formula(inner, replace))),
        Formula::Conjunctive(parts) => {
            Formula::Conjunctive(parts.iter().map(|p| replace_formula(p, replace)).collect())
        }
        Formula::Disjunctive(parts) => {
            Formula::Disjunctive(parts.iter().map(|p| replace_formula(p, replace)).collect())
        }
        Formula::Forall(data) => Formula::Forall(clone_forall_with_inner(data, replace_formula(&data.inner, replace))),
        Formula::Exists(data) => Formula::Exists(ExistsData {
            bound_variable: data.bound_variable.clone(),
            in_variable: data.in_variable.clone(),
            bind_expression: data.bind_expression.clone(),
            inner: Box::new(replace_formula(&data.inner, replace)),
        }),
        Formula::ForallInt { bound_variable, inner } => Formula::ForallInt {
            bound_variable: bound_variable.clone(),
            inner: Box::new(replace_formula(inner, replace)),
        },
        Formula::ExistsInt { bound_variable, inner } => Formula::ExistsInt {
            bound_variable: bound_variable.clone(),
            inner: Box::new(replace_formula(inner, replace)),
        },
        leaf => leaf.clone(),
    }
}

/// Entry point for tying a formula's one free top-level constant to a concrete derivation tree:
/// finds the unique non-numeric free constant `formula` mentions and instantiates it to `tree`.
/// Every consumer (the parser's output, freshly read from a constraint file, has exactly one
/// declared `const` constant) goes through this rather than naming the constant itself.
///
/// # Panics
///
/// Panics if `formula` has zero or more than one non-numeric free constant; a formula with no
/// such constant has nothing to instantiate, and one with more than one has no *unique* top
/// constant for this entry point to resolve.
pub fn instantiate_top_constant(formula: &Formula, tree: &DerivationTree) -> Formula {
    let mut candidates = formula
        .free_variables()
        .into_iter()
        .filter(|v| v.kind == VariableKind::Constant && !v.is_numeric());
    let constant = candidates.next().expect("formula has no non-numeric free constant to instantiate");
    assert!(
        candidates.next().is_none(),
        "formula has more than one non-numeric free constant; instantiate_top_constant requires a unique one"
    );
    instantiate_constant(formula, &constant, tree)
}

/// Ties every occurrence of `constant` directly embedded in an SMT leaf or a fixed tree predicate
/// argument to `tree`. Quantifiers ranging "in" `constant` keep referencing it by name; resolving
/// which concrete subtree a quantifier instance ranges over as the surrounding tree grows is the
/// search solver's job, out of scope here.
fn instantiate_constant(formula: &Formula, constant: &Variable, tree: &DerivationTree) -> Formula {
    match formula {
        Formula::Smt(leaf) => {
            if leaf.expr.free_variables().contains(constant) {
                let mut instantiations = leaf.instantiations.clone();
                instantiations.insert(constant.clone(), tree.clone());
                Formula::Smt(SmtLeaf {
                    expr: leaf.expr.clone(),
                    instantiations,
                })
            } else {
                formula.clone()
            }
        }
        Formula::StructuralPredicate { predicate, args } => Formula::StructuralPredicate {
            predicate: *predicate,
            args: instantiate_args(args, constant, tree),
        },
        Formula::SemanticPredicate { predicate, args } => Formula::SemanticPredicate {
            predicate: *predicate,
            args: instantiate_args(args, constant, tree),
        },
        Formula::Negated(inner) => Formula::Negated(Box::new(instantiate_constant(inner, constant, tree))),
        Formula::Conjunctive(parts) => Formula::Conjunctive(
            parts.iter().map(|p| instantiate_constant(p, constant, tree)).collect(),
        ),
        Formula::Disjunctive(parts) => Formula::Disjunctive(
            parts.iter().map(|p| instantiate_constant(p, constant, tree)).collect(),
        ),
        Formula::Forall(data) => {
            Formula::Forall(clone_forall_with_inner(data, instantiate_constant(&data.inner, constant, tree)))
        }
        Formula::Exists(data) => Formula::Exists(ExistsData {
            bound_variable: data.bound_variable.clone(),
            in_variable: data.in_variable.clone(),
            bind_expression: data.bind_expression.clone(),
            inner: Box::new(instantiate_constant(&data.inner, constant, tree)),
        }),
        Formula::ForallInt { bound_variable, inner } => Formula::ForallInt {
            bound_variable: bound_variable.clone(),
            inner: Box::new(instantiate_constant(inner, constant, tree)),
        },
        Formula::ExistsInt { bound_variable, inner } => Formula::ExistsInt {
            bound_variable: bound_variable.clone(),
            inner: Box::new(instantiate_constant(inner, constant, tree)),
        },
        Formula::True | Formula::False => formula.clone(),
    }
}

fn instantiate_args(
    args: &[crate::formula::predicate::PredicateArg],
    constant: &Variable,
    tree: &DerivationTree,
) -> Vec<crate::formula::predicate::PredicateArg> {
    use crate::formula::predicate::PredicateArg;
    args.iter()
        .map(|arg| match arg {
            PredicateArg::Variable(v) if v == constant => PredicateArg::Tree(tree.clone()),
            other => other.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::predicate::BEFORE;
    use crate::smt::SmtExpr;

    fn atom(name: &str) -> Formula {
        Formula::smt(SmtExpr::app(name, vec![]))
    }

    #[test]
    fn nnf_pushes_negation_through_conjunction_and_disjunction() {
        let formula = atom("p").and(atom("q")).negate();
        let nnf = convert_to_nnf(&formula);
        match nnf {
            Formula::Disjunctive(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected a disjunction, got {other:?}"),
        }
    }

    #[test]
    fn nnf_swaps_quantifiers_under_negation() {
        let x = Variable::bound("x", "<var>");
        let start = Variable::constant("start", "<start>");
        let formula = Formula::forall(x, start, None, atom("p")).negate();
        assert!(matches!(convert_to_nnf(&formula), Formula::Exists(_)));
    }

    #[test]
    fn nnf_is_idempotent() {
        let formula = atom("p").and(atom("q").or(atom("r"))).negate();
        let once = convert_to_nnf(&formula);
        let twice = convert_to_nnf(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn dnf_distributes_conjunction_over_disjunction() {
        let formula = atom("p").and(atom("q").or(atom("r")));
        let dnf = convert_to_dnf(&formula);
        let disjuncts = get_disjuncts(&dnf);
        assert_eq!(disjuncts.len(), 2);
        for disjunct in disjuncts {
            assert!(matches!(disjunct, Formula::Conjunctive(_)));
        }
    }

    #[test]
    fn ensure_unique_bound_variables_renames_shadowing_quantifiers() {
        let x = Variable::bound("x", "<var>");
        let start = Variable::constant("start", "<start>");
        let inner_forall = Formula::forall(
            x.clone(),
            start.clone(),
            None,
            Formula::structural_predicate(BEFORE, vec![
                crate::formula::predicate::PredicateArg::Variable(x.clone()),
                crate::formula::predicate::PredicateArg::Variable(x.clone()),
            ]),
        );
        let outer_forall = Formula::forall(x, start, None, inner_forall);
        let renamed = ensure_unique_bound_variables(&outer_forall);

        let Formula::Forall(outer) = &renamed else { panic!("expected forall") };
        let Formula::Forall(inner) = outer.inner.as_ref() else { panic!("expected nested forall") };
        assert_ne!(outer.bound_variable.name, inner.bound_variable.name);
    }

    #[test]
    fn replace_formula_swaps_matching_nodes_without_recursing_into_the_replacement() {
        let formula = atom("p").and(atom("q"));
        let replaced = replace_formula(&formula, &|f| if f == &atom("p") { Some(atom("r")) } else { None });
        assert_eq!(get_conjuncts(&replaced), vec![atom("r"), atom("q")]);
    }

    #[test]
    fn fresh_variable_avoids_every_used_name() {
        let mut used = HashSet::new();
        used.insert("x".to_string());
        used.insert("x_0".to_string());
        let fresh = fresh_bound_variable("x", "<var>", &used);
        assert_eq!(fresh.name, "x_1");
    }

    #[test]
    fn instantiate_top_constant_discovers_the_unique_free_constant_itself() {
        let start = Variable::constant("start", "<start>");
        let formula = Formula::smt(SmtExpr::app("=", vec![SmtExpr::var(start.clone()), SmtExpr::Str("a".to_string())]));
        let tree = DerivationTree::terminal("a");

        let instantiated = instantiate_top_constant(&formula, &tree);
        let Formula::Smt(leaf) = &instantiated else { panic!("expected an smt leaf") };
        assert_eq!(leaf.instantiations.get(&start), Some(&tree));
    }

    #[test]
    #[should_panic(expected = "no non-numeric free constant")]
    fn instantiate_top_constant_panics_without_a_free_constant() {
        instantiate_top_constant(&Formula::True, &DerivationTree::terminal("a"));
    }
}
