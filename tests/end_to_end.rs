//! Cross-module scenarios exercising the parser, formula AST, normal-form rewriters, bind
//! expressions, and unparser together against concrete grammars, mirroring §8's
//! "end-to-end scenarios" and round-trip/boundary properties.

use std::collections::HashMap;

use isla_core::bind_expression::{BindExpression, BoundElement};
use isla_core::formula::normal_form::{convert_to_dnf, convert_to_nnf};
use isla_core::formula::predicate::BEFORE;
use isla_core::formula::Formula;
use isla_core::grammar::Grammar;
use isla_core::parser;
use isla_core::tree::DerivationTree;
use isla_core::variable::Variable;

/// The `LANG` toy grammar from §8 scenario 1: semicolon-separated assignments of a variable to
/// either another variable or a digit.
fn lang_grammar() -> Grammar {
    let mut rules = HashMap::new();
    rules.insert("<start>".to_string(), vec!["<stmt>".to_string()]);
    rules.insert(
        "<stmt>".to_string(),
        vec!["<assgn>".to_string(), "<assgn> ; <stmt>".to_string()],
    );
    rules.insert("<assgn>".to_string(), vec!["<var> := <rhs>".to_string()]);
    rules.insert("<rhs>".to_string(), vec!["<var>".to_string(), "<digit>".to_string()]);
    rules.insert("<var>".to_string(), vec!["x".to_string(), "y".to_string(), "z".to_string()]);
    rules.insert("<digit>".to_string(), vec!["0".to_string(), "1".to_string()]);
    Grammar::new(rules)
}

/// §8 scenario 1: simple equality between two quantified `<var>`s parses, and a parse/unparse/
/// parse round trip yields a structurally equal formula.
#[test]
fn simple_equality_round_trips_through_unparse_and_reparse() {
    let grammar = lang_grammar();
    let source = "forall <var> var_1 in start: forall <var> var_2 in start: (= var_1 var_2)";

    let parsed = parser::parse(source, &grammar).expect("formula should parse");
    let unparsed = parser::unparse(&parsed.formula, &parsed.start_variable);
    let reparsed = parser::parse(&unparsed, &grammar).expect("unparsed formula should reparse");

    assert_eq!(parsed.formula, reparsed.formula);
}

/// §8 scenario 5: an omitted variable name and an omitted `in` clause default exactly as an
/// explicit quantifier targeting `start` with the nonterminal's own name (minus angle brackets).
#[test]
fn default_name_and_default_in_clause_parse_identically_to_the_explicit_form() {
    let grammar = lang_grammar();
    let shorthand = parser::parse(r#"forall <var>: (= <var> "x")"#, &grammar).unwrap();
    let explicit = parser::parse(r#"forall <var> var in start: (= var "x")"#, &grammar).unwrap();
    assert_eq!(shorthand.formula, explicit.formula);
}

/// §8 scenario 6: `(a and (b or c)) and (d or e)` with distinct atomic literals converts to a
/// disjunction of four conjunctions. Each literal is `before(v_i, v_i)` for a distinctly-named
/// bound variable, so the five literals are structurally distinct (same predicate, different
/// variable), matching the scenario's "atomic a..e" shape without reaching for unrelated SMT leaves.
#[test]
fn dnf_distributes_conjunction_over_disjunction_into_four_distinct_clauses() {
    let grammar = lang_grammar();
    let source = "forall <var> v1 in start: forall <var> v2 in start: forall <var> v3 in start: \
                  forall <var> v4 in start: forall <var> v5 in start: \
                  (before(v1, v1) and (before(v2, v2) or before(v3, v3))) and (before(v4, v4) or before(v5, v5))";
    let parsed = parser::parse(source, &grammar).unwrap();
    let nnf = convert_to_nnf(&parsed.formula);
    let dnf = convert_to_dnf(&nnf);

    // Unwrap the five nested foralls to reach the propositional core.
    let mut core = &dnf;
    for _ in 0..5 {
        core = match core {
            Formula::Forall(data) => data.inner.as_ref(),
            other => panic!("expected a forall, got {other:?}"),
        };
    }

    match core {
        Formula::Disjunctive(disjuncts) => {
            assert_eq!(disjuncts.len(), 4, "expected exactly four conjunctive clauses, got {disjuncts:?}");
            for clause in disjuncts {
                match clause {
                    Formula::Conjunctive(literals) => assert_eq!(literals.len(), 3),
                    other => panic!("expected a conjunction of three literals, got {other:?}"),
                }
            }
        }
        other => panic!("expected a top-level disjunction, got {other:?}"),
    }
}

/// A bind expression recovers the path of every bound variable from a tree shaped like the
/// flattening it was built from (§8 invariant 7/8, using the `<assgn>` shape from §8 scenario 2).
#[test]
fn bind_expression_recovers_bound_variable_paths_from_a_concrete_assignment() {
    let bind = BindExpression::new(vec![
        BoundElement::Variable(Variable::bound("l1", "<var>")),
        BoundElement::Variable(Variable::dummy(":=")),
        BoundElement::Variable(Variable::bound("r1", "<rhs>")),
    ]);
    let tree = DerivationTree::inner(
        "<assgn>",
        vec![
            DerivationTree::inner("<var>", vec![DerivationTree::terminal("x")]),
            DerivationTree::terminal(":="),
            DerivationTree::inner("<rhs>", vec![DerivationTree::inner("<var>", vec![DerivationTree::terminal("y")])]),
        ],
    );

    let bindings = bind.match_tree(&tree).expect("template should match the assignment");
    let l1 = Variable::bound("l1", "<var>");
    let r1 = Variable::bound("r1", "<rhs>");
    assert_eq!(bindings.get(&l1), Some(&vec![0]));
    assert_eq!(bindings.get(&r1), Some(&vec![2]));
    assert_eq!(tree.get_subtree(bindings.get(&l1).unwrap()).unwrap().value(), "<var>");
}

/// §8 scenario 3: a match expression whose dummy text spans the grammar's own split between `:`
/// and `=` tokens still matches, by splitting the dummy across the two adjacent terminal leaves.
#[test]
fn match_expression_splits_a_terminal_dummy_across_adjacent_leaves() {
    let bind = BindExpression::new(vec![
        BoundElement::Variable(Variable::bound("k", "<id>")),
        BoundElement::Variable(Variable::dummy(":=")),
        BoundElement::Variable(Variable::bound("v", "<value>")),
    ]);
    let tree = DerivationTree::inner(
        "<kv>",
        vec![
            DerivationTree::inner("<id>", vec![DerivationTree::terminal("k")]),
            DerivationTree::terminal(":"),
            DerivationTree::terminal("="),
            DerivationTree::inner("<value>", vec![DerivationTree::terminal("v")]),
        ],
    );

    let bindings = bind.match_tree(&tree).expect("dummy should split across ':' and '='");
    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings.get(&Variable::bound("k", "<id>")), Some(&vec![0]));
    assert_eq!(bindings.get(&Variable::bound("v", "<value>")), Some(&vec![3]));
}

/// §8 scenario 4 (XPath desugaring): `var.<child>` addressing desugars into a nested `forall`
/// over the child nonterminal, and the desugared formula unparses back to an equivalent,
/// reparseable surface form.
#[test]
fn xpath_shorthand_desugars_into_a_nested_quantifier() {
    let mut rules = HashMap::new();
    rules.insert("<start>".to_string(), vec!["<outer>".to_string()]);
    rules.insert("<outer>".to_string(), vec!["<inner>".to_string()]);
    rules.insert("<inner>".to_string(), vec!["a".to_string(), "b".to_string()]);
    let grammar = Grammar::new(rules);

    let parsed = parser::parse(r#"(= <outer>.<inner> "a")"#, &grammar).unwrap();
    match &parsed.formula {
        Formula::Forall(outer) => match outer.inner.as_ref() {
            Formula::Forall(inner) => {
                assert_eq!(inner.bound_variable.n_type, "<inner>");
            }
            other => panic!("expected a nested forall over <inner>, got {other:?}"),
        },
        other => panic!("expected the xpath to lift to an outer forall over <outer>, got {other:?}"),
    }

    let unparsed = parser::unparse(&parsed.formula, &parsed.start_variable);
    let reparsed = parser::parse(&unparsed, &grammar).unwrap();
    assert_eq!(parsed.formula, reparsed.formula);
}

/// §8 scenario 4 (XPath desugaring), the hard case: `<xml-open-tag>` has two structurally
/// different alternatives (with and without an attribute), both containing `<id>`, so
/// `<xml-tree>.<xml-open-tag>.<id>` cannot desugar into one shared nested `forall` the way the
/// single-alternative case above does. It must desugar into an explicit disjunction, one branch
/// per alternative of `<xml-open-tag>`, each quantifying its own occurrence of `<id>`.
#[test]
fn xpath_through_a_multi_alternative_nonterminal_desugars_into_a_disjunction() {
    let mut rules = HashMap::new();
    rules.insert("<start>".to_string(), vec!["<xml-tree>".to_string()]);
    rules.insert("<xml-tree>".to_string(), vec!["<xml-open-tag>".to_string()]);
    rules.insert(
        "<xml-open-tag>".to_string(),
        vec!["open <id> close".to_string(), "open <id> space <xml-attribute> close".to_string()],
    );
    rules.insert("<id>".to_string(), vec!["a".to_string(), "b".to_string()]);
    rules.insert("<xml-attribute>".to_string(), vec!["attr <id>".to_string()]);
    let grammar = Grammar::new(rules);

    let parsed = parser::parse(r#"(= <xml-tree>.<xml-open-tag>.<id> "a")"#, &grammar).unwrap();

    let branches = match &parsed.formula {
        Formula::Forall(outer) => {
            assert_eq!(outer.bound_variable.n_type, "<xml-tree>");
            match outer.inner.as_ref() {
                Formula::Disjunctive(parts) => parts.clone(),
                other => panic!("expected a disjunction over <xml-open-tag>'s alternatives, got {other:?}"),
            }
        }
        other => panic!("expected an outer forall over <xml-tree>, got {other:?}"),
    };

    assert_eq!(branches.len(), 2, "both alternatives of <xml-open-tag> contain <id>");
    for branch in &branches {
        match branch {
            Formula::Forall(data) => {
                assert_eq!(data.bound_variable.n_type, "<xml-open-tag>");
                assert!(data.bind_expression.is_some(), "each branch should narrow <xml-open-tag> to one alternative's shape");
                assert!(matches!(data.inner.as_ref(), Formula::Smt(_)), "each branch's body is the original equality");
            }
            other => panic!("expected a forall over <xml-open-tag>, got {other:?}"),
        }
    }

    let unparsed = parser::unparse(&parsed.formula, &parsed.start_variable);
    let reparsed = parser::parse(&unparsed, &grammar).unwrap();
    assert_eq!(parsed.formula, reparsed.formula);
}

/// `before` is one of the stable structural predicates §6 names; this checks it is wired through
/// the parser end to end (not just unit-tested against raw paths in `formula::predicate`).
#[test]
fn before_predicate_parses_and_is_grounded_on_lexicographic_path_order() {
    let grammar = lang_grammar();
    let parsed = parser::parse("forall <var> a in start: forall <var> b in start: before(a, b)", &grammar).unwrap();
    match &parsed.formula {
        Formula::Forall(outer) => match outer.inner.as_ref() {
            Formula::Forall(inner) => match inner.inner.as_ref() {
                Formula::StructuralPredicate { predicate, .. } => assert_eq!(predicate.name, BEFORE.name),
                other => panic!("expected a before(...) predicate call, got {other:?}"),
            },
            other => panic!("expected a nested forall, got {other:?}"),
        },
        other => panic!("expected an outer forall, got {other:?}"),
    }
}

/// A tree built straight from the grammar façade's own deterministic expansion round-trips
/// through the `ParseTree` interchange form unchanged (§8 round-trip property, using `grammar`'s
/// output rather than a hand-built tree).
#[test]
fn grammar_expansion_round_trips_through_parse_tree_form() {
    let grammar = lang_grammar();
    let tree = grammar.expand_to_some_tree("<assgn>", 10);
    assert!(tree.is_complete());
    let parse_tree = tree.to_parse_tree();
    let rebuilt = DerivationTree::from_parse_tree(&parse_tree);
    assert!(rebuilt.structurally_equal(&tree));
}
