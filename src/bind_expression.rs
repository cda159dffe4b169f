//! Match expressions (§3 "Bind expression", §4.2): a template of bound variables, fixed terminal
//! fragments and optional groups attached to a quantifier, used both to build a placeholder
//! "tree prefix" for a nonterminal and to match an already-expanded subtree against that
//! template, binding each of its variables to a path.

use crate::grammar::Grammar;
use crate::tree::{DerivationTree, Path};
use crate::variable::Variable;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// One element of a bind expression template: either a variable (a bound nonterminal variable or
/// an anonymous dummy standing for fixed terminal text) or an optional group that may or may not
/// participate in a given match.
#[derive(Clone, Debug)]
pub enum BoundElement {
    Variable(Variable),
    Optional(Vec<BoundElement>),
}

/// A parsed match expression. Caches are local to one instance (interior mutability), not global
/// state, matching §5's single-threaded, mostly-immutable design.
#[derive(Clone, Debug)]
pub struct BindExpression {
    elements: Vec<BoundElement>,
    flattened: RefCell<Option<Vec<Vec<Variable>>>>,
    prefixes: RefCell<HashMap<String, (DerivationTree, HashMap<Variable, Path>)>>,
}

impl BindExpression {
    pub fn new(elements: Vec<BoundElement>) -> Self {
        BindExpression {
            elements,
            flattened: RefCell::new(None),
            prefixes: RefCell::new(HashMap::new()),
        }
    }

    pub fn elements(&self) -> &[BoundElement] {
        &self.elements
    }

    /// Every non-dummy variable mentioned anywhere in the template, including inside optional
    /// groups (a variable bound only inside an optional group is still a variable the enclosing
    /// quantifier's formula may reference).
    pub fn all_bound_variables(&self) -> Vec<Variable> {
        fn walk(elements: &[BoundElement], out: &mut Vec<Variable>) {
            for element in elements {
                match element {
                    BoundElement::Variable(v) if !v.is_dummy() => out.push(v.clone()),
                    BoundElement::Variable(_) => {}
                    BoundElement::Optional(inner) => walk(inner, out),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.elements, &mut out);
        out
    }

    /// Rebuilds this template with every non-dummy variable passed through `f`, used by
    /// bound-variable uniquification to keep a match expression's own variables in step with a
    /// rename applied to the quantifier that owns it.
    pub fn map_variables(&self, f: &mut dyn FnMut(&Variable) -> Variable) -> BindExpression {
        fn map_elements(elements: &[BoundElement], f: &mut dyn FnMut(&Variable) -> Variable) -> Vec<BoundElement> {
            elements
                .iter()
                .map(|element| match element {
                    BoundElement::Variable(v) => BoundElement::Variable(f(v)),
                    BoundElement::Optional(inner) => BoundElement::Optional(map_elements(inner, f)),
                })
                .collect()
        }
        BindExpression::new(map_elements(&self.elements, f))
    }

    /// Every way of resolving the optional groups, flattened to a single sequence of variables,
    /// most-inclusive alternative first. Memoized since the same bind expression is matched
    /// against many candidate subtrees.
    fn flattened_alternatives(&self) -> Vec<Vec<Variable>> {
        if let Some(cached) = self.flattened.borrow().as_ref() {
            return cached.clone();
        }
        let computed = expand(&self.elements);
        *self.flattened.borrow_mut() = Some(computed.clone());
        computed
    }

    /// Builds a representative tree for `nonterminal` together with the path of every bound
    /// variable within it (§4.2 "Tree prefix", Testable Properties #7/#8).
    ///
    /// Tries each flattening in turn (most-inclusive first) until one is valid for
    /// `nonterminal`: a flattening is valid if, after filling each of its nonterminal-typed
    /// bound variables with some grammar-consistent expansion and concatenating the result into
    /// one string, that string can be parsed with `nonterminal` as the start symbol (§4.2
    /// "Validity filter"). Once a flattening parses, the flattening is matched back onto the
    /// parsed tree (the same backtracking alignment [`BindExpression::match_tree`] uses) to
    /// recover the path of every bound variable. Returns `None` if no flattening has a valid
    /// parse for `nonterminal` (§4.2: "returns empty list, not an error" — the analogous case
    /// here, since a bind expression can target a nonterminal its template simply cannot shape).
    ///
    /// The pair is cached per nonterminal; a cache hit still returns a tree with fresh
    /// identities (`DerivationTree::new_ids`) so the same prefix can be inserted into a formula
    /// more than once without two insertions sharing identities.
    pub fn to_tree_prefix(&self, nonterminal: &str, grammar: &Grammar) -> Option<(DerivationTree, HashMap<Variable, Path>)> {
        if let Some((tree, positions)) = self.prefixes.borrow().get(nonterminal) {
            return Some((tree.new_ids(), positions.clone()));
        }

        for flattening in self.flattened_alternatives() {
            if let Some((tree, positions)) = build_tree_prefix(&flattening, nonterminal, grammar) {
                self.prefixes
                    .borrow_mut()
                    .insert(nonterminal.to_string(), (tree.clone(), positions.clone()));
                return Some((tree, positions));
            }
        }
        None
    }

    /// Matches `tree` (the subtree bound to the enclosing quantifier's variable) against this
    /// template, trying each flattening from most- to least-inclusive until one aligns. Returns a
    /// path for every non-dummy variable of the winning flattening.
    ///
    /// Matching walks every node of `tree` in pre-order, not just its direct children: a bound
    /// variable consumes the first node (at any depth) whose root label equals its nonterminal
    /// type, pruning that node's own descendants from further consideration, and a dummy's fixed
    /// text may span several adjacent leaves (terminal-dummy splitting). A recursive nonterminal
    /// can make the greedy left-to-right walk bind a variable to an outer occurrence when an
    /// inner one was intended; when the greedy walk leaves some of `tree` unconsumed, matching
    /// retries by excluding growing subsets of the failed attempt's `(path, variable)` matches,
    /// smallest exclusion set first, until one retry consumes the whole tree.
    pub fn match_tree(&self, tree: &DerivationTree) -> Option<HashMap<Variable, Path>> {
        let paths = preorder_paths(tree);
        for alternative in self.flattened_alternatives() {
            if let Some(bindings) = match_with_backtracking(tree, &paths, &alternative, &HashSet::new()) {
                return Some(bindings);
            }
        }
        None
    }
}

impl PartialEq for BindExpression {
    fn eq(&self, other: &Self) -> bool {
        bound_elements_eq(&self.elements, &other.elements)
    }
}

impl Eq for BindExpression {}

impl std::hash::Hash for BindExpression {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        hash_bound_elements(&self.elements, state);
    }
}

fn bound_elements_eq(a: &[BoundElement], b: &[BoundElement]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|(x, y)| match (x, y) {
            (BoundElement::Variable(v1), BoundElement::Variable(v2)) => v1 == v2,
            (BoundElement::Optional(i1), BoundElement::Optional(i2)) => bound_elements_eq(i1, i2),
            _ => false,
        })
}

fn hash_bound_elements<H: std::hash::Hasher>(elements: &[BoundElement], state: &mut H) {
    for element in elements {
        match element {
            BoundElement::Variable(v) => {
                state.write_u8(0);
                v.hash(state);
            }
            BoundElement::Optional(inner) => {
                state.write_u8(1);
                hash_bound_elements(inner, state);
            }
        }
    }
}

impl fmt::Display for BindExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn render(elements: &[BoundElement], f: &mut fmt::Formatter) -> fmt::Result {
            for element in elements {
                match element {
                    BoundElement::Variable(v) if v.is_dummy() => write!(f, "{}", v.n_type)?,
                    BoundElement::Variable(v) => write!(f, "{{{} {}}}", v.n_type, v.name)?,
                    BoundElement::Optional(inner) => {
                        write!(f, "[")?;
                        render(inner, f)?;
                        write!(f, "]")?;
                    }
                }
            }
            Ok(())
        }
        render(&self.elements, f)
    }
}

/// All resolutions of the optional groups in `elements`, most-inclusive first.
fn expand(elements: &[BoundElement]) -> Vec<Vec<Variable>> {
    match elements.split_first() {
        None => vec![Vec::new()],
        Some((head, rest)) => {
            let rest_options = expand(rest);
            let mut result = Vec::new();
            match head {
                BoundElement::Variable(v) => {
                    for tail in &rest_options {
                        let mut combined = vec![v.clone()];
                        combined.extend(tail.clone());
                        result.push(combined);
                    }
                }
                BoundElement::Optional(inner) => {
                    let inner_options = expand(inner);
                    for inner_opt in &inner_options {
                        for tail in &rest_options {
                            let mut combined = inner_opt.clone();
                            combined.extend(tail.clone());
                            result.push(combined);
                        }
                    }
                    result.extend(rest_options.iter().cloned());
                }
            }
            result
        }
    }
}

/// One flattening's attempt at §4.2's tree-prefix construction sequence: fill each bound
/// variable with a filler string, concatenate, parse against `grammar` with `nonterminal` as the
/// start symbol, then match `flattening` back onto the parsed tree to recover every bound
/// variable's path. `None` if the concatenated string has no parse, or (degenerately) if the
/// flattening that produced it somehow fails to match back onto its own parse tree.
fn build_tree_prefix(
    flattening: &[Variable],
    nonterminal: &str,
    grammar: &Grammar,
) -> Option<(DerivationTree, HashMap<Variable, Path>)> {
    let mut text = String::new();
    for var in flattening {
        if var.is_dummy() {
            text.push_str(&var.n_type);
        } else {
            text.push_str(&grammar.expand_to_some_tree(&var.n_type, 10).to_display_string(true));
        }
    }

    let tree = grammar.parse(&text, nonterminal)?;
    let paths = preorder_paths(&tree);
    let positions = match_with_backtracking(&tree, &paths, flattening, &HashSet::new())?;
    Some((tree, positions))
}

/// Every path of `tree` (including the tree's own, empty path), in pre-order.
fn preorder_paths(tree: &DerivationTree) -> Vec<Path> {
    fn walk(tree: &DerivationTree, prefix: &mut Path, out: &mut Vec<Path>) {
        out.push(prefix.clone());
        if let Some(children) = tree.children() {
            for (i, child) in children.iter().enumerate() {
                prefix.push(i);
                walk(child, prefix, out);
                prefix.pop();
            }
        }
    }
    let mut out = Vec::new();
    let mut prefix = Vec::new();
    walk(tree, &mut prefix, &mut out);
    out
}

/// One pass over `paths` in order, greedily consuming one bound variable at a time. A node that
/// doesn't match the current bound variable is silently skipped rather than failing the whole
/// match; success requires every path to have been consumed (by a match, by pruning as a matched
/// node's descendant, or by being skipped past) and every bound variable to have found one.
/// Returns the partial binding map even on failure, so the caller can drive backtracking from it.
fn match_without_backtracking(
    tree: &DerivationTree,
    paths: &[Path],
    bound_variables: &[Variable],
    excluded: &HashSet<(Path, Variable)>,
) -> (bool, HashMap<Variable, Path>) {
    let mut result: HashMap<Variable, Path> = HashMap::new();
    let mut remaining_paths: VecDeque<Path> = paths.iter().cloned().collect();
    let mut remaining_vars: VecDeque<Variable> = bound_variables.iter().cloned().collect();
    let mut curr = remaining_vars.pop_front();

    while !remaining_paths.is_empty() && curr.is_some() {
        let path = remaining_paths.pop_front().unwrap();
        let Some(subtree) = tree.get_subtree(&path) else {
            continue;
        };
        let subtree_str = subtree.to_display_string(false);
        let original = curr.clone().unwrap();
        let mut elem = original.clone();
        let mut split = false;

        // Divide a terminal dummy that only overlaps part of this node's text (e.g. a dummy
        // "xmlns:" unifying with an ID prefix "xmlns", leaving ":" for the next sibling).
        if elem.is_dummy()
            && subtree_str.chars().count() < elem.n_type.chars().count()
            && elem.n_type.starts_with(subtree_str.as_str())
        {
            let remainder = Variable::dummy(elem.n_type[subtree_str.len()..].to_string());
            remaining_vars.push_front(remainder);
            elem = Variable::dummy(subtree_str.clone());
            split = true;
        }

        let is_match = (split || !excluded.contains(&(path.clone(), elem.clone())))
            && (subtree.value() == elem.n_type || (elem.is_dummy() && subtree_str == elem.n_type));

        if is_match {
            result.insert(elem.clone(), path.clone());
            curr = remaining_vars.pop_front();
            let prefix_len = path.len();
            remaining_paths.retain(|p| !(p.len() >= prefix_len && p[..prefix_len] == path[..]));
        }
    }

    let success = remaining_paths.is_empty() && curr.is_none();
    (success, result)
}

/// Tries `bound_variables` against `paths` once; on failure, retries with growing exclusion sets
/// drawn from the failed attempt's own matches (smallest first), so a match that was too greedy
/// about a recursive nonterminal can be steered toward a different occurrence.
fn match_with_backtracking(
    tree: &DerivationTree,
    paths: &[Path],
    bound_variables: &[Variable],
    excluded: &HashSet<(Path, Variable)>,
) -> Option<HashMap<Variable, Path>> {
    if bound_variables.is_empty() {
        return None;
    }

    let (success, result) = match_without_backtracking(tree, paths, bound_variables, excluded);
    if success {
        return Some(result);
    }

    if !excluded.is_empty() {
        return None;
    }

    let entries: Vec<(Path, Variable)> = result.into_iter().map(|(v, p)| (p, v)).collect();
    for k in 1..=entries.len() {
        for combo in combinations(&entries, k) {
            let retry_excluded: HashSet<(Path, Variable)> = combo.into_iter().collect();
            if let Some(bindings) = match_with_backtracking(tree, paths, bound_variables, &retry_excluded) {
                return Some(bindings);
            }
        }
    }
    None
}

/// Every `k`-element subset of `items`, as a list of owned clones.
fn combinations<T: Clone>(items: &[T], k: usize) -> Vec<Vec<T>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    let Some((first, rest)) = items.split_first() else {
        return Vec::new();
    };
    let mut result: Vec<Vec<T>> = combinations(rest, k - 1)
        .into_iter()
        .map(|mut combo| {
            combo.insert(0, first.clone());
            combo
        })
        .collect();
    result.extend(combinations(rest, k));
    result
}
