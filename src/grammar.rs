//! Read-only access to a context-free grammar: alternatives of a nonterminal, reachability
//! between nonterminals, and a deterministic "expand to some tree" utility used to build
//! placeholder subtrees for match-expression tree prefixes (§4.1, §4.2).
//!
//! The search solver, grammar-graph k-path analysis, and Earley parsing belong to external
//! collaborators (§1 "Out of scope"); this module only offers what the core needs from a
//! grammar: alternatives, reachability, and a single deterministic expansion strategy.

use crate::tree::DerivationTree;
use std::collections::{HashMap, HashSet, VecDeque};

/// Reserved start symbol, by convention `<start>`.
pub const START_SYMBOL: &str = "<start>";

/// Bounds nonterminal recursion in [`Grammar::parse`] so a cyclic grammar rule cannot recurse
/// forever while looking for a way to account for the input text.
const PARSE_DEPTH_BUDGET: usize = 24;

/// A nonterminal token is written `<name>`.
pub fn is_nonterminal(symbol: &str) -> bool {
    symbol.starts_with('<') && symbol.ends_with('>') && symbol.len() > 2
}

/// Splits a string containing interleaved terminal text and `<nonterminal>` tokens into its
/// parts, in order, dropping empty terminal fragments. Used both for bind-expression parsing
/// (splitting a bound-element template string) and for alternative expansion.
pub fn split_nonterminals(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut fragment_start = 0;

    while let Some((idx, ch)) = chars.next() {
        if ch != '<' {
            continue;
        }
        // Find the matching '>' for this '<', if any; otherwise '<' is just a literal char.
        if let Some(end) = text[idx..].find('>') {
            let end = idx + end + 1;
            if idx > fragment_start {
                result.push(text[fragment_start..idx].to_string());
            }
            result.push(text[idx..end].to_string());
            fragment_start = end;
            // Skip chars already consumed by the nonterminal token.
            while let Some(&(next_idx, _)) = chars.peek() {
                if next_idx < end {
                    chars.next();
                } else {
                    break;
                }
            }
        }
    }

    if fragment_start < text.len() {
        result.push(text[fragment_start..].to_string());
    }

    result.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Read-only facade over a context-free grammar: nonterminal label -> ordered alternatives.
#[derive(Clone, Debug, Default)]
pub struct Grammar {
    rules: HashMap<String, Vec<String>>,
}

impl Grammar {
    pub fn new(rules: HashMap<String, Vec<String>>) -> Self {
        Grammar { rules }
    }

    pub fn is_defined(&self, nonterminal: &str) -> bool {
        self.rules.contains_key(nonterminal)
    }

    /// Ordered alternatives for `nonterminal`, or an empty slice if undefined.
    pub fn alternatives(&self, nonterminal: &str) -> &[String] {
        self.rules
            .get(nonterminal)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Nonterminals directly referenced by any alternative of `nonterminal`.
    fn direct_successors(&self, nonterminal: &str) -> HashSet<String> {
        self.alternatives(nonterminal)
            .iter()
            .flat_map(|alt| split_nonterminals(alt))
            .filter(|tok| is_nonterminal(tok))
            .collect()
    }

    /// Whether `to` is reachable from `from` by zero or more expansion steps.
    pub fn is_reachable(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(from.to_string());
        seen.insert(from.to_string());

        while let Some(current) = queue.pop_front() {
            for successor in self.direct_successors(&current) {
                if successor == to {
                    return true;
                }
                if seen.insert(successor.clone()) {
                    queue.push_back(successor);
                }
            }
        }

        false
    }

    /// Builds a complete (no open leaves) derivation tree for `nonterminal` by repeatedly
    /// choosing, at each step, the alternative with the fewest nonterminal occurrences (ties
    /// broken by declaration order). This is a deterministic stand-in for "some valid expansion",
    /// used only to manufacture placeholder subtrees for bind-expression tree prefixes — the
    /// actual search solver (out of scope, §1) is responsible for interesting expansions.
    ///
    /// `depth_budget` bounds recursion on cyclic grammars; once exhausted, an alternative with no
    /// nonterminal references is preferred if one exists, and the smallest alternative is chosen
    /// as a last resort even if it still contains nonterminals (those subtrees are left open).
    pub fn expand_to_some_tree(&self, nonterminal: &str, depth_budget: usize) -> DerivationTree {
        if !self.is_defined(nonterminal) {
            return DerivationTree::open_leaf(nonterminal);
        }

        let alternatives = self.alternatives(nonterminal);
        let chosen = self.choose_alternative(alternatives, depth_budget);

        let Some(alternative) = chosen else {
            return DerivationTree::open_leaf(nonterminal);
        };

        let parts = split_nonterminals(&alternative);
        let children: Vec<DerivationTree> = parts
            .into_iter()
            .map(|part| {
                if is_nonterminal(&part) {
                    if depth_budget == 0 {
                        DerivationTree::open_leaf(part)
                    } else {
                        self.expand_to_some_tree(&part, depth_budget - 1)
                    }
                } else {
                    DerivationTree::terminal(part)
                }
            })
            .collect();

        DerivationTree::inner(nonterminal.to_string(), children)
    }

    /// Parses `text` against `nonterminal` as the start symbol, returning a derivation tree
    /// rooted at `nonterminal` if the whole of `text` is accounted for by some alternative.
    /// Backtracks over every alternative and every nonterminal's possible split of the
    /// remaining text, so an earlier nonterminal that first matched too much or too little of
    /// `text` can still be revisited once a later part of the sequence fails.
    ///
    /// Stands in for the Earley-style parsing service §1/§2 treats as an external collaborator:
    /// the bind-expression tree prefix (§4.2) is the one place the core needs to turn a
    /// concatenated string back into a tree shaped by the grammar, so a small bounded-depth
    /// backtracking recognizer is carried in-crate for that one purpose rather than reaching for
    /// a full external parser. `depth_budget` bounds nonterminal recursion so a cyclic grammar
    /// cannot loop forever; once exhausted, that branch simply fails to parse.
    pub fn parse(&self, text: &str, nonterminal: &str) -> Option<DerivationTree> {
        self.parse_nonterminal(text, nonterminal, PARSE_DEPTH_BUDGET)
            .into_iter()
            .find(|(_, rest)| rest.is_empty())
            .map(|(tree, _)| tree)
    }

    fn parse_nonterminal<'a>(
        &self,
        text: &'a str,
        nonterminal: &str,
        depth_budget: usize,
    ) -> Vec<(DerivationTree, &'a str)> {
        if depth_budget == 0 || !self.is_defined(nonterminal) {
            return Vec::new();
        }
        let mut results = Vec::new();
        for alternative in self.alternatives(nonterminal) {
            let parts = split_nonterminals(alternative);
            for (children, rest) in self.parse_sequence(text, &parts, depth_budget - 1) {
                results.push((DerivationTree::inner(nonterminal.to_string(), children), rest));
            }
        }
        results
    }

    /// Parses as much of `parts` (a mix of terminal fragments and nonterminal tokens, in order)
    /// as matches a prefix of `text`, returning every `(children, remaining text)` outcome.
    fn parse_sequence<'a>(
        &self,
        text: &'a str,
        parts: &[String],
        depth_budget: usize,
    ) -> Vec<(Vec<DerivationTree>, &'a str)> {
        let Some((head, rest_parts)) = parts.split_first() else {
            return vec![(Vec::new(), text)];
        };

        let mut results = Vec::new();
        if is_nonterminal(head) {
            for (subtree, rest_text) in self.parse_nonterminal(text, head, depth_budget) {
                for (mut tail, final_rest) in self.parse_sequence(rest_text, rest_parts, depth_budget) {
                    let mut children = vec![subtree.clone()];
                    children.append(&mut tail);
                    results.push((children, final_rest));
                }
            }
        } else if let Some(remaining) = text.strip_prefix(head.as_str()) {
            for (mut tail, final_rest) in self.parse_sequence(remaining, rest_parts, depth_budget) {
                let mut children = vec![DerivationTree::terminal(head.clone())];
                children.append(&mut tail);
                results.push((children, final_rest));
            }
        }
        results
    }

    fn choose_alternative(&self, alternatives: &[String], depth_budget: usize) -> Option<String> {
        if alternatives.is_empty() {
            return None;
        }

        if depth_budget == 0 {
            if let Some(terminal_only) = alternatives
                .iter()
                .find(|alt| !split_nonterminals(alt).iter().any(|t| is_nonterminal(t)))
            {
                return Some(terminal_only.clone());
            }
        }

        alternatives
            .iter()
            .min_by_key(|alt| {
                split_nonterminals(alt)
                    .iter()
                    .filter(|t| is_nonterminal(t))
                    .count()
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var_grammar() -> Grammar {
        let mut rules = HashMap::new();
        rules.insert(
            "<start>".to_string(),
            vec!["<assgn_list>".to_string()],
        );
        rules.insert(
            "<assgn_list>".to_string(),
            vec![
                "<assgn>; <assgn_list>".to_string(),
                "<assgn>".to_string(),
            ],
        );
        rules.insert(
            "<assgn>".to_string(),
            vec!["<var> := <rhs>".to_string()],
        );
        rules.insert(
            "<rhs>".to_string(),
            vec!["<var>".to_string(), "<digit>".to_string()],
        );
        rules.insert(
            "<var>".to_string(),
            vec!["x".to_string(), "y".to_string(), "z".to_string()],
        );
        rules.insert(
            "<digit>".to_string(),
            (0..10).map(|d| d.to_string()).collect(),
        );
        Grammar::new(rules)
    }

    #[test]
    fn split_nonterminals_handles_mixed_text() {
        assert_eq!(
            split_nonterminals("<var> := <rhs>"),
            vec!["<var>", " := ", "<rhs>"]
        );
        assert_eq!(split_nonterminals("abc"), vec!["abc"]);
        assert_eq!(split_nonterminals("<a><b>"), vec!["<a>", "<b>"]);
    }

    #[test]
    fn reachability_is_transitive() {
        let g = var_grammar();
        assert!(g.is_reachable("<start>", "<var>"));
        assert!(g.is_reachable("<assgn>", "<digit>"));
        assert!(!g.is_reachable("<digit>", "<var>"));
        assert!(g.is_reachable("<var>", "<var>"));
    }

    #[test]
    fn expand_to_some_tree_produces_closed_tree() {
        let g = var_grammar();
        let tree = g.expand_to_some_tree("<assgn>", 10);
        assert!(tree.is_complete());
        assert_eq!(tree.root_nonterminal(), "<assgn>");
    }

    #[test]
    fn parse_recovers_a_tree_shaped_by_the_grammar() {
        let g = var_grammar();
        let tree = g.parse("x := 3", "<assgn>").expect("should parse a valid assignment");
        assert_eq!(tree.root_nonterminal(), "<assgn>");
        assert_eq!(tree.to_display_string(false), "x := 3");
        let children = tree.children().unwrap();
        assert_eq!(children[0].value(), "<var>");
        assert_eq!(children[2].value(), "<rhs>");
    }

    #[test]
    fn parse_rejects_text_no_alternative_can_account_for() {
        let g = var_grammar();
        assert!(g.parse("x := q", "<assgn>").is_none());
        assert!(g.parse("x := 3 extra", "<assgn>").is_none());
    }
}
