//! Structural and semantic predicates (§4.3, §6 "Embedders may register additional predicates").
//!
//! A predicate is a named, fixed-arity callback. Structural predicates answer a yes/no question
//! about positions in a tree (`before`, `same_position`); semantic predicates may additionally
//! propose a tree repair when they fail, which is how constraints like "these two trees are the
//! same length" can drive the search solver toward a fix instead of only rejecting candidates.
//! Registration of new predicates belongs to the embedder (the search solver, out of scope here);
//! this module only defines the shape and a handful of built-ins used by the parser and tests.

use crate::tree::{DerivationTree, Path};
use crate::variable::Variable;
use std::collections::HashMap;

/// An argument to a predicate call: either a variable to be resolved against the enclosing
/// quantifiers' bindings, or a derivation tree already fixed at formula-construction time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PredicateArg {
    Variable(Variable),
    Tree(DerivationTree),
}

impl PredicateArg {
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            PredicateArg::Variable(v) => Some(v),
            PredicateArg::Tree(_) => None,
        }
    }
}

/// A structural predicate: total, side-effect free, answers true/false given the paths its
/// variable arguments resolve to within one reference tree. `args` carries the full call (so a
/// predicate like `level` can read its literal, non-variable arguments); `paths` is parallel to
/// `args` and holds a resolved path for every `PredicateArg::Variable` slot (unused, empty slots
/// for `PredicateArg::Tree` ones).
#[derive(Clone, Copy)]
pub struct StructuralPredicate {
    pub name: &'static str,
    pub arity: usize,
    pub evaluate: fn(&DerivationTree, &[PredicateArg], &[Path]) -> bool,
}

impl std::fmt::Debug for StructuralPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "StructuralPredicate({})", self.name)
    }
}

impl PartialEq for StructuralPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for StructuralPredicate {}

/// The outcome of evaluating a semantic predicate: true, false, or a proposed repair mapping
/// paths (within some argument tree) to replacement subtrees that would make the predicate hold.
#[derive(Clone, Debug, PartialEq)]
pub enum SemPredEvalResult {
    True,
    False,
    Repair(HashMap<Path, DerivationTree>),
}

impl SemPredEvalResult {
    pub fn is_true(&self) -> bool {
        matches!(self, SemPredEvalResult::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, SemPredEvalResult::False)
    }

    pub fn proposes_repair(&self) -> bool {
        matches!(self, SemPredEvalResult::Repair(_))
    }
}

/// A semantic predicate: like a structural predicate, but may read and reason about the actual
/// string content of its tree arguments (not just their position), and may fail with a repair
/// proposal instead of a flat `false`. Takes the same `(reference, args, paths)` triple as a
/// structural predicate's `evaluate` so a failing check can address the argument it wants to
/// repair by path, not just by value.
#[derive(Clone, Copy)]
pub struct SemanticPredicate {
    pub name: &'static str,
    pub arity: usize,
    pub evaluate: fn(&DerivationTree, &[PredicateArg], &[Path]) -> SemPredEvalResult,
    /// For each argument index, whether the predicate call *introduces* (binds) that tree rather
    /// than merely reading an already-bound one. Mirrors `binds_nothing` / `binds_argument_trees`
    /// in the originating implementation.
    pub binds_argument: fn(usize) -> bool,
}

impl SemanticPredicate {
    pub fn binds_nothing(&self) -> bool {
        (0..self.arity).all(|i| !(self.binds_argument)(i))
    }
}

impl std::fmt::Debug for SemanticPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "SemanticPredicate({})", self.name)
    }
}

impl PartialEq for SemanticPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for SemanticPredicate {}

fn never_binds(_index: usize) -> bool {
    false
}

fn before_impl(_reference: &DerivationTree, _args: &[PredicateArg], paths: &[Path]) -> bool {
    // `path1` occurs before `path2` in a pre-order, left-to-right walk: true exactly when
    // `path1` is lexicographically smaller at the first index where they differ, and neither is
    // a prefix of the other (a node is not "before" its own descendant).
    let (a, b) = (&paths[0], &paths[1]);
    for (x, y) in a.iter().zip(b.iter()) {
        if x != y {
            return x < y;
        }
    }
    false
}

fn same_position_impl(_reference: &DerivationTree, _args: &[PredicateArg], paths: &[Path]) -> bool {
    paths[0] == paths[1]
}

pub const BEFORE: StructuralPredicate = StructuralPredicate {
    name: "before",
    arity: 2,
    evaluate: before_impl,
};

pub const SAME_POSITION: StructuralPredicate = StructuralPredicate {
    name: "same_position",
    arity: 2,
    evaluate: same_position_impl,
};

/// `level(rel, level_nt, a, b)`: compares the number of `level_nt`-labelled ancestors strictly
/// above `a` against the number strictly above `b`, under the relation named by `rel` (one of
/// `"EQ"`, `"LT"`, `"LE"`, `"GT"`, `"GE"`). `rel` and `level_nt` are literal string arguments;
/// `a` and `b` are variables, so `paths[2]` and `paths[3]` carry their resolved positions
/// (`paths[0]` and `paths[1]` are unused placeholders for the literal slots).
fn level_impl(reference: &DerivationTree, args: &[PredicateArg], paths: &[Path]) -> bool {
    let (PredicateArg::Tree(rel_tree), PredicateArg::Tree(nt_tree)) = (&args[0], &args[1]) else {
        return false;
    };
    let rel = rel_tree.to_display_string(false);
    let level_nt = nt_tree.to_display_string(false);

    let ancestor_count = |path: &Path| -> usize {
        (0..path.len())
            .filter(|&len| {
                reference
                    .get_subtree(&path[..len])
                    .is_some_and(|node| node.value() == level_nt)
            })
            .count()
    };
    let count_a = ancestor_count(&paths[2]);
    let count_b = ancestor_count(&paths[3]);
    match rel.as_str() {
        "EQ" => count_a == count_b,
        "LT" => count_a < count_b,
        "LE" => count_a <= count_b,
        "GT" => count_a > count_b,
        "GE" => count_a >= count_b,
        _ => false,
    }
}

pub const LEVEL: StructuralPredicate = StructuralPredicate {
    name: "level",
    arity: 4,
    evaluate: level_impl,
};

fn count_impl(_reference: &DerivationTree, args: &[PredicateArg], paths: &[Path]) -> SemPredEvalResult {
    // `count(in_tree, needle, result)`: true if `in_tree`'s string contains exactly as many
    // non-overlapping occurrences of `needle` as the (already ground) `result` tree's string
    // denotes as an integer; on mismatch, proposes repairing `result` (at `paths[2]`) to the
    // actual count, which is how a solver drives this predicate from "false" toward "true".
    let (PredicateArg::Tree(haystack), PredicateArg::Tree(needle), PredicateArg::Tree(expected)) =
        (&args[0], &args[1], &args[2])
    else {
        return SemPredEvalResult::False;
    };
    let haystack = haystack.to_display_string(false);
    let needle_str = needle.to_display_string(false);
    let expected_str = expected.to_display_string(false);
    let Ok(expected_count) = expected_str.trim().parse::<usize>() else {
        return SemPredEvalResult::False;
    };
    if needle_str.is_empty() {
        return SemPredEvalResult::False;
    }
    let actual_count = haystack.matches(needle_str.as_str()).count();
    if actual_count == expected_count {
        return SemPredEvalResult::True;
    }
    let mut repair = HashMap::new();
    repair.insert(paths[2].clone(), DerivationTree::terminal(actual_count.to_string()));
    SemPredEvalResult::Repair(repair)
}

pub const COUNT: SemanticPredicate = SemanticPredicate {
    name: "count",
    arity: 3,
    evaluate: count_impl,
    binds_argument: never_binds,
};

fn pad_impl(_reference: &DerivationTree, args: &[PredicateArg], paths: &[Path]) -> SemPredEvalResult {
    // `pad(field, width, fill)`: true if `field`'s string is exactly `width` characters wide and
    // consists of `fill` characters followed by content, i.e. it looks left-padded. On mismatch,
    // proposes repairing `field` (at `paths[0]`) to its content re-padded to `width` with `fill`.
    let (PredicateArg::Tree(field), PredicateArg::Tree(width), PredicateArg::Tree(fill)) =
        (&args[0], &args[1], &args[2])
    else {
        return SemPredEvalResult::False;
    };
    let field_str = field.to_display_string(false);
    let width_str = width.to_display_string(false);
    let fill_str = fill.to_display_string(false);
    let Ok(width_n) = width_str.trim().parse::<usize>() else {
        return SemPredEvalResult::False;
    };
    let Some(fill_char) = fill_str.chars().next() else {
        return SemPredEvalResult::False;
    };

    let is_padded = |s: &str| -> bool {
        if s.chars().count() != width_n {
            return false;
        }
        let pad_len = s.chars().take_while(|&c| c == fill_char).count();
        !s.chars().skip(pad_len).any(|c| c == fill_char)
    };

    if is_padded(&field_str) {
        return SemPredEvalResult::True;
    }

    let content: String = field_str.chars().skip_while(|&c| c == fill_char).collect();
    let content: String = if content.chars().count() > width_n {
        content.chars().skip(content.chars().count() - width_n).collect()
    } else {
        content
    };
    let fill_len = width_n.saturating_sub(content.chars().count());
    let repaired = std::iter::repeat(fill_char).take(fill_len).chain(content.chars()).collect::<String>();

    let mut repair = HashMap::new();
    repair.insert(paths[0].clone(), DerivationTree::terminal(repaired));
    SemPredEvalResult::Repair(repair)
}

pub const PAD: SemanticPredicate = SemanticPredicate {
    name: "pad",
    arity: 3,
    evaluate: pad_impl,
    binds_argument: never_binds,
};

fn checksum_impl(_reference: &DerivationTree, args: &[PredicateArg], paths: &[Path]) -> SemPredEvalResult {
    // `checksum(data, sum)`: true if `sum` (decimal or two-digit hex) equals the sum of `data`'s
    // bytes modulo 256, the style of checksum found in tar-like archive headers. On mismatch,
    // proposes repairing `sum` (at `paths[1]`) to the correct digit, in whichever of the two
    // notations the original field used (all-decimal-digit text stays decimal, anything else is
    // rendered as two-digit hex).
    let (PredicateArg::Tree(data), PredicateArg::Tree(sum)) = (&args[0], &args[1]) else {
        return SemPredEvalResult::False;
    };
    let data_str = data.to_display_string(false);
    let expected = sum.to_display_string(false);
    let actual: u32 = data_str.bytes().map(u32::from).sum::<u32>() % 256;
    let expected = expected.trim();
    if expected.eq_ignore_ascii_case(&format!("{actual:02x}")) || expected == actual.to_string() {
        return SemPredEvalResult::True;
    }
    let corrected = if !expected.is_empty() && expected.chars().all(|c| c.is_ascii_digit()) {
        actual.to_string()
    } else {
        format!("{actual:02x}")
    };
    let mut repair = HashMap::new();
    repair.insert(paths[1].clone(), DerivationTree::terminal(corrected));
    SemPredEvalResult::Repair(repair)
}

pub const CHECKSUM: SemanticPredicate = SemanticPredicate {
    name: "checksum",
    arity: 2,
    evaluate: checksum_impl,
    binds_argument: never_binds,
};

/// Looks up a registered structural predicate by name; used by the parser to resolve a bare
/// identifier in call position (`before(a, b)`) to its implementation.
pub fn lookup_structural(name: &str) -> Option<StructuralPredicate> {
    [BEFORE, SAME_POSITION, LEVEL].into_iter().find(|p| p.name == name)
}

/// Looks up a registered semantic predicate by name, mirroring [`lookup_structural`].
pub fn lookup_semantic(name: &str) -> Option<SemanticPredicate> {
    [COUNT, PAD, CHECKSUM].into_iter().find(|p| p.name == name)
}
