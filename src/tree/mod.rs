//! The derivation tree data model (§3 "Derivation tree", §4.1).
//!
//! A [`DerivationTree`] is an immutable value type: every mutating-looking operation
//! (`replace_path`, `substitute`) returns a new tree, reusing the untouched parts of the old one.
//! Each node carries a stable, monotonically increasing identity assigned once at construction and
//! never recomputed, which is what lets [`DerivationTree::substitute`] target a node by identity
//! rather than by structural position.

use crate::grammar::is_nonterminal;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// A sequence of child indices from the root to some node.
pub type Path = Vec<usize>;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn fresh_id() -> u64 {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A plain nested tree shape used to import/export derivation trees from a grammar parser or a
/// fuzzer, without exposing this module's identity bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseTree {
    /// A terminal string, or an unexpanded nonterminal (no children yet).
    Leaf(String),
    /// A nonterminal with its (possibly empty) list of children.
    Node(String, Vec<ParseTree>),
}

/// A node in a derivation tree together with everything beneath it.
///
/// `children == None` means this node is an **open leaf**: a nonterminal that has not yet been
/// expanded. `children == Some(vec![])` means a **closed leaf**: a terminal symbol, or a
/// nonterminal whose grammar rule produces the empty string. Anything else is an inner node.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DerivationTree {
    id: u64,
    value: String,
    children: Option<Vec<DerivationTree>>,
}

impl DerivationTree {
    /// An unexpanded nonterminal leaf.
    pub fn open_leaf(value: impl Into<String>) -> Self {
        DerivationTree {
            id: fresh_id(),
            value: value.into(),
            children: None,
        }
    }

    /// A terminal symbol, or any leaf that is already fully expanded.
    pub fn terminal(value: impl Into<String>) -> Self {
        DerivationTree {
            id: fresh_id(),
            value: value.into(),
            children: Some(Vec::new()),
        }
    }

    /// An inner node with already-built children.
    pub fn inner(value: impl Into<String>, children: Vec<DerivationTree>) -> Self {
        DerivationTree {
            id: fresh_id(),
            value: value.into(),
            children: Some(children),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Alias for [`DerivationTree::value`] used when a node is known to be the root of a
    /// subtree rooted at a nonterminal, for readability at call sites.
    pub fn root_nonterminal(&self) -> &str {
        &self.value
    }

    pub fn children(&self) -> Option<&[DerivationTree]> {
        self.children.as_deref()
    }

    pub fn is_nonterminal_node(&self) -> bool {
        is_nonterminal(&self.value)
    }

    /// True for any node without children of its own: an open leaf, or a closed leaf that
    /// expands to nothing (a terminal, or an empty production).
    pub fn is_leaf(&self) -> bool {
        match &self.children {
            None => true,
            Some(children) => children.is_empty(),
        }
    }

    /// True only for a nonterminal leaf that has not yet been expanded.
    pub fn is_open_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// True if no leaf anywhere in this tree is open, i.e. the tree denotes a concrete string.
    pub fn is_complete(&self) -> bool {
        self.iter_nodes().iter().all(|(_, node)| node.children.is_some())
    }

    /// Depth-first, parent-before-children enumeration of every node with its path, computed
    /// with an explicit stack rather than recursion so that deep trees cannot overflow the call
    /// stack.
    fn iter_nodes(&self) -> Vec<(Path, &DerivationTree)> {
        let mut stack: Vec<(Path, &DerivationTree)> = vec![(Path::new(), self)];
        let mut order = Vec::new();
        while let Some((path, node)) = stack.pop() {
            if let Some(children) = &node.children {
                for index in (0..children.len()).rev() {
                    let mut child_path = path.clone();
                    child_path.push(index);
                    stack.push((child_path, &children[index]));
                }
            }
            order.push((path, node));
        }
        order
    }

    /// All paths in the tree, in pre-order.
    pub fn paths(&self) -> Vec<Path> {
        self.iter_nodes().into_iter().map(|(path, _)| path).collect()
    }

    /// Every leaf (open or closed) together with its path.
    pub fn leaves(&self) -> Vec<(Path, &DerivationTree)> {
        self.iter_nodes()
            .into_iter()
            .filter(|(_, node)| node.is_leaf())
            .collect()
    }

    /// Every unexpanded nonterminal leaf, together with its path.
    pub fn open_leaves(&self) -> Vec<(Path, &DerivationTree)> {
        self.iter_nodes()
            .into_iter()
            .filter(|(_, node)| node.is_open_leaf())
            .collect()
    }

    pub fn get_subtree(&self, path: &[usize]) -> Option<&DerivationTree> {
        let mut node = self;
        for &index in path {
            node = node.children.as_ref()?.get(index)?;
        }
        Some(node)
    }

    pub fn is_valid_path(&self, path: &[usize]) -> bool {
        self.get_subtree(path).is_some()
    }

    /// The path to the node with the given identity, if it occurs in this tree.
    pub fn find_node(&self, id: u64) -> Option<Path> {
        self.iter_nodes()
            .into_iter()
            .find(|(_, node)| node.id == id)
            .map(|(path, _)| path)
    }

    /// All nodes (with their paths) satisfying `predicate`.
    pub fn filter<F: Fn(&DerivationTree) -> bool>(&self, predicate: F) -> Vec<(Path, &DerivationTree)> {
        self.iter_nodes()
            .into_iter()
            .filter(|(_, node)| predicate(node))
            .collect()
    }

    /// Returns a new tree with the subtree at `path` replaced by `new_subtree`. Nodes off the
    /// path keep their original identity and are shared (cloned, not rebuilt) unchanged; nodes
    /// on the path keep their own identity but get a new child list.
    ///
    /// Panics if `path` runs into a leaf before it is exhausted; callers are expected to validate
    /// paths with [`DerivationTree::is_valid_path`] first.
    pub fn replace_path(&self, path: &[usize], new_subtree: DerivationTree) -> DerivationTree {
        match path.split_first() {
            None => new_subtree,
            Some((&head, rest)) => {
                let children = self
                    .children
                    .as_ref()
                    .expect("replace_path: path descends into an open leaf");
                let mut new_children = children.clone();
                new_children[head] = children[head].replace_path(rest, new_subtree);
                DerivationTree {
                    id: self.id,
                    value: self.value.clone(),
                    children: Some(new_children),
                }
            }
        }
    }

    /// Returns a new tree in which every node whose identity appears as a key in `replacements`
    /// is swapped for the corresponding tree. Replacement is by identity, not by path, so a
    /// substitution targets the same logical position regardless of earlier edits. A replaced
    /// subtree is taken verbatim: nested identities inside it are not looked up again.
    ///
    /// Before recursing, entries whose key occurs *inside* some other entry's replacement value
    /// are dropped from the map (mirrors `original_source/src/isla/language.py`'s
    /// `id_subst_map` comprehension): otherwise a node could be replaced once as a standalone
    /// target and then replaced again because it also happens to sit inside another
    /// replacement's own subtree, silently nesting substitutions the caller never asked for.
    pub fn substitute(&self, replacements: &HashMap<u64, DerivationTree>) -> DerivationTree {
        let filtered = Self::filter_nested_replacements(replacements);
        self.substitute_filtered(&filtered)
    }

    /// Drops every `(id, repl)` entry whose `id` occurs as a node identity inside some *other*
    /// entry's replacement tree (an identity nested inside its own replacement is fine; only
    /// collisions with a different key's replacement are filtered, matching the original's
    /// `if not any(other.find_node(tree.id) for other in other repls)` guard).
    fn filter_nested_replacements(replacements: &HashMap<u64, DerivationTree>) -> HashMap<u64, DerivationTree> {
        replacements
            .iter()
            .filter(|(&id, _)| {
                replacements
                    .iter()
                    .all(|(&other_id, other_repl)| other_id == id || other_repl.find_node(id).is_none())
            })
            .map(|(&id, repl)| (id, repl.clone()))
            .collect()
    }

    fn substitute_filtered(&self, replacements: &HashMap<u64, DerivationTree>) -> DerivationTree {
        if let Some(replacement) = replacements.get(&self.id) {
            return replacement.clone();
        }
        match &self.children {
            None => self.clone(),
            Some(children) => {
                let new_children = children.iter().map(|child| child.substitute_filtered(replacements)).collect();
                DerivationTree {
                    id: self.id,
                    value: self.value.clone(),
                    children: Some(new_children),
                }
            }
        }
    }

    /// `self` is a prefix of `other`: every concrete (closed) part of `self` occurs verbatim at
    /// the same position in `other`, and every open leaf of `self` may be expanded to whatever
    /// `other` has at that position.
    pub fn is_prefix(&self, other: &DerivationTree) -> bool {
        if self.value != other.value {
            return false;
        }
        match &self.children {
            None => true,
            Some(self_children) => match &other.children {
                None => false,
                Some(other_children) => {
                    self_children.len() == other_children.len()
                        && self_children
                            .iter()
                            .zip(other_children.iter())
                            .all(|(a, b)| a.is_prefix(b))
                }
            },
        }
    }

    /// A looser variant of [`DerivationTree::is_prefix`] used while a tree is still being grown:
    /// true if `self` does not yet *contradict* `other`, even if one side has fewer children than
    /// the other because it has not committed to an expansion yet.
    pub fn is_potential_prefix(&self, other: &DerivationTree) -> bool {
        match (&self.children, &other.children) {
            (None, _) | (_, None) => {
                self.value == other.value || is_nonterminal(&self.value) || is_nonterminal(&other.value)
            }
            (Some(a), Some(b)) => {
                if self.value != other.value {
                    return false;
                }
                let shared = a.len().min(b.len());
                a.iter()
                    .zip(b.iter())
                    .take(shared)
                    .all(|(x, y)| x.is_potential_prefix(y))
            }
        }
    }

    /// The concrete string this tree denotes. Open leaves render as their nonterminal token when
    /// `show_open_leaves` is true, and as empty text otherwise.
    pub fn to_display_string(&self, show_open_leaves: bool) -> String {
        match &self.children {
            None => {
                if show_open_leaves {
                    self.value.clone()
                } else {
                    String::new()
                }
            }
            Some(children) if children.is_empty() => self.value.clone(),
            Some(children) => children
                .iter()
                .map(|child| child.to_display_string(show_open_leaves))
                .collect(),
        }
    }

    /// Equality up to identity: two trees are structurally equal if they have the same shape and
    /// the same terminal/nonterminal labels, regardless of node identity.
    pub fn structurally_equal(&self, other: &DerivationTree) -> bool {
        if self.value != other.value {
            return false;
        }
        match (&self.children, &other.children) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.structurally_equal(y))
            }
            _ => false,
        }
    }

    /// A hash consistent with [`DerivationTree::structurally_equal`], ignoring node identity.
    pub fn structural_hash(&self) -> u64 {
        struct StructuralHasher<'a>(&'a DerivationTree);
        impl Hash for StructuralHasher<'_> {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.value.hash(state);
                match &self.0.children {
                    None => state.write_u8(0),
                    Some(children) => {
                        state.write_u8(1);
                        for child in children {
                            StructuralHasher(child).hash(state);
                        }
                    }
                }
            }
        }
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        StructuralHasher(self).hash(&mut hasher);
        hasher.finish()
    }

    /// A structurally identical copy of this tree with every node assigned a fresh identity.
    /// Needed whenever the same template subtree (e.g. a match-expression tree prefix) is
    /// inserted into more than one place: sharing identities across the copies would make
    /// identity-addressed operations like [`DerivationTree::substitute`] unable to tell them
    /// apart.
    pub fn new_ids(&self) -> DerivationTree {
        DerivationTree {
            id: fresh_id(),
            value: self.value.clone(),
            children: self.children.as_ref().map(|children| children.iter().map(DerivationTree::new_ids).collect()),
        }
    }

    /// Builds a derivation tree from a plain [`ParseTree`], assigning fresh identities throughout.
    pub fn from_parse_tree(tree: &ParseTree) -> DerivationTree {
        match tree {
            ParseTree::Leaf(value) => {
                if is_nonterminal(value) {
                    DerivationTree::open_leaf(value.clone())
                } else {
                    DerivationTree::terminal(value.clone())
                }
            }
            ParseTree::Node(value, children) => {
                let children = children.iter().map(DerivationTree::from_parse_tree).collect();
                DerivationTree::inner(value.clone(), children)
            }
        }
    }

    /// Strips identities, producing the plain nested shape accepted by [`DerivationTree::from_parse_tree`].
    pub fn to_parse_tree(&self) -> ParseTree {
        match &self.children {
            None => ParseTree::Leaf(self.value.clone()),
            Some(children) if children.is_empty() => ParseTree::Leaf(self.value.clone()),
            Some(children) => {
                ParseTree::Node(self.value.clone(), children.iter().map(DerivationTree::to_parse_tree).collect())
            }
        }
    }
}

impl fmt::Display for DerivationTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_display_string(true))
    }
}
