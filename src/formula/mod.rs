//! The constraint formula AST, its visitor protocol, and the normal-form rewriters and
//! predicates built on top of it (§3 "Formula", §4.3, §4.4).

pub mod node;
pub mod normal_form;
pub mod predicate;
pub mod visitor;

pub use node::{ExistsData, ForallData, Formula, SmtLeaf};
pub use predicate::{PredicateArg, SemPredEvalResult, SemanticPredicate, StructuralPredicate};
pub use visitor::{FilterVisitor, FormulaVisitor, VariablesCollector};
