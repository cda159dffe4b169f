//! Placeholder/declared bookkeeping for variables referenced while parsing a formula (§4.2
//! "Variable manager and bind expressions").
//!
//! A symbol first referenced without a declaration (e.g. used inside an `in` clause or an SMT
//! leaf before its owning quantifier has been parsed) becomes a *placeholder*; once the parser
//! reaches the quantifier that actually binds it, the symbol moves to the *declared* map.
//! [`VariableManager::create`] substitutes every placeholder with its declared counterpart and
//! fails if any remain undeclared once the whole formula has been parsed.

use crate::formula::node::Formula;
use crate::variable::{Variable, VariableKind};
use std::collections::HashMap;

#[derive(Default)]
pub struct VariableManager {
    declared: HashMap<String, Variable>,
    placeholders: HashMap<String, Variable>,
}

impl VariableManager {
    pub fn new() -> Self {
        VariableManager::default()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    /// Records `name` as declared with the given kind and type, returning the resulting variable.
    /// Fails if `name` was already declared, the "redeclared variable" failure of §7.
    pub fn declare(&mut self, kind: VariableKind, name: impl Into<String>, n_type: impl Into<String>) -> Result<Variable, String> {
        let name = name.into();
        if self.declared.contains_key(&name) {
            return Err(format!("variable '{name}' is already declared"));
        }
        let variable = Variable::new(kind, name.clone(), n_type);
        self.declared.insert(name, variable.clone());
        Ok(variable)
    }

    /// Looks up `name`, returning its declared variable if one exists, or the existing placeholder
    /// for it, or a freshly minted placeholder of the given kind (its precise `n_type` is not yet
    /// known, so it is recorded with an empty one until `declare` fills it in).
    pub fn reference(&mut self, kind: VariableKind, name: impl Into<String>) -> Variable {
        let name = name.into();
        if let Some(declared) = self.declared.get(&name) {
            return declared.clone();
        }
        self.placeholders
            .entry(name.clone())
            .or_insert_with(|| Variable::new(kind, name, ""))
            .clone()
    }

    /// Registers an already-constructed variable (e.g. one introduced by a match expression) as
    /// declared under its own name, so that later references to that name resolve to this exact
    /// `Variable` instead of minting an unrelated placeholder. Fails if the name is already taken.
    pub fn declare_variable(&mut self, variable: Variable) -> Result<(), String> {
        if self.declared.contains_key(&variable.name) {
            return Err(format!("variable '{}' is already declared", variable.name));
        }
        self.declared.insert(variable.name.clone(), variable);
        Ok(())
    }

    /// Every name mentioned so far, declared or not.
    pub fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.declared.keys().chain(self.placeholders.keys()).cloned().collect();
        names.sort();
        names.dedup();
        names
    }

    /// Substitutes every placeholder reference in `formula` with its declared variable. Fails
    /// with the list of names that were referenced but never declared (§7 "Undeclared placeholder
    /// at `create`").
    pub fn create(&self, formula: Formula) -> Result<Formula, Vec<String>> {
        let undeclared: Vec<String> = self
            .placeholders
            .keys()
            .filter(|name| !self.declared.contains_key(*name))
            .cloned()
            .collect();
        if !undeclared.is_empty() {
            let mut undeclared = undeclared;
            undeclared.sort();
            return Err(undeclared);
        }

        let mapping: HashMap<Variable, Variable> = self
            .placeholders
            .iter()
            .map(|(name, placeholder)| (placeholder.clone(), self.declared[name].clone()))
            .collect();
        Ok(formula.substitute_variables(&mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::SmtExpr;

    #[test]
    fn reference_before_declare_resolves_to_the_same_variable_after_create() {
        let mut manager = VariableManager::new();
        let placeholder = manager.reference(VariableKind::BoundVariable, "x");
        let formula = Formula::smt(SmtExpr::var(placeholder));
        manager.declare(VariableKind::BoundVariable, "x", "<var>").unwrap();
        let created = manager.create(formula).unwrap();
        let expected = Variable::bound("x", "<var>");
        assert_eq!(created.free_variables(), std::iter::once(expected).collect());
    }

    #[test]
    fn create_fails_listing_every_undeclared_placeholder() {
        let mut manager = VariableManager::new();
        manager.reference(VariableKind::BoundVariable, "y");
        manager.reference(VariableKind::BoundVariable, "z");
        let err = manager.create(Formula::True).unwrap_err();
        assert_eq!(err, vec!["y".to_string(), "z".to_string()]);
    }

    #[test]
    fn declare_twice_is_rejected() {
        let mut manager = VariableManager::new();
        manager.declare(VariableKind::BoundVariable, "x", "<var>").unwrap();
        assert!(manager.declare(VariableKind::BoundVariable, "x", "<var>").is_err());
    }
}
