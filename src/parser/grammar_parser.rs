//! The formula parser proper (§6 "Concrete syntax (EBNF sketch)"): turns a token stream into a
//! [`Formula`], resolving variable references, desugaring XPath shorthand and default bindings,
//! and wiring predicate calls and SMT leaves to the rest of the crate along the way.
//!
//! Operator precedence, loosest to tightest: `iff` < `implies` < `xor` < `or` < `and` < unary
//! (quantifiers, `not(...)`, predicate calls, SMT leaves, parenthesized groups). `iff`/`implies`/
//! `xor` have no dedicated [`Formula`] variant; they desugar directly into `and`/`or`/`negate`
//! combinations the same way the teacher's formula type got them for free from operator
//! overloading rather than from dedicated AST nodes.
//!
//! Disambiguating a bare `(...)`: the token right after `(` decides whether it opens a grouped
//! sub-formula (`forall`/`exists`/`not`, or any other identifier not recognized as an SMT
//! operator symbol) or an SMT leaf (a recognized operator symbol, joined across `.` the same way
//! [`crate::parser::smt_leaf`] joins `str.++`). Predicate calls never need the extra parens since
//! their own `(`...`)` already delimits the call.

use crate::bind_expression::{BindExpression, BoundElement};
use crate::formula::normal_form::fresh_name;
use crate::formula::predicate::{lookup_semantic, lookup_structural, PredicateArg};
use crate::formula::Formula;
use crate::grammar::{self, Grammar};
use crate::parser::cursor::Cursor;
use crate::parser::errors::SyntaxError;
use crate::parser::mexpr;
use crate::parser::smt_leaf;
use crate::parser::tokenizer::{tokenize, Token};
use crate::tree::DerivationTree;
use crate::variable::{Variable, VariableKind, NUMERIC_NTYPE};
use crate::variable_manager::VariableManager;
use std::collections::HashMap;

/// A successfully parsed constraint: the formula itself plus the top-level constant it constrains.
pub struct ParseOutcome {
    pub formula: Formula,
    pub start_variable: Variable,
}

/// SMT operator symbols recognized in head position of a parenthesized expression. `and`/`or`/
/// `not` are deliberately excluded: at the surface level those spellings are reserved for the
/// propositional combinators, never reachable as a bare s-expression head.
const SMT_OPERATORS: &[&str] = &[
    "=", "distinct", "<", "<=", ">", ">=", "+", "-", "=>", "ite", "str.++", "str.len", "str.substr",
    "str.to.int", "str.in_re_prefix",
];

fn is_smt_operator(name: &str) -> bool {
    SMT_OPERATORS.contains(&name)
}

fn strip_angle_brackets(nonterminal: &str) -> String {
    nonterminal.trim_start_matches('<').trim_end_matches('>').to_string()
}

/// Parses `source` against `grammar`, producing a formula whose free variables are exactly the
/// declared or default constant. `grammar` is used only to default the constant's nonterminal
/// type when no `const` declaration is present; it plays no role in resolving quantifier bodies.
pub fn parse(source: &str, grammar: &Grammar) -> Result<ParseOutcome, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut cursor = Cursor::new(&tokens);
    let mut manager = VariableManager::new();

    let const_variable = parse_const_declaration(&mut cursor, &mut manager, grammar)?;

    let mut ctx = ParseContext {
        manager,
        const_variable: const_variable.clone(),
        pending: Vec::new(),
        implicit_names: HashMap::new(),
        grammar,
    };

    let body = parse_formula(&mut cursor, &mut ctx)?;

    if !cursor.at_end() {
        let (line, column) = cursor.here();
        return Err(SyntaxError::new("unexpected trailing input", line, column, String::new()));
    }

    let mut formula = body;
    for pending in ctx.pending.into_iter().rev() {
        formula = pending.wrap(formula);
    }

    let formula = ctx
        .manager
        .create(formula)
        .map_err(|undeclared| SyntaxError::new(format!("undeclared variable(s): {}", undeclared.join(", ")), 1, 1, String::new()))?;

    Ok(ParseOutcome { formula, start_variable: const_variable })
}

/// `("const" ID ":" NT ";")?`; defaults to a constant named `start` of the grammar's start symbol
/// when omitted, per §6's default-binding rules.
fn parse_const_declaration(cursor: &mut Cursor, manager: &mut VariableManager, grammar: &Grammar) -> Result<Variable, SyntaxError> {
    if !matches!(cursor.peek(), Some(Token::Ident(s)) if s == "const") {
        return manager
            .declare(VariableKind::Constant, "start", grammar::START_SYMBOL)
            .map_err(|message| SyntaxError::new(message, 1, 1, String::new()));
    }

    cursor.advance();
    let name = expect_ident(cursor)?;
    expect_token(cursor, &Token::Colon, "expected ':' after the constant's name")?;
    let nt = expect_nonterminal(cursor)?;
    expect_token(cursor, &Token::Semicolon, "expected ';' after the constant declaration")?;
    manager
        .declare(VariableKind::Constant, name, nt)
        .map_err(|message| SyntaxError::new(message, 1, 1, String::new()))
}

/// An implicit quantifier collected while resolving default bindings and XPath shorthand,
/// consumed (in reverse of the order they were first requested) once the whole body is parsed.
enum PendingQuantifier {
    /// A plain `forall <nt> name in in_var:` with no bind expression.
    Plain(Variable, Variable),
    /// §8 scenario 4: a path step through a nonterminal with more than one grammar alternative,
    /// where the chain continues past it. One `forall` per alternative, each with a bind
    /// expression that pins down that alternative's own occurrence of the next path segment and
    /// leaves everything else in the alternative anonymous; the branches are combined with `or`
    /// so the disjunction covers every concrete shape `branch_nonterminal` can take.
    Branching {
        in_var: Variable,
        /// The variable the rest of the formula was built against (the first branch's leaf).
        leaf_placeholder: Variable,
        /// One entry per grammar alternative that contains the target nonterminal at all:
        /// the quantifier's own bound variable, its bind expression, and the leaf variable that
        /// bind expression binds the target nonterminal to.
        branches: Vec<(Variable, BindExpression, Variable)>,
    },
}

impl PendingQuantifier {
    fn wrap(self, formula: Formula) -> Formula {
        match self {
            PendingQuantifier::Plain(bound, in_var) => Formula::forall(bound, in_var, None, formula),
            PendingQuantifier::Branching { in_var, leaf_placeholder, branches } => branches
                .into_iter()
                .map(|(quantifier_var, bind_expression, leaf_var)| {
                    let branch_formula = if leaf_var == leaf_placeholder {
                        formula.clone()
                    } else {
                        let mut mapping = HashMap::new();
                        mapping.insert(leaf_placeholder.clone(), leaf_var);
                        formula.substitute_variables(&mapping)
                    };
                    Formula::forall(quantifier_var, in_var.clone(), Some(bind_expression), branch_formula)
                })
                .reduce(Formula::or)
                .unwrap_or(Formula::False),
        }
    }
}

/// Parsing state threaded through the whole body: the variable manager, the constant every
/// default `in` clause and lifted bare nonterminal resolves against, and the implicit quantifiers
/// (XPath/default-binding lifts) collected so far, in the order they were first requested.
struct ParseContext<'g> {
    manager: VariableManager,
    const_variable: Variable,
    pending: Vec<PendingQuantifier>,
    implicit_names: HashMap<(String, String), Variable>,
    grammar: &'g Grammar,
}

impl<'g> ParseContext<'g> {
    /// Resolves a bare `<nt>` occurrence that is not already bound by an enclosing quantifier: a
    /// new top-level `forall <nt> nt in start:` is introduced (reused across repeated references
    /// to the same nonterminal), per §6 "An unbound `<nt>` anywhere in a body introduces...".
    fn resolve_bare_nonterminal(&mut self, nonterminal: String) -> Result<Variable, SyntaxError> {
        let default_name = strip_angle_brackets(&nonterminal);
        if self.manager.is_declared(&default_name) {
            return Ok(self.manager.reference(VariableKind::BoundVariable, default_name));
        }
        let in_var = self.const_variable.clone();
        self.introduce_implicit(in_var, nonterminal, default_name)
    }

    /// Resolves one `.` step of an XPath chain: `base.<child>` introduces (or reuses) a nested
    /// `forall <child> child in base:`, so repeated references to the same path share one
    /// quantifier rather than each minting their own.
    fn resolve_path_step(&mut self, base: Variable, child_nonterminal: String) -> Result<Variable, SyntaxError> {
        let default_name = strip_angle_brackets(&child_nonterminal);
        self.introduce_implicit(base, child_nonterminal, default_name)
    }

    fn introduce_implicit(&mut self, in_var: Variable, nonterminal: String, default_name: String) -> Result<Variable, SyntaxError> {
        let key = (in_var.name.clone(), nonterminal.clone());
        if let Some(existing) = self.implicit_names.get(&key) {
            return Ok(existing.clone());
        }
        let used: std::collections::HashSet<String> = self.manager.all_names().into_iter().collect();
        let name = fresh_name(&default_name, &used);
        let bound = self
            .manager
            .declare(VariableKind::BoundVariable, name, nonterminal)
            .map_err(|message| SyntaxError::new(message, 1, 1, String::new()))?;
        self.pending.push(PendingQuantifier::Plain(bound.clone(), in_var));
        self.implicit_names.insert(key, bound.clone());
        Ok(bound)
    }

    /// §8 scenario 4: `base.<branch_nonterminal>.<target_nonterminal>...` where
    /// `branch_nonterminal` has more than one grammar alternative. Builds one `forall
    /// <branch_nonterminal> ... in base:` per alternative that actually contains
    /// `target_nonterminal`, each carrying a bind expression that binds that alternative's own
    /// occurrence of `target_nonterminal` and leaves the rest of the alternative anonymous.
    /// Returns the variable the calling formula should reference; the alternatives are combined
    /// into an explicit disjunction once the whole body has been parsed (`PendingQuantifier::wrap`).
    fn resolve_branching_path_step(
        &mut self,
        base: Variable,
        branch_nonterminal: String,
        target_nonterminal: String,
    ) -> Result<Variable, SyntaxError> {
        let key = (base.name.clone(), format!("{branch_nonterminal}.{target_nonterminal}"));
        if let Some(existing) = self.implicit_names.get(&key) {
            return Ok(existing.clone());
        }

        let alternatives = self.grammar.alternatives(&branch_nonterminal).to_vec();
        let branch_default_name = strip_angle_brackets(&branch_nonterminal);
        let leaf_default_name = strip_angle_brackets(&target_nonterminal);

        let mut branches = Vec::new();
        for alternative in &alternatives {
            let parts = grammar::split_nonterminals(alternative);
            if !parts.iter().any(|part| part == &target_nonterminal) {
                continue;
            }

            let used: std::collections::HashSet<String> = self.manager.all_names().into_iter().collect();
            let quantifier_name = fresh_name(&branch_default_name, &used);
            let quantifier_var = self
                .manager
                .declare(VariableKind::BoundVariable, quantifier_name, branch_nonterminal.clone())
                .map_err(|message| SyntaxError::new(message, 1, 1, String::new()))?;

            let used: std::collections::HashSet<String> = self.manager.all_names().into_iter().collect();
            let leaf_name = fresh_name(&leaf_default_name, &used);
            let leaf_var = self
                .manager
                .declare(VariableKind::BoundVariable, leaf_name, target_nonterminal.clone())
                .map_err(|message| SyntaxError::new(message, 1, 1, String::new()))?;

            let mut bound_leaf = false;
            let elements = parts
                .into_iter()
                .map(|part| {
                    if !bound_leaf && part == target_nonterminal {
                        bound_leaf = true;
                        BoundElement::Variable(leaf_var.clone())
                    } else {
                        BoundElement::Variable(Variable::dummy(part))
                    }
                })
                .collect();

            branches.push((quantifier_var, BindExpression::new(elements), leaf_var));
        }

        let Some((_, _, leaf_placeholder)) = branches.first().cloned() else {
            return Err(SyntaxError::new(
                format!("nonterminal '{target_nonterminal}' does not occur in any alternative of '{branch_nonterminal}'"),
                1,
                1,
                String::new(),
            ));
        };

        self.pending.push(PendingQuantifier::Branching {
            in_var: base,
            leaf_placeholder: leaf_placeholder.clone(),
            branches,
        });
        self.implicit_names.insert(key, leaf_placeholder.clone());
        Ok(leaf_placeholder)
    }

    /// Parses one `expr := ID ("." NT)* | NT ("." NT)*` (§6) and resolves it to a [`Variable`],
    /// lifting an implicit quantifier for any unbound nonterminal step along the way. A `.` step
    /// through a nonterminal with more than one alternative, when the chain continues past it,
    /// desugars into the alternative-enumeration disjunction of §8 scenario 4 instead of a single
    /// shared nested `forall`.
    fn resolve_expr(&mut self, cursor: &mut Cursor) -> Result<Variable, SyntaxError> {
        let mut current = match cursor.advance() {
            Some(spanned) => match &spanned.token {
                Token::Ident(name) => self.manager.reference(VariableKind::BoundVariable, name.clone()),
                Token::Nonterminal(nt) => self.resolve_bare_nonterminal(nt.clone())?,
                _ => return Err(SyntaxError::new("expected a variable or nonterminal", spanned.line, spanned.column, String::new())),
            },
            None => return Err(SyntaxError::new("expected a variable or nonterminal", 1, 1, String::new())),
        };

        while matches!(cursor.peek(), Some(Token::Dot)) {
            cursor.advance();
            let child = expect_nonterminal(cursor)?;
            current = match peek_dot_nonterminal(cursor) {
                Some(grandchild) if self.grammar.alternatives(&child).len() > 1 => {
                    cursor.advance();
                    cursor.advance();
                    self.resolve_branching_path_step(current, child, grandchild)?
                }
                _ => self.resolve_path_step(current, child)?,
            };
        }

        Ok(current)
    }
}

/// Two-token lookahead past a `.`: the nonterminal of the *next* path segment, without consuming
/// either token, or `None` if the chain ends here.
fn peek_dot_nonterminal(cursor: &Cursor) -> Option<String> {
    if !matches!(cursor.peek(), Some(Token::Dot)) {
        return None;
    }
    match cursor.peek_at(1) {
        Some(Token::Nonterminal(nt)) => Some(nt.clone()),
        _ => None,
    }
}

fn expect_ident(cursor: &mut Cursor) -> Result<String, SyntaxError> {
    match cursor.advance() {
        Some(spanned) => match &spanned.token {
            Token::Ident(name) => Ok(name.clone()),
            other => Err(SyntaxError::new(format!("expected an identifier, found {other:?}"), spanned.line, spanned.column, String::new())),
        },
        None => Err(SyntaxError::new("expected an identifier", 1, 1, String::new())),
    }
}

fn expect_nonterminal(cursor: &mut Cursor) -> Result<String, SyntaxError> {
    match cursor.advance() {
        Some(spanned) => match &spanned.token {
            Token::Nonterminal(nt) => Ok(nt.clone()),
            other => Err(SyntaxError::new(format!("expected a nonterminal, found {other:?}"), spanned.line, spanned.column, String::new())),
        },
        None => Err(SyntaxError::new("expected a nonterminal", 1, 1, String::new())),
    }
}

fn expect_token(cursor: &mut Cursor, expected: &Token, message: &str) -> Result<(), SyntaxError> {
    match cursor.advance() {
        Some(spanned) if &spanned.token == expected => Ok(()),
        Some(spanned) => Err(SyntaxError::new(message.to_string(), spanned.line, spanned.column, String::new())),
        None => Err(SyntaxError::new(message.to_string(), 1, 1, String::new())),
    }
}

fn peek_ident_is(cursor: &Cursor, word: &str) -> bool {
    matches!(cursor.peek(), Some(Token::Ident(s)) if s == word)
}

fn consume_ident(cursor: &mut Cursor, word: &str) -> bool {
    if peek_ident_is(cursor, word) {
        cursor.advance();
        true
    } else {
        false
    }
}

/// Entry point for a whole formula: `parse_iff`, the loosest combinator.
fn parse_formula(cursor: &mut Cursor, ctx: &mut ParseContext<'_>) -> Result<Formula, SyntaxError> {
    parse_iff(cursor, ctx)
}

fn parse_iff(cursor: &mut Cursor, ctx: &mut ParseContext<'_>) -> Result<Formula, SyntaxError> {
    let mut left = parse_implies(cursor, ctx)?;
    while consume_ident(cursor, "iff") {
        let right = parse_implies(cursor, ctx)?;
        left = iff(left, right);
    }
    Ok(left)
}

fn parse_implies(cursor: &mut Cursor, ctx: &mut ParseContext<'_>) -> Result<Formula, SyntaxError> {
    let mut left = parse_xor(cursor, ctx)?;
    while consume_ident(cursor, "implies") {
        let right = parse_xor(cursor, ctx)?;
        left = left.negate().or(right);
    }
    Ok(left)
}

fn parse_xor(cursor: &mut Cursor, ctx: &mut ParseContext<'_>) -> Result<Formula, SyntaxError> {
    let mut left = parse_or(cursor, ctx)?;
    while consume_ident(cursor, "xor") {
        let right = parse_or(cursor, ctx)?;
        left = xor(left, right);
    }
    Ok(left)
}

fn parse_or(cursor: &mut Cursor, ctx: &mut ParseContext<'_>) -> Result<Formula, SyntaxError> {
    let mut left = parse_and(cursor, ctx)?;
    while consume_ident(cursor, "or") {
        let right = parse_and(cursor, ctx)?;
        left = left.or(right);
    }
    Ok(left)
}

fn parse_and(cursor: &mut Cursor, ctx: &mut ParseContext<'_>) -> Result<Formula, SyntaxError> {
    let mut left = parse_unary(cursor, ctx)?;
    while consume_ident(cursor, "and") {
        let right = parse_unary(cursor, ctx)?;
        left = left.and(right);
    }
    Ok(left)
}

fn iff(a: Formula, b: Formula) -> Formula {
    a.clone().negate().or(b.clone()).and(a.or(b.negate()))
}

fn xor(a: Formula, b: Formula) -> Formula {
    a.clone().and(b.clone().negate()).or(a.negate().and(b))
}

fn parse_unary(cursor: &mut Cursor, ctx: &mut ParseContext<'_>) -> Result<Formula, SyntaxError> {
    match cursor.peek() {
        Some(Token::Ident(s)) if s == "forall" || s == "exists" => parse_quantifier(cursor, ctx),
        Some(Token::Ident(s)) if s == "not" => {
            cursor.advance();
            expect_token(cursor, &Token::LParen, "expected '(' after 'not'")?;
            let inner = parse_formula(cursor, ctx)?;
            expect_token(cursor, &Token::RParen, "expected ')' to close 'not(...)'")?;
            Ok(inner.negate())
        }
        Some(Token::Ident(s)) if s == "true" => {
            cursor.advance();
            Ok(Formula::True)
        }
        Some(Token::Ident(s)) if s == "false" => {
            cursor.advance();
            Ok(Formula::False)
        }
        Some(Token::Ident(name)) => {
            let name = name.clone();
            let (line, column) = cursor.here();
            cursor.advance();
            parse_predicate_call(cursor, ctx, name, line, column)
        }
        Some(Token::LParen) => parse_paren_atom(cursor, ctx),
        _ => {
            let (line, column) = cursor.here();
            Err(SyntaxError::new("expected a formula", line, column, String::new()))
        }
    }
}

/// `"forall" | "exists"` followed either by `"int" ID ":" formula` or by
/// `NT (ID)? ("=" STRING)? ("in" expr)? ":" formula`.
fn parse_quantifier(cursor: &mut Cursor, ctx: &mut ParseContext<'_>) -> Result<Formula, SyntaxError> {
    let is_forall = match cursor.advance() {
        Some(spanned) => match &spanned.token {
            Token::Ident(s) if s == "forall" => true,
            Token::Ident(s) if s == "exists" => false,
            _ => return Err(SyntaxError::new("expected 'forall' or 'exists'", spanned.line, spanned.column, String::new())),
        },
        None => return Err(SyntaxError::new("expected 'forall' or 'exists'", 1, 1, String::new())),
    };

    if consume_ident(cursor, "int") {
        let name = expect_ident(cursor)?;
        expect_token(cursor, &Token::Colon, "expected ':' after the bound integer variable")?;
        let bound = ctx
            .manager
            .declare(VariableKind::BoundVariable, name, NUMERIC_NTYPE)
            .map_err(|message| SyntaxError::new(message, 1, 1, String::new()))?;
        let inner = parse_formula(cursor, ctx)?;
        return Ok(if is_forall { Formula::forall_int(bound, inner) } else { Formula::exists_int(bound, inner) });
    }

    let nonterminal = expect_nonterminal(cursor)?;
    let default_name = strip_angle_brackets(&nonterminal);

    let name = if matches!(cursor.peek(), Some(Token::Ident(s)) if s != "in") {
        expect_ident(cursor)?
    } else {
        let used: std::collections::HashSet<String> = ctx.manager.all_names().into_iter().collect();
        fresh_name(&default_name, &used)
    };

    let bind_expression = match cursor.peek() {
        Some(Token::MatchExprString(text)) => {
            let text = text.clone();
            let (line, column) = cursor.here();
            cursor.advance();
            let elements = mexpr::parse_bind_expression(&text, line, column)?;
            Some(BindExpression::new(elements))
        }
        _ => None,
    };

    let in_variable = if consume_ident(cursor, "in") {
        ctx.resolve_expr(cursor)?
    } else {
        ctx.const_variable.clone()
    };

    expect_token(cursor, &Token::Colon, "expected ':' to open the quantifier's body")?;

    let bound_variable = ctx
        .manager
        .declare(VariableKind::BoundVariable, name, nonterminal)
        .map_err(|message| SyntaxError::new(message, 1, 1, String::new()))?;

    if let Some(bind) = &bind_expression {
        for variable in bind.all_bound_variables() {
            ctx.manager
                .declare_variable(variable)
                .map_err(|message| SyntaxError::new(message, 1, 1, String::new()))?;
        }
    }

    let inner = parse_formula(cursor, ctx)?;

    Ok(if is_forall {
        Formula::forall(bound_variable, in_variable, bind_expression, inner)
    } else {
        Formula::exists(bound_variable, in_variable, bind_expression, inner)
    })
}

/// `ID "(" arg ("," arg)* ")"`, where `arg := ID | NT | INT | STRING`, resolved against either a
/// structural or a semantic predicate registered in [`crate::formula::predicate`].
fn parse_predicate_call(cursor: &mut Cursor, ctx: &mut ParseContext<'_>, name: String, line: usize, column: usize) -> Result<Formula, SyntaxError> {
    expect_token(cursor, &Token::LParen, &format!("expected '(' after predicate name '{name}'"))?;

    let mut args = Vec::new();
    if !matches!(cursor.peek(), Some(Token::RParen)) {
        loop {
            args.push(parse_predicate_arg(cursor, ctx)?);
            if matches!(cursor.peek(), Some(Token::Comma)) {
                cursor.advance();
                continue;
            }
            break;
        }
    }
    expect_token(cursor, &Token::RParen, &format!("expected ')' to close call to '{name}'"))?;

    if let Some(predicate) = lookup_structural(&name) {
        if predicate.arity != args.len() {
            return Err(SyntaxError::new(
                format!("predicate '{name}' expects {} argument(s), found {}", predicate.arity, args.len()),
                line,
                column,
                String::new(),
            ));
        }
        return Ok(Formula::structural_predicate(predicate, args));
    }
    if let Some(predicate) = lookup_semantic(&name) {
        if predicate.arity != args.len() {
            return Err(SyntaxError::new(
                format!("predicate '{name}' expects {} argument(s), found {}", predicate.arity, args.len()),
                line,
                column,
                String::new(),
            ));
        }
        return Ok(Formula::semantic_predicate(predicate, args));
    }

    Err(SyntaxError::new(format!("unknown predicate '{name}'"), line, column, String::new()))
}

fn parse_predicate_arg(cursor: &mut Cursor, ctx: &mut ParseContext<'_>) -> Result<PredicateArg, SyntaxError> {
    match cursor.peek() {
        Some(Token::Str(s)) => {
            let s = s.clone();
            cursor.advance();
            Ok(PredicateArg::Tree(DerivationTree::terminal(s)))
        }
        Some(Token::Int(i)) => {
            let i = *i;
            cursor.advance();
            Ok(PredicateArg::Tree(DerivationTree::terminal(i.to_string())))
        }
        Some(Token::Ident(_)) | Some(Token::Nonterminal(_)) => Ok(PredicateArg::Variable(ctx.resolve_expr(cursor)?)),
        _ => {
            let (line, column) = cursor.here();
            Err(SyntaxError::new("expected a predicate argument", line, column, String::new()))
        }
    }
}

/// Disambiguates a leading `(`: `forall`/`exists`/`not` or any identifier not in
/// [`SMT_OPERATORS`] opens a grouped sub-formula (transparent, no extra AST node); a recognized
/// SMT operator symbol hands the whole `(...)` off to [`smt_leaf::parse_sexpr`].
fn parse_paren_atom(cursor: &mut Cursor, ctx: &mut ParseContext<'_>) -> Result<Formula, SyntaxError> {
    let saved = cursor.position();
    cursor.advance(); // '('

    match cursor.peek() {
        Some(Token::Ident(s)) if is_smt_operator(s) => {
            cursor.set_position(saved);
            let mut resolve = |c: &mut Cursor| ctx.resolve_expr(c);
            let expr = smt_leaf::parse_sexpr(cursor, &mut resolve)?;
            Ok(Formula::smt(expr))
        }
        Some(Token::Ident(_)) | Some(Token::LParen) => {
            let inner = parse_formula(cursor, ctx)?;
            expect_token(cursor, &Token::RParen, "expected ')' to close a grouped formula")?;
            Ok(inner)
        }
        _ => {
            let (line, column) = cursor.here();
            Err(SyntaxError::new("expected a grouped formula or an SMT expression", line, column, String::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn assignments_grammar() -> Grammar {
        let mut rules = Map::new();
        rules.insert("<start>".to_string(), vec!["<assgn_list>".to_string()]);
        rules.insert(
            "<assgn_list>".to_string(),
            vec!["<assgn>; <assgn_list>".to_string(), "<assgn>".to_string()],
        );
        rules.insert("<assgn>".to_string(), vec!["<var> := <rhs>".to_string()]);
        rules.insert("<rhs>".to_string(), vec!["<var>".to_string(), "<digit>".to_string()]);
        rules.insert("<var>".to_string(), vec!["x".to_string(), "y".to_string()]);
        rules.insert("<digit>".to_string(), vec!["0".to_string(), "1".to_string()]);
        Grammar::new(rules)
    }

    #[test]
    fn parses_a_simple_equality_over_an_explicit_quantifier() {
        let grammar = assignments_grammar();
        let outcome = parse(r#"forall <var> v in start: (= v "x")"#, &grammar).unwrap();
        assert_eq!(outcome.start_variable, Variable::constant("start", "<start>"));
        match outcome.formula {
            Formula::Forall(data) => {
                assert_eq!(data.bound_variable, Variable::bound("v", "<var>"));
                assert_eq!(data.in_variable, outcome.start_variable);
            }
            other => panic!("expected a forall, got {other:?}"),
        }
    }

    #[test]
    fn default_name_and_default_in_clause_are_equivalent() {
        let grammar = assignments_grammar();
        let explicit = parse("forall <var> var in start: (= var \"x\")", &grammar).unwrap();
        let implicit = parse("forall <var>: (= var \"x\")", &grammar).unwrap();
        assert_eq!(explicit.formula, implicit.formula);
    }

    #[test]
    fn match_expression_declares_its_bound_variables_before_the_body() {
        let grammar = assignments_grammar();
        let source = r#"forall <assgn> a1="{<var> l1} := {<rhs> r1}" in start: (= l1 "x")"#;
        let outcome = parse(source, &grammar).unwrap();
        match outcome.formula {
            Formula::Forall(data) => {
                let bind = data.bind_expression.expect("bind expression");
                assert_eq!(bind.all_bound_variables().len(), 2);
            }
            other => panic!("expected a forall, got {other:?}"),
        }
    }

    #[test]
    fn unbound_nonterminal_is_lifted_to_a_surrounding_forall() {
        let grammar = assignments_grammar();
        let outcome = parse(r#"(= <var> "x")"#, &grammar).unwrap();
        match outcome.formula {
            Formula::Forall(data) => {
                assert_eq!(data.bound_variable.n_type, "<var>");
                assert_eq!(data.in_variable, outcome.start_variable);
            }
            other => panic!("expected an implicit forall, got {other:?}"),
        }
    }

    #[test]
    fn xpath_shorthand_introduces_nested_foralls_sharing_one_binder() {
        let mut rules = Map::new();
        rules.insert("<start>".to_string(), vec!["<xml-tree>".to_string()]);
        rules.insert("<xml-tree>".to_string(), vec!["<xml-open-tag>".to_string()]);
        rules.insert("<xml-open-tag>".to_string(), vec!["<id>".to_string()]);
        rules.insert("<id>".to_string(), vec!["a".to_string(), "b".to_string()]);
        let grammar = Grammar::new(rules);

        let source = r#"(= <xml-tree>.<xml-open-tag>.<id> "a") and (= <xml-tree>.<xml-open-tag>.<id> "a")"#;
        let outcome = parse(source, &grammar).unwrap();
        match outcome.formula {
            Formula::Forall(outer) => match outer.inner.as_ref() {
                Formula::Forall(inner) => {
                    assert_eq!(inner.bound_variable.n_type, "<xml-open-tag>");
                }
                other => panic!("expected a nested forall, got {other:?}"),
            },
            other => panic!("expected an outer forall, got {other:?}"),
        }
    }

    #[test]
    fn predicate_call_checks_arity() {
        let grammar = assignments_grammar();
        let err = parse("forall <var> v in start: before(v)", &grammar).unwrap_err();
        assert!(err.message.contains("before"));
    }

    #[test]
    fn unknown_predicate_is_rejected() {
        let grammar = assignments_grammar();
        let err = parse("forall <var> v in start: nope(v, v)", &grammar).unwrap_err();
        assert!(err.message.contains("unknown predicate"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let grammar = assignments_grammar();
        let outcome = parse(r#"forall <var> v in start: (= v "x") or (= v "y") and (= v "z")"#, &grammar).unwrap();
        match outcome.formula {
            Formula::Forall(data) => assert!(matches!(data.inner.as_ref(), Formula::Disjunctive(parts) if parts.len() == 2)),
            other => panic!("expected a forall, got {other:?}"),
        }
    }

    #[test]
    fn const_declaration_overrides_the_default_start_constant() {
        let grammar = assignments_grammar();
        let outcome = parse("const my_start: <assgn_list>; forall <var> v in my_start: true", &grammar).unwrap();
        assert_eq!(outcome.start_variable, Variable::constant("my_start", "<assgn_list>"));
    }
}
