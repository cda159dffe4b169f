//! Command-line front end: parses a concrete-syntax constraint against a grammar, optionally
//! rewrites it to negation- or disjunctive-normal form, and prints it back out.
//!
//! Scoped to what the core actually does (§1 "In scope"/"Out of scope"): parse, validate,
//! normalize, unparse. There is no search solver here, so this binary never tries to find a
//! satisfying derivation tree, only to accept or reject the constraint's surface syntax.

use clap::builder::PossibleValuesParser;
use clap::Parser;

use isla_core::formula::normal_form::{convert_to_dnf, convert_to_nnf, instantiate_top_constant};
use isla_core::grammar::Grammar;
use isla_core::parser;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// How much of the run the user wants narrated, mirroring the teacher's `PrintOptions`/
/// `print_if_allowed` pair (§7 "Logging").
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn parse(text: &str) -> Verbosity {
        match text {
            "quiet" => Verbosity::Quiet,
            "verbose" => Verbosity::Verbose,
            _ => Verbosity::Normal,
        }
    }
}

/// Prints `text` only if the configured verbosity is at least `minimum`; simplifies call sites
/// that would otherwise repeat the same `if` everywhere.
fn log_if(verbosity: Verbosity, minimum: Verbosity, text: &str) {
    if verbosity >= minimum {
        println!("{text}");
    }
}

/// Structure to collect CLI arguments.
#[derive(Parser)]
#[clap(author, version, about = "Parses, validates, and normalizes grammar-aware input constraints.")]
struct Arguments {
    /// Path to a file describing the grammar, in the simple `<nt> ::= alt1 | alt2` line format.
    grammar_path: String,

    /// Path to a file with the constraint's concrete syntax.
    constraint_path: String,

    /// What to do with the formula once it parses. `ground` additionally expands a concrete tree
    /// for the constraint's top-level constant and ties it into the formula before printing.
    #[clap(short, long, default_value = "parse", value_parser = PossibleValuesParser::new(["parse", "nnf", "dnf", "ground"]))]
    mode: String,

    /// Choice of the amount of output regarding the run.
    #[clap(short, long, default_value = "normal", value_parser = PossibleValuesParser::new(["quiet", "normal", "verbose"]))]
    verbosity: String,
}

fn main() {
    let args = Arguments::parse();
    let verbosity = Verbosity::parse(&args.verbosity);

    if !Path::new(&args.grammar_path).is_file() {
        print_error(&format!("{} is not a valid file", args.grammar_path));
        return;
    }
    if !Path::new(&args.constraint_path).is_file() {
        print_error(&format!("{} is not a valid file", args.constraint_path));
        return;
    }

    let grammar = match fs::read_to_string(&args.grammar_path).map(|text| load_grammar(&text)) {
        Ok(grammar) => grammar,
        Err(err) => {
            print_error(&format!("could not read {}: {err}", args.grammar_path));
            return;
        }
    };
    log_if(verbosity, Verbosity::Verbose, &format!("loaded {} grammar rule(s)", grammar.nonterminals().count()));

    let source = match fs::read_to_string(&args.constraint_path) {
        Ok(source) => source,
        Err(err) => {
            print_error(&format!("could not read {}: {err}", args.constraint_path));
            return;
        }
    };

    let outcome = match parser::parse(&source, &grammar) {
        Ok(outcome) => outcome,
        Err(err) => {
            print_error(&err.to_string());
            return;
        }
    };
    log_if(
        verbosity,
        Verbosity::Verbose,
        &format!("parsed against constant '{}: {}'", outcome.start_variable.name, outcome.start_variable.n_type),
    );

    let formula = match args.mode.as_str() {
        "nnf" => convert_to_nnf(&outcome.formula),
        "dnf" => convert_to_dnf(&convert_to_nnf(&outcome.formula)),
        "ground" => {
            let tree = grammar.expand_to_some_tree(&outcome.start_variable.n_type, 10);
            log_if(verbosity, Verbosity::Verbose, &format!("grounding tree: {}", tree.to_display_string(false)));
            instantiate_top_constant(&outcome.formula, &tree)
        }
        _ => outcome.formula,
    };

    print_success(&parser::unparse(&formula, &outcome.start_variable));
}

/// Loads a grammar from the toy `<nt> ::= alt1 | alt2` line format: one rule per line, blank
/// lines and lines starting with `#` ignored. This format belongs to the binary alone; the
/// library itself only consumes an already-built [`Grammar`].
fn load_grammar(text: &str) -> Grammar {
    let mut rules: HashMap<String, Vec<String>> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((head, tail)) = line.split_once("::=") else {
            continue;
        };
        let head = head.trim().to_string();
        let alternatives = tail.split('|').map(|alt| alt.trim().to_string()).collect();
        rules.insert(head, alternatives);
    }
    Grammar::new(rules)
}

fn print_success(text: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
    println!("{text}");
    let _ = stdout.reset();
}

fn print_error(text: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
    println!("{text}");
    let _ = stdout.reset();
}
