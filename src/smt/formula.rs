//! Translated formulas and their SMT-LIB2 text form

use std::collections::HashSet;
use std::fmt::Write as _;

use super::sexpr::{ParseError, SExpr, parse_all};
use super::term::{Sort, Term, quote_symbol};

/// A set of constant declarations plus a conjunction of assertions
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    /// Real constant holding the aggregated file risk
    pub file_risk: String,
    pub declarations: Vec<(String, Sort)>,
    pub assertions: Vec<Term>,
}

impl Formula {
    pub fn new(file_risk: impl Into<String>) -> Self {
        Self {
            file_risk: file_risk.into(),
            declarations: Vec::new(),
            assertions: Vec::new(),
        }
    }

    pub fn declare(&mut self, name: impl Into<String>, sort: Sort) {
        self.declarations.push((name.into(), sort));
    }

    pub fn assert(&mut self, term: Term) {
        self.assertions.push(term);
    }

    pub fn file_risk_term(&self) -> Term {
        Term::sym(self.file_risk.clone())
    }

    pub fn sort_of(&self, name: &str) -> Option<Sort> {
        self.declarations
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, sort)| *sort)
    }

    /// Render as SMT-LIB2: one `declare-const` per constant, one `assert` per constraint
    pub fn to_smt2(&self) -> String {
        let mut out = String::new();
        for (name, sort) in &self.declarations {
            let _ = writeln!(out, "(declare-const {} {sort})", quote_symbol(name));
        }
        for assertion in &self.assertions {
            let _ = writeln!(out, "(assert {assertion})");
        }
        out
    }

    /// Parse text produced by [`Formula::to_smt2`]
    ///
    /// `file_risk` must be declared as a Real constant in the text.
    pub fn parse(text: &str, file_risk: &str) -> Result<Self, ParseError> {
        let mut formula = Formula::new(file_risk);
        let mut declared = HashSet::new();

        for command in parse_all(text)? {
            let items = command
                .as_list()
                .ok_or_else(|| ParseError::InvalidFormula("expected a command list".into()))?;
            match items {
                [head, name, sort] if head.is_symbol("declare-const") => {
                    let name = name.as_symbol().ok_or_else(|| {
                        ParseError::InvalidFormula("declare-const without a name".into())
                    })?;
                    let sort = parse_sort(sort)?;
                    if !declared.insert(name.to_string()) {
                        return Err(ParseError::InvalidFormula(format!(
                            "duplicate declaration of {name}"
                        )));
                    }
                    formula.declare(name, sort);
                }
                [head, name, params, sort]
                    if head.is_symbol("declare-fun")
                        && params.as_list().is_some_and(<[SExpr]>::is_empty) =>
                {
                    let name = name.as_symbol().ok_or_else(|| {
                        ParseError::InvalidFormula("declare-fun without a name".into())
                    })?;
                    if !declared.insert(name.to_string()) {
                        return Err(ParseError::InvalidFormula(format!(
                            "duplicate declaration of {name}"
                        )));
                    }
                    formula.declare(name, parse_sort(sort)?);
                }
                [head, body] if head.is_symbol("assert") => {
                    formula.assert(body.to_term()?);
                }
                _ => {
                    return Err(ParseError::InvalidFormula(format!(
                        "unsupported command: {command:?}"
                    )));
                }
            }
        }

        if formula.sort_of(file_risk) != Some(Sort::Real) {
            return Err(ParseError::InvalidFormula(format!(
                "{file_risk} is not declared as Real"
            )));
        }
        formula.check_symbols_declared()?;
        Ok(formula)
    }

    fn check_symbols_declared(&self) -> Result<(), ParseError> {
        let declared: HashSet<&str> = self.declarations.iter().map(|(n, _)| n.as_str()).collect();
        let mut missing = None;
        for assertion in &self.assertions {
            assertion.for_each_symbol(&mut |name| {
                if missing.is_none() && !declared.contains(name) {
                    missing = Some(name.to_string());
                }
            });
        }
        match missing {
            Some(name) => Err(ParseError::InvalidFormula(format!(
                "undeclared symbol {name}"
            ))),
            None => Ok(()),
        }
    }
}

fn parse_sort(expr: &SExpr) -> Result<Sort, ParseError> {
    match expr {
        SExpr::Symbol(name) => Sort::from_name(name)
            .ok_or_else(|| ParseError::InvalidFormula(format!("unsupported sort {name}"))),
        other => Err(ParseError::InvalidFormula(format!(
            "unsupported sort {other:?}"
        ))),
    }
}
