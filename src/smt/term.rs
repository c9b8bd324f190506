//! SMT-LIB2 terms
//!
//! Terms are kept as a small tree so the translator can build constraints,
//! the formula cache can round-trip them through text, and the built-in
//! solver can evaluate them.

use std::fmt;

/// Sort of a declared constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    Bool,
    Int,
    Real,
}

impl Sort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sort::Bool => "Bool",
            Sort::Int => "Int",
            Sort::Real => "Real",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Bool" => Some(Sort::Bool),
            "Int" => Some(Sort::Int),
            "Real" => Some(Sort::Real),
            _ => None,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SMT-LIB2 term
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Bool(bool),
    Int(i64),
    Real(f64),
    Symbol(String),
    /// Function application, e.g. `(and a b)`
    App(String, Vec<Term>),
}

impl Term {
    pub fn sym(name: impl Into<String>) -> Self {
        Term::Symbol(name.into())
    }

    pub fn int(value: i64) -> Self {
        Term::Int(value)
    }

    pub fn real(value: f64) -> Self {
        Term::Real(value)
    }

    fn app(op: &str, args: Vec<Term>) -> Self {
        Term::App(op.to_string(), args)
    }

    pub fn eq(lhs: Term, rhs: Term) -> Self {
        Self::app("=", vec![lhs, rhs])
    }

    pub fn ge(lhs: Term, rhs: Term) -> Self {
        Self::app(">=", vec![lhs, rhs])
    }

    pub fn le(lhs: Term, rhs: Term) -> Self {
        Self::app("<=", vec![lhs, rhs])
    }

    pub fn not(term: Term) -> Self {
        Self::app("not", vec![term])
    }

    pub fn implies(antecedent: Term, consequent: Term) -> Self {
        Self::app("=>", vec![antecedent, consequent])
    }

    pub fn ite(cond: Term, then: Term, otherwise: Term) -> Self {
        Self::app("ite", vec![cond, then, otherwise])
    }

    /// Conjunction; collapses to `true` or the single operand when possible
    pub fn and(mut terms: Vec<Term>) -> Self {
        match terms.len() {
            0 => Term::Bool(true),
            1 => terms.remove(0),
            _ => Self::app("and", terms),
        }
    }

    /// Disjunction; collapses to `false` or the single operand when possible
    pub fn or(mut terms: Vec<Term>) -> Self {
        match terms.len() {
            0 => Term::Bool(false),
            1 => terms.remove(0),
            _ => Self::app("or", terms),
        }
    }

    /// Real-valued sum; the empty sum is `0.0`
    pub fn sum(mut terms: Vec<Term>) -> Self {
        match terms.len() {
            0 => Term::Real(0.0),
            1 => terms.remove(0),
            _ => Self::app("+", terms),
        }
    }

    pub fn sub(lhs: Term, rhs: Term) -> Self {
        Self::app("-", vec![lhs, rhs])
    }

    pub fn mul(terms: Vec<Term>) -> Self {
        Self::app("*", terms)
    }

    pub fn div(lhs: Term, rhs: Term) -> Self {
        Self::app("/", vec![lhs, rhs])
    }

    /// Absolute value spelled with `ite` so every solver accepts it on reals
    pub fn abs(term: Term) -> Self {
        Self::ite(
            Self::ge(term.clone(), Term::Real(0.0)),
            term.clone(),
            Self::app("-", vec![term]),
        )
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Term::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Integer literal value, if this term is one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Term::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Visit every symbol referenced by this term
    pub fn for_each_symbol<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Term::Symbol(name) => f(name),
            Term::App(_, args) => {
                for arg in args {
                    arg.for_each_symbol(f);
                }
            }
            _ => {}
        }
    }
}

/// Characters allowed in an unquoted SMT-LIB2 symbol besides alphanumerics
const SIMPLE_SYMBOL_CHARS: &str = "~!@$%^&*_-+=<>.?/";

const RESERVED: &[&str] = &[
    "true", "false", "and", "or", "not", "ite", "=>", "=", "let", "forall", "exists", "as", "!",
    "_", "par", "NUMERAL", "DECIMAL", "STRING",
];

/// Render a symbol, quoting it with `|...|` when it is not a simple symbol
///
/// Simple symbols starting with `@` or `.` are reserved for the solver, so
/// scoped npm names like `@babel/core` are always quoted.
pub fn quote_symbol(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit() || c == '@' || c == '.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || SIMPLE_SYMBOL_CHARS.contains(c))
        && !RESERVED.contains(&name);
    if simple {
        name.to_string()
    } else {
        // '|' and '\' cannot appear inside a quoted symbol
        let cleaned: String = name
            .chars()
            .map(|c| if c == '|' || c == '\\' { '_' } else { c })
            .collect();
        format!("|{cleaned}|")
    }
}

/// Render a non-negative decimal literal without exponent notation
fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        let text = format!("{value}");
        if text.contains('.') {
            text
        } else {
            format!("{text}.0")
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Bool(value) => write!(f, "{value}"),
            Term::Int(value) if *value < 0 => write!(f, "(- {})", value.unsigned_abs()),
            Term::Int(value) => write!(f, "{value}"),
            Term::Real(value) if value.is_sign_negative() && *value != 0.0 => {
                write!(f, "(- {})", format_decimal(-value))
            }
            Term::Real(value) => f.write_str(&format_decimal(value.abs())),
            Term::Symbol(name) => f.write_str(&quote_symbol(name)),
            Term::App(op, args) => {
                write!(f, "({op}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
