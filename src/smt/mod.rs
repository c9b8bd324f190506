//! SMT-LIB2 term model, text reader, evaluator and formula container

pub mod eval;
pub mod formula;
pub mod group;
pub mod sexpr;
pub mod term;

pub use eval::{Assignment, Value, eval, eval_bool};
pub use formula::Formula;
pub use group::{Direction, group_versions};
pub use sexpr::{ParseError, SExpr, parse_term};
pub use term::{Sort, Term, quote_symbol};
