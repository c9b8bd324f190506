//! Term evaluation under a concrete assignment

use std::collections::HashMap;

use super::term::Term;

/// A concrete value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view, promoting integers to reals
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Bool(_) => None,
        }
    }

    pub fn to_term(self) -> Term {
        match self {
            Value::Bool(b) => Term::Bool(b),
            Value::Int(v) => Term::Int(v),
            Value::Real(v) => Term::Real(v),
        }
    }
}

impl TryFrom<&Term> for Value {
    type Error = ();

    fn try_from(term: &Term) -> Result<Self, Self::Error> {
        match term {
            Term::Bool(b) => Ok(Value::Bool(*b)),
            Term::Int(v) => Ok(Value::Int(*v)),
            Term::Real(v) => Ok(Value::Real(*v)),
            _ => Err(()),
        }
    }
}

pub type Assignment = HashMap<String, Value>;

/// Evaluate `term` under `env`
///
/// Returns `None` for unbound symbols, sort mismatches, unknown operators
/// and division by zero.
pub fn eval(term: &Term, env: &Assignment) -> Option<Value> {
    match term {
        Term::Bool(b) => Some(Value::Bool(*b)),
        Term::Int(v) => Some(Value::Int(*v)),
        Term::Real(v) => Some(Value::Real(*v)),
        Term::Symbol(name) => env.get(name).copied(),
        Term::App(op, args) => eval_app(op, args, env),
    }
}

/// Evaluate a term expected to be boolean
pub fn eval_bool(term: &Term, env: &Assignment) -> Option<bool> {
    eval(term, env)?.as_bool()
}

fn eval_app(op: &str, args: &[Term], env: &Assignment) -> Option<Value> {
    match op {
        "and" => {
            for arg in args {
                if !eval_bool(arg, env)? {
                    return Some(Value::Bool(false));
                }
            }
            Some(Value::Bool(true))
        }
        "or" => {
            for arg in args {
                if eval_bool(arg, env)? {
                    return Some(Value::Bool(true));
                }
            }
            Some(Value::Bool(false))
        }
        "not" => match args {
            [arg] => Some(Value::Bool(!eval_bool(arg, env)?)),
            _ => None,
        },
        "=>" => {
            // right associative: (=> a b c) is (=> a (=> b c))
            let (last, init) = args.split_last()?;
            for arg in init {
                if !eval_bool(arg, env)? {
                    return Some(Value::Bool(true));
                }
            }
            Some(Value::Bool(eval_bool(last, env)?))
        }
        "ite" => match args {
            [cond, then, otherwise] => {
                if eval_bool(cond, env)? {
                    eval(then, env)
                } else {
                    eval(otherwise, env)
                }
            }
            _ => None,
        },
        "=" => {
            let values = eval_all(args, env)?;
            let first = values.first()?;
            for value in &values[1..] {
                if !values_equal(first, value)? {
                    return Some(Value::Bool(false));
                }
            }
            Some(Value::Bool(true))
        }
        "distinct" => {
            let values = eval_all(args, env)?;
            for (i, a) in values.iter().enumerate() {
                for b in &values[i + 1..] {
                    if values_equal(a, b)? {
                        return Some(Value::Bool(false));
                    }
                }
            }
            Some(Value::Bool(true))
        }
        "<" | "<=" | ">" | ">=" => {
            let values = eval_all(args, env)?;
            if values.len() < 2 {
                return None;
            }
            for pair in values.windows(2) {
                let (a, b) = (pair[0].as_f64()?, pair[1].as_f64()?);
                let holds = match op {
                    "<" => a < b,
                    "<=" => a <= b,
                    ">" => a > b,
                    _ => a >= b,
                };
                if !holds {
                    return Some(Value::Bool(false));
                }
            }
            Some(Value::Bool(true))
        }
        "+" | "*" => {
            let values = eval_all(args, env)?;
            if values.iter().all(|v| matches!(v, Value::Int(_))) {
                let mut acc: i64 = if op == "+" { 0 } else { 1 };
                for value in &values {
                    let Value::Int(v) = value else { return None };
                    acc = if op == "+" {
                        acc.checked_add(*v)?
                    } else {
                        acc.checked_mul(*v)?
                    };
                }
                Some(Value::Int(acc))
            } else {
                let mut acc = if op == "+" { 0.0 } else { 1.0 };
                for value in &values {
                    let v = value.as_f64()?;
                    acc = if op == "+" { acc + v } else { acc * v };
                }
                Some(Value::Real(acc))
            }
        }
        "-" => {
            let values = eval_all(args, env)?;
            match values.as_slice() {
                [] => None,
                [Value::Int(v)] => Some(Value::Int(v.checked_neg()?)),
                [single] => Some(Value::Real(-single.as_f64()?)),
                [first, rest @ ..] => {
                    if values.iter().all(|v| matches!(v, Value::Int(_))) {
                        let Value::Int(mut acc) = *first else { return None };
                        for value in rest {
                            let Value::Int(v) = value else { return None };
                            acc = acc.checked_sub(*v)?;
                        }
                        Some(Value::Int(acc))
                    } else {
                        let mut acc = first.as_f64()?;
                        for value in rest {
                            acc -= value.as_f64()?;
                        }
                        Some(Value::Real(acc))
                    }
                }
            }
        }
        "/" => {
            let values = eval_all(args, env)?;
            let (first, rest) = values.split_first()?;
            let mut acc = first.as_f64()?;
            for value in rest {
                let divisor = value.as_f64()?;
                if divisor == 0.0 {
                    return None;
                }
                acc /= divisor;
            }
            Some(Value::Real(acc))
        }
        "abs" => match eval_all(args, env)?.as_slice() {
            [Value::Int(v)] => Some(Value::Int(v.checked_abs()?)),
            [Value::Real(v)] => Some(Value::Real(v.abs())),
            _ => None,
        },
        "to_real" => match eval_all(args, env)?.as_slice() {
            [value] => Some(Value::Real(value.as_f64()?)),
            _ => None,
        },
        _ => None,
    }
}

fn eval_all(args: &[Term], env: &Assignment) -> Option<Vec<Value>> {
    args.iter().map(|arg| eval(arg, env)).collect()
}

fn values_equal(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some(x == y),
        (Value::Int(x), Value::Int(y)) => Some(x == y),
        (Value::Bool(_), _) | (_, Value::Bool(_)) => None,
        _ => Some(a.as_f64()? == b.as_f64()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::sexpr::parse_term;

    fn env(pairs: &[(&str, Value)]) -> Assignment {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn test_eval_grouping_clause() {
        let term = parse_term("(or (= x 5) (and (>= x 0) (<= x 3)))").unwrap();
        assert_eq!(eval_bool(&term, &env(&[("x", Value::Int(2))])), Some(true));
        assert_eq!(eval_bool(&term, &env(&[("x", Value::Int(4))])), Some(false));
        assert_eq!(eval_bool(&term, &env(&[("x", Value::Int(5))])), Some(true));
    }

    #[test]
    fn test_eval_implication() {
        let term = parse_term("(=> (= A 1) (= B 0))").unwrap();
        let a0 = env(&[("A", Value::Int(0)), ("B", Value::Int(-1))]);
        let a1 = env(&[("A", Value::Int(1)), ("B", Value::Int(-1))]);
        assert_eq!(eval_bool(&term, &a0), Some(true));
        assert_eq!(eval_bool(&term, &a1), Some(false));
    }

    #[test]
    fn test_eval_ite_is_lazy() {
        // the untaken branch divides by zero
        let term = parse_term("(ite (= c 0.0) 0.0 (/ s c))").unwrap();
        let values = env(&[("c", Value::Real(0.0)), ("s", Value::Real(4.0))]);
        assert_eq!(eval(&term, &values), Some(Value::Real(0.0)));
    }

    #[test]
    fn test_eval_division_by_zero() {
        let term = parse_term("(/ 1.0 0.0)").unwrap();
        assert_eq!(eval(&term, &Assignment::new()), None);
    }

    #[test]
    fn test_eval_mixed_arithmetic() {
        let term = parse_term("(+ (* x 0.1) 2)").unwrap();
        let Some(Value::Real(v)) = eval(&term, &env(&[("x", Value::Real(5.0))])) else {
            panic!("expected real");
        };
        assert!((v - 2.5).abs() < 1e-9);
        assert_eq!(
            eval(&parse_term("(- 3 5)").unwrap(), &Assignment::new()),
            Some(Value::Int(-2))
        );
    }

    #[test]
    fn test_eval_mixed_equality() {
        let term = parse_term("(= r 3)").unwrap();
        assert_eq!(eval_bool(&term, &env(&[("r", Value::Real(3.0))])), Some(true));
    }

    #[test]
    fn test_eval_unbound() {
        let term = parse_term("(= y 1)").unwrap();
        assert_eq!(eval(&term, &Assignment::new()), None);
    }
}
