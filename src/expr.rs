//! Arithmetic and relational expressions over named integer variables
//!
//! Schemas compute field widths, repetition counts, conditions and
//! constraint guards from expressions over previously bound fields and
//! constructor parameters. Evaluation is a pure function of the
//! expression and an environment; there is no hidden state, so an
//! evaluator can be driven per field without ceremony.
//!
//! Comparisons return `0` or `1`; division truncates toward zero.
//! Division by zero and unbound variables are hard failures — a missing
//! variable is never silently zero.

use std::fmt::{Display, Formatter, Result as FmtResult};

use indexmap::IndexMap;

/// Variable environment: name to bound integer.
pub type Env = IndexMap<String, i128>;

/// A binary operator usable in schema expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    /// Whether the operator yields a truth value rather than a number.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let text = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        };
        write!(f, "{}", text)
    }
}

/// An expression tree as produced by the schema parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal.
    Const(i128),
    /// Reference to a bound variable.
    Var(String),
    /// Test of bit `index` of a bound variable (`flags.3`).
    Bit { var: String, index: u32 },
    /// Binary application.
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Failure to evaluate an expression against an environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvalError {
    /// The expression referenced a variable the environment does not bind.
    UnknownVariable(String),
    /// The divisor evaluated to zero.
    DivisionByZero,
    /// Intermediate arithmetic left the 128-bit range.
    Overflow,
}

impl Display for EvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            EvalError::UnknownVariable(name) => {
                write!(f, "variable `{}` is not bound", name)
            }
            EvalError::DivisionByZero => write!(f, "division by zero"),
            EvalError::Overflow => write!(f, "arithmetic overflow"),
        }
    }
}

impl std::error::Error for EvalError {}

impl Expr {
    /// Evaluates the expression against `env`.
    pub fn eval(&self, env: &Env) -> Result<i128, EvalError> {
        match self {
            Expr::Const(value) => Ok(*value),
            Expr::Var(name) => lookup(env, name),
            Expr::Bit { var, index } => Ok((lookup(env, var)? >> index) & 1),
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.eval(env)?;
                let r = rhs.eval(env)?;
                match op {
                    BinOp::Add => l.checked_add(r).ok_or(EvalError::Overflow),
                    BinOp::Sub => l.checked_sub(r).ok_or(EvalError::Overflow),
                    BinOp::Mul => l.checked_mul(r).ok_or(EvalError::Overflow),
                    BinOp::Div => {
                        if r == 0 {
                            Err(EvalError::DivisionByZero)
                        } else {
                            // i128 division truncates toward zero
                            Ok(l / r)
                        }
                    }
                    BinOp::Eq => Ok((l == r) as i128),
                    BinOp::Ne => Ok((l != r) as i128),
                    BinOp::Lt => Ok((l < r) as i128),
                    BinOp::Le => Ok((l <= r) as i128),
                    BinOp::Gt => Ok((l > r) as i128),
                    BinOp::Ge => Ok((l >= r) as i128),
                }
            }
        }
    }

    /// Convenience constructor for binary nodes.
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

fn lookup(env: &Env, name: &str) -> Result<i128, EvalError> {
    env.get(name)
        .copied()
        .ok_or_else(|| EvalError::UnknownVariable(name.to_owned()))
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Expr::Const(value) => write!(f, "{}", value),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Bit { var, index } => write!(f, "{}.{}", var, index),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn env(pairs: &[(&str, i128)]) -> Env {
        pairs
            .iter()
            .map(|&(name, value)| (name.to_owned(), value))
            .collect()
    }

    #[test]
    fn arithmetic_and_precedence_shape() {
        let e = Expr::binary(
            BinOp::Add,
            Expr::Var("n".into()),
            Expr::binary(BinOp::Mul, Expr::Const(2), Expr::Var("m".into())),
        );
        assert_eq!(e.eval(&env(&[("n", 3), ("m", 4)])).unwrap(), 11);
    }

    #[test]
    fn division_truncates_toward_zero() {
        let div = |l, r| Expr::binary(BinOp::Div, Expr::Const(l), Expr::Const(r));
        assert_eq!(div(7, 2).eval(&Env::new()).unwrap(), 3);
        assert_eq!(div(-7, 2).eval(&Env::new()).unwrap(), -3);
        assert_eq!(div(7, -2).eval(&Env::new()).unwrap(), -3);
    }

    #[test]
    fn division_by_zero_fails() {
        let e = Expr::binary(BinOp::Div, Expr::Const(1), Expr::Const(0));
        assert_eq!(e.eval(&Env::new()), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn unknown_variable_is_never_zero() {
        let e = Expr::Var("ghost".into());
        assert_eq!(
            e.eval(&Env::new()),
            Err(EvalError::UnknownVariable("ghost".into()))
        );
    }

    #[test]
    fn comparisons_yield_unit_integers() {
        let e = Expr::binary(BinOp::Le, Expr::Var("n".into()), Expr::Const(5));
        assert_eq!(e.eval(&env(&[("n", 5)])).unwrap(), 1);
        assert_eq!(e.eval(&env(&[("n", 6)])).unwrap(), 0);
    }

    #[test]
    fn bit_selection() {
        let e = Expr::Bit {
            var: "flags".into(),
            index: 2,
        };
        assert_eq!(e.eval(&env(&[("flags", 0b100)])).unwrap(), 1);
        assert_eq!(e.eval(&env(&[("flags", 0b011)])).unwrap(), 0);
    }
}
