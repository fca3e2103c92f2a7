use std::collections::HashMap;
use std::fmt;

use crate::basic_dialect::MAX_MAGNITUDE;
use crate::basic_types::{BasicError, BasicWarning, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl ArithOp {
    /// Applies the operator. Overflow is left in the result (infinite or
    /// beyond the machine range) for `clamp` to report.
    pub fn apply(self, left: f64, right: f64) -> Result<f64, BasicError> {
        match self {
            ArithOp::Add => Ok(left + right),
            ArithOp::Subtract => Ok(left - right),
            ArithOp::Multiply => Ok(left * right),
            ArithOp::Divide => {
                if right == 0.0 {
                    // Sign of the dividend decides which end of the range we land on.
                    Ok(if left < 0.0 { f64::NEG_INFINITY } else { f64::INFINITY })
                } else {
                    Ok(left / right)
                }
            }
            ArithOp::Power => {
                if left < 0.0 && right.fract() != 0.0 {
                    return Err(BasicError::BadArgument);
                }
                Ok(left.powf(right))
            }
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Subtract => "-",
            ArithOp::Multiply => "*",
            ArithOp::Divide => "/",
            ArithOp::Power => "^",
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl RelOp {
    pub fn compare_numbers(self, left: f64, right: f64) -> f64 {
        truth(match self {
            RelOp::Equal => left == right,
            RelOp::NotEqual => left != right,
            RelOp::Less => left < right,
            RelOp::LessEqual => left <= right,
            RelOp::Greater => left > right,
            RelOp::GreaterEqual => left >= right,
        })
    }

    /// Strings compare on their raw characters.
    pub fn compare_strings(self, left: &str, right: &str) -> f64 {
        truth(match self {
            RelOp::Equal => left == right,
            RelOp::NotEqual => left != right,
            RelOp::Less => left < right,
            RelOp::LessEqual => left <= right,
            RelOp::Greater => left > right,
            RelOp::GreaterEqual => left >= right,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Equal => "=",
            RelOp::NotEqual => "<>",
            RelOp::Less => "<",
            RelOp::LessEqual => "<=",
            RelOp::Greater => ">",
            RelOp::GreaterEqual => ">=",
        }
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// -1 for true, 0 for false.
pub fn truth(condition: bool) -> f64 {
    if condition {
        -1.0
    } else {
        0.0
    }
}

/// Pulls a result back into the machine range, reporting NUMBER TOO BIG
/// when it had to.
pub fn clamp(value: f64) -> (f64, Option<BasicWarning>) {
    if value.is_nan() {
        (MAX_MAGNITUDE, Some(BasicWarning::NumberTooBig))
    } else if value > MAX_MAGNITUDE {
        (MAX_MAGNITUDE, Some(BasicWarning::NumberTooBig))
    } else if value < -MAX_MAGNITUDE {
        (-MAX_MAGNITUDE, Some(BasicWarning::NumberTooBig))
    } else {
        (value, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Relational(RelOp),
    Arithmetic(ArithOp),
}

#[derive(Debug, Clone)]
pub struct OpDef {
    pub precedence: i32,
    pub kind: OperatorKind,
}

/// Binding strength of unary minus and plus: above `^`, so `-2^2` is 4.
pub const UNARY_PRECEDENCE: i32 = 5;

/// Binding strength of atoms (constants, variables, calls, groups).
pub const ATOM_PRECEDENCE: i32 = 6;

lazy_static::lazy_static! {
    static ref OPERATORS: HashMap<&'static str, OpDef> = {
        let mut m = HashMap::new();

        // Exponentiation
        m.insert("^", OpDef { precedence: 4, kind: OperatorKind::Arithmetic(ArithOp::Power) });

        // Multiplication and division
        m.insert("*", OpDef { precedence: 3, kind: OperatorKind::Arithmetic(ArithOp::Multiply) });
        m.insert("/", OpDef { precedence: 3, kind: OperatorKind::Arithmetic(ArithOp::Divide) });

        // Addition and subtraction
        m.insert("+", OpDef { precedence: 2, kind: OperatorKind::Arithmetic(ArithOp::Add) });
        m.insert("-", OpDef { precedence: 2, kind: OperatorKind::Arithmetic(ArithOp::Subtract) });

        // Comparison operators
        m.insert("=", OpDef { precedence: 1, kind: OperatorKind::Relational(RelOp::Equal) });
        m.insert("<>", OpDef { precedence: 1, kind: OperatorKind::Relational(RelOp::NotEqual) });
        m.insert("<", OpDef { precedence: 1, kind: OperatorKind::Relational(RelOp::Less) });
        m.insert("<=", OpDef { precedence: 1, kind: OperatorKind::Relational(RelOp::LessEqual) });
        m.insert(">", OpDef { precedence: 1, kind: OperatorKind::Relational(RelOp::Greater) });
        m.insert(">=", OpDef { precedence: 1, kind: OperatorKind::Relational(RelOp::GreaterEqual) });

        m
    };
}

pub fn get_op_def(operator: &str) -> Option<&'static OpDef> {
    OPERATORS.get(operator)
}

pub fn token_op_def(token: &Token) -> Option<&'static OpDef> {
    let op_str = match token {
        Token::Plus => "+",
        Token::Minus => "-",
        Token::Star => "*",
        Token::Slash => "/",
        Token::Power => "^",
        Token::Equal => "=",
        Token::NotEqual => "<>",
        Token::Less => "<",
        Token::LessEqual => "<=",
        Token::Greater => ">",
        Token::GreaterEqual => ">=",
        _ => return None,
    };
    get_op_def(op_str)
}

pub fn relational_op(token: &Token) -> Option<RelOp> {
    match token_op_def(token)?.kind {
        OperatorKind::Relational(op) => Some(op),
        _ => None,
    }
}

pub fn precedence_of_arith(op: ArithOp) -> i32 {
    get_op_def(op.symbol()).map_or(0, |def| def.precedence)
}
