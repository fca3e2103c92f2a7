//! Expression trees and their evaluation.
//!
//! Trees never hold values of variables. Names are resolved through an
//! [`EvalContext`] at evaluation time, so the same tree can run against any
//! machine state.

use std::fmt;

use crate::basic_format::format_constant;
use crate::basic_functions::{self, NumericFunction, StringMeasure};
use crate::basic_operators::{
    clamp, precedence_of_arith, ArithOp, RelOp, ATOM_PRECEDENCE, UNARY_PRECEDENCE,
};
use crate::basic_types::{BasicError, BasicWarning};

/// A runtime value. Numbers and strings never convert into each other
/// implicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn default_for(name: &str) -> Value {
        if is_string_name(name) {
            Value::Text(String::new())
        } else {
            Value::Number(0.0)
        }
    }
}

pub fn is_string_name(name: &str) -> bool {
    name.ends_with('$')
}

/// What an expression needs from the machine while it runs.
pub trait EvalContext {
    fn numeric_variable(&mut self, name: &str) -> Result<f64, BasicError>;
    fn string_variable(&mut self, name: &str) -> Result<String, BasicError>;
    fn numeric_element(&mut self, name: &str, indices: &[f64]) -> Result<f64, BasicError>;
    fn string_element(&mut self, name: &str, indices: &[f64]) -> Result<String, BasicError>;
    /// Next value of RND, in [0, 1).
    fn random(&mut self) -> f64;
    fn warn(&mut self, warning: BasicWarning);
}

#[derive(Debug, Clone, PartialEq)]
pub enum NumericExpr {
    Constant(f64),
    Variable(String),
    Element { name: String, indices: Vec<NumericExpr> },
    Binary { op: ArithOp, left: Box<NumericExpr>, right: Box<NumericExpr> },
    Negate(Box<NumericExpr>),
    Compare { op: RelOp, left: Box<NumericExpr>, right: Box<NumericExpr> },
    CompareStrings { op: RelOp, left: Box<StringExpr>, right: Box<StringExpr> },
    Function { function: NumericFunction, arg: Box<NumericExpr> },
    Rnd,
    Measure { function: StringMeasure, arg: Box<StringExpr> },
    Pos { haystack: Box<StringExpr>, needle: Box<StringExpr>, start: Box<NumericExpr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringExpr {
    Constant(String),
    Variable(String),
    Element { name: String, indices: Vec<NumericExpr> },
    Concat(Box<StringExpr>, Box<StringExpr>),
    Chr(Box<NumericExpr>),
    Seg { source: Box<StringExpr>, start: Box<NumericExpr>, length: Box<NumericExpr> },
    Str(Box<NumericExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Numeric(NumericExpr),
    String(StringExpr),
}

/// Clamps `value` into the machine range, warning NUMBER TOO BIG through
/// `ctx` when it was outside.
pub fn checked(ctx: &mut dyn EvalContext, value: f64) -> f64 {
    let (value, warning) = clamp(value);
    if let Some(warning) = warning {
        ctx.warn(warning);
    }
    value
}

fn evaluate_indices(indices: &[NumericExpr], ctx: &mut dyn EvalContext) -> Result<Vec<f64>, BasicError> {
    indices.iter().map(|index| index.evaluate(ctx)).collect()
}

impl NumericExpr {
    pub fn binary(op: ArithOp, left: NumericExpr, right: NumericExpr) -> Self {
        NumericExpr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn evaluate(&self, ctx: &mut dyn EvalContext) -> Result<f64, BasicError> {
        match self {
            NumericExpr::Constant(value) => Ok(checked(ctx, *value)),
            NumericExpr::Variable(name) => ctx.numeric_variable(name),
            NumericExpr::Element { name, indices } => {
                let indices = evaluate_indices(indices, ctx)?;
                ctx.numeric_element(name, &indices)
            }
            NumericExpr::Binary { op, left, right } => {
                let left = left.evaluate(ctx)?;
                let right = right.evaluate(ctx)?;
                let result = op.apply(left, right)?;
                Ok(checked(ctx, result))
            }
            NumericExpr::Negate(operand) => Ok(-operand.evaluate(ctx)?),
            NumericExpr::Compare { op, left, right } => {
                let left = left.evaluate(ctx)?;
                let right = right.evaluate(ctx)?;
                Ok(op.compare_numbers(left, right))
            }
            NumericExpr::CompareStrings { op, left, right } => {
                let left = left.evaluate(ctx)?;
                let right = right.evaluate(ctx)?;
                Ok(op.compare_strings(&left, &right))
            }
            NumericExpr::Function { function, arg } => {
                let value = arg.evaluate(ctx)?;
                let result = function.apply(value)?;
                Ok(checked(ctx, result))
            }
            NumericExpr::Rnd => Ok(ctx.random()),
            NumericExpr::Measure { function, arg } => {
                let text = arg.evaluate(ctx)?;
                let result = function.apply(&text)?;
                Ok(checked(ctx, result))
            }
            NumericExpr::Pos { haystack, needle, start } => {
                let haystack = haystack.evaluate(ctx)?;
                let needle = needle.evaluate(ctx)?;
                let start = start.evaluate(ctx)?;
                basic_functions::pos(&haystack, &needle, start)
            }
        }
    }

    fn precedence(&self) -> i32 {
        match self {
            NumericExpr::Compare { .. } | NumericExpr::CompareStrings { .. } => 1,
            NumericExpr::Binary { op, .. } => precedence_of_arith(*op),
            NumericExpr::Negate(_) => UNARY_PRECEDENCE,
            NumericExpr::Constant(value) if *value < 0.0 => UNARY_PRECEDENCE,
            _ => ATOM_PRECEDENCE,
        }
    }

    pub fn collect_names(&self, names: &mut Vec<String>) {
        match self {
            NumericExpr::Constant(_) | NumericExpr::Rnd => {}
            NumericExpr::Variable(name) => names.push(name.clone()),
            NumericExpr::Element { name, indices } => {
                names.push(name.clone());
                for index in indices {
                    index.collect_names(names);
                }
            }
            NumericExpr::Binary { left, right, .. } | NumericExpr::Compare { left, right, .. } => {
                left.collect_names(names);
                right.collect_names(names);
            }
            NumericExpr::CompareStrings { left, right, .. } => {
                left.collect_names(names);
                right.collect_names(names);
            }
            NumericExpr::Negate(operand) | NumericExpr::Function { arg: operand, .. } => {
                operand.collect_names(names)
            }
            NumericExpr::Measure { arg, .. } => arg.collect_names(names),
            NumericExpr::Pos { haystack, needle, start } => {
                haystack.collect_names(names);
                needle.collect_names(names);
                start.collect_names(names);
            }
        }
    }
}

impl StringExpr {
    pub fn evaluate(&self, ctx: &mut dyn EvalContext) -> Result<String, BasicError> {
        match self {
            StringExpr::Constant(text) => Ok(text.clone()),
            StringExpr::Variable(name) => ctx.string_variable(name),
            StringExpr::Element { name, indices } => {
                let indices = evaluate_indices(indices, ctx)?;
                ctx.string_element(name, &indices)
            }
            StringExpr::Concat(left, right) => {
                let mut text = left.evaluate(ctx)?;
                text.push_str(&right.evaluate(ctx)?);
                Ok(text)
            }
            StringExpr::Chr(code) => basic_functions::chr(code.evaluate(ctx)?),
            StringExpr::Seg { source, start, length } => {
                let source = source.evaluate(ctx)?;
                let start = start.evaluate(ctx)?;
                let length = length.evaluate(ctx)?;
                basic_functions::seg(&source, start, length)
            }
            StringExpr::Str(value) => Ok(basic_functions::str_of(value.evaluate(ctx)?)),
        }
    }

    pub fn collect_names(&self, names: &mut Vec<String>) {
        match self {
            StringExpr::Constant(_) => {}
            StringExpr::Variable(name) => names.push(name.clone()),
            StringExpr::Element { name, indices } => {
                names.push(name.clone());
                for index in indices {
                    index.collect_names(names);
                }
            }
            StringExpr::Concat(left, right) => {
                left.collect_names(names);
                right.collect_names(names);
            }
            StringExpr::Chr(value) | StringExpr::Str(value) => value.collect_names(names),
            StringExpr::Seg { source, start, length } => {
                source.collect_names(names);
                start.collect_names(names);
                length.collect_names(names);
            }
        }
    }
}

impl Expression {
    pub fn evaluate(&self, ctx: &mut dyn EvalContext) -> Result<Value, BasicError> {
        match self {
            Expression::Numeric(e) => Ok(Value::Number(e.evaluate(ctx)?)),
            Expression::String(e) => Ok(Value::Text(e.evaluate(ctx)?)),
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Expression::String(_))
    }

    pub fn into_numeric(self) -> Result<NumericExpr, BasicError> {
        match self {
            Expression::Numeric(e) => Ok(e),
            Expression::String(_) => Err(BasicError::StringNumberMismatch),
        }
    }

    pub fn into_string(self) -> Result<StringExpr, BasicError> {
        match self {
            Expression::String(e) => Ok(e),
            Expression::Numeric(_) => Err(BasicError::StringNumberMismatch),
        }
    }

    pub fn collect_names(&self, names: &mut Vec<String>) {
        match self {
            Expression::Numeric(e) => e.collect_names(names),
            Expression::String(e) => e.collect_names(names),
        }
    }
}

/// Assignment target: a scalar or an array element.
#[derive(Debug, Clone, PartialEq)]
pub struct LValue {
    pub name: String,
    pub indices: Vec<NumericExpr>,
}

impl LValue {
    pub fn scalar(name: &str) -> Self {
        LValue { name: name.to_string(), indices: Vec::new() }
    }

    pub fn is_string(&self) -> bool {
        is_string_name(&self.name)
    }

    pub fn collect_names(&self, names: &mut Vec<String>) {
        names.push(self.name.clone());
        for index in &self.indices {
            index.collect_names(names);
        }
    }
}

impl fmt::Display for LValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)?;
        write_indices(f, &self.indices)
    }
}

fn write_indices(f: &mut fmt::Formatter, indices: &[NumericExpr]) -> fmt::Result {
    if indices.is_empty() {
        return Ok(());
    }
    write!(f, "(")?;
    for (i, index) in indices.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{}", index)?;
    }
    write!(f, ")")
}

fn write_operand(f: &mut fmt::Formatter, operand: &NumericExpr, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(f, "({})", operand)
    } else {
        write!(f, "{}", operand)
    }
}

impl fmt::Display for NumericExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NumericExpr::Constant(value) => write!(f, "{}", format_constant(*value)),
            NumericExpr::Variable(name) => write!(f, "{}", name),
            NumericExpr::Element { name, indices } => {
                write!(f, "{}", name)?;
                write_indices(f, indices)
            }
            NumericExpr::Binary { op, left, right } => {
                let precedence = precedence_of_arith(*op);
                write_operand(f, left, left.precedence() < precedence)?;
                write!(f, "{}", op)?;
                write_operand(f, right, right.precedence() <= precedence)
            }
            NumericExpr::Negate(operand) => {
                write!(f, "-")?;
                write_operand(f, operand, operand.precedence() < ATOM_PRECEDENCE)
            }
            NumericExpr::Compare { op, left, right } => {
                write_operand(f, left, left.precedence() < 1)?;
                write!(f, "{}", op)?;
                write_operand(f, right, right.precedence() <= 1)
            }
            NumericExpr::CompareStrings { op, left, right } => {
                write!(f, "{}{}{}", left, op, right)
            }
            NumericExpr::Function { function, arg } => write!(f, "{}({})", function.name(), arg),
            NumericExpr::Rnd => write!(f, "RND"),
            NumericExpr::Measure { function, arg } => write!(f, "{}({})", function.name(), arg),
            NumericExpr::Pos { haystack, needle, start } => {
                write!(f, "POS({},{},{})", haystack, needle, start)
            }
        }
    }
}

impl fmt::Display for StringExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StringExpr::Constant(text) => write!(f, "\"{}\"", text.replace('"', "\"\"")),
            StringExpr::Variable(name) => write!(f, "{}", name),
            StringExpr::Element { name, indices } => {
                write!(f, "{}", name)?;
                write_indices(f, indices)
            }
            StringExpr::Concat(left, right) => match right.as_ref() {
                StringExpr::Concat(..) => write!(f, "{}&({})", left, right),
                _ => write!(f, "{}&{}", left, right),
            },
            StringExpr::Chr(code) => write!(f, "CHR$({})", code),
            StringExpr::Seg { source, start, length } => {
                write!(f, "SEG$({},{},{})", source, start, length)
            }
            StringExpr::Str(value) => write!(f, "STR$({})", value),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Numeric(e) => write!(f, "{}", e),
            Expression::String(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_dialect::MAX_MAGNITUDE;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Scratch {
        numbers: HashMap<String, f64>,
        strings: HashMap<String, String>,
        warnings: Vec<BasicWarning>,
    }

    impl EvalContext for Scratch {
        fn numeric_variable(&mut self, name: &str) -> Result<f64, BasicError> {
            Ok(self.numbers.get(name).copied().unwrap_or(0.0))
        }

        fn string_variable(&mut self, name: &str) -> Result<String, BasicError> {
            Ok(self.strings.get(name).cloned().unwrap_or_default())
        }

        fn numeric_element(&mut self, _name: &str, indices: &[f64]) -> Result<f64, BasicError> {
            Ok(indices.iter().sum())
        }

        fn string_element(&mut self, _name: &str, _indices: &[f64]) -> Result<String, BasicError> {
            Err(BasicError::BadSubscript)
        }

        fn random(&mut self) -> f64 {
            0.25
        }

        fn warn(&mut self, warning: BasicWarning) {
            self.warnings.push(warning);
        }
    }

    fn num(value: f64) -> NumericExpr {
        NumericExpr::Constant(value)
    }

    fn var(name: &str) -> NumericExpr {
        NumericExpr::Variable(name.to_string())
    }

    #[test]
    fn test_arithmetic() {
        let mut ctx = Scratch::default();
        ctx.numbers.insert("X".to_string(), 4.0);
        let expr = NumericExpr::binary(
            ArithOp::Add,
            num(2.0),
            NumericExpr::binary(ArithOp::Multiply, var("X"), num(3.0)),
        );
        assert_eq!(expr.evaluate(&mut ctx), Ok(14.0));
        assert_eq!(expr.to_string(), "2+X*3");
    }

    #[test]
    fn test_negation_binds_tighter_than_power() {
        let mut ctx = Scratch::default();
        let expr = NumericExpr::binary(ArithOp::Power, NumericExpr::Negate(Box::new(num(2.0))), num(2.0));
        assert_eq!(expr.evaluate(&mut ctx), Ok(4.0));
        assert_eq!(expr.to_string(), "-2^2");

        let negated_power = NumericExpr::Negate(Box::new(NumericExpr::binary(ArithOp::Power, num(2.0), num(2.0))));
        assert_eq!(negated_power.evaluate(&mut ctx), Ok(-4.0));
        assert_eq!(negated_power.to_string(), "-(2^2)");
    }

    #[test]
    fn test_left_associative_display() {
        let expr = NumericExpr::binary(
            ArithOp::Subtract,
            num(10.0),
            NumericExpr::binary(ArithOp::Subtract, num(4.0), num(3.0)),
        );
        assert_eq!(expr.to_string(), "10-(4-3)");
        assert_eq!(expr.evaluate(&mut Scratch::default()), Ok(9.0));
    }

    #[test]
    fn test_overflow_warns_and_clamps() {
        let mut ctx = Scratch::default();
        let expr = NumericExpr::binary(ArithOp::Divide, num(1.0), num(0.0));
        assert_eq!(expr.evaluate(&mut ctx), Ok(MAX_MAGNITUDE));
        assert_eq!(ctx.warnings, vec![BasicWarning::NumberTooBig]);
    }

    #[test]
    fn test_string_comparison() {
        let mut ctx = Scratch::default();
        ctx.strings.insert("A$".to_string(), "APPLE".to_string());
        let expr = NumericExpr::CompareStrings {
            op: RelOp::Less,
            left: Box::new(StringExpr::Variable("A$".to_string())),
            right: Box::new(StringExpr::Constant("BANANA".to_string())),
        };
        assert_eq!(expr.evaluate(&mut ctx), Ok(-1.0));
        assert_eq!(expr.to_string(), "A$<\"BANANA\"");
    }

    #[test]
    fn test_string_functions() {
        let mut ctx = Scratch::default();
        let expr = StringExpr::Concat(
            Box::new(StringExpr::Chr(Box::new(num(72.0)))),
            Box::new(StringExpr::Str(Box::new(num(-1.5)))),
        );
        assert_eq!(expr.evaluate(&mut ctx), Ok("H-1.5".to_string()));
        assert_eq!(expr.to_string(), "CHR$(72)&STR$(-1.5)");
    }

    #[test]
    fn test_elements_and_errors_propagate() {
        let mut ctx = Scratch::default();
        let element = NumericExpr::Element { name: "A".to_string(), indices: vec![num(1.0), num(2.0)] };
        assert_eq!(element.evaluate(&mut ctx), Ok(3.0));
        let text = StringExpr::Element { name: "B$".to_string(), indices: vec![num(1.0)] };
        assert_eq!(text.evaluate(&mut ctx), Err(BasicError::BadSubscript));
    }

    #[test]
    fn test_collect_names() {
        let expr = NumericExpr::Pos {
            haystack: Box::new(StringExpr::Variable("H$".to_string())),
            needle: Box::new(StringExpr::Constant("X".to_string())),
            start: Box::new(var("START")),
        };
        let mut names = Vec::new();
        expr.collect_names(&mut names);
        assert_eq!(names, vec!["H$".to_string(), "START".to_string()]);
    }
}
