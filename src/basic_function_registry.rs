use std::collections::HashMap;

use crate::basic_expressions::{Expression, NumericExpr, StringExpr};
use crate::basic_functions::{NumericFunction, StringMeasure};
use crate::basic_types::BasicError;

/// Argument types for BASIC functions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgType {
    Number,
    String,
}

impl ArgType {
    pub fn name(&self) -> &str {
        match self {
            ArgType::Number => "number",
            ArgType::String => "string",
        }
    }
}

/// Which expression node a call builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Numeric(NumericFunction),
    Measure(StringMeasure),
    Rnd,
    Pos,
    Chr,
    Seg,
    Str,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: &'static str,
    pub kind: FunctionKind,
    pub arg_types: Vec<ArgType>,
    pub returns: ArgType,
}

impl FunctionDef {
    /// Builds the call node from arguments already parsed per `arg_types`.
    pub fn build(&self, args: Vec<Expression>) -> Result<Expression, BasicError> {
        if args.len() != self.arg_types.len() {
            return Err(BasicError::IncorrectStatement);
        }
        let mut args = args.into_iter();
        let mut next = || args.next().ok_or(BasicError::IncorrectStatement);
        let expr = match self.kind {
            FunctionKind::Numeric(function) => Expression::Numeric(NumericExpr::Function {
                function,
                arg: Box::new(next()?.into_numeric()?),
            }),
            FunctionKind::Rnd => Expression::Numeric(NumericExpr::Rnd),
            FunctionKind::Measure(function) => Expression::Numeric(NumericExpr::Measure {
                function,
                arg: Box::new(next()?.into_string()?),
            }),
            FunctionKind::Pos => Expression::Numeric(NumericExpr::Pos {
                haystack: Box::new(next()?.into_string()?),
                needle: Box::new(next()?.into_string()?),
                start: Box::new(next()?.into_numeric()?),
            }),
            FunctionKind::Chr => Expression::String(StringExpr::Chr(Box::new(next()?.into_numeric()?))),
            FunctionKind::Seg => Expression::String(StringExpr::Seg {
                source: Box::new(next()?.into_string()?),
                start: Box::new(next()?.into_numeric()?),
                length: Box::new(next()?.into_numeric()?),
            }),
            FunctionKind::Str => Expression::String(StringExpr::Str(Box::new(next()?.into_numeric()?))),
        };
        Ok(expr)
    }
}

pub struct FunctionRegistry {
    functions: HashMap<&'static str, FunctionDef>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = FunctionRegistry {
            functions: HashMap::new(),
        };

        registry.register_math_functions();
        registry.register_string_functions();

        registry
    }

    fn register(&mut self, name: &'static str, kind: FunctionKind, arg_types: Vec<ArgType>, returns: ArgType) {
        self.functions.insert(name, FunctionDef { name, kind, arg_types, returns });
    }

    fn register_math_functions(&mut self) {
        use NumericFunction::*;
        for function in [Abs, Atn, Cos, Exp, Int, Log, Sgn, Sin, Sqr, Tan] {
            self.register(function.name(), FunctionKind::Numeric(function), vec![ArgType::Number], ArgType::Number);
        }

        // RND takes no argument list at all
        self.register("RND", FunctionKind::Rnd, vec![], ArgType::Number);
    }

    fn register_string_functions(&mut self) {
        use StringMeasure::*;
        for function in [Asc, Len, Val] {
            self.register(function.name(), FunctionKind::Measure(function), vec![ArgType::String], ArgType::Number);
        }

        self.register(
            "POS",
            FunctionKind::Pos,
            vec![ArgType::String, ArgType::String, ArgType::Number],
            ArgType::Number,
        );
        self.register("CHR$", FunctionKind::Chr, vec![ArgType::Number], ArgType::String);
        self.register(
            "SEG$",
            FunctionKind::Seg,
            vec![ArgType::String, ArgType::Number, ArgType::Number],
            ArgType::String,
        );
        self.register("STR$", FunctionKind::Str, vec![ArgType::Number], ArgType::String);
    }

    pub fn get_function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn get_function_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn is_string_function(&self, name: &str) -> bool {
        self.functions
            .get(name)
            .map_or(false, |def| def.returns == ArgType::String)
    }

    pub fn is_numeric_function(&self, name: &str) -> bool {
        self.functions
            .get(name)
            .map_or(false, |def| def.returns == ArgType::Number)
    }

    pub fn get_arg_count(&self, name: &str) -> Option<usize> {
        self.functions.get(name).map(|def| def.arg_types.len())
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Global singleton instance
lazy_static::lazy_static! {
    pub static ref FUNCTION_REGISTRY: FunctionRegistry = FunctionRegistry::new();
}
