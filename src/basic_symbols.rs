use std::collections::HashMap;
use std::rc::Rc;

use crate::basic_dialect::{DEFAULT_ARRAY_BOUND, MAX_ARRAY_CELLS, MAX_ARRAY_DIMS};
use crate::basic_expressions::{is_string_name, Expression, Value};
use crate::basic_types::BasicError;

/// A function made with DEF. Calls look like variable or array accesses and
/// are resolved when they run.
#[derive(Debug, Clone, PartialEq)]
pub struct UserFunction {
    pub name: String,
    pub param: Option<String>,
    pub body: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    base: usize,
    bounds: Vec<usize>,
    cells: Vec<Value>,
}

impl ArrayValue {
    fn new(name: &str, base: usize, bounds: Vec<usize>) -> Result<Self, BasicError> {
        if bounds.is_empty() || bounds.len() > MAX_ARRAY_DIMS {
            return Err(BasicError::BadSubscript);
        }
        if bounds.iter().any(|&b| b < base) {
            return Err(BasicError::BadValue);
        }
        let size = bounds
            .iter()
            .try_fold(1usize, |size, &b| size.checked_mul((b - base).checked_add(1)?))
            .filter(|&size| size <= MAX_ARRAY_CELLS)
            .ok_or(BasicError::MemoryFull)?;
        Ok(ArrayValue {
            base,
            bounds,
            cells: vec![Value::default_for(name); size],
        })
    }

    fn offset(&self, indices: &[f64]) -> Result<usize, BasicError> {
        if indices.len() != self.bounds.len() {
            return Err(BasicError::NameConflict);
        }
        let mut offset = 0;
        for (&index, &bound) in indices.iter().zip(&self.bounds) {
            let index = index.round();
            if index < self.base as f64 || index > bound as f64 {
                return Err(BasicError::BadSubscript);
            }
            offset = offset * (bound - self.base + 1) + (index as usize - self.base);
        }
        Ok(offset)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolValue {
    Scalar(Value),
    Array(ArrayValue),
    Function(Rc<UserFunction>),
}

/// What a name currently stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Value(Value),
    Function(Rc<UserFunction>),
    Array,
    Missing,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, SymbolValue>,
    /// Parameters of the user functions being evaluated, innermost last.
    scopes: Vec<(String, Value)>,
    option_base: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every variable, array and function. OPTION BASE goes back to 0.
    pub fn clear(&mut self) {
        *self = SymbolTable::new();
    }

    pub fn lookup(&self, name: &str) -> Lookup {
        if let Some((_, value)) = self.scopes.iter().rev().find(|(param, _)| param == name) {
            return Lookup::Value(value.clone());
        }
        match self.symbols.get(name) {
            Some(SymbolValue::Scalar(value)) => Lookup::Value(value.clone()),
            Some(SymbolValue::Function(function)) => Lookup::Function(Rc::clone(function)),
            Some(SymbolValue::Array(_)) => Lookup::Array,
            None => Lookup::Missing,
        }
    }

    /// Reads a scalar; never-assigned names read as 0 or "".
    pub fn get_scalar(&self, name: &str) -> Result<Value, BasicError> {
        match self.lookup(name) {
            Lookup::Value(value) => Ok(value),
            Lookup::Missing => Ok(Value::default_for(name)),
            Lookup::Array | Lookup::Function(_) => Err(BasicError::NameConflict),
        }
    }

    pub fn set_scalar(&mut self, name: &str, value: Value) -> Result<(), BasicError> {
        check_type(name, &value)?;
        match self.symbols.get(name) {
            Some(SymbolValue::Array(_)) | Some(SymbolValue::Function(_)) => Err(BasicError::NameConflict),
            _ => {
                self.symbols.insert(name.to_string(), SymbolValue::Scalar(value));
                Ok(())
            }
        }
    }

    pub fn get_element(&mut self, name: &str, indices: &[f64]) -> Result<Value, BasicError> {
        let array = self.array_mut(name, indices.len())?;
        let offset = array.offset(indices)?;
        Ok(array.cells[offset].clone())
    }

    pub fn set_element(&mut self, name: &str, indices: &[f64], value: Value) -> Result<(), BasicError> {
        check_type(name, &value)?;
        let array = self.array_mut(name, indices.len())?;
        let offset = array.offset(indices)?;
        array.cells[offset] = value;
        Ok(())
    }

    /// DIM: fails if the name already holds anything.
    pub fn dim_array(&mut self, name: &str, bounds: Vec<usize>) -> Result<(), BasicError> {
        if self.symbols.contains_key(name) {
            return Err(BasicError::NameConflict);
        }
        let array = ArrayValue::new(name, self.option_base, bounds)?;
        self.symbols.insert(name.to_string(), SymbolValue::Array(array));
        Ok(())
    }

    pub fn option_base(&self) -> usize {
        self.option_base
    }

    pub fn set_option_base(&mut self, base: usize) -> Result<(), BasicError> {
        if base > 1 {
            return Err(BasicError::IncorrectStatement);
        }
        self.option_base = base;
        Ok(())
    }

    /// DEF: running the same DEF again replaces the definition.
    pub fn define_function(&mut self, function: UserFunction) -> Result<(), BasicError> {
        match self.symbols.get(&function.name) {
            Some(SymbolValue::Scalar(_)) | Some(SymbolValue::Array(_)) => Err(BasicError::NameConflict),
            _ => {
                self.symbols
                    .insert(function.name.clone(), SymbolValue::Function(Rc::new(function)));
                Ok(())
            }
        }
    }

    /// Opens a scope holding a function parameter for the duration of a call.
    pub fn push_scope(&mut self, name: &str, value: Value) {
        self.scopes.push((name.to_string(), value));
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// The array behind `name`, created with default bounds on first use.
    fn array_mut(&mut self, name: &str, dimensions: usize) -> Result<&mut ArrayValue, BasicError> {
        if !self.symbols.contains_key(name) {
            let array = ArrayValue::new(name, self.option_base, vec![DEFAULT_ARRAY_BOUND; dimensions])?;
            self.symbols.insert(name.to_string(), SymbolValue::Array(array));
        }
        match self.symbols.get_mut(name) {
            Some(SymbolValue::Array(array)) => Ok(array),
            _ => Err(BasicError::NameConflict),
        }
    }
}

fn check_type(name: &str, value: &Value) -> Result<(), BasicError> {
    match (is_string_name(name), value) {
        (true, Value::Text(_)) | (false, Value::Number(_)) => Ok(()),
        _ => Err(BasicError::StringNumberMismatch),
    }
}
