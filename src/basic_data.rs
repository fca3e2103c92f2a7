//! The constant-list grammar shared by DATA statements and INPUT responses.

use std::fmt;

use crate::basic_functions::parse_numeric_text;
use crate::basic_types::BasicError;

#[derive(Debug, Clone, PartialEq)]
pub enum DataConstant {
    /// A numeric constant. The original text is kept for string targets.
    Number { value: f64, text: String },
    /// Unquoted text, surrounding blanks removed.
    Bare(String),
    Quoted(String),
    /// Nothing between two commas.
    Empty,
}

impl DataConstant {
    pub fn to_number(&self) -> Result<f64, BasicError> {
        match self {
            DataConstant::Number { value, .. } => Ok(*value),
            DataConstant::Bare(text) | DataConstant::Quoted(text) => {
                parse_numeric_text(text).ok_or(BasicError::DataError)
            }
            DataConstant::Empty => Err(BasicError::DataError),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            DataConstant::Number { text, .. } => text.clone(),
            DataConstant::Bare(text) | DataConstant::Quoted(text) => text.clone(),
            DataConstant::Empty => String::new(),
        }
    }
}

impl fmt::Display for DataConstant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataConstant::Number { text, .. } => write!(f, "{}", text),
            DataConstant::Bare(text) => write!(f, "{}", text),
            DataConstant::Quoted(text) => write!(f, "\"{}\"", text.replace('"', "\"\"")),
            DataConstant::Empty => Ok(()),
        }
    }
}

/// Splits a comma-separated constant list. Commas inside quotes do not
/// split; a quoted field may only be followed by blanks.
pub fn parse_data_items(text: &str) -> Result<Vec<DataConstant>, BasicError> {
    let chars: Vec<char> = text.chars().collect();
    let mut items = Vec::new();
    let mut position = 0;

    loop {
        while chars.get(position).map_or(false, |c| c.is_whitespace()) {
            position += 1;
        }

        let item = if chars.get(position) == Some(&'"') {
            let (quoted, next) = read_quoted(&chars, position)?;
            position = next;
            while chars.get(position).map_or(false, |c| c.is_whitespace()) {
                position += 1;
            }
            if !matches!(chars.get(position), None | Some(',')) {
                return Err(BasicError::IncorrectStatement);
            }
            DataConstant::Quoted(quoted)
        } else {
            let start = position;
            while chars.get(position).map_or(false, |c| *c != ',') {
                position += 1;
            }
            let field: String = chars[start..position].iter().collect();
            classify(field.trim())?
        };
        items.push(item);

        match chars.get(position) {
            Some(',') => position += 1,
            _ => break,
        }
    }

    Ok(items)
}

fn read_quoted(chars: &[char], start: usize) -> Result<(String, usize), BasicError> {
    let mut text = String::new();
    let mut position = start + 1;
    loop {
        match chars.get(position) {
            Some('"') if chars.get(position + 1) == Some(&'"') => {
                text.push('"');
                position += 2;
            }
            Some('"') => return Ok((text, position + 1)),
            Some(c) => {
                text.push(*c);
                position += 1;
            }
            None => return Err(BasicError::IncorrectStatement),
        }
    }
}

fn classify(field: &str) -> Result<DataConstant, BasicError> {
    if field.is_empty() {
        return Ok(DataConstant::Empty);
    }
    if field.contains('"') {
        return Err(BasicError::IncorrectStatement);
    }
    Ok(match parse_numeric_text(field) {
        Some(value) => DataConstant::Number { value, text: field.to_string() },
        None => DataConstant::Bare(field.to_string()),
    })
}
