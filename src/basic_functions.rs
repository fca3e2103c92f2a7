use lazy_static::lazy_static;
use regex::Regex;

use crate::basic_dialect::MAX_CHARACTER_CODE;
use crate::basic_format::format_str;
use crate::basic_types::BasicError;

lazy_static! {
    /// Text accepted as a number by VAL, READ and INPUT.
    static ref NUMERIC_TEXT: Regex =
        Regex::new(r"^\s*[+-]?(\d+\.?\d*|\.\d+)([Ee][+-]?\d+)?\s*$").expect("numeric pattern");
}

/// Parses text the way the console reads a typed number. Anything the
/// number grammar does not accept gives `None`.
pub fn parse_numeric_text(text: &str) -> Option<f64> {
    if !NUMERIC_TEXT.is_match(text) {
        return None;
    }
    text.trim().parse::<f64>().ok()
}

/// Single-argument numeric library functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericFunction {
    Abs,
    Atn,
    Cos,
    Exp,
    Int,
    Log,
    Sgn,
    Sin,
    Sqr,
    Tan,
}

impl NumericFunction {
    pub fn apply(self, value: f64) -> Result<f64, BasicError> {
        match self {
            NumericFunction::Abs => Ok(value.abs()),
            NumericFunction::Atn => Ok(value.atan()),
            NumericFunction::Cos => Ok(value.cos()),
            NumericFunction::Exp => Ok(value.exp()),
            NumericFunction::Int => Ok(value.floor()),
            NumericFunction::Log => {
                if value <= 0.0 {
                    return Err(BasicError::BadArgument);
                }
                Ok(value.ln())
            }
            NumericFunction::Sgn => Ok(if value > 0.0 {
                1.0
            } else if value < 0.0 {
                -1.0
            } else {
                0.0
            }),
            NumericFunction::Sin => Ok(value.sin()),
            NumericFunction::Sqr => {
                if value < 0.0 {
                    return Err(BasicError::BadArgument);
                }
                Ok(value.sqrt())
            }
            NumericFunction::Tan => Ok(value.tan()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumericFunction::Abs => "ABS",
            NumericFunction::Atn => "ATN",
            NumericFunction::Cos => "COS",
            NumericFunction::Exp => "EXP",
            NumericFunction::Int => "INT",
            NumericFunction::Log => "LOG",
            NumericFunction::Sgn => "SGN",
            NumericFunction::Sin => "SIN",
            NumericFunction::Sqr => "SQR",
            NumericFunction::Tan => "TAN",
        }
    }
}

/// Numeric functions of one string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMeasure {
    Asc,
    Len,
    Val,
}

impl StringMeasure {
    pub fn apply(self, text: &str) -> Result<f64, BasicError> {
        match self {
            StringMeasure::Asc => text
                .chars()
                .next()
                .map(|c| c as u32 as f64)
                .ok_or(BasicError::BadArgument),
            StringMeasure::Len => Ok(text.chars().count() as f64),
            StringMeasure::Val => parse_numeric_text(text).ok_or(BasicError::BadArgument),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StringMeasure::Asc => "ASC",
            StringMeasure::Len => "LEN",
            StringMeasure::Val => "VAL",
        }
    }
}

/// CHR$: the character with the given code.
pub fn chr(code: f64) -> Result<String, BasicError> {
    let code = code.round();
    if !(0.0..=MAX_CHARACTER_CODE).contains(&code) {
        return Err(BasicError::BadValue);
    }
    char::from_u32(code as u32)
        .map(|c| c.to_string())
        .ok_or(BasicError::BadValue)
}

/// SEG$: `length` characters of `source` starting at 1-based `start`.
pub fn seg(source: &str, start: f64, length: f64) -> Result<String, BasicError> {
    let start = start.round();
    let length = length.round();
    if start < 1.0 || length < 0.0 {
        return Err(BasicError::BadValue);
    }
    Ok(source
        .chars()
        .skip(start as usize - 1)
        .take(length as usize)
        .collect())
}

/// POS: 1-based position of `needle` in `haystack` at or after `start`, or 0.
pub fn pos(haystack: &str, needle: &str, start: f64) -> Result<f64, BasicError> {
    let start = start.round();
    if start < 1.0 {
        return Err(BasicError::BadValue);
    }
    if needle.is_empty() {
        return Ok(0.0);
    }
    let chars: Vec<char> = haystack.chars().collect();
    let wanted: Vec<char> = needle.chars().collect();
    let first = start as usize - 1;
    if first >= chars.len() {
        return Ok(0.0);
    }
    Ok(chars[first..]
        .windows(wanted.len())
        .position(|window| window == wanted.as_slice())
        .map_or(0.0, |offset| (first + offset + 1) as f64))
}

/// STR$: the printed form of a number without its surrounding blanks.
pub fn str_of(value: f64) -> String {
    format_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_numeric_functions() {
        assert_eq!(NumericFunction::Abs.apply(-3.5), Ok(3.5));
        assert_eq!(NumericFunction::Int.apply(-2.5), Ok(-3.0));
        assert_eq!(NumericFunction::Sgn.apply(-7.0), Ok(-1.0));
        assert_eq!(NumericFunction::Sqr.apply(16.0), Ok(4.0));
    }

    #[test]
    fn test_bad_arguments() {
        assert_eq!(NumericFunction::Log.apply(0.0), Err(BasicError::BadArgument));
        assert_eq!(NumericFunction::Sqr.apply(-1.0), Err(BasicError::BadArgument));
        assert_eq!(StringMeasure::Asc.apply(""), Err(BasicError::BadArgument));
        assert_eq!(StringMeasure::Val.apply("12X"), Err(BasicError::BadArgument));
    }

    #[test]
    fn test_string_measures() {
        assert_eq!(StringMeasure::Asc.apply("A"), Ok(65.0));
        assert_eq!(StringMeasure::Len.apply("HELLO"), Ok(5.0));
        assert_eq!(StringMeasure::Val.apply(" -1.5E2 "), Ok(-150.0));
        assert_eq!(StringMeasure::Val.apply("1.E+2"), Ok(100.0));
    }

    #[test]
    fn test_chr() {
        assert_eq!(chr(65.0), Ok("A".to_string()));
        assert_eq!(chr(-1.0), Err(BasicError::BadValue));
        assert_eq!(chr(40000.0), Err(BasicError::BadValue));
    }

    #[test]
    fn test_seg() {
        assert_eq!(seg("HELLO", 2.0, 3.0), Ok("ELL".to_string()));
        assert_eq!(seg("HELLO", 4.0, 10.0), Ok("LO".to_string()));
        assert_eq!(seg("HELLO", 9.0, 1.0), Ok(String::new()));
        assert_eq!(seg("HELLO", 0.0, 1.0), Err(BasicError::BadValue));
        assert_eq!(seg("HELLO", 1.0, -1.0), Err(BasicError::BadValue));
    }

    #[test]
    fn test_pos() {
        assert_eq!(pos("HELLO", "L", 1.0), Ok(3.0));
        assert_eq!(pos("HELLO", "L", 4.0), Ok(4.0));
        assert_eq!(pos("HELLO", "Z", 1.0), Ok(0.0));
        assert_eq!(pos("HELLO", "L", 9.0), Ok(0.0));
        assert_eq!(pos("HELLO", "L", 0.0), Err(BasicError::BadValue));
    }

    #[test]
    fn test_str() {
        assert_eq!(str_of(12.0), "12");
        assert_eq!(str_of(-0.5), "-.5");
    }
}
