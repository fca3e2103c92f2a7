//! Number and string rendering as the console prints them.
//!
//! `format_number` produces the PRINT form (sign or blank in front, one blank
//! behind), `format_str` the STR$ form and `format_constant` the form used when
//! listing a program, which keeps every exponent digit so the text parses back
//! to the same value.

use crate::basic_dialect::{
    DISPLAY_DIGITS, MAX_MAGNITUDE, MAX_STRING_LENGTH, MIN_MAGNITUDE, SCIENTIFIC_DIGITS,
};

/// Largest magnitude printed as a plain integer.
const INTEGER_DISPLAY_LIMIT: f64 = 1e10;

/// Decimal exponents that are still printed in fixed notation.
const FIXED_EXPONENTS: std::ops::RangeInclusive<i32> = -4..=9;

pub fn format_number(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { " " };
    let magnitude = value.abs();
    if magnitude.is_nan() || magnitude < MIN_MAGNITUDE {
        return " 0 ".to_string();
    }
    if magnitude >= MAX_MAGNITUDE {
        return format!("{}9.99999E+** ", sign);
    }
    format!("{}{} ", sign, format_magnitude(magnitude, false))
}

pub fn format_str(value: f64) -> String {
    format_number(value).trim().to_string()
}

/// Listing form of a numeric constant.
pub fn format_constant(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude.is_nan() || magnitude == 0.0 {
        return "0".to_string();
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}", sign, format_magnitude(magnitude, true))
}

/// Cuts a string to what PRINT shows. The stored value is left alone.
pub fn display_string(text: &str) -> &str {
    match text.char_indices().nth(MAX_STRING_LENGTH) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

fn format_magnitude(magnitude: f64, full_exponent: bool) -> String {
    if magnitude.fract() == 0.0 && magnitude < INTEGER_DISPLAY_LIMIT {
        return format!("{}", magnitude as u64);
    }

    let (rounded, exponent) = round_significant(magnitude, DISPLAY_DIGITS);
    if FIXED_EXPONENTS.contains(&exponent) {
        let decimals = (DISPLAY_DIGITS as i32 - 1 - exponent).max(0) as usize;
        let fixed = format!("{:.*}", decimals, rounded);
        let fixed = if fixed.contains('.') {
            fixed.trim_end_matches('0').trim_end_matches('.')
        } else {
            fixed.as_str()
        };
        return match fixed.strip_prefix("0.") {
            Some(fraction) => format!(".{}", fraction),
            None => fixed.to_string(),
        };
    }

    let (mantissa, exponent) = round_significant_text(magnitude, SCIENTIFIC_DIGITS);
    let mantissa = mantissa.trim_end_matches('0');
    let mantissa = if mantissa.contains('.') {
        mantissa.to_string()
    } else {
        format!("{}.", mantissa)
    };
    let exponent_sign = if exponent < 0 { '-' } else { '+' };
    let digits = exponent.unsigned_abs();
    if digits >= 100 && !full_exponent {
        format!("{}E{}**", mantissa, exponent_sign)
    } else {
        format!("{}E{}{:02}", mantissa, exponent_sign, digits)
    }
}

/// Rounds to `digits` significant digits, returning the value and its
/// decimal exponent after rounding.
fn round_significant(magnitude: f64, digits: usize) -> (f64, i32) {
    let (mantissa, exponent) = round_significant_text(magnitude, digits);
    let value = format!("{}e{}", mantissa, exponent)
        .parse::<f64>()
        .unwrap_or(magnitude);
    (value, exponent)
}

fn round_significant_text(magnitude: f64, digits: usize) -> (String, i32) {
    let text = format!("{:.*e}", digits.saturating_sub(1), magnitude);
    match text.split_once('e') {
        Some((mantissa, exponent)) => (mantissa.to_string(), exponent.parse().unwrap_or(0)),
        None => (text, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_functions::StringMeasure;
    use crate::basic_types::BasicError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integers() {
        assert_eq!(format_number(5.0), " 5 ");
        assert_eq!(format_number(-5.0), "-5 ");
        assert_eq!(format_number(0.0), " 0 ");
        assert_eq!(format_number(9999999999.0), " 9999999999 ");
    }

    #[test]
    fn test_fixed_notation() {
        assert_eq!(format_number(0.5), " .5 ");
        assert_eq!(format_number(-0.25), "-.25 ");
        assert_eq!(format_number(3.14159265358979), " 3.141592654 ");
        assert_eq!(format_number(1.0 / 3.0), " .3333333333 ");
        assert_eq!(format_number(0.0001), " .0001 ");
        assert_eq!(format_number(123.5), " 123.5 ");
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(format_number(1e10 + 0.5), " 1.E+10 ");
        assert_eq!(format_number(12345678901.0), " 1.23457E+10 ");
        assert_eq!(format_number(0.00001), " 1.E-05 ");
        assert_eq!(format_number(-1.5e-20), "-1.5E-20 ");
        assert_eq!(format_number(1e100), " 1.E+** ");
    }

    #[test]
    fn test_range_clamps() {
        assert_eq!(format_number(1e-130), " 0 ");
        assert_eq!(format_number(1e130), " 9.99999E+** ");
        assert_eq!(format_number(-1e130), "-9.99999E+** ");
    }

    #[test]
    fn test_format_reparse_is_stable() {
        let values = [
            7.0,
            -12345.0,
            9999999999.0,
            0.5,
            -0.25,
            1.0 / 3.0,
            3.14159265358979,
            123.5,
            0.0001,
            12345678901.0,
            0.00001,
            -1.5e-20,
            2.5e-99,
            9.87654e99,
            1e-130,
        ];
        for value in values {
            let printed = format_number(value);
            let reparsed = StringMeasure::Val.apply(&printed).unwrap();
            assert_eq!(format_number(reparsed), printed, "value {}", value);
        }
    }

    #[test]
    fn test_overflowed_exponent_does_not_reparse() {
        for value in [1e100, 1e130, -1e130] {
            assert_eq!(StringMeasure::Val.apply(&format_number(value)), Err(BasicError::BadArgument));
        }
    }

    #[test]
    fn test_str_and_constants() {
        assert_eq!(format_str(-3.0), "-3");
        assert_eq!(format_str(0.5), ".5");
        assert_eq!(format_constant(1e100), "1.E+100");
        assert_eq!(format_constant(-0.75), "-.75");
        assert_eq!(format_constant(42.0), "42");
    }

    #[test]
    fn test_display_string() {
        let long = "X".repeat(300);
        assert_eq!(display_string(&long).len(), 255);
        assert_eq!(display_string("HELLO"), "HELLO");
    }
}
