//! Built-in subprograms reached through CALL. Each one checks its arguments
//! here and hands the effect to the screen or keyboard.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::basic_expressions::{Expression, NumericExpr, Value};
use crate::basic_io::OutputSink;
use crate::basic_types::BasicError;

const SCREEN_ROWS: i64 = 24;
const SCREEN_COLUMNS: i64 = 32;
const SPACE_CODE: u32 = 32;

/// What a subprogram may touch on the machine.
pub trait SubprogramHost {
    fn output(&mut self) -> &mut dyn OutputSink;
    fn key_code(&mut self) -> Option<i32>;
    fn joystick(&mut self, unit: u8) -> (i32, i32);
    /// Stores into the variable or element that `target` names.
    fn assign(&mut self, target: &Expression, value: Value) -> Result<(), BasicError>;
}

/// Arguments as written and as evaluated.
pub struct CallArgs<'a> {
    pub exprs: &'a [Expression],
    pub values: &'a [Value],
}

impl<'a> CallArgs<'a> {
    fn count_between(&self, min: usize, max: usize) -> Result<(), BasicError> {
        if self.values.len() < min || self.values.len() > max {
            return Err(BasicError::IncorrectStatement);
        }
        Ok(())
    }

    fn number(&self, index: usize) -> Result<i64, BasicError> {
        match self.values.get(index) {
            Some(Value::Number(n)) => Ok(n.round() as i64),
            Some(Value::Text(_)) => Err(BasicError::StringNumberMismatch),
            None => Err(BasicError::IncorrectStatement),
        }
    }

    fn number_in(&self, index: usize, low: i64, high: i64) -> Result<i64, BasicError> {
        let value = self.number(index)?;
        if value < low || value > high {
            return Err(BasicError::BadValue);
        }
        Ok(value)
    }

    fn text(&self, index: usize) -> Result<&str, BasicError> {
        match self.values.get(index) {
            Some(Value::Text(s)) => Ok(s),
            Some(Value::Number(_)) => Err(BasicError::StringNumberMismatch),
            None => Err(BasicError::IncorrectStatement),
        }
    }

    /// An argument that receives a result must be a numeric variable or element.
    fn target(&self, index: usize) -> Result<&'a Expression, BasicError> {
        match self.exprs.get(index) {
            Some(e) if is_numeric_reference(e) => Ok(e),
            _ => Err(BasicError::IncorrectStatement),
        }
    }
}

fn is_numeric_reference(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Numeric(NumericExpr::Variable(_)) | Expression::Numeric(NumericExpr::Element { .. })
    )
}

pub trait Subprogram: Send + Sync {
    fn call(&self, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError>;
}

struct Clear;

impl Subprogram for Clear {
    fn call(&self, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError> {
        args.count_between(0, 0)?;
        host.output().clear();
        Ok(())
    }
}

struct Screen;

impl Subprogram for Screen {
    fn call(&self, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError> {
        args.count_between(1, 1)?;
        let color = args.number_in(0, 1, 16)?;
        host.output().set_screen_color(color as u8);
        Ok(())
    }
}

struct Color;

impl Subprogram for Color {
    fn call(&self, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError> {
        args.count_between(3, 3)?;
        let set = args.number_in(0, 1, 16)?;
        let foreground = args.number_in(1, 1, 16)?;
        let background = args.number_in(2, 1, 16)?;
        host.output()
            .set_character_color(set as u8, foreground as u8, background as u8);
        Ok(())
    }
}

struct Char;

impl Subprogram for Char {
    fn call(&self, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError> {
        args.count_between(2, 2)?;
        let code = args.number_in(0, 32, 159)?;
        let pattern = args.text(1)?;
        if pattern.len() > 16 || !pattern.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BasicError::BadArgument);
        }
        host.output().define_character(code as u32, pattern);
        Ok(())
    }
}

/// HCHAR and VCHAR: one character repeated along a row or a column.
struct Repeat {
    vertical: bool,
}

impl Subprogram for Repeat {
    fn call(&self, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError> {
        args.count_between(3, 4)?;
        let row = args.number_in(0, 1, SCREEN_ROWS)? - 1;
        let column = args.number_in(1, 1, SCREEN_COLUMNS)? - 1;
        let code = args.number_in(2, 0, 32767)? as u32;
        let repeat = if args.values.len() == 4 { args.number_in(3, 0, 32767)? } else { 1 };

        let cells = SCREEN_ROWS * SCREEN_COLUMNS;
        let start = if self.vertical { column * SCREEN_ROWS + row } else { row * SCREEN_COLUMNS + column };
        for step in 0..repeat {
            let position = (start + step) % cells;
            let (r, c) = if self.vertical {
                (position % SCREEN_ROWS, position / SCREEN_ROWS)
            } else {
                (position / SCREEN_COLUMNS, position % SCREEN_COLUMNS)
            };
            host.output().place_character(r as usize, c as usize, code);
        }
        Ok(())
    }
}

struct Gchar;

impl Subprogram for Gchar {
    fn call(&self, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError> {
        args.count_between(3, 3)?;
        let row = args.number_in(0, 1, SCREEN_ROWS)? - 1;
        let column = args.number_in(1, 1, SCREEN_COLUMNS)? - 1;
        let target = args.target(2)?;
        let code = host
            .output()
            .character_at(row as usize, column as usize)
            .unwrap_or(SPACE_CODE);
        host.assign(target, Value::Number(code as f64))
    }
}

struct Key;

impl Subprogram for Key {
    fn call(&self, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError> {
        args.count_between(3, 3)?;
        args.number_in(0, 0, 5)?;
        let key_target = args.target(1)?;
        let status_target = args.target(2)?;
        let (code, status) = match host.key_code() {
            Some(code) => (code, 1),
            None => (-1, 0),
        };
        host.assign(key_target, Value::Number(code as f64))?;
        host.assign(status_target, Value::Number(status as f64))
    }
}

struct Joyst;

impl Subprogram for Joyst {
    fn call(&self, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError> {
        args.count_between(3, 3)?;
        let unit = args.number_in(0, 1, 2)?;
        let x_target = args.target(1)?;
        let y_target = args.target(2)?;
        let (x, y) = host.joystick(unit as u8);
        host.assign(x_target, Value::Number(x as f64))?;
        host.assign(y_target, Value::Number(y as f64))
    }
}

struct Sound;

impl Subprogram for Sound {
    fn call(&self, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError> {
        args.count_between(3, 9)?;
        if args.values.len() % 2 == 0 {
            return Err(BasicError::IncorrectStatement);
        }
        let duration = args.number_in(0, -4250, 4250)?;
        if duration == 0 {
            return Err(BasicError::BadValue);
        }
        let mut tones = Vec::new();
        for pair in (1..args.values.len()).step_by(2) {
            let frequency = args.number(pair)?;
            let is_noise = (-8..=-1).contains(&frequency);
            if !is_noise && !(110..=44733).contains(&frequency) {
                return Err(BasicError::BadValue);
            }
            let volume = args.number_in(pair + 1, 0, 30)?;
            tones.push((frequency as f64, volume as u8));
        }
        host.output().play_sound(duration as i32, &tones);
        Ok(())
    }
}

lazy_static! {
    static ref SUBPROGRAMS: HashMap<&'static str, Box<dyn Subprogram>> = {
        let mut m: HashMap<&'static str, Box<dyn Subprogram>> = HashMap::new();
        m.insert("CLEAR", Box::new(Clear));
        m.insert("SCREEN", Box::new(Screen));
        m.insert("COLOR", Box::new(Color));
        m.insert("CHAR", Box::new(Char));
        m.insert("HCHAR", Box::new(Repeat { vertical: false }));
        m.insert("VCHAR", Box::new(Repeat { vertical: true }));
        m.insert("GCHAR", Box::new(Gchar));
        m.insert("KEY", Box::new(Key));
        m.insert("JOYST", Box::new(Joyst));
        m.insert("SOUND", Box::new(Sound));
        m
    };
}

pub fn is_subprogram(name: &str) -> bool {
    SUBPROGRAMS.contains_key(name)
}

/// Runs the named subprogram. Unknown names are BAD NAME.
pub fn call_subprogram(name: &str, args: &CallArgs, host: &mut dyn SubprogramHost) -> Result<(), BasicError> {
    let subprogram = SUBPROGRAMS.get(name).ok_or(BasicError::BadName)?;
    tracing::trace!(name, arguments = args.values.len(), "calling subprogram");
    subprogram.call(args, host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_expressions::NumericExpr;
    use crate::basic_io::TextScreen;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Host {
        screen: TextScreen,
        key: Option<i32>,
        assigned: HashMap<String, f64>,
    }

    impl SubprogramHost for Host {
        fn output(&mut self) -> &mut dyn OutputSink {
            &mut self.screen
        }

        fn key_code(&mut self) -> Option<i32> {
            self.key.take()
        }

        fn joystick(&mut self, _unit: u8) -> (i32, i32) {
            (4, -4)
        }

        fn assign(&mut self, target: &Expression, value: Value) -> Result<(), BasicError> {
            match (target, value) {
                (Expression::Numeric(NumericExpr::Variable(name)), Value::Number(n)) => {
                    self.assigned.insert(name.clone(), n);
                    Ok(())
                }
                _ => Err(BasicError::StringNumberMismatch),
            }
        }
    }

    fn var(name: &str) -> Expression {
        Expression::Numeric(NumericExpr::Variable(name.to_string()))
    }

    fn num(n: f64) -> Expression {
        Expression::Numeric(NumericExpr::Constant(n))
    }

    fn run(name: &str, exprs: &[Expression], values: &[Value], host: &mut Host) -> Result<(), BasicError> {
        call_subprogram(name, &CallArgs { exprs, values }, host)
    }

    #[test]
    fn test_unknown_subprogram() {
        let mut host = Host::default();
        assert_eq!(run("FOO", &[], &[], &mut host), Err(BasicError::BadName));
        assert!(is_subprogram("HCHAR"));
    }

    #[test]
    fn test_clear_empties_screen() {
        let mut host = Host::default();
        host.screen.append("HELLO");
        run("CLEAR", &[], &[], &mut host).unwrap();
        assert_eq!(host.screen.transcript(), "");
    }

    #[test]
    fn test_key_and_joystick() {
        let mut host = Host { key: Some(65), ..Default::default() };
        let exprs = [num(0.0), var("K"), var("S")];
        let values = [Value::Number(0.0), Value::Number(0.0), Value::Number(0.0)];
        run("KEY", &exprs, &values, &mut host).unwrap();
        assert_eq!(host.assigned["K"], 65.0);
        assert_eq!(host.assigned["S"], 1.0);

        let exprs = [num(1.0), var("X"), var("Y")];
        let values = [Value::Number(1.0), Value::Number(0.0), Value::Number(0.0)];
        run("JOYST", &exprs, &values, &mut host).unwrap();
        assert_eq!(host.assigned["X"], 4.0);
        assert_eq!(host.assigned["Y"], -4.0);
    }

    #[test]
    fn test_gchar_reads_blank_screen() {
        let mut host = Host::default();
        let exprs = [num(1.0), num(1.0), var("C")];
        let values = [Value::Number(1.0), Value::Number(1.0), Value::Number(0.0)];
        run("GCHAR", &exprs, &values, &mut host).unwrap();
        assert_eq!(host.assigned["C"], 32.0);
    }

    #[test]
    fn test_argument_checks() {
        let mut host = Host::default();
        let values = [Value::Number(17.0)];
        assert_eq!(run("SCREEN", &[num(17.0)], &values, &mut host), Err(BasicError::BadValue));

        let values = [Value::Number(65.0), Value::Text("XYZ".to_string())];
        assert_eq!(run("CHAR", &[num(65.0), num(0.0)], &values, &mut host), Err(BasicError::BadArgument));

        let values = [Value::Number(0.0), Value::Number(440.0), Value::Number(2.0)];
        assert_eq!(run("SOUND", &[num(0.0), num(440.0), num(2.0)], &values, &mut host), Err(BasicError::BadValue));

        let values = [Value::Number(100.0), Value::Number(440.0), Value::Number(2.0)];
        assert_eq!(run("SOUND", &[num(100.0), num(440.0), num(2.0)], &values, &mut host), Ok(()));
    }
}
