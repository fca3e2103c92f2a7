//! The stored program: statements keyed by line number.

use std::collections::BTreeMap;

use crate::basic_data::DataConstant;
use crate::basic_dialect::{MAX_LINE_NUMBER, MAX_NAME_LENGTH, MIN_LINE_NUMBER};
use crate::basic_types::{BasicError, LineNumber, ListRange, Statement};

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramLine {
    pub number: LineNumber,
    pub statement: Statement,
}

impl std::fmt::Display for ProgramLine {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.number, self.statement)
    }
}

/// Checks that `number` is a usable line number.
pub fn check_line_number(number: u32) -> Result<LineNumber, BasicError> {
    if (MIN_LINE_NUMBER..=MAX_LINE_NUMBER).contains(&number) {
        Ok(number as LineNumber)
    } else {
        Err(BasicError::BadLineNumber)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    lines: BTreeMap<LineNumber, Statement>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Inserts or replaces a line.
    pub fn store(&mut self, number: u32, statement: Statement) -> Result<LineNumber, BasicError> {
        let number = check_line_number(number)?;
        if statement
            .variable_names()
            .iter()
            .any(|name| name.trim_end_matches('$').chars().count() > MAX_NAME_LENGTH)
        {
            return Err(BasicError::BadName);
        }
        tracing::debug!(line = number, "storing program line");
        self.lines.insert(number, statement);
        Ok(number)
    }

    /// Removes a line. Returns whether it was there.
    pub fn remove(&mut self, number: u32) -> Result<bool, BasicError> {
        let number = check_line_number(number)?;
        Ok(self.lines.remove(&number).is_some())
    }

    pub fn contains(&self, number: LineNumber) -> bool {
        self.lines.contains_key(&number)
    }

    pub fn statements(&self, number: LineNumber) -> Result<&Statement, BasicError> {
        self.lines.get(&number).ok_or(BasicError::BadLineNumber)
    }

    pub fn first_line_number(&self) -> Option<LineNumber> {
        self.lines.keys().next().copied()
    }

    pub fn next_line_number(&self, after: LineNumber) -> Option<LineNumber> {
        self.lines
            .range(after.saturating_add(1)..)
            .next()
            .map(|(number, _)| *number)
            .filter(|number| *number > after)
    }

    pub fn last_line_number(&self) -> Option<LineNumber> {
        self.lines.keys().next_back().copied()
    }

    pub fn lines(&self) -> impl Iterator<Item = ProgramLine> + '_ {
        self.lines
            .iter()
            .map(|(number, statement)| ProgramLine { number: *number, statement: statement.clone() })
    }

    /// Listing text of every line in `range`.
    pub fn list(&self, range: ListRange) -> Vec<String> {
        self.lines()
            .filter(|line| range.contains(line.number))
            .map(|line| line.to_string())
            .collect()
    }

    /// Renumbers from `initial` in steps of `increment` and rewrites every
    /// line-number operand to match. References to missing lines become
    /// 32767. Nothing changes unless every new number is valid. Returns the
    /// old-to-new mapping.
    pub fn resequence(&mut self, initial: u32, increment: u32) -> Result<BTreeMap<LineNumber, LineNumber>, BasicError> {
        if increment < 1 {
            return Err(BasicError::BadLineNumber);
        }
        let mut mapping = BTreeMap::new();
        for (i, old) in self.lines.keys().enumerate() {
            let new = (i as u64) * (increment as u64) + initial as u64;
            let new = u32::try_from(new).map_err(|_| BasicError::BadLineNumber)?;
            mapping.insert(*old, check_line_number(new)?);
        }

        let missing = MAX_LINE_NUMBER as LineNumber;
        let old_lines = std::mem::take(&mut self.lines);
        for (old, mut statement) in old_lines {
            statement.remap_lines(|target| mapping.get(&target).copied().unwrap_or(missing));
            self.lines.insert(mapping[&old], statement);
        }
        tracing::debug!(initial, increment, lines = mapping.len(), "resequenced program");
        Ok(mapping)
    }

    fn data_line(&self, from: LineNumber) -> Option<(LineNumber, &[DataConstant])> {
        self.lines.range(from..).find_map(|(number, statement)| match statement {
            Statement::Data { values } => Some((*number, values.as_slice())),
            _ => None,
        })
    }
}

/// Position of the next constant READ will take.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataCursor {
    line: Option<LineNumber>,
    index: usize,
    /// Set once the search for a DATA line found nothing.
    exhausted: bool,
}

impl DataCursor {
    /// Back to the first constant of the first DATA line at or after `from`.
    pub fn restore(&mut self, from: Option<LineNumber>) {
        *self = DataCursor { line: from, index: 0, exhausted: false };
    }

    pub fn read(&mut self, program: &Program) -> Result<DataConstant, BasicError> {
        if self.exhausted {
            return Err(BasicError::DataError);
        }
        let mut from = self.line.unwrap_or(MIN_LINE_NUMBER as LineNumber);
        loop {
            let Some((number, values)) = program.data_line(from) else {
                self.exhausted = true;
                return Err(BasicError::DataError);
            };
            if self.line != Some(number) {
                self.line = Some(number);
                self.index = 0;
            }
            if let Some(value) = values.get(self.index) {
                self.index += 1;
                return Ok(value.clone());
            }
            match number.checked_add(1) {
                Some(next) => from = next,
                None => {
                    self.exhausted = true;
                    return Err(BasicError::DataError);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_expressions::{Expression, LValue, NumericExpr, StringExpr};
    use crate::basic_parser::parse_line;
    use crate::basic_types::ParsedLine;
    use pretty_assertions::assert_eq;

    fn program(lines: &[&str]) -> Program {
        let mut program = Program::new();
        for line in lines {
            match parse_line(line).unwrap() {
                ParsedLine::Store { number, statement } => {
                    program.store(number, statement).unwrap();
                }
                other => panic!("not a program line: {:?}", other),
            }
        }
        program
    }

    #[test]
    fn test_store_validates() {
        let mut program = Program::new();
        assert_eq!(program.store(0, Statement::End), Err(BasicError::BadLineNumber));
        assert_eq!(program.store(32768, Statement::End), Err(BasicError::BadLineNumber));
        let long = Statement::new_let(
            LValue::scalar("ABCDEFGHIJKLMNOP"),
            Expression::Numeric(NumericExpr::Constant(1.0)),
        );
        assert_eq!(program.store(10, long), Err(BasicError::BadName));
        assert!(program.is_empty());

        let string_name = Statement::new_let(
            LValue::scalar("ABCDEFGHIJKLMNO$"),
            Expression::String(StringExpr::Constant("X".to_string())),
        );
        assert_eq!(program.store(10, string_name), Ok(10));
    }

    #[test]
    fn test_iteration() {
        let program = program(&["30 END", "10 PRINT", "20 REM"]);
        assert_eq!(program.first_line_number(), Some(10));
        assert_eq!(program.next_line_number(10), Some(20));
        assert_eq!(program.next_line_number(15), Some(20));
        assert_eq!(program.next_line_number(30), None);
        assert_eq!(program.last_line_number(), Some(30));
        assert_eq!(program.statements(25), Err(BasicError::BadLineNumber));
    }

    #[test]
    fn test_resequence_round_trip() {
        let mut program = program(&["100 A=1", "110 IF A=1 THEN 130", "120 GOTO 100", "130 RESTORE 110"]);
        let before = program.list(ListRange::default());

        program.resequence(20, 5).unwrap();
        assert_eq!(program.list(ListRange::default()), vec![
            "20 A=1",
            "25 IF A=1 THEN 35",
            "30 GOTO 20",
            "35 RESTORE 25",
        ]);

        program.resequence(100, 10).unwrap();
        assert_eq!(program.list(ListRange::default()), before);
    }

    #[test]
    fn test_resequence_missing_target() {
        let mut program = program(&["10 GOTO 500"]);
        program.resequence(100, 10).unwrap();
        assert_eq!(program.list(ListRange::default()), vec!["100 GOTO 32767"]);
    }

    #[test]
    fn test_resequence_out_of_range_leaves_program() {
        let mut program = program(&["10 END", "20 END", "30 END"]);
        assert_eq!(program.resequence(32760, 5), Err(BasicError::BadLineNumber));
        assert_eq!(program.resequence(10, 0), Err(BasicError::BadLineNumber));
        assert_eq!(program.list(ListRange::default()), vec!["10 END", "20 END", "30 END"]);
    }

    #[test]
    fn test_list_range() {
        let program = program(&["10 END", "20 STOP", "30 RETURN"]);
        let range = ListRange { start: Some(15), end: Some(30) };
        assert_eq!(program.list(range), vec!["20 STOP", "30 RETURN"]);
    }

    #[test]
    fn test_data_cursor() {
        let program = program(&["10 DATA 1,2", "20 PRINT", "30 DATA X"]);
        let mut cursor = DataCursor::default();
        assert_eq!(cursor.read(&program).unwrap().to_number(), Ok(1.0));
        assert_eq!(cursor.read(&program).unwrap().to_number(), Ok(2.0));
        assert_eq!(cursor.read(&program).unwrap().to_text(), "X");
        assert_eq!(cursor.read(&program), Err(BasicError::DataError));

        cursor.restore(Some(15));
        assert_eq!(cursor.read(&program).unwrap().to_text(), "X");

        cursor.restore(Some(31));
        assert_eq!(cursor.read(&program), Err(BasicError::DataError));
    }
}
