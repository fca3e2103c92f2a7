use std::fmt;

use crate::basic_data::DataConstant;
use crate::basic_expressions::{Expression, LValue, NumericExpr, StringExpr};
use crate::basic_files::OpenOptions;

/// Program line numbers are 1..=32767, so they always fit in 16 bits.
pub type LineNumber = u16;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Statement keywords
    Let,
    Print,
    Input,
    If,
    Then,
    Else,
    For,
    To,
    Step,
    Next,
    Goto,
    Gosub,
    Go,
    Return,
    End,
    Stop,
    Rem(String),
    Data(String),
    Read,
    Restore,
    Randomize,
    Dim,
    Option,
    Base,
    On,
    Def,
    Call,
    Break,
    Unbreak,
    Trace,
    Untrace,
    Open,
    Close,
    Delete,
    Tab,

    // Command keywords
    New,
    Run,
    List,
    Bye,
    Num,
    Resequence,
    Continue,

    // File option keywords
    Display,
    Internal,
    Sequential,
    Relative,
    Fixed,
    Variable,
    Output,
    Update,
    Append,
    Permanent,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    Ampersand,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Punctuation
    LeftParen,
    RightParen,
    Comma,
    Semicolon,
    Colon,
    Hash,

    // Values
    Number(String),
    String(String),
    Identifier(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Let => write!(f, "LET"),
            Token::Print => write!(f, "PRINT"),
            Token::Input => write!(f, "INPUT"),
            Token::If => write!(f, "IF"),
            Token::Then => write!(f, "THEN"),
            Token::Else => write!(f, "ELSE"),
            Token::For => write!(f, "FOR"),
            Token::To => write!(f, "TO"),
            Token::Step => write!(f, "STEP"),
            Token::Next => write!(f, "NEXT"),
            Token::Goto => write!(f, "GOTO"),
            Token::Gosub => write!(f, "GOSUB"),
            Token::Go => write!(f, "GO"),
            Token::Return => write!(f, "RETURN"),
            Token::End => write!(f, "END"),
            Token::Stop => write!(f, "STOP"),
            Token::Rem(text) => write!(f, "REM {}", text),
            Token::Data(text) => write!(f, "DATA {}", text),
            Token::Read => write!(f, "READ"),
            Token::Restore => write!(f, "RESTORE"),
            Token::Randomize => write!(f, "RANDOMIZE"),
            Token::Dim => write!(f, "DIM"),
            Token::Option => write!(f, "OPTION"),
            Token::Base => write!(f, "BASE"),
            Token::On => write!(f, "ON"),
            Token::Def => write!(f, "DEF"),
            Token::Call => write!(f, "CALL"),
            Token::Break => write!(f, "BREAK"),
            Token::Unbreak => write!(f, "UNBREAK"),
            Token::Trace => write!(f, "TRACE"),
            Token::Untrace => write!(f, "UNTRACE"),
            Token::Open => write!(f, "OPEN"),
            Token::Close => write!(f, "CLOSE"),
            Token::Delete => write!(f, "DELETE"),
            Token::Tab => write!(f, "TAB"),
            Token::New => write!(f, "NEW"),
            Token::Run => write!(f, "RUN"),
            Token::List => write!(f, "LIST"),
            Token::Bye => write!(f, "BYE"),
            Token::Num => write!(f, "NUMBER"),
            Token::Resequence => write!(f, "RESEQUENCE"),
            Token::Continue => write!(f, "CONTINUE"),
            Token::Display => write!(f, "DISPLAY"),
            Token::Internal => write!(f, "INTERNAL"),
            Token::Sequential => write!(f, "SEQUENTIAL"),
            Token::Relative => write!(f, "RELATIVE"),
            Token::Fixed => write!(f, "FIXED"),
            Token::Variable => write!(f, "VARIABLE"),
            Token::Output => write!(f, "OUTPUT"),
            Token::Update => write!(f, "UPDATE"),
            Token::Append => write!(f, "APPEND"),
            Token::Permanent => write!(f, "PERMANENT"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Power => write!(f, "^"),
            Token::Ampersand => write!(f, "&"),
            Token::Equal => write!(f, "="),
            Token::NotEqual => write!(f, "<>"),
            Token::Less => write!(f, "<"),
            Token::LessEqual => write!(f, "<="),
            Token::Greater => write!(f, ">"),
            Token::GreaterEqual => write!(f, ">="),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Hash => write!(f, "#"),
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Token::Identifier(i) => write!(f, "{}", i),
        }
    }
}

/// Conditions that stop the current statement. Everything except
/// `Breakpoint` is reported as an error and ends a running program;
/// `Breakpoint` halts it so CONTINUE can pick it up again.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BasicError {
    #[error("BAD ARGUMENT")]
    BadArgument,
    #[error("BAD LINE NUMBER")]
    BadLineNumber,
    #[error("BAD NAME")]
    BadName,
    #[error("BAD SUBSCRIPT")]
    BadSubscript,
    #[error("BAD VALUE")]
    BadValue,
    #[error("CAN'T CONTINUE")]
    CantContinue,
    #[error("CAN'T DO THAT")]
    CantDoThat,
    #[error("DATA ERROR")]
    DataError,
    #[error("FILE ERROR")]
    FileError,
    #[error("FOR-NEXT ERROR")]
    ForNextError,
    #[error("INCORRECT STATEMENT")]
    IncorrectStatement,
    #[error("I/O ERROR {0:02}")]
    IoError(u8),
    #[error("MEMORY FULL")]
    MemoryFull,
    #[error("NAME CONFLICT")]
    NameConflict,
    #[error("STRING-NUMBER MISMATCH")]
    StringNumberMismatch,
    #[error("BREAKPOINT")]
    Breakpoint,
}

impl BasicError {
    pub fn is_breakpoint(&self) -> bool {
        matches!(self, BasicError::Breakpoint)
    }
}

/// Non-fatal conditions: reported, then execution carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BasicWarning {
    #[error("NUMBER TOO BIG")]
    NumberTooBig,
    #[error("INPUT ERROR")]
    InputError,
    #[error("STRING TRUNCATED")]
    StringTruncated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Normal,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Nothing has been run since the machine was created or cleared.
    Idle,
    Running,
    HaltedAtBreakpoint(LineNumber),
    Terminated(Termination),
}

/// Line range of a LIST command. `LIST 100` has both ends set to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListRange {
    pub start: Option<LineNumber>,
    pub end: Option<LineNumber>,
}

impl ListRange {
    pub fn contains(&self, line: LineNumber) -> bool {
        self.start.map_or(true, |s| line >= s) && self.end.map_or(true, |e| line <= e)
    }
}

/// Directives that only make sense typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    New,
    Run(Option<LineNumber>),
    List(ListRange),
    Bye,
    Number { initial: Option<u32>, increment: Option<u32> },
    Resequence { initial: Option<u32>, increment: Option<u32> },
    Continue,
    Break(Vec<LineNumber>),
    Unbreak(Vec<LineNumber>),
    Trace,
    Untrace,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::New => write!(f, "NEW"),
            Command::Run(None) => write!(f, "RUN"),
            Command::Run(Some(line)) => write!(f, "RUN {}", line),
            Command::List(range) => {
                write!(f, "LIST")?;
                match (range.start, range.end) {
                    (None, None) => Ok(()),
                    (Some(s), Some(e)) if s == e => write!(f, " {}", s),
                    (Some(s), None) => write!(f, " {}-", s),
                    (None, Some(e)) => write!(f, " -{}", e),
                    (Some(s), Some(e)) => write!(f, " {}-{}", s, e),
                }
            }
            Command::Bye => write!(f, "BYE"),
            Command::Number { initial, increment } => {
                write!(f, "NUMBER")?;
                write_pair(f, *initial, *increment)
            }
            Command::Resequence { initial, increment } => {
                write!(f, "RESEQUENCE")?;
                write_pair(f, *initial, *increment)
            }
            Command::Continue => write!(f, "CONTINUE"),
            Command::Break(lines) => write!(f, "BREAK {}", join_lines(lines)),
            Command::Unbreak(lines) if lines.is_empty() => write!(f, "UNBREAK"),
            Command::Unbreak(lines) => write!(f, "UNBREAK {}", join_lines(lines)),
            Command::Trace => write!(f, "TRACE"),
            Command::Untrace => write!(f, "UNTRACE"),
        }
    }
}

fn write_pair(f: &mut fmt::Formatter, first: Option<u32>, second: Option<u32>) -> fmt::Result {
    match (first, second) {
        (None, None) => Ok(()),
        (Some(a), None) => write!(f, " {}", a),
        (None, Some(b)) => write!(f, " ,{}", b),
        (Some(a), Some(b)) => write!(f, " {},{}", a, b),
    }
}

fn join_lines(lines: &[LineNumber]) -> String {
    lines.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(",")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintSeparator {
    /// `,` moves to the next print zone
    Comma,
    /// `;` leaves the cursor where it is
    Semicolon,
    /// `:` starts a new row
    Colon,
}

impl fmt::Display for PrintSeparator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrintSeparator::Comma => write!(f, ","),
            PrintSeparator::Semicolon => write!(f, ";"),
            PrintSeparator::Colon => write!(f, ":"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrintItem {
    Expression(Expression),
    Tab(NumericExpr),
    Separator(PrintSeparator),
}

impl fmt::Display for PrintItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrintItem::Expression(e) => write!(f, "{}", e),
            PrintItem::Tab(e) => write!(f, "TAB({})", e),
            PrintItem::Separator(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDecl {
    pub name: String,
    pub bounds: Vec<usize>,
}

impl fmt::Display for ArrayDecl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, dim) in self.bounds.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, ")")
    }
}

// Statement types
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let { target: LValue, value: Expression },
    Print { channel: Option<NumericExpr>, items: Vec<PrintItem> },
    Input { channel: Option<NumericExpr>, prompt: Option<StringExpr>, targets: Vec<LValue> },
    If { condition: NumericExpr, then_line: LineNumber, else_line: Option<LineNumber> },
    For { var: String, start: NumericExpr, limit: NumericExpr, step: Option<NumericExpr> },
    Next { var: String },
    Goto { line: LineNumber },
    Gosub { line: LineNumber },
    OnGoto { selector: NumericExpr, lines: Vec<LineNumber> },
    OnGosub { selector: NumericExpr, lines: Vec<LineNumber> },
    Return,
    End,
    Stop,
    Rem { comment: String },
    Data { values: Vec<DataConstant> },
    Read { targets: Vec<LValue> },
    Restore { line: Option<LineNumber> },
    Randomize { seed: Option<NumericExpr> },
    Dim { arrays: Vec<ArrayDecl> },
    OptionBase { base: usize },
    Def { name: String, param: Option<String>, body: Expression },
    Call { name: String, args: Vec<Expression> },
    Break { lines: Vec<LineNumber> },
    Unbreak { lines: Vec<LineNumber> },
    Trace,
    Untrace,
    Open { channel: NumericExpr, file: StringExpr, options: OpenOptions },
    Close { channel: NumericExpr, delete: bool },
    Delete { file: StringExpr },
}

impl Statement {
    pub fn new_let(target: LValue, value: Expression) -> Self {
        Statement::Let { target, value }
    }

    pub fn new_print(items: Vec<PrintItem>) -> Self {
        Statement::Print { channel: None, items }
    }

    pub fn new_for(var: &str, start: NumericExpr, limit: NumericExpr, step: Option<NumericExpr>) -> Self {
        Statement::For { var: var.to_string(), start, limit, step }
    }

    pub fn new_next(var: &str) -> Self {
        Statement::Next { var: var.to_string() }
    }

    pub fn new_goto(line: LineNumber) -> Self {
        Statement::Goto { line }
    }

    pub fn new_gosub(line: LineNumber) -> Self {
        Statement::Gosub { line }
    }

    /// Statements that need a program around them are refused when typed
    /// without a line number.
    pub fn allowed_immediately(&self) -> bool {
        match self {
            Statement::Goto { .. }
            | Statement::Gosub { .. }
            | Statement::OnGoto { .. }
            | Statement::OnGosub { .. }
            | Statement::Return
            | Statement::If { .. }
            | Statement::For { .. }
            | Statement::Next { .. }
            | Statement::Data { .. }
            | Statement::Def { .. } => false,
            Statement::Input { channel, .. } => channel.is_some(),
            Statement::Break { lines } => !lines.is_empty(),
            _ => true,
        }
    }

    /// Every variable, array and function name the statement mentions.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        match self {
            Statement::Let { target, value } => {
                target.collect_names(&mut names);
                value.collect_names(&mut names);
            }
            Statement::Print { channel, items } => {
                if let Some(channel) = channel {
                    channel.collect_names(&mut names);
                }
                for item in items {
                    match item {
                        PrintItem::Expression(e) => e.collect_names(&mut names),
                        PrintItem::Tab(e) => e.collect_names(&mut names),
                        PrintItem::Separator(_) => {}
                    }
                }
            }
            Statement::Input { channel, prompt, targets } => {
                if let Some(channel) = channel {
                    channel.collect_names(&mut names);
                }
                if let Some(prompt) = prompt {
                    prompt.collect_names(&mut names);
                }
                for target in targets {
                    target.collect_names(&mut names);
                }
            }
            Statement::Read { targets } => {
                for target in targets {
                    target.collect_names(&mut names);
                }
            }
            Statement::If { condition, .. } => condition.collect_names(&mut names),
            Statement::For { var, start, limit, step } => {
                names.push(var.clone());
                start.collect_names(&mut names);
                limit.collect_names(&mut names);
                if let Some(step) = step {
                    step.collect_names(&mut names);
                }
            }
            Statement::Next { var } => names.push(var.clone()),
            Statement::OnGoto { selector, .. } | Statement::OnGosub { selector, .. } => {
                selector.collect_names(&mut names)
            }
            Statement::Randomize { seed: Some(seed) } => seed.collect_names(&mut names),
            Statement::Dim { arrays } => names.extend(arrays.iter().map(|a| a.name.clone())),
            Statement::Def { name, param, body } => {
                names.push(name.clone());
                if let Some(param) = param {
                    names.push(param.clone());
                }
                body.collect_names(&mut names);
            }
            Statement::Call { args, .. } => {
                for arg in args {
                    arg.collect_names(&mut names);
                }
            }
            Statement::Open { channel, file, .. } => {
                channel.collect_names(&mut names);
                file.collect_names(&mut names);
            }
            Statement::Close { channel, .. } => channel.collect_names(&mut names),
            Statement::Delete { file } => file.collect_names(&mut names),
            _ => {}
        }
        names
    }

    /// Rewrites every line-number operand through `map`. Used by RESEQUENCE.
    pub fn remap_lines<F: Fn(LineNumber) -> LineNumber>(&mut self, map: F) {
        match self {
            Statement::Goto { line } | Statement::Gosub { line } => *line = map(*line),
            Statement::OnGoto { lines, .. } | Statement::OnGosub { lines, .. } => {
                for line in lines.iter_mut() {
                    *line = map(*line);
                }
            }
            Statement::If { then_line, else_line, .. } => {
                *then_line = map(*then_line);
                if let Some(line) = else_line {
                    *line = map(*line);
                }
            }
            Statement::Restore { line: Some(line) } => *line = map(*line),
            Statement::Break { lines } | Statement::Unbreak { lines } => {
                for line in lines.iter_mut() {
                    *line = map(*line);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Statement::*;

        match self {
            Let { target, value } => write!(f, "{}={}", target, value),
            Print { channel, items } => {
                write!(f, "PRINT")?;
                if let Some(channel) = channel {
                    write!(f, " #{}", channel)?;
                    if !items.is_empty() {
                        write!(f, ":")?;
                    }
                }
                if !items.is_empty() && channel.is_none() {
                    write!(f, " ")?;
                }
                for item in items {
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Input { channel, prompt, targets } => {
                write!(f, "INPUT ")?;
                if let Some(channel) = channel {
                    write!(f, "#{}:", channel)?;
                }
                if let Some(prompt) = prompt {
                    write!(f, "{}:", prompt)?;
                }
                write_list(f, targets)
            }
            If { condition, then_line, else_line } => {
                write!(f, "IF {} THEN {}", condition, then_line)?;
                if let Some(line) = else_line {
                    write!(f, " ELSE {}", line)?;
                }
                Ok(())
            }
            For { var, start, limit, step } => {
                write!(f, "FOR {}={} TO {}", var, start, limit)?;
                if let Some(step) = step {
                    write!(f, " STEP {}", step)?;
                }
                Ok(())
            }
            Next { var } => write!(f, "NEXT {}", var),
            Goto { line } => write!(f, "GOTO {}", line),
            Gosub { line } => write!(f, "GOSUB {}", line),
            OnGoto { selector, lines } => write!(f, "ON {} GOTO {}", selector, join_lines(lines)),
            OnGosub { selector, lines } => write!(f, "ON {} GOSUB {}", selector, join_lines(lines)),
            Return => write!(f, "RETURN"),
            End => write!(f, "END"),
            Stop => write!(f, "STOP"),
            Rem { comment } if comment.is_empty() => write!(f, "REM"),
            Rem { comment } => write!(f, "REM {}", comment),
            Data { values } => {
                write!(f, "DATA ")?;
                write_list(f, values)
            }
            Read { targets } => {
                write!(f, "READ ")?;
                write_list(f, targets)
            }
            Restore { line: None } => write!(f, "RESTORE"),
            Restore { line: Some(n) } => write!(f, "RESTORE {}", n),
            Randomize { seed: None } => write!(f, "RANDOMIZE"),
            Randomize { seed: Some(seed) } => write!(f, "RANDOMIZE {}", seed),
            Dim { arrays } => {
                write!(f, "DIM ")?;
                write_list(f, arrays)
            }
            OptionBase { base } => write!(f, "OPTION BASE {}", base),
            Def { name, param, body } => {
                write!(f, "DEF {}", name)?;
                if let Some(param) = param {
                    write!(f, "({})", param)?;
                }
                write!(f, "={}", body)
            }
            Call { name, args } => {
                write!(f, "CALL {}", name)?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    write_list(f, args)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
            Break { lines } if lines.is_empty() => write!(f, "BREAK"),
            Break { lines } => write!(f, "BREAK {}", join_lines(lines)),
            Unbreak { lines } if lines.is_empty() => write!(f, "UNBREAK"),
            Unbreak { lines } => write!(f, "UNBREAK {}", join_lines(lines)),
            Trace => write!(f, "TRACE"),
            Untrace => write!(f, "UNTRACE"),
            Open { channel, file, options } => write!(f, "OPEN #{}:{}{}", channel, file, options),
            Close { channel, delete } => {
                write!(f, "CLOSE #{}", channel)?;
                if *delete {
                    write!(f, ":DELETE")?;
                }
                Ok(())
            }
            Delete { file } => write!(f, "DELETE {}", file),
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// What one line of input turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// Blank input; nothing to do.
    Empty,
    Command(Command),
    /// A statement typed without a line number, executed right away.
    Statement(Statement),
    /// `<number> <statement>`: insert or replace a program line.
    Store { number: u32, statement: Statement },
    /// A bare line number: delete that program line.
    Remove(u32),
}
