//! The execution engine: owns the machine state, takes typed lines and runs
//! the stored program.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace, warn};

use crate::basic_data::{parse_data_items, DataConstant};
use crate::basic_dialect::{
    DEFAULT_INITIAL_LINE, DEFAULT_LINE_INCREMENT, MAX_FILE_CHANNEL, MAX_FUNCTION_DEPTH,
    MAX_GOSUB_DEPTH, MAX_LINE_NUMBER, MAX_STRING_LENGTH,
};
use crate::basic_expressions::{checked, EvalContext, Expression, LValue, NumericExpr, StringExpr, Value};
use crate::basic_files::{codec_for, FileHandle, FileRegistry, MemoryDevices, RecordFormat, IO_READ_PAST_END};
use crate::basic_format::{display_string, format_number};
use crate::basic_io::{CursorHint, InputContext, InputProvider, OutputSink};
use crate::basic_parser::parse_line;
use crate::basic_program::{check_line_number, DataCursor, Program};
use crate::basic_random::{RandomGenerator, SeedSource, ThreadSeedSource};
use crate::basic_reports::{report_done, Condition, ProgramException};
use crate::basic_subprograms::{call_subprogram, CallArgs, SubprogramHost};
use crate::basic_symbols::{Lookup, SymbolTable, UserFunction};
use crate::basic_types::{
    BasicError, BasicWarning, Command, LineNumber, ParsedLine, PrintItem, PrintSeparator, RunStatus,
    Statement, Termination,
};

/// Runs inline after every executed program line.
pub type AfterLineHook = Box<dyn FnMut(LineNumber, &mut SymbolTable) -> Result<(), BasicError>>;

/// What the caller should do after a line was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ready,
    /// BYE was entered.
    Exit,
}

#[derive(Debug, Clone)]
struct ForFrame {
    var: String,
    limit: f64,
    step: f64,
    resume: Option<LineNumber>,
}

impl ForFrame {
    fn continues(&self, value: f64) -> bool {
        if self.step > 0.0 {
            value <= self.limit
        } else {
            value >= self.limit
        }
    }
}

/// Where CONTINUE picks up. `None` resumes past the last line.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Continuation {
    resume: Option<LineNumber>,
}

#[derive(Debug, Clone, Copy)]
struct AutoNumber {
    next: u32,
    increment: u32,
}

struct OpenFile {
    handle: Box<dyn FileHandle>,
    format: RecordFormat,
}

/// How control leaves a statement.
enum Flow {
    Next,
    /// Jump to a line that must exist.
    Goto(LineNumber),
    /// Continue at a known position; `None` is past the end.
    Resume(Option<LineNumber>),
    /// BREAK without a list: halt, resume after this line.
    Halt,
    End,
}

pub struct Interpreter<S: OutputSink, K: InputProvider> {
    screen: S,
    keyboard: K,
    program: Program,
    symbols: SymbolTable,
    breakpoints: BTreeSet<LineNumber>,
    continuation: Option<Continuation>,
    for_frames: Vec<ForFrame>,
    gosub_stack: Vec<Option<LineNumber>>,
    data: DataCursor,
    trace: bool,
    rng: RandomGenerator,
    seeds: Box<dyn SeedSource>,
    devices: Box<dyn FileRegistry>,
    files: HashMap<u32, OpenFile>,
    input_calls: usize,
    line_input_calls: HashMap<Option<LineNumber>, usize>,
    hooks: Vec<AfterLineHook>,
    auto_number: Option<AutoNumber>,
    status: RunStatus,
    current_line: Option<LineNumber>,
    function_depth: usize,
    /// An error or breakpoint was printed during the current call.
    reported: bool,
}

impl<S: OutputSink, K: InputProvider> Interpreter<S, K> {
    pub fn new(screen: S, keyboard: K) -> Self {
        Interpreter {
            screen,
            keyboard,
            program: Program::new(),
            symbols: SymbolTable::new(),
            breakpoints: BTreeSet::new(),
            continuation: None,
            for_frames: Vec::new(),
            gosub_stack: Vec::new(),
            data: DataCursor::default(),
            trace: false,
            rng: RandomGenerator::new(),
            seeds: Box::new(ThreadSeedSource),
            devices: Box::new(MemoryDevices::new()),
            files: HashMap::new(),
            input_calls: 0,
            line_input_calls: HashMap::new(),
            hooks: Vec::new(),
            auto_number: None,
            status: RunStatus::Idle,
            current_line: None,
            function_depth: 0,
            reported: false,
        }
    }

    pub fn with_seed_source(mut self, seeds: Box<dyn SeedSource>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_devices(mut self, devices: Box<dyn FileRegistry>) -> Self {
        self.devices = devices;
        self
    }

    pub fn add_after_line_hook<F>(&mut self, hook: F)
    where
        F: FnMut(LineNumber, &mut SymbolTable) -> Result<(), BasicError> + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    pub fn screen(&self) -> &S {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut S {
        &mut self.screen
    }

    pub fn keyboard(&self) -> &K {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut K {
        &mut self.keyboard
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn breakpoints(&self) -> &BTreeSet<LineNumber> {
        &self.breakpoints
    }

    pub fn is_tracing(&self) -> bool {
        self.trace
    }

    pub fn can_continue(&self) -> bool {
        self.continuation.is_some()
    }

    /// Line number NUMBER mode will give the next entered line.
    pub fn next_auto_line(&self) -> Option<u32> {
        self.auto_number.map(|auto| auto.next)
    }

    /// Enters several lines in order. Stops at BYE.
    pub fn enter_lines<'a, I>(&mut self, lines: I) -> Outcome
    where
        I: IntoIterator<Item = &'a str>,
    {
        for line in lines {
            if self.enter(line) == Outcome::Exit {
                return Outcome::Exit;
            }
        }
        Outcome::Ready
    }

    /// Handles one line as typed at the prompt.
    pub fn enter(&mut self, source: &str) -> Outcome {
        self.reported = false;

        if let Some(auto) = self.auto_number {
            if source.trim().is_empty() {
                self.auto_number = None;
                return Outcome::Ready;
            }
            let numbered = format!("{} {}", auto.next, source);
            let stored = parse_line(&numbered).and_then(|parsed| match parsed {
                ParsedLine::Store { number, statement } => self.store_line(number, statement),
                _ => Err(BasicError::IncorrectStatement),
            });
            match stored {
                Ok(()) => {
                    let next = auto.next + auto.increment;
                    self.auto_number = (next <= MAX_LINE_NUMBER).then_some(AutoNumber { next, ..auto });
                }
                Err(e) => self.report(ProgramException::error(e, None)),
            }
            return Outcome::Ready;
        }

        let parsed = match parse_line(source) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.report(ProgramException::error(e, None));
                return Outcome::Ready;
            }
        };

        let result = match parsed {
            ParsedLine::Empty => Ok(()),
            ParsedLine::Store { number, statement } => self.store_line(number, statement),
            ParsedLine::Remove(number) => self.remove_line(number),
            ParsedLine::Command(command) => match self.execute_command(command) {
                Ok(outcome) => return outcome,
                Err(e) => Err(e),
            },
            ParsedLine::Statement(statement) => self.execute_immediate(&statement),
        };
        if let Err(e) = result {
            self.report(ProgramException::error(e, None));
        }
        Outcome::Ready
    }

    // ===== PROGRAM EDITING =====

    fn store_line(&mut self, number: u32, statement: Statement) -> Result<(), BasicError> {
        self.program.store(number, statement)?;
        self.program_changed();
        Ok(())
    }

    fn remove_line(&mut self, number: u32) -> Result<(), BasicError> {
        if self.program.remove(number)? {
            self.program_changed();
        }
        Ok(())
    }

    /// Any edit forgets variables and makes the halted run unresumable.
    fn program_changed(&mut self) {
        self.reset_run_state();
        if matches!(self.status, RunStatus::HaltedAtBreakpoint(_)) {
            debug!("program edited while halted; continuation dropped");
            self.status = RunStatus::Idle;
        }
    }

    fn reset_run_state(&mut self) {
        self.symbols.clear();
        self.for_frames.clear();
        self.gosub_stack.clear();
        self.data.restore(None);
        self.continuation = None;
        self.input_calls = 0;
        self.line_input_calls.clear();
        self.function_depth = 0;
        self.close_all_files();
    }

    fn close_all_files(&mut self) {
        for (channel, mut file) in self.files.drain() {
            if let Err(e) = file.handle.close(false) {
                warn!(channel, error = %e, "closing file failed");
            }
        }
    }

    // ===== COMMANDS =====

    fn execute_command(&mut self, command: Command) -> Result<Outcome, BasicError> {
        debug!(%command, "command");
        match command {
            Command::New => {
                self.program.clear();
                self.reset_run_state();
                self.breakpoints.clear();
                self.trace = false;
                self.status = RunStatus::Idle;
                self.screen.clear();
            }
            Command::Run(line) => self.run(line)?,
            Command::List(range) => {
                for text in self.program.list(range) {
                    self.screen.append(&text);
                    self.screen.place_cursor(CursorHint::NewLine);
                }
            }
            Command::Bye => {
                self.close_all_files();
                self.program.clear();
                self.symbols.clear();
                self.breakpoints.clear();
                self.continuation = None;
                return Ok(Outcome::Exit);
            }
            Command::Number { initial, increment } => {
                let initial = check_line_number(initial.unwrap_or(DEFAULT_INITIAL_LINE))?;
                let increment = increment.unwrap_or(DEFAULT_LINE_INCREMENT);
                if increment < 1 {
                    return Err(BasicError::BadLineNumber);
                }
                self.auto_number = Some(AutoNumber { next: initial as u32, increment });
            }
            Command::Resequence { initial, increment } => {
                let mapping = self.program.resequence(
                    initial.unwrap_or(DEFAULT_INITIAL_LINE),
                    increment.unwrap_or(DEFAULT_LINE_INCREMENT),
                )?;
                self.breakpoints = self.breakpoints.iter().filter_map(|line| mapping.get(line).copied()).collect();
                self.program_changed();
            }
            Command::Continue => {
                let continuation = self.continuation.take().ok_or(BasicError::CantContinue)?;
                debug!(resume = ?continuation.resume, "continuing");
                self.execute_from(continuation.resume, true);
            }
            Command::Break(lines) => self.breakpoints.extend(lines),
            Command::Unbreak(lines) => self.unbreak(&lines),
            Command::Trace => self.trace = true,
            Command::Untrace => self.trace = false,
        }
        Ok(Outcome::Ready)
    }

    fn unbreak(&mut self, lines: &[LineNumber]) {
        if lines.is_empty() {
            self.breakpoints.clear();
        }
        for line in lines {
            self.breakpoints.remove(line);
        }
    }

    fn execute_immediate(&mut self, statement: &Statement) -> Result<(), BasicError> {
        if !statement.allowed_immediately() {
            return Err(BasicError::CantDoThat);
        }
        self.current_line = None;
        self.execute_statement(statement).map(|_| ())
    }

    // ===== RUNNING =====

    fn run(&mut self, from: Option<LineNumber>) -> Result<(), BasicError> {
        let start = match from {
            Some(line) if self.program.contains(line) => Some(line),
            Some(_) => return Err(BasicError::BadLineNumber),
            None => self.program.first_line_number(),
        };
        self.reset_run_state();
        self.rng.reset();
        debug!(start = ?start, lines = self.program.len(), "run");
        self.execute_from(start, false);
        Ok(())
    }

    /// The main loop. `resumed` skips the breakpoint check on the first line.
    fn execute_from(&mut self, mut line: Option<LineNumber>, mut resumed: bool) {
        self.status = RunStatus::Running;
        loop {
            let Some(current) = line else {
                self.terminate(Termination::Normal);
                return;
            };
            if !resumed && self.breakpoints.contains(&current) {
                self.halt(current, Some(current));
                return;
            }
            resumed = false;

            if self.trace {
                self.screen.append(&format!("<{}>", current));
            }
            self.current_line = Some(current);

            let statement = match self.program.statements(current) {
                Ok(statement) => statement.clone(),
                Err(e) => return self.fail(e, current),
            };
            trace!(line = current, %statement, "executing");

            let next = match self.execute_statement(&statement) {
                Ok(Flow::Next) => self.program.next_line_number(current),
                Ok(Flow::Goto(target)) if self.program.contains(target) => Some(target),
                Ok(Flow::Goto(_)) => return self.fail(BasicError::BadLineNumber, current),
                Ok(Flow::Resume(target)) => target,
                Ok(Flow::Halt) => {
                    let resume = self.program.next_line_number(current);
                    return self.halt(current, resume);
                }
                Ok(Flow::End) => {
                    self.terminate(Termination::Normal);
                    return;
                }
                Err(BasicError::Breakpoint) => return self.halt(current, Some(current)),
                Err(e) => return self.fail(e, current),
            };

            match self.run_hooks(current) {
                Ok(()) => {}
                Err(BasicError::Breakpoint) => return self.halt(current, next),
                Err(e) => return self.fail(e, current),
            }
            line = next;
        }
    }

    fn run_hooks(&mut self, line: LineNumber) -> Result<(), BasicError> {
        for hook in self.hooks.iter_mut() {
            hook(line, &mut self.symbols)?;
        }
        Ok(())
    }

    fn halt(&mut self, line: LineNumber, resume: Option<LineNumber>) {
        debug!(line, resume = ?resume, "halted at breakpoint");
        self.status = RunStatus::HaltedAtBreakpoint(line);
        self.continuation = Some(Continuation { resume });
        self.current_line = None;
        self.report(ProgramException::error(BasicError::Breakpoint, Some(line)));
    }

    fn fail(&mut self, error: BasicError, line: LineNumber) {
        debug!(line, %error, "run terminated by error");
        self.status = RunStatus::Terminated(Termination::Error);
        self.continuation = None;
        self.current_line = None;
        self.close_all_files();
        self.report(ProgramException::error(error, Some(line)));
    }

    fn terminate(&mut self, termination: Termination) {
        debug!(?termination, "run finished");
        self.status = RunStatus::Terminated(termination);
        self.continuation = None;
        self.current_line = None;
        self.close_all_files();
        if !self.reported {
            report_done(&mut self.screen);
        }
    }

    fn report(&mut self, exception: ProgramException) {
        if !matches!(exception.condition, Condition::Warning(_)) {
            self.reported = true;
        }
        exception.report(&mut self.screen);
    }

    fn line(&self) -> Result<LineNumber, BasicError> {
        self.current_line.ok_or(BasicError::CantDoThat)
    }

    fn next_line(&self) -> Result<Option<LineNumber>, BasicError> {
        Ok(self.program.next_line_number(self.line()?))
    }

    // ===== STATEMENTS =====

    fn execute_statement(&mut self, statement: &Statement) -> Result<Flow, BasicError> {
        match statement {
            Statement::Let { target, value } => {
                let value = value.evaluate(self)?;
                self.assign_target(target, value)?;
            }
            Statement::Print { channel, items } => match self.channel(channel.as_ref())? {
                0 => self.print_to_screen(items)?,
                channel => self.print_to_file(channel, items)?,
            },
            Statement::Input { channel, prompt, targets } => match self.channel(channel.as_ref())? {
                0 => self.input_from_keyboard(prompt.as_ref(), targets)?,
                channel => self.input_from_file(channel, targets)?,
            },
            Statement::If { condition, then_line, else_line } => {
                if condition.evaluate(self)? != 0.0 {
                    return Ok(Flow::Goto(*then_line));
                }
                if let Some(line) = else_line {
                    return Ok(Flow::Goto(*line));
                }
            }
            Statement::For { var, start, limit, step } => return self.execute_for(var, start, limit, step.as_ref()),
            Statement::Next { var } => return self.execute_next(var),
            Statement::Goto { line } => return Ok(Flow::Goto(*line)),
            Statement::Gosub { line } => {
                self.push_return()?;
                return Ok(Flow::Goto(*line));
            }
            Statement::OnGoto { selector, lines } => {
                let line = self.select(selector, lines)?;
                return Ok(Flow::Goto(line));
            }
            Statement::OnGosub { selector, lines } => {
                let line = self.select(selector, lines)?;
                self.push_return()?;
                return Ok(Flow::Goto(line));
            }
            Statement::Return => {
                let resume = self.gosub_stack.pop().ok_or(BasicError::CantDoThat)?;
                return Ok(Flow::Resume(resume));
            }
            Statement::End | Statement::Stop => return Ok(Flow::End),
            Statement::Rem { .. } | Statement::Data { .. } => {}
            Statement::Read { targets } => {
                for target in targets {
                    let constant = self.data.read(&self.program)?;
                    let value = coerce(&constant, target.is_string())?;
                    let value = self.in_range(value);
                    self.assign_target(target, value)?;
                }
            }
            Statement::Restore { line } => self.data.restore(*line),
            Statement::Randomize { seed } => {
                let seed = match seed {
                    Some(seed) => seed.evaluate(self)?.trunc() as i64 as u16,
                    None => self.seeds.seed(),
                };
                self.rng.reseed(seed);
            }
            Statement::Dim { arrays } => {
                for array in arrays {
                    self.symbols.dim_array(&array.name, array.bounds.clone())?;
                }
            }
            Statement::OptionBase { base } => self.symbols.set_option_base(*base)?,
            Statement::Def { name, param, body } => {
                self.symbols.define_function(UserFunction {
                    name: name.clone(),
                    param: param.clone(),
                    body: body.clone(),
                })?;
            }
            Statement::Call { name, args } => {
                let values = args.iter().map(|arg| arg.evaluate(self)).collect::<Result<Vec<_>, _>>()?;
                call_subprogram(name, &CallArgs { exprs: args, values: &values }, self)?;
            }
            Statement::Break { lines } if lines.is_empty() => return Ok(Flow::Halt),
            Statement::Break { lines } => self.breakpoints.extend(lines.iter().copied()),
            Statement::Unbreak { lines } => self.unbreak(lines),
            Statement::Trace => self.trace = true,
            Statement::Untrace => self.trace = false,
            Statement::Open { channel, file, options } => {
                let channel = self.channel(Some(channel))?;
                if channel == 0 || self.files.contains_key(&channel) {
                    return Err(BasicError::FileError);
                }
                let name = file.evaluate(self)?;
                let handle = self.devices.open(&name, options)?;
                debug!(channel, file = %name, "opened file");
                self.files.insert(channel, OpenFile { handle, format: options.format() });
            }
            Statement::Close { channel, delete } => {
                let channel = self.channel(Some(channel))?;
                let mut file = self.files.remove(&channel).ok_or(BasicError::FileError)?;
                file.handle.close(*delete)?;
            }
            Statement::Delete { file } => {
                let name = file.evaluate(self)?;
                self.devices.delete(&name)?;
            }
        }
        Ok(Flow::Next)
    }

    fn execute_for(
        &mut self,
        var: &str,
        start: &NumericExpr,
        limit: &NumericExpr,
        step: Option<&NumericExpr>,
    ) -> Result<Flow, BasicError> {
        let limit = limit.evaluate(self)?;
        let step = match step {
            Some(step) => step.evaluate(self)?,
            None => 1.0,
        };
        if step == 0.0 {
            return Err(BasicError::BadValue);
        }
        let start = start.evaluate(self)?;
        self.symbols.set_scalar(var, Value::Number(start))?;

        self.for_frames.retain(|frame| frame.var != var);
        let frame = ForFrame { var: var.to_string(), limit, step, resume: self.next_line()? };
        if frame.continues(start) {
            self.for_frames.push(frame);
            return Ok(Flow::Next);
        }
        let next = self.matching_next(var)?;
        Ok(Flow::Resume(self.program.next_line_number(next)))
    }

    /// The NEXT that closes the FOR on the current line.
    fn matching_next(&self, var: &str) -> Result<LineNumber, BasicError> {
        let mut depth = 0;
        let mut line = self.next_line()?;
        while let Some(number) = line {
            match self.program.statements(number)? {
                Statement::For { var: inner, .. } if inner == var => depth += 1,
                Statement::Next { var: inner } if inner == var => {
                    if depth == 0 {
                        return Ok(number);
                    }
                    depth -= 1;
                }
                _ => {}
            }
            line = self.program.next_line_number(number);
        }
        Err(BasicError::ForNextError)
    }

    fn execute_next(&mut self, var: &str) -> Result<Flow, BasicError> {
        let index = self
            .for_frames
            .iter()
            .rposition(|frame| frame.var == var)
            .ok_or(BasicError::CantDoThat)?;
        self.for_frames.truncate(index + 1);
        let frame = self.for_frames[index].clone();

        let value = match self.symbols.get_scalar(var)? {
            Value::Number(n) => n + frame.step,
            Value::Text(_) => return Err(BasicError::StringNumberMismatch),
        };
        self.symbols.set_scalar(var, Value::Number(value))?;

        if frame.continues(value) {
            Ok(Flow::Resume(frame.resume))
        } else {
            self.for_frames.pop();
            Ok(Flow::Next)
        }
    }

    fn push_return(&mut self) -> Result<(), BasicError> {
        if self.gosub_stack.len() >= MAX_GOSUB_DEPTH {
            return Err(BasicError::MemoryFull);
        }
        let resume = self.next_line()?;
        self.gosub_stack.push(resume);
        Ok(())
    }

    fn select(&mut self, selector: &NumericExpr, lines: &[LineNumber]) -> Result<LineNumber, BasicError> {
        let index = selector.evaluate(self)?.round();
        if index < 1.0 || index > lines.len() as f64 {
            return Err(BasicError::BadValue);
        }
        Ok(lines[index as usize - 1])
    }

    fn assign_target(&mut self, target: &LValue, value: Value) -> Result<(), BasicError> {
        if target.indices.is_empty() {
            return self.symbols.set_scalar(&target.name, value);
        }
        let indices = target
            .indices
            .iter()
            .map(|index| index.evaluate(self))
            .collect::<Result<Vec<_>, _>>()?;
        self.symbols.set_element(&target.name, &indices, value)
    }

    // ===== PRINT AND INPUT =====

    /// Channel number of a `#n` clause; no clause is the screen.
    fn channel(&mut self, channel: Option<&NumericExpr>) -> Result<u32, BasicError> {
        let Some(channel) = channel else {
            return Ok(0);
        };
        let number = channel.evaluate(self)?.round();
        if number < 0.0 || number > MAX_FILE_CHANNEL as f64 {
            return Err(BasicError::BadValue);
        }
        Ok(number as u32)
    }

    fn print_to_screen(&mut self, items: &[PrintItem]) -> Result<(), BasicError> {
        for item in items {
            match item {
                PrintItem::Expression(expr) => {
                    let text = match expr.evaluate(self)? {
                        Value::Number(n) => format_number(n),
                        Value::Text(s) => display_string(&s).to_string(),
                    };
                    self.screen.append(&text);
                }
                PrintItem::Tab(column) => {
                    let column = column.evaluate(self)?.round().max(1.0);
                    self.screen.place_cursor(CursorHint::Tab(column as usize));
                }
                PrintItem::Separator(PrintSeparator::Comma) => self.screen.place_cursor(CursorHint::NextZone),
                PrintItem::Separator(PrintSeparator::Semicolon) => {}
                PrintItem::Separator(PrintSeparator::Colon) => self.screen.place_cursor(CursorHint::NewLine),
            }
        }
        if !matches!(items.last(), Some(PrintItem::Separator(_))) {
            self.screen.place_cursor(CursorHint::NewLine);
        }
        Ok(())
    }

    fn print_to_file(&mut self, channel: u32, items: &[PrintItem]) -> Result<(), BasicError> {
        if !self.files.contains_key(&channel) {
            return Err(BasicError::FileError);
        }
        let mut values = Vec::new();
        for item in items {
            if let PrintItem::Expression(expr) = item {
                let value = match expr.evaluate(self)? {
                    Value::Text(s) if s.chars().count() > MAX_STRING_LENGTH => {
                        self.warn(BasicWarning::StringTruncated);
                        Value::Text(display_string(&s).to_string())
                    }
                    value => value,
                };
                values.push(value);
            }
        }
        let file = self.files.get_mut(&channel).ok_or(BasicError::FileError)?;
        let record = codec_for(file.format).encode(&values)?;
        file.handle.write_record(&record)
    }

    fn input_from_keyboard(&mut self, prompt: Option<&StringExpr>, targets: &[LValue]) -> Result<(), BasicError> {
        let prompt = match prompt {
            Some(prompt) => prompt.evaluate(self)?,
            None => "? ".to_string(),
        };
        let mut unaccepted_count = 0;
        loop {
            self.screen.append(&prompt);
            let ctx = self.input_context(unaccepted_count);
            let response = self.keyboard.provide_input(&ctx)?;
            self.screen.append(&response);
            self.screen.place_cursor(CursorHint::NewLine);

            match accept_input(&response, targets) {
                Some(values) => {
                    for (target, value) in targets.iter().zip(values) {
                        let value = self.in_range(value);
                        self.assign_target(target, value)?;
                    }
                    return Ok(());
                }
                None => {
                    debug!(response = %response, "input not accepted");
                    self.warn(BasicWarning::InputError);
                    unaccepted_count += 1;
                }
            }
        }
    }

    /// Numbers read from DATA, the keyboard or a file obey the same range as
    /// computed ones.
    fn in_range(&mut self, value: Value) -> Value {
        match value {
            Value::Number(n) => Value::Number(checked(self, n)),
            text => text,
        }
    }

    fn input_context(&mut self, unaccepted_count: usize) -> InputContext {
        self.input_calls += 1;
        let line_calls = self.line_input_calls.entry(self.current_line).or_insert(0);
        *line_calls += 1;
        InputContext {
            call_count: self.input_calls,
            line: self.current_line,
            line_call_count: *line_calls,
            unaccepted_count,
        }
    }

    fn input_from_file(&mut self, channel: u32, targets: &[LValue]) -> Result<(), BasicError> {
        let file = self.files.get_mut(&channel).ok_or(BasicError::FileError)?;
        let codec = codec_for(file.format);
        let mut fields = Vec::new();
        while fields.len() < targets.len() {
            let record = file.handle.read_record()?.ok_or(BasicError::IoError(IO_READ_PAST_END))?;
            fields.extend(codec.decode(&record)?);
        }
        for (target, field) in targets.iter().zip(fields) {
            let value = coerce(&field, target.is_string())?;
            let value = self.in_range(value);
            self.assign_target(target, value)?;
        }
        Ok(())
    }

    // ===== USER FUNCTIONS =====

    fn call_function(&mut self, function: &UserFunction, arg: Option<f64>) -> Result<Value, BasicError> {
        if function.param.is_some() != arg.is_some() {
            return Err(BasicError::NameConflict);
        }
        if self.function_depth >= MAX_FUNCTION_DEPTH {
            return Err(BasicError::MemoryFull);
        }
        if let (Some(param), Some(arg)) = (&function.param, arg) {
            self.symbols.push_scope(param, Value::Number(arg));
        }
        self.function_depth += 1;
        let result = function.body.evaluate(self);
        self.function_depth -= 1;
        if function.param.is_some() {
            self.symbols.pop_scope();
        }
        result
    }

    fn resolve(&mut self, name: &str, indices: Option<&[f64]>) -> Result<Value, BasicError> {
        match (self.symbols.lookup(name), indices) {
            (Lookup::Function(function), None) => self.call_function(&function, None),
            (Lookup::Function(function), Some([arg])) => self.call_function(&function, Some(*arg)),
            (Lookup::Function(_), Some(_)) => Err(BasicError::NameConflict),
            (_, None) => self.symbols.get_scalar(name),
            (_, Some(indices)) => self.symbols.get_element(name, indices),
        }
    }
}

/// Converts a constant to the target's type. Numeric targets need numeric text.
fn coerce(constant: &DataConstant, string_target: bool) -> Result<Value, BasicError> {
    if string_target {
        Ok(Value::Text(constant.to_text()))
    } else {
        constant.to_number().map(Value::Number)
    }
}

/// Splits an INPUT response into one value per target, or `None` if it
/// does not fit.
fn accept_input(response: &str, targets: &[LValue]) -> Option<Vec<Value>> {
    let fields = parse_data_items(response).ok()?;
    if fields.len() != targets.len() {
        return None;
    }
    targets
        .iter()
        .zip(&fields)
        .map(|(target, field)| coerce(field, target.is_string()).ok())
        .collect()
}

fn expect_number(value: Value) -> Result<f64, BasicError> {
    match value {
        Value::Number(n) => Ok(n),
        Value::Text(_) => Err(BasicError::StringNumberMismatch),
    }
}

fn expect_text(value: Value) -> Result<String, BasicError> {
    match value {
        Value::Text(s) => Ok(s),
        Value::Number(_) => Err(BasicError::StringNumberMismatch),
    }
}

impl<S: OutputSink, K: InputProvider> EvalContext for Interpreter<S, K> {
    fn numeric_variable(&mut self, name: &str) -> Result<f64, BasicError> {
        self.resolve(name, None).and_then(expect_number)
    }

    fn string_variable(&mut self, name: &str) -> Result<String, BasicError> {
        self.resolve(name, None).and_then(expect_text)
    }

    fn numeric_element(&mut self, name: &str, indices: &[f64]) -> Result<f64, BasicError> {
        self.resolve(name, Some(indices)).and_then(expect_number)
    }

    fn string_element(&mut self, name: &str, indices: &[f64]) -> Result<String, BasicError> {
        self.resolve(name, Some(indices)).and_then(expect_text)
    }

    fn random(&mut self) -> f64 {
        self.rng.next_fraction()
    }

    fn warn(&mut self, warning: BasicWarning) {
        let line = self.current_line;
        self.report(ProgramException::warning(warning, line));
    }
}

impl<S: OutputSink, K: InputProvider> SubprogramHost for Interpreter<S, K> {
    fn output(&mut self) -> &mut dyn OutputSink {
        &mut self.screen
    }

    fn key_code(&mut self) -> Option<i32> {
        let ctx = self.input_context(0);
        self.keyboard.currently_pressed_key_code(&ctx)
    }

    fn joystick(&mut self, unit: u8) -> (i32, i32) {
        self.keyboard.joystick(unit)
    }

    fn assign(&mut self, target: &Expression, value: Value) -> Result<(), BasicError> {
        let (name, indices) = match target {
            Expression::Numeric(NumericExpr::Variable(name)) | Expression::String(StringExpr::Variable(name)) => {
                (name, &[][..])
            }
            Expression::Numeric(NumericExpr::Element { name, indices })
            | Expression::String(StringExpr::Element { name, indices }) => (name, indices.as_slice()),
            _ => return Err(BasicError::IncorrectStatement),
        };
        let target = LValue { name: name.clone(), indices: indices.to_vec() };
        self.assign_target(&target, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_io::{ScriptedKeyboard, TextScreen};
    use crate::basic_random::FixedSeed;
    use crate::basic_dialect::MAX_MAGNITUDE;
    use pretty_assertions::assert_eq;

    fn machine(responses: &[&str]) -> Interpreter<TextScreen, ScriptedKeyboard> {
        Interpreter::new(TextScreen::new(), ScriptedKeyboard::new(responses.iter().copied()))
            .with_seed_source(Box::new(FixedSeed(7)))
    }

    fn output(lines: &[&str]) -> String {
        let mut m = machine(&[]);
        m.enter_lines(lines.iter().copied());
        m.screen().transcript()
    }

    #[test]
    fn test_for_limit_fixed_at_entry() {
        let out = output(&["100 I=5", "110 FOR I=1 TO I", "120 PRINT I;", "130 NEXT I", "RUN"]);
        assert_eq!(out, " 1  2  3  4  5\n** DONE **\n\n");
    }

    #[test]
    fn test_for_body_changes_limit() {
        let out = output(&["10 L=5", "20 FOR I=1 TO L", "30 L=20", "40 C=C+1", "50 NEXT I", "60 PRINT C", "RUN"]);
        assert_eq!(out, " 5\n** DONE **\n\n");
    }

    #[test]
    fn test_for_skips_body() {
        let out = output(&["10 FOR I=5 TO 1", "20 PRINT \"NO\"", "30 NEXT I", "40 PRINT I", "RUN"]);
        assert_eq!(out, " 5\n** DONE **\n\n");
    }

    #[test]
    fn test_for_without_next() {
        let out = output(&["10 FOR I=5 TO 1", "20 PRINT", "RUN"]);
        assert_eq!(out, "* FOR-NEXT ERROR IN 10\n");
    }

    #[test]
    fn test_stale_next() {
        let out = output(&["10 FOR I=1 TO 2", "20 NEXT I", "30 NEXT I", "RUN"]);
        assert_eq!(out, "* CAN'T DO THAT IN 30\n");
    }

    #[test]
    fn test_gosub_return() {
        let out = output(&["10 GOSUB 100", "20 PRINT \"B\"", "30 END", "100 PRINT \"A\"", "110 RETURN", "RUN"]);
        assert_eq!(out, "A\nB\n** DONE **\n\n");
        let out = output(&["10 RETURN", "RUN"]);
        assert_eq!(out, "* CAN'T DO THAT IN 10\n");
    }

    #[test]
    fn test_runaway_gosub() {
        let out = output(&["10 GOSUB 10", "RUN"]);
        assert_eq!(out, "* MEMORY FULL IN 10\n");
    }

    #[test]
    fn test_goto_missing_line() {
        let out = output(&["10 GOTO 50", "RUN"]);
        assert_eq!(out, "* BAD LINE NUMBER IN 10\n");
    }

    #[test]
    fn test_on_goto() {
        let out = output(&["10 ON 2 GOTO 20,30", "20 PRINT 20", "30 PRINT 30", "RUN"]);
        assert_eq!(out, " 30\n** DONE **\n\n");
        let out = output(&["10 ON 3 GOTO 20,30", "20 END", "30 END", "RUN"]);
        assert_eq!(out, "* BAD VALUE IN 10\n");
    }

    #[test]
    fn test_read_type_error() {
        let out = output(&["100 READ A,B", "110 DATA 12,HELLO", "RUN"]);
        assert_eq!(out, "* DATA ERROR IN 100\n");
    }

    #[test]
    fn test_read_restore() {
        let out = output(&[
            "10 DATA 1,2",
            "20 DATA 3",
            "30 READ A,B,C",
            "40 RESTORE 20",
            "50 READ D",
            "60 PRINT A;B;C;D",
            "RUN",
        ]);
        assert_eq!(out, " 1  2  3  3\n** DONE **\n\n");
    }

    #[test]
    fn test_bare_restore_rewinds_to_first_data() {
        let out = output(&["10 DATA 1,2", "20 READ A,B", "30 RESTORE", "40 READ C", "50 DATA 9", "60 PRINT A;B;C", "RUN"]);
        assert_eq!(out, " 1  2  1\n** DONE **\n\n");
    }

    #[test]
    fn test_store_resets_variables() {
        let mut m = machine(&[]);
        m.enter_lines(["100 A=2", "RUN", "PRINT A", "20 B=3", "PRINT A"]);
        assert_eq!(m.screen().transcript(), "** DONE **\n\n 2\n 0\n");
    }

    #[test]
    fn test_breakpoint_and_continue() {
        let mut m = machine(&[]);
        m.enter_lines(["100 PRINT 1", "110 PRINT 2", "120 PRINT 3", "BREAK 110", "RUN"]);
        assert_eq!(m.status(), RunStatus::HaltedAtBreakpoint(110));
        assert!(m.can_continue());
        m.enter("CON");
        assert_eq!(m.screen().transcript(), " 1\n* BREAKPOINT AT 110\n 2\n 3\n** DONE **\n\n");
    }

    #[test]
    fn test_edit_while_halted_blocks_continue() {
        let mut m = machine(&[]);
        m.enter_lines(["100 PRINT 1", "110 PRINT 2", "BREAK 110", "RUN", "105 REM", "CONTINUE"]);
        assert_eq!(m.screen().transcript(), " 1\n* BREAKPOINT AT 110\n* CAN'T CONTINUE\n\n");
    }

    #[test]
    fn test_break_statement_resumes_after() {
        let mut m = machine(&[]);
        m.enter_lines(["10 PRINT 1", "20 BREAK", "30 PRINT 3", "RUN", "CON"]);
        assert_eq!(m.screen().transcript(), " 1\n* BREAKPOINT AT 20\n 3\n** DONE **\n\n");
    }

    #[test]
    fn test_input_retry_and_abort() {
        let mut m = machine(&["X", "5"]);
        m.enter_lines(["10 INPUT A", "20 PRINT A*2", "RUN"]);
        let requests = m.keyboard().requests().to_vec();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].unaccepted_count, 1);
        assert_eq!(requests[1].line_call_count, 2);
        assert_eq!(
            m.screen().transcript(),
            "? X\n* WARNING:\n  INPUT ERROR IN 10\n? 5\n 10\n** DONE **\n\n"
        );

        let mut m = machine(&[]);
        m.enter_lines(["10 INPUT \"NAME\":N$", "RUN"]);
        assert_eq!(m.status(), RunStatus::HaltedAtBreakpoint(10));
        m.keyboard_mut().push("BOB");
        m.enter_lines(["CON", "PRINT N$"]);
        assert!(m.screen().transcript().ends_with("NAMEBOB\n** DONE **\n\nBOB\n"));
    }

    #[test]
    fn test_after_line_hook_breaks_loop() {
        let mut m = machine(&[]);
        m.add_after_line_hook(|line, symbols| {
            match symbols.get_scalar("N")? {
                Value::Number(n) if line == 20 && n >= 3.0 => Err(BasicError::Breakpoint),
                _ => Ok(()),
            }
        });
        m.enter_lines(["10 N=N+1", "20 GOTO 10", "RUN"]);
        assert_eq!(m.screen().transcript(), "* BREAKPOINT AT 20\n");
        assert_eq!(m.symbols().get_scalar("N"), Ok(Value::Number(3.0)));
    }

    #[test]
    fn test_trace() {
        let out = output(&["10 A=1", "20 PRINT A", "TRACE", "RUN"]);
        assert_eq!(out, "<10><20> 1\n** DONE **\n\n");
    }

    #[test]
    fn test_immediate_restrictions() {
        let out = output(&["GOTO 10", "PRINT 1+1"]);
        assert_eq!(out, "* CAN'T DO THAT\n\n 2\n");
    }

    #[test]
    fn test_number_too_big_warning() {
        let out = output(&["10 A=1E100*1E100", "20 PRINT A", "RUN"]);
        assert_eq!(out, "* WARNING:\n  NUMBER TOO BIG IN 10\n 9.99999E+**\n** DONE **\n\n");
    }

    #[test]
    fn test_literals_and_data_are_clamped() {
        let out = output(&["10 PRINT -1E200", "RUN"]);
        assert_eq!(out, "* WARNING:\n  NUMBER TOO BIG IN 10\n-9.99999E+**\n** DONE **\n\n");

        let mut m = machine(&[]);
        m.enter_lines(["10 A=1E200", "RUN"]);
        assert_eq!(m.symbols().get_scalar("A"), Ok(Value::Number(MAX_MAGNITUDE)));
        assert_eq!(m.screen().transcript(), "* WARNING:\n  NUMBER TOO BIG IN 10\n** DONE **\n\n");

        let mut m = machine(&[]);
        m.enter_lines(["10 READ A", "20 DATA 1E300", "RUN"]);
        assert_eq!(m.symbols().get_scalar("A"), Ok(Value::Number(MAX_MAGNITUDE)));
        assert_eq!(m.screen().transcript(), "* WARNING:\n  NUMBER TOO BIG IN 10\n** DONE **\n\n");

        let mut m = machine(&["-2E150"]);
        m.enter_lines(["10 INPUT A", "RUN"]);
        assert_eq!(m.symbols().get_scalar("A"), Ok(Value::Number(-MAX_MAGNITUDE)));
        assert_eq!(m.screen().transcript(), "? -2E150\n* WARNING:\n  NUMBER TOO BIG IN 10\n** DONE **\n\n");
    }

    #[test]
    fn test_user_functions() {
        let out = output(&["10 DEF F(X)=X*X+A", "20 A=1", "30 PRINT F(3);X", "RUN"]);
        assert_eq!(out, " 10  0\n** DONE **\n\n");
        let out = output(&["10 DEF F(X)=F(X)", "20 PRINT F(1)", "RUN"]);
        assert_eq!(out, "* MEMORY FULL IN 20\n");
    }

    #[test]
    fn test_arrays() {
        let out = output(&["10 DIM A(3)", "20 A(3)=7", "30 PRINT A(3)", "40 A(4)=1", "RUN"]);
        assert_eq!(out, " 7\n* BAD SUBSCRIPT IN 40\n");
        let out = output(&["10 DIM A(100000,100000,100000)", "RUN"]);
        assert_eq!(out, "* MEMORY FULL IN 10\n");
    }

    #[test]
    fn test_resequence_command() {
        let mut m = machine(&[]);
        m.enter_lines(["100 GOTO 120", "110 END", "120 PRINT 1", "BREAK 120", "RES 10,5", "LIST"]);
        assert_eq!(m.screen().transcript(), "10 GOTO 20\n15 END\n20 PRINT 1\n");
        assert!(m.breakpoints().contains(&20));
    }

    #[test]
    fn test_number_mode() {
        let mut m = machine(&[]);
        m.enter_lines(["NUM 10,5", "PRINT 1", "END", "", "LIST"]);
        assert_eq!(m.screen().transcript(), "10 PRINT 1\n15 END\n");
        assert_eq!(m.next_auto_line(), None);
    }

    #[test]
    fn test_files_round_trip() {
        let devices = MemoryDevices::new();
        let mut m = machine(&[]).with_devices(Box::new(devices.clone()));
        m.enter_lines([
            "10 OPEN #1:\"DSK1.DATA\",INTERNAL,OUTPUT",
            "20 PRINT #1:\"AB\",12",
            "30 CLOSE #1",
            "40 OPEN #2:\"DSK1.DATA\",INTERNAL,INPUT",
            "50 INPUT #2:A$,N",
            "60 PRINT A$;N",
            "70 INPUT #2:B$",
            "RUN",
        ]);
        assert_eq!(m.screen().transcript(), "AB 12\n* I/O ERROR 05 IN 70\n");
        assert_eq!(devices.file_names(), vec!["DSK1.DATA".to_string()]);
    }

    #[test]
    fn test_unopened_channel() {
        let out = output(&["10 PRINT #3:1", "RUN"]);
        assert_eq!(out, "* FILE ERROR IN 10\n");
    }

    #[test]
    fn test_randomize_is_repeatable() {
        let mut a = machine(&[]);
        let mut b = machine(&[]);
        for m in [&mut a, &mut b] {
            m.enter_lines(["10 RANDOMIZE 42", "20 PRINT INT(RND*100)", "RUN"]);
        }
        assert_eq!(a.screen().transcript(), b.screen().transcript());
    }

    #[test]
    fn test_bye() {
        let mut m = machine(&[]);
        assert_eq!(m.enter("10 PRINT"), Outcome::Ready);
        assert_eq!(m.enter("BYE"), Outcome::Exit);
        assert!(m.program().is_empty());
    }

    #[test]
    fn test_call_subprogram() {
        let mut m = Interpreter::new(TextScreen::new(), ScriptedKeyboard::new(Vec::<String>::new()).with_keys(&[65]));
        m.enter_lines(["10 CALL KEY(0,K,S)", "20 PRINT K;S", "30 CALL NOPE", "RUN"]);
        assert_eq!(m.screen().transcript(), " 65  1\n* BAD NAME IN 30\n");
    }
}
