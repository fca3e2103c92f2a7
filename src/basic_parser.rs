use crate::basic_data::parse_data_items;
use crate::basic_dialect::{MAX_ARRAY_DIMS, MAX_LINE_NUMBER, MIN_LINE_NUMBER};
use crate::basic_expressions::{is_string_name, Expression, LValue, NumericExpr, StringExpr};
use crate::basic_files::{FileOption, OpenMode, OpenOptions};
use crate::basic_function_registry::{ArgType, FUNCTION_REGISTRY};
use crate::basic_lexer::tokenize;
use crate::basic_operators::{relational_op, ArithOp};
use crate::basic_types::{
    ArrayDecl, BasicError, Command, LineNumber, ListRange, ParsedLine, PrintItem, PrintSeparator,
    Statement, Token,
};

/// Parses one line as typed at the prompt or read from a program file.
pub fn parse_line(source: &str) -> Result<ParsedLine, BasicError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_line()
}

/// Parses a line-number operand that arrives as text, as RUN and friends do
/// from the command line.
pub fn parse_line_number_text(text: &str) -> Result<LineNumber, BasicError> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return Err(BasicError::IncorrectStatement);
    }
    let number = text.parse::<u32>().map_err(|_| BasicError::BadLineNumber)?;
    if !(MIN_LINE_NUMBER..=MAX_LINE_NUMBER).contains(&number) {
        return Err(BasicError::BadLineNumber);
    }
    Ok(number as LineNumber)
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, current: 0 }
    }

    /// Ordered choice: a line-numbered form, then a command, then a statement.
    pub fn parse_line(&mut self) -> Result<ParsedLine, BasicError> {
        if self.is_at_end() {
            return Ok(ParsedLine::Empty);
        }

        if let Some(Token::Number(text)) = self.peek() {
            if text.chars().all(|c| c.is_ascii_digit()) {
                let number = text.parse::<u32>().map_err(|_| BasicError::BadLineNumber)?;
                self.advance();
                if self.is_at_end() {
                    return Ok(ParsedLine::Remove(number));
                }
                let statement = self.parse_statement()?;
                self.expect_end()?;
                return Ok(ParsedLine::Store { number, statement });
            }
        }

        let start = self.current;
        match self.parse_command() {
            Ok(Some(command)) if self.is_at_end() => return Ok(ParsedLine::Command(command)),
            Err(BasicError::IncorrectStatement) | Ok(_) => self.current = start,
            Err(e) => return Err(e),
        }

        let statement = self.parse_statement()?;
        self.expect_end()?;
        Ok(ParsedLine::Statement(statement))
    }

    // ===== COMMANDS =====

    fn parse_command(&mut self) -> Result<Option<Command>, BasicError> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Ok(None),
        };
        let command = match token {
            Token::New => {
                self.advance();
                Command::New
            }
            Token::Run => {
                self.advance();
                Command::Run(self.parse_optional_line_ref()?)
            }
            Token::List => {
                self.advance();
                Command::List(self.parse_list_range()?)
            }
            Token::Bye => {
                self.advance();
                Command::Bye
            }
            Token::Num => {
                self.advance();
                let (initial, increment) = self.parse_number_pair()?;
                Command::Number { initial, increment }
            }
            Token::Resequence => {
                self.advance();
                let (initial, increment) = self.parse_number_pair()?;
                Command::Resequence { initial, increment }
            }
            Token::Continue => {
                self.advance();
                Command::Continue
            }
            Token::Break => {
                self.advance();
                let lines = self.parse_line_list()?;
                if lines.is_empty() {
                    return Ok(None);
                }
                Command::Break(lines)
            }
            Token::Unbreak => {
                self.advance();
                Command::Unbreak(self.parse_line_list()?)
            }
            Token::Trace => {
                self.advance();
                Command::Trace
            }
            Token::Untrace => {
                self.advance();
                Command::Untrace
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    fn parse_list_range(&mut self) -> Result<ListRange, BasicError> {
        let mut range = ListRange::default();
        if self.is_at_end() {
            return Ok(range);
        }
        if self.match_any(&[Token::Minus]) {
            range.end = Some(self.parse_line_ref()?);
            return Ok(range);
        }
        let start = self.parse_line_ref()?;
        range.start = Some(start);
        if self.match_any(&[Token::Minus]) {
            range.end = self.parse_optional_line_ref()?;
        } else {
            range.end = Some(start);
        }
        Ok(range)
    }

    fn parse_number_pair(&mut self) -> Result<(Option<u32>, Option<u32>), BasicError> {
        let initial = match self.peek() {
            Some(Token::Number(_)) => Some(self.parse_unsigned()?),
            _ => None,
        };
        let increment = if self.match_any(&[Token::Comma]) {
            Some(self.parse_unsigned()?)
        } else {
            None
        };
        Ok((initial, increment))
    }

    fn parse_unsigned(&mut self) -> Result<u32, BasicError> {
        match self.advance_cloned() {
            Some(Token::Number(text)) if text.chars().all(|c| c.is_ascii_digit()) => {
                text.parse::<u32>().map_err(|_| BasicError::BadLineNumber)
            }
            _ => Err(BasicError::IncorrectStatement),
        }
    }

    // ===== LINE NUMBER OPERANDS =====

    fn parse_line_ref(&mut self) -> Result<LineNumber, BasicError> {
        match self.advance_cloned() {
            Some(Token::Number(text)) => parse_line_number_text(&text),
            _ => Err(BasicError::IncorrectStatement),
        }
    }

    fn parse_optional_line_ref(&mut self) -> Result<Option<LineNumber>, BasicError> {
        match self.peek() {
            Some(Token::Number(_)) => Ok(Some(self.parse_line_ref()?)),
            _ => Ok(None),
        }
    }

    /// Comma-separated line numbers; empty when nothing follows.
    fn parse_line_list(&mut self) -> Result<Vec<LineNumber>, BasicError> {
        let mut lines = Vec::new();
        if self.is_at_end() {
            return Ok(lines);
        }
        lines.push(self.parse_line_ref()?);
        while self.match_any(&[Token::Comma]) {
            lines.push(self.parse_line_ref()?);
        }
        Ok(lines)
    }

    // ===== STATEMENTS =====

    fn parse_statement(&mut self) -> Result<Statement, BasicError> {
        let token = self.peek().cloned().ok_or(BasicError::IncorrectStatement)?;
        match token {
            Token::Let => {
                self.advance();
                self.parse_assignment()
            }
            Token::Identifier(_) => self.parse_assignment(),
            Token::Print => {
                self.advance();
                self.parse_print()
            }
            Token::Input => {
                self.advance();
                self.parse_input()
            }
            Token::If => {
                self.advance();
                self.parse_if()
            }
            Token::For => {
                self.advance();
                self.parse_for()
            }
            Token::Next => {
                self.advance();
                let var = self.parse_numeric_scalar_name()?;
                Ok(Statement::Next { var })
            }
            Token::Goto | Token::Gosub | Token::Go => {
                let is_gosub = self.parse_jump_keyword()?;
                let line = self.parse_line_ref()?;
                Ok(if is_gosub { Statement::Gosub { line } } else { Statement::Goto { line } })
            }
            Token::On => {
                self.advance();
                let selector = self.parse_numeric_expression()?;
                let is_gosub = self.parse_jump_keyword()?;
                let lines = self.parse_line_list()?;
                if lines.is_empty() {
                    return Err(BasicError::IncorrectStatement);
                }
                Ok(if is_gosub {
                    Statement::OnGosub { selector, lines }
                } else {
                    Statement::OnGoto { selector, lines }
                })
            }
            Token::Return => self.keyword_only(Statement::Return),
            Token::End => self.keyword_only(Statement::End),
            Token::Stop => self.keyword_only(Statement::Stop),
            Token::Rem(comment) => {
                self.advance();
                Ok(Statement::Rem { comment })
            }
            Token::Data(text) => {
                self.advance();
                Ok(Statement::Data { values: parse_data_items(&text)? })
            }
            Token::Read => {
                self.advance();
                Ok(Statement::Read { targets: self.parse_lvalue_list()? })
            }
            Token::Restore => {
                self.advance();
                Ok(Statement::Restore { line: self.parse_optional_line_ref()? })
            }
            Token::Randomize => {
                self.advance();
                let seed = if self.is_at_end() { None } else { Some(self.parse_numeric_expression()?) };
                Ok(Statement::Randomize { seed })
            }
            Token::Dim => {
                self.advance();
                self.parse_dim()
            }
            Token::Option => {
                self.advance();
                self.consume(&Token::Base)?;
                match self.advance_cloned() {
                    Some(Token::Number(n)) if n == "0" => Ok(Statement::OptionBase { base: 0 }),
                    Some(Token::Number(n)) if n == "1" => Ok(Statement::OptionBase { base: 1 }),
                    _ => Err(BasicError::IncorrectStatement),
                }
            }
            Token::Def => {
                self.advance();
                self.parse_def()
            }
            Token::Call => {
                self.advance();
                self.parse_call()
            }
            Token::Break => {
                self.advance();
                Ok(Statement::Break { lines: self.parse_line_list()? })
            }
            Token::Unbreak => {
                self.advance();
                Ok(Statement::Unbreak { lines: self.parse_line_list()? })
            }
            Token::Trace => self.keyword_only(Statement::Trace),
            Token::Untrace => self.keyword_only(Statement::Untrace),
            Token::Open => {
                self.advance();
                self.parse_open()
            }
            Token::Close => {
                self.advance();
                let channel = self.parse_channel()?;
                let delete = if self.match_any(&[Token::Colon]) {
                    self.consume(&Token::Delete)?;
                    true
                } else {
                    false
                };
                Ok(Statement::Close { channel, delete })
            }
            Token::Delete => {
                self.advance();
                Ok(Statement::Delete { file: self.parse_string_expression()? })
            }
            _ => Err(BasicError::IncorrectStatement),
        }
    }

    fn keyword_only(&mut self, statement: Statement) -> Result<Statement, BasicError> {
        self.advance();
        Ok(statement)
    }

    /// GOTO, GO TO, GOSUB or GO SUB. Returns true for the GOSUB forms.
    fn parse_jump_keyword(&mut self) -> Result<bool, BasicError> {
        match self.advance_cloned() {
            Some(Token::Goto) => Ok(false),
            Some(Token::Gosub) => Ok(true),
            Some(Token::Go) => match self.advance_cloned() {
                Some(Token::To) => Ok(false),
                Some(Token::Identifier(word)) if word == "SUB" => Ok(true),
                _ => Err(BasicError::IncorrectStatement),
            },
            _ => Err(BasicError::IncorrectStatement),
        }
    }

    fn parse_assignment(&mut self) -> Result<Statement, BasicError> {
        let target = self.parse_lvalue()?;
        self.consume(&Token::Equal)?;
        let value = self.parse_typed_expression(target.is_string())?;
        Ok(Statement::Let { target, value })
    }

    /// An expression of the wanted type running to the end of the line. A
    /// complete expression of the other type is a STRING-NUMBER MISMATCH.
    fn parse_typed_expression(&mut self, want_string: bool) -> Result<Expression, BasicError> {
        let start = self.current;
        let parsed = if want_string {
            self.parse_string_expression().map(Expression::String)
        } else {
            self.parse_numeric_expression().map(Expression::Numeric)
        };
        match parsed {
            Ok(expr) if self.is_at_end() => Ok(expr),
            _ => {
                self.current = start;
                let other = if want_string {
                    self.parse_numeric_expression().map(Expression::Numeric)
                } else {
                    self.parse_string_expression().map(Expression::String)
                };
                match other {
                    Ok(_) if self.is_at_end() => Err(BasicError::StringNumberMismatch),
                    _ => Err(BasicError::IncorrectStatement),
                }
            }
        }
    }

    fn parse_print(&mut self) -> Result<Statement, BasicError> {
        let mut channel = None;
        if self.check(&Token::Hash) {
            channel = Some(self.parse_channel()?);
            if !self.is_at_end() {
                self.consume(&Token::Colon)?;
            }
        }

        let mut items = Vec::new();
        let mut after_value = false;
        while let Some(token) = self.peek().cloned() {
            let separator = match token {
                Token::Comma => Some(PrintSeparator::Comma),
                Token::Semicolon => Some(PrintSeparator::Semicolon),
                Token::Colon => Some(PrintSeparator::Colon),
                _ => None,
            };
            if let Some(separator) = separator {
                self.advance();
                items.push(PrintItem::Separator(separator));
                after_value = false;
                continue;
            }
            if after_value {
                return Err(BasicError::IncorrectStatement);
            }
            if token == Token::Tab {
                self.advance();
                self.consume(&Token::LeftParen)?;
                let column = self.parse_numeric_expression()?;
                self.consume(&Token::RightParen)?;
                items.push(PrintItem::Tab(column));
            } else {
                items.push(PrintItem::Expression(self.parse_print_value()?));
            }
            after_value = true;
        }
        Ok(Statement::Print { channel, items })
    }

    /// A string expression only counts when a separator or the end follows it.
    fn parse_print_value(&mut self) -> Result<Expression, BasicError> {
        let start = self.current;
        if let Ok(text) = self.parse_string_expression() {
            if self.is_at_end() || self.at_print_separator() {
                return Ok(Expression::String(text));
            }
        }
        self.current = start;
        Ok(Expression::Numeric(self.parse_numeric_expression()?))
    }

    fn at_print_separator(&self) -> bool {
        matches!(self.peek(), Some(Token::Comma) | Some(Token::Semicolon) | Some(Token::Colon))
    }

    fn parse_input(&mut self) -> Result<Statement, BasicError> {
        let mut channel = None;
        if self.check(&Token::Hash) {
            channel = Some(self.parse_channel()?);
            self.consume(&Token::Colon)?;
        }

        let start = self.current;
        let prompt = match self.parse_string_expression() {
            Ok(prompt) if self.match_any(&[Token::Colon]) => Some(prompt),
            _ => {
                self.current = start;
                None
            }
        };

        let targets = self.parse_lvalue_list()?;
        Ok(Statement::Input { channel, prompt, targets })
    }

    fn parse_if(&mut self) -> Result<Statement, BasicError> {
        let condition = self.parse_numeric_expression()?;
        self.consume(&Token::Then)?;
        let then_line = self.parse_line_ref()?;
        let else_line = if self.match_any(&[Token::Else]) {
            Some(self.parse_line_ref()?)
        } else {
            None
        };
        Ok(Statement::If { condition, then_line, else_line })
    }

    fn parse_for(&mut self) -> Result<Statement, BasicError> {
        let var = self.parse_numeric_scalar_name()?;
        self.consume(&Token::Equal)?;
        let start = self.parse_numeric_expression()?;
        self.consume(&Token::To)?;
        let limit = self.parse_numeric_expression()?;
        let step = if self.match_any(&[Token::Step]) {
            Some(self.parse_numeric_expression()?)
        } else {
            None
        };
        Ok(Statement::For { var, start, limit, step })
    }

    fn parse_dim(&mut self) -> Result<Statement, BasicError> {
        let mut arrays = Vec::new();
        loop {
            let name = self.parse_identifier()?;
            self.consume(&Token::LeftParen)?;
            let mut bounds = vec![self.parse_bound()?];
            while self.match_any(&[Token::Comma]) {
                bounds.push(self.parse_bound()?);
            }
            self.consume(&Token::RightParen)?;
            if bounds.len() > MAX_ARRAY_DIMS {
                return Err(BasicError::IncorrectStatement);
            }
            arrays.push(ArrayDecl { name, bounds });
            if !self.match_any(&[Token::Comma]) {
                break;
            }
        }
        Ok(Statement::Dim { arrays })
    }

    fn parse_bound(&mut self) -> Result<usize, BasicError> {
        match self.advance_cloned() {
            Some(Token::Number(text)) if text.chars().all(|c| c.is_ascii_digit()) => {
                text.parse::<usize>().map_err(|_| BasicError::BadValue)
            }
            _ => Err(BasicError::IncorrectStatement),
        }
    }

    fn parse_def(&mut self) -> Result<Statement, BasicError> {
        let name = self.parse_identifier()?;
        let param = if self.match_any(&[Token::LeftParen]) {
            let param = self.parse_identifier()?;
            self.consume(&Token::RightParen)?;
            Some(param)
        } else {
            None
        };
        self.consume(&Token::Equal)?;
        let body = self.parse_typed_expression(is_string_name(&name))?;
        Ok(Statement::Def { name, param, body })
    }

    fn parse_call(&mut self) -> Result<Statement, BasicError> {
        let name = self.parse_identifier()?;
        let mut args = Vec::new();
        if self.match_any(&[Token::LeftParen]) {
            loop {
                args.push(self.parse_argument()?);
                if !self.match_any(&[Token::Comma]) {
                    break;
                }
            }
            self.consume(&Token::RightParen)?;
        }
        Ok(Statement::Call { name, args })
    }

    /// An argument of either type, ending at `,` or `)`.
    fn parse_argument(&mut self) -> Result<Expression, BasicError> {
        let start = self.current;
        if let Ok(text) = self.parse_string_expression() {
            if matches!(self.peek(), Some(Token::Comma) | Some(Token::RightParen)) {
                return Ok(Expression::String(text));
            }
        }
        self.current = start;
        Ok(Expression::Numeric(self.parse_numeric_expression()?))
    }

    fn parse_open(&mut self) -> Result<Statement, BasicError> {
        let channel = self.parse_channel()?;
        self.consume(&Token::Colon)?;
        let file = self.parse_string_expression()?;
        let mut options = Vec::new();
        while self.match_any(&[Token::Comma]) {
            let option = match self.advance_cloned() {
                Some(Token::Display) => FileOption::Display,
                Some(Token::Internal) => FileOption::Internal,
                Some(Token::Sequential) => FileOption::Sequential,
                Some(Token::Relative) => FileOption::Relative(self.parse_optional_length()?),
                Some(Token::Fixed) => FileOption::Fixed(self.parse_optional_length()?),
                Some(Token::Variable) => FileOption::Variable(self.parse_optional_length()?),
                Some(Token::Input) => FileOption::Mode(OpenMode::Input),
                Some(Token::Output) => FileOption::Mode(OpenMode::Output),
                Some(Token::Update) => FileOption::Mode(OpenMode::Update),
                Some(Token::Append) => FileOption::Mode(OpenMode::Append),
                Some(Token::Permanent) => FileOption::Permanent,
                _ => return Err(BasicError::IncorrectStatement),
            };
            options.push(option);
        }
        let options = OpenOptions { options };
        options.validate()?;
        Ok(Statement::Open { channel, file, options })
    }

    fn parse_optional_length(&mut self) -> Result<Option<u32>, BasicError> {
        match self.peek() {
            Some(Token::Number(_)) => Ok(Some(self.parse_unsigned()?)),
            _ => Ok(None),
        }
    }

    /// `#` followed by a numeric expression.
    fn parse_channel(&mut self) -> Result<NumericExpr, BasicError> {
        self.consume(&Token::Hash)?;
        self.parse_numeric_expression()
    }

    // ===== TARGETS =====

    fn parse_lvalue(&mut self) -> Result<LValue, BasicError> {
        let name = self.parse_identifier()?;
        let indices = if self.check(&Token::LeftParen) {
            self.parse_indices()?
        } else {
            Vec::new()
        };
        Ok(LValue { name, indices })
    }

    fn parse_lvalue_list(&mut self) -> Result<Vec<LValue>, BasicError> {
        let mut targets = vec![self.parse_lvalue()?];
        while self.match_any(&[Token::Comma]) {
            targets.push(self.parse_lvalue()?);
        }
        Ok(targets)
    }

    fn parse_numeric_scalar_name(&mut self) -> Result<String, BasicError> {
        let name = self.parse_identifier()?;
        if is_string_name(&name) {
            return Err(BasicError::StringNumberMismatch);
        }
        Ok(name)
    }

    /// `( expr [, expr [, expr]] )`
    fn parse_indices(&mut self) -> Result<Vec<NumericExpr>, BasicError> {
        self.consume(&Token::LeftParen)?;
        let mut indices = vec![self.parse_numeric_expression()?];
        while self.match_any(&[Token::Comma]) {
            indices.push(self.parse_numeric_expression()?);
        }
        self.consume(&Token::RightParen)?;
        if indices.len() > MAX_ARRAY_DIMS {
            return Err(BasicError::IncorrectStatement);
        }
        Ok(indices)
    }

    // ===== NUMERIC EXPRESSIONS =====

    pub fn parse_numeric_expression(&mut self) -> Result<NumericExpr, BasicError> {
        self.parse_relational()
    }

    fn parse_relational(&mut self) -> Result<NumericExpr, BasicError> {
        let mut left = self.parse_relational_operand()?;
        while let Some(op) = self.peek().and_then(relational_op) {
            self.advance();
            let right = self.parse_additive()?;
            left = NumericExpr::Compare { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    /// Either `string relop string` or an arithmetic expression.
    fn parse_relational_operand(&mut self) -> Result<NumericExpr, BasicError> {
        let start = self.current;
        if let Ok(left) = self.parse_string_expression() {
            if let Some(op) = self.peek().and_then(relational_op) {
                self.advance();
                if let Ok(right) = self.parse_string_expression() {
                    return Ok(NumericExpr::CompareStrings {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    });
                }
            }
        }
        self.current = start;
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<NumericExpr, BasicError> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = NumericExpr::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<NumericExpr, BasicError> {
        let mut expr = self.parse_power()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Multiply,
                Some(Token::Slash) => ArithOp::Divide,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            expr = NumericExpr::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_power(&mut self) -> Result<NumericExpr, BasicError> {
        let mut expr = self.parse_unary()?;
        while self.match_any(&[Token::Power]) {
            let right = self.parse_unary()?;
            expr = NumericExpr::binary(ArithOp::Power, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<NumericExpr, BasicError> {
        if self.match_any(&[Token::Minus]) {
            let operand = self.parse_unary()?;
            return Ok(NumericExpr::Negate(Box::new(operand)));
        }
        if self.match_any(&[Token::Plus]) {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<NumericExpr, BasicError> {
        match self.peek().cloned() {
            Some(Token::Number(text)) => {
                self.advance();
                text.parse::<f64>().map(NumericExpr::Constant).map_err(|_| BasicError::IncorrectStatement)
            }
            Some(Token::LeftParen) => {
                self.advance();
                let expr = self.parse_numeric_expression()?;
                self.consume(&Token::RightParen)?;
                Ok(expr)
            }
            Some(Token::Identifier(name)) if !is_string_name(&name) => {
                if let Some(call) = self.parse_function_call(&name, ArgType::Number)? {
                    return call.into_numeric();
                }
                self.advance();
                if self.check(&Token::LeftParen) {
                    let indices = self.parse_indices()?;
                    Ok(NumericExpr::Element { name, indices })
                } else {
                    Ok(NumericExpr::Variable(name))
                }
            }
            _ => Err(BasicError::IncorrectStatement),
        }
    }

    /// A built-in call when `name` is a function of the wanted type used in
    /// its full call syntax; `None` leaves the name to be read as a variable.
    fn parse_function_call(&mut self, name: &str, returns: ArgType) -> Result<Option<Expression>, BasicError> {
        let def = match FUNCTION_REGISTRY.get_function(name) {
            Some(def) if def.returns == returns => def,
            _ => return Ok(None),
        };
        if def.arg_types.is_empty() {
            self.advance();
            return def.build(Vec::new()).map(Some);
        }
        if self.tokens.get(self.current + 1) != Some(&Token::LeftParen) {
            return Ok(None);
        }
        self.advance();
        self.advance();

        let mut args = Vec::new();
        for (i, arg_type) in def.arg_types.iter().enumerate() {
            if i > 0 {
                self.consume(&Token::Comma)?;
            }
            let arg = match arg_type {
                ArgType::Number => Expression::Numeric(self.parse_numeric_expression()?),
                ArgType::String => Expression::String(self.parse_string_expression()?),
            };
            args.push(arg);
        }
        self.consume(&Token::RightParen)?;
        def.build(args).map(Some)
    }

    // ===== STRING EXPRESSIONS =====

    pub fn parse_string_expression(&mut self) -> Result<StringExpr, BasicError> {
        let mut expr = self.parse_string_primary()?;
        while self.match_any(&[Token::Ampersand]) {
            let right = self.parse_string_primary()?;
            expr = StringExpr::Concat(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_string_primary(&mut self) -> Result<StringExpr, BasicError> {
        match self.peek().cloned() {
            Some(Token::String(text)) => {
                self.advance();
                Ok(StringExpr::Constant(text))
            }
            Some(Token::LeftParen) => {
                self.advance();
                let expr = self.parse_string_expression()?;
                self.consume(&Token::RightParen)?;
                Ok(expr)
            }
            Some(Token::Identifier(name)) if is_string_name(&name) => {
                if let Some(call) = self.parse_function_call(&name, ArgType::String)? {
                    return call.into_string();
                }
                self.advance();
                if self.check(&Token::LeftParen) {
                    let indices = self.parse_indices()?;
                    Ok(StringExpr::Element { name, indices })
                } else {
                    Ok(StringExpr::Variable(name))
                }
            }
            _ => Err(BasicError::IncorrectStatement),
        }
    }

    // ===== HELPERS =====

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    fn advance_cloned(&mut self) -> Option<Token> {
        let token = self.peek().cloned();
        self.advance();
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek().map_or(false, |t| t == token)
    }

    fn match_any(&mut self, tokens: &[Token]) -> bool {
        for token in tokens {
            if self.check(token) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, token: &Token) -> Result<(), BasicError> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(BasicError::IncorrectStatement)
        }
    }

    fn expect_end(&self) -> Result<(), BasicError> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(BasicError::IncorrectStatement)
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek().is_none()
    }

    fn parse_identifier(&mut self) -> Result<String, BasicError> {
        match self.advance_cloned() {
            Some(Token::Identifier(name)) => Ok(name),
            _ => Err(BasicError::IncorrectStatement),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_data::DataConstant;
    use crate::basic_operators::RelOp;
    use pretty_assertions::assert_eq;

    fn statement(source: &str) -> Statement {
        match parse_line(source).unwrap() {
            ParsedLine::Statement(statement) => statement,
            other => panic!("expected a statement, got {:?}", other),
        }
    }

    fn listed(source: &str) -> String {
        match parse_line(source).unwrap() {
            ParsedLine::Store { statement, .. } | ParsedLine::Statement(statement) => statement.to_string(),
            other => panic!("expected a statement, got {:?}", other),
        }
    }

    #[test]
    fn test_line_forms() {
        assert_eq!(parse_line("   ").unwrap(), ParsedLine::Empty);
        assert_eq!(parse_line("100").unwrap(), ParsedLine::Remove(100));
        assert_eq!(
            parse_line("100 GOTO 200").unwrap(),
            ParsedLine::Store { number: 100, statement: Statement::new_goto(200) }
        );
        assert_eq!(
            parse_line("40000 PRINT").unwrap(),
            ParsedLine::Store { number: 40000, statement: Statement::new_print(vec![]) }
        );
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse_line("RUN").unwrap(), ParsedLine::Command(Command::Run(None)));
        assert_eq!(parse_line("RUN 120").unwrap(), ParsedLine::Command(Command::Run(Some(120))));
        assert_eq!(
            parse_line("LIST 100-").unwrap(),
            ParsedLine::Command(Command::List(ListRange { start: Some(100), end: None }))
        );
        assert_eq!(
            parse_line("LIST -200").unwrap(),
            ParsedLine::Command(Command::List(ListRange { start: None, end: Some(200) }))
        );
        assert_eq!(
            parse_line("RES 20,5").unwrap(),
            ParsedLine::Command(Command::Resequence { initial: Some(20), increment: Some(5) })
        );
        assert_eq!(
            parse_line("NUM ,5").unwrap(),
            ParsedLine::Command(Command::Number { initial: None, increment: Some(5) })
        );
        assert_eq!(parse_line("BREAK 100,110").unwrap(), ParsedLine::Command(Command::Break(vec![100, 110])));
        assert_eq!(parse_line("CON").unwrap(), ParsedLine::Command(Command::Continue));
    }

    #[test]
    fn test_break_without_list_is_a_statement() {
        assert_eq!(statement("BREAK"), Statement::Break { lines: vec![] });
    }

    #[test]
    fn test_bad_line_numbers() {
        assert_eq!(parse_line("GOTO 0"), Err(BasicError::BadLineNumber));
        assert_eq!(parse_line("100 GOSUB 32768"), Err(BasicError::BadLineNumber));
        assert_eq!(parse_line("RUN 99999"), Err(BasicError::BadLineNumber));
        assert_eq!(parse_line("BREAK 10,0"), Err(BasicError::BadLineNumber));
    }

    #[test]
    fn test_assignment() {
        assert_eq!(listed("LET A=1+2*3"), "A=1+2*3");
        assert_eq!(listed("A$=\"X\"&B$"), "A$=\"X\"&B$");
        assert_eq!(listed("B(I,2)=-X^2"), "B(I,2)=-X^2");
        assert_eq!(parse_line("A=\"X\""), Err(BasicError::StringNumberMismatch));
        assert_eq!(parse_line("A$=1"), Err(BasicError::StringNumberMismatch));
        assert_eq!(parse_line("A=+"), Err(BasicError::IncorrectStatement));
    }

    #[test]
    fn test_precedence() {
        let stmt = statement("X=-2^2");
        let expected = NumericExpr::binary(
            ArithOp::Power,
            NumericExpr::Negate(Box::new(NumericExpr::Constant(2.0))),
            NumericExpr::Constant(2.0),
        );
        assert_eq!(stmt, Statement::Let { target: LValue::scalar("X"), value: Expression::Numeric(expected) });
        assert_eq!(listed("X=(1+2)*3"), "X=(1+2)*3");
        assert_eq!(listed("X=8/(4/2)"), "X=8/(4/2)");
        assert_eq!(listed("X=A<B+1"), "X=A<B+1");
    }

    #[test]
    fn test_string_comparison() {
        let stmt = statement("X=A$<\"M\"");
        match stmt {
            Statement::Let { value: Expression::Numeric(NumericExpr::CompareStrings { op, .. }), .. } => {
                assert_eq!(op, RelOp::Less)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_functions() {
        assert_eq!(listed("X=ABS(Y)+LEN(A$)+RND"), "X=ABS(Y)+LEN(A$)+RND");
        assert_eq!(listed("A$=SEG$(B$,1,2)&CHR$(65)&STR$(X)"), "A$=SEG$(B$,1,2)&CHR$(65)&STR$(X)");
        assert_eq!(listed("X=POS(A$,\"B\",1)"), "X=POS(A$,\"B\",1)");
        // Without an argument list a function name is just a variable
        assert_eq!(statement("X=ABS"), Statement::Let {
            target: LValue::scalar("X"),
            value: Expression::Numeric(NumericExpr::Variable("ABS".to_string())),
        });
    }

    #[test]
    fn test_print() {
        let stmt = statement("PRINT \"A\";B,TAB(5);C$:");
        match stmt {
            Statement::Print { channel: None, items } => {
                assert_eq!(items.len(), 8);
                assert_eq!(items[1], PrintItem::Separator(PrintSeparator::Semicolon));
                assert_eq!(items[4], PrintItem::Tab(NumericExpr::Constant(5.0)));
                assert_eq!(items[7], PrintItem::Separator(PrintSeparator::Colon));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(listed("PRINT A$=\"Y\""), "PRINT A$=\"Y\"");
        assert_eq!(parse_line("PRINT A B"), Err(BasicError::IncorrectStatement));
        assert_eq!(listed("PRINT #1:X,Y"), "PRINT #1:X,Y");
    }

    #[test]
    fn test_input() {
        assert_eq!(
            statement("INPUT \"NAME\":N$,A(1)"),
            Statement::Input {
                channel: None,
                prompt: Some(StringExpr::Constant("NAME".to_string())),
                targets: vec![
                    LValue::scalar("N$"),
                    LValue { name: "A".to_string(), indices: vec![NumericExpr::Constant(1.0)] },
                ],
            }
        );
        assert_eq!(
            statement("INPUT A$"),
            Statement::Input { channel: None, prompt: None, targets: vec![LValue::scalar("A$")] }
        );
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(listed("IF A=1 THEN 200 ELSE 300"), "IF A=1 THEN 200 ELSE 300");
        assert_eq!(listed("FOR I=10 TO 1 STEP -1"), "FOR I=10 TO 1 STEP -1");
        assert_eq!(statement("GO TO 100"), Statement::new_goto(100));
        assert_eq!(statement("GO SUB 100"), Statement::new_gosub(100));
        assert_eq!(listed("ON X GO SUB 10,20"), "ON X GOSUB 10,20");
        assert_eq!(parse_line("FOR A$=1 TO 2"), Err(BasicError::StringNumberMismatch));
    }

    #[test]
    fn test_data_and_rem() {
        assert_eq!(
            statement("DATA 12,HELLO"),
            Statement::Data {
                values: vec![
                    DataConstant::Number { value: 12.0, text: "12".to_string() },
                    DataConstant::Bare("HELLO".to_string()),
                ],
            }
        );
        assert_eq!(listed("100 REM  HELLO, WORLD"), "REM HELLO, WORLD");
    }

    #[test]
    fn test_declarations() {
        assert_eq!(listed("DIM A(5),B$(2,3)"), "DIM A(5),B$(2,3)");
        assert_eq!(listed("OPTION BASE 1"), "OPTION BASE 1");
        assert_eq!(parse_line("OPTION BASE 2"), Err(BasicError::IncorrectStatement));
        assert_eq!(listed("DEF F(X)=X*2"), "DEF F(X)=X*2");
        assert_eq!(listed("DEF PI=3.14159"), "DEF PI=3.14159");
        assert_eq!(parse_line("DIM A(1,2,3,4)"), Err(BasicError::IncorrectStatement));
    }

    #[test]
    fn test_call_and_files() {
        assert_eq!(listed("CALL HCHAR(1,1,42,5)"), "CALL HCHAR(1,1,42,5)");
        assert_eq!(listed("CALL CLEAR"), "CALL CLEAR");
        assert_eq!(listed("CALL CHAR(96,\"FF00\")"), "CALL CHAR(96,\"FF00\")");
        assert_eq!(
            listed("OPEN #1:\"DSK1.X\",INTERNAL,OUTPUT,FIXED 64"),
            "OPEN #1:\"DSK1.X\",INTERNAL,OUTPUT,FIXED 64"
        );
        assert_eq!(listed("CLOSE #1:DELETE"), "CLOSE #1:DELETE");
        assert_eq!(listed("DELETE \"DSK1.X\""), "DELETE \"DSK1.X\"");
        assert_eq!(
            parse_line("OPEN #1:\"X\",DISPLAY,INTERNAL"),
            Err(BasicError::IncorrectStatement)
        );
    }

    #[test]
    fn test_subprogram_names_are_variables() {
        assert_eq!(listed("CLEAR=5"), "CLEAR=5");
    }

    #[test]
    fn test_numbers_list_round_trip() {
        assert_eq!(listed("X=1.E+20"), "X=1.E+20");
        assert_eq!(listed("X=.5"), "X=.5");
        assert_eq!(listed("X=1E200"), "X=1.E+200");
    }
}
