use crate::basic_keyword_registry::KEYWORD_REGISTRY;
use crate::basic_types::{BasicError, Token};

/// Splits one source line into tokens.
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
}

pub fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '@' | '[' | ']' | '\\' | '_')
}

pub fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit()
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            chars: input.chars().collect(),
            position: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, BasicError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.current() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '0'..='9' | '.' => {
                    tokens.push(self.read_number()?);
                }
                '"' => {
                    tokens.push(Token::String(self.read_string()?));
                }
                c if is_name_start(c) => {
                    let word = self.read_word();
                    match KEYWORD_REGISTRY.get_token_for_keyword(&word) {
                        Some(Token::Rem(_)) => {
                            let comment = self.rest_of_line();
                            tokens.push(Token::Rem(comment.trim().to_string()));
                        }
                        Some(Token::Data(_)) => {
                            tokens.push(Token::Data(self.rest_of_line()));
                        }
                        Some(keyword) => tokens.push(keyword),
                        None => tokens.push(Token::Identifier(word)),
                    }
                }
                '+' => {
                    tokens.push(Token::Plus);
                    self.advance();
                }
                '-' => {
                    tokens.push(Token::Minus);
                    self.advance();
                }
                '*' => {
                    tokens.push(Token::Star);
                    self.advance();
                }
                '/' => {
                    tokens.push(Token::Slash);
                    self.advance();
                }
                '^' => {
                    tokens.push(Token::Power);
                    self.advance();
                }
                '&' => {
                    tokens.push(Token::Ampersand);
                    self.advance();
                }
                '=' => {
                    tokens.push(Token::Equal);
                    self.advance();
                }
                '<' => {
                    self.advance();
                    match self.current() {
                        Some('=') => {
                            tokens.push(Token::LessEqual);
                            self.advance();
                        }
                        Some('>') => {
                            tokens.push(Token::NotEqual);
                            self.advance();
                        }
                        _ => tokens.push(Token::Less),
                    }
                }
                '>' => {
                    self.advance();
                    if let Some('=') = self.current() {
                        tokens.push(Token::GreaterEqual);
                        self.advance();
                    } else {
                        tokens.push(Token::Greater);
                    }
                }
                '(' => {
                    tokens.push(Token::LeftParen);
                    self.advance();
                }
                ')' => {
                    tokens.push(Token::RightParen);
                    self.advance();
                }
                ',' => {
                    tokens.push(Token::Comma);
                    self.advance();
                }
                ';' => {
                    tokens.push(Token::Semicolon);
                    self.advance();
                }
                ':' => {
                    tokens.push(Token::Colon);
                    self.advance();
                }
                '#' => {
                    tokens.push(Token::Hash);
                    self.advance();
                }
                _ => {
                    tracing::trace!(character = %c, "unexpected character");
                    return Err(BasicError::IncorrectStatement);
                }
            }
        }

        Ok(tokens)
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn take_digits(&mut self, text: &mut String) {
        while let Some(c) = self.current().filter(|c| c.is_ascii_digit()) {
            text.push(c);
            self.advance();
        }
    }

    /// Mantissa `digits[.digits]` or `.digits`, then an exponent only when
    /// digits actually follow the `E`.
    fn read_number(&mut self) -> Result<Token, BasicError> {
        let mut number = String::new();
        self.take_digits(&mut number);
        if self.current() == Some('.') {
            number.push('.');
            self.advance();
            self.take_digits(&mut number);
        }
        if number == "." {
            return Err(BasicError::IncorrectStatement);
        }

        if self.current() == Some('E') {
            let digits_at = match self.peek(1) {
                Some('+') | Some('-') => 2,
                _ => 1,
            };
            if self.peek(digits_at).map_or(false, |c| c.is_ascii_digit()) {
                for _ in 0..digits_at {
                    if let Some(c) = self.current() {
                        number.push(c);
                    }
                    self.advance();
                }
                self.take_digits(&mut number);
            }
        }

        Ok(Token::Number(number))
    }

    fn read_string(&mut self) -> Result<String, BasicError> {
        let mut string = String::new();
        self.advance(); // Skip opening quote

        loop {
            match self.current() {
                Some('"') if self.peek(1) == Some('"') => {
                    string.push('"');
                    self.advance();
                    self.advance();
                }
                Some('"') => {
                    self.advance();
                    return Ok(string);
                }
                Some(c) => {
                    string.push(c);
                    self.advance();
                }
                None => return Err(BasicError::IncorrectStatement),
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.current().filter(|c| is_name_char(*c)) {
            word.push(c);
            self.advance();
        }
        if self.current() == Some('$') {
            word.push('$');
            self.advance();
        }
        word
    }

    fn rest_of_line(&mut self) -> String {
        let rest: String = self.chars[self.position..].iter().collect();
        self.position = self.chars.len();
        rest
    }
}

/// Convenience wrapper used by the parser and tests.
pub fn tokenize(input: &str) -> Result<Vec<Token>, BasicError> {
    Lexer::new(input).tokenize()
}
