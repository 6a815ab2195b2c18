//! Tokenizer for rule expressions.

use std::fmt;

use super::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Integer(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,

    Identifier(String),
    In,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    /// `=~`
    Find,
    /// `==~`
    FullMatch,

    // Logical
    And,
    Or,
    Not,

    // Punctuation
    Question,
    Elvis,
    Colon,
    Dot,
    SafeDot,
    Comma,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,

    Eof,
}

impl Token {
    /// Binding power of a binary operator; `None` for anything else.
    pub fn precedence(&self) -> Option<u8> {
        match self {
            Token::Or => Some(1),
            Token::And => Some(2),
            Token::Equal | Token::NotEqual | Token::Find | Token::FullMatch => Some(3),
            Token::LessThan
            | Token::LessEqual
            | Token::GreaterThan
            | Token::GreaterEqual
            | Token::In => Some(4),
            Token::Plus | Token::Minus => Some(5),
            Token::Star | Token::Slash | Token::Percent => Some(6),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{n}"),
            Token::Float(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "'{s}'"),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::Null => f.write_str("null"),
            Token::Identifier(name) => f.write_str(name),
            Token::In => f.write_str("in"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Equal => f.write_str("=="),
            Token::NotEqual => f.write_str("!="),
            Token::LessThan => f.write_str("<"),
            Token::LessEqual => f.write_str("<="),
            Token::GreaterThan => f.write_str(">"),
            Token::GreaterEqual => f.write_str(">="),
            Token::Find => f.write_str("=~"),
            Token::FullMatch => f.write_str("==~"),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Not => f.write_str("!"),
            Token::Question => f.write_str("?"),
            Token::Elvis => f.write_str("?:"),
            Token::Colon => f.write_str(":"),
            Token::Dot => f.write_str("."),
            Token::SafeDot => f.write_str("?."),
            Token::Comma => f.write_str(","),
            Token::LeftParen => f.write_str("("),
            Token::RightParen => f.write_str(")"),
            Token::LeftBracket => f.write_str("["),
            Token::RightBracket => f.write_str("]"),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    last: Option<Token>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
            last: None,
        }
    }

    /// Tokenize the whole input. The last token is always [`Token::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::with_capacity((self.chars.len() / 4).max(8));
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.current().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    /// Consume `len` characters and yield `token`.
    fn take(&mut self, len: usize, token: Token) -> Token {
        self.position += len;
        token
    }

    fn lookahead_is(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.position + i) == Some(&c))
    }

    /// A `/` right after a regex operator opens a slashy pattern literal.
    fn regex_context(&self) -> bool {
        matches!(self.last, Some(Token::Find | Token::FullMatch))
    }

    fn next_token(&mut self) -> Result<Token, ExprError> {
        self.skip_whitespace();
        let start = self.position;

        let Some(ch) = self.current() else {
            return Ok(Token::Eof);
        };

        let token = match ch {
            '(' => self.take(1, Token::LeftParen),
            ')' => self.take(1, Token::RightParen),
            '[' => self.take(1, Token::LeftBracket),
            ']' => self.take(1, Token::RightBracket),
            ',' => self.take(1, Token::Comma),
            ':' => self.take(1, Token::Colon),
            '.' => self.take(1, Token::Dot),
            '?' => match self.peek() {
                Some('.') => self.take(2, Token::SafeDot),
                Some(':') => self.take(2, Token::Elvis),
                _ => self.take(1, Token::Question),
            },

            '+' => self.take(1, Token::Plus),
            '-' => self.take(1, Token::Minus),
            '*' => self.take(1, Token::Star),
            '%' => self.take(1, Token::Percent),
            '/' if self.regex_context() => self.read_slashy(start)?,
            '/' => self.take(1, Token::Slash),

            '=' if self.lookahead_is("==~") => self.take(3, Token::FullMatch),
            '=' if self.peek() == Some('=') => self.take(2, Token::Equal),
            '=' if self.peek() == Some('~') => self.take(2, Token::Find),
            '!' if self.peek() == Some('=') => self.take(2, Token::NotEqual),
            '!' => self.take(1, Token::Not),
            '<' if self.peek() == Some('=') => self.take(2, Token::LessEqual),
            '<' => self.take(1, Token::LessThan),
            '>' if self.peek() == Some('=') => self.take(2, Token::GreaterEqual),
            '>' => self.take(1, Token::GreaterThan),
            '&' if self.peek() == Some('&') => self.take(2, Token::And),
            '|' if self.peek() == Some('|') => self.take(2, Token::Or),

            '\'' | '"' => self.read_string(ch, start)?,
            c if c.is_ascii_digit() => self.read_number()?,
            c if c.is_alphabetic() || c == '_' => self.read_word(),

            other => {
                return Err(ExprError::UnexpectedChar {
                    found: other,
                    position: start,
                })
            }
        };

        self.last = Some(token.clone());
        Ok(token)
    }

    fn read_string(&mut self, quote: char, start: usize) -> Result<Token, ExprError> {
        self.advance();
        let mut out = String::new();
        loop {
            match self.current() {
                None => return Err(ExprError::UnterminatedString(start)),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(Token::Str(out));
                }
                Some('\\') => {
                    self.advance();
                    let Some(escaped) = self.current() else {
                        return Err(ExprError::UnterminatedString(start));
                    };
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        // Unknown escapes are kept so regex classes like \d survive.
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                    self.advance();
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
    }

    /// `/pattern/`: only `\/` is an escape, everything else is kept verbatim.
    fn read_slashy(&mut self, start: usize) -> Result<Token, ExprError> {
        self.advance();
        let mut out = String::new();
        loop {
            match self.current() {
                None => return Err(ExprError::UnterminatedString(start)),
                Some('/') => {
                    self.advance();
                    return Ok(Token::Str(out));
                }
                Some('\\') if self.peek() == Some('/') => {
                    out.push('/');
                    self.position += 2;
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, ExprError> {
        let start = self.position;
        while self.current().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        let is_float = self.current() == Some('.') && self.peek().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.advance();
            while self.current().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text: String = self.chars[start..self.position].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ExprError::InvalidNumber(text))
        } else {
            text.parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| ExprError::InvalidNumber(text))
        }
    }

    fn read_word(&mut self) -> Token {
        let start = self.position;
        while self
            .current()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let word: String = self.chars[start..self.position].iter().collect();
        match word.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "in" => Token::In,
            _ => Token::Identifier(word),
        }
    }
}
