//! Reader for lambda-term logical forms.
//!
//! Terms are written as s-expressions:
//!
//! ```text
//! rex
//! (bark rex)
//! (lambda $0 (lambda $1 (see $1 $0)))
//! ```
//!
//! Variables start with `$` and must be bound by an enclosing `lambda`.
//! Any other run of non-space, non-parenthesis characters is a constant.
//!
//! # Example
//!
//! ```rust
//! use ccg_chart::reader::read_term;
//!
//! let term = read_term("(lambda $x (dog $x))").unwrap();
//! assert_eq!(term.to_string(), "(lambda $0 (dog $0))");
//! ```

use crate::term::{Term, VarId};
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

/// Reader error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected character: {0}")]
    UnexpectedChar(char),
    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    #[error("trailing input after term: {0}")]
    TrailingInput(String),
}

/// Result type for reading operations.
pub type ReadResult<T> = Result<T, ReadError>;

const LAMBDA: &str = "lambda";

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Var(String),
    Ident(String),
    Eof,
}

struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.input.next();
        }
    }

    fn read_atom(&mut self) -> String {
        let mut result = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            result.push(c);
            self.input.next();
        }
        result
    }

    fn next_token(&mut self) -> ReadResult<Token> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(Token::Eof),
            Some('(') => {
                self.input.next();
                Ok(Token::LParen)
            }
            Some(')') => {
                self.input.next();
                Ok(Token::RParen)
            }
            Some('$') => {
                let name = self.read_atom();
                if name.len() == 1 {
                    return Err(ReadError::UnexpectedChar('$'));
                }
                Ok(Token::Var(name))
            }
            Some(_) => Ok(Token::Ident(self.read_atom())),
        }
    }
}

/// Recursive-descent reader for lambda terms.
pub struct Reader<'a> {
    lexer: Lexer<'a>,
    current: Token,
    scope: Vec<(String, VarId)>,
    next_var: VarId,
}

impl<'a> Reader<'a> {
    /// Create a new reader for the given input.
    pub fn new(input: &'a str) -> ReadResult<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Reader {
            lexer,
            current,
            scope: Vec::new(),
            next_var: 0,
        })
    }

    fn advance(&mut self) -> ReadResult<Token> {
        let prev = std::mem::replace(&mut self.current, self.lexer.next_token()?);
        Ok(prev)
    }

    fn expect(&mut self, expected: Token) -> ReadResult<()> {
        if self.current == expected {
            self.advance()?;
            Ok(())
        } else if self.current == Token::Eof {
            Err(ReadError::UnexpectedEof)
        } else {
            Err(ReadError::Expected {
                expected: format!("{:?}", expected),
                found: format!("{:?}", self.current),
            })
        }
    }

    fn lookup(&self, name: &str) -> ReadResult<VarId> {
        self.scope
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
            .ok_or_else(|| ReadError::UnboundVariable(name.to_string()))
    }

    /// Read one complete term and require that nothing follows it.
    pub fn read_complete(&mut self) -> ReadResult<Term> {
        let term = self.read()?;
        match &self.current {
            Token::Eof => Ok(term),
            other => Err(ReadError::TrailingInput(format!("{:?}", other))),
        }
    }

    /// Read a single term.
    pub fn read(&mut self) -> ReadResult<Term> {
        match self.advance()? {
            Token::Eof => Err(ReadError::UnexpectedEof),
            Token::RParen => Err(ReadError::UnexpectedChar(')')),
            Token::Var(name) => Ok(Term::Var(self.lookup(&name)?)),
            Token::Ident(name) => Ok(Term::constant(name)),
            Token::LParen => {
                if matches!(&self.current, Token::Ident(name) if name == LAMBDA) {
                    self.advance()?;
                    self.read_lambda()
                } else {
                    self.read_application()
                }
            }
        }
    }

    fn read_lambda(&mut self) -> ReadResult<Term> {
        let name = match self.advance()? {
            Token::Var(name) => name,
            Token::Eof => return Err(ReadError::UnexpectedEof),
            other => {
                return Err(ReadError::Expected {
                    expected: "variable".to_string(),
                    found: format!("{:?}", other),
                })
            }
        };
        let id = self.next_var;
        self.next_var += 1;
        self.scope.push((name, id));
        let body = self.read();
        self.scope.pop();
        let body = body?;
        self.expect(Token::RParen)?;
        Ok(Term::lambda(id, body))
    }

    fn read_application(&mut self) -> ReadResult<Term> {
        let functor = self.read()?;
        let mut args = Vec::new();
        loop {
            match &self.current {
                Token::RParen => {
                    self.advance()?;
                    break;
                }
                Token::Eof => return Err(ReadError::UnexpectedEof),
                _ => args.push(self.read()?),
            }
        }
        if args.is_empty() {
            return Err(ReadError::Expected {
                expected: "argument".to_string(),
                found: "RParen".to_string(),
            });
        }
        Ok(Term::app(functor, args))
    }
}

/// Read a closed term from a string.
pub fn read_term(input: &str) -> ReadResult<Term> {
    Reader::new(input)?.read_complete()
}
