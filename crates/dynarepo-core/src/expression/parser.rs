//! Tokenizer and recursive-descent parser for condition expressions.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use super::ast::{Comparator, Condition, Function, Operand};

/// Errors produced while parsing or evaluating a condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },
    #[error("the expression can not be empty")]
    Empty,
    #[error("{function} takes {expected} argument(s), got {actual}")]
    Arity {
        function: Function,
        expected: usize,
        actual: usize,
    },
    #[error("value {name} not found in expression attribute values")]
    UnresolvedValue { name: String },
    #[error("invalid operand for {operation}: {message}")]
    InvalidOperand { operation: String, message: String },
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Param(String),
    Cmp(Comparator),
    LParen,
    RParen,
    Comma,
    Dot,
    Eof,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "'{w}'"),
            Self::Param(p) => write!(f, "'{p}'"),
            Self::Cmp(op) => write!(f, "'{op}'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Comma => f.write_str("','"),
            Self::Dot => f.write_str("'.'"),
            Self::Eof => f.write_str("end of expression"),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut chars = input.char_indices().peekable();
    let mut tokens = Vec::new();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_ascii_whitespace() {
            chars.next();
            continue;
        }
        let token = match c {
            '(' | ')' | ',' | '.' | '=' => {
                chars.next();
                match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    _ => Token::Cmp(Comparator::Eq),
                }
            }
            '<' => {
                chars.next();
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    Token::Cmp(Comparator::Le)
                } else if chars.next_if(|&(_, n)| n == '>').is_some() {
                    Token::Cmp(Comparator::Ne)
                } else {
                    Token::Cmp(Comparator::Lt)
                }
            }
            '>' => {
                chars.next();
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    Token::Cmp(Comparator::Ge)
                } else {
                    Token::Cmp(Comparator::Gt)
                }
            }
            ':' => {
                chars.next();
                let name = take_word(&mut chars);
                if name.is_empty() {
                    return Err(ExpressionError::UnexpectedToken {
                        expected: "parameter name after ':'".to_owned(),
                        found: "nothing".to_owned(),
                    });
                }
                Token::Param(format!(":{name}"))
            }
            c if is_word_char(c) => Token::Word(take_word(&mut chars)),
            found => return Err(ExpressionError::UnexpectedChar { found, offset }),
        };
        tokens.push(token);
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn take_word(chars: &mut Peekable<CharIndices<'_>>) -> String {
    let mut word = String::new();
    while let Some((_, c)) = chars.next_if(|&(_, c)| is_word_char(c)) {
        word.push(c);
    }
    word
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        let found = self.bump();
        if found == *expected {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken {
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Condition, ExpressionError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            left = Condition::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Condition, ExpressionError> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            left = Condition::And(Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Condition, ExpressionError> {
        if self.eat_keyword("not") {
            return Ok(Condition::Not(Box::new(self.not()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Condition, ExpressionError> {
        if *self.peek() == Token::LParen {
            self.pos += 1;
            let inner = self.or()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        let function = match (self.peek(), self.tokens.get(self.pos + 1)) {
            (Token::Word(w), Some(Token::LParen)) => Function::from_keyword(w),
            _ => None,
        };
        if let Some(function) = function {
            return self.call(function);
        }

        let left = self.operand()?;
        if self.eat_keyword("between") {
            let low = self.operand()?;
            if !self.eat_keyword("and") {
                return Err(ExpressionError::UnexpectedToken {
                    expected: "AND".to_owned(),
                    found: self.peek().to_string(),
                });
            }
            let high = self.operand()?;
            return Ok(Condition::Between {
                value: left,
                low,
                high,
            });
        }

        match self.bump() {
            Token::Cmp(op) => Ok(Condition::Compare {
                left,
                op,
                right: self.operand()?,
            }),
            other => Err(ExpressionError::UnexpectedToken {
                expected: "comparison operator or BETWEEN".to_owned(),
                found: other.to_string(),
            }),
        }
    }

    fn call(&mut self, function: Function) -> Result<Condition, ExpressionError> {
        self.pos += 1; // name
        self.expect(&Token::LParen)?;
        let mut args = vec![self.operand()?];
        while *self.peek() == Token::Comma {
            self.pos += 1;
            args.push(self.operand()?);
        }
        self.expect(&Token::RParen)?;

        if args.len() != function.arity() {
            return Err(ExpressionError::Arity {
                function,
                expected: function.arity(),
                actual: args.len(),
            });
        }
        Ok(Condition::Call { function, args })
    }

    fn operand(&mut self) -> Result<Operand, ExpressionError> {
        match self.bump() {
            Token::Param(name) => Ok(Operand::Param(name)),
            Token::Word(first) if !is_reserved(&first) => {
                let mut segments = vec![first];
                while *self.peek() == Token::Dot {
                    self.pos += 1;
                    match self.bump() {
                        Token::Word(next) => segments.push(next),
                        other => {
                            return Err(ExpressionError::UnexpectedToken {
                                expected: "attribute name after '.'".to_owned(),
                                found: other.to_string(),
                            });
                        }
                    }
                }
                Ok(Operand::Path(segments))
            }
            other => Err(ExpressionError::UnexpectedToken {
                expected: "attribute name or parameter".to_owned(),
                found: other.to_string(),
            }),
        }
    }
}

fn is_reserved(word: &str) -> bool {
    ["and", "or", "not", "between"]
        .iter()
        .any(|k| word.eq_ignore_ascii_case(k))
}

/// Parse a key condition or filter expression.
pub fn parse_condition(input: &str) -> Result<Condition, ExpressionError> {
    if input.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let condition = parser.or()?;
    match parser.peek() {
        Token::Eof => Ok(condition),
        trailing => Err(ExpressionError::UnexpectedToken {
            expected: "end of expression".to_owned(),
            found: trailing.to_string(),
        }),
    }
}
