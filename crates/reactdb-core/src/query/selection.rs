//! Parser for inline selection text.
//!
//! A selection is a small where-clause with positional `?` placeholders:
//!
//! ```text
//! name = ? AND (age >= ? OR vip = true) AND email IS NOT NULL
//! ```
//!
//! Keywords are case-insensitive. AND binds tighter than OR.

use logos::Logos;
use serde_json::Value;

use super::filter::{CompareOp, Filter};
use crate::error::Error;

/// Deepest parenthesis nesting accepted in a selection.
const MAX_NESTING: usize = 64;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token {
    #[token("and", ignore(ascii_case))]
    And,
    #[token("or", ignore(ascii_case))]
    Or,
    #[token("is", ignore(ascii_case))]
    Is,
    #[token("not", ignore(ascii_case))]
    Not,
    #[token("null", ignore(ascii_case))]
    Null,
    #[token("true", ignore(ascii_case))]
    True,
    #[token("false", ignore(ascii_case))]
    False,

    #[token("=")]
    Eq,
    #[token("!=")]
    #[token("<>")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    #[token("?")]
    Placeholder,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"'([^'\\]|\\.)*'", |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].replace("\\'", "'")
    })]
    Text(String),

    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),
}

/// Parse `selection` into a [`Filter`], binding `args` to its placeholders in
/// order. The number of arguments must equal the number of placeholders.
pub fn parse_selection(selection: &str, args: &[&str]) -> Result<Filter, Error> {
    let mut tokens = Vec::new();
    for (token, span) in Token::lexer(selection).spanned() {
        match token {
            Ok(token) => tokens.push(token),
            Err(()) => {
                return Err(Error::InvalidSelection(format!(
                    "unexpected character at offset {}",
                    span.start
                )))
            }
        }
    }

    let mut parser = SelectionParser {
        tokens,
        pos: 0,
        args,
        next_arg: 0,
        depth: 0,
    };
    let filter = parser.parse_or()?;

    if let Some(token) = parser.tokens.get(parser.pos) {
        return Err(Error::InvalidSelection(format!(
            "unexpected trailing token {token:?}"
        )));
    }
    if parser.next_arg != args.len() {
        return Err(Error::InvalidSelection(format!(
            "{} arguments supplied for {} placeholders",
            args.len(),
            parser.next_arg
        )));
    }
    Ok(filter)
}

struct SelectionParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    args: &'a [&'a str],
    next_arg: usize,
    depth: usize,
}

impl SelectionParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, Error> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| Error::InvalidSelection("unexpected end of selection".into()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), Error> {
        let token = self.next()?;
        if token != expected {
            return Err(Error::InvalidSelection(format!(
                "expected {expected:?}, found {token:?}"
            )));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Filter, Error> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = left.or(right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Filter, Error> {
        let mut left = self.parse_primary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_primary()?;
            left = left.and(right);
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Filter, Error> {
        let field = match self.next()? {
            Token::LParen => {
                if self.depth == MAX_NESTING {
                    return Err(Error::InvalidSelection(format!(
                        "parentheses nested deeper than {MAX_NESTING}"
                    )));
                }
                self.depth += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                return Ok(inner);
            }
            Token::Ident(field) => field,
            other => {
                return Err(Error::InvalidSelection(format!(
                    "expected field name, found {other:?}"
                )))
            }
        };

        let op = match self.next()? {
            Token::Is => {
                return if self.peek() == Some(&Token::Not) {
                    self.pos += 1;
                    self.expect(Token::Null)?;
                    Ok(Filter::IsNotNull(field))
                } else {
                    self.expect(Token::Null)?;
                    Ok(Filter::IsNull(field))
                };
            }
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            other => {
                return Err(Error::InvalidSelection(format!(
                    "expected operator after {field}, found {other:?}"
                )))
            }
        };

        let value = self.parse_operand()?;
        Ok(Filter::Compare { field, op, value })
    }

    fn parse_operand(&mut self) -> Result<Value, Error> {
        match self.next()? {
            Token::Placeholder => {
                let arg = self.args.get(self.next_arg).ok_or_else(|| {
                    Error::InvalidSelection(format!("missing argument {}", self.next_arg + 1))
                })?;
                self.next_arg += 1;
                Ok(Value::String((*arg).to_string()))
            }
            Token::Text(text) => Ok(Value::String(text)),
            Token::True => Ok(Value::Bool(true)),
            Token::False => Ok(Value::Bool(false)),
            Token::Number(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::InvalidSelection(format!("bad number {raw}: {e}"))),
            other => Err(Error::InvalidSelection(format!(
                "expected value, found {other:?}"
            ))),
        }
    }
}
