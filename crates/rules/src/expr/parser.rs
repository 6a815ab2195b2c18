//! Recursive descent parser with precedence climbing for binary operators.

use regex::Regex;
use serde_json::Value;

use super::ast::{BinaryOp, Expr, Pattern};
use super::error::ExprError;
use super::lexer::Token;

pub struct Parser<'p> {
    tokens: Vec<Token>,
    position: usize,
    params: &'p [String],
}

impl<'p> Parser<'p> {
    /// `params` are the only free variables the expression may reference;
    /// each is resolved to its position.
    pub fn new(tokens: Vec<Token>, params: &'p [String]) -> Self {
        Self {
            tokens,
            position: 0,
            params,
        }
    }

    /// Parse the whole token stream into one expression.
    pub fn parse(mut self) -> Result<Expr, ExprError> {
        let expr = self.parse_expression()?;
        if self.current_token() != &Token::Eof {
            return Err(ExprError::Parse(format!(
                "unexpected '{}' after end of expression",
                self.current_token()
            )));
        }
        Ok(expr)
    }

    fn current_token(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.current_token() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<(), ExprError> {
        if self.match_token(&expected) {
            Ok(())
        } else {
            Err(ExprError::Parse(format!(
                "expected '{}', found '{}'",
                expected,
                self.current_token()
            )))
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ExprError> {
        self.parse_conditional()
    }

    /// `c ? a : b` and `a ?: b`, both right-associative.
    fn parse_conditional(&mut self) -> Result<Expr, ExprError> {
        let condition = self.parse_binary_expression(0)?;

        if self.match_token(&Token::Question) {
            let then_expr = self.parse_expression()?;
            self.expect_token(Token::Colon)?;
            let else_expr = self.parse_expression()?;
            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            });
        }

        if self.match_token(&Token::Elvis) {
            let fallback = self.parse_expression()?;
            return Ok(Expr::Elvis {
                value: Box::new(condition),
                fallback: Box::new(fallback),
            });
        }

        Ok(condition)
    }

    fn parse_binary_expression(&mut self, min_precedence: u8) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary_expression()?;

        while let Some(precedence) = self.current_token().precedence() {
            if precedence < min_precedence {
                break;
            }
            let op_token = self.current_token().clone();
            self.advance();

            // All binary operators are left-associative.
            let right = self.parse_binary_expression(precedence + 1)?;

            left = match op_token {
                Token::Find => regex_match(left, right, false)?,
                Token::FullMatch => regex_match(left, right, true)?,
                other => Expr::Binary {
                    left: Box::new(left),
                    op: binary_op(&other)?,
                    right: Box::new(right),
                },
            };
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<Expr, ExprError> {
        match self.current_token() {
            Token::Not => {
                self.advance();
                let expr = self.parse_unary_expression()?;
                Ok(Expr::Not(Box::new(expr)))
            }
            Token::Minus => {
                self.advance();
                let expr = self.parse_unary_expression()?;
                Ok(match expr {
                    Expr::Literal(Value::Number(n)) => negate_literal(&n)?,
                    other => Expr::Negate(Box::new(other)),
                })
            }
            _ => self.parse_postfix_expression(),
        }
    }

    /// Property access, method calls and indexing.
    fn parse_postfix_expression(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary_expression()?;

        loop {
            match self.current_token() {
                Token::Dot | Token::SafeDot => {
                    let null_safe = self.current_token() == &Token::SafeDot;
                    self.advance();
                    let Token::Identifier(name) = self.current_token().clone() else {
                        return Err(ExprError::Parse(format!(
                            "expected member name after '.', found '{}'",
                            self.current_token()
                        )));
                    };
                    self.advance();

                    expr = if self.current_token() == &Token::LeftParen {
                        let args = self.parse_call_args()?;
                        Expr::MethodCall {
                            object: Box::new(expr),
                            method: name,
                            args,
                            null_safe,
                        }
                    } else {
                        Expr::Property {
                            object: Box::new(expr),
                            name,
                            null_safe,
                        }
                    };
                }
                Token::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect_token(Token::RightBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary_expression(&mut self) -> Result<Expr, ExprError> {
        match self.current_token().clone() {
            Token::Integer(n) => {
                self.advance();
                Ok(Expr::Literal(Value::from(n)))
            }
            Token::Float(n) => {
                self.advance();
                Ok(Expr::Literal(Value::from(n)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }

            Token::Identifier(name) => {
                self.advance();
                if self.current_token() == &Token::LeftParen {
                    return Err(ExprError::Parse(format!(
                        "unknown function '{name}'; only methods on values are supported"
                    )));
                }
                self.params
                    .iter()
                    .position(|p| *p == name)
                    .map(Expr::Param)
                    .ok_or(ExprError::UnknownVariable(name))
            }

            Token::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_token(Token::RightParen)?;
                Ok(expr)
            }

            Token::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                if self.current_token() != &Token::RightBracket {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect_token(Token::RightBracket)?;
                Ok(Expr::List(elements))
            }

            token => Err(ExprError::Parse(format!("unexpected '{token}'"))),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        self.expect_token(Token::LeftParen)?;
        let mut args = Vec::new();
        if self.current_token() != &Token::RightParen {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect_token(Token::RightParen)?;
        Ok(args)
    }
}

fn binary_op(token: &Token) -> Result<BinaryOp, ExprError> {
    Ok(match token {
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Subtract,
        Token::Star => BinaryOp::Multiply,
        Token::Slash => BinaryOp::Divide,
        Token::Percent => BinaryOp::Modulo,
        Token::Equal => BinaryOp::Equal,
        Token::NotEqual => BinaryOp::NotEqual,
        Token::LessThan => BinaryOp::LessThan,
        Token::LessEqual => BinaryOp::LessEqual,
        Token::GreaterThan => BinaryOp::GreaterThan,
        Token::GreaterEqual => BinaryOp::GreaterEqual,
        Token::In => BinaryOp::In,
        Token::And => BinaryOp::And,
        Token::Or => BinaryOp::Or,
        other => {
            return Err(ExprError::Parse(format!(
                "'{other}' is not a binary operator"
            )))
        }
    })
}

/// Build a regex operator node, compiling literal patterns now.
fn regex_match(subject: Expr, pattern: Expr, full: bool) -> Result<Expr, ExprError> {
    let pattern = match pattern {
        Expr::Literal(Value::String(source)) => {
            Pattern::Static(compile_pattern(&source, full).map_err(|reason| {
                ExprError::InvalidRegex {
                    pattern: source.clone(),
                    reason,
                }
            })?)
        }
        other => Pattern::Dynamic(Box::new(other)),
    };
    Ok(Expr::Match {
        subject: Box::new(subject),
        pattern,
        full,
    })
}

/// Compile a pattern; whole-string patterns are anchored at both ends.
pub(crate) fn compile_pattern(source: &str, full: bool) -> Result<Regex, String> {
    let anchored;
    let source = if full {
        anchored = format!("^(?:{source})$");
        anchored.as_str()
    } else {
        source
    };
    Regex::new(source).map_err(|e| e.to_string())
}

fn negate_literal(n: &serde_json::Number) -> Result<Expr, ExprError> {
    if let Some(i) = n.as_i64() {
        let negated = i
            .checked_neg()
            .ok_or_else(|| ExprError::InvalidNumber(format!("-{i}")))?;
        return Ok(Expr::Literal(Value::from(negated)));
    }
    let f = n.as_f64().unwrap_or(0.0);
    Ok(Expr::Literal(Value::from(-f)))
}
