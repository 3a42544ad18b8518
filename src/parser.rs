//! The parser: tokens to an abstract syntax tree.
//!
//! Single-pass recursive descent with one token of lookahead. The parser
//! never aborts: unexpected input is recorded in a diagnostics list and the
//! token is consumed so progress is always made. Callers inspect
//! [`Parser::errors`] (or use the crate-level [`crate::parse`], which fails
//! when any diagnostic was recorded).

use crate::ast::{Expression, Program};
use crate::lexer::lex;
use crate::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<String>,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser {
            tokens: lex(source),
            position: 0,
            errors: Vec::new(),
        }
    }

    /// Diagnostics collected so far, in source order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn cur(&self) -> &Token {
        // The lexer guarantees a trailing Eof and `advance` never moves past
        // it, so the index is always in bounds.
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        if self.cur().kind != TokenKind::Eof {
            self.position += 1;
        }
    }

    /// Parse the ordered sequence of top-level expressions until Eof.
    pub fn parse_program(&mut self) -> Program {
        let mut expressions = Vec::new();

        while self.cur().kind != TokenKind::Eof {
            if let Some(expr) = self.parse_expression() {
                expressions.push(expr);
            }
        }

        Program { expressions }
    }

    /// Parse one expression. Returns `None` when the current token cannot
    /// begin an expression; a diagnostic has been recorded and the token
    /// consumed. Afterwards the current token is the first token beyond the
    /// expression.
    fn parse_expression(&mut self) -> Option<Expression> {
        match self.cur().kind {
            TokenKind::Num => {
                let literal = self.cur().literal.clone();
                self.advance();
                match literal.parse::<f64>() {
                    Ok(value) => Some(Expression::Float(value)),
                    Err(_) => {
                        self.errors.push(format!("{literal} is invalid number"));
                        None
                    }
                }
            }
            TokenKind::Str => {
                let literal = self.cur().literal.clone();
                self.advance();
                Some(Expression::Str(literal))
            }
            TokenKind::Ident => {
                let literal = self.cur().literal.clone();
                self.advance();
                Some(Expression::Ident(literal))
            }
            TokenKind::LParen => self.parse_s_expression(),
            TokenKind::LBrace => self.parse_dict_literal(),
            TokenKind::Quote => self.parse_quote_expression(),
            TokenKind::Illegal => {
                let literal = self.cur().literal.clone();
                self.errors.push(literal);
                self.advance();
                None
            }
            TokenKind::Eof => None,
            // A stray closer; report it and move on.
            TokenKind::RParen | TokenKind::RBrace => {
                let literal = self.cur().literal.clone();
                self.errors.push(format!("unexpected token: {literal}"));
                self.advance();
                None
            }
        }
    }

    /// `(f a b c)`, `(f)`, or the empty form `()`.
    fn parse_s_expression(&mut self) -> Option<Expression> {
        self.advance();

        if self.cur().kind == TokenKind::RParen {
            self.advance();
            return Some(Expression::SExpression {
                func: None,
                args: vec![],
            });
        }

        let func = self.parse_expression().map(Box::new);
        let args = self.parse_sequence_until(TokenKind::RParen, "Reached EOF before ')'");

        Some(Expression::SExpression { func, args })
    }

    /// `{ k v ... }` desugars into `(dict k v ...)`.
    fn parse_dict_literal(&mut self) -> Option<Expression> {
        self.advance();

        let func = Some(Box::new(Expression::Ident("dict".to_string())));
        let args = self.parse_sequence_until(TokenKind::RBrace, "Reached EOF before '}'");

        Some(Expression::SExpression { func, args })
    }

    /// `'(a b c)` desugars into `(list a b c)`. The quote must be followed
    /// by an opening parenthesis.
    fn parse_quote_expression(&mut self) -> Option<Expression> {
        self.advance();

        if self.cur().kind != TokenKind::LParen {
            self.errors.push("' not followed by (".to_string());
            // Leave the offending token for the next parse round.
            return Some(Expression::SExpression {
                func: None,
                args: vec![],
            });
        }
        self.advance();

        let func = Some(Box::new(Expression::Ident("list".to_string())));
        let args = self.parse_sequence_until(TokenKind::RParen, "Reached EOF before ')'");

        Some(Expression::SExpression { func, args })
    }

    /// Parse expressions until the closing token, which is consumed. Hitting
    /// Eof first records `eof_message` and returns what was gathered.
    fn parse_sequence_until(&mut self, closer: TokenKind, eof_message: &str) -> Vec<Expression> {
        let mut args = Vec::new();

        while self.cur().kind != closer {
            if self.cur().kind == TokenKind::Eof {
                self.errors.push(eof_message.to_string());
                return args;
            }
            if let Some(expr) = self.parse_expression() {
                args.push(expr);
            }
        }

        self.advance();
        args
    }
}
