use std::{iter::Peekable, slice::Iter};

use stork_syntax::op::BinOp;

use super::lex::HostToken;
use crate::{
    error::{host_error, ErrorMsg, Exception},
    types::Value,
};

const RESERVED: [&str; 10] = [
    "if", "else", "and", "or", "not", "True", "False", "None", "raise", "assert",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HostExpr {
    Literal(Value),
    Name(String),
    List(Vec<HostExpr>),
    Negate(Box<HostExpr>),
    Not(Box<HostExpr>),
    Binary {
        lhs: Box<HostExpr>,
        op: BinOp,
        rhs: Box<HostExpr>,
    },
    Logical {
        lhs: Box<HostExpr>,
        op: LogicalOp,
        rhs: Box<HostExpr>,
    },
    Conditional {
        condition: Box<HostExpr>,
        then: Box<HostExpr>,
        otherwise: Box<HostExpr>,
    },
    Call {
        func: Box<HostExpr>,
        args: Vec<HostExpr>,
    },
    Index {
        object: Box<HostExpr>,
        index: Box<HostExpr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum HostStmt {
    Expr(HostExpr),
    Raise {
        name: String,
        args: Vec<HostExpr>,
    },
    Assert {
        condition: HostExpr,
        message: Option<HostExpr>,
    },
}

// Nested expressions deeper than this are rejected
const MAX_DEPTH: usize = 100;

#[derive(Debug)]
pub struct HostParser<'a> {
    stream: Peekable<Iter<'a, HostToken>>,
    depth: usize,
}

impl<'a> HostParser<'a> {
    pub fn new(stream: &'a [HostToken]) -> Self {
        Self {
            stream: stream.iter().peekable(),
            depth: 0,
        }
    }

    pub fn parse_program(mut self) -> Result<Vec<HostStmt>, Exception> {
        let mut stmts = Vec::default();
        loop {
            while self.advance_if(|t| *t == HostToken::Separator).is_some() {}
            if self.stream.peek().is_none() {
                break;
            }
            stmts.push(self.parse_stmt()?);
            match self.stream.peek() {
                None | Some(HostToken::Separator) => (),
                Some(&t) => return Err(Self::error(t)),
            }
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<HostStmt, Exception> {
        if self.advance_if_name("raise") {
            let name = match self.advance() {
                Some(HostToken::Name(name)) => name.clone(),
                Some(t) => return Err(Self::error(t)),
                None => return Err(Self::eof_error()),
            };
            let args = if self.advance_if(|t| *t == HostToken::LParen).is_some() {
                self.parse_args(HostToken::RParen)?
            } else {
                vec![]
            };
            return Ok(HostStmt::Raise { name, args });
        }
        if self.advance_if_name("assert") {
            let condition = self.parse_expr()?;
            let message = if self.advance_if(|t| *t == HostToken::Comma).is_some() {
                Some(self.parse_expr()?)
            } else {
                None
            };
            return Ok(HostStmt::Assert { condition, message });
        }
        Ok(HostStmt::Expr(self.parse_expr()?))
    }

    pub fn parse_expr(&mut self) -> Result<HostExpr, Exception> {
        self.enter()?;
        let expr = self.parse_conditional();
        self.depth -= 1;
        expr
    }

    fn parse_conditional(&mut self) -> Result<HostExpr, Exception> {
        let then = self.parse_logical_or()?;
        if !self.advance_if_name("if") {
            return Ok(then);
        }
        let condition = self.parse_logical_or()?;
        if !self.advance_if_name("else") {
            return Err(self.peek_error());
        }
        let otherwise = self.parse_expr()?;
        Ok(HostExpr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_logical_or(&mut self) -> Result<HostExpr, Exception> {
        let mut lhs = self.parse_logical_and()?;
        while self.advance_if_name("or") {
            let rhs = self.parse_logical_and()?;
            lhs = HostExpr::Logical {
                lhs: Box::new(lhs),
                op: LogicalOp::Or,
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<HostExpr, Exception> {
        let mut lhs = self.parse_not()?;
        while self.advance_if_name("and") {
            let rhs = self.parse_not()?;
            lhs = HostExpr::Logical {
                lhs: Box::new(lhs),
                op: LogicalOp::And,
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<HostExpr, Exception> {
        if self.advance_if_name("not") {
            self.enter()?;
            let operand = self.parse_not();
            self.depth -= 1;
            return Ok(HostExpr::Not(Box::new(operand?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<HostExpr, Exception> {
        let lhs = self.parse_term()?;
        match self.advance_if(|t| matches!(t, HostToken::Op(op) if op.is_comparison())) {
            Some(HostToken::Op(op)) => {
                let rhs = self.parse_term()?;
                Ok(HostExpr::Binary {
                    lhs: Box::new(lhs),
                    op: *op,
                    rhs: Box::new(rhs),
                })
            }
            _ => Ok(lhs),
        }
    }

    fn parse_term(&mut self) -> Result<HostExpr, Exception> {
        let mut lhs = self.parse_factor()?;
        while let Some(HostToken::Op(op)) =
            self.advance_if(|t| matches!(t, HostToken::Op(op) if op.is_additive()))
        {
            let rhs = self.parse_factor()?;
            lhs = HostExpr::Binary {
                lhs: Box::new(lhs),
                op: *op,
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<HostExpr, Exception> {
        let mut lhs = self.parse_unary()?;
        while let Some(HostToken::Op(op)) = self.advance_if(|t| {
            matches!(
                t,
                HostToken::Op(BinOp::Star | BinOp::Slash | BinOp::FloorSlash | BinOp::Modulo)
            )
        }) {
            let rhs = self.parse_unary()?;
            lhs = HostExpr::Binary {
                lhs: Box::new(lhs),
                op: *op,
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<HostExpr, Exception> {
        if self
            .advance_if(|t| *t == HostToken::Op(BinOp::Minus))
            .is_some()
        {
            self.enter()?;
            let operand = self.parse_unary();
            self.depth -= 1;
            return Ok(HostExpr::Negate(Box::new(operand?)));
        }
        if self
            .advance_if(|t| *t == HostToken::Op(BinOp::Plus))
            .is_some()
        {
            self.enter()?;
            let operand = self.parse_unary();
            self.depth -= 1;
            return operand;
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<HostExpr, Exception> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.advance_if(|t| *t == HostToken::LParen).is_some() {
                expr = HostExpr::Call {
                    func: Box::new(expr),
                    args: self.parse_args(HostToken::RParen)?,
                };
            } else if self.advance_if(|t| *t == HostToken::LBracket).is_some() {
                let index = self.parse_expr()?;
                self.advance_or_err(HostToken::RBracket)?;
                expr = HostExpr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<HostExpr, Exception> {
        let expr = match self.advance() {
            Some(t) => match t {
                HostToken::Int(n) => HostExpr::Literal(Value::Int(*n)),
                HostToken::Float(n) => HostExpr::Literal(Value::Float(*n)),
                HostToken::Str(s) => HostExpr::Literal(Value::Str(s.clone())),
                HostToken::Name(name) => match name.as_str() {
                    "True" => HostExpr::Literal(Value::Int(1)),
                    "False" => HostExpr::Literal(Value::Int(0)),
                    "None" => HostExpr::Literal(Value::Null),
                    _ if RESERVED.contains(&name.as_str()) => return Err(Self::error(t)),
                    _ => HostExpr::Name(name.clone()),
                },
                HostToken::LParen => {
                    let expr = self.parse_expr()?;
                    self.advance_or_err(HostToken::RParen)?;
                    expr
                }
                HostToken::LBracket => HostExpr::List(self.parse_args(HostToken::RBracket)?),
                _ => return Err(Self::error(t)),
            },
            None => return Err(Self::eof_error()),
        };
        Ok(expr)
    }

    /// Comma separated expressions up to and including `close`,
    /// allowing a trailing comma
    fn parse_args(&mut self, close: HostToken) -> Result<Vec<HostExpr>, Exception> {
        let mut args = vec![];
        while self.advance_if(|t| *t == close).is_none() {
            args.push(self.parse_expr()?);
            if self.advance_if(|t| *t == HostToken::Comma).is_none() {
                self.advance_or_err(close)?;
                break;
            }
        }
        Ok(args)
    }

    fn advance(&mut self) -> Option<&'a HostToken> {
        self.stream.next()
    }

    fn advance_if<F>(&mut self, cond: F) -> Option<&'a HostToken>
    where
        F: FnOnce(&HostToken) -> bool,
    {
        if self.stream.peek().filter(|&&t| cond(t)).is_some() {
            self.advance()
        } else {
            None
        }
    }

    fn advance_if_name(&mut self, name: &str) -> bool {
        self.advance_if(|t| matches!(t, HostToken::Name(n) if n == name))
            .is_some()
    }

    fn advance_or_err(&mut self, expected: HostToken) -> Result<&'a HostToken, Exception> {
        match self.advance_if(|t| *t == expected) {
            Some(t) => Ok(t),
            None => Err(self.peek_error()),
        }
    }

    fn enter(&mut self) -> Result<(), Exception> {
        if self.depth >= MAX_DEPTH {
            return Err(host_error(ErrorMsg::NestingTooDeep, "host expression"));
        }
        self.depth += 1;
        Ok(())
    }

    fn peek_error(&mut self) -> Exception {
        match self.stream.peek() {
            Some(&t) => Self::error(t),
            None => Self::eof_error(),
        }
    }

    fn error(token: &HostToken) -> Exception {
        host_error(
            ErrorMsg::InvalidHostCode,
            format!("unexpected token {token:?}"),
        )
    }

    fn eof_error() -> Exception {
        host_error(ErrorMsg::InvalidHostCode, "unexpected end of code")
    }
}
