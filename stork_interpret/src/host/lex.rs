use std::{iter::Peekable, str::Chars};

use stork_syntax::op::BinOp;

use crate::error::{host_error, ErrorMsg, Exception};

#[derive(Clone, Debug, PartialEq)]
pub enum HostToken {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(BinOp),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    // Newline outside of brackets, or `;`
    Separator,
}

#[derive(Debug)]
pub struct HostLexer<'a> {
    stream: Peekable<Chars<'a>>,
    // Bracket nesting, newlines inside brackets are not separators
    depth: usize,
}

impl<'a> HostLexer<'a> {
    pub fn new(code: &'a str) -> Self {
        Self {
            stream: code.chars().peekable(),
            depth: 0,
        }
    }

    pub fn lex_all(mut self) -> Result<Vec<HostToken>, Exception> {
        let mut tokens = Vec::default();
        while let Some(c) = self.stream.next() {
            let token = match c {
                ' ' | '\t' | '\r' => continue,
                '\n' if self.depth > 0 => continue,
                '\n' | ';' => HostToken::Separator,
                '#' => {
                    self.advance_while(|c| c != '\n');
                    continue;
                }
                '(' => {
                    self.depth += 1;
                    HostToken::LParen
                }
                '[' => {
                    self.depth += 1;
                    HostToken::LBracket
                }
                ')' => {
                    self.depth = self.depth.saturating_sub(1);
                    HostToken::RParen
                }
                ']' => {
                    self.depth = self.depth.saturating_sub(1);
                    HostToken::RBracket
                }
                ',' => HostToken::Comma,
                '+' => HostToken::Op(BinOp::Plus),
                '-' => HostToken::Op(BinOp::Minus),
                '*' => HostToken::Op(BinOp::Star),
                '%' => HostToken::Op(BinOp::Modulo),
                '/' => self.lookahead_for_op('/', BinOp::FloorSlash, Some(BinOp::Slash), c)?,
                '=' => self.lookahead_for_op('=', BinOp::EqualEqual, None, c)?,
                '!' => self.lookahead_for_op('=', BinOp::BangEqual, None, c)?,
                '<' => self.lookahead_for_op('=', BinOp::LessEqual, Some(BinOp::Less), c)?,
                '>' => self.lookahead_for_op('=', BinOp::GreaterEqual, Some(BinOp::Greater), c)?,
                '\'' | '"' => self.lex_string(c)?,
                _ if c.is_ascii_digit() || c == '.' => self.lex_number(c)?,
                _ if c.is_alphabetic() || c == '_' => {
                    let mut name = c.to_string();
                    name.push_str(&self.advance_while(|c| c.is_alphanumeric() || c == '_'));
                    HostToken::Name(name)
                }
                _ => return Err(host_error(ErrorMsg::InvalidHostCode, c)),
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn lex_number(&mut self, first: char) -> Result<HostToken, Exception> {
        let mut digits = first.to_string();
        digits.push_str(&self.advance_while(|c| c.is_ascii_digit() || c == '.'));
        if let Some(e) = self.stream.next_if(|&c| c == 'e' || c == 'E') {
            digits.push(e);
            if let Some(sign) = self.stream.next_if(|&c| c == '+' || c == '-') {
                digits.push(sign);
            }
            digits.push_str(&self.advance_while(|c| c.is_ascii_digit()));
        }
        if digits.contains(['.', 'e', 'E']) {
            digits
                .parse()
                .map(HostToken::Float)
                .map_err(|_| host_error(ErrorMsg::InvalidHostCode, digits))
        } else {
            digits
                .parse()
                .map(HostToken::Int)
                .map_err(|_| host_error(ErrorMsg::InvalidHostCode, digits))
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<HostToken, Exception> {
        let mut s = String::default();
        loop {
            match self.stream.next() {
                Some(c) if c == quote => return Ok(HostToken::Str(s)),
                Some('\\') => match self.stream.next() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some(c @ ('\\' | '\'' | '"')) => s.push(c),
                    // Unknown escapes are kept as written
                    Some(c) => {
                        s.push('\\');
                        s.push(c);
                    }
                    None => break,
                },
                Some(c) => s.push(c),
                None => break,
            }
        }
        Err(host_error(
            ErrorMsg::InvalidHostCode,
            format!("unterminated string {quote}{s}"),
        ))
    }

    fn lookahead_for_op(
        &mut self,
        match_char: char,
        if_match: BinOp,
        no_match: Option<BinOp>,
        current: char,
    ) -> Result<HostToken, Exception> {
        if self.stream.next_if_eq(&match_char).is_some() {
            return Ok(HostToken::Op(if_match));
        }
        no_match
            .map(HostToken::Op)
            .ok_or_else(|| host_error(ErrorMsg::InvalidHostCode, current))
    }

    fn advance_while<F>(&mut self, cond: F) -> String
    where
        F: Fn(char) -> bool,
    {
        let mut consumed = String::default();
        while let Some(c) = self.stream.next_if(|&c| cond(c)) {
            consumed.push(c);
        }
        consumed
    }
}
