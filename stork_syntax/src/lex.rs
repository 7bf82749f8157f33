use crate::{
    error::{Error, ErrorMsg},
    token::{TextRange, Token, TokenKind},
};
use std::{iter::Peekable, str::CharIndices};

#[derive(Debug)]
pub struct Lexer<'a> {
    source: &'a str,
    stream: Peekable<CharIndices<'a>>,
    line: usize,
    start: usize,
    current: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            stream: source.char_indices().peekable(),
            line: 0,
            start: 0,
            current: 0,
        }
    }

    pub fn lex_all(mut self) -> Result<Vec<Token>, Vec<Error>> {
        let mut tokens: Vec<Token> = Vec::default();
        let mut errors: Vec<Error> = Vec::default();
        loop {
            match self.lex() {
                Ok(t) => {
                    if t.kind == TokenKind::EOF {
                        break;
                    } else {
                        tokens.push(t);
                    }
                }
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            Ok(tokens)
        } else {
            Err(errors)
        }
    }

    /// Lex everything, dropping whitespace and comments
    pub fn lex_all_sanitised(self) -> Result<Vec<Token>, Vec<Error>> {
        self.lex_all().map(|tokens| {
            tokens
                .into_iter()
                .filter(|t| !matches!(t.kind, TokenKind::WHITESPACE | TokenKind::COMMENT))
                .collect()
        })
    }

    pub fn lex(&mut self) -> Result<Token, Error> {
        self.start = self.current;
        match self.advance() {
            Some(c) => match c {
                '"' | '\'' => self.lex_string(c),
                '/' => Ok(self.lex_slash_or_comment()),
                _ => {
                    if let Some(t) = TokenKind::from_char(c) {
                        // If it is a newline, increment the current line count
                        if c == '\n' {
                            self.line += 1;
                        }
                        Ok(self.make_token(t))
                    } else if c.is_alphabetic() || c == '_' {
                        Ok(self.lex_ident())
                    } else if c.is_ascii_digit() || c == '.' {
                        Ok(self.lex_number())
                    } else {
                        Err(self.error(ErrorMsg::UnexpectedChar))
                    }
                }
            },
            None => Ok(Token::new(
                TokenKind::EOF,
                TextRange {
                    start: self.current,
                    end: self.current,
                },
                self.line,
                "end of file".to_string(),
            )),
        }
    }

    fn lex_ident(&mut self) -> Token {
        self.advance_while(|c| c.is_alphanumeric() || c == '_');
        self.make_token(TokenKind::IDENT)
    }

    /// Any run of digits and dots is a number token. Whether
    /// it is a valid literal is decided when it is evaluated.
    fn lex_number(&mut self) -> Token {
        self.advance_while(|c| c.is_ascii_digit() || c == '.');
        self.make_token(TokenKind::NUMBER)
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, Error> {
        let line = self.line;
        // Consume the opening quote
        self.start += quote.len_utf8();
        while let Some(c) = self.advance_if(|c| c != quote) {
            if c == '\n' {
                self.line += 1;
            }
        }
        if self.stream.peek().is_none() {
            return Err(self.error(ErrorMsg::UnterminatedString));
        }
        let token = Token::new(
            TokenKind::STRING,
            self.text_range(),
            line,
            self.lexeme_from_range(),
        );
        // Consume the closing quote
        self.advance();
        Ok(token)
    }

    fn lex_slash_or_comment(&mut self) -> Token {
        if self.advance_if(|c| c == '/').is_some() {
            self.advance_while(|c| c != '\n');
            self.make_token(TokenKind::COMMENT)
        } else {
            self.make_token(TokenKind::OPERATOR)
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.text_range(), self.line, self.lexeme_from_range())
    }

    fn lexeme_from_range(&self) -> String {
        self.source[self.start..self.current].to_string()
    }

    fn text_range(&self) -> TextRange {
        TextRange {
            start: self.start,
            end: self.current,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let (idx, c) = self.stream.next()?;
        self.current = idx + c.len_utf8();
        Some(c)
    }

    fn advance_if<F>(&mut self, cond: F) -> Option<char>
    where
        F: FnOnce(char) -> bool,
    {
        if self.stream.peek().filter(|&&(_, c)| cond(c)).is_some() {
            self.advance()
        } else {
            None
        }
    }

    fn advance_while<F>(&mut self, cond: F) -> Option<usize>
    where
        F: Fn(char) -> bool,
    {
        let mut count: usize = 0;
        while self.stream.peek().filter(|&&(_, c)| cond(c)).is_some() {
            count += 1;
            self.advance();
        }
        count.ne(&0).then_some(count)
    }

    fn error(&self, msg: ErrorMsg) -> Error {
        format!(
            "Lex error at line {}: {} {}",
            self.line + 1,
            msg,
            self.lexeme_from_range()
        )
    }
}
