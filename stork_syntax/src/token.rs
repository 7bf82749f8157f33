use std::fmt::Display;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

/// The enum variants are in SCREAMING_SNAKE_CASE as they technically
/// represent constants, but Rust does not allow const enum variants.
#[allow(nonstandard_style)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TokenKind {
    // Literals
    NUMBER,
    STRING,
    IDENT,
    // `+ - * / %`
    OPERATOR,
    // `=`
    ASSIGN,
    // `(` and `)`
    PUNCTUATION,
    // Miscellaneous tokens, never handed to the interpreter
    COMMENT,
    WHITESPACE,
    EOF,
}

impl TokenKind {
    pub fn from_char(c: char) -> Option<Self> {
        let token = match c {
            '(' | ')' => Self::PUNCTUATION,
            '+' | '-' | '*' | '%' => Self::OPERATOR,
            '=' => Self::ASSIGN,
            ' ' | '\t' | '\r' | '\n' => Self::WHITESPACE,
            _ => return None,
        };
        Some(token)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NUMBER => "number",
            Self::STRING => "string",
            Self::IDENT => "identifier",
            Self::OPERATOR => "operator",
            Self::ASSIGN => "assignment",
            Self::PUNCTUATION => "punctuation",
            Self::COMMENT => "comment",
            Self::WHITESPACE => "whitespace",
            Self::EOF => "end of file",
        })
    }
}

/// Keywords are lexed as plain identifiers. The interpreter
/// recognises them by lexeme when they lead a statement or base.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Set,
    Fn,
    While,
    Call,
    If,
    Else,
    Array,
    RawExec,
    RawEval,
}

impl Keyword {
    pub fn from_lexeme(kw: &str) -> Option<Self> {
        let keyword = match kw {
            "set" => Self::Set,
            "fn" => Self::Fn,
            "while" => Self::While,
            "call" => Self::Call,
            "if" => Self::If,
            "else" => Self::Else,
            "array" => Self::Array,
            "raw_python_exec" => Self::RawExec,
            "raw_python_eval" => Self::RawEval,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Fn => "fn",
            Self::While => "while",
            Self::Call => "call",
            Self::If => "if",
            Self::Else => "else",
            Self::Array => "array",
            Self::RawExec => "raw_python_exec",
            Self::RawEval => "raw_python_eval",
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: TextRange,
    pub line: usize,
    pub lexeme: String,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lexeme)
    }
}

impl Token {
    pub fn new(kind: TokenKind, range: TextRange, line: usize, lexeme: String) -> Self {
        Self {
            kind,
            range,
            line,
            lexeme,
        }
    }

    /// The keyword this token spells, if it is an identifier
    pub fn keyword(&self) -> Option<Keyword> {
        (self.kind == TokenKind::IDENT)
            .then(|| Keyword::from_lexeme(&self.lexeme))
            .flatten()
    }

    pub fn is_punct(&self, c: &str) -> bool {
        self.kind == TokenKind::PUNCTUATION && self.lexeme == c
    }
}
