use std::fmt::Display;

/// Every failure aborts the program run. The variant names
/// the kind of failure; the payload is the rendered message.
#[derive(Clone, Debug, PartialEq)]
pub enum Exception {
    Lookup(String),
    Grammar(String),
    Operator(String),
    Host(String),
}

impl Exception {
    pub fn message(&self) -> &str {
        match self {
            Self::Lookup(m) | Self::Grammar(m) | Self::Operator(m) | Self::Host(m) => m,
        }
    }
}

impl Display for Exception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ErrorMsg {
    // Lookup errors
    UndefinedVar,
    UndefinedFunc,
    NotAFunction,
    NotAValue,
    TooFewArgs,
    TooManyArgs,
    // Grammar errors
    ExpectedIdent,
    ExpectedString,
    ExpectedAssign,
    ExpectedBase,
    MissingOpeningParen,
    MissingClosingParen,
    UnbalancedParen,
    UnexpectedKeyword,
    InvalidNumber,
    UnterminatedSubstitution,
    BlockOverrun,
    EndOfStream,
    // Operator errors
    UnsupportedOperands,
    DivisionByZero,
    IntegerOverflow,
    // Host errors
    InvalidHostCode,
    UndefinedName,
    NotCallable,
    InvalidArgs,
    InvalidIndex,
    IndexOutOfRange,
    Raised,
    AssertionFailed,
    CallDepthExceeded,
    NestingTooDeep,
}

impl Display for ErrorMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::UndefinedVar => "undefined variable",
            Self::UndefinedFunc => "undefined function",
            Self::NotAFunction => "cannot call a value, found",
            Self::NotAValue => "cannot use a function as a value, found",
            Self::TooFewArgs => "too few arguments in function call, found",
            Self::TooManyArgs => "too many arguments in function call, found",
            Self::ExpectedIdent => "expected identifier, found",
            Self::ExpectedString => "expected string, found",
            Self::ExpectedAssign => "expected =, found",
            Self::ExpectedBase => "expected base, found",
            Self::MissingOpeningParen => "expected (, found",
            Self::MissingClosingParen => "expected ), found",
            Self::UnbalancedParen => "unbalanced parenthesis",
            Self::UnexpectedKeyword => "unexpected keyword",
            Self::InvalidNumber => "invalid number literal",
            Self::UnterminatedSubstitution => "unterminated substitution in",
            Self::BlockOverrun => "statement runs past the end of its block at",
            Self::EndOfStream => "unexpected end of stream",
            Self::UnsupportedOperands => "unsupported operand types for",
            Self::DivisionByZero => "division by zero in",
            Self::IntegerOverflow => "integer overflow in",
            Self::InvalidHostCode => "invalid host code,",
            Self::UndefinedName => "name is not defined,",
            Self::NotCallable => "object is not callable,",
            Self::InvalidArgs => "invalid arguments for",
            Self::InvalidIndex => "cannot index",
            Self::IndexOutOfRange => "index out of range,",
            Self::Raised => "exception raised,",
            Self::AssertionFailed => "assertion failed,",
            Self::CallDepthExceeded => "maximum call depth exceeded in",
            Self::NestingTooDeep => "maximum nesting depth exceeded by",
        })
    }
}

fn render(kind: &str, msg: ErrorMsg, ctx: impl Display, line: Option<usize>) -> String {
    let ctx = ctx.to_string();
    let msg = if ctx.is_empty() {
        msg.to_string()
    } else {
        format!("{msg} {ctx}")
    };
    match line {
        Some(line) => format!("{kind} error at line {}: {msg}", line + 1),
        None => format!("{kind} error: {msg}"),
    }
}

pub fn lookup_error(msg: ErrorMsg, ctx: impl Display, line: Option<usize>) -> Exception {
    Exception::Lookup(render("Lookup", msg, ctx, line))
}

pub fn grammar_error(msg: ErrorMsg, ctx: impl Display, line: Option<usize>) -> Exception {
    Exception::Grammar(render("Grammar", msg, ctx, line))
}

pub fn operator_error(msg: ErrorMsg, ctx: impl Display, line: Option<usize>) -> Exception {
    Exception::Operator(render("Operator", msg, ctx, line))
}

pub fn host_error(msg: ErrorMsg, ctx: impl Display) -> Exception {
    Exception::Host(render("Host", msg, ctx, None))
}
