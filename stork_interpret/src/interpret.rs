use std::{cmp::Ordering, collections::HashMap, ops::Range};

use log::{debug, trace};
use stork_syntax::{
    op::BinOp,
    token::{Keyword, Token, TokenKind},
};

use crate::{
    environment::{Env, Frame},
    error::{grammar_error, host_error, lookup_error, operator_error, ErrorMsg, Exception},
    host::{Host, Sandbox},
    stdlib,
    types::{Func, Value},
};

/// Calls nested deeper than this abort the program
pub const MAX_CALL_DEPTH: usize = 200;

/// Calls, blocks and array literals nested deeper than this abort
/// the program
pub const MAX_NESTING_DEPTH: usize = 256;

/// Parses and executes in one pass over the token stream. Every
/// construct works by moving the single cursor `pos`: blocks are
/// run by walking forward, skipped by jumping to their closing
/// parenthesis, and function bodies are replayed by jumping to the
/// token range recorded when the function was defined.
#[derive(Debug)]
pub struct Interpreter {
    pub env: Env,
    tokens: Vec<Token>,
    // Position of the matching `)` for every `(`
    closers: HashMap<usize, usize>,
    pos: usize,
    // Calls, blocks and arrays currently being evaluated
    nesting: usize,
    host: Box<dyn Host>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Box::new(Sandbox::new()))
    }
}

impl Interpreter {
    pub fn new(host: Box<dyn Host>) -> Self {
        Self {
            env: Env::new(),
            tokens: Vec::default(),
            closers: HashMap::default(),
            pos: 0,
            nesting: 0,
            host,
        }
    }

    /// An interpreter with the prelude functions already defined
    pub fn with_prelude(host: Box<dyn Host>) -> Result<Self, Vec<Exception>> {
        let mut interpreter = Self::new(host);
        stdlib::load_prelude(&mut interpreter)?;
        Ok(interpreter)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Appends the tokens to the stream and executes them, returning
    /// the result of every top-level statement. Functions defined by
    /// earlier chunks stay callable since the stream only grows.
    pub fn interpret_all(&mut self, tokens: Vec<Token>) -> Result<Vec<Value>, Exception> {
        let start = self.tokens.len();
        let closers = match_parens(&tokens, start)?;
        self.tokens.extend(tokens);
        self.closers.extend(closers);
        self.pos = start;

        let mut results = vec![];
        while !self.end() {
            match self.interpret_stmt() {
                Ok(value) => results.push(value),
                Err(e) => {
                    // Abandon the rest of the chunk
                    self.pos = self.tokens.len();
                    self.env.clear_frames();
                    self.nesting = 0;
                    return Err(e);
                }
            }
        }
        Ok(results)
    }

    fn interpret_stmt(&mut self) -> Result<Value, Exception> {
        let Some(token) = self.peek() else {
            return Err(self.error_here(ErrorMsg::EndOfStream));
        };
        match token.keyword() {
            Some(Keyword::Set) => self.interpret_assignment(),
            Some(Keyword::Fn) => self.interpret_function(),
            Some(Keyword::While) => self.interpret_while(),
            Some(Keyword::Call) => self.interpret_call(),
            Some(Keyword::If) => self.interpret_if(),
            Some(Keyword::RawExec | Keyword::RawEval) => self.interpret_host_escape(),
            _ => self.interpret_expr(),
        }
    }

    fn interpret_assignment(&mut self) -> Result<Value, Exception> {
        // Consume the `set` keyword
        self.advance();
        let name = self.expect_ident()?;
        self.expect(TokenKind::ASSIGN, ErrorMsg::ExpectedAssign)?;
        let value = self.interpret_expr()?;
        self.env.set(&name.lexeme, value.clone());
        Ok(value)
    }

    fn interpret_function(&mut self) -> Result<Value, Exception> {
        // Consume the `fn` keyword
        self.advance();
        let name = self.expect_ident()?;
        self.expect_punct("(", ErrorMsg::MissingOpeningParen)?;
        let mut params = vec![];
        while self.peek().filter(|t| t.kind == TokenKind::IDENT).is_some() {
            params.push(self.expect_ident()?.lexeme);
        }
        self.expect_punct(")", ErrorMsg::MissingClosingParen)?;
        // Only the extent of the body is recorded, it runs on every call
        let body = self.block_range()?;
        self.pos = body.end + 1;
        self.env.define(Func {
            name: name.lexeme,
            params,
            body,
        });
        Ok(Value::Null)
    }

    fn interpret_while(&mut self) -> Result<Value, Exception> {
        // Consume the `while` keyword
        self.advance();
        let condition = self.pos;
        loop {
            // The condition is evaluated again from the
            // same position before every iteration
            self.pos = condition;
            if !self.interpret_expr()?.is_truthy() {
                break;
            }
            debug!("Loop iteration at {condition}");
            self.interpret_block()?;
        }
        self.skip_block()?;
        Ok(Value::Null)
    }

    fn interpret_if(&mut self) -> Result<Value, Exception> {
        // Consume the `if` keyword
        self.advance();
        if self.interpret_expr()?.is_truthy() {
            let value = self.interpret_block()?;
            if self.advance_if_keyword(Keyword::Else) {
                self.skip_block()?;
            }
            Ok(value)
        } else {
            self.skip_block()?;
            if self.advance_if_keyword(Keyword::Else) {
                self.interpret_block()
            } else {
                Ok(Value::Null)
            }
        }
    }

    fn interpret_call(&mut self) -> Result<Value, Exception> {
        // Consume the `call` keyword
        self.advance();
        self.enter("call")?;
        let res = self.interpret_call_args();
        self.leave();
        res
    }

    fn interpret_call_args(&mut self) -> Result<Value, Exception> {
        let name = self.expect_ident()?;
        self.expect_punct("(", ErrorMsg::MissingOpeningParen)?;
        let args = self.interpret_args()?;
        let func = self
            .env
            .get_func(&name.lexeme)
            .map_err(|msg| lookup_error(msg, &name.lexeme, Some(name.line)))?;
        // Ensure the number of arguments matches the function definition
        match func.params.len().cmp(&args.len()) {
            Ordering::Greater => {
                return Err(lookup_error(
                    ErrorMsg::TooFewArgs,
                    format!("{} arguments, expected {}", args.len(), func.params.len()),
                    Some(name.line),
                ))
            }
            Ordering::Less => {
                return Err(lookup_error(
                    ErrorMsg::TooManyArgs,
                    format!("{} arguments, expected {}", args.len(), func.params.len()),
                    Some(name.line),
                ))
            }
            _ => (),
        }
        if self.env.depth() >= MAX_CALL_DEPTH {
            return Err(host_error(ErrorMsg::CallDepthExceeded, func));
        }

        self.call_func(func, args)
    }

    pub(crate) fn call_func(&mut self, func: Func, args: Vec<Value>) -> Result<Value, Exception> {
        debug!("Call {func} with {args:?}");
        let frame: Frame = func.params.iter().cloned().zip(args).collect();
        self.env.push_frame(frame);
        let caller = self.pos;
        self.pos = func.body.start;

        let res = self.interpret_range(func.body.end);
        // Restore the caller's position and drop the parameters
        self.pos = caller;
        self.env.pop_frame();
        debug!("Return from {} with {res:?}", func.name);

        res
    }

    fn interpret_host_escape(&mut self) -> Result<Value, Exception> {
        let keyword = self.advance().and_then(|t| t.keyword());
        let template = self.expect(TokenKind::STRING, ErrorMsg::ExpectedString)?;
        let code = self.substitute(&template)?;
        trace!("Substituted {:?} into {code:?}", template.lexeme);
        if keyword == Some(Keyword::RawExec) {
            self.host.exec(&code)?;
            Ok(Value::Null)
        } else {
            self.host.eval(&code)
        }
    }

    /// Replaces every `#name#` in the template with the bound value
    /// as a host literal. A backslash protects the next character.
    fn substitute(&self, template: &Token) -> Result<String, Exception> {
        let mut code = String::with_capacity(template.lexeme.len());
        let mut chars = template.lexeme.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    code.push(c);
                    if let Some(escaped) = chars.next() {
                        code.push(escaped);
                    }
                }
                '#' => {
                    let mut key = String::default();
                    loop {
                        match chars.next() {
                            Some('#') => break,
                            Some('\\') => {
                                key.push('\\');
                                if let Some(escaped) = chars.next() {
                                    key.push(escaped);
                                }
                            }
                            Some(c) => key.push(c),
                            None => {
                                return Err(grammar_error(
                                    ErrorMsg::UnterminatedSubstitution,
                                    format!("{:?}", template.lexeme),
                                    Some(template.line),
                                ))
                            }
                        }
                    }
                    let value = self
                        .env
                        .get(&key)
                        .map_err(|msg| lookup_error(msg, &key, Some(template.line)))?;
                    code.push_str(&value.repr());
                }
                _ => code.push(c),
            }
        }
        Ok(code)
    }

    fn interpret_expr(&mut self) -> Result<Value, Exception> {
        let mut value = self.interpret_atom()?;
        while let Some(op) = self.advance_if_op(BinOp::is_multiplicative) {
            let rhs = self.interpret_atom()?;
            value = self.apply(value, op, rhs)?;
        }
        Ok(value)
    }

    fn interpret_atom(&mut self) -> Result<Value, Exception> {
        let mut value = self.interpret_base()?;
        while let Some(op) = self.advance_if_op(BinOp::is_additive) {
            let rhs = self.interpret_base()?;
            value = self.apply(value, op, rhs)?;
        }
        Ok(value)
    }

    fn interpret_base(&mut self) -> Result<Value, Exception> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error_here(ErrorMsg::EndOfStream));
        };
        match token.kind {
            TokenKind::NUMBER => {
                self.advance();
                parse_number(&token)
            }
            TokenKind::STRING => {
                self.advance();
                Ok(Value::Str(token.lexeme))
            }
            TokenKind::IDENT => match token.keyword() {
                Some(Keyword::Call) => self.interpret_call(),
                Some(Keyword::Array) => self.interpret_array(),
                Some(Keyword::RawExec | Keyword::RawEval) => self.interpret_host_escape(),
                Some(_) => Err(grammar_error(
                    ErrorMsg::UnexpectedKeyword,
                    &token.lexeme,
                    Some(token.line),
                )),
                None => {
                    self.advance();
                    self.env
                        .get(&token.lexeme)
                        .map_err(|msg| lookup_error(msg, &token.lexeme, Some(token.line)))
                }
            },
            _ => Err(grammar_error(
                ErrorMsg::ExpectedBase,
                &token.lexeme,
                Some(token.line),
            )),
        }
    }

    fn interpret_array(&mut self) -> Result<Value, Exception> {
        // Consume the `array` keyword
        self.advance();
        self.expect_punct("(", ErrorMsg::MissingOpeningParen)?;
        self.enter("array")?;
        let values = self.interpret_args();
        self.leave();
        Ok(Value::Array(values?))
    }

    /// Expressions up to and including the closing parenthesis
    fn interpret_args(&mut self) -> Result<Vec<Value>, Exception> {
        let mut values = vec![];
        loop {
            match self.peek() {
                Some(t) if t.is_punct(")") => {
                    self.advance();
                    return Ok(values);
                }
                Some(_) => values.push(self.interpret_expr()?),
                None => return Err(self.error_here(ErrorMsg::MissingClosingParen)),
            }
        }
    }

    fn apply(&self, lhs: Value, op: BinOp, rhs: Value) -> Result<Value, Exception> {
        // Strings absorb numbers under `+`
        if op == BinOp::Plus {
            match (&lhs, &rhs) {
                (Value::Str(s), Value::Int(_) | Value::Float(_)) => {
                    return Ok(Value::Str(format!("{s}{rhs}")))
                }
                (Value::Int(_) | Value::Float(_), Value::Str(s)) => {
                    return Ok(Value::Str(format!("{lhs}{s}")))
                }
                _ => (),
            }
        }
        lhs.binary(op, &rhs).map_err(|msg| {
            let ctx = match msg {
                ErrorMsg::UnsupportedOperands => {
                    format!("{op}: {} and {}", lhs.type_name(), rhs.type_name())
                }
                _ => format!("{lhs} {op} {rhs}"),
            };
            // The operator was the token before the right operand
            operator_error(msg, ctx, self.line())
        })
    }

    /// The statements strictly inside the block opening at the cursor
    fn block_range(&self) -> Result<Range<usize>, Exception> {
        if self.peek().filter(|t| t.is_punct("(")).is_none() {
            return Err(self.error_here(ErrorMsg::MissingOpeningParen));
        }
        let close = self
            .closers
            .get(&self.pos)
            .copied()
            .ok_or_else(|| self.error_here(ErrorMsg::UnbalancedParen))?;
        Ok(self.pos + 1..close)
    }

    fn interpret_block(&mut self) -> Result<Value, Exception> {
        let body = self.block_range()?;
        self.enter("block")?;
        self.pos = body.start;
        let value = self.interpret_range(body.end);
        self.leave();
        let value = value?;
        // Consume the closing parenthesis
        self.advance();
        Ok(value)
    }

    fn enter(&mut self, construct: &str) -> Result<(), Exception> {
        if self.nesting >= MAX_NESTING_DEPTH {
            return Err(host_error(
                ErrorMsg::NestingTooDeep,
                format!("{construct} at line {}", self.line().map_or(0, |l| l + 1)),
            ));
        }
        self.nesting += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn skip_block(&mut self) -> Result<(), Exception> {
        let body = self.block_range()?;
        self.pos = body.end + 1;
        Ok(())
    }

    /// Runs statements from the cursor until it reaches `end`,
    /// yielding the value of the last one
    fn interpret_range(&mut self, end: usize) -> Result<Value, Exception> {
        let mut value = Value::Null;
        while self.pos < end {
            value = self.interpret_stmt()?;
        }
        if self.pos != end {
            return Err(grammar_error(
                ErrorMsg::BlockOverrun,
                ")",
                self.tokens.get(end).map(|t| t.line),
            ));
        }
        Ok(value)
    }

    fn end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn advance_if_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek().and_then(|t| t.keyword()) == Some(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance_if_op(&mut self, tier: fn(&BinOp) -> bool) -> Option<BinOp> {
        let op = self
            .peek()
            .filter(|t| t.kind == TokenKind::OPERATOR)
            .and_then(|t| BinOp::from_lexeme(&t.lexeme))
            .filter(tier)?;
        self.advance();
        Some(op)
    }

    fn expect(&mut self, kind: TokenKind, msg: ErrorMsg) -> Result<Token, Exception> {
        if self.peek().filter(|t| t.kind == kind).is_some() {
            if let Some(t) = self.advance() {
                return Ok(t);
            }
        }
        Err(self.error_here(msg))
    }

    fn expect_ident(&mut self) -> Result<Token, Exception> {
        if self.peek().and_then(|t| t.keyword()).is_some() {
            return Err(self.error_here(ErrorMsg::ExpectedIdent));
        }
        self.expect(TokenKind::IDENT, ErrorMsg::ExpectedIdent)
    }

    fn expect_punct(&mut self, punct: &str, msg: ErrorMsg) -> Result<Token, Exception> {
        if self.peek().filter(|t| t.is_punct(punct)).is_some() {
            if let Some(t) = self.advance() {
                return Ok(t);
            }
        }
        Err(self.error_here(msg))
    }

    /// The line of the current token, or of the last one at the end
    fn line(&self) -> Option<usize> {
        self.peek().or_else(|| self.tokens.last()).map(|t| t.line)
    }

    fn error_here(&self, msg: ErrorMsg) -> Exception {
        match self.peek() {
            Some(t) => grammar_error(msg, &t.lexeme, Some(t.line)),
            None => grammar_error(msg, "end of stream", self.line()),
        }
    }
}

fn parse_number(token: &Token) -> Result<Value, Exception> {
    let invalid = || grammar_error(ErrorMsg::InvalidNumber, &token.lexeme, Some(token.line));
    if token.lexeme.contains('.') {
        token.lexeme.parse().map(Value::Float).map_err(|_| invalid())
    } else {
        token.lexeme.parse().map(Value::Int).map_err(|_| invalid())
    }
}

/// Pairs every `(` with its `)` by depth counting. `offset` is the
/// position of the first token within the whole stream.
fn match_parens(tokens: &[Token], offset: usize) -> Result<HashMap<usize, usize>, Exception> {
    let mut closers = HashMap::default();
    let mut open: Vec<usize> = vec![];
    for (i, token) in tokens.iter().enumerate() {
        if token.is_punct("(") {
            open.push(i);
        } else if token.is_punct(")") {
            let Some(start) = open.pop() else {
                return Err(grammar_error(ErrorMsg::UnbalancedParen, ")", Some(token.line)));
            };
            closers.insert(start + offset, i + offset);
        }
    }
    match open.first() {
        Some(&start) => Err(grammar_error(
            ErrorMsg::UnbalancedParen,
            "(",
            Some(tokens[start].line),
        )),
        None => Ok(closers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Output;
    use stork_syntax::lex::Lexer;

    fn interpreter() -> (Interpreter, Output) {
        let (sandbox, output) = Sandbox::captured();
        (Interpreter::new(Box::new(sandbox)), output)
    }

    fn feed(interpreter: &mut Interpreter, source: &str) -> Result<Vec<Value>, Exception> {
        let tokens = Lexer::new(source)
            .lex_all_sanitised()
            .expect("failed to lex source");
        interpreter.interpret_all(tokens)
    }

    fn eval(source: &str) -> Result<Value, Exception> {
        let (mut interpreter, _) = interpreter();
        feed(&mut interpreter, source).map(|mut values| values.pop().unwrap_or(Value::Null))
    }

    #[test]
    fn literals() {
        assert_eq!(eval("42"), Ok(Value::Int(42)));
        assert_eq!(eval("4.5"), Ok(Value::Float(4.5)));
        assert_eq!(eval("'str'"), Ok(Value::Str("str".to_string())));
        assert_eq!(
            eval("array(1 'a' array())"),
            Ok(Value::Array(vec![
                Value::Int(1),
                Value::Str("a".to_string()),
                Value::Array(vec![])
            ]))
        );
        assert!(matches!(eval("1.2.3"), Err(Exception::Grammar(_))));
    }

    #[test]
    fn set_stmt() {
        let (mut interpreter, _) = interpreter();
        assert_eq!(feed(&mut interpreter, "set x = 5"), Ok(vec![Value::Int(5)]));
        assert_eq!(interpreter.env.get("x"), Ok(Value::Int(5)));
        assert!(matches!(
            feed(&mut interpreter, "set x 5"),
            Err(Exception::Grammar(_))
        ));
        assert!(matches!(
            feed(&mut interpreter, "set if = 5"),
            Err(Exception::Grammar(_))
        ));
    }

    #[test]
    fn reversed_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Ok(Value::Int(9)));
        assert_eq!(eval("2 * 3 + 1"), Ok(Value::Int(8)));
        assert_eq!(eval("10 - 2 - 3"), Ok(Value::Int(5)));
        assert_eq!(eval("7 % 4 * 2"), Ok(Value::Int(6)));
        assert_eq!(eval("6 / 3"), Ok(Value::Float(2.0)));
    }

    #[test]
    fn concatenation() {
        assert_eq!(eval("1 + 'a'"), Ok(Value::Str("1a".to_string())));
        assert_eq!(eval("'a' + 1.5"), Ok(Value::Str("a1.5".to_string())));
        assert_eq!(eval("'a' + 'b'"), Ok(Value::Str("ab".to_string())));
        assert_eq!(eval("1 + 2"), Ok(Value::Int(3)));
        assert!(matches!(eval("'a' - 1"), Err(Exception::Operator(_))));
        assert!(matches!(eval("'a' * 'b'"), Err(Exception::Operator(_))));
        assert!(matches!(eval("1 / 0"), Err(Exception::Operator(_))));
    }

    #[test]
    fn lookup() {
        assert_eq!(
            eval("nope"),
            Err(Exception::Lookup(
                "Lookup error at line 1: undefined variable nope".to_string()
            ))
        );
        assert!(matches!(eval("call nope()"), Err(Exception::Lookup(_))));
        assert!(matches!(
            eval("set f = 1 call f()"),
            Err(Exception::Lookup(_))
        ));
        assert!(matches!(eval("fn f() () f"), Err(Exception::Lookup(_))));
    }

    #[test]
    fn grammar() {
        assert!(matches!(eval("("), Err(Exception::Grammar(_))));
        assert!(matches!(eval(")"), Err(Exception::Grammar(_))));
        assert!(matches!(eval("(1)"), Err(Exception::Grammar(_))));
        assert!(matches!(eval("1 +"), Err(Exception::Grammar(_))));
        assert!(matches!(eval("else"), Err(Exception::Grammar(_))));
        assert!(matches!(eval("if 1 2"), Err(Exception::Grammar(_))));
        assert!(matches!(eval("raw_python_eval 5"), Err(Exception::Grammar(_))));
    }

    #[test]
    fn if_stmt() {
        let (mut interpreter, _) = interpreter();
        let results = feed(
            &mut interpreter,
            "if 1 ( set a = 1 ) else ( set b = 2 )
             if 0 ( set c = 3 ) else ( set d = 4 'd' )
             if '' ( set e = 5 )",
        )
        .unwrap();
        assert_eq!(
            results,
            vec![Value::Int(1), Value::Str("d".to_string()), Value::Null]
        );
        assert!(interpreter.env.contains("a"));
        assert!(!interpreter.env.contains("b"));
        assert!(!interpreter.env.contains("c"));
        assert!(interpreter.env.contains("d"));
        assert!(!interpreter.env.contains("e"));
        assert_eq!(interpreter.pos(), interpreter.tokens().len());
    }

    #[test]
    fn skipped_branch_defines_nothing() {
        let (mut interpreter, _) = interpreter();
        feed(&mut interpreter, "if 0 ( fn f() ( 1 ) set x = (2) )").unwrap();
        assert!(!interpreter.env.contains("f"));
        assert!(!interpreter.env.contains("x"));
    }

    #[test]
    fn while_stmt() {
        let (mut interpreter, _) = interpreter();
        feed(
            &mut interpreter,
            "set i = 3 set n = 0 while i ( set i = i - 1 set n = n + 1 )",
        )
        .unwrap();
        assert_eq!(interpreter.env.get("i"), Ok(Value::Int(0)));
        assert_eq!(interpreter.env.get("n"), Ok(Value::Int(3)));

        feed(&mut interpreter, "while 0 ( set n = 100 ) while '' ( set n = 100 )").unwrap();
        assert_eq!(interpreter.env.get("n"), Ok(Value::Int(3)));
    }

    #[test]
    fn while_condition_replays() {
        let (mut interpreter, _) = interpreter();
        feed(
            &mut interpreter,
            "fn tick() ( set checks = checks + 1 set i = i - 1 i + 1 )
             set checks = 0 set i = 2
             while call tick() ( )",
        )
        .unwrap();
        // Two truthy checks plus the final falsy one
        assert_eq!(interpreter.env.get("checks"), Ok(Value::Int(3)));
    }

    #[test]
    fn function() {
        let (mut interpreter, _) = interpreter();
        let results = feed(&mut interpreter, "fn add(a b) ( a + b ) call add(2 3)").unwrap();
        assert_eq!(results, vec![Value::Null, Value::Int(5)]);
        assert_eq!(interpreter.env.depth(), 0);
        assert!(interpreter.env.get("a").is_err());
        assert!(interpreter.env.get("__b").is_err());
    }

    #[test]
    fn function_body_runs_per_call() {
        let (mut interpreter, _) = interpreter();
        let results = feed(
            &mut interpreter,
            "set n = 0 fn bump() ( set n = n + 1 ) call bump() call bump() fn empty() () call empty()",
        )
        .unwrap();
        assert_eq!(results[2], Value::Int(1));
        assert_eq!(results[3], Value::Int(2));
        assert_eq!(results[5], Value::Null);
    }

    #[test]
    fn arity() {
        let (mut interpreter, _) = interpreter();
        feed(&mut interpreter, "fn f(a) ( a )").unwrap();
        assert!(matches!(feed(&mut interpreter, "call f()"), Err(Exception::Lookup(_))));
        assert!(matches!(feed(&mut interpreter, "call f(1 2)"), Err(Exception::Lookup(_))));
        // A negative argument is written as a subtraction, so this is one argument
        assert_eq!(feed(&mut interpreter, "call f(1 -2)"), Ok(vec![Value::Int(-1)]));
    }

    #[test]
    fn recursion() {
        let (mut interpreter, _) = interpreter();
        let results = feed(
            &mut interpreter,
            "fn fact(n) ( if n ( n * call fact(n - 1) ) else ( 1 ) ) call fact(5)",
        )
        .unwrap();
        assert_eq!(results[1], Value::Int(120));
        assert_eq!(interpreter.env.depth(), 0);
    }

    #[test]
    fn call_depth_is_limited() {
        let (mut interpreter, _) = interpreter();
        let err = feed(&mut interpreter, "fn forever() ( call forever() ) call forever()")
            .unwrap_err();
        assert!(matches!(err, Exception::Host(_)));
        // The failed chunk leaves no frames behind
        assert_eq!(interpreter.env.depth(), 0);
        assert_eq!(interpreter.pos(), interpreter.tokens().len());
    }

    #[test]
    fn nesting_is_limited() {
        let deep = |open: &str, inner: &str, depth: usize| {
            format!("{}{inner}{}", open.repeat(depth), " )".repeat(depth))
        };
        let (mut interpreter, _) = interpreter();
        let err = feed(
            &mut interpreter,
            &format!("set x = {}", deep("array( ", "1", 20_000)),
        )
        .unwrap_err();
        assert!(matches!(err, Exception::Host(_)));
        assert_eq!(interpreter.nesting, 0);
        assert!(!interpreter.env.contains("x"));

        let err = feed(&mut interpreter, &deep("if 1 ( ", "2", 20_000)).unwrap_err();
        assert!(matches!(err, Exception::Host(_)));
        assert_eq!(interpreter.nesting, 0);

        let err = feed(
            &mut interpreter,
            &format!("fn id(v) ( v ) {}", deep("call id( ", "3", 20_000)),
        )
        .unwrap_err();
        assert!(matches!(err, Exception::Host(_)));

        // Moderate nesting still works after a failed chunk
        let results = feed(&mut interpreter, &deep("if 1 ( ", "4", 100)).unwrap();
        assert_eq!(results, vec![Value::Int(4)]);
        let results = feed(&mut interpreter, &deep("array( ", "5", 3)).unwrap();
        assert_eq!(
            results,
            vec![Value::Array(vec![Value::Array(vec![Value::Array(vec![
                Value::Int(5)
            ])])])]
        );
    }

    #[test]
    fn caller_parameters_visible_in_callee() {
        let (mut interpreter, _) = interpreter();
        let results = feed(
            &mut interpreter,
            "fn inner() ( outer_arg ) fn outer(outer_arg) ( call inner() ) call outer(7)",
        )
        .unwrap();
        assert_eq!(results[2], Value::Int(7));
    }

    #[test]
    fn substitution() {
        let (mut interpreter, _) = interpreter();
        feed(&mut interpreter, "set x = 5 set s = 'hi' set arr = array(1 'b')").unwrap();
        let template = |text: &str| Token::new(
            TokenKind::STRING,
            stork_syntax::token::TextRange { start: 0, end: 0 },
            0,
            text.to_string(),
        );
        assert_eq!(interpreter.substitute(&template("#x# + 1")), Ok("5 + 1".to_string()));
        assert_eq!(interpreter.substitute(&template("#s#")), Ok("'hi'".to_string()));
        assert_eq!(interpreter.substitute(&template("#arr#")), Ok("[1, 'b']".to_string()));
        assert_eq!(
            interpreter.substitute(&template(r"\#x\# #x#")),
            Ok(r"\#x\# 5".to_string())
        );
        assert!(matches!(
            interpreter.substitute(&template("#x")),
            Err(Exception::Grammar(_))
        ));
        assert!(matches!(
            interpreter.substitute(&template("#y#")),
            Err(Exception::Lookup(_))
        ));
    }

    #[test]
    fn host_escape() {
        let (mut interpreter, output) = interpreter();
        let results = feed(
            &mut interpreter,
            "set x = 5
             raw_python_eval '#x# + 1'
             raw_python_exec \"print(#x#, 'done')\"",
        )
        .unwrap();
        assert_eq!(results[1], Value::Int(6));
        assert_eq!(results[2], Value::Null);
        assert_eq!(output.take(), vec!["5 done".to_string()]);
    }

    #[test]
    fn floats_survive_substitution() {
        let (mut interpreter, _) = interpreter();
        let results = feed(
            &mut interpreter,
            "set big = 100000000.0 * 100000000.0
             set huge = big * big * big * big * big * big * big * big
             set tiny = 1 / 40000
             raw_python_eval '#big#'
             raw_python_eval '#huge#'
             raw_python_eval '#tiny#'",
        )
        .unwrap();
        assert_eq!(results[3], Value::Float(1e16));
        assert_eq!(Ok(results[4].clone()), interpreter.env.get("huge"));
        assert!(matches!(results[4], Value::Float(_)));
        assert_eq!(results[5], Value::Float(2.5e-5));
    }

    #[test]
    fn shadow_substitution() {
        let (mut interpreter, output) = interpreter();
        feed(
            &mut interpreter,
            "fn show(arg) ( raw_python_exec 'print(#__arg#)' ) call show('hi')",
        )
        .unwrap();
        assert_eq!(output.take(), vec!["hi".to_string()]);
    }

    #[test]
    fn consumes_whole_stream() {
        let (mut interpreter, _) = interpreter();
        feed(
            &mut interpreter,
            "fn f(a) ( if a ( a ) else ( 0 ) ) set i = 2 while i ( set i = i - 1 ) call f(i)",
        )
        .unwrap();
        assert_eq!(interpreter.pos(), interpreter.tokens().len());
    }

    #[test]
    fn chunks_share_state() {
        let (mut interpreter, _) = interpreter();
        feed(&mut interpreter, "fn double(a) ( a * 2 )").unwrap();
        assert!(feed(&mut interpreter, "call nope()").is_err());
        assert_eq!(feed(&mut interpreter, "call double(21)"), Ok(vec![Value::Int(42)]));
    }
}
