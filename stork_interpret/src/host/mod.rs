mod lex;
mod parse;

use std::{cell::RefCell, collections::HashMap, fmt::Debug, rc::Rc};

use log::trace;
use stork_syntax::op::BinOp;

use crate::{
    error::{host_error, ErrorMsg, Exception},
    stdlib,
    types::{NativeFunc, Value},
};
use lex::HostLexer;
use parse::{HostExpr, HostParser, HostStmt, LogicalOp};

/// The capability behind `raw_python_exec` and `raw_python_eval`:
/// run a piece of text as code in the embedding environment.
pub trait Host: Debug {
    fn exec(&mut self, code: &str) -> Result<(), Exception>;
    fn eval(&mut self, code: &str) -> Result<Value, Exception>;
}

/// Lines printed by a captured sandbox. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct Output(Rc<RefCell<Vec<String>>>);

impl Output {
    pub fn take(&self) -> Vec<String> {
        self.0.take()
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

#[derive(Debug)]
enum Sink {
    Stdout,
    Captured(Output),
}

/// A restricted, Python-flavoured expression language. Names can
/// only refer to registered native functions, so substituted text
/// can never reach anything the embedder did not hand out.
#[derive(Debug)]
pub struct Sandbox {
    natives: HashMap<String, NativeFunc>,
    sink: Sink,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    /// A sandbox printing to stdout
    pub fn new() -> Self {
        Self::with_sink(Sink::Stdout)
    }

    /// A sandbox whose printed lines are collected into the returned `Output`
    pub fn captured() -> (Self, Output) {
        let output = Output::default();
        (Self::with_sink(Sink::Captured(output.clone())), output)
    }

    fn with_sink(sink: Sink) -> Self {
        let mut sandbox = Self {
            natives: HashMap::default(),
            sink,
        };
        stdlib::init_natives(&mut sandbox);
        sandbox
    }

    pub fn register(&mut self, func: NativeFunc) {
        self.natives.insert(func.name.clone(), func);
    }

    pub fn write_line(&mut self, line: String) {
        match &self.sink {
            Sink::Stdout => println!("{line}"),
            Sink::Captured(output) => output.0.borrow_mut().push(line),
        }
    }

    fn parse(code: &str) -> Result<Vec<HostStmt>, Exception> {
        trace!("Host code {code}");
        let tokens = HostLexer::new(code).lex_all()?;
        HostParser::new(&tokens).parse_program()
    }

    fn exec_stmt(&mut self, stmt: &HostStmt) -> Result<(), Exception> {
        match stmt {
            HostStmt::Expr(expr) => self.eval_expr(expr).map(|_| ()),
            HostStmt::Raise { name, args } => {
                let args = self.eval_all(args)?;
                let message = args
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<String>>()
                    .join(", ");
                Err(host_error(
                    ErrorMsg::Raised,
                    if message.is_empty() {
                        name.clone()
                    } else {
                        format!("{name}: {message}")
                    },
                ))
            }
            HostStmt::Assert { condition, message } => {
                if self.eval_expr(condition)?.is_truthy() {
                    return Ok(());
                }
                let message = match message {
                    Some(expr) => self.eval_expr(expr)?.to_string(),
                    None => String::default(),
                };
                Err(host_error(ErrorMsg::AssertionFailed, message))
            }
        }
    }

    fn eval_all(&mut self, exprs: &[HostExpr]) -> Result<Vec<Value>, Exception> {
        exprs.iter().map(|expr| self.eval_expr(expr)).collect()
    }

    fn eval_expr(&mut self, expr: &HostExpr) -> Result<Value, Exception> {
        match expr {
            HostExpr::Literal(value) => Ok(value.clone()),
            HostExpr::Name(name) => Err(match self.natives.get(name) {
                Some(func) => host_error(ErrorMsg::InvalidHostCode, format!("{func} used as a value")),
                None => host_error(ErrorMsg::UndefinedName, name),
            }),
            HostExpr::List(items) => Ok(Value::Array(self.eval_all(items)?)),
            HostExpr::Negate(expr) => match self.eval_expr(expr)? {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| host_error(ErrorMsg::IntegerOverflow, "-")),
                Value::Float(n) => Ok(Value::Float(-n)),
                value => Err(host_error(
                    ErrorMsg::UnsupportedOperands,
                    format!("unary -: '{}'", value.type_name()),
                )),
            },
            HostExpr::Not(expr) => Ok(Value::Int(i64::from(!self.eval_expr(expr)?.is_truthy()))),
            HostExpr::Binary { lhs, op, rhs } => {
                let left = self.eval_expr(lhs)?;
                let right = self.eval_expr(rhs)?;
                Self::apply(&left, *op, &right)
            }
            HostExpr::Logical { lhs, op, rhs } => {
                let left = self.eval_expr(lhs)?;
                match (op, left.is_truthy()) {
                    (LogicalOp::Or, true) | (LogicalOp::And, false) => Ok(left),
                    _ => self.eval_expr(rhs),
                }
            }
            HostExpr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.eval_expr(condition)?.is_truthy() {
                    self.eval_expr(then)
                } else {
                    self.eval_expr(otherwise)
                }
            }
            HostExpr::Call { func, args } => {
                let HostExpr::Name(name) = func.as_ref() else {
                    return Err(host_error(
                        ErrorMsg::NotCallable,
                        self.eval_expr(func)?.type_name(),
                    ));
                };
                let args = self.eval_all(args)?;
                self.call_native(name, args)
            }
            HostExpr::Index { object, index } => {
                let object = self.eval_expr(object)?;
                let index = self.eval_expr(index)?;
                Self::index(object, index)
            }
        }
    }

    fn apply(left: &Value, op: BinOp, right: &Value) -> Result<Value, Exception> {
        left.binary(op, right).map_err(|msg| {
            let ctx = match msg {
                ErrorMsg::UnsupportedOperands => format!(
                    "{op}: '{}' and '{}'",
                    left.type_name(),
                    right.type_name()
                ),
                _ => op.to_string(),
            };
            host_error(msg, ctx)
        })
    }

    fn index(object: Value, index: Value) -> Result<Value, Exception> {
        let Value::Int(i) = index else {
            return Err(host_error(
                ErrorMsg::InvalidIndex,
                format!("{} with {}", object.type_name(), index.type_name()),
            ));
        };
        let resolve = |len: usize| {
            let len = i64::try_from(len).ok()?;
            let i = if i < 0 { i + len } else { i };
            (0..len).contains(&i).then_some(i as usize)
        };
        match object {
            Value::Array(values) => resolve(values.len())
                .map(|i| values[i].clone())
                .ok_or_else(|| host_error(ErrorMsg::IndexOutOfRange, i)),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                resolve(chars.len())
                    .map(|i| Value::Str(chars[i].to_string()))
                    .ok_or_else(|| host_error(ErrorMsg::IndexOutOfRange, i))
            }
            _ => Err(host_error(ErrorMsg::InvalidIndex, object.type_name())),
        }
    }

    fn call_native(&mut self, name: &str, args: Vec<Value>) -> Result<Value, Exception> {
        let Some(func) = self.natives.get(name).cloned() else {
            return Err(host_error(ErrorMsg::UndefinedName, name));
        };
        if let Some(arity) = func.arity {
            if arity != args.len() {
                return Err(host_error(
                    ErrorMsg::InvalidArgs,
                    format!("{name}: expected {arity} arguments, found {}", args.len()),
                ));
            }
        }
        (func.body)(self, args)
    }
}

impl Host for Sandbox {
    fn exec(&mut self, code: &str) -> Result<(), Exception> {
        Self::parse(code)?
            .iter()
            .try_for_each(|stmt| self.exec_stmt(stmt))
    }

    fn eval(&mut self, code: &str) -> Result<Value, Exception> {
        match Self::parse(code)?.as_slice() {
            [HostStmt::Expr(expr)] => self.eval_expr(expr),
            _ => Err(host_error(
                ErrorMsg::InvalidHostCode,
                format!("expected a single expression in {code:?}"),
            )),
        }
    }
}
