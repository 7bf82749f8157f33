use std::collections::HashMap;

use log::debug;

use crate::{
    error::ErrorMsg,
    types::{Func, Value},
};

/// Prefix that addresses a parameter shadow explicitly, e.g. `#__arg#`
pub const SHADOW_MARKER: &str = "__";

#[derive(Clone, Debug, PartialEq)]
pub enum Symbol {
    Value(Value),
    Func(Func),
}

/// Parameter bindings of one active call
pub type Frame = HashMap<String, Value>;

/// The global symbol table plus the stack of active call frames.
/// Globals have no scoping: a name set anywhere is visible everywhere.
/// Frames only hold parameters and disappear when their call returns.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Env {
    symbols: HashMap<String, Symbol>,
    frames: Vec<Frame>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        debug!("Set {name} -> {value:?}");
        self.symbols.insert(name.to_string(), Symbol::Value(value));
    }

    pub fn define(&mut self, func: Func) {
        debug!("Define {func}");
        self.symbols.insert(func.name.clone(), Symbol::Func(func));
    }

    /// Resolves a name as a value: the global binding wins, then the
    /// parameter shadows from the innermost call outwards. A name
    /// spelled with the shadow marker only matches a parameter.
    pub fn get(&self, name: &str) -> Result<Value, ErrorMsg> {
        debug!("Get {name}");
        match self.symbols.get(name) {
            Some(Symbol::Value(value)) => return Ok(value.clone()),
            Some(Symbol::Func(_)) => return Err(ErrorMsg::NotAValue),
            None => (),
        }
        if let Some(value) = self.shadow(name) {
            debug!("Get {name} from call frame");
            return Ok(value.clone());
        }
        name.strip_prefix(SHADOW_MARKER)
            .and_then(|param| self.shadow(param))
            .cloned()
            .ok_or(ErrorMsg::UndefinedVar)
    }

    pub fn get_func(&self, name: &str) -> Result<Func, ErrorMsg> {
        debug!("Get function {name}");
        match self.symbols.get(name) {
            Some(Symbol::Func(func)) => Ok(func.clone()),
            Some(Symbol::Value(_)) => Err(ErrorMsg::NotAFunction),
            None => Err(ErrorMsg::UndefinedFunc),
        }
    }

    /// The innermost active binding of a parameter
    pub fn shadow(&self, param: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(param))
    }

    pub fn push_frame(&mut self, frame: Frame) {
        debug!("Push frame {frame:?}");
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        debug!("Pop frame at depth {}", self.frames.len());
        self.frames.pop()
    }

    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }
}
