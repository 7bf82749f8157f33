pub mod environment;
pub mod error;
pub mod host;
pub mod interpret;
pub mod stdlib;
pub mod types;

use crate::error::Exception;
use interpret::Interpreter;
use log::trace;
use stork_syntax::lex::Lexer;
use types::Value;

/// Lexes the source and executes it on the interpreter, returning
/// the value of every top-level statement.
pub fn run(source: &str, interpreter: &mut Interpreter) -> Result<Vec<Value>, Vec<Exception>> {
    let lexer = Lexer::new(source);
    trace!("Lexing {source}");
    let tokens = lexer.lex_all_sanitised().map_err(|e| {
        e.into_iter()
            .map(Exception::Grammar)
            .collect::<Vec<Exception>>()
    })?;
    trace!("Interpreting {tokens:#?}");
    interpreter.interpret_all(tokens).map_err(|e| vec![e])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Sandbox;

    #[test]
    fn lex_errors_are_collected() {
        let mut interpreter = Interpreter::default();
        let errors = run("set x = 1 @ $", &mut interpreter).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, Exception::Grammar(_))));
        // Nothing ran
        assert!(!interpreter.env.contains("x"));
    }

    #[test]
    fn unbalanced_chunk_is_rejected() {
        let mut interpreter = Interpreter::new(Box::new(Sandbox::new()));
        let errors = run("set x = 1 if x ( set y = 2", &mut interpreter).unwrap_err();
        assert!(matches!(errors[..], [Exception::Grammar(_)]));
        assert!(!interpreter.env.contains("x"));
        assert!(interpreter.tokens().is_empty());
    }
}
