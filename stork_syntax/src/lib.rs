pub mod error;
pub mod lex;
pub mod op;
pub mod token;
