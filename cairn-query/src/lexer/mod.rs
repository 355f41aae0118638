//! Lexer module for the artifact query language

pub mod token;
pub mod scanner;

pub use token::*;
pub use scanner::*;
