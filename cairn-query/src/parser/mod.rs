//! Parser module for the artifact query language

pub mod ast;
pub mod parser;

pub use ast::*;
pub use parser::*;
