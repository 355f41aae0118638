//! CAIRN Query - Artifact Query Language
//!
//! Parses path-and-predicate queries over the artifact registry, binds
//! positional parameters, and evaluates them against a read snapshot.
//!
//! Architecture:
//! ```text
//! Query text ("/s-ramp/xsd/XsdDocument[@name = ?]")
//!     ↓
//! Lexer (tokens, `?` counted as placeholders)
//!     ↓
//! Parser (AST)
//!     ↓
//! bind (ParamCount check, literal substitution)
//!     ↓
//! Compiler (function validation, regexes, classifier URIs)
//!     ↓
//! Evaluator (snapshot catalog)
//!     ↓
//! ResultSet (ordered page, read lazily)
//! ```

pub mod binding;
pub mod compiler;
pub mod evaluator;
pub mod lexer;
pub mod manager;
pub mod parser;
pub mod pretty_printer;
pub mod query;
pub mod result_set;

// Re-export key types for convenience
pub use binding::{bind, QueryParam};
pub use compiler::{compile, QueryPlan};
pub use manager::{Page, PageEntry, PageRequest, QueryManager};
pub use parser::{parse, ParseError, Query};
pub use pretty_printer::pretty_print;
pub use query::{ArtifactQuery, QueryState};
pub use result_set::ResultSet;
