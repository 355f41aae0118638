//! Abstract Syntax Tree types

use crate::lexer::Token;
use cairn_core::{QueryError, RegistryError};
use serde::{Deserialize, Serialize};

// ============================================================================
// AST TYPES
// ============================================================================

/// A parsed artifact query: an artifact set, an optional predicate over it,
/// and optional relationship steps that navigate away from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub path: LocationPath,
    pub predicate: Option<Expr>,
    pub steps: Option<PathStep>,
    /// Number of `?` placeholders, numbered left to right from zero.
    pub parameters: usize,
}

/// `/s-ramp/{model}/{type}`, `/{model}/{type}` or `//{type}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPath {
    pub model: Option<String>,
    pub type_name: Option<String>,
}

/// One relationship hop, `name[predicate]/next`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub relationship: String,
    pub predicate: Option<Box<Expr>>,
    pub next: Option<Box<PathStep>>,
}

/// Predicate expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Comparison {
        operand: Operand,
        op: CompareOp,
        value: Literal,
    },
    /// Bare `@prop` or attribute function: true when the value is present.
    Exists(Operand),
    /// Relationship existence or navigation.
    Path(PathStep),
    Call(FunctionCall),
}

/// Left-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Property(String),
    Call(FunctionCall),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub prefix: Option<String>,
    pub name: String,
    pub args: Vec<Argument>,
}

impl FunctionCall {
    /// `prefix:name`, or the bare name.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// `.`, the artifact under test.
    Context,
    Literal(Literal),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    String(String),
    Number(f64),
    /// Unbound `?`, by position.
    Parameter(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }
}

// ============================================================================
// PARSE ERRORS
// ============================================================================

/// Parse error with location information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for QueryError {
    fn from(e: ParseError) -> Self {
        QueryError::Parse {
            message: e.message,
            line: e.line,
            column: e.column,
        }
    }
}

impl From<ParseError> for RegistryError {
    fn from(e: ParseError) -> Self {
        RegistryError::Query(e.into())
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// Parser for artifact queries.
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    pub(crate) parameters: usize,
}
