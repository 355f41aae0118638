//! Lexer token types

use std::fmt;

// ============================================================================
// LEXER TYPES
// ============================================================================

/// Token kinds for the artifact query language.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    And,
    Or,

    // Operators
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,

    // Delimiters
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    At,
    Colon,
    Comma,
    Dot,

    // Literals
    String(String),
    Number(f64),
    Name(String),
    /// Positional `?` parameter.
    Placeholder,

    // Special
    Eof,
    Error(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::And => write!(f, "'and'"),
            TokenKind::Or => write!(f, "'or'"),
            TokenKind::Eq => write!(f, "'='"),
            TokenKind::Ne => write!(f, "'!='"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::Ge => write!(f, "'>='"),
            TokenKind::Le => write!(f, "'<='"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::At => write!(f, "'@'"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::String(s) => write!(f, "string '{}'", s),
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Name(s) => write!(f, "name '{}'", s),
            TokenKind::Placeholder => write!(f, "'?'"),
            TokenKind::Eof => write!(f, "end of query"),
            TokenKind::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Source location span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Default for Span {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            line: 1,
            column: 1,
        }
    }
}

/// A token with its kind and source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}
