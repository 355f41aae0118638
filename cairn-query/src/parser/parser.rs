//! Parser implementation
//!
//! Grammar, loosely:
//!
//! ```text
//! query      := location ('[' expr ']')? ('/' step)?
//! location   := '/' '/' type | '/' 's-ramp' ('/' model ('/' type)?)? | '/' model ('/' type)?
//! expr       := or_expr ('and' expr)?
//! or_expr    := equality ('or' or_expr)?
//! equality   := '(' expr ')' | '@' name (op literal)? | attr_call (op literal)? | call | step
//! step       := name ('[' expr ']')? ('/' step)?
//! ```
//!
//! `or` binds tighter than `and`.

use super::ast::*;
use crate::lexer::*;

/// Prefix accepted in front of the location path and on built-in functions.
pub const REGISTRY_PREFIX: &str = "s-ramp";

const ATTRIBUTE_FUNCTIONS: [&str; 2] = ["getRelationshipAttribute", "getTargetAttribute"];

impl Parser {
    /// Create a new parser from a vector of tokens.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            parameters: 0,
        }
    }

    /// Parse the tokens into a Query.
    pub fn parse(&mut self) -> Result<Query, ParseError> {
        if let Some(token) = self
            .tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Error(_)))
        {
            let message = match &token.kind {
                TokenKind::Error(msg) => format!("Lexer error: {}", msg),
                _ => "Lexer error".to_string(),
            };
            return Err(ParseError {
                message,
                line: token.span.line,
                column: token.span.column,
            });
        }

        if self.is_at_end() {
            return Err(self.error("Empty query"));
        }

        let path = self.parse_location()?;

        let predicate = if self.check(&TokenKind::LBracket) {
            Some(self.parse_bracketed()?)
        } else {
            None
        };

        let steps = if self.check(&TokenKind::Slash) {
            self.advance();
            Some(self.parse_step()?)
        } else {
            None
        };

        if !self.is_at_end() {
            return Err(self.error(&format!("Unexpected {} after query", self.current().kind)));
        }

        Ok(Query {
            path,
            predicate,
            steps,
            parameters: self.parameters,
        })
    }

    // ========================================================================
    // LOCATION PATH
    // ========================================================================

    /// Parse the leading artifact set. At most the prefix, a model and a
    /// type are consumed; a further `/` starts relationship steps.
    pub(crate) fn parse_location(&mut self) -> Result<LocationPath, ParseError> {
        self.expect(TokenKind::Slash)?;

        if self.check(&TokenKind::Slash) {
            self.advance();
            let type_name = self.expect_name()?;
            return Ok(LocationPath {
                model: None,
                type_name: Some(type_name),
            });
        }

        let mut location = LocationPath::default();
        let first = self.expect_name()?;
        if first == REGISTRY_PREFIX {
            if !self.slash_then_name() {
                return Ok(location);
            }
            self.advance();
            location.model = Some(self.expect_name()?);
        } else {
            location.model = Some(first);
        }

        if self.slash_then_name() {
            self.advance();
            location.type_name = Some(self.expect_name()?);
        }

        Ok(location)
    }

    fn slash_then_name(&self) -> bool {
        self.check(&TokenKind::Slash) && matches!(self.peek_kind(1), Some(TokenKind::Name(_)))
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    pub(crate) fn parse_bracketed(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LBracket)?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::RBracket)?;
        Ok(expr)
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_or()?;
        if self.check(&TokenKind::And) {
            self.advance();
            let right = self.parse_expr()?;
            return Ok(Expr::And(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_equality()?;
        if self.check(&TokenKind::Or) {
            self.advance();
            let right = self.parse_or()?;
            return Ok(Expr::Or(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        match &self.current().kind {
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::At => {
                self.advance();
                let property = self.parse_property_name()?;
                self.parse_comparison_tail(Operand::Property(property))
            }
            TokenKind::Name(_) if self.at_attribute_function() => {
                let call = self.parse_function_call()?;
                self.parse_comparison_tail(Operand::Call(call))
            }
            TokenKind::Name(_) if self.at_function_call() => {
                Ok(Expr::Call(self.parse_function_call()?))
            }
            TokenKind::Name(_) => Ok(Expr::Path(self.parse_step()?)),
            _ => Err(self.error("Expected predicate expression")),
        }
    }

    fn parse_comparison_tail(&mut self, operand: Operand) -> Result<Expr, ParseError> {
        match self.compare_op() {
            Some(op) => {
                self.advance();
                let value = self.parse_literal()?;
                Ok(Expr::Comparison { operand, op, value })
            }
            None => Ok(Expr::Exists(operand)),
        }
    }

    fn compare_op(&self) -> Option<CompareOp> {
        match self.current().kind {
            TokenKind::Eq => Some(CompareOp::Eq),
            TokenKind::Ne => Some(CompareOp::Ne),
            TokenKind::Gt => Some(CompareOp::Gt),
            TokenKind::Lt => Some(CompareOp::Lt),
            TokenKind::Ge => Some(CompareOp::Ge),
            TokenKind::Le => Some(CompareOp::Le),
            _ => None,
        }
    }

    /// `name` or `s-ramp:name`.
    fn parse_property_name(&mut self) -> Result<String, ParseError> {
        let name = self.expect_name()?;
        if !self.check(&TokenKind::Colon) {
            return Ok(name);
        }
        if name != REGISTRY_PREFIX {
            return Err(self.error(&format!("Unsupported property prefix: {}", name)));
        }
        self.advance();
        self.expect_name()
    }

    // ========================================================================
    // STEPS AND CALLS
    // ========================================================================

    pub(crate) fn parse_step(&mut self) -> Result<PathStep, ParseError> {
        let relationship = self.expect_name()?;
        let predicate = if self.check(&TokenKind::LBracket) {
            Some(Box::new(self.parse_bracketed()?))
        } else {
            None
        };
        let next = if self.check(&TokenKind::Slash) {
            self.advance();
            Some(Box::new(self.parse_step()?))
        } else {
            None
        };
        Ok(PathStep {
            relationship,
            predicate,
            next,
        })
    }

    fn at_function_call(&self) -> bool {
        match self.peek_kind(1) {
            Some(TokenKind::LParen) => true,
            Some(TokenKind::Colon) => {
                matches!(self.peek_kind(2), Some(TokenKind::Name(_)))
                    && matches!(self.peek_kind(3), Some(TokenKind::LParen))
            }
            _ => false,
        }
    }

    fn at_attribute_function(&self) -> bool {
        if !self.at_function_call() {
            return false;
        }
        let name = match self.peek_kind(1) {
            Some(TokenKind::Colon) => self.peek_kind(2),
            _ => self.peek_kind(0),
        };
        matches!(name, Some(TokenKind::Name(n)) if ATTRIBUTE_FUNCTIONS.contains(&n.as_str()))
    }

    pub(crate) fn parse_function_call(&mut self) -> Result<FunctionCall, ParseError> {
        let first = self.expect_name()?;
        let (prefix, name) = if self.check(&TokenKind::Colon) {
            self.advance();
            (Some(first), self.expect_name()?)
        } else {
            (None, first)
        };

        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_argument()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        Ok(FunctionCall { prefix, name, args })
    }

    fn parse_argument(&mut self) -> Result<Argument, ParseError> {
        match &self.current().kind {
            TokenKind::Dot => {
                self.advance();
                Ok(Argument::Context)
            }
            TokenKind::String(_) | TokenKind::Number(_) | TokenKind::Placeholder => {
                Ok(Argument::Literal(self.parse_literal()?))
            }
            _ => Ok(Argument::Expr(self.parse_expr()?)),
        }
    }

    pub(crate) fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let literal = match &self.current().kind {
            TokenKind::String(s) => Literal::String(s.clone()),
            TokenKind::Number(n) => Literal::Number(*n),
            TokenKind::Placeholder => {
                let index = self.parameters;
                self.parameters += 1;
                Literal::Parameter(index)
            }
            TokenKind::Name(n) if n == "true" || n == "false" => Literal::String(n.clone()),
            _ => return Err(self.error("Expected literal")),
        };
        self.advance();
        Ok(literal)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    pub(crate) fn peek_kind(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    pub(crate) fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("Expected {}, found {}", kind, self.current().kind)))
        }
    }

    pub(crate) fn expect_name(&mut self) -> Result<String, ParseError> {
        match &self.current().kind {
            TokenKind::Name(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            other => Err(self.error(&format!("Expected name, found {}", other))),
        }
    }

    pub(crate) fn error(&self, msg: &str) -> ParseError {
        let span = self.current().span;
        ParseError {
            message: msg.to_string(),
            line: span.line,
            column: span.column,
        }
    }
}

// ============================================================================
// CONVENIENCE FUNCTIONS
// ============================================================================

/// Parse query text into an AST.
pub fn parse(source: &str) -> Result<Query, ParseError> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize();
    let mut parser = Parser::new(tokens);
    parser.parse()
}

/// Parse and pretty-print a query (for round-trip testing).
pub fn round_trip(source: &str) -> Result<String, ParseError> {
    let query = parse(source)?;
    Ok(crate::pretty_printer::pretty_print(&query))
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_parse_never_panics(source in "[/@a-z\\[\\]()=?'., ]{0,40}") {
            let _ = parse(&source);
        }

        #[test]
        fn prop_string_literals_survive_round_trip(value in "[a-zA-Z0-9 '\"]{0,20}") {
            let escaped = value.replace('\'', "''");
            let source = format!("/core/Document[@name = '{}']", escaped);
            let query = parse(&source).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let printed = crate::pretty_printer::pretty_print(&query);
            let reparsed = parse(&printed).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(reparsed, query);
        }

        #[test]
        fn prop_placeholder_count_matches_question_marks(n in 1usize..6) {
            let clauses: Vec<String> = (0..n).map(|i| format!("@p{} = ?", i)).collect();
            let source = format!("/s-ramp[{}]", clauses.join(" and "));
            let query = parse(&source).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(query.parameters, n);
        }
    }
}
