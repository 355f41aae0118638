//! Lexer implementation

use super::token::*;
use std::iter::Peekable;
use std::str::CharIndices;

// ============================================================================
// LEXER IMPLEMENTATION
// ============================================================================

/// Lexer for artifact queries.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            pos: 0,
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        tokens
    }

    /// Get the next token from the source.
    fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start_pos = self.pos;
        let start_line = self.line;
        let start_col = self.column;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some(c) => match c {
                '/' => {
                    self.advance();
                    TokenKind::Slash
                }
                '(' => {
                    self.advance();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance();
                    TokenKind::RParen
                }
                '[' => {
                    self.advance();
                    TokenKind::LBracket
                }
                ']' => {
                    self.advance();
                    TokenKind::RBracket
                }
                '@' => {
                    self.advance();
                    TokenKind::At
                }
                ':' => {
                    self.advance();
                    TokenKind::Colon
                }
                ',' => {
                    self.advance();
                    TokenKind::Comma
                }
                '?' => {
                    self.advance();
                    TokenKind::Placeholder
                }
                '=' => {
                    self.advance();
                    TokenKind::Eq
                }

                '!' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        TokenKind::Ne
                    } else {
                        TokenKind::Error("Unexpected character: !".to_string())
                    }
                }

                '>' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }

                '<' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }

                '.' => {
                    if self.peek_next_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        self.scan_number(start_pos)
                    } else {
                        self.advance();
                        TokenKind::Dot
                    }
                }

                '-' => {
                    if self.peek_next_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        self.advance();
                        self.scan_number(start_pos)
                    } else {
                        self.advance();
                        TokenKind::Error("Unexpected character: -".to_string())
                    }
                }

                '\'' | '"' => self.scan_string(c),

                c if c.is_ascii_digit() => self.scan_number(start_pos),

                c if c.is_alphabetic() || c == '_' => self.scan_name(),

                c => {
                    self.advance();
                    TokenKind::Error(format!("Unexpected character: {}", c))
                }
            },
        };

        Token {
            kind,
            span: Span {
                start: start_pos,
                end: self.pos,
                line: start_line,
                column: start_col,
            },
        }
    }

    /// Scan a name or keyword. Names may contain `-` and `.` after the
    /// first character, so `s-ramp` and `fn.name` are single names.
    fn scan_name(&mut self) -> TokenKind {
        let start = self.pos;

        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                self.advance();
            } else {
                break;
            }
        }

        match &self.source[start..self.pos] {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            name => TokenKind::Name(name.to_string()),
        }
    }

    /// Scan a quoted string. A doubled quote stands for one literal quote.
    fn scan_string(&mut self, quote: char) -> TokenKind {
        self.advance(); // consume opening quote
        let mut value = String::new();

        loop {
            match self.peek_char() {
                None => return TokenKind::Error("Unterminated string".to_string()),
                Some(c) if c == quote => {
                    self.advance();
                    if self.peek_char() == Some(quote) {
                        self.advance();
                        value.push(quote);
                    } else {
                        break;
                    }
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                    value.push('\n');
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        TokenKind::String(value)
    }

    /// Scan an integer or decimal that began at `start`.
    fn scan_number(&mut self, start: usize) -> TokenKind {
        let mut seen_dot = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.pos];
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Error(format!("Invalid number: {}", text)),
        }
    }

    /// Skip whitespace and `(: ... :)` comments, which may nest.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                Some('(') if self.peek_next_char() == Some(':') => {
                    self.advance(); // (
                    self.advance(); // :
                    let mut depth = 1usize;
                    while depth > 0 {
                        match self.peek_char() {
                            None => break,
                            Some('(') if self.peek_next_char() == Some(':') => {
                                self.advance();
                                self.advance();
                                depth += 1;
                            }
                            Some(':') if self.peek_next_char() == Some(')') => {
                                self.advance();
                                self.advance();
                                depth -= 1;
                            }
                            Some('\n') => {
                                self.advance();
                                self.line += 1;
                                self.column = 1;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut iter = self.source[self.pos..].char_indices();
        iter.next();
        iter.next().map(|(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((i, c)) = self.chars.next() {
            self.pos = i + c.len_utf8();
            self.column += 1;
            Some(c)
        } else {
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lexer_path_and_predicate() {
        assert_eq!(
            kinds("/s-ramp/xsd/XsdDocument[@name = ?]"),
            vec![
                TokenKind::Slash,
                TokenKind::Name("s-ramp".into()),
                TokenKind::Slash,
                TokenKind::Name("xsd".into()),
                TokenKind::Slash,
                TokenKind::Name("XsdDocument".into()),
                TokenKind::LBracket,
                TokenKind::At,
                TokenKind::Name("name".into()),
                TokenKind::Eq,
                TokenKind::Placeholder,
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_operators() {
        assert_eq!(
            kinds("= != > < >= <= and or"),
            vec![
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Gt,
                TokenKind::Lt,
                TokenKind::Ge,
                TokenKind::Le,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_strings_with_doubled_quotes() {
        assert_eq!(
            kinds(r#"'it''s' "say ""hi""" 'a"b'"#),
            vec![
                TokenKind::String("it's".into()),
                TokenKind::String("say \"hi\"".into()),
                TokenKind::String("a\"b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_numbers() {
        assert_eq!(
            kinds("42 -3 2.5 .5"),
            vec![
                TokenKind::Number(42.0),
                TokenKind::Number(-3.0),
                TokenKind::Number(2.5),
                TokenKind::Number(0.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_dot_and_prefixed_function() {
        assert_eq!(
            kinds("fn:matches(., 'x')"),
            vec![
                TokenKind::Name("fn".into()),
                TokenKind::Colon,
                TokenKind::Name("matches".into()),
                TokenKind::LParen,
                TokenKind::Dot,
                TokenKind::Comma,
                TokenKind::String("x".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_skips_nested_comments() {
        assert_eq!(
            kinds("/core (: all (: of :) them :) /Document"),
            vec![
                TokenKind::Slash,
                TokenKind::Name("core".into()),
                TokenKind::Slash,
                TokenKind::Name("Document".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_tracks_line_and_column() {
        let tokens = Lexer::new("/core\n  [@name]").tokenize();
        let bracket = &tokens[2];
        assert_eq!(bracket.kind, TokenKind::LBracket);
        assert_eq!(bracket.span.line, 2);
        assert_eq!(bracket.span.column, 3);
    }

    #[test]
    fn test_lexer_errors() {
        assert!(matches!(kinds("'open")[0], TokenKind::Error(_)));
        assert!(matches!(kinds("#")[0], TokenKind::Error(_)));
        assert!(matches!(kinds("!x")[0], TokenKind::Error(_)));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_tokenize_always_ends_with_eof(source in ".{0,64}") {
            let tokens = Lexer::new(&source).tokenize();
            prop_assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
        }

        #[test]
        fn prop_quoted_strings_round_trip(value in "[^'\n]{0,32}") {
            let source = format!("'{}'", value);
            prop_assert_eq!(kinds_of(&source), vec![TokenKind::String(value), TokenKind::Eof]);
        }
    }

    fn kinds_of(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().into_iter().map(|t| t.kind).collect()
    }
}
