//! Model tokenizer — converts model definition text into a token stream
//!
//! Handles: keywords, dotted identifiers, string literals, integer/float
//! literals (with sign), regex literals, URIs, the relationship arrow and
//! punctuation. Comments (`//` and `/* */`) are discarded.

use crate::{Error, Result};

/// Token types for the model language
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Namespace,
    Import,
    From,
    Abstract,
    Asset,
    Participant,
    Transaction,
    Event,
    Concept,
    Enum,
    Identified,
    By,
    Extends,
    Optional,

    // Literals
    StringLiteral(String),
    IntegerLiteral(i64),
    FloatLiteral(f64),
    BooleanLiteral(bool),
    RegexLiteral(String),
    Uri(String),

    // Symbols
    LBrace,   // {
    RBrace,   // }
    LBracket, // [
    RBracket, // ]
    LParen,   // (
    RParen,   // )
    Comma,    // ,
    Equals,   // =
    At,       // @
    Arrow,    // -->

    // Other
    Identifier(String),
    Eof,
}

impl Token {
    /// Source spelling of a keyword token
    pub fn keyword_text(&self) -> Option<&'static str> {
        let text = match self {
            Token::Namespace => "namespace",
            Token::Import => "import",
            Token::From => "from",
            Token::Abstract => "abstract",
            Token::Asset => "asset",
            Token::Participant => "participant",
            Token::Transaction => "transaction",
            Token::Event => "event",
            Token::Concept => "concept",
            Token::Enum => "enum",
            Token::Identified => "identified",
            Token::By => "by",
            Token::Extends => "extends",
            Token::Optional => "optional",
            _ => return None,
        };
        Some(text)
    }
}

/// Position in source text for error reporting
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token with source position
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenizer for model source text
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Tokenizer {
    pub fn new(text: &str) -> Self {
        Tokenizer {
            input: text.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire input into a stream of spanned tokens
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments()?;

            if self.is_at_end() {
                tokens.push(SpannedToken {
                    token: Token::Eof,
                    span: self.current_span(),
                });
                break;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }

        Ok(tokens)
    }

    // ── Character helpers ──────────────────────────────────

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied();
        if let Some(c) = ch {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn current_span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }

    fn single(&mut self, token: Token, span: Span) -> Result<SpannedToken> {
        self.advance();
        Ok(SpannedToken { token, span })
    }

    // ── Whitespace & Comments ──────────────────────────────

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            while let Some(ch) = self.peek() {
                if ch.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }

            if self.peek() == Some('/') && self.peek_ahead(1) == Some('/') {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            if self.peek() == Some('/') && self.peek_ahead(1) == Some('*') {
                let start = self.current_span();
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        None => {
                            return Err(Error::ParseError(format!(
                                "Unterminated comment starting at {}",
                                start
                            )));
                        }
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            break;
                        }
                        Some(_) => {}
                    }
                }
                continue;
            }

            return Ok(());
        }
    }

    // ── Main dispatch ──────────────────────────────────────

    fn next_token(&mut self) -> Result<SpannedToken> {
        let span = self.current_span();
        let ch = match self.peek() {
            Some(c) => c,
            None => {
                return Ok(SpannedToken {
                    token: Token::Eof,
                    span,
                })
            }
        };

        match ch {
            '{' => self.single(Token::LBrace, span),
            '}' => self.single(Token::RBrace, span),
            '[' => self.single(Token::LBracket, span),
            ']' => self.single(Token::RBracket, span),
            '(' => self.single(Token::LParen, span),
            ')' => self.single(Token::RParen, span),
            ',' => self.single(Token::Comma, span),
            '=' => self.single(Token::Equals, span),
            '@' => self.single(Token::At, span),
            '"' | '\'' => self.read_string(ch, span),
            '/' => self.read_regex(span),
            '-' if self.peek_ahead(1) == Some('-') && self.peek_ahead(2) == Some('>') => {
                self.advance();
                self.advance();
                self.advance();
                Ok(SpannedToken {
                    token: Token::Arrow,
                    span,
                })
            }
            '-' if self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number(span)
            }
            c if c.is_ascii_digit() => self.read_number(span),
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                self.read_identifier_or_keyword(span)
            }
            _ => Err(Error::ParseError(format!(
                "Unexpected character '{}' at {}",
                ch, span
            ))),
        }
    }

    // ── String literals ────────────────────────────────────

    fn read_string(&mut self, quote: char, span: Span) -> Result<SpannedToken> {
        self.advance();
        let mut value = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(Error::ParseError(format!(
                        "Unterminated string starting at {}",
                        span
                    )));
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('\'') => value.push('\''),
                    Some(c) => {
                        return Err(Error::ParseError(format!(
                            "Invalid escape sequence '\\{}' at {}",
                            c,
                            self.current_span()
                        )));
                    }
                    None => {
                        return Err(Error::ParseError(format!(
                            "Unterminated escape sequence at {}",
                            self.current_span()
                        )));
                    }
                },
                Some(c) => value.push(c),
            }
        }

        Ok(SpannedToken {
            token: Token::StringLiteral(value),
            span,
        })
    }

    // ── Regex literals: /body/flags ────────────────────────

    fn read_regex(&mut self, span: Span) -> Result<SpannedToken> {
        self.advance(); // opening /
        let mut body = String::new();

        loop {
            match self.advance() {
                None | Some('\n') => {
                    return Err(Error::ParseError(format!(
                        "Unterminated regex starting at {}",
                        span
                    )));
                }
                Some('/') => break,
                Some('\\') => {
                    body.push('\\');
                    if let Some(c) = self.advance() {
                        body.push(c);
                    }
                }
                Some(c) => body.push(c),
            }
        }

        let mut literal = format!("/{}/", body);
        while let Some(flag) = self.peek() {
            if flag.is_ascii_alphabetic() {
                literal.push(flag);
                self.advance();
            } else {
                break;
            }
        }

        Ok(SpannedToken {
            token: Token::RegexLiteral(literal),
            span,
        })
    }

    // ── Numbers ────────────────────────────────────────────

    fn read_number(&mut self, span: Span) -> Result<SpannedToken> {
        let start = self.position;
        let mut is_float = false;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !is_float && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.advance();
            } else if (ch == 'e' || ch == 'E') && !self.input[start..self.position].contains(&'e') {
                is_float = true;
                self.advance();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.advance();
                }
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();

        if is_float {
            let val: f64 = text.parse().map_err(|_| {
                Error::ParseError(format!("Invalid float '{}' at {}", text, span))
            })?;
            Ok(SpannedToken {
                token: Token::FloatLiteral(val),
                span,
            })
        } else {
            let val: i64 = text.parse().map_err(|_| {
                Error::ParseError(format!("Invalid integer '{}' at {}", text, span))
            })?;
            Ok(SpannedToken {
                token: Token::IntegerLiteral(val),
                span,
            })
        }
    }

    // ── Identifiers, URIs & Keywords ───────────────────────

    fn read_identifier_or_keyword(&mut self, span: Span) -> Result<SpannedToken> {
        let start = self.position;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' || ch == '.' || ch == '*' {
                self.advance();
            } else {
                break;
            }
        }

        // scheme://rest — everything up to the next whitespace
        if self.peek() == Some(':') && self.peek_ahead(1) == Some('/') && self.peek_ahead(2) == Some('/') {
            while let Some(ch) = self.peek() {
                if ch.is_whitespace() {
                    break;
                }
                self.advance();
            }
            let uri: String = self.input[start..self.position].iter().collect();
            return Ok(SpannedToken {
                token: Token::Uri(uri),
                span,
            });
        }

        let text: String = self.input[start..self.position].iter().collect();

        let token = match text.as_str() {
            "namespace" => Token::Namespace,
            "import" => Token::Import,
            "from" => Token::From,
            "abstract" => Token::Abstract,
            "asset" => Token::Asset,
            "participant" => Token::Participant,
            "transaction" => Token::Transaction,
            "event" => Token::Event,
            "concept" => Token::Concept,
            "enum" => Token::Enum,
            "identified" => Token::Identified,
            "by" => Token::By,
            "extends" => Token::Extends,
            "optional" => Token::Optional,

            "true" => Token::BooleanLiteral(true),
            "false" => Token::BooleanLiteral(false),

            _ => Token::Identifier(text),
        };

        Ok(SpannedToken { token, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(input: &str) -> Vec<Token> {
        Tokenizer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|st| st.token)
            .collect()
    }

    fn tokenize_err(input: &str) -> String {
        Tokenizer::new(input).tokenize().unwrap_err().to_string()
    }

    fn ident(s: &str) -> Token {
        Token::Identifier(s.to_string())
    }

    #[test]
    fn test_tokenize_keywords() {
        let tokens = tokenize("namespace import abstract asset identified by extends optional");
        assert_eq!(
            tokens,
            vec![
                Token::Namespace,
                Token::Import,
                Token::Abstract,
                Token::Asset,
                Token::Identified,
                Token::By,
                Token::Extends,
                Token::Optional,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_dotted_names() {
        let tokens = tokenize("namespace org.acme.sample @Doc");
        assert_eq!(tokens[1], ident("org.acme.sample"));
        assert_eq!(tokens[2], Token::At);
    }

    #[test]
    fn test_tokenize_wildcard_import() {
        let tokens = tokenize("import org.acme.*");
        assert_eq!(tokens, vec![Token::Import, ident("org.acme.*"), Token::Eof]);
    }

    #[test]
    fn test_tokenize_uri() {
        let tokens = tokenize("from https://models.example.org/contract.cto\n");
        assert_eq!(
            tokens,
            vec![
                Token::From,
                Token::Uri("https://models.example.org/contract.cto".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_property_line() {
        let tokens = tokenize("o String[] tags optional");
        assert_eq!(
            tokens,
            vec![
                ident("o"),
                ident("String"),
                Token::LBracket,
                Token::RBracket,
                ident("tags"),
                Token::Optional,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_arrow() {
        let tokens = tokenize("--> Person owner");
        assert_eq!(tokens, vec![Token::Arrow, ident("Person"), ident("owner"), Token::Eof]);
    }

    #[test]
    fn test_tokenize_numbers() {
        let tokens = tokenize("42 -7 3.5 -0.25 1e3");
        assert_eq!(
            tokens,
            vec![
                Token::IntegerLiteral(42),
                Token::IntegerLiteral(-7),
                Token::FloatLiteral(3.5),
                Token::FloatLiteral(-0.25),
                Token::FloatLiteral(1000.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_strings() {
        let tokens = tokenize(r#""double" 'single' "esc\"aped""#);
        assert_eq!(
            tokens,
            vec![
                Token::StringLiteral("double".into()),
                Token::StringLiteral("single".into()),
                Token::StringLiteral("esc\"aped".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_regex() {
        let tokens = tokenize(r"regex=/^[a-z]+\/x$/i");
        assert_eq!(
            tokens,
            vec![
                ident("regex"),
                Token::Equals,
                Token::RegexLiteral(r"/^[a-z]+\/x$/i".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_skip_comments() {
        let tokens = tokenize("/* block\n comment */ asset // trailing\nconcept");
        assert_eq!(tokens, vec![Token::Asset, Token::Concept, Token::Eof]);
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert!(tokenize_err("/* never ends").contains("Unterminated comment"));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize_err(r#""hello"#).contains("Unterminated string"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize_err("asset #");
        assert!(err.contains("Unexpected character '#' at 1:7"), "got: {}", err);
    }

    #[test]
    fn test_span_tracking() {
        let tokens = Tokenizer::new("asset Car {\n  o String vin\n}").tokenize().unwrap();
        assert_eq!(tokens[0].span, Span { line: 1, column: 1, offset: 0 });
        assert_eq!(tokens[2].span, Span { line: 1, column: 11, offset: 10 });
        assert_eq!(tokens[3].span, Span { line: 2, column: 3, offset: 14 });
        assert_eq!(tokens[6].token, Token::RBrace);
        assert_eq!(tokens[6].span.line, 3);
    }

    #[test]
    fn test_keyword_text() {
        assert_eq!(Token::From.keyword_text(), Some("from"));
        assert_eq!(ident("x").keyword_text(), None);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(tokenize("  \n\t "), vec![Token::Eof]);
    }
}
