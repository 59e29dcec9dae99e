//! Recursive descent parser for model files
//!
//! ```text
//! model       := 'namespace' NAME import* declaration* EOF
//! import      := 'import' NAME ('from' URI)?
//! declaration := decorator* 'abstract'? KIND NAME header* '{' member* '}'
//! header      := 'identified' ('by' NAME)? | 'extends' NAME
//! member      := decorator* ('o' | '-->') TYPE ('[' ']')? NAME modifier*
//! modifier    := 'optional' | 'default' '=' LITERAL
//!              | 'range' '=' '[' NUMBER? ',' NUMBER? ']' | 'regex' '=' REGEX
//! decorator   := '@' NAME ('(' (arg (',' arg)*)? ')')?
//! ```
//!
//! Enum members are `decorator* 'o' NAME`.

use serde_json::Value;

use super::ast::*;
use super::tokenizer::{Span, SpannedToken, Token, Tokenizer};
use crate::{Error, Result};

/// Parse model source text into a [`ModelFile`]
///
/// # Errors
/// `ParseError` with `line:column` for the first syntax violation.
pub fn parse(input: &str) -> Result<ModelFile> {
    let tokens = Tokenizer::new(input).tokenize()?;
    Parser::new(tokens).parse_model()
}

struct Parser {
    tokens: Vec<SpannedToken>,
    position: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Parser {
            tokens,
            position: 0,
        }
    }

    // ── Token helpers ──────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(|t| t.span.clone())
            .unwrap_or(Span {
                line: 1,
                column: 1,
                offset: 0,
            })
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn check(&self, expected: &Token) -> bool {
        self.peek() == expected
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, expected: &str) -> Result<T> {
        Err(Error::ParseError(format!(
            "Expected {} but found {} at {}",
            expected,
            describe(self.peek()),
            self.span()
        )))
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            self.error(what)
        }
    }

    /// Identifier, or a keyword used in name position
    fn expect_name(&mut self, what: &str) -> Result<String> {
        let name = match self.peek() {
            Token::Identifier(name) => name.clone(),
            other => match other.keyword_text() {
                Some(text) => text.to_string(),
                None => return self.error(what),
            },
        };
        self.advance();
        Ok(name)
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Identifier(w) if w == word)
    }

    // ── Grammar ────────────────────────────────────────────

    fn parse_model(&mut self) -> Result<ModelFile> {
        self.expect(Token::Namespace, "'namespace'")?;
        let namespace = self.expect_name("namespace name")?;

        let mut imports = Vec::new();
        while self.eat(&Token::Import) {
            let name = self.expect_name("import name")?;
            let uri = if self.eat(&Token::From) {
                match self.advance() {
                    Token::Uri(uri) => Some(uri),
                    _ => {
                        self.position -= 1;
                        return self.error("URI after 'from'");
                    }
                }
            } else {
                None
            };
            imports.push(Import { name, uri });
        }

        let mut declarations = Vec::new();
        while !self.check(&Token::Eof) {
            declarations.push(self.parse_declaration()?);
        }

        Ok(ModelFile {
            namespace,
            imports,
            declarations,
        })
    }

    fn parse_decorators(&mut self) -> Result<Vec<Decorator>> {
        let mut decorators = Vec::new();
        while self.eat(&Token::At) {
            let name = self.expect_name("decorator name")?;
            let mut arguments = Vec::new();
            if self.eat(&Token::LParen) {
                if !self.check(&Token::RParen) {
                    loop {
                        arguments.push(self.parse_decorator_argument()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen, "')'")?;
            }
            decorators.push(Decorator { name, arguments });
        }
        Ok(decorators)
    }

    fn parse_decorator_argument(&mut self) -> Result<Value> {
        if let Some(value) = self.parse_literal() {
            return Ok(value);
        }
        // type references are carried by name
        Ok(Value::String(self.expect_name("decorator argument")?))
    }

    fn parse_declaration(&mut self) -> Result<Declaration> {
        let decorators = self.parse_decorators()?;
        let is_abstract = self.eat(&Token::Abstract);

        let kind = match self.peek() {
            Token::Asset => DeclarationKind::Asset,
            Token::Participant => DeclarationKind::Participant,
            Token::Transaction => DeclarationKind::Transaction,
            Token::Event => DeclarationKind::Event,
            Token::Concept => DeclarationKind::Concept,
            Token::Enum => DeclarationKind::Enum,
            _ => return self.error("declaration"),
        };
        self.advance();
        let name = self.expect_name("declaration name")?;

        let mut declaration = Declaration {
            kind,
            name,
            is_abstract,
            identified_by: None,
            extends: None,
            decorators,
            properties: Vec::new(),
            values: Vec::new(),
        };

        loop {
            if self.eat(&Token::Identified) {
                let field = if self.eat(&Token::By) {
                    self.expect_name("identifying field")?
                } else {
                    String::new()
                };
                declaration.identified_by = Some(field);
            } else if self.eat(&Token::Extends) {
                declaration.extends = Some(self.expect_name("super type")?);
            } else {
                break;
            }
        }

        self.expect(Token::LBrace, "'{'")?;
        while !self.eat(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return self.error("'}'");
            }
            if kind == DeclarationKind::Enum {
                declaration.values.push(self.parse_enum_value()?);
            } else {
                declaration.properties.push(self.parse_property()?);
            }
        }

        Ok(declaration)
    }

    fn parse_enum_value(&mut self) -> Result<EnumValue> {
        let decorators = self.parse_decorators()?;
        if !self.is_word("o") {
            return self.error("'o'");
        }
        self.advance();
        let name = self.expect_name("enum value")?;
        Ok(EnumValue { name, decorators })
    }

    fn parse_property(&mut self) -> Result<Property> {
        let decorators = self.parse_decorators()?;

        let kind = if self.eat(&Token::Arrow) {
            PropertyKind::Relationship
        } else if self.is_word("o") {
            self.advance();
            PropertyKind::Field
        } else {
            return self.error("'o' or '-->'");
        };

        let type_name = self.expect_name("property type")?;
        let array = if self.eat(&Token::LBracket) {
            self.expect(Token::RBracket, "']'")?;
            true
        } else {
            false
        };
        let name = self.expect_name("property name")?;

        let mut property = Property {
            kind,
            name,
            type_name,
            array,
            optional: false,
            default: None,
            range: None,
            regex: None,
            decorators,
        };

        loop {
            if self.eat(&Token::Optional) {
                property.optional = true;
            } else if self.is_word("default") {
                self.advance();
                self.expect(Token::Equals, "'='")?;
                match self.parse_literal() {
                    Some(value) => property.default = Some(value),
                    None => return self.error("default value"),
                }
            } else if self.is_word("range") {
                self.advance();
                self.expect(Token::Equals, "'='")?;
                property.range = Some(self.parse_range()?);
            } else if self.is_word("regex") {
                self.advance();
                self.expect(Token::Equals, "'='")?;
                match self.advance() {
                    Token::RegexLiteral(regex) => property.regex = Some(regex),
                    _ => {
                        self.position -= 1;
                        return self.error("regex literal");
                    }
                }
            } else {
                break;
            }
        }

        Ok(property)
    }

    fn parse_range(&mut self) -> Result<Range> {
        self.expect(Token::LBracket, "'['")?;
        let lower = self.parse_number();
        self.expect(Token::Comma, "','")?;
        let upper = self.parse_number();
        self.expect(Token::RBracket, "']'")?;
        Ok(Range { lower, upper })
    }

    fn parse_number(&mut self) -> Option<Value> {
        let value = match self.peek() {
            Token::IntegerLiteral(i) => Value::from(*i),
            Token::FloatLiteral(f) => Value::from(*f),
            _ => return None,
        };
        self.advance();
        Some(value)
    }

    fn parse_literal(&mut self) -> Option<Value> {
        if let Some(number) = self.parse_number() {
            return Some(number);
        }
        let value = match self.peek() {
            Token::StringLiteral(s) => Value::String(s.clone()),
            Token::BooleanLiteral(b) => Value::Bool(*b),
            _ => return None,
        };
        self.advance();
        Some(value)
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Eof => "end of input".to_string(),
        Token::Identifier(name) => format!("'{}'", name),
        Token::StringLiteral(s) => format!("string \"{}\"", s),
        Token::IntegerLiteral(i) => i.to_string(),
        Token::FloatLiteral(f) => f.to_string(),
        Token::BooleanLiteral(b) => b.to_string(),
        Token::RegexLiteral(r) => r.clone(),
        Token::Uri(u) => u.clone(),
        Token::LBrace => "'{'".to_string(),
        Token::RBrace => "'}'".to_string(),
        Token::LBracket => "'['".to_string(),
        Token::RBracket => "']'".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Equals => "'='".to_string(),
        Token::At => "'@'".to_string(),
        Token::Arrow => "'-->'".to_string(),
        keyword => format!("'{}'", keyword.keyword_text().unwrap_or("?")),
    }
}
