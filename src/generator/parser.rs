//! Recursive-descent parser for the message description language.
//!
//! Grammar sketch:
//!
//! ```text
//! Description := [Namespace] Decl*
//! Namespace   := "namespace" DottedIdent ";"
//! Decl        := Enumerate | Structure | Message | External | Include | Import
//! Enumerate   := "enumerate" Ident "{" Ident ("," Ident)* "}"
//! Structure   := "structure" Ident FieldList
//! Message     := "message" Ident FieldList
//! FieldList   := "{" Field* "}"
//! Field       := Ident [ "[" [UInt] "]" ] Ident [ Properties ] [ "=" Value ] ";"
//! Properties  := "(" ( KwProp (":" KwProp)* | Value (":" Value)* (":" KwProp)* ) ")"
//! ```

use super::ast::*;
use super::lexer::{unquote, Lexer, Token, TokenKind};
use super::ParseError;

/// Parse one description from `text`, attributing errors to `file`.
pub fn parse(text: &str, file: &str) -> Result<Description, ParseError> {
    Parser::new(text, file).parse_description()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    file: String,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, file: &str) -> Self {
        Self {
            lexer: Lexer::new(text, file),
            file: file.to_string(),
        }
    }

    fn parse_description(&mut self) -> Result<Description, ParseError> {
        let mut out = Description::default();

        if self.is_keyword("namespace")? {
            out.namespace = Some(self.parse_namespace()?);
        }

        while self.lexer.peek(0)?.kind != TokenKind::End {
            out.decls.push(self.parse_decl()?);
        }

        Ok(out)
    }

    // ---- token helpers ----

    fn error_at(&self, token: &Token, message: impl Into<String>) -> ParseError {
        ParseError::new(&self.file, token.line, token.column, message)
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParseError> {
        let token = self.lexer.next()?;
        if token.kind != kind {
            return Err(self.error_at(&token, message));
        }
        Ok(token)
    }

    fn matches(&mut self, kind: TokenKind) -> Result<bool, ParseError> {
        if self.lexer.peek(0)?.kind == kind {
            self.lexer.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn is_keyword(&mut self, keyword: &str) -> Result<bool, ParseError> {
        let token = self.lexer.peek(0)?;
        Ok(token.kind == TokenKind::Ident && token.lexeme == keyword)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Token, ParseError> {
        let token = self.lexer.next()?;
        if token.kind != TokenKind::Ident || token.lexeme != keyword {
            return Err(self.error_at(&token, format!("Expected keyword '{keyword}'")));
        }
        Ok(token)
    }

    fn unquote(&self, token: &Token) -> Result<String, ParseError> {
        unquote(token, &self.file)
    }

    // ---- grammar pieces ----

    fn parse_namespace(&mut self) -> Result<String, ParseError> {
        self.expect_keyword("namespace")?;

        let first = self.expect(TokenKind::Ident, "Expected namespace name")?;
        let mut name = first.lexeme;
        while self.matches(TokenKind::Dot)? {
            let part = self.expect(TokenKind::Ident, "Expected namespace segment after '.'")?;
            name.push('.');
            name.push_str(&part.lexeme);
        }

        self.expect(TokenKind::Semicolon, "Expected ';' after namespace")?;
        Ok(name)
    }

    fn parse_decl(&mut self) -> Result<Decl, ParseError> {
        let token = self.lexer.peek(0)?.clone();
        if token.kind != TokenKind::Ident {
            return Err(self.error_at(&token, "Expected a declaration keyword"));
        }

        match token.lexeme.as_str() {
            "enumerate" => Ok(Decl::Enumerate(self.parse_enumerate()?)),
            "structure" => Ok(Decl::Structure(self.parse_structure()?)),
            "message" => Ok(Decl::Message(self.parse_message()?)),
            "external" => Ok(Decl::External(self.parse_external()?)),
            "include" => Ok(Decl::Include(self.parse_include()?)),
            "import" => Ok(Decl::Import(self.parse_import()?)),
            other => {
                let msg = format!("Unknown declaration keyword: {other}");
                Err(self.error_at(&token, msg))
            }
        }
    }

    fn parse_enumerate(&mut self) -> Result<Enumerate, ParseError> {
        self.expect_keyword("enumerate")?;
        let name = self.expect(TokenKind::Ident, "Expected enumerate name")?.lexeme;

        self.expect(TokenKind::LBrace, "Expected '{' after enumerate name")?;

        let mut values = Vec::new();
        if self.lexer.peek(0)?.kind != TokenKind::RBrace {
            values.push(self.expect(TokenKind::Ident, "Expected enumerate value")?.lexeme);
            while self.matches(TokenKind::Comma)? {
                values.push(self.expect(TokenKind::Ident, "Expected enumerate value")?.lexeme);
            }
        }

        self.expect(TokenKind::RBrace, "Expected '}' to end enumerate")?;
        Ok(Enumerate { name, values })
    }

    fn parse_structure(&mut self) -> Result<Structure, ParseError> {
        self.expect_keyword("structure")?;
        let name = self.expect(TokenKind::Ident, "Expected structure name")?.lexeme;
        let fields = self.parse_field_list()?;
        Ok(Structure { name, fields })
    }

    fn parse_message(&mut self) -> Result<MessageDecl, ParseError> {
        self.expect_keyword("message")?;
        let name = self.expect(TokenKind::Ident, "Expected message name")?.lexeme;
        let fields = self.parse_field_list()?;
        Ok(MessageDecl { name, fields })
    }

    fn parse_field_list(&mut self) -> Result<Vec<Field>, ParseError> {
        self.expect(TokenKind::LBrace, "Expected '{' to start field list")?;

        let mut fields = Vec::new();
        loop {
            let token = self.lexer.peek(0)?.clone();
            match token.kind {
                TokenKind::RBrace => break,
                TokenKind::End => {
                    return Err(self.error_at(&token, "Unterminated field list; expected '}'"));
                }
                _ => fields.push(self.parse_field()?),
            }
        }

        self.expect(TokenKind::RBrace, "Expected '}' to end field list")?;
        Ok(fields)
    }

    fn parse_field(&mut self) -> Result<Field, ParseError> {
        let type_name = self.expect(TokenKind::Ident, "Expected field type")?.lexeme;
        let array = self.parse_optional_array()?;
        let name = self.expect(TokenKind::Ident, "Expected field name")?.lexeme;

        let properties = if self.lexer.peek(0)?.kind == TokenKind::LParen {
            Some(self.parse_properties()?)
        } else {
            None
        };

        let default = if self.matches(TokenKind::Equals)? {
            Some(self.parse_value()?)
        } else {
            None
        };

        self.expect(TokenKind::Semicolon, "Expected ';' after field")?;
        Ok(Field {
            type_name,
            array,
            name,
            properties,
            default,
        })
    }

    fn parse_optional_array(&mut self) -> Result<Option<ArraySpec>, ParseError> {
        if !self.matches(TokenKind::LBrack)? {
            return Ok(None);
        }

        let mut spec = ArraySpec { length: None };
        if self.lexer.peek(0)?.kind == TokenKind::Number {
            let token = self.lexer.next()?;
            if token.lexeme.starts_with('+') || token.lexeme.starts_with('-') {
                return Err(self.error_at(&token, "Array length must be a non-negative integer"));
            }
            let length: usize = token
                .lexeme
                .parse()
                .map_err(|_| self.error_at(&token, "Array length must be an integer"))?;
            spec.length = Some(length);
        }

        self.expect(TokenKind::RBrack, "Expected ']' after array specifier")?;
        Ok(Some(spec))
    }

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        let token = self.lexer.peek(0)?.clone();

        match token.kind {
            TokenKind::Number => {
                let token = self.lexer.next()?;
                let value: f64 = token
                    .lexeme
                    .parse()
                    .map_err(|_| self.error_at(&token, "Invalid numeric literal"))?;
                if !value.is_finite() {
                    return Err(self.error_at(&token, "Invalid numeric literal"));
                }
                Ok(Value::Number(value))
            }
            TokenKind::String => {
                let token = self.lexer.next()?;
                Ok(Value::Text(self.unquote(&token)?))
            }
            TokenKind::Ident if token.lexeme == "true" || token.lexeme == "false" => {
                let token = self.lexer.next()?;
                Ok(Value::Bool(token.lexeme == "true"))
            }
            _ => Err(self.error_at(&token, "Expected value (number, string, or boolean)")),
        }
    }

    fn at_keyword_property(&mut self) -> Result<bool, ParseError> {
        let first = self.lexer.peek(0)?.kind;
        let second = self.lexer.peek(1)?.kind;
        Ok(first == TokenKind::Ident && second == TokenKind::Equals)
    }

    fn parse_keyword_property(&mut self, props: &mut Properties) -> Result<(), ParseError> {
        let name = self.expect(TokenKind::Ident, "Expected property name")?.lexeme;
        self.expect(TokenKind::Equals, "Expected '=' in keyword property")?;
        let value = self.parse_value()?;
        props.kwargs.push((name, value));
        Ok(())
    }

    fn parse_properties(&mut self) -> Result<Properties, ParseError> {
        let mut props = Properties::default();
        self.expect(TokenKind::LParen, "Expected '(' to start property list")?;

        if self.at_keyword_property()? {
            // keyword-only list
            self.parse_keyword_property(&mut props)?;
            while self.matches(TokenKind::Colon)? {
                if !self.at_keyword_property()? {
                    let token = self.lexer.peek(0)?.clone();
                    return Err(
                        self.error_at(&token, "Expected keyword property name=value after ':'")
                    );
                }
                self.parse_keyword_property(&mut props)?;
            }
        } else if self.lexer.peek(0)?.kind != TokenKind::RParen {
            // positional first, keyword properties may follow
            props.args.push(self.parse_value()?);
            while self.matches(TokenKind::Colon)? {
                if self.at_keyword_property()? {
                    self.parse_keyword_property(&mut props)?;
                    while self.matches(TokenKind::Colon)? {
                        if !self.at_keyword_property()? {
                            let token = self.lexer.peek(0)?.clone();
                            return Err(self.error_at(
                                &token,
                                "Expected keyword property name=value after ':'",
                            ));
                        }
                        self.parse_keyword_property(&mut props)?;
                    }
                    break;
                }
                props.args.push(self.parse_value()?);
            }
        }

        self.expect(TokenKind::RParen, "Expected ')' to end property list")?;
        Ok(props)
    }

    fn parse_include(&mut self) -> Result<Include, ParseError> {
        self.expect_keyword("include")?;
        let file = self.expect(TokenKind::String, "Expected quoted filename after 'include'")?;
        let name = self.unquote(&file)?;

        let properties = if self.lexer.peek(0)?.kind == TokenKind::LParen {
            Some(self.parse_properties()?)
        } else {
            None
        };

        self.expect(TokenKind::Semicolon, "Expected ';' after include")?;
        Ok(Include { name, properties })
    }

    fn parse_import(&mut self) -> Result<Import, ParseError> {
        self.expect_keyword("import")?;
        let file = self.expect(TokenKind::String, "Expected quoted filename after 'import'")?;
        let name = self.unquote(&file)?;
        self.expect(TokenKind::Semicolon, "Expected ';' after import")?;
        Ok(Import { name })
    }

    fn parse_external_language(&mut self) -> Result<ExternalLanguage, ParseError> {
        self.expect_keyword("language")?;

        let language = self
            .expect(TokenKind::Ident, "Expected language name after 'language'")?
            .lexeme;
        let container_token =
            self.expect(TokenKind::String, "Expected container string after language name")?;
        let container = self.unquote(&container_token)?;

        let mut entry = ExternalLanguage {
            language,
            container,
            sources: Vec::new(),
            default_value: None,
            read: None,
            write: None,
        };

        if self.is_keyword("from")? {
            self.lexer.next()?;
            if self.lexer.peek(0)?.kind != TokenKind::String {
                let token = self.lexer.peek(0)?.clone();
                return Err(
                    self.error_at(&token, "Expected at least one source string after 'from'")
                );
            }
            while self.lexer.peek(0)?.kind == TokenKind::String {
                let token = self.lexer.next()?;
                entry.sources.push(self.unquote(&token)?);
            }
        }

        if self.is_keyword("default")? {
            self.lexer.next()?;
            let token = self.expect(TokenKind::String, "Expected default string after 'default'")?;
            entry.default_value = Some(self.unquote(&token)?);
        }

        if self.is_keyword("read")? {
            self.lexer.next()?;
            let token = self.expect(TokenKind::String, "Expected read string after 'read'")?;
            entry.read = Some(self.unquote(&token)?);

            self.expect_keyword("write")?;
            let token = self.expect(TokenKind::String, "Expected write string after 'write'")?;
            entry.write = Some(self.unquote(&token)?);
        }

        self.expect(TokenKind::Semicolon, "Expected ';' after language entry")?;
        Ok(entry)
    }

    fn parse_external(&mut self) -> Result<External, ParseError> {
        self.expect_keyword("external")?;
        let name = self.expect(TokenKind::Ident, "Expected external structure name")?.lexeme;

        self.expect(TokenKind::LParen, "Expected '(' to start external language list")?;
        let mut languages = Vec::new();
        loop {
            let token = self.lexer.peek(0)?.clone();
            match token.kind {
                TokenKind::RParen => break,
                TokenKind::End => {
                    return Err(self.error_at(
                        &token,
                        "Unterminated external language list; expected ')'",
                    ));
                }
                _ => {
                    if !self.is_keyword("language")? {
                        let token = self.lexer.peek(0)?.clone();
                        return Err(self.error_at(
                            &token,
                            "Expected 'language' entry inside external language list",
                        ));
                    }
                    languages.push(self.parse_external_language()?);
                }
            }
        }
        self.expect(TokenKind::RParen, "Expected ')' to end external language list")?;
        self.expect(TokenKind::Semicolon, "Expected ';' after external")?;

        Ok(External { name, languages })
    }
}
