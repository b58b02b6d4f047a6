// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Recursive-descent parser producing the typed AST.
//!
//! Grammar (EBNF):
//!
//! ```text
//! description  := namespace? decl*
//! namespace    := "namespace" dottedName ";"
//! decl         := enumerate | include | import | external | structure | message
//! enumerate    := "enumerate" name "{" ident ("," ident)* "}"
//! include      := "include" string properties? ";"
//! import       := "import" string ";"
//! external     := "external" name "(" language* ")" ";"
//! language     := "language" ident string ("from" string+)? ("default" string)?
//!                  ("read" string "write" string)? ";"
//! structure    := "structure" name fieldList
//! message      := "message" name fieldList
//! fieldList    := "{" field* "}"
//! field        := ident array? ident properties? ("=" value)? ";"
//! array        := "[" number? "]"
//! properties   := "(" (kw (":" kw)* | value (":" value)* (":" kw)*)? ")"
//! kw           := ident "=" value
//! value        := number | string | "true" | "false"
//! ```
//!
//! Two deliberate strictness points: no positional property may follow a
//! keyword property, and an array length must be an unsigned integer even
//! though general numeric literals accept a sign.

use crate::ast::*;
use crate::error::{DescriptionError, ErrorKind};
use crate::lexer::{Lexer, TokKind, Token};

/// Parse one description text. `file` is used in error positions only.
pub fn parse(text: &str, file: &str) -> Result<Description, DescriptionError> {
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

    fn parse_description(mut self) -> Result<Description, DescriptionError> {
        let mut out = Description::default();

        if self.at_keyword("namespace")? {
            out.namespace = Some(self.parse_namespace()?);
        }

        while self.lexer.peek(0)?.kind != TokKind::End {
            out.decls.push(self.parse_decl()?);
        }

        Ok(out)
    }

    // ---- token helpers ----

    fn error_at(&self, tok: &Token, message: impl Into<String>) -> DescriptionError {
        DescriptionError::at(&self.file, tok.span, message)
    }

    fn expect(&mut self, kind: TokKind, message: &str) -> Result<Token, DescriptionError> {
        let tok = self.lexer.next()?;
        if tok.kind != kind {
            return Err(self.error_at(&tok, message));
        }
        Ok(tok)
    }

    fn matches(&mut self, kind: TokKind) -> Result<bool, DescriptionError> {
        if self.lexer.peek(0)?.kind == kind {
            self.lexer.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn at_keyword(&mut self, kw: &str) -> Result<bool, DescriptionError> {
        let tok = self.lexer.peek(0)?;
        Ok(tok.kind == TokKind::Ident && tok.lexeme == kw)
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<Token, DescriptionError> {
        let tok = self.lexer.next()?;
        if tok.kind != TokKind::Ident || tok.lexeme != kw {
            return Err(self.error_at(&tok, format!("Expected keyword '{kw}'")));
        }
        Ok(tok)
    }

    /// Strip quotes and process escapes. `\\ \" \n \r \t` are translated;
    /// an unknown escape passes the escaped character through unchanged.
    fn unquote(&self, tok: &Token) -> Result<String, DescriptionError> {
        let s = tok.lexeme.as_str();
        if s.len() < 2 || !s.starts_with('"') || !s.ends_with('"') {
            return Err(self.error_at(tok, "Internal error: invalid string token"));
        }
        let inner = &s[1..s.len() - 1];

        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                None => {
                    return Err(self.error_at(tok, "Invalid escape sequence in string"));
                }
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
            }
        }
        Ok(out)
    }

    fn parse_number(&self, tok: &Token) -> Result<f64, DescriptionError> {
        let value: f64 = tok
            .lexeme
            .parse()
            .map_err(|_| self.error_at(tok, "Invalid numeric literal"))?;
        if !value.is_finite() {
            return Err(self.error_at(tok, "Invalid numeric literal"));
        }
        Ok(value)
    }

    // ---- grammar pieces ----

    fn parse_value(&mut self) -> Result<Value, DescriptionError> {
        let tok = self.lexer.peek(0)?;
        match tok.kind {
            TokKind::Number => {
                let tok = self.lexer.next()?;
                Ok(Value::Number(self.parse_number(&tok)?))
            }
            TokKind::Str => {
                let tok = self.lexer.next()?;
                Ok(Value::Str(self.unquote(&tok)?))
            }
            TokKind::Ident if tok.lexeme == "true" || tok.lexeme == "false" => {
                let tok = self.lexer.next()?;
                Ok(Value::Bool(tok.lexeme == "true"))
            }
            _ => Err(self.error_at(&tok, "Expected value (number, string, or boolean)")),
        }
    }

    fn at_keyword_property(&mut self) -> Result<bool, DescriptionError> {
        Ok(self.lexer.peek(0)?.kind == TokKind::Ident
            && self.lexer.peek(1)?.kind == TokKind::Equals)
    }

    fn parse_keyword_property(&mut self, props: &mut Properties) -> Result<(), DescriptionError> {
        let name = self.expect(TokKind::Ident, "Expected property name")?;
        self.expect(TokKind::Equals, "Expected '=' in keyword property")?;
        let value = self.parse_value()?;
        props.kwargs.push(KeywordArg {
            name: name.lexeme,
            value,
        });
        Ok(())
    }

    fn parse_properties(&mut self) -> Result<Properties, DescriptionError> {
        let mut props = Properties::default();
        self.expect(TokKind::LParen, "Expected '(' to start property list")?;

        if self.at_keyword_property()? {
            // Keyword-only list: every element must be name=value.
            self.parse_keyword_property(&mut props)?;
            while self.matches(TokKind::Colon)? {
                if !self.at_keyword_property()? {
                    let tok = self.lexer.peek(0)?;
                    return Err(
                        self.error_at(&tok, "Expected keyword property name=value after ':'")
                    );
                }
                self.parse_keyword_property(&mut props)?;
            }
        } else if self.lexer.peek(0)?.kind != TokKind::RParen {
            // Positional first; a ':' may switch to keywords, after which
            // no positional value is allowed again.
            props.args.push(self.parse_value()?);
            while self.matches(TokKind::Colon)? {
                if self.at_keyword_property()? {
                    self.parse_keyword_property(&mut props)?;
                    while self.matches(TokKind::Colon)? {
                        if !self.at_keyword_property()? {
                            let tok = self.lexer.peek(0)?;
                            return Err(self.error_at(
                                &tok,
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

        self.expect(TokKind::RParen, "Expected ')' to end property list")?;
        Ok(props)
    }

    fn parse_optional_array(&mut self) -> Result<Option<FieldArray>, DescriptionError> {
        if !self.matches(TokKind::LBrack)? {
            return Ok(None);
        }

        let mut array = FieldArray { length: None };
        if self.lexer.peek(0)?.kind == TokKind::Number {
            let tok = self.lexer.next()?;
            let lexeme = tok.lexeme.as_str();
            // The general number rule accepts a sign; array lengths do
            // not. This divergence is deliberate.
            if lexeme.starts_with('+') || lexeme.starts_with('-') {
                return Err(self
                    .error_at(&tok, "Array length must be a non-negative integer")
                    .with_kind(ErrorKind::BadArrayLength));
            }
            let length: usize = lexeme.parse().map_err(|_| {
                self.error_at(&tok, "Array length must be an integer")
                    .with_kind(ErrorKind::BadArrayLength)
            })?;
            array.length = Some(length);
        }

        self.expect(TokKind::RBrack, "Expected ']' after array specifier")?;
        Ok(Some(array))
    }

    fn parse_field(&mut self) -> Result<Field, DescriptionError> {
        let type_tok = self.expect(TokKind::Ident, "Expected field type")?;
        let array = self.parse_optional_array()?;
        let name_tok = self.expect(TokKind::Ident, "Expected field name")?;

        let properties = if self.lexer.peek(0)?.kind == TokKind::LParen {
            Some(self.parse_properties()?)
        } else {
            None
        };

        let default_value = if self.matches(TokKind::Equals)? {
            Some(self.parse_value()?)
        } else {
            None
        };

        self.expect(TokKind::Semicolon, "Expected ';' after field")?;

        Ok(Field {
            type_name: type_tok.lexeme,
            array,
            name: name_tok.lexeme,
            properties,
            default_value,
            span: type_tok.span,
        })
    }

    fn parse_field_list(&mut self) -> Result<Vec<Field>, DescriptionError> {
        let mut fields = Vec::new();
        self.expect(TokKind::LBrace, "Expected '{' to start field list")?;
        loop {
            let tok = self.lexer.peek(0)?;
            match tok.kind {
                TokKind::RBrace => break,
                TokKind::End => {
                    return Err(
                        self.error_at(&tok, "Unterminated field list; expected '}'")
                    );
                }
                _ => fields.push(self.parse_field()?),
            }
        }
        self.expect(TokKind::RBrace, "Expected '}' to end field list")?;
        Ok(fields)
    }

    fn parse_enumerate(&mut self) -> Result<Enumerate, DescriptionError> {
        let kw = self.expect_keyword("enumerate")?;
        let name = self.expect(TokKind::Ident, "Expected enumerate name")?;
        self.expect(TokKind::LBrace, "Expected '{' after enumerate name")?;

        let mut values = Vec::new();
        if self.lexer.peek(0)?.kind != TokKind::RBrace {
            values.push(
                self.expect(TokKind::Ident, "Expected enumerate value")?
                    .lexeme,
            );
            while self.matches(TokKind::Comma)? {
                values.push(
                    self.expect(TokKind::Ident, "Expected enumerate value")?
                        .lexeme,
                );
            }
        }

        self.expect(TokKind::RBrace, "Expected '}' to end enumerate")?;
        Ok(Enumerate {
            name: name.lexeme,
            values,
            span: kw.span,
        })
    }

    fn parse_include(&mut self) -> Result<Include, DescriptionError> {
        let kw = self.expect_keyword("include")?;
        let file_tok = self.expect(TokKind::Str, "Expected quoted filename after 'include'")?;
        let path = self.unquote(&file_tok)?;

        let properties = if self.lexer.peek(0)?.kind == TokKind::LParen {
            Some(self.parse_properties()?)
        } else {
            None
        };

        self.expect(TokKind::Semicolon, "Expected ';' after include")?;
        Ok(Include {
            path,
            properties,
            span: kw.span,
        })
    }

    fn parse_import(&mut self) -> Result<Import, DescriptionError> {
        let kw = self.expect_keyword("import")?;
        let file_tok = self.expect(TokKind::Str, "Expected quoted filename after 'import'")?;
        let path = self.unquote(&file_tok)?;
        self.expect(TokKind::Semicolon, "Expected ';' after import")?;
        Ok(Import {
            path,
            span: kw.span,
        })
    }

    fn parse_external_language(&mut self) -> Result<ExternalLanguage, DescriptionError> {
        let kw = self.expect_keyword("language")?;
        let lang = self.expect(TokKind::Ident, "Expected language name after 'language'")?;
        let container =
            self.expect(TokKind::Str, "Expected container string after language name")?;

        let mut out = ExternalLanguage {
            language: lang.lexeme,
            container: self.unquote(&container)?,
            sources: Vec::new(),
            default: None,
            read: None,
            write: None,
            span: kw.span,
        };

        if self.at_keyword("from")? {
            self.lexer.next()?;
            if self.lexer.peek(0)?.kind != TokKind::Str {
                let tok = self.lexer.peek(0)?;
                return Err(
                    self.error_at(&tok, "Expected at least one source string after 'from'")
                );
            }
            while self.lexer.peek(0)?.kind == TokKind::Str {
                let tok = self.lexer.next()?;
                out.sources.push(self.unquote(&tok)?);
            }
        }

        if self.at_keyword("default")? {
            self.lexer.next()?;
            let tok = self.expect(TokKind::Str, "Expected default string after 'default'")?;
            out.default = Some(self.unquote(&tok)?);
        }

        if self.at_keyword("read")? {
            self.lexer.next()?;
            let tok = self.expect(TokKind::Str, "Expected read string after 'read'")?;
            out.read = Some(self.unquote(&tok)?);

            self.expect_keyword("write")?;
            let tok = self.expect(TokKind::Str, "Expected write string after 'write'")?;
            out.write = Some(self.unquote(&tok)?);
        }

        self.expect(TokKind::Semicolon, "Expected ';' after language entry")?;
        Ok(out)
    }

    fn parse_external(&mut self) -> Result<External, DescriptionError> {
        let kw = self.expect_keyword("external")?;
        let name = self.expect(TokKind::Ident, "Expected external structure name")?;

        self.expect(TokKind::LParen, "Expected '(' to start external language list")?;
        let mut languages = Vec::new();
        loop {
            let tok = self.lexer.peek(0)?;
            match tok.kind {
                TokKind::RParen => break,
                TokKind::End => {
                    return Err(self
                        .error_at(&tok, "Unterminated external language list; expected ')'"));
                }
                _ => {
                    if !self.at_keyword("language")? {
                        return Err(self.error_at(
                            &tok,
                            "Expected 'language' entry inside external language list",
                        ));
                    }
                    languages.push(self.parse_external_language()?);
                }
            }
        }
        self.expect(TokKind::RParen, "Expected ')' to end external language list")?;
        self.expect(TokKind::Semicolon, "Expected ';' after external")?;

        Ok(External {
            name: name.lexeme,
            languages,
            span: kw.span,
        })
    }

    fn parse_structure(&mut self) -> Result<Structure, DescriptionError> {
        let kw = self.expect_keyword("structure")?;
        let name = self.expect(TokKind::Ident, "Expected structure name")?;
        let fields = self.parse_field_list()?;
        Ok(Structure {
            name: name.lexeme,
            fields,
            span: kw.span,
        })
    }

    fn parse_message(&mut self) -> Result<Message, DescriptionError> {
        let kw = self.expect_keyword("message")?;
        let name = self.expect(TokKind::Ident, "Expected message name")?;
        let fields = self.parse_field_list()?;
        Ok(Message {
            name: name.lexeme,
            fields,
            span: kw.span,
        })
    }

    fn parse_namespace(&mut self) -> Result<Namespace, DescriptionError> {
        let kw = self.expect_keyword("namespace")?;
        let first = self.expect(TokKind::Ident, "Expected namespace name")?;
        let mut name = first.lexeme;

        while self.matches(TokKind::Dot)? {
            let part = self.expect(TokKind::Ident, "Expected namespace segment after '.'")?;
            name.push('.');
            name.push_str(&part.lexeme);
        }

        self.expect(TokKind::Semicolon, "Expected ';' after namespace")?;
        Ok(Namespace {
            name,
            span: kw.span,
        })
    }

    fn parse_decl(&mut self) -> Result<Decl, DescriptionError> {
        let tok = self.lexer.peek(0)?;
        if tok.kind != TokKind::Ident {
            return Err(self.error_at(&tok, "Expected a declaration keyword"));
        }

        match tok.lexeme.as_str() {
            "enumerate" => Ok(Decl::Enumerate(self.parse_enumerate()?)),
            "include" => Ok(Decl::Include(self.parse_include()?)),
            "import" => Ok(Decl::Import(self.parse_import()?)),
            "external" => Ok(Decl::External(self.parse_external()?)),
            "structure" => Ok(Decl::Structure(self.parse_structure()?)),
            "message" => Ok(Decl::Message(self.parse_message()?)),
            other => Err(self.error_at(&tok, format!("Unknown declaration keyword: {other}"))),
        }
    }
}
