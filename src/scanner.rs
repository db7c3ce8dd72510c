//! Grammar scanner: turns tokens into struct declarations, then classifies
//! each field as a bitfield, a primitive or a nested struct.
//!
//! ```text
//! definition := "typedef" "struct" [tag] "{" field* "}" name ";"
//! field      := ["unsigned"] ["struct"] type name [":" width] ["[" length "]"] ";"
//! ```

use std::collections::HashSet;

use crate::{
    errors::{DefinitionError, SourceLocation},
    field::{FieldKind, MAX_BITFIELD_WIDTH, Primitive},
    layout::FieldSpec,
    lexer::{Token, TokenKind},
    registry::Registry,
};

/// A field as written, before its type is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub type_name: String,
    pub name: String,
    pub width: Option<usize>,
    pub array_length: Option<usize>,
    pub location: SourceLocation,
}

/// One `typedef struct { ... } name;` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

impl StructDecl {
    /// Resolves every field type against `registry`.
    ///
    /// Fails with [DefinitionError::UnknownType] for a type that is neither a
    /// primitive nor registered, which also rejects forward references and a
    /// struct containing itself. A bitfield may be wider than its declared
    /// type, up to [MAX_BITFIELD_WIDTH] bits.
    pub fn classify(&self, registry: &Registry) -> Result<Vec<FieldSpec>, DefinitionError> {
        let mut specs = Vec::with_capacity(self.fields.len());

        for decl in &self.fields {
            let unknown = || DefinitionError::UnknownType {
                type_name: decl.type_name.clone(),
                field: decl.name.clone(),
            };

            let kind = match decl.width {
                Some(width) => {
                    let primitive = Primitive::from_name(&decl.type_name).ok_or_else(unknown)?;
                    if width > MAX_BITFIELD_WIDTH {
                        return Err(DefinitionError::syntax(
                            format!(
                                "width {width} of '{}' exceeds {MAX_BITFIELD_WIDTH} bits",
                                decl.name
                            ),
                            decl.location,
                        ));
                    }
                    FieldKind::Bitfield { primitive, width }
                }
                None => match Primitive::from_name(&decl.type_name) {
                    Some(primitive) => FieldKind::Primitive(primitive),
                    None if decl.type_name == self.name => return Err(unknown()),
                    None => {
                        let nested = registry.get(&decl.type_name).ok_or_else(unknown)?;
                        FieldKind::Nested(nested.clone())
                    }
                },
            };

            specs.push(FieldSpec {
                name: decl.name.clone(),
                kind,
                array_length: decl.array_length,
            });
        }

        Ok(specs)
    }
}

struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn end_location(&self) -> SourceLocation {
        self.tokens
            .last()
            .map(|t| t.location)
            .unwrap_or_else(|| SourceLocation::new(1, 1))
    }

    fn error_here(&self, expected: &str) -> DefinitionError {
        match self.peek() {
            Some(token) => DefinitionError::syntax(
                format!("expected {expected}, found {}", token.kind),
                token.location,
            ),
            None => DefinitionError::syntax(
                format!("expected {expected}, found end of input"),
                self.end_location(),
            ),
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), DefinitionError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error_here(expected))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Ident(word),
                ..
            }) if word == keyword => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), DefinitionError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error_here(&format!("'{keyword}'")))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, SourceLocation), DefinitionError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Ident(word),
                location,
            }) => {
                self.pos += 1;
                Ok((word.clone(), *location))
            }
            _ => Err(self.error_here(expected)),
        }
    }

    fn expect_positive(&mut self, expected: &str) -> Result<usize, DefinitionError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Int(value),
                location,
            }) => {
                if *value == 0 {
                    return Err(DefinitionError::syntax(
                        format!("{expected} must be positive"),
                        *location,
                    ));
                }
                let value = usize::try_from(*value).map_err(|_| {
                    DefinitionError::syntax(format!("{expected} is too large"), *location)
                })?;
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.error_here(expected)),
        }
    }
}

fn scan_field(cursor: &mut Cursor<'_>) -> Result<FieldDecl, DefinitionError> {
    cursor.eat_keyword("unsigned");
    cursor.eat_keyword("struct");

    let (type_name, location) = cursor.expect_ident("field type")?;
    let (name, _) = cursor.expect_ident("field name")?;

    let width = if cursor.eat(&TokenKind::Colon) {
        Some(cursor.expect_positive("bit width")?)
    } else {
        None
    };

    let array_length = match cursor.peek() {
        Some(Token {
            kind: TokenKind::LBracket,
            location,
        }) => {
            if width.is_some() {
                return Err(DefinitionError::syntax(
                    format!("bitfield '{name}' cannot be an array"),
                    *location,
                ));
            }
            cursor.next();
            let length = cursor.expect_positive("array length")?;
            cursor.expect(TokenKind::RBracket, "']'")?;
            Some(length)
        }
        _ => None,
    };

    cursor.expect(TokenKind::Semicolon, "';'")?;

    Ok(FieldDecl {
        type_name,
        name,
        width,
        array_length,
        location,
    })
}

fn scan_struct(cursor: &mut Cursor<'_>) -> Result<StructDecl, DefinitionError> {
    cursor.expect_keyword("typedef")?;
    cursor.expect_keyword("struct")?;

    // Optional tag: `typedef struct tag { ... } name;`
    if matches!(
        cursor.peek(),
        Some(Token {
            kind: TokenKind::Ident(_),
            ..
        })
    ) {
        cursor.next();
    }

    cursor.expect(TokenKind::LBrace, "'{'")?;

    let mut fields = Vec::new();
    let mut seen = HashSet::new();
    while !cursor.eat(&TokenKind::RBrace) {
        if cursor.is_done() {
            return Err(cursor.error_here("'}'"));
        }

        let field = scan_field(cursor)?;
        if !seen.insert(field.name.clone()) {
            return Err(DefinitionError::syntax(
                format!("duplicate field '{}'", field.name),
                field.location,
            ));
        }
        fields.push(field);
    }

    let (name, _) = cursor.expect_ident("struct name")?;
    cursor.expect(TokenKind::Semicolon, "';'")?;

    Ok(StructDecl { name, fields })
}

/// Scans one or more consecutive typedefs.
pub fn scan_all(tokens: &[Token]) -> Result<Vec<StructDecl>, DefinitionError> {
    let mut cursor = Cursor { tokens, pos: 0 };
    let mut structs = Vec::new();

    loop {
        structs.push(scan_struct(&mut cursor)?);
        if cursor.is_done() {
            return Ok(structs);
        }
    }
}

/// Scans exactly one typedef; trailing tokens are an error.
pub fn scan(tokens: &[Token]) -> Result<StructDecl, DefinitionError> {
    let mut cursor = Cursor { tokens, pos: 0 };
    let decl = scan_struct(&mut cursor)?;

    if !cursor.is_done() {
        return Err(cursor.error_here("end of definition"));
    }

    Ok(decl)
}
