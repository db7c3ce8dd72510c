//! Tokenizer for preprocessed struct definitions.
//!
//! The definition language only needs identifiers, integer literals and six
//! punctuation marks. Every token carries its [SourceLocation].

use std::fmt;

use crate::errors::{DefinitionError, SourceLocation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Int(u64),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Semicolon,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{name}'"),
            TokenKind::Int(value) => write!(f, "integer {value}"),
            TokenKind::LBrace => f.write_str("'{'"),
            TokenKind::RBrace => f.write_str("'}'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::Semicolon => f.write_str("';'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Lexer over preprocessed definition text.
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    /// Tokenizes the whole input.
    pub fn tokenize(mut self) -> Result<Vec<Token>, DefinitionError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
                continue;
            }

            let location = self.location();
            let kind = match ch {
                '{' | '}' | '[' | ']' | ':' | ';' => {
                    self.advance();
                    match ch {
                        '{' => TokenKind::LBrace,
                        '}' => TokenKind::RBrace,
                        '[' => TokenKind::LBracket,
                        ']' => TokenKind::RBracket,
                        ':' => TokenKind::Colon,
                        _ => TokenKind::Semicolon,
                    }
                }
                '0'..='9' => self.number(location)?,
                'a'..='z' | 'A'..='Z' | '_' => TokenKind::Ident(self.word()),
                other => {
                    return Err(DefinitionError::syntax(
                        format!("unexpected character '{other}'"),
                        location,
                    ));
                }
            };

            tokens.push(Token { kind, location });
        }

        Ok(tokens)
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    fn number(&mut self, location: SourceLocation) -> Result<TokenKind, DefinitionError> {
        let literal = self.word();

        let parsed = match literal
            .strip_prefix("0x")
            .or_else(|| literal.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => literal.parse::<u64>(),
        };

        parsed.map(TokenKind::Int).map_err(|_| {
            DefinitionError::syntax(format!("invalid integer literal '{literal}'"), location)
        })
    }
}
