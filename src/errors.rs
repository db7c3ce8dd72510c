//! Error types for definition parsing, encoding/decoding and lookups.

use std::fmt;

use thiserror::Error;

/// Line and column (both 1-based) of a token in preprocessed definition text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    /// Location at 1-based `line` and `column`.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Errors produced while turning definition text (or a JSON layout document)
/// into a [crate::layout::StructLayout].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// The struct wrapper or a field declaration does not match the grammar.
    #[error("syntax error at {location}: {message}")]
    Syntax {
        message: String,
        location: SourceLocation,
    },
    /// An identifier was left in an array-length or width position after substitution.
    #[error("undefined constant(s): {}", .names.join(", "))]
    UndefinedConstant { names: Vec<String> },
    /// Field type is neither a primitive nor an already registered struct.
    #[error("unknown type '{type_name}' for field '{field}'")]
    UnknownType { type_name: String, field: String },
    /// A field's span or offset does not fit within [crate::layout::MAX_TOTAL_BITS].
    #[error("struct '{structure}' is too large at field '{field}'")]
    LayoutTooLarge { structure: String, field: String },
    /// A JSON layout document is malformed or disagrees with the recomputed layout.
    #[error("invalid layout document: {0}")]
    InvalidDocument(String),
}

impl DefinitionError {
    pub(crate) fn syntax(message: impl Into<String>, location: SourceLocation) -> Self {
        DefinitionError::Syntax {
            message: message.into(),
            location,
        }
    }
}

/// Errors produced by [crate::codec::encode] and [crate::codec::decode].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input is shorter than the layout's `total_bytes`.
    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },
    /// A value in the tree has the wrong shape for its field.
    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
    /// Hex input could not be decoded.
    #[error("invalid hex input: {0}")]
    InvalidHex(String),
}

/// A registry, field or symbol lookup found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("struct '{0}' is not registered")]
    Struct(String),
    #[error("struct '{structure}' has no field '{field}'")]
    Field { structure: String, field: String },
    #[error("no symbol for value {value} of {structure}.{field}")]
    Symbol {
        structure: String,
        field: String,
        value: u64,
    },
}

/// Umbrella error returned by [crate::parser::StructParser].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
