//! Options for a [crate::parser::StructParser].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::layout::Endianness;

/// Byte order for newly parsed structs and the initial constant table.
///
/// ```json
/// { "endianness": "big", "constants": { "MAX_ITEMS": 4 } }
/// ```
///
/// Both keys are optional: the defaults are the native byte order and an
/// empty table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    pub endianness: Endianness,
    pub constants: BTreeMap<String, u64>,
}

impl ParserOptions {
    /// Options with the given byte order and no constants.
    pub fn new(endianness: Endianness) -> Self {
        Self {
            endianness,
            constants: BTreeMap::new(),
        }
    }

    /// Adds one constant, builder style.
    pub fn with_constant(mut self, name: impl Into<String>, value: u64) -> Self {
        self.constants.insert(name.into(), value);
        self
    }

    /// Loads options from a JSON object; missing keys take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
