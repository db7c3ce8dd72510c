//! Per-field symbolic labels: `(struct, field) -> {value -> label}`.
//!
//! Entries are attached explicitly and live as long as the owning parser.
//! They are keyed by name only, so they survive re-parsing a struct.

use std::collections::{BTreeMap, HashMap};

use crate::errors::LookupError;

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<String, HashMap<String, BTreeMap<u64, String>>>,
}

impl SymbolTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `labels` into the table for `structure.field`; existing values are overwritten.
    pub fn associate<I, S>(&mut self, structure: &str, field: &str, labels: I)
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        self.entries
            .entry(structure.to_string())
            .or_default()
            .entry(field.to_string())
            .or_default()
            .extend(labels.into_iter().map(|(value, label)| (value, label.into())));
    }

    /// All labels of `structure.field`.
    pub fn field_symbols(&self, structure: &str, field: &str) -> Option<&BTreeMap<u64, String>> {
        self.entries.get(structure)?.get(field)
    }

    /// Label of `value`, if one was associated.
    pub fn label(&self, structure: &str, field: &str, value: u64) -> Option<&str> {
        self.field_symbols(structure, field)?
            .get(&value)
            .map(String::as_str)
    }

    /// Label of `value`, or [LookupError::Symbol].
    pub fn get(&self, structure: &str, field: &str, value: u64) -> Result<&str, LookupError> {
        self.label(structure, field, value)
            .ok_or_else(|| LookupError::Symbol {
                structure: structure.to_string(),
                field: field.to_string(),
                value,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_associate_and_get() {
        let mut table = SymbolTable::new();
        table.associate("hdr_t", "msg_type", [(0, "PING"), (3, "DATA")]);

        assert_eq!(table.get("hdr_t", "msg_type", 3), Ok("DATA"));
        assert_eq!(
            table.get("hdr_t", "msg_type", 4),
            Err(LookupError::Symbol {
                structure: "hdr_t".to_string(),
                field: "msg_type".to_string(),
                value: 4
            })
        );
        assert!(table.get("hdr_t", "counter", 0).is_err());
        assert!(table.get("other_t", "msg_type", 0).is_err());
    }

    #[test]
    fn test_associate_merges() {
        let mut table = SymbolTable::new();
        table.associate("hdr_t", "msg_type", [(0, "PING")]);
        table.associate("hdr_t", "msg_type", [(0, "HELLO".to_string()), (1, "ACK".to_string())]);

        let symbols = table.field_symbols("hdr_t", "msg_type").unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(table.label("hdr_t", "msg_type", 0), Some("HELLO"));
    }
}
