//! Comment stripping and flat constant substitution.
//!
//! Only `NAME -> integer` replacement is supported: no macro parameters, no
//! conditionals. After substitution no identifier may remain where an array
//! length or bitfield width is expected.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::errors::DefinitionError;

static COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("comment pattern is valid"));

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("identifier pattern is valid"));

static UNRESOLVED_LENGTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\s*([A-Za-z_][A-Za-z0-9_]*)\s*\]").expect("length pattern is valid")
});

static UNRESOLVED_WIDTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":\s*([A-Za-z_][A-Za-z0-9_]*)\s*;").expect("width pattern is valid")
});

/// Removes `//` and `/* */` comments. Block comments keep their newlines so
/// later line numbers still point at the input text.
pub fn strip_comments(text: &str) -> String {
    COMMENT
        .replace_all(text, |caps: &Captures| {
            let comment = &caps[0];
            if comment.starts_with("/*") {
                let newlines: String = comment.chars().filter(|c| *c == '\n').collect();
                format!(" {newlines}")
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Replaces every whole-word occurrence of a known constant with its decimal value.
pub fn substitute(text: &str, constants: &BTreeMap<String, u64>) -> String {
    if constants.is_empty() {
        return text.to_string();
    }

    IDENTIFIER
        .replace_all(text, |caps: &Captures| match constants.get(&caps[0]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Identifiers still sitting in `[NAME]` or `: NAME;` positions, sorted.
pub fn unresolved_constants(text: &str) -> Vec<String> {
    let names: BTreeSet<String> = UNRESOLVED_LENGTH
        .captures_iter(text)
        .chain(UNRESOLVED_WIDTH.captures_iter(text))
        .map(|caps| caps[1].to_string())
        .collect();

    names.into_iter().collect()
}

/// Full preprocessing pass. Pure: the constant table is only read.
pub fn preprocess(
    text: &str,
    constants: &BTreeMap<String, u64>,
) -> Result<String, DefinitionError> {
    let stripped = strip_comments(text);
    let substituted = substitute(&stripped, constants);

    let names = unresolved_constants(&substituted);
    if !names.is_empty() {
        return Err(DefinitionError::UndefinedConstant { names });
    }

    Ok(substituted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_strip_line_and_block_comments() {
        let text = "int a; // trailing\n/* block\n spans */ int b;";
        let stripped = strip_comments(text);
        assert_eq!(stripped, "int a; \n \n int b;");
    }

    #[test]
    fn test_line_comment_containing_block_opener() {
        let stripped = strip_comments("int a; // not /* a block\nint b;");
        assert_eq!(stripped, "int a; \nint b;");
    }

    #[test]
    fn test_substitute_whole_words_only() {
        let table = constants(&[("LEN", 4)]);
        let out = substitute("char buf[LEN]; char LENGTH; int LEN_2;", &table);
        assert_eq!(out, "char buf[4]; char LENGTH; int LEN_2;");
    }

    #[test]
    fn test_undefined_constant_in_array_position() {
        let err = preprocess("char buf[SIZE]; char other[ COUNT ];", &BTreeMap::new())
            .unwrap_err();
        assert_eq!(
            err,
            DefinitionError::UndefinedConstant {
                names: vec!["COUNT".to_string(), "SIZE".to_string()]
            }
        );
    }

    #[test]
    fn test_undefined_constant_in_width_position() {
        let err = preprocess("int flags : WIDTH;", &BTreeMap::new()).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::UndefinedConstant {
                names: vec!["WIDTH".to_string()]
            }
        );
    }

    #[test]
    fn test_commented_out_constant_is_ignored() {
        let out = preprocess("int a; // char buf[SIZE];", &BTreeMap::new()).unwrap();
        assert_eq!(out, "int a; ");
    }

    #[test]
    fn test_preprocess_resolves_width_and_length() {
        let table = constants(&[("W", 3), ("N", 8)]);
        let out = preprocess("int f : W; char b[N];", &table).unwrap();
        assert_eq!(out, "int f : 3; char b[8];");
    }
}
