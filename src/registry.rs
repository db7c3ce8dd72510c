//! Name to layout map owned by a [crate::parser::StructParser].

use std::{collections::HashMap, sync::Arc};

use log::debug;

use crate::{errors::LookupError, layout::StructLayout};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    structs: HashMap<String, Arc<StructLayout>>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `layout`, replacing any previous entry with the same name.
    /// Layouts already handed out keep pointing at the old value.
    pub fn insert(&mut self, layout: Arc<StructLayout>) -> Option<Arc<StructLayout>> {
        let previous = self.structs.insert(layout.name.clone(), layout.clone());
        if previous.is_some() {
            debug!("replaced struct '{}' ({} bits)", layout.name, layout.total_bits);
        } else {
            debug!("registered struct '{}' ({} bits)", layout.name, layout.total_bits);
        }
        previous
    }

    /// Layout registered as `name`, if any.
    pub fn get(&self, name: &str) -> Option<&Arc<StructLayout>> {
        self.structs.get(name)
    }

    /// Layout registered as `name`, or [LookupError::Struct].
    pub fn lookup(&self, name: &str) -> Result<&Arc<StructLayout>, LookupError> {
        self.get(name)
            .ok_or_else(|| LookupError::Struct(name.to_string()))
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.structs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered structs.
    pub fn len(&self) -> usize {
        self.structs.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }
}
