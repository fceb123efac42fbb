//! Variable scopes and defined atom sets
//!
//! Names are case-insensitive. A scope keeps the spelling used at first
//! assignment for display. Names starting with [`GLOBAL_MARKER`] always live
//! in the global table.

use ahash::AHashMap;
use molscript_select::Selection;

use crate::token::Token;
use crate::value::Value;

/// Prefix that forces a variable into the global table
pub const GLOBAL_MARKER: char = '_';

/// Whether a variable name is reserved for the global table
pub fn is_global_name(name: &str) -> bool {
    name.starts_with(GLOBAL_MARKER)
}

/// One table of variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    vars: AHashMap<String, (String, Value)>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(&name.to_ascii_lowercase()).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(&name.to_ascii_lowercase())
    }

    /// Create or replace a variable
    pub fn set(&mut self, name: &str, value: Value) {
        let key = name.to_ascii_lowercase();
        match self.vars.get_mut(&key) {
            Some(slot) => slot.1 = value,
            None => {
                self.vars.insert(key, (name.to_string(), value));
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(&name.to_ascii_lowercase()).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Variables sorted by name
    pub fn sorted(&self) -> Vec<(&str, &Value)> {
        let mut list: Vec<_> = self
            .vars
            .values()
            .map(|(name, value)| (name.as_str(), value))
            .collect();
        list.sort_by_key(|(name, _)| name.to_ascii_lowercase());
        list
    }
}

/// How a defined set produces its atoms
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    /// Evaluated once, at `define` time
    Static(Selection),
    /// Re-evaluated on every use
    Dynamic(Vec<Token>),
}

/// A set created with `define [dynamic] name expression`
#[derive(Debug, Clone, PartialEq)]
pub struct DefinedSet {
    pub name: String,
    /// Expression source, as written
    pub source: String,
    pub definition: Definition,
}

impl DefinedSet {
    pub fn is_dynamic(&self) -> bool {
        matches!(self.definition, Definition::Dynamic(_))
    }
}

/// Table of defined sets, outside normal variable scoping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Definitions {
    sets: AHashMap<String, DefinedSet>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, set: DefinedSet) {
        log::debug!("defining set {} ({})", set.name, set.source);
        self.sets.insert(set.name.to_ascii_lowercase(), set);
    }

    pub fn get(&self, name: &str) -> Option<&DefinedSet> {
        self.sets.get(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<DefinedSet> {
        self.sets.remove(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn clear(&mut self) {
        self.sets.clear();
    }

    /// Sets sorted by name
    pub fn sorted(&self) -> Vec<&DefinedSet> {
        let mut list: Vec<_> = self.sets.values().collect();
        list.sort_by_key(|s| s.name.to_ascii_lowercase());
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_is_case_insensitive() {
        let mut scope = Scope::new();
        scope.set("Counter", Value::Integer(1));
        scope.set("COUNTER", Value::Integer(2));
        assert_eq!(scope.len(), 1);
        assert_eq!(scope.get("counter"), Some(&Value::Integer(2)));
        assert_eq!(scope.sorted()[0].0, "Counter");
        assert_eq!(scope.remove("counter"), Some(Value::Integer(2)));
        assert!(scope.is_empty());
    }

    #[test]
    fn test_global_marker() {
        assert!(is_global_name("_x"));
        assert!(!is_global_name("x_"));
    }

    #[test]
    fn test_definitions() {
        let mut defs = Definitions::new();
        defs.define(DefinedSet {
            name: "Core".into(),
            source: "atomno<3".into(),
            definition: Definition::Static(Selection::from_indices(5, [0, 1])),
        });
        assert!(defs.get("core").is_some_and(|s| !s.is_dynamic()));
        assert_eq!(defs.sorted().len(), 1);
        assert!(defs.remove("CORE").is_some());
    }
}
