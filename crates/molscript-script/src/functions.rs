//! User-defined functions

use std::sync::Arc;

use ahash::AHashMap;

use crate::program::Program;

/// A function declared with `function name(params) ... end function`
#[derive(Debug)]
pub struct ScriptFunction {
    name: String,
    parameters: Vec<String>,
    body: Arc<Program>,
}

impl ScriptFunction {
    pub fn new(name: impl Into<String>, parameters: Vec<String>, body: Program) -> Self {
        Self {
            name: name.into(),
            parameters,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn body(&self) -> &Arc<Program> {
        &self.body
    }

    /// Declaration line, as shown by `show functions`
    pub fn signature(&self) -> String {
        format!("function {}({})", self.name, self.parameters.join(", "))
    }
}

/// Registered functions, keyed case-insensitively
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: AHashMap<String, Arc<ScriptFunction>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, replacing any previous definition
    pub fn register(&mut self, function: Arc<ScriptFunction>) {
        log::debug!("registering function {}", function.name());
        self.functions
            .insert(function.name().to_ascii_lowercase(), function);
    }

    pub fn get(&self, name: &str) -> Option<Arc<ScriptFunction>> {
        self.functions.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn clear(&mut self) {
        self.functions.clear();
    }

    /// Functions sorted by name
    pub fn sorted(&self) -> Vec<Arc<ScriptFunction>> {
        let mut list: Vec<_> = self.functions.values().cloned().collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_case_insensitive() {
        let mut table = FunctionTable::new();
        let f = ScriptFunction::new("Twice", vec!["x".into()], Program::new("Twice", ""));
        table.register(Arc::new(f));
        assert!(table.contains("twice"));
        assert_eq!(table.get("TWICE").map(|f| f.signature()), Some("function Twice(x)".into()));
        assert_eq!(table.len(), 1);
    }
}
