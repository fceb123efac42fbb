//! System parameter storage
//!
//! Parameters are declared once in the static [`PARAMETERS`] table. The store
//! keeps one optional value per definition (`None` = default) so lookups are a
//! name search followed by an index, and the state dump can list exactly the
//! parameters that were changed.

use crate::error::{SceneError, SceneResult};
use crate::value::PropertyValue;

/// Default value of a parameter, which also fixes its type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    Bool(bool),
    Int(i32),
    Float(f64),
    Str(&'static str),
}

impl ParamDefault {
    /// The default as a property value
    pub fn value(self) -> PropertyValue {
        match self {
            ParamDefault::Bool(b) => PropertyValue::Bool(b),
            ParamDefault::Int(i) => PropertyValue::Int(i),
            ParamDefault::Float(f) => PropertyValue::Float(f),
            ParamDefault::Str(s) => PropertyValue::Str(s.to_string()),
        }
    }

    fn type_name(self) -> &'static str {
        match self {
            ParamDefault::Bool(_) => "boolean",
            ParamDefault::Int(_) => "integer",
            ParamDefault::Float(_) => "decimal",
            ParamDefault::Str(_) => "string",
        }
    }
}

/// Definition of a system parameter
#[derive(Debug, Clone, Copy)]
pub struct ParameterDef {
    /// Canonical name (matched case-insensitively)
    pub name: &'static str,
    /// Default value
    pub default: ParamDefault,
}

const fn def(name: &'static str, default: ParamDefault) -> ParameterDef {
    ParameterDef { name, default }
}

/// All system parameters known to the scene
pub static PARAMETERS: &[ParameterDef] = &[
    def("ambientPercent", ParamDefault::Int(45)),
    def("appendNew", ParamDefault::Bool(true)),
    def("autoBond", ParamDefault::Bool(true)),
    def("axesMode", ParamDefault::Int(0)),
    def("backgroundColor", ParamDefault::Str("black")),
    def("bondTolerance", ParamDefault::Float(0.45)),
    def("defaultColorScheme", ParamDefault::Str("jmol")),
    def("diffusePercent", ParamDefault::Int(84)),
    def("dotDensity", ParamDefault::Int(3)),
    def("hideNotSelected", ParamDefault::Bool(false)),
    def("minBondDistance", ParamDefault::Float(0.4)),
    def("perspectiveDepth", ParamDefault::Bool(true)),
    def("solventProbeRadius", ParamDefault::Float(1.2)),
    def("specular", ParamDefault::Bool(true)),
    def("specularPower", ParamDefault::Int(40)),
    def("windowCentered", ParamDefault::Bool(true)),
    def("wireframeRadius", ParamDefault::Float(0.15)),
    def("zoomLarge", ParamDefault::Bool(true)),
];

/// Find a parameter definition by name (case-insensitive)
pub fn find_parameter(name: &str) -> Option<(usize, &'static ParameterDef)> {
    PARAMETERS
        .iter()
        .enumerate()
        .find(|(_, d)| d.name.eq_ignore_ascii_case(name))
}

/// Typed system parameter values
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStore {
    /// Current values (None = use default)
    values: Vec<Option<PropertyValue>>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore {
    /// Create a store with every parameter at its default
    pub fn new() -> Self {
        Self {
            values: vec![None; PARAMETERS.len()],
        }
    }

    /// Get a parameter value, falling back to the default
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        let (idx, def) = find_parameter(name)?;
        Some(
            self.values[idx]
                .clone()
                .unwrap_or_else(|| def.default.value()),
        )
    }

    /// Set a parameter
    ///
    /// Returns `Ok(false)` when the name is unknown. Integers are accepted
    /// for decimal parameters; anything else must match the default's type.
    pub fn set(&mut self, name: &str, value: PropertyValue) -> SceneResult<bool> {
        let Some((idx, def)) = find_parameter(name) else {
            return Ok(false);
        };

        let value = match (def.default, value) {
            (ParamDefault::Bool(_), v) => match v.as_bool() {
                Some(b) => PropertyValue::Bool(b),
                None => {
                    return Err(SceneError::type_mismatch(def.name, "boolean", v.type_name()))
                }
            },
            (ParamDefault::Int(_), PropertyValue::Int(i)) => PropertyValue::Int(i),
            (ParamDefault::Float(_), PropertyValue::Int(i)) => PropertyValue::Float(i as f64),
            (ParamDefault::Float(_), PropertyValue::Float(f)) => PropertyValue::Float(f),
            (ParamDefault::Str(_), PropertyValue::Str(s)) => PropertyValue::Str(s),
            (default, v) => {
                return Err(SceneError::type_mismatch(
                    def.name,
                    default.type_name(),
                    v.type_name(),
                ))
            }
        };

        self.values[idx] = if value == def.default.value() {
            None
        } else {
            Some(value)
        };
        Ok(true)
    }

    /// Revert a parameter to its default; returns `false` if unknown
    pub fn reset(&mut self, name: &str) -> bool {
        match find_parameter(name) {
            Some((idx, _)) => {
                self.values[idx] = None;
                true
            }
            None => false,
        }
    }

    /// Revert every parameter
    pub fn reset_all(&mut self) {
        self.values.iter_mut().for_each(|v| *v = None);
    }

    /// Parameters holding a non-default value, in definition order
    pub fn changed(&self) -> Vec<(String, PropertyValue)> {
        PARAMETERS
            .iter()
            .zip(&self.values)
            .filter_map(|(def, v)| v.as_ref().map(|v| (def.name.to_string(), v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let store = ParameterStore::new();
        assert_eq!(store.get("bondtolerance"), Some(PropertyValue::Float(0.45)));
        assert_eq!(store.get("nope"), None);
        assert!(store.changed().is_empty());
    }

    #[test]
    fn test_set_and_changed() {
        let mut store = ParameterStore::new();
        assert_eq!(store.set("dotDensity", PropertyValue::Int(2)), Ok(true));
        assert_eq!(store.set("bondTolerance", PropertyValue::Int(1)), Ok(true));
        assert_eq!(store.get("bondTolerance"), Some(PropertyValue::Float(1.0)));
        assert_eq!(store.set("unknownThing", PropertyValue::Int(1)), Ok(false));

        let changed = store.changed();
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[0].0, "bondTolerance");
    }

    #[test]
    fn test_type_mismatch() {
        let mut store = ParameterStore::new();
        let err = store
            .set("dotDensity", PropertyValue::Str("a".into()))
            .unwrap_err();
        assert!(matches!(err, SceneError::TypeMismatch { .. }));
    }

    #[test]
    fn test_setting_default_clears_change() {
        let mut store = ParameterStore::new();
        store.set("specular", PropertyValue::Bool(false)).unwrap();
        assert_eq!(store.changed().len(), 1);
        store.set("specular", PropertyValue::from("on")).unwrap();
        assert!(store.changed().is_empty());
        assert!(store.reset("SPECULAR"));
    }
}
