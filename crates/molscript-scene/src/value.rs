//! Values crossing the scene boundary

use std::fmt;

use lin_alg::f64::Vec3;
use molscript_select::Selection;

/// Value of an atom/bond property, a system parameter or a shape property
///
/// `Undefined` marks a property that has no value for a given element
/// (e.g. a partial charge that was never read). Aggregations skip it.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// No value for this element
    Undefined,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i32),
    /// Floating-point value
    Float(f64),
    /// String value
    Str(String),
    /// 3D point
    Point(Vec3),
    /// Set of integers (e.g. symmetry operators)
    IntSet(Vec<i32>),
    /// Atom or bond selection
    Selection(Selection),
}

impl PropertyValue {
    /// Check if this value is undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, PropertyValue::Undefined)
    }

    /// Numeric view of the value; `None` for non-numeric or NaN values
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            PropertyValue::Int(i) => *i as f64,
            PropertyValue::Float(f) => *f,
            PropertyValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            _ => return None,
        };
        (!v.is_nan()).then_some(v)
    }

    /// Integer view of the value
    pub fn as_int(&self) -> Option<i32> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::Float(f) if f.is_finite() => Some(*f as i32),
            PropertyValue::Bool(b) => Some(*b as i32),
            _ => None,
        }
    }

    /// Boolean view of the value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Int(i) => Some(*i != 0),
            PropertyValue::Str(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" => Some(true),
                "false" | "off" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// String view of the value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Undefined => "undefined",
            PropertyValue::Bool(_) => "boolean",
            PropertyValue::Int(_) => "integer",
            PropertyValue::Float(_) => "decimal",
            PropertyValue::Str(_) => "string",
            PropertyValue::Point(_) => "point",
            PropertyValue::IntSet(_) => "set",
            PropertyValue::Selection(_) => "selection",
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyValue::Undefined, PropertyValue::Undefined) => true,
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a == b,
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a == b,
            (PropertyValue::Float(a), PropertyValue::Float(b)) => a == b,
            (PropertyValue::Str(a), PropertyValue::Str(b)) => a == b,
            (PropertyValue::Point(a), PropertyValue::Point(b)) => {
                a.x == b.x && a.y == b.y && a.z == b.z
            }
            (PropertyValue::IntSet(a), PropertyValue::IntSet(b)) => a == b,
            (PropertyValue::Selection(a), PropertyValue::Selection(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Undefined => Ok(()),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Float(v) => write!(f, "{:?}", v),
            PropertyValue::Str(s) => f.write_str(s),
            PropertyValue::Point(p) => write!(f, "{{{:?} {:?} {:?}}}", p.x, p.y, p.z),
            PropertyValue::IntSet(items) => {
                let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", items.join(","))
            }
            PropertyValue::Selection(sel) => write!(f, "{}", sel),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_views() {
        assert_eq!(PropertyValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(PropertyValue::Float(f64::NAN).as_f64(), None);
        assert_eq!(PropertyValue::Str("x".into()).as_f64(), None);
        assert_eq!(PropertyValue::Float(2.7).as_int(), Some(2));
    }

    #[test]
    fn test_bool_view() {
        assert_eq!(PropertyValue::from("ON").as_bool(), Some(true));
        assert_eq!(PropertyValue::Int(0).as_bool(), Some(false));
        assert_eq!(PropertyValue::Float(1.0).as_bool(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(PropertyValue::Float(2.0).to_string(), "2.0");
        assert_eq!(PropertyValue::IntSet(vec![1, 3]).to_string(), "[1,3]");
        assert_eq!(
            PropertyValue::Point(Vec3::new(1.0, 0.5, -2.0)).to_string(),
            "{1.0 0.5 -2.0}"
        );
    }
}
