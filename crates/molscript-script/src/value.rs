//! Script values
//!
//! Values are produced fresh by the evaluators. Selections are cloned on
//! every store so a scene-computed set never aliases a user variable.

use std::fmt;

use lin_alg::f64::Vec3;
use molscript_scene::PropertyValue;
use molscript_select::Selection;

use crate::token::Token;

/// A value produced by expression evaluation
#[derive(Debug, Clone)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    Float(f64),
    String(String),
    Point3(Vec3),
    /// Plane `ax + by + cz + d = 0`, also used for quaternions
    Plane4([f64; 4]),
    List(Vec<String>),
    Selection(Selection),
    /// Reference to a user-defined function by name
    FunctionRef(String),
}

impl Value {
    /// Short type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "decimal",
            Value::String(_) => "string",
            Value::Point3(_) => "point",
            Value::Plane4(_) => "plane",
            Value::List(_) => "array",
            Value::Selection(_) => "bitset",
            Value::FunctionRef(_) => "function",
        }
    }

    /// Truth value used by `if`, `while` and logical operators
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            Value::Point3(_) | Value::Plane4(_) | Value::FunctionRef(_) => true,
            Value::List(items) => !items.is_empty(),
            Value::Selection(sel) => !sel.is_empty(),
        }
    }

    /// Numeric view; strings are parsed and selections count their members
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Selection(sel) => Some(sel.count() as f64),
            _ => None,
        }
    }

    /// Integer view; decimals truncate toward zero
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::String(s) => match s.trim().parse::<i32>() {
                Ok(i) => Some(i),
                Err(_) => self.as_f64().filter(|f| f.is_finite()).map(|f| f as i32),
            },
            _ => self.as_f64().filter(|f| f.is_finite()).map(|f| f as i32),
        }
    }

    pub fn as_point(&self) -> Option<Vec3> {
        match self {
            Value::Point3(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_selection(&self) -> Option<&Selection> {
        match self {
            Value::Selection(sel) => Some(sel),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Convert a scene property value; `Undefined` has no script equivalent
    pub fn from_property(value: PropertyValue) -> Option<Value> {
        Some(match value {
            PropertyValue::Undefined => return None,
            PropertyValue::Bool(b) => Value::Boolean(b),
            PropertyValue::Int(i) => Value::Integer(i),
            PropertyValue::Float(f) => Value::Float(f),
            PropertyValue::Str(s) => Value::String(s),
            PropertyValue::Point(p) => Value::Point3(p),
            PropertyValue::IntSet(items) => {
                Value::List(items.iter().map(|i| i.to_string()).collect())
            }
            PropertyValue::Selection(sel) => Value::Selection(sel),
        })
    }

    /// Convert to the scene-side representation
    pub fn to_property(&self) -> PropertyValue {
        match self {
            Value::Boolean(b) => PropertyValue::Bool(*b),
            Value::Integer(i) => PropertyValue::Int(*i),
            Value::Float(f) => PropertyValue::Float(*f),
            Value::Point3(p) => PropertyValue::Point(*p),
            Value::Selection(sel) => PropertyValue::Selection(sel.clone()),
            Value::List(items) => {
                let ints: Option<Vec<i32>> = items.iter().map(|s| s.parse().ok()).collect();
                match ints {
                    Some(ints) => PropertyValue::IntSet(ints),
                    None => PropertyValue::Str(items.join("\n")),
                }
            }
            other => PropertyValue::Str(other.to_string()),
        }
    }

    /// Literal instruction carrying this value, used by `@name` substitution
    pub fn to_token(&self) -> Token {
        match self {
            Value::Boolean(b) => Token::Boolean(*b),
            Value::Integer(i) => Token::Integer(*i),
            Value::Float(f) => Token::Decimal(*f),
            Value::Point3(p) => Token::Point3(*p),
            Value::Plane4(p) => Token::Plane4(*p),
            Value::Selection(sel) => Token::Bitset(sel.clone()),
            Value::FunctionRef(name) => Token::Identifier(name.clone()),
            Value::String(s) => Token::Str(s.clone()),
            Value::List(_) => Token::Str(self.to_string()),
        }
    }

    /// Re-executable source form (quoted strings, array literals)
    pub fn to_literal(&self) -> String {
        match self {
            Value::String(s) => quote(s),
            Value::Float(f) if f.is_nan() => "0/0".to_string(),
            Value::Float(f) if f.is_infinite() => {
                if f.is_sign_positive() { "1/0" } else { "-1/0" }.to_string()
            }
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(|s| quote(s)).collect();
                format!("[{}]", items.join(", "))
            }
            other => other.to_string(),
        }
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Default for Value {
    /// The empty string, produced for unbound names
    fn default() -> Self {
        Value::String(String::new())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Point3(a), Value::Point3(b)) => a.x == b.x && a.y == b.y && a.z == b.z,
            (Value::Plane4(a), Value::Plane4(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Selection(a), Value::Selection(b)) => a == b,
            (Value::FunctionRef(a), Value::FunctionRef(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::String(s) => f.write_str(s),
            Value::Point3(p) => write!(f, "{{{:?} {:?} {:?}}}", p.x, p.y, p.z),
            Value::Plane4(p) => write!(f, "{{{:?} {:?} {:?} {:?}}}", p[0], p[1], p[2], p[3]),
            Value::List(items) => f.write_str(&items.join("\n")),
            Value::Selection(sel) => write!(f, "{}", sel),
            Value::FunctionRef(name) => f.write_str(name),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Selection> for Value {
    fn from(v: Selection) -> Self {
        Value::Selection(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Integer(2).is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(!Value::from("false").is_truthy());
        assert!(!Value::Selection(Selection::new(4)).is_truthy());
        assert!(Value::Selection(Selection::all(1)).is_truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(f64::NAN).to_string(), "NaN");
        assert_eq!(
            Value::List(vec!["a".into(), "b".into()]).to_string(),
            "a\nb"
        );
        assert_eq!(
            Value::Selection(Selection::from_indices(5, [0, 2, 3])).to_string(),
            "({0 2:3})"
        );
    }

    #[test]
    fn test_literal_form() {
        assert_eq!(Value::Float(f64::NAN).to_literal(), "0/0");
        assert_eq!(Value::Float(f64::NEG_INFINITY).to_literal(), "-1/0");
        assert_eq!(Value::from("say \"hi\"").to_literal(), "\"say \\\"hi\\\"\"");
        assert_eq!(
            Value::List(vec!["1".into(), "x".into()]).to_literal(),
            "[\"1\", \"x\"]"
        );
        assert_eq!(Value::Integer(3).to_literal(), "3");
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::from(" 4.5 ").as_f64(), Some(4.5));
        assert_eq!(Value::from("7").as_int(), Some(7));
        assert_eq!(Value::Float(-2.9).as_int(), Some(-2));
        assert_eq!(Value::Selection(Selection::all(3)).as_f64(), Some(3.0));
        assert_eq!(Value::Point3(Vec3::new(0.0, 0.0, 0.0)).as_f64(), None);
    }

    #[test]
    fn test_property_conversion() {
        assert_eq!(Value::from_property(PropertyValue::Undefined), None);
        assert_eq!(
            Value::from_property(PropertyValue::IntSet(vec![1, 2])),
            Some(Value::List(vec!["1".into(), "2".into()]))
        );
        assert_eq!(
            Value::List(vec!["1".into(), "2".into()]).to_property(),
            PropertyValue::IntSet(vec![1, 2])
        );
    }
}
