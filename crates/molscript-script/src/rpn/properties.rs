//! Member access, aggregation and indexing

use lin_alg::f64::Vec3;
use molscript_scene::PropertyValue;
use molscript_select::{lookup_atom_property, lookup_bond_property, PropertyType, Selection};

use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::exec::Executor;
use crate::token::Token;
use crate::value::Value;

/// Aggregation suffix of a property access (`{*}.temperature.max`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Aggregate {
    Min,
    Max,
    Average,
    StdDev,
    Sum,
    Sum2,
    All,
}

impl Aggregate {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            "average" => Aggregate::Average,
            "stddev" => Aggregate::StdDev,
            "sum" => Aggregate::Sum,
            "sum2" => Aggregate::Sum2,
            "all" => Aggregate::All,
            _ => return None,
        })
    }
}

/// Running statistics over defined samples
#[derive(Debug, Clone, Copy)]
struct Stats {
    n: usize,
    sum: f64,
    sum2: f64,
    min: f64,
    max: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            n: 0,
            sum: 0.0,
            sum2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Stats {
    fn push(&mut self, v: f64) {
        if v.is_nan() {
            return;
        }
        self.n += 1;
        self.sum += v;
        self.sum2 += v * v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    /// Statistic value; NaN when there were no samples (one, for stddev)
    fn result(&self, aggregate: Aggregate) -> f64 {
        if self.n == 0 {
            return f64::NAN;
        }
        let n = self.n as f64;
        match aggregate {
            Aggregate::Min => self.min,
            Aggregate::Max => self.max,
            Aggregate::Sum => self.sum,
            Aggregate::Sum2 => self.sum2,
            Aggregate::Average | Aggregate::All => self.sum / n,
            Aggregate::StdDev if self.n == 1 => f64::NAN,
            Aggregate::StdDev => {
                let variance = (self.sum2 - self.sum * self.sum / n) / (n - 1.0);
                variance.max(0.0).sqrt()
            }
        }
    }
}

fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::new(f64::NAN, f64::NAN, f64::NAN);
    }
    let n = points.len() as f64;
    let (x, y, z) = points
        .iter()
        .fold((0.0, 0.0, 0.0), |(x, y, z), p| (x + p.x, y + p.y, z + p.z));
    Vec3::new(x / n, y / n, z / n)
}

/// Aggregate per-element property values
fn aggregate(values: Vec<PropertyValue>, ty: PropertyType, aggregate: Option<Aggregate>) -> Value {
    let defined: Vec<PropertyValue> = values
        .into_iter()
        .filter(|v| !v.is_undefined())
        .collect();

    if aggregate == Some(Aggregate::All) {
        return Value::List(defined.iter().map(|v| v.to_string()).collect());
    }

    match ty {
        PropertyType::Point => {
            let points: Vec<Vec3> = defined
                .iter()
                .filter_map(|v| match v {
                    PropertyValue::Point(p) => Some(*p),
                    _ => None,
                })
                .collect();
            match (aggregate, points.as_slice()) {
                (None, [single]) => Value::Point3(*single),
                _ => Value::Point3(centroid(&points)),
            }
        }
        PropertyType::String | PropertyType::IntSet if aggregate.is_none() => {
            match defined.as_slice() {
                [single] => Value::from_property(single.clone()).unwrap_or_default(),
                _ => Value::List(defined.iter().map(|v| v.to_string()).collect()),
            }
        }
        _ => {
            if aggregate.is_none() && defined.len() == 1 {
                return Value::from_property(defined[0].clone()).unwrap_or_default();
            }
            let which = aggregate.unwrap_or(Aggregate::Average);
            let mut stats = Stats::default();
            for v in &defined {
                if let Some(f) = v.as_f64() {
                    stats.push(f);
                }
            }
            let result = stats.result(which);
            let integral = ty == PropertyType::Int
                && matches!(which, Aggregate::Min | Aggregate::Max | Aggregate::Sum);
            if integral && result.is_finite() && result.abs() <= i32::MAX as f64 {
                Value::Integer(result as i32)
            } else {
                Value::Float(result)
            }
        }
    }
}

/// Aggregate over list items parsed as numbers
fn aggregate_list(items: &[String], which: Aggregate) -> Value {
    if which == Aggregate::All {
        return Value::List(items.to_vec());
    }
    let mut stats = Stats::default();
    for item in items {
        if let Ok(f) = item.trim().parse::<f64>() {
            stats.push(f);
        }
    }
    Value::Float(stats.result(which))
}

/// 1-based position; zero and negative count back from the end
fn pick(len: usize, n: i32) -> Option<usize> {
    if n >= 1 {
        let k = (n - 1) as usize;
        (k < len).then_some(k)
    } else {
        let back = n.unsigned_abs() as usize;
        (back < len).then(|| len - 1 - back)
    }
}

/// `value[index]`
pub(super) fn index_value(target: Value, index: &Value) -> ScriptResult<Value> {
    let n = index
        .as_int()
        .ok_or_else(|| ScriptError::of(ErrorKind::IntegerExpected))?;
    Ok(match target {
        Value::List(items) => pick(items.len(), n)
            .map(|k| Value::String(items[k].clone()))
            .unwrap_or_default(),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            pick(chars.len(), n)
                .map(|k| Value::String(chars[k].to_string()))
                .unwrap_or_default()
        }
        Value::Selection(sel) => {
            let mut picked = Selection::new(sel.len()).with_kind(sel.kind());
            if let Some(atom) = pick(sel.count(), n).and_then(|k| sel.nth(k)) {
                picked.insert(atom);
            }
            Value::Selection(picked)
        }
        Value::Point3(p) => match n {
            1 => Value::Float(p.x),
            2 => Value::Float(p.y),
            3 => Value::Float(p.z),
            _ => return Err(ScriptError::integer_out_of_range(1, 3)),
        },
        Value::Plane4(p) => match n {
            1..=4 => Value::Float(p[(n - 1) as usize]),
            _ => return Err(ScriptError::integer_out_of_range(1, 4)),
        },
        other => return Err(ScriptError::invalid_argument(other.type_name())),
    })
}

fn size(value: &Value) -> Value {
    let n = match value {
        Value::Selection(sel) => sel.count(),
        Value::List(items) => items.len(),
        Value::String(s) => s.chars().count(),
        Value::Point3(_) => 3,
        Value::Plane4(_) => 4,
        _ => 1,
    };
    Value::Integer(i32::try_from(n).unwrap_or(i32::MAX))
}

impl Executor<'_> {
    /// Apply `.name` to a value; returns the result and how many following
    /// tokens (an aggregation suffix) were consumed
    pub(super) fn member(
        &mut self,
        target: Value,
        name: &str,
        next: Option<&Token>,
    ) -> ScriptResult<(Value, usize)> {
        let lower = name.to_ascii_lowercase();
        if matches!(lower.as_str(), "size" | "length" | "count") {
            return Ok((size(&target), 0));
        }
        let unknown = || ScriptError::new(ErrorKind::PropertyNameExpected, &[name]);

        let value = match target {
            Value::Selection(sel) => return self.selection_member(sel, &lower, next),
            Value::List(items) => match Aggregate::from_name(&lower) {
                Some(which) => aggregate_list(&items, which),
                None => return Err(unknown()),
            },
            Value::Point3(p) => match lower.as_str() {
                "x" => Value::Float(p.x),
                "y" => Value::Float(p.y),
                "z" => Value::Float(p.z),
                _ => return Err(unknown()),
            },
            Value::Plane4(p) => match lower.as_str() {
                "x" => Value::Float(p[0]),
                "y" => Value::Float(p[1]),
                "z" => Value::Float(p[2]),
                "w" => Value::Float(p[3]),
                _ => return Err(unknown()),
            },
            Value::String(s) => match lower.as_str() {
                "upper" => Value::String(s.to_uppercase()),
                "lower" => Value::String(s.to_lowercase()),
                "trim" => Value::String(s.trim().to_string()),
                _ => return Err(unknown()),
            },
            _ => return Err(unknown()),
        };
        Ok((value, 0))
    }

    /// Property of the atoms (or bonds) in a selection
    fn selection_member(
        &mut self,
        sel: Selection,
        name: &str,
        next: Option<&Token>,
    ) -> ScriptResult<(Value, usize)> {
        let sel = self.restrict(sel);
        let (which, used) = match next {
            Some(Token::Member(suffix)) => match Aggregate::from_name(suffix) {
                Some(which) => (Some(which), 1),
                None => (None, 0),
            },
            _ => (None, 0),
        };

        let (values, ty) = if sel.is_bonds() {
            let property = lookup_bond_property(name)
                .ok_or_else(|| ScriptError::new(ErrorKind::UnrecognizedBondProperty, &[name]))?;
            let values = sel
                .indices()
                .map(|i| self.scene.bond_property(i, property))
                .collect();
            (values, property.value_type())
        } else {
            let property = lookup_atom_property(name)
                .ok_or_else(|| ScriptError::new(ErrorKind::UnrecognizedAtomProperty, &[name]))?;
            let values = sel
                .indices()
                .map(|i| self.scene.atom_property(i, property))
                .collect();
            (values, property.value_type())
        };
        Ok((aggregate(values, ty, which), used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(values: &[f64]) -> Vec<PropertyValue> {
        values.iter().map(|v| PropertyValue::Float(*v)).collect()
    }

    fn as_f64(v: Value) -> f64 {
        v.as_f64().unwrap()
    }

    #[test]
    fn test_stddev_edge_cases() {
        let empty = aggregate(Vec::new(), PropertyType::Float, Some(Aggregate::StdDev));
        assert!(as_f64(empty).is_nan());
        let single = aggregate(floats(&[3.0]), PropertyType::Float, Some(Aggregate::StdDev));
        assert!(as_f64(single).is_nan());
        let two = aggregate(floats(&[1.0, 3.0]), PropertyType::Float, Some(Aggregate::StdDev));
        assert!((as_f64(two) - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_undefined_values_are_excluded() {
        let values = vec![
            PropertyValue::Float(2.0),
            PropertyValue::Undefined,
            PropertyValue::Float(4.0),
        ];
        let avg = aggregate(values, PropertyType::Float, Some(Aggregate::Average));
        assert_eq!(avg, Value::Float(3.0));
    }

    #[test]
    fn test_empty_aggregates_are_nan() {
        for which in [Aggregate::Min, Aggregate::Max, Aggregate::Sum, Aggregate::Sum2] {
            assert!(as_f64(aggregate(Vec::new(), PropertyType::Float, Some(which))).is_nan());
        }
    }

    #[test]
    fn test_integer_min_max() {
        let values = vec![PropertyValue::Int(4), PropertyValue::Int(2)];
        assert_eq!(
            aggregate(values, PropertyType::Int, Some(Aggregate::Min)),
            Value::Integer(2)
        );
    }

    #[test]
    fn test_selection_index() {
        let sel = Selection::from_indices(5, [1, 3, 4]);
        let second = index_value(Value::Selection(sel), &Value::Integer(2)).unwrap();
        assert_eq!(second, Value::Selection(Selection::from_indices(5, [3])));
    }

    #[test]
    fn test_list_aggregates() {
        let items: Vec<String> = ["1", "2", "x", "3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(aggregate_list(&items, Aggregate::Sum), Value::Float(6.0));
    }
}
