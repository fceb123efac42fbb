//! Built-in math functions and implicit iteration

use lin_alg::f64::Vec3;
use molscript_scene::ShapeKind;
use molscript_select::Selection;

use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::exec::Executor;
use crate::token::{FunctionKind, Token};
use crate::value::Value;
use crate::variables::Scope;

fn number(value: &Value) -> ScriptResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| ScriptError::new(ErrorKind::NumberExpected, &[&value.to_string()]))
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

fn norm(a: Vec3) -> f64 {
    (a.x * a.x + a.y * a.y + a.z * a.z).sqrt()
}

/// Plane through three points, normal normalized
fn plane_through(a: Vec3, b: Vec3, c: Vec3) -> ScriptResult<[f64; 4]> {
    let n = cross(sub(b, a), sub(c, a));
    let len = norm(n);
    if len == 0.0 || len.is_nan() {
        return Err(ScriptError::of(ErrorKind::PlaneExpected));
    }
    let n = Vec3::new(n.x / len, n.y / len, n.z / len);
    Ok([n.x, n.y, n.z, -(n.x * a.x + n.y * a.y + n.z * a.z)])
}

/// Signed distance from a point to a plane
pub(crate) fn plane_distance(plane: &[f64; 4], p: Vec3) -> f64 {
    let len = (plane[0] * plane[0] + plane[1] * plane[1] + plane[2] * plane[2]).sqrt();
    (plane[0] * p.x + plane[1] * p.y + plane[2] * p.z + plane[3]) / len
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let k = 10f64.powi(decimals);
    (x * k).round() / k
}

impl Executor<'_> {
    /// Evaluate a built-in call whose argument ranges are `args`
    pub(super) fn call_builtin(
        &mut self,
        kind: FunctionKind,
        tokens: &[Token],
        args: &[(usize, usize)],
    ) -> ScriptResult<Value> {
        match kind {
            FunctionKind::For | FunctionKind::Select => self.iterate(kind, tokens, args),
            FunctionKind::Within => {
                let selection = self.within(tokens, args, false)?;
                Ok(Value::Selection(self.restrict(selection)))
            }
            _ => {
                let mut values = Vec::with_capacity(args.len());
                for &(start, end) in args {
                    values.push(self.eval_range(tokens, start, end)?);
                }
                self.apply_builtin(kind, values)
            }
        }
    }

    fn apply_builtin(&mut self, kind: FunctionKind, values: Vec<Value>) -> ScriptResult<Value> {
        let unary = |values: &[Value]| -> ScriptResult<f64> {
            match values {
                [v] => number(v),
                _ => Err(ScriptError::bad_argument_count()),
            }
        };
        Ok(match kind {
            FunctionKind::Abs => match values.as_slice() {
                [Value::Integer(i)] => match i.checked_abs() {
                    Some(a) => Value::Integer(a),
                    None => Value::Float((*i as f64).abs()),
                },
                _ => Value::Float(unary(&values)?.abs()),
            },
            FunctionKind::Sqrt => Value::Float(unary(&values)?.sqrt()),
            FunctionKind::Sin => Value::Float(unary(&values)?.to_radians().sin()),
            FunctionKind::Cos => Value::Float(unary(&values)?.to_radians().cos()),
            FunctionKind::Acos => Value::Float(unary(&values)?.acos().to_degrees()),
            FunctionKind::Floor => {
                let f = unary(&values)?.floor();
                if f.is_finite() && f.abs() <= i32::MAX as f64 {
                    Value::Integer(f as i32)
                } else {
                    Value::Float(f)
                }
            }
            FunctionKind::Round => match values.as_slice() {
                [v] => {
                    let r = number(v)?.round();
                    if r.is_finite() && r.abs() <= i32::MAX as f64 {
                        Value::Integer(r as i32)
                    } else {
                        Value::Float(r)
                    }
                }
                [v, places] => {
                    let places = places
                        .as_int()
                        .ok_or_else(|| ScriptError::of(ErrorKind::IntegerExpected))?;
                    Value::Float(round_to(number(v)?, places))
                }
                _ => return Err(ScriptError::bad_argument_count()),
            },
            FunctionKind::Point => self.point(values)?,
            FunctionKind::Plane => self.plane(values)?,
            FunctionKind::Distance => match values.as_slice() {
                [a, b] => self.distance(a, b)?,
                _ => return Err(ScriptError::bad_argument_count()),
            },
            FunctionKind::Array => Value::List(
                values
                    .into_iter()
                    .flat_map(|v| match v {
                        Value::List(items) => items,
                        other => vec![other.to_string()],
                    })
                    .collect(),
            ),
            FunctionKind::Eval => match values.as_slice() {
                [Value::String(text)] => self.evaluate_text(text)?,
                [other] => other.clone(),
                _ => return Err(ScriptError::bad_argument_count()),
            },
            FunctionKind::Script => match values.as_slice() {
                [text] => Value::String(self.run_captured(&text.to_string())?),
                _ => return Err(ScriptError::bad_argument_count()),
            },
            FunctionKind::ShapeProperty => match values.as_slice() {
                [shape, name] => {
                    let shape_name = shape.to_string();
                    let kind = ShapeKind::from_name(&shape_name).ok_or_else(|| {
                        ScriptError::new(ErrorKind::UnrecognizedObject, &[&shape_name])
                    })?;
                    self.scene
                        .shape_property(kind, &name.to_string())
                        .and_then(Value::from_property)
                        .unwrap_or_default()
                }
                _ => return Err(ScriptError::bad_argument_count()),
            },
            FunctionKind::For | FunctionKind::Select | FunctionKind::Within => {
                return Err(ScriptError::of(ErrorKind::UnrecognizedExpression))
            }
        })
    }

    /// `for(x; {set}; expr)` collects, `select(x; {set}; expr)` filters
    fn iterate(
        &mut self,
        kind: FunctionKind,
        tokens: &[Token],
        args: &[(usize, usize)],
    ) -> ScriptResult<Value> {
        let [(var_start, var_end), (set_start, set_end), (expr_start, expr_end)] = args else {
            return Err(ScriptError::bad_argument_count());
        };
        let name = match &tokens[*var_start..*var_end] {
            [Token::Identifier(name)] => name.clone(),
            _ => {
                return Err(ScriptError::new(ErrorKind::InvalidArgument, &["loop variable"])
                    .at_token(*var_start))
            }
        };
        let set = match self.eval_range(tokens, *set_start, *set_end)? {
            Value::Selection(sel) => self.restrict(sel),
            other => {
                return Err(
                    ScriptError::new(ErrorKind::ExpressionExpected, &[&other.to_string()])
                        .at_token(*set_start),
                )
            }
        };

        let mut collected = Vec::new();
        let mut matched = Selection::new(set.len()).with_kind(set.kind());
        self.iterations.push(Scope::new());
        let outcome = (|| -> ScriptResult {
            for index in set.indices() {
                let element = Selection::from_indices(set.len(), [index]).with_kind(set.kind());
                if let Some(scope) = self.iterations.last_mut() {
                    scope.set(&name, Value::Selection(element));
                }
                let value = self.eval_range(tokens, *expr_start, *expr_end)?;
                match kind {
                    FunctionKind::Select if value.is_truthy() => matched.insert(index),
                    FunctionKind::Select => {}
                    _ => collected.push(value.to_string()),
                }
            }
            Ok(())
        })();
        self.iterations.pop();
        outcome?;

        Ok(match kind {
            FunctionKind::Select => Value::Selection(matched),
            _ => Value::List(collected),
        })
    }

    /// Point value of a selection (centroid) or a point
    pub(crate) fn as_point(&self, value: &Value) -> ScriptResult<Vec3> {
        match value {
            Value::Point3(p) => Ok(*p),
            Value::Selection(sel) if !sel.is_bonds() => {
                let points: Vec<Vec3> = sel
                    .indices()
                    .filter_map(|i| self.scene.atom_position(i))
                    .collect();
                if points.is_empty() {
                    return Err(ScriptError::of(ErrorKind::CoordinateOrNameOrExpressionRequired));
                }
                let n = points.len() as f64;
                let (x, y, z) = points
                    .iter()
                    .fold((0.0, 0.0, 0.0), |(x, y, z), p| (x + p.x, y + p.y, z + p.z));
                Ok(Vec3::new(x / n, y / n, z / n))
            }
            other => Err(ScriptError::new(
                ErrorKind::CoordinateOrNameOrExpressionRequired,
                &[&other.to_string()],
            )),
        }
    }

    fn point(&mut self, values: Vec<Value>) -> ScriptResult<Value> {
        match values.as_slice() {
            [x, y, z] => Ok(Value::Point3(Vec3::new(number(x)?, number(y)?, number(z)?))),
            [Value::String(text)] => match self.evaluate_text(text)? {
                p @ Value::Point3(_) => Ok(p),
                other => Ok(Value::Point3(self.as_point(&other)?)),
            },
            [v] => Ok(Value::Point3(self.as_point(v)?)),
            _ => Err(ScriptError::bad_argument_count()),
        }
    }

    fn plane(&mut self, values: Vec<Value>) -> ScriptResult<Value> {
        match values.as_slice() {
            [a, b, c, d] => Ok(Value::Plane4([number(a)?, number(b)?, number(c)?, number(d)?])),
            [a, b, c] => {
                let (a, b, c) = (self.as_point(a)?, self.as_point(b)?, self.as_point(c)?);
                Ok(Value::Plane4(plane_through(a, b, c)?))
            }
            [p @ Value::Plane4(_)] => Ok(p.clone()),
            [_] => Err(ScriptError::of(ErrorKind::PlaneExpected)),
            _ => Err(ScriptError::bad_argument_count()),
        }
    }

    fn distance(&self, a: &Value, b: &Value) -> ScriptResult<Value> {
        Ok(Value::Float(match (a, b) {
            (Value::Plane4(plane), other) | (other, Value::Plane4(plane)) => {
                plane_distance(plane, self.as_point(other)?)
            }
            _ => norm(sub(self.as_point(a)?, self.as_point(b)?)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Compiler, ScriptCompiler};
    use crate::engine::ScriptEngine;
    use molscript_scene::MemoryScene;

    fn eval(source: &str) -> ScriptResult<Value> {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(4);
        let tokens = ScriptCompiler::new().compile_expression(source).unwrap();
        let mut exec = Executor::new(&mut engine, &mut scene);
        exec.evaluate(&tokens)
    }

    #[test]
    fn test_math_functions() {
        assert_eq!(eval("abs(-3)").unwrap(), Value::Integer(3));
        assert_eq!(eval("sqrt(16)").unwrap(), Value::Float(4.0));
        assert_eq!(eval("floor(2.7)").unwrap(), Value::Integer(2));
        assert_eq!(eval("round(2.5)").unwrap(), Value::Integer(3));
        assert!((eval("cos(60)").unwrap().as_f64().unwrap() - 0.5).abs() < 1e-12);
        assert!((eval("acos(0)").unwrap().as_f64().unwrap() - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_points_and_distances() {
        assert_eq!(
            eval("point(1, 2, 3)").unwrap(),
            Value::Point3(Vec3::new(1.0, 2.0, 3.0))
        );
        assert_eq!(eval("distance({0 0 0}, {3 4 0})").unwrap(), Value::Float(5.0));
        // atoms lie on the x axis 1.5 apart
        assert_eq!(eval("distance({atomno=1}, {atomno=3})").unwrap(), Value::Float(3.0));
        assert_eq!(eval("distance({0 0 1 -2}, {5 5 5})").unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_plane_through_points() {
        let plane = eval("plane({0 0 0}, {1 0 0}, {0 1 0})").unwrap();
        assert_eq!(plane, Value::Plane4([0.0, 0.0, 1.0, 0.0]));
        assert_eq!(
            eval("plane({0 0 0}, {1 0 0}, {2 0 0})").unwrap_err().kind(),
            ErrorKind::PlaneExpected
        );
    }

    #[test]
    fn test_implicit_iteration() {
        assert_eq!(
            eval("for(a; {atomno<3}; a.atomno * 10)").unwrap(),
            Value::List(vec!["10".into(), "20".into()])
        );
        let picked = eval("select(a; {*}; a.temperature > 15)").unwrap();
        assert_eq!(picked, Value::Selection(Selection::from_indices(4, [2, 3])));
        assert_eq!(eval("for(a; {none}; a.atomno)").unwrap(), Value::List(Vec::new()));
    }

    #[test]
    fn test_iteration_skips_deleted_atoms() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(3);
        let program = ScriptCompiler::new()
            .compile("test", "a = {*}\ndelete atomno=1")
            .unwrap();
        let mut exec = Executor::new(&mut engine, &mut scene);
        exec.run_nested(crate::context::ExecutionContext::script(
            std::sync::Arc::new(program),
            crate::config::ExecutionFlags::default(),
        ))
        .unwrap();
        let mut eval = |source: &str| {
            let tokens = ScriptCompiler::new().compile_expression(source).unwrap();
            exec.evaluate(&tokens).unwrap()
        };
        assert_eq!(
            eval("for(x; a; x.atomno)"),
            Value::List(vec!["2".into(), "3".into()])
        );
        assert_eq!(eval("a.atomno.min"), Value::Integer(2));
        assert_eq!(eval("select(x; a; x.atomno < 3)"), Value::Selection(Selection::from_indices(3, [1])));
    }

    #[test]
    fn test_nested_iteration_shadows() {
        let nested = eval("for(a; {atomno=1}; for(a; {atomno=2}; a.atomno)[1] + a.atomno)").unwrap();
        assert_eq!(nested, Value::List(vec!["21".into()]));
    }

    #[test]
    fn test_array_and_eval() {
        assert_eq!(
            eval("array(1, \"b\")").unwrap(),
            Value::List(vec!["1".into(), "b".into()])
        );
        assert_eq!(eval("eval(\"2 + 3\")").unwrap(), Value::Integer(5));
    }
}
