//! Atom expression evaluator
//!
//! Turns the tokens between `ExpressionBegin` and `ExpressionEnd` into a
//! [`Selection`]. Works like the math evaluator with a narrower grammar:
//! operands are comparisons, names, bitset literals, `within(...)` and
//! nested expressions, combined with `not` (complement), `and`, `or` and
//! `xor`. Every selection handed to a command is restricted to live atoms
//! and the active subset.

use lin_alg::f64::Vec3;
use molscript_scene::PropertyValue;
use molscript_select::{AtomProperty, CompareOp, Selection};

use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::exec::Executor;
use crate::rpn::{call_arguments, matching_close, plane_distance};
use crate::token::{Comparison, FunctionKind, Operand, Operator, PropertyRef, Token};
use crate::value::Value;
use crate::variables::Definition;

#[derive(Debug, Clone, Copy, PartialEq)]
enum SetOp {
    Not,
    And,
    Or,
    Xor,
    Paren,
}

impl SetOp {
    fn precedence(self) -> u8 {
        match self {
            SetOp::Or | SetOp::Xor => Operator::Or.precedence(),
            SetOp::And => Operator::And.precedence(),
            SetOp::Not => Operator::Not.precedence(),
            SetOp::Paren => 0,
        }
    }
}

struct SetStacks {
    operands: Vec<Selection>,
    operators: Vec<SetOp>,
}

impl SetStacks {
    fn pop_operand(&mut self) -> ScriptResult<Selection> {
        self.operands
            .pop()
            .ok_or_else(|| ScriptError::of(ErrorKind::ExpressionExpected))
    }

    fn apply_top(&mut self) -> ScriptResult {
        let Some(op) = self.operators.pop() else {
            return Ok(());
        };
        let result = match op {
            SetOp::Not => self.pop_operand()?.complement(),
            SetOp::Paren => return Ok(()),
            binary => {
                let rhs = self.pop_operand()?;
                let lhs = self.pop_operand()?;
                match binary {
                    SetOp::And => lhs.intersection(&rhs),
                    SetOp::Or => lhs.union(&rhs),
                    _ => lhs.symmetric_difference(&rhs),
                }
            }
        };
        self.operands.push(result);
        Ok(())
    }

    fn reduce_for(&mut self, precedence: u8) -> ScriptResult {
        while let Some(top) = self.operators.last().copied() {
            if top == SetOp::Paren || top.precedence() < precedence {
                break;
            }
            self.apply_top()?;
        }
        Ok(())
    }
}

/// Whether a scalar property value satisfies a comparison
fn matches(value: &PropertyValue, op: CompareOp, operand: &Operand) -> bool {
    match (value, operand) {
        (PropertyValue::Undefined, _) => false,
        (PropertyValue::IntSet(members), Operand::Int(n)) => op.compare_set(members, *n),
        (PropertyValue::IntSet(_), _) => false,
        (PropertyValue::Int(a), Operand::Int(b)) => op.compare_i32(*a, *b),
        (PropertyValue::Str(s), Operand::Str(text)) => op.compare_str(s, text),
        (PropertyValue::Str(s), Operand::Int(n)) => op.compare_str(s, &n.to_string()),
        (PropertyValue::Str(s), Operand::Float(f)) => op.compare_str(s, &f.to_string()),
        (value, Operand::Str(text)) => match (value.as_f64(), text.trim().parse::<f64>()) {
            (Some(a), Ok(b)) => op.compare_f64(a, b),
            _ => false,
        },
        (value, Operand::Int(n)) => value.as_f64().is_some_and(|a| op.compare_f64(a, *n as f64)),
        (value, Operand::Float(f)) => value.as_f64().is_some_and(|a| op.compare_f64(a, *f)),
        (_, Operand::VarRef(_)) => false,
    }
}

/// Candidate singular forms of a plural set name (`waters`, `polies`)
fn singular_forms(name: &str) -> Vec<String> {
    let lower = name.to_ascii_lowercase();
    let mut forms = Vec::new();
    if let Some(stem) = lower.strip_suffix("ies") {
        forms.push(format!("{}y", stem));
    }
    if let Some(stem) = lower.strip_suffix("es") {
        forms.push(stem.to_string());
    }
    if let Some(stem) = lower.strip_suffix('s') {
        forms.push(stem.to_string());
    }
    forms.retain(|s| !s.is_empty());
    forms
}

/// Grouping keyword accepted as the first `within` argument
fn grouping(name: &str) -> Option<&'static [AtomProperty]> {
    Some(match name.to_ascii_lowercase().as_str() {
        "group" | "residue" => &[AtomProperty::Model, AtomProperty::Chain, AtomProperty::ResNo],
        "chain" => &[AtomProperty::Model, AtomProperty::Chain],
        "model" => &[AtomProperty::Model],
        "element" => &[AtomProperty::Element],
        _ => return None,
    })
}

/// Target of a distance-based `within`
enum Proximity {
    Points(Vec<Vec3>),
    Plane([f64; 4]),
}

impl Executor<'_> {
    /// Evaluate an atom expression for use as a command target
    pub(crate) fn evaluate_selection(&mut self, tokens: &[Token]) -> ScriptResult<Selection> {
        let selection = self.selection_expression(tokens)?;
        Ok(self.restrict(selection))
    }

    /// Drop deleted atoms and everything outside the subset
    pub(crate) fn restrict(&self, selection: Selection) -> Selection {
        let deleted = self.scene.deleted_atoms();
        if selection.is_bonds() {
            let mut live = selection.resized(self.scene.bond_count());
            for bond in selection.indices() {
                let dead = match self.scene.bond_atoms(bond) {
                    Some((a, b)) => deleted.contains(a) || deleted.contains(b),
                    None => true,
                };
                if dead {
                    live.remove(bond);
                }
            }
            return live;
        }
        let n = self.scene.atom_count();
        let mut live = selection.resized(n);
        live.subtract(&deleted);
        if let Some(subset) = &self.engine.subset {
            live.intersect_with(&subset.resized(n));
        }
        live
    }

    /// Evaluate without restriction; the empty expression selects nothing
    pub(crate) fn selection_expression(&mut self, tokens: &[Token]) -> ScriptResult<Selection> {
        let universe = self.scene.atom_count();
        if tokens.is_empty() {
            return Ok(Selection::new(universe));
        }
        let mut stacks = SetStacks {
            operands: Vec::new(),
            operators: Vec::new(),
        };
        let mut expect_operand = true;
        let mut i = 0;

        while i < tokens.len() {
            let operand = match &tokens[i] {
                Token::Op(Operator::Not) if expect_operand => {
                    stacks.operators.push(SetOp::Not);
                    None
                }
                Token::Op(op) if !expect_operand => {
                    let set_op = match op {
                        Operator::And => SetOp::And,
                        Operator::Or => SetOp::Or,
                        Operator::Xor => SetOp::Xor,
                        _ => {
                            return Err(ScriptError::of(ErrorKind::ExpressionExpected).at_token(i))
                        }
                    };
                    stacks
                        .reduce_for(set_op.precedence())
                        .map_err(|e| e.at_token(i))?;
                    stacks.operators.push(set_op);
                    expect_operand = true;
                    None
                }
                Token::LeftParen if expect_operand => {
                    stacks.operators.push(SetOp::Paren);
                    None
                }
                Token::RightParen if !expect_operand => {
                    loop {
                        match stacks.operators.last() {
                            Some(SetOp::Paren) => {
                                stacks.operators.pop();
                                break;
                            }
                            Some(_) => stacks.apply_top()?,
                            None => {
                                return Err(
                                    ScriptError::of(ErrorKind::ExpressionExpected).at_token(i)
                                )
                            }
                        }
                    }
                    None
                }
                Token::ExpressionBegin => {
                    let close = matching_close(tokens, i)?;
                    let inner = self
                        .selection_expression(&tokens[i + 1..close])
                        .map_err(|e| e.offset_token(i + 1))?;
                    i = close;
                    Some(inner)
                }
                Token::Comparison(comparison) => {
                    Some(self.compare_property(comparison).map_err(|e| e.at_token(i))?)
                }
                Token::Identifier(name) => {
                    Some(self.named_selection(name).map_err(|e| e.at_token(i))?)
                }
                Token::Bitset(sel) => Some(self.universe_sized(sel)),
                Token::Function(FunctionKind::Within) => {
                    let (args, close) = call_arguments(tokens, i, &Token::Comma)?;
                    let within = self.within(tokens, &args, true).map_err(|e| e.at_token(i))?;
                    i = close;
                    Some(within)
                }
                Token::Function(_) | Token::Call(_) => {
                    let close = matching_close(tokens, i + 1)?;
                    let value = self.eval_range(tokens, i, close + 1)?;
                    i = close;
                    Some(self.value_selection(value).map_err(|e| e.at_token(i))?)
                }
                Token::VarRef(name) => {
                    let value = self.lookup(name).unwrap_or_default();
                    Some(self.value_selection(value).map_err(|e| e.at_token(i))?)
                }
                Token::Substitution(text) => {
                    let value = self.evaluate_text(text).map_err(|e| e.at_token(i))?;
                    Some(self.value_selection(value).map_err(|e| e.at_token(i))?)
                }
                _ => return Err(ScriptError::of(ErrorKind::ExpressionExpected).at_token(i)),
            };

            if let Some(selection) = operand {
                if !expect_operand {
                    return Err(ScriptError::of(ErrorKind::ExpressionExpected).at_token(i));
                }
                stacks.operands.push(selection);
                expect_operand = false;
            }
            i += 1;
        }

        if expect_operand {
            return Err(ScriptError::of(ErrorKind::ExpressionExpected));
        }
        while let Some(op) = stacks.operators.last().copied() {
            if op == SetOp::Paren {
                return Err(ScriptError::of(ErrorKind::ExpressionExpected));
            }
            stacks.apply_top()?;
        }
        match stacks.operands.len() {
            1 => stacks.pop_operand(),
            _ => Err(ScriptError::of(ErrorKind::ExpressionExpected)),
        }
    }

    /// Selection named by a value: a selection, or a set name held in a string
    fn value_selection(&mut self, value: Value) -> ScriptResult<Selection> {
        match value {
            Value::Selection(sel) => Ok(self.universe_sized(&sel)),
            Value::String(name) if !name.is_empty() => self.named_selection(&name),
            other => Err(ScriptError::new(
                ErrorKind::ExpressionExpected,
                &[&other.to_string()],
            )),
        }
    }

    /// Atoms (or bonds) whose property satisfies a comparison
    fn compare_property(&mut self, comparison: &Comparison) -> ScriptResult<Selection> {
        let operand = match &comparison.operand {
            Operand::VarRef(name) => match self.lookup(name).unwrap_or_default() {
                Value::Integer(n) => Operand::Int(n),
                Value::Float(f) => Operand::Float(f),
                other => Operand::Str(other.to_string()),
            },
            other => other.clone(),
        };
        Ok(match comparison.property {
            PropertyRef::Atom(property) => {
                let n = self.scene.atom_count();
                let hits = (0..n).filter(|&i| {
                    matches(&self.scene.atom_property(i, property), comparison.op, &operand)
                });
                Selection::from_indices(n, hits)
            }
            PropertyRef::Bond(property) => {
                let n = self.scene.bond_count();
                let mut bonds = Selection::bonds(n);
                for i in 0..n {
                    if matches(&self.scene.bond_property(i, property), comparison.op, &operand) {
                        bonds.insert(i);
                    }
                }
                bonds
            }
        })
    }

    /// Resolve a set name
    ///
    /// Built-in names first, then `define`d sets, then selection-valued
    /// variables, then the scene's predefined sets (cached unless dynamic),
    /// finally a retry with the singular form of a plural name.
    pub(crate) fn named_selection(&mut self, name: &str) -> ScriptResult<Selection> {
        if let Some(found) = self.find_named(name)? {
            return Ok(found);
        }
        for singular in singular_forms(name) {
            if let Some(found) = self.find_named(&singular)? {
                return Ok(found);
            }
        }
        Err(ScriptError::new(ErrorKind::ExpressionExpected, &[name]))
    }

    fn find_named(&mut self, name: &str) -> ScriptResult<Option<Selection>> {
        let n = self.scene.atom_count();
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "all" => return Ok(Some(Selection::all(n))),
            "none" => return Ok(Some(Selection::new(n))),
            "selected" => return Ok(Some(self.scene.selected_atoms().resized(n))),
            _ => {}
        }

        if let Some(set) = self.engine.definitions.get(name) {
            let definition = set.definition.clone();
            return match definition {
                Definition::Static(sel) => Ok(Some(self.universe_sized(&sel))),
                Definition::Dynamic(tokens) => {
                    if self.resolving.contains(&lower) {
                        return Err(ScriptError::new(ErrorKind::ExpressionExpected, &[name]));
                    }
                    self.resolving.push(lower);
                    let result = self.selection_expression(&tokens);
                    self.resolving.pop();
                    result.map(Some)
                }
            };
        }

        if let Some(Value::Selection(sel)) = self.lookup(name) {
            return Ok(Some(self.universe_sized(&sel)));
        }

        if let Some(cached) = self.set_cache.get(&lower) {
            return Ok(Some(cached.clone()));
        }
        match self.scene.named_set(name) {
            Some(set) => {
                let selection = self.universe_sized(&set.selection);
                if !set.dynamic {
                    self.set_cache.insert(lower, selection.clone());
                }
                Ok(Some(selection))
            }
            None => Ok(None),
        }
    }

    /// `within(distance | keyword, target)`; atom mode reads the target as
    /// an atom expression, math mode as a value
    pub(crate) fn within(
        &mut self,
        tokens: &[Token],
        args: &[(usize, usize)],
        atom_mode: bool,
    ) -> ScriptResult<Selection> {
        let [(first_start, first_end), (start, end)] = args else {
            return Err(ScriptError::bad_argument_count());
        };
        let n = self.scene.atom_count();
        let first = &tokens[*first_start..*first_end];

        let target = match &tokens[*start..*end] {
            [Token::Point3(p)] => Value::Point3(*p),
            [Token::Plane4(p)] => Value::Plane4(*p),
            inner if atom_mode => Value::Selection(
                self.selection_expression(inner)
                    .map_err(|e| e.offset_token(*start))?,
            ),
            _ => self.eval_range(tokens, *start, *end)?,
        };

        if let [Token::Identifier(word)] = first {
            let properties = grouping(word)
                .ok_or_else(|| ScriptError::new(ErrorKind::KeywordExpected, &[word]))?;
            let Value::Selection(seed) = target else {
                return Err(ScriptError::of(ErrorKind::ExpressionExpected));
            };
            let key = |i: usize| -> Vec<String> {
                properties
                    .iter()
                    .map(|p| self.scene.atom_property(i, *p).to_string())
                    .collect()
            };
            let keys: Vec<Vec<String>> = seed.indices().map(&key).collect();
            let hits = (0..n).filter(|&i| keys.contains(&key(i)));
            return Ok(Selection::from_indices(n, hits));
        }

        let distance = self
            .eval_range(tokens, *first_start, *first_end)?
            .as_f64()
            .ok_or_else(|| ScriptError::of(ErrorKind::NumberExpected).at_token(*first_start))?;
        let proximity = match target {
            Value::Point3(p) => Proximity::Points(vec![p]),
            Value::Plane4(p) => Proximity::Plane(p),
            Value::Selection(sel) => Proximity::Points(
                self.restrict(sel)
                    .indices()
                    .filter_map(|i| self.scene.atom_position(i))
                    .collect(),
            ),
            other => {
                return Err(ScriptError::new(
                    ErrorKind::CoordinateOrNameOrExpressionRequired,
                    &[&other.to_string()],
                ))
            }
        };

        let near = |p: Vec3| match &proximity {
            Proximity::Points(points) => points.iter().any(|q| {
                let (dx, dy, dz) = (p.x - q.x, p.y - q.y, p.z - q.z);
                (dx * dx + dy * dy + dz * dz).sqrt() <= distance
            }),
            Proximity::Plane(plane) => plane_distance(plane, p).abs() <= distance,
        };
        let hits = (0..n).filter(|&i| self.scene.atom_position(i).is_some_and(&near));
        Ok(Selection::from_indices(n, hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Compiler, ScriptCompiler};
    use crate::engine::ScriptEngine;
    use molscript_scene::{MemoryScene, NamedSet, Scene};
    use molscript_select::parse_escaped;

    fn select_in(scene: &mut MemoryScene, engine: &mut ScriptEngine, expr: &str) -> ScriptResult<Selection> {
        let tokens = ScriptCompiler::new()
            .compile_expression(&format!("{{{}}}", expr))
            .unwrap();
        let mut exec = Executor::new(engine, scene);
        match exec.evaluate(&tokens)? {
            Value::Selection(sel) => Ok(sel),
            other => panic!("not a selection: {:?}", other),
        }
    }

    fn select(expr: &str) -> ScriptResult<Selection> {
        select_in(&mut MemoryScene::with_atoms(6), &mut ScriptEngine::new(), expr)
    }

    fn indices(sel: &Selection) -> Vec<usize> {
        sel.indices().collect()
    }

    #[test]
    fn test_comparisons_and_combinators() {
        assert_eq!(indices(&select("atomno=1 or atomno=3").unwrap()), vec![0, 2]);
        assert_eq!(indices(&select("atomno>2 and atomno<5").unwrap()), vec![2, 3]);
        assert_eq!(indices(&select("not atomno<5").unwrap()), vec![4, 5]);
        assert_eq!(indices(&select("atomno<3 xor atomno=2").unwrap()), vec![0]);
    }

    #[test]
    fn test_not_binds_tighter_than_and() {
        let a = select("not atomno=1 and atomno<3").unwrap();
        assert_eq!(indices(&a), vec![1]);
        let b = select("not (atomno=1 and atomno<3)").unwrap();
        assert_eq!(indices(&b), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_de_morgan() {
        let lhs = select("not (atomno<3 or temperature>30)").unwrap();
        let rhs = select("not atomno<3 and not temperature>30").unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_undefined_properties_never_match() {
        let mut scene = MemoryScene::with_atoms(3);
        let mut engine = ScriptEngine::new();
        // partial charges are not set on the generated atoms
        let sel = select_in(&mut scene, &mut engine, "partialcharge != 0").unwrap();
        assert!(sel.is_empty());
    }

    #[test]
    fn test_named_sets_and_plurals() {
        let mut scene = MemoryScene::with_atoms(4);
        scene.define_named_set("water", NamedSet::fixed(Selection::from_indices(4, [3])));
        let mut engine = ScriptEngine::new();
        assert_eq!(indices(&select_in(&mut scene, &mut engine, "water").unwrap()), vec![3]);
        assert_eq!(indices(&select_in(&mut scene, &mut engine, "waters").unwrap()), vec![3]);
        let err = select_in(&mut scene, &mut engine, "nosuchset").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExpressionExpected);
    }

    #[test]
    fn test_deleted_atoms_are_excluded() {
        let mut scene = MemoryScene::with_atoms(4);
        scene.delete_atoms(&Selection::from_indices(4, [1]));
        let mut engine = ScriptEngine::new();
        let all = select_in(&mut scene, &mut engine, "*").unwrap();
        assert_eq!(indices(&all), vec![0, 2, 3]);
    }

    #[test]
    fn test_within_distance_and_group() {
        // neighbours are 1.5 apart along x
        assert_eq!(indices(&select("within(1.6, atomno=3)").unwrap()), vec![1, 2, 3]);
        assert_eq!(indices(&select("within(0.1, {3.0 0 0})").unwrap()), vec![2]);
        assert_eq!(indices(&select("within(model, atomno=1)").unwrap()).len(), 6);
    }

    #[test]
    fn test_bitset_literal_round_trip() {
        let sel = select("atomno=2 or atomno>4").unwrap();
        let text = sel.to_string();
        assert_eq!(parse_escaped(&text).unwrap(), sel);
        assert_eq!(select(&text).unwrap(), sel);
    }

    #[test]
    fn test_empty_expression_selects_nothing() {
        let mut scene = MemoryScene::with_atoms(3);
        let mut engine = ScriptEngine::new();
        let mut exec = Executor::new(&mut engine, &mut scene);
        assert!(exec.evaluate_selection(&[]).unwrap().is_empty());
    }
}
