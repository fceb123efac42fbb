//! Math expression evaluator
//!
//! A dual-stack (operand/operator) evaluator over a flat run of tokens.
//! Literals and resolved names go to the operand stack; an incoming binary
//! operator first reduces every stacked operator of higher or equal
//! precedence (strictly higher for right-associative `**`). Postfix member
//! access and indexing bind tighter than any operator and are applied to
//! the top operand as soon as they are read.

mod functions;
mod operators;
mod properties;

use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::exec::Executor;
use crate::token::{Operator, Token};
use crate::value::Value;

pub(crate) use functions::plane_distance;

/// Precedence of unary minus, between `*` and `**`
const NEGATE_PRECEDENCE: u8 = 7;

#[derive(Debug, Clone, Copy)]
enum Pending {
    Binary(Operator),
    Negate,
    Not,
    Paren,
}

impl Pending {
    fn precedence(self) -> u8 {
        match self {
            Pending::Binary(op) => op.precedence(),
            Pending::Negate => NEGATE_PRECEDENCE,
            Pending::Not => Operator::Not.precedence(),
            Pending::Paren => 0,
        }
    }
}

#[derive(Debug, Default)]
struct Stacks {
    operands: Vec<Value>,
    operators: Vec<Pending>,
    parens: usize,
}

impl Stacks {
    fn pop_operand(&mut self) -> ScriptResult<Value> {
        self.operands
            .pop()
            .ok_or_else(|| ScriptError::of(ErrorKind::UnexpectedEndOfExpression))
    }

    /// Apply the operator on top of the stack
    fn apply_top(&mut self) -> ScriptResult {
        let Some(pending) = self.operators.pop() else {
            return Ok(());
        };
        let value = match pending {
            Pending::Binary(op) => {
                let rhs = self.pop_operand()?;
                let lhs = self.pop_operand()?;
                operators::binary(op, lhs, rhs)?
            }
            Pending::Negate => operators::negate(self.pop_operand()?)?,
            Pending::Not => operators::not(self.pop_operand()?),
            Pending::Paren => return Ok(()),
        };
        self.operands.push(value);
        Ok(())
    }

    /// Reduce before pushing `op`
    fn reduce_for(&mut self, op: Operator) -> ScriptResult {
        let precedence = op.precedence();
        while let Some(top) = self.operators.last().copied() {
            if matches!(top, Pending::Paren) {
                break;
            }
            let reduce = if op.is_right_associative() {
                top.precedence() > precedence
            } else {
                top.precedence() >= precedence
            };
            if !reduce {
                break;
            }
            self.apply_top()?;
        }
        Ok(())
    }

    /// Reduce down to the innermost open parenthesis and drop it
    fn close_paren(&mut self) -> ScriptResult {
        while let Some(top) = self.operators.last().copied() {
            if matches!(top, Pending::Paren) {
                self.operators.pop();
                self.parens -= 1;
                return Ok(());
            }
            self.apply_top()?;
        }
        Err(ScriptError::of(ErrorKind::UnrecognizedExpression))
    }

    fn finish(mut self) -> ScriptResult<Value> {
        if self.parens > 0 {
            return Err(ScriptError::of(ErrorKind::UnexpectedEndOfExpression));
        }
        while !self.operators.is_empty() {
            self.apply_top()?;
        }
        match self.operands.len() {
            1 => self.pop_operand(),
            0 => Err(ScriptError::of(ErrorKind::UnexpectedEndOfExpression)),
            _ => Err(ScriptError::of(ErrorKind::UnrecognizedExpression)),
        }
    }
}

/// Index of the token closing the bracket opened at `open`
pub(crate) fn matching_close(tokens: &[Token], open: usize) -> ScriptResult<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LeftParen | Token::LeftBracket | Token::ExpressionBegin => depth += 1,
            Token::RightParen | Token::RightBracket | Token::ExpressionEnd => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(ScriptError::of(ErrorKind::UnexpectedEndOfExpression).at_token(open))
}

/// Split `tokens[start..end]` at top-level separators into index ranges
pub(crate) fn split_args(
    tokens: &[Token],
    start: usize,
    end: usize,
    separator: &Token,
) -> Vec<(usize, usize)> {
    if start >= end {
        return Vec::new();
    }
    let mut ranges = Vec::new();
    let mut depth = 0usize;
    let mut from = start;
    for (i, token) in tokens.iter().enumerate().take(end).skip(start) {
        match token {
            Token::LeftParen | Token::LeftBracket | Token::ExpressionBegin => depth += 1,
            Token::RightParen | Token::RightBracket | Token::ExpressionEnd => {
                depth = depth.saturating_sub(1)
            }
            t if depth == 0 && t == separator => {
                ranges.push((from, i));
                from = i + 1;
            }
            _ => {}
        }
    }
    ranges.push((from, end));
    ranges
}

/// Argument ranges of the call whose name is at `name`; returns the closing index
pub(crate) fn call_arguments(
    tokens: &[Token],
    name: usize,
    separator: &Token,
) -> ScriptResult<(Vec<(usize, usize)>, usize)> {
    let open = name + 1;
    if tokens.get(open) != Some(&Token::LeftParen) {
        return Err(ScriptError::of(ErrorKind::InvalidParameterOrder).at_token(name));
    }
    let close = matching_close(tokens, open)?;
    Ok((split_args(tokens, open + 1, close, separator), close))
}

impl Executor<'_> {
    /// Evaluate `tokens[start..end]`, keeping token positions statement-relative
    pub(crate) fn eval_range(
        &mut self,
        tokens: &[Token],
        start: usize,
        end: usize,
    ) -> ScriptResult<Value> {
        self.evaluate(&tokens[start..end])
            .map_err(|err| err.offset_token(start))
    }

    /// Evaluate a math expression to exactly one value
    pub(crate) fn evaluate(&mut self, tokens: &[Token]) -> ScriptResult<Value> {
        let mut stacks = Stacks::default();
        let mut expect_operand = true;
        let mut i = 0;

        while i < tokens.len() {
            let operand = match &tokens[i] {
                Token::Op(op) if expect_operand => {
                    match op {
                        Operator::Minus => stacks.operators.push(Pending::Negate),
                        Operator::Not => stacks.operators.push(Pending::Not),
                        Operator::Plus => {}
                        _ => {
                            return Err(
                                ScriptError::of(ErrorKind::UnexpectedEndOfExpression).at_token(i)
                            )
                        }
                    }
                    None
                }
                Token::Op(op) => {
                    stacks.reduce_for(*op).map_err(|e| e.at_token(i))?;
                    stacks.operators.push(Pending::Binary(*op));
                    expect_operand = true;
                    None
                }
                Token::LeftParen => {
                    if !expect_operand {
                        return Err(ScriptError::of(ErrorKind::UnrecognizedExpression).at_token(i));
                    }
                    stacks.operators.push(Pending::Paren);
                    stacks.parens += 1;
                    None
                }
                Token::RightParen => {
                    if stacks.parens == 0 || expect_operand {
                        return Err(
                            ScriptError::of(ErrorKind::UnexpectedEndOfExpression).at_token(i)
                        );
                    }
                    stacks.close_paren().map_err(|e| e.at_token(i))?;
                    None
                }
                Token::LeftBracket => {
                    let close = matching_close(tokens, i)?;
                    if expect_operand {
                        let value = self.array_literal(tokens, i + 1, close)?;
                        i = close;
                        Some(value)
                    } else {
                        let index = self.eval_range(tokens, i + 1, close)?;
                        let target = stacks.pop_operand()?;
                        let value = properties::index_value(target, &index)
                            .map_err(|e| e.at_token(i))?;
                        stacks.operands.push(value);
                        i = close + 1;
                        continue;
                    }
                }
                Token::Member(name) => {
                    if expect_operand {
                        return Err(ScriptError::of(ErrorKind::PropertyNameExpected).at_token(i));
                    }
                    let target = stacks.pop_operand()?;
                    let (value, used) = self
                        .member(target, name, tokens.get(i + 1))
                        .map_err(|e| e.at_token(i))?;
                    stacks.operands.push(value);
                    i += 1 + used;
                    continue;
                }
                Token::ExpressionBegin => {
                    let close = matching_close(tokens, i)?;
                    let selection = self
                        .evaluate_selection(&tokens[i + 1..close])
                        .map_err(|e| e.offset_token(i + 1))?;
                    i = close;
                    Some(Value::Selection(selection))
                }
                Token::Function(kind) => {
                    let separator = if kind.iterates() {
                        Token::Semicolon
                    } else {
                        Token::Comma
                    };
                    let (args, close) = call_arguments(tokens, i, &separator)?;
                    let value = self
                        .call_builtin(*kind, tokens, &args)
                        .map_err(|e| e.at_token(i))?;
                    i = close;
                    Some(value)
                }
                Token::Call(name) => {
                    let (args, close) = call_arguments(tokens, i, &Token::Comma)?;
                    let mut values = Vec::with_capacity(args.len());
                    for (start, end) in args {
                        values.push(self.eval_range(tokens, start, end)?);
                    }
                    let value = self.call_function(name, values).map_err(|e| e.at_token(i))?;
                    i = close;
                    Some(value)
                }
                Token::Comparison(_) => {
                    let selection = self.evaluate_selection(&tokens[i..=i])?;
                    Some(Value::Selection(selection))
                }
                Token::Boolean(b) => Some(Value::Boolean(*b)),
                Token::Integer(n) => Some(Value::Integer(*n)),
                Token::Decimal(f) => Some(Value::Float(*f)),
                Token::Str(s) => Some(Value::String(s.clone())),
                Token::Point3(p) => Some(Value::Point3(*p)),
                Token::Plane4(p) => Some(Value::Plane4(*p)),
                Token::Bitset(sel) => Some(Value::Selection(self.universe_sized(sel))),
                Token::Identifier(name) => Some(self.resolve_identifier(name)),
                Token::VarRef(name) => Some(self.lookup(name).unwrap_or_default()),
                Token::Substitution(text) => {
                    Some(self.evaluate_text(text).map_err(|e| e.at_token(i))?)
                }
                _ => {
                    return Err(ScriptError::of(ErrorKind::UnrecognizedExpression).at_token(i));
                }
            };

            if let Some(value) = operand {
                if !expect_operand {
                    return Err(ScriptError::of(ErrorKind::UnrecognizedExpression).at_token(i));
                }
                stacks.operands.push(value);
                expect_operand = false;
            }
            i += 1;
        }

        if expect_operand && !stacks.operators.is_empty() {
            return Err(ScriptError::of(ErrorKind::UnexpectedEndOfExpression));
        }
        stacks.finish()
    }

    /// `[a, b, c]` in operand position
    fn array_literal(&mut self, tokens: &[Token], start: usize, end: usize) -> ScriptResult<Value> {
        let mut items = Vec::new();
        for (from, to) in split_args(tokens, start, end, &Token::Comma) {
            match self.eval_range(tokens, from, to)? {
                Value::List(inner) => items.extend(inner),
                value => items.push(value.to_string()),
            }
        }
        Ok(Value::List(items))
    }

    /// Value of a bare name in a math expression
    ///
    /// Variables first (including iteration bindings and system
    /// parameters), then user functions; anything else is the empty string.
    fn resolve_identifier(&mut self, name: &str) -> Value {
        if let Some(value) = self.lookup(name) {
            return value;
        }
        if self.engine.functions.contains(name) {
            return Value::FunctionRef(name.to_string());
        }
        Value::default()
    }

    /// Compile and evaluate expression text (`@{...}`, `eval()`)
    pub(crate) fn evaluate_text(&mut self, text: &str) -> ScriptResult<Value> {
        let tokens = self.engine.compiler.compile_expression(text)?;
        self.evaluate(&tokens)
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
        let mut scene = MemoryScene::with_atoms(5);
        let tokens = ScriptCompiler::new().compile_expression(source).unwrap();
        let mut exec = Executor::new(&mut engine, &mut scene);
        exec.evaluate(&tokens)
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Integer(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), Value::Integer(9));
        assert_eq!(eval("2 ** 3 ** 2").unwrap(), Value::Integer(512));
        assert_eq!(eval("10 - 4 - 3").unwrap(), Value::Integer(3));
        assert_eq!(eval("-2 ** 2").unwrap(), Value::Integer(-4));
    }

    #[test]
    fn test_division_kinds() {
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("7 \\ 2").unwrap(), Value::Integer(3));
        assert_eq!(eval("7 % 4").unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_logic_and_comparison() {
        assert_eq!(eval("1 < 2 and not (3 == 4)").unwrap(), Value::Boolean(true));
        assert_eq!(eval("\"abc\" == \"ABC\"").unwrap(), Value::Boolean(true));
        assert_eq!(eval("1 == 1.0").unwrap(), Value::Boolean(true));
        assert_eq!(eval("true xor true").unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval("\"n=\" + 3").unwrap(), Value::String("n=3".into()));
    }

    #[test]
    fn test_arrays_and_indexing() {
        assert_eq!(eval("[1, 2, 3][2]").unwrap(), Value::String("2".into()));
        assert_eq!(eval("[1, 2, 3][0]").unwrap(), Value::String("3".into()));
        assert_eq!(eval("[1, 2, 3][-1]").unwrap(), Value::String("2".into()));
        assert_eq!(eval("[1, 2, 3].size").unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_incomplete_expressions() {
        assert_eq!(
            eval("1 +").unwrap_err().kind(),
            ErrorKind::UnexpectedEndOfExpression
        );
        assert_eq!(
            eval("(1 + 2").unwrap_err().kind(),
            ErrorKind::UnexpectedEndOfExpression
        );
        assert_eq!(eval("1 2").unwrap_err().kind(), ErrorKind::UnrecognizedExpression);
    }

    #[test]
    fn test_point_members() {
        assert_eq!(eval("{1 2 3}.y").unwrap(), Value::Float(2.0));
        assert_eq!(eval("{1 2 3}[3]").unwrap(), Value::Float(3.0));
    }
}
