//! Execution contexts
//!
//! Each running script, nested `script` call and user function call owns one
//! [`ExecutionContext`]. The [`ContextStack`] bounds the nesting depth and
//! fails with `tooManyScriptLevels` instead of growing without limit.

use std::sync::Arc;

use crate::config::ExecutionFlags;
use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::functions::ScriptFunction;
use crate::program::Program;
use crate::variables::Scope;

/// State of one script or function invocation
#[derive(Debug)]
pub struct ExecutionContext {
    program: Arc<Program>,
    /// Index of the statement being executed
    pub(crate) pc: usize,
    /// Local variables; `None` for script contexts, which share the globals
    pub(crate) scope: Option<Scope>,
    pub(crate) flags: ExecutionFlags,
    /// Function being run, if any
    pub(crate) function: Option<Arc<ScriptFunction>>,
    /// Function header seen but not yet closed by `end function`
    pub(crate) pending_function: Option<Arc<ScriptFunction>>,
    /// `for` header to re-enter with its step clause
    pub(crate) loop_reentry: Option<usize>,
}

impl ExecutionContext {
    /// Context for a script; variables go to the global table
    pub fn script(program: Arc<Program>, flags: ExecutionFlags) -> Self {
        Self {
            program,
            pc: 0,
            scope: None,
            flags,
            function: None,
            pending_function: None,
            loop_reentry: None,
        }
    }

    /// Context for a function call with its parameters already bound
    pub fn function(function: Arc<ScriptFunction>, locals: Scope, flags: ExecutionFlags) -> Self {
        Self {
            program: Arc::clone(function.body()),
            pc: 0,
            scope: Some(locals),
            flags,
            function: Some(function),
            pending_function: None,
            loop_reentry: None,
        }
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn flags(&self) -> ExecutionFlags {
        self.flags
    }

    /// Script or function name
    pub fn name(&self) -> &str {
        self.program.name()
    }

    /// Call site description used in error traces
    pub fn call_site(&self) -> String {
        format!(
            "line {} command {} of {}",
            self.program.line(self.pc),
            self.pc + 1,
            self.name()
        )
    }
}

/// Bounded stack of execution contexts; the last entry is the running one
#[derive(Debug)]
pub struct ContextStack {
    frames: Vec<ExecutionContext>,
    max_depth: usize,
}

impl ContextStack {
    /// Create a stack allowing `max_depth` levels nested under the top script
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
        }
    }

    /// Nesting level of the running context (0 for the top script)
    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Enter a new context
    pub fn push(&mut self, context: ExecutionContext) -> ScriptResult {
        if !self.frames.is_empty() && self.depth() >= self.max_depth {
            log::warn!(
                "refusing to enter {}: nesting limit {} reached",
                context.name(),
                self.max_depth
            );
            return Err(ScriptError::of(ErrorKind::TooManyScriptLevels));
        }
        self.frames.push(context);
        Ok(())
    }

    /// Leave the running context
    pub fn pop(&mut self) -> Option<ExecutionContext> {
        self.frames.pop()
    }

    pub fn current(&self) -> Option<&ExecutionContext> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.frames.last_mut()
    }

    /// Contexts from the running one outward
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionContext> {
        self.frames.iter().rev()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ExecutionContext> {
        self.frames.iter_mut().rev()
    }

    /// Local scopes from the running context outward
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.iter().filter_map(|c| c.scope.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext::script(Arc::new(Program::new("t", "")), ExecutionFlags::default())
    }

    #[test]
    fn test_depth_limit() {
        let mut stack = ContextStack::new(2);
        stack.push(ctx()).unwrap();
        stack.push(ctx()).unwrap();
        stack.push(ctx()).unwrap();
        assert_eq!(stack.depth(), 2);

        let err = stack.push(ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TooManyScriptLevels);
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn test_scopes_innermost_first() {
        let mut stack = ContextStack::new(5);
        stack.push(ctx()).unwrap();
        let mut outer = Scope::new();
        outer.set("a", crate::value::Value::Integer(1));
        let mut inner = Scope::new();
        inner.set("a", crate::value::Value::Integer(2));

        let func = Arc::new(ScriptFunction::new("f", vec![], Program::new("f", "")));
        stack
            .push(ExecutionContext::function(Arc::clone(&func), outer, ExecutionFlags::default()))
            .unwrap();
        stack
            .push(ExecutionContext::function(func, inner, ExecutionFlags::default()))
            .unwrap();

        let first = stack.scopes().next().and_then(|s| s.get("a").cloned());
        assert_eq!(first, Some(crate::value::Value::Integer(2)));
        assert_eq!(stack.scopes().count(), 2);
    }
}
