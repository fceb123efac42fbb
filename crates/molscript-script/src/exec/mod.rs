//! Statement dispatch
//!
//! The [`Executor`] owns the context stack for one engine run. It walks the
//! statements of the innermost context, checks the pause controller between
//! statements and hands each statement to its command. Commands answer with
//! a [`Step`]; `return`, `exit` and interrupts travel as [`ControlSignal`]s
//! so errors never carry control flow.

pub(crate) mod commands;

use std::sync::Arc;

use ahash::AHashMap;
use molscript_scene::{Scene, SceneResult};
use molscript_select::{lookup_atom_property, Selection};

use crate::config::{ExecutionFlags, ScriptOption};
use crate::context::{ContextStack, ExecutionContext};
use crate::controller::Action;
use crate::engine::ScriptEngine;
use crate::error::{ControlSignal, ErrorKind, ErrorPosition, ScriptError, ScriptResult};
use crate::output::OutputMessage;
use crate::program::Program;
use crate::token::{render_statement, CommandKind, Token};
use crate::value::Value;
use crate::variables::{is_global_name, Scope};

/// How far past its end a list may be extended by one element assignment
const MAX_LIST_GROWTH: usize = 1024;

/// Index of the `}` closing a brace whose body starts `body`
fn closing_brace(body: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Where the dispatch loop continues after a statement
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Next,
    Jump(usize),
    Signal(ControlSignal),
}

/// Interpreter state for one run against one scene
pub(crate) struct Executor<'a> {
    pub(crate) engine: &'a mut ScriptEngine,
    pub(crate) scene: &'a mut dyn Scene,
    pub(crate) stack: ContextStack,
    /// Dummy-variable bindings of `for(...)` / `select(...)`, innermost last
    pub(crate) iterations: Vec<Scope>,
    /// Scene-defined sets resolved since the last scene change
    pub(crate) set_cache: AHashMap<String, Selection>,
    /// Dynamic definitions being expanded, to catch self-reference
    pub(crate) resolving: Vec<String>,
    /// Output buffers of `script(...)` calls
    captures: Vec<Vec<String>>,
    /// Signal raised inside an expression, delivered after the statement
    pending: Option<ControlSignal>,
    /// Nesting of scripts run from the pause checkpoint
    servicing: usize,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(engine: &'a mut ScriptEngine, scene: &'a mut dyn Scene) -> Self {
        let stack = ContextStack::new(engine.config.max_context_depth);
        Self {
            engine,
            scene,
            stack,
            iterations: Vec::new(),
            set_cache: AHashMap::new(),
            resolving: Vec::new(),
            captures: Vec::new(),
            pending: None,
            servicing: 0,
        }
    }

    pub(crate) fn flags(&self) -> ExecutionFlags {
        self.stack
            .current()
            .map(ExecutionContext::flags)
            .unwrap_or_default()
    }

    /// Syntax-check runs evaluate everything but touch nothing
    pub(crate) fn is_checking(&self) -> bool {
        self.flags().syntax_check
    }

    // =========================================================================
    // Dispatch loop
    // =========================================================================

    /// Push a context, run it to completion and pop it
    pub(crate) fn run_nested(
        &mut self,
        context: ExecutionContext,
    ) -> ScriptResult<Option<ControlSignal>> {
        let caller = self.stack.current().map(ExecutionContext::call_site);
        self.stack.push(context)?;
        let result = self.run_current();
        self.stack.pop();
        result.map_err(|mut err| {
            if let Some(site) = caller {
                err.push_frame(site);
            }
            err
        })
    }

    /// Compile `source` and run it as a nested script with the current flags
    pub(crate) fn run_source(
        &mut self,
        name: &str,
        source: &str,
    ) -> ScriptResult<Option<ControlSignal>> {
        let program = self.engine.compiler.compile(name, source)?;
        let flags = self.flags();
        self.run_nested(ExecutionContext::script(Arc::new(program), flags))
    }

    /// Run script text and return what it printed
    pub(crate) fn run_captured(&mut self, source: &str) -> ScriptResult<String> {
        self.captures.push(Vec::new());
        let result = self.run_source("script()", source);
        let lines = self.captures.pop().unwrap_or_default();
        if let Some(signal @ (ControlSignal::Exit | ControlSignal::Interrupt)) = result? {
            return Err(self.park(signal));
        }
        Ok(lines.join("\n"))
    }

    fn run_current(&mut self) -> ScriptResult<Option<ControlSignal>> {
        loop {
            let (program, pc) = match self.stack.current() {
                Some(context) => (Arc::clone(context.program()), context.pc),
                None => return Ok(None),
            };
            if pc >= program.len() {
                return Ok(None);
            }
            if let Some(signal) = self.checkpoint()? {
                return Ok(Some(signal));
            }

            let step = match self.execute(&program, pc) {
                Ok(step) => step,
                Err(err) => {
                    return match self.pending.take() {
                        Some(signal) => Ok(Some(signal)),
                        None => Err(err),
                    }
                }
            };
            if let Some(signal) = self.pending.take() {
                return Ok(Some(signal));
            }
            match step {
                Step::Next => self.set_pc(pc + 1),
                Step::Jump(target) => self.set_pc(target),
                Step::Signal(signal) => return Ok(Some(signal)),
            }
        }
    }

    /// Hold a signal raised inside an expression and abandon the statement
    ///
    /// The returned error unwinds the evaluation; [`Executor::run_current`]
    /// swaps it back for the parked signal.
    pub(crate) fn park(&mut self, signal: ControlSignal) -> ScriptError {
        self.pending = Some(signal);
        ScriptError::of(ErrorKind::Interrupted)
    }

    fn set_pc(&mut self, pc: usize) {
        if let Some(context) = self.stack.current_mut() {
            context.pc = pc;
        }
    }

    /// Pause/interrupt check between statements
    ///
    /// While paused, scripts queued on the controller run here, each in its
    /// own nested context. Those scripts run to completion without pausing.
    fn checkpoint(&mut self) -> ScriptResult<Option<ControlSignal>> {
        let controller = Arc::clone(&self.engine.controller);
        if self.servicing > 0 {
            return Ok(controller.is_interrupted().then_some(ControlSignal::Interrupt));
        }
        let poll = self.engine.config.pause_poll_interval();
        loop {
            match controller.next_action(poll) {
                Action::Proceed => return Ok(None),
                Action::Interrupt => return Ok(Some(ControlSignal::Interrupt)),
                Action::RunScript(source) => {
                    self.servicing += 1;
                    let result = self.run_source("interrupt", &source);
                    self.servicing -= 1;
                    match result {
                        Ok(Some(ControlSignal::Exit)) => return Ok(Some(ControlSignal::Exit)),
                        Ok(_) => {}
                        Err(err) => {
                            let err = err.translated(self.engine.translator.as_ref());
                            self.engine.output.emit(OutputMessage::error(err.report()));
                        }
                    }
                }
            }
        }
    }

    fn execute(&mut self, program: &Program, pc: usize) -> ScriptResult<Step> {
        let Some(compiled) = program.statement(pc) else {
            return Ok(Step::Next);
        };
        let substituted = self.substitute(compiled).map_err(|err| {
            err.locate(ErrorPosition {
                script: program.name().to_string(),
                line: program.line(pc),
                command: pc + 1,
                statement: render_statement(compiled, Some(1)),
            })
        })?;
        let tokens = substituted.as_deref().unwrap_or(compiled);
        if self.engine.options.debug_script {
            log::debug!(
                "{} [{}] {}",
                program.name(),
                pc + 1,
                render_statement(tokens, None)
            );
        }
        if self.engine.options.echo {
            self.status(program.statement_text(pc));
        }

        let command = tokens.first().and_then(Token::command);
        self.record_history(program, pc, command);

        let result = match command {
            Some(kind) => match commands::registry().get(kind) {
                Some(handler) => handler.execute(self, tokens),
                None => Err(ScriptError::new(ErrorKind::UnrecognizedCommand, &[kind.name()])
                    .at_token(0)),
            },
            None => self.implicit_statement(tokens),
        };
        result.map_err(|err| {
            let statement = render_statement(tokens, err.token());
            err.locate(ErrorPosition {
                script: program.name().to_string(),
                line: program.line(pc),
                command: pc + 1,
                statement,
            })
        })
    }

    /// Expand `@name` and `@{expr}` in the raw text argument of `echo`,
    /// `message`, `goto`, `label` and `pause`
    ///
    /// Substitutions inside expressions are evaluated where they stand.
    fn substitute(&mut self, tokens: &[Token]) -> ScriptResult<Option<Vec<Token>>> {
        let raw = matches!(
            tokens.first().and_then(Token::command),
            Some(
                CommandKind::Echo
                    | CommandKind::Message
                    | CommandKind::Goto
                    | CommandKind::Label
                    | CommandKind::Pause
            )
        );
        match tokens.get(1) {
            Some(Token::Str(text)) if raw && text.contains('@') => {
                let expanded = self.substitute_text(text).map_err(|e| e.at_token(1))?;
                let mut patched = tokens.to_vec();
                patched[1] = Token::Str(expanded);
                Ok(Some(patched))
            }
            _ => Ok(None),
        }
    }

    /// Replace `@{expr}` with its value and `@name` with the variable's
    /// value; an unbound `@name` is left as written
    pub(crate) fn substitute_text(&mut self, text: &str) -> ScriptResult<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(at) = rest.find('@') {
            out.push_str(&rest[..at]);
            let after = &rest[at + 1..];
            if let Some(body) = after.strip_prefix('{') {
                let close = closing_brace(body).ok_or_else(|| {
                    ScriptError::new(ErrorKind::InvalidArgument, &[&rest[at..]])
                })?;
                let value = self.evaluate_text(&body[..close])?;
                out.push_str(&value.to_string());
                rest = &body[close + 1..];
                continue;
            }
            let len = after
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            match self.lookup(&after[..len]) {
                Some(value) if len > 0 => out.push_str(&value.to_string()),
                _ => {
                    out.push('@');
                    out.push_str(&after[..len]);
                }
            }
            rest = &after[len..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn record_history(&mut self, program: &Program, pc: usize, command: Option<CommandKind>) {
        if !self.engine.config.record_history || self.is_checking() {
            return;
        }
        if command.is_some_and(|kind| kind.is_flow_control() || kind == CommandKind::History) {
            return;
        }
        if self.stack.depth() > self.engine.options.history_level {
            return;
        }
        self.engine.history.push(program.statement_text(pc));
    }

    /// A statement without a command word: a bare function call
    fn implicit_statement(&mut self, tokens: &[Token]) -> ScriptResult<Step> {
        match tokens {
            [] => {}
            [Token::Identifier(name)] if self.engine.functions.contains(name) => {
                self.call_function(name, Vec::new())?;
            }
            [Token::Call(_), ..] => {
                self.evaluate(tokens)?;
            }
            [first, ..] => {
                return Err(
                    ScriptError::new(ErrorKind::UnrecognizedCommand, &[&first.to_string()])
                        .at_token(0),
                )
            }
        }
        Ok(Step::Next)
    }

    // =========================================================================
    // Variables
    // =========================================================================

    /// Resolve a name: iteration bindings, context locals, globals,
    /// interpreter options, then scene parameters
    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        for scope in self.iterations.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Some(value.clone());
            }
        }
        if !is_global_name(name) {
            for scope in self.stack.scopes() {
                if let Some(value) = scope.get(name) {
                    return Some(value.clone());
                }
            }
        }
        if let Some(value) = self.engine.globals.get(name) {
            return Some(value.clone());
        }
        if let Some(option) = ScriptOption::lookup(name) {
            return Some(option.get(&self.engine.options));
        }
        self.scene.parameter(name).and_then(Value::from_property)
    }

    /// Assign to the innermost existing binding
    ///
    /// A new name is created in the current function's scope, or globally
    /// at script level and for names with the global marker.
    pub(crate) fn assign(&mut self, name: &str, value: Value) {
        if is_global_name(name) || (self.engine.globals.contains(name) && !self.binds_locally(name)) {
            self.engine.globals.set(name, value);
            return;
        }
        for scope in self.iterations.iter_mut().rev() {
            if scope.contains(name) {
                scope.set(name, value);
                return;
            }
        }
        for context in self.stack.iter_mut() {
            if let Some(scope) = context.scope.as_mut() {
                if scope.contains(name) {
                    scope.set(name, value);
                    return;
                }
            }
        }
        self.declare(name, value);
    }

    fn binds_locally(&self, name: &str) -> bool {
        self.iterations.iter().any(|scope| scope.contains(name))
            || self.stack.scopes().any(|scope| scope.contains(name))
    }

    /// Remove the innermost binding of `name`; returns whether one existed
    pub(crate) fn unset(&mut self, name: &str) -> bool {
        if !is_global_name(name) {
            for scope in self.iterations.iter_mut().rev() {
                if scope.remove(name).is_some() {
                    return true;
                }
            }
            for context in self.stack.iter_mut() {
                if let Some(scope) = context.scope.as_mut() {
                    if scope.remove(name).is_some() {
                        return true;
                    }
                }
            }
        }
        self.engine.globals.remove(name).is_some()
    }

    /// `var name`: bind in the current function, or globally in a script
    pub(crate) fn declare(&mut self, name: &str, value: Value) {
        let local = if is_global_name(name) {
            None
        } else {
            self.stack
                .current_mut()
                .and_then(|context| context.scope.as_mut())
        };
        match local {
            Some(scope) => scope.set(name, value),
            None => self.engine.globals.set(name, value),
        }
    }

    /// Assign to `name`, `name[i]` or `{atoms}.property`
    pub(crate) fn assign_target(
        &mut self,
        tokens: &[Token],
        start: usize,
        end: usize,
        value: Value,
    ) -> ScriptResult {
        match &tokens[start..end] {
            [Token::Identifier(name)] => {
                self.assign(name, value);
                Ok(())
            }
            [Token::Identifier(name), Token::LeftBracket, .., Token::RightBracket] => {
                let index = self
                    .eval_range(tokens, start + 2, end - 1)?
                    .as_int()
                    .ok_or_else(|| ScriptError::of(ErrorKind::IntegerExpected).at_token(start + 2))?;
                let mut items = match self.lookup(name) {
                    Some(Value::List(items)) => items,
                    Some(Value::String(s)) if s.is_empty() => Vec::new(),
                    None => Vec::new(),
                    Some(other) => vec![other.to_string()],
                };
                let slot = if index >= 1 {
                    index as usize - 1
                } else {
                    let back = index.unsigned_abs() as usize;
                    items.len().checked_sub(back + 1).ok_or_else(|| {
                        let min = 1 - i32::try_from(items.len()).unwrap_or(i32::MAX);
                        ScriptError::integer_out_of_range(min, i32::MAX).at_token(start + 2)
                    })?
                };
                if slot >= items.len() {
                    let limit = items.len() + MAX_LIST_GROWTH;
                    if slot >= limit {
                        let max = i32::try_from(limit).unwrap_or(i32::MAX);
                        return Err(ScriptError::integer_out_of_range(1, max).at_token(start + 2));
                    }
                    items.resize(slot + 1, String::new());
                }
                items[slot] = value.to_string();
                self.assign(name, Value::List(items));
                Ok(())
            }
            [.., Token::Member(property)] => {
                let target = self.eval_range(tokens, start, end - 1)?;
                let Value::Selection(atoms) = target else {
                    return Err(ScriptError::of(ErrorKind::PropertyNameExpected).at_token(end - 1));
                };
                let atom_property = lookup_atom_property(property).ok_or_else(|| {
                    ScriptError::new(ErrorKind::UnrecognizedAtomProperty, &[property])
                        .at_token(end - 1)
                })?;
                if !atom_property.is_settable() {
                    return Err(ScriptError::new(ErrorKind::CannotSet, &[property]).at_token(end - 1));
                }
                let atoms = self.restrict(atoms);
                let new_value = value.to_property();
                self.try_effect(|scene| scene.set_atom_property(&atoms, atom_property, &new_value))?;
                Ok(())
            }
            _ => Err(ScriptError::new(ErrorKind::InvalidArgument, &["assignment target"])
                .at_token(start)),
        }
    }

    /// Run a `for` init/step clause: `[var] target = value` or an expression
    pub(crate) fn run_clause(&mut self, tokens: &[Token], start: usize, end: usize) -> ScriptResult {
        if start >= end {
            return Ok(());
        }
        let declare = tokens[start] == Token::Declare;
        let start = if declare { start + 1 } else { start };
        let assign_at = tokens[start..end]
            .iter()
            .position(|t| *t == Token::AssignOp)
            .map(|at| start + at);
        match assign_at {
            Some(at) => {
                let value = self.eval_range(tokens, at + 1, end)?;
                match &tokens[start..at] {
                    [Token::Identifier(name)] if declare => {
                        self.declare(name, value);
                        Ok(())
                    }
                    _ => self.assign_target(tokens, start, at, value),
                }
            }
            None => self.eval_range(tokens, start, end).map(|_| ()),
        }
    }

    /// Truth value of `tokens[start..]`
    pub(crate) fn condition(&mut self, tokens: &[Token], start: usize) -> ScriptResult<bool> {
        if start >= tokens.len() {
            return Err(ScriptError::of(ErrorKind::EndOfStatementUnexpected).at_token(start));
        }
        Ok(self.eval_range(tokens, start, tokens.len())?.is_truthy())
    }

    /// Call a user function with positional arguments
    ///
    /// Missing arguments are bound to the empty string. Iteration bindings
    /// of the caller are not visible inside the function.
    pub(crate) fn call_function(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
        let function = self
            .engine
            .functions
            .get(name)
            .ok_or_else(|| ScriptError::new(ErrorKind::UnrecognizedExpression, &[name]))?;
        let parameters = function.parameters();
        if args.len() > parameters.len() {
            return Err(ScriptError::bad_argument_count());
        }
        let mut locals = Scope::new();
        let mut args = args.into_iter();
        for parameter in parameters {
            locals.set(parameter, args.next().unwrap_or_default());
        }

        let context = ExecutionContext::function(Arc::clone(&function), locals, self.flags());
        let iterations = std::mem::take(&mut self.iterations);
        let result = self.run_nested(context);
        self.iterations = iterations;

        match result? {
            Some(ControlSignal::Return(value)) => Ok(value.unwrap_or_default()),
            Some(signal) => Err(self.park(signal)),
            None => Ok(Value::default()),
        }
    }

    /// Resize a selection to the current atom or bond count
    pub(crate) fn universe_sized(&self, selection: &Selection) -> Selection {
        if selection.is_bonds() {
            selection.resized(self.scene.bond_count())
        } else {
            selection.resized(self.scene.atom_count())
        }
    }

    // =========================================================================
    // Output and effects
    // =========================================================================

    /// Script output (`print`, `echo`, `show`)
    pub(crate) fn print(&mut self, text: impl Into<String>) {
        if self.is_checking() {
            return;
        }
        let text = text.into();
        match self.captures.last_mut() {
            Some(buffer) => buffer.push(text),
            None => self.engine.output.emit(OutputMessage::print(text)),
        }
    }

    /// Command feedback, suppressed by `quiet`
    pub(crate) fn status(&mut self, text: impl Into<String>) {
        let flags = self.flags();
        if flags.syntax_check || flags.quiet {
            return;
        }
        self.engine.output.emit(OutputMessage::status(text));
    }

    /// Report a non-fatal error without unwinding
    pub(crate) fn warn(&mut self, err: ScriptError) {
        if self.is_checking() {
            return;
        }
        let err = err.translated(self.engine.translator.as_ref());
        self.engine
            .output
            .emit(OutputMessage::warning(err.message().to_string()));
    }

    /// Run a scene mutation unless this is a syntax check
    pub(crate) fn effect<T>(&mut self, f: impl FnOnce(&mut (dyn Scene + 'a)) -> T) -> Option<T> {
        if self.is_checking() {
            return None;
        }
        self.set_cache.clear();
        Some(f(&mut *self.scene))
    }

    /// [`Executor::effect`] for fallible scene calls
    pub(crate) fn try_effect<T>(
        &mut self,
        f: impl FnOnce(&mut (dyn Scene + 'a)) -> SceneResult<T>,
    ) -> ScriptResult<Option<T>> {
        match self.effect(f) {
            Some(result) => Ok(Some(result?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Compiler, ScriptCompiler};
    use crate::output::BufferedOutput;
    use molscript_scene::MemoryScene;

    fn run(engine: &mut ScriptEngine, scene: &mut MemoryScene, source: &str) -> ScriptResult<Option<ControlSignal>> {
        let program = ScriptCompiler::new().compile("test", source).unwrap();
        let mut exec = Executor::new(engine, scene);
        exec.run_nested(ExecutionContext::script(Arc::new(program), ExecutionFlags::default()))
    }

    #[test]
    fn test_error_is_located() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(2);
        let err = run(&mut engine, &mut scene, "x = 1\nfrobnicate 3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnrecognizedCommand);
        let position = err.position().unwrap();
        assert_eq!(position.line, 2);
        assert_eq!(position.command, 2);
        assert!(position.statement.contains(">>"));
    }

    #[test]
    fn test_function_locals_do_not_leak() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(1);
        let source = "function f(a) {\n var t = a + 1\n return t\n}\nr = f(4)";
        run(&mut engine, &mut scene, source).unwrap();
        assert_eq!(engine.globals.get("r"), Some(&Value::Integer(5)));
        assert!(engine.globals.get("t").is_none());
        assert!(engine.globals.get("a").is_none());
    }

    #[test]
    fn test_list_element_assignment() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(1);
        run(&mut engine, &mut scene, "a = [1, 2]\na[4] = 9").unwrap();
        assert_eq!(
            engine.globals.get("a"),
            Some(&Value::List(vec!["1".into(), "2".into(), "".into(), "9".into()]))
        );
    }

    #[test]
    fn test_exit_inside_function_stops_script() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(1);
        let source = "function stop() {\n exit\n}\nx = 1\ny = stop()\nx = 2";
        let signal = run(&mut engine, &mut scene, source).unwrap();
        assert_eq!(signal, Some(ControlSignal::Exit));
        assert_eq!(engine.globals.get("x"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_plain_assignment_in_function_stays_local() {
        let output = BufferedOutput::new();
        let mut engine = ScriptEngine::new().with_output(output.clone());
        let mut scene = MemoryScene::with_atoms(1);
        let source = "g = 1\nfunction f() {\n t = 1\n g = 2\n _h = 3\n}\nf()\nprint t";
        run(&mut engine, &mut scene, source).unwrap();
        assert_eq!(output.printed(), "");
        assert!(engine.globals.get("t").is_none());
        assert_eq!(engine.globals.get("g"), Some(&Value::Integer(2)));
        assert_eq!(engine.globals.get("_h"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_list_growth_is_bounded() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(1);
        let err = run(&mut engine, &mut scene, "a = [1]\na[2000000000] = 1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegerOutOfRange);
        assert_eq!(engine.globals.get("a"), Some(&Value::List(vec!["1".into()])));
    }

    #[test]
    fn test_echo_expands_variables() {
        let output = BufferedOutput::new();
        let mut engine = ScriptEngine::new().with_output(output.clone());
        let mut scene = MemoryScene::with_atoms(1);
        let source = "x = 5\necho v=@{x * 2} n=@x mail@ @missing";
        run(&mut engine, &mut scene, source).unwrap();
        assert_eq!(output.printed(), "v=10 n=5 mail@ @missing");
    }

    #[test]
    fn test_goto_label_from_variable() {
        let output = BufferedOutput::new();
        let mut engine = ScriptEngine::new().with_output(output.clone());
        let mut scene = MemoryScene::with_atoms(1);
        let source = "lbl = \"skip\"\ngoto @{lbl}\nprint \"no\"\nmessage skip\nprint \"yes\"";
        run(&mut engine, &mut scene, source).unwrap();
        assert_eq!(output.printed(), "yes");
    }

    #[test]
    fn test_exit_in_expression_stops_evaluation() {
        let output = BufferedOutput::new();
        let mut engine = ScriptEngine::new().with_output(output.clone());
        let mut scene = MemoryScene::with_atoms(1);
        let source = "function stop() {\n exit\n}\nfunction g() {\n print \"ran\"\n return 1\n}\ny = stop() + g()\nprint \"after\"";
        let signal = run(&mut engine, &mut scene, source).unwrap();
        assert_eq!(signal, Some(ControlSignal::Exit));
        assert_eq!(output.printed(), "");
        assert!(engine.globals.get("y").is_none());
    }

    #[test]
    fn test_exit_in_iteration_stops_loop() {
        let output = BufferedOutput::new();
        let mut engine = ScriptEngine::new().with_output(output.clone());
        let mut scene = MemoryScene::with_atoms(3);
        let source = "function noisy() {\n print \"once\"\n exit\n}\nz = for(x; {*}; noisy())";
        let signal = run(&mut engine, &mut scene, source).unwrap();
        assert_eq!(signal, Some(ControlSignal::Exit));
        assert_eq!(output.printed(), "once");
        assert!(engine.globals.get("z").is_none());
    }

    #[test]
    fn test_reset_removes_innermost_binding() {
        let output = BufferedOutput::new();
        let mut engine = ScriptEngine::new().with_output(output.clone());
        let mut scene = MemoryScene::with_atoms(1);
        let source = "t = \"outer\"\nfunction f() {\n var t = 1\n reset t\n print t\n}\nf()\nprint t";
        run(&mut engine, &mut scene, source).unwrap();
        assert_eq!(output.printed(), "outer\nouter");
        run(&mut engine, &mut scene, "reset t").unwrap();
        assert!(engine.globals.get("t").is_none());
    }

    #[test]
    fn test_syntax_check_skips_effects() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(3);
        let before = scene.clone();
        let program = ScriptCompiler::new()
            .compile("test", "select atomno=1\nhide atomno=2\n{*}.temperature = 5\nzap")
            .unwrap();
        let mut exec = Executor::new(&mut engine, &mut scene);
        exec.run_nested(ExecutionContext::script(
            Arc::new(program),
            ExecutionFlags::syntax_check(),
        ))
        .unwrap();
        assert!(scene == before);
    }
}
