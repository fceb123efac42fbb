//! Script engine
//!
//! [`ScriptEngine`] owns everything that outlives a single run: global
//! variables, user functions, defined sets, saved states, the command
//! history and the interpreter options. Each call to
//! [`ScriptEngine::run_script`] builds a fresh executor against the scene
//! it is given.

use std::sync::Arc;

use ahash::AHashMap;
use molscript_scene::Scene;
use molscript_select::Selection;

use crate::compiler::{Compiler, ScriptCompiler};
use crate::config::{EngineConfig, ExecutionFlags, ScriptOptions};
use crate::context::ExecutionContext;
use crate::controller::PauseController;
use crate::error::{ControlSignal, ScriptError, ScriptResult, Translator, Untranslated};
use crate::exec::Executor;
use crate::functions::FunctionTable;
use crate::history::CommandHistory;
use crate::output::{LogOutput, OutputMessage, OutputSink};
use crate::state::dump_state;
use crate::value::Value;
use crate::variables::{Definitions, Scope};

/// How a top-level run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Ran to the end, or returned
    Completed,
    /// Stopped by `exit`
    Exited,
    /// Stopped by the pause controller
    Interrupted,
}

/// User-visible state put back after a syntax check
struct UserState {
    globals: Scope,
    functions: FunctionTable,
    definitions: Definitions,
    saved_states: AHashMap<String, String>,
    saved_selections: AHashMap<String, Selection>,
    subset: Option<Selection>,
    options: ScriptOptions,
}

/// The script interpreter and its persistent state
pub struct ScriptEngine {
    pub(crate) config: EngineConfig,
    pub(crate) compiler: Arc<dyn Compiler>,
    pub(crate) translator: Arc<dyn Translator>,
    pub(crate) controller: Arc<PauseController>,
    pub(crate) globals: Scope,
    pub(crate) functions: FunctionTable,
    pub(crate) definitions: Definitions,
    pub(crate) history: CommandHistory,
    pub(crate) saved_states: AHashMap<String, String>,
    pub(crate) saved_selections: AHashMap<String, Selection>,
    /// Atoms every expression is restricted to
    pub(crate) subset: Option<Selection>,
    pub(crate) options: ScriptOptions,
    pub(crate) output: Box<dyn OutputSink>,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine {
    /// Engine with the default configuration, logging its output
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let history = CommandHistory::with_capacity(config.history_capacity);
        Self {
            config,
            compiler: Arc::new(ScriptCompiler::new()),
            translator: Arc::new(Untranslated),
            controller: Arc::new(PauseController::new()),
            globals: Scope::new(),
            functions: FunctionTable::new(),
            definitions: Definitions::new(),
            history,
            saved_states: AHashMap::new(),
            saved_selections: AHashMap::new(),
            subset: None,
            options: ScriptOptions::default(),
            output: Box::new(LogOutput),
        }
    }

    /// Replace the compiler
    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Translate error messages before they are reported
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    /// Send script output somewhere other than the log
    pub fn with_output(mut self, output: impl OutputSink + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    // =========================================================================
    // Running scripts
    // =========================================================================

    /// Compile and run a script against `scene`
    ///
    /// With `is_cmdline_check` the script is only compiled. With
    /// `syntax_check` it runs without touching the scene, and every
    /// variable, function and set it changes is put back afterwards.
    /// Errors are reported to the output sink and returned.
    pub fn run_script(
        &mut self,
        scene: &mut dyn Scene,
        source: &str,
        flags: ExecutionFlags,
    ) -> ScriptResult<RunOutcome> {
        self.run_named(scene, "script", source, flags)
    }

    /// Read a script through the scene and run it
    pub fn run_file(
        &mut self,
        scene: &mut dyn Scene,
        path: &str,
        flags: ExecutionFlags,
    ) -> ScriptResult<RunOutcome> {
        let source = match scene.read_file(path) {
            Ok(source) => source,
            Err(err) => return Err(self.report(err.into())),
        };
        self.run_named(scene, path, &source, flags)
    }

    fn run_named(
        &mut self,
        scene: &mut dyn Scene,
        name: &str,
        source: &str,
        flags: ExecutionFlags,
    ) -> ScriptResult<RunOutcome> {
        self.controller.reset();
        let program = match self.compiler.compile(name, source) {
            Ok(program) => program,
            Err(err) => return Err(self.report(err.into())),
        };
        if flags.is_cmdline_check {
            return Ok(RunOutcome::Completed);
        }
        log::debug!("running {} ({} statements)", name, program.len());

        let snapshot = flags.syntax_check.then(|| self.snapshot());
        if !flags.syntax_check {
            scene.hold_refresh(true);
        }
        let result = {
            let mut exec = Executor::new(self, &mut *scene);
            exec.run_nested(ExecutionContext::script(Arc::new(program), flags))
        };
        if !flags.syntax_check {
            scene.hold_refresh(false);
        }
        if let Some(snapshot) = snapshot {
            self.restore(snapshot);
        }

        match result {
            Ok(None) | Ok(Some(ControlSignal::Return(_))) => Ok(RunOutcome::Completed),
            Ok(Some(ControlSignal::Exit)) => Ok(RunOutcome::Exited),
            Ok(Some(ControlSignal::Interrupt)) => {
                log::info!("{} interrupted", name);
                Ok(RunOutcome::Interrupted)
            }
            Err(err) => Err(self.report(err)),
        }
    }

    /// Evaluate one math expression
    pub fn evaluate(&mut self, scene: &mut dyn Scene, expression: &str) -> ScriptResult<Value> {
        let tokens = self
            .compiler
            .compile_expression(expression)
            .map_err(ScriptError::from)?;
        let mut exec = Executor::new(self, scene);
        exec.evaluate(&tokens)
    }

    fn report(&mut self, err: ScriptError) -> ScriptError {
        let err = err.translated(self.translator.as_ref());
        self.output.emit(OutputMessage::error(err.report()));
        err
    }

    fn snapshot(&self) -> UserState {
        UserState {
            globals: self.globals.clone(),
            functions: self.functions.clone(),
            definitions: self.definitions.clone(),
            saved_states: self.saved_states.clone(),
            saved_selections: self.saved_selections.clone(),
            subset: self.subset.clone(),
            options: self.options,
        }
    }

    fn restore(&mut self, state: UserState) {
        self.globals = state.globals;
        self.functions = state.functions;
        self.definitions = state.definitions;
        self.saved_states = state.saved_states;
        self.saved_selections = state.saved_selections;
        self.subset = state.subset;
        self.options = state.options;
    }

    // =========================================================================
    // State access
    // =========================================================================

    /// Shared pause/step/interrupt switch for this engine
    pub fn controller(&self) -> Arc<PauseController> {
        Arc::clone(&self.controller)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn options(&self) -> &ScriptOptions {
        &self.options
    }

    /// Global variable by name
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) {
        self.globals.set(name, value.into());
    }

    pub fn globals(&self) -> &Scope {
        &self.globals
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    pub fn subset(&self) -> Option<&Selection> {
        self.subset.as_ref()
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// State script that rebuilds the current state
    pub fn state(&self, scene: &dyn Scene) -> String {
        dump_state(self, scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::output::{BufferedOutput, OutputKind};
    use molscript_scene::MemoryScene;

    #[test]
    fn test_errors_are_reported() {
        let output = BufferedOutput::new();
        let mut engine = ScriptEngine::new().with_output(output.clone());
        let mut scene = MemoryScene::with_atoms(1);
        let err = engine
            .run_script(&mut scene, "print 1\nzoom 2", ExecutionFlags::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NumberOutOfRange);
        let errors = output.lines(OutputKind::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("zoom"));
        assert_eq!(output.printed(), "1");
    }

    #[test]
    fn test_compile_only() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(1);
        let flags = ExecutionFlags {
            is_cmdline_check: true,
            ..ExecutionFlags::default()
        };
        let outcome = engine.run_script(&mut scene, "x = 5", flags).unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(engine.variable("x").is_none());
    }

    #[test]
    fn test_exit_outcome() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(1);
        let outcome = engine
            .run_script(&mut scene, "x = 1\nexit\nx = 2", ExecutionFlags::default())
            .unwrap();
        assert_eq!(outcome, RunOutcome::Exited);
        assert_eq!(engine.variable("x"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_refresh_is_held_for_the_run() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(1);
        engine
            .run_script(&mut scene, "refresh\nrefresh", ExecutionFlags::default())
            .unwrap();
        assert_eq!(scene.hold_depth(), 0);
        assert_eq!(scene.refresh_count(), 1);
    }

    #[test]
    fn test_evaluate() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(3);
        engine.set_variable("n", 4);
        assert_eq!(engine.evaluate(&mut scene, "n * 2").unwrap(), Value::Integer(8));
        assert_eq!(
            engine.evaluate(&mut scene, "{*}.size").unwrap(),
            Value::Integer(3)
        );
    }
}
