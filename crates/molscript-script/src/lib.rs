//! molscript script engine
//!
//! This crate compiles and runs molscript scripts against a
//! [`Scene`](molscript_scene::Scene).
//!
//! # Overview
//!
//! The engine supports:
//! - Math expressions with implicit iteration over atom sets and aggregates
//!   (`{carbon}.temperature.max`)
//! - Atom expressions (`select carbon and within(3.0, oxygen)`)
//! - Control flow (`if`/`elseif`/`else`, `while`, `for`, `break`,
//!   `continue`, `goto`) and user functions
//! - Nested scripts with a bounded nesting depth
//! - Pause, step and interrupt from another thread
//! - Syntax-check runs that touch neither the scene nor user state
//! - State scripts, saved selections and command history
//!
//! # Example
//!
//! ```rust
//! use molscript_scene::MemoryScene;
//! use molscript_script::{BufferedOutput, ExecutionFlags, ScriptEngine};
//!
//! let output = BufferedOutput::new();
//! let mut engine = ScriptEngine::new().with_output(output.clone());
//! let mut scene = MemoryScene::with_atoms(3);
//!
//! engine
//!     .run_script(&mut scene, "select atomno < 3\nprint {selected}.size", ExecutionFlags::default())
//!     .unwrap();
//! assert_eq!(output.printed(), "2");
//! ```
//!
//! # Architecture
//!
//! - **Compiler**: turns text into [`Program`]s of [`Token`] statements
//! - **ScriptEngine**: persistent state and the entry points
//! - **Executor**: the dispatch loop over a bounded context stack
//! - **Commands**: one implementation per [`CommandKind`]
//! - **PauseController**: shared pause/step/interrupt switch

mod compiler;
mod config;
mod context;
mod controller;
mod engine;
mod error;
mod exec;
mod functions;
mod history;
mod output;
mod program;
mod rpn;
mod select_eval;
mod state;
mod token;
mod value;
mod variables;

pub use compiler::{CompileError, Compiler, ScriptCompiler};
pub use config::{
    EngineConfig, ExecutionFlags, ScriptOption, ScriptOptions, DEFAULT_MAX_CONTEXT_DEPTH,
};
pub use context::{ContextStack, ExecutionContext};
pub use controller::{Action, PauseController, RunState};
pub use engine::{RunOutcome, ScriptEngine};
pub use error::{
    format_message, ControlSignal, ErrorKind, ErrorPosition, MessageCatalog, ScriptError,
    ScriptResult, Translator, Untranslated,
};
pub use functions::{FunctionTable, ScriptFunction};
pub use history::CommandHistory;
pub use output::{BufferedOutput, LogOutput, OutputKind, OutputMessage, OutputSink};
pub use program::{Program, Statement};
pub use token::{
    lookup_command, lookup_function, render_statement, BlockKind, CommandKind, Comparison,
    FunctionKind, Operand, Operator, PropertyRef, Token, ALL_COMMANDS,
};
pub use value::Value;
pub use variables::{is_global_name, DefinedSet, Definition, Definitions, Scope};
