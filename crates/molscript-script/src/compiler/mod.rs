//! Script compiler
//!
//! The interpreter consumes compiled [`Program`]s only; anything that
//! starts as text (inline scripts, `@{...}`, `eval()`, interrupt scripts)
//! goes through a [`Compiler`] first. [`ScriptCompiler`] is the reference
//! implementation: a nom lexer followed by a statement builder that resolves
//! block structure and `break`/`continue` targets.

mod lexer;
mod parser;

use thiserror::Error;

use crate::error::{ErrorKind, ErrorPosition, ScriptError};
use crate::program::Program;
use crate::token::Token;

/// A compilation failure with its source position
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line} of {script})")]
pub struct CompileError {
    /// Script name
    pub script: String,
    /// What went wrong
    pub message: String,
    /// Source line (1-based)
    pub line: usize,
    /// Offending source text, when known
    pub text: String,
}

impl CompileError {
    pub fn new(script: &str, message: &str, line: usize, text: &str) -> Self {
        Self {
            script: script.to_string(),
            message: message.to_string(),
            line,
            text: text.to_string(),
        }
    }
}

impl From<CompileError> for ScriptError {
    fn from(err: CompileError) -> Self {
        ScriptError::new(ErrorKind::Compile, &[&err.message]).locate(ErrorPosition {
            script: err.script,
            line: err.line,
            command: 0,
            statement: err.text,
        })
    }
}

/// Turns script text into programs
pub trait Compiler: Send + Sync {
    /// Compile a whole script
    fn compile(&self, name: &str, source: &str) -> Result<Program, CompileError>;

    /// Compile a single math expression (for `eval()` and `@{...}`)
    fn compile_expression(&self, source: &str) -> Result<Vec<Token>, CompileError>;
}

/// The reference compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptCompiler;

impl ScriptCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for ScriptCompiler {
    fn compile(&self, name: &str, source: &str) -> Result<Program, CompileError> {
        let lexemes = lexer::tokenize(name, source)?;
        let program = parser::build_program(name, source, lexemes)?;
        log::debug!("compiled {} ({} statements)", name, program.len());
        Ok(program)
    }

    fn compile_expression(&self, source: &str) -> Result<Vec<Token>, CompileError> {
        let lexemes = lexer::tokenize("expression", source)?;
        parser::build_expression("expression", source, lexemes)
    }
}
