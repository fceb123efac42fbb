//! Command implementations
//!
//! Built-in commands organized by category. Each command receives the
//! executor and its complete statement (the command token included) and
//! returns the [`Step`] the dispatch loop takes next.

mod flow;
mod output;
mod scene;
mod scripting;
mod selecting;
mod state;
mod variables;

use std::sync::{Arc, OnceLock};

use ahash::AHashMap;

use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::exec::{Executor, Step};
use crate::rpn::matching_close;
use crate::token::{CommandKind, Token};
use crate::value::Value;

/// Trait for command implementations
pub(crate) trait Command: Send + Sync {
    /// Command this implementation handles
    fn kind(&self) -> CommandKind;

    /// Get the command name
    fn name(&self) -> &str {
        self.kind().name()
    }

    /// Get help text for this command
    fn help(&self) -> &str {
        "No help available."
    }

    /// Execute the command; `args` is the whole statement
    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step>;
}

/// Registry mapping command kinds to implementations
pub(crate) struct CommandRegistry {
    commands: AHashMap<CommandKind, Arc<dyn Command>>,
}

impl CommandRegistry {
    fn new() -> Self {
        Self {
            commands: AHashMap::new(),
        }
    }

    /// Register a command
    pub(crate) fn register<C: Command + 'static>(&mut self, cmd: C) {
        self.commands.insert(cmd.kind(), Arc::new(cmd));
    }

    /// Look up the implementation of a command
    pub(crate) fn get(&self, kind: CommandKind) -> Option<&Arc<dyn Command>> {
        self.commands.get(&kind)
    }

    /// Help text of a command
    pub(crate) fn help(&self, kind: CommandKind) -> Option<&str> {
        self.commands.get(&kind).map(|cmd| cmd.help())
    }

    /// Get the number of registered commands
    pub(crate) fn len(&self) -> usize {
        self.commands.len()
    }
}

/// The built-in command table, built on first use
pub(crate) fn registry() -> &'static CommandRegistry {
    static REGISTRY: OnceLock<CommandRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry = CommandRegistry::new();
        register_all(&mut registry);
        registry
    })
}

/// Register all built-in commands with the registry
fn register_all(registry: &mut CommandRegistry) {
    // Control flow
    flow::register(registry);

    // Nested scripts and run control
    scripting::register(registry);

    // Variables, parameters and defined sets
    variables::register(registry);

    // Selection and visibility
    selecting::register(registry);

    // Printing and inspection
    output::register(registry);

    // Scene effects
    scene::register(registry);

    // Saved states and history
    state::register(registry);
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Range of the atom expression starting at `start`, braces excluded
pub(super) fn expression_at(tokens: &[Token], start: usize) -> ScriptResult<Option<(usize, usize)>> {
    match tokens.get(start) {
        Some(Token::ExpressionBegin) => {
            let close = matching_close(tokens, start)?;
            Ok(Some((start + 1, close)))
        }
        _ => Ok(None),
    }
}

/// Word at `index`, lower-cased, when it is an identifier or string
pub(super) fn word_at(tokens: &[Token], index: usize) -> Option<String> {
    match tokens.get(index) {
        Some(Token::Identifier(word)) | Some(Token::Str(word)) => Some(word.to_ascii_lowercase()),
        _ => None,
    }
}

/// Value of `tokens[start..]`, if there is anything there
pub(super) fn value_from(
    ctx: &mut Executor<'_>,
    tokens: &[Token],
    start: usize,
) -> ScriptResult<Option<Value>> {
    if start >= tokens.len() {
        return Ok(None);
    }
    ctx.eval_range(tokens, start, tokens.len()).map(Some)
}

/// Number at `tokens[start..]` checked against a range
pub(super) fn number_in_range(
    ctx: &mut Executor<'_>,
    tokens: &[Token],
    start: usize,
    min: f64,
    max: f64,
) -> ScriptResult<Option<f64>> {
    let Some(value) = value_from(ctx, tokens, start)? else {
        return Ok(None);
    };
    let number = value
        .as_f64()
        .filter(|_| !matches!(value, Value::Selection(_)))
        .ok_or_else(|| ScriptError::new(ErrorKind::NumberExpected, &[&value.to_string()]).at_token(start))?;
    if !(min..=max).contains(&number) {
        return Err(ScriptError::number_out_of_range(min, max).at_token(start));
    }
    Ok(Some(number))
}

/// A file argument: a literal path, or `@name` naming a variable that holds one
pub(super) fn path_at(ctx: &Executor<'_>, tokens: &[Token], index: usize) -> Option<String> {
    let path = match tokens.get(index)? {
        Token::Str(path) => path.clone(),
        Token::VarRef(name) => return ctx.lookup(name).map(|v| v.to_string()),
        _ => return None,
    };
    match path.strip_prefix('@') {
        Some(name) if !name.is_empty() && !name.contains(char::is_whitespace) => {
            ctx.lookup(name).map(|v| v.to_string())
        }
        _ => Some(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_command_is_registered() {
        let registry = registry();
        for kind in crate::token::ALL_COMMANDS {
            assert!(registry.get(*kind).is_some(), "{} is not registered", kind.name());
        }
        assert_eq!(registry.len(), crate::token::ALL_COMMANDS.len());
    }

    #[test]
    fn test_help_text() {
        let help = registry().help(CommandKind::Select).unwrap();
        assert!(help.contains("USAGE"));
    }

    #[test]
    fn test_word_at() {
        let tokens = vec![
            Token::Command(CommandKind::Show),
            Token::Identifier("Variables".into()),
        ];
        assert_eq!(word_at(&tokens, 1).as_deref(), Some("variables"));
        assert_eq!(word_at(&tokens, 2), None);
    }
}
