//! Saved states and history: save, restore, history

use std::sync::Arc;

use super::{number_in_range, word_at, Command, CommandRegistry};
use crate::context::ExecutionContext;
use crate::error::{ControlSignal, ErrorKind, ScriptError, ScriptResult};
use crate::exec::{Executor, Step};
use crate::state::dump_state;
use crate::token::{CommandKind, Token};

/// Name used when `save`/`restore` is not given one
const DEFAULT_SAVE_NAME: &str = "default";

/// Register state commands
pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(SaveCommand);
    registry.register(RestoreCommand);
    registry.register(HistoryCommand);
}

fn save_name(args: &[Token]) -> String {
    word_at(args, 2).unwrap_or_else(|| DEFAULT_SAVE_NAME.to_string())
}

fn what_error() -> ScriptError {
    ScriptError::new(ErrorKind::WriteWhat, &["STATE", "SELECTION"]).at_token(0)
}

// ============================================================================
// save command
// ============================================================================

struct SaveCommand;

impl Command for SaveCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Save
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "save" keeps a copy of the current state script or selection under a
    name, for a later "restore".

USAGE

    save state [name]
    save selection [name]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let name = save_name(args);
        match word_at(args, 1).as_deref() {
            Some("state") => {
                let state = dump_state(&*ctx.engine, &*ctx.scene);
                ctx.engine.saved_states.insert(name, state);
            }
            Some("selection") => {
                let selection = ctx.scene.selected_atoms();
                ctx.engine.saved_selections.insert(name, selection);
            }
            _ => return Err(what_error()),
        }
        Ok(Step::Next)
    }
}

// ============================================================================
// restore command
// ============================================================================

struct RestoreCommand;

impl Command for RestoreCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Restore
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "restore" brings back a saved state by running its state script, or
    reselects a saved selection.

USAGE

    restore state [name]
    restore selection [name]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let name = save_name(args);
        let unknown = || ScriptError::new(ErrorKind::InvalidArgument, &[&name]).at_token(2);
        match word_at(args, 1).as_deref() {
            Some("state") => {
                let script = ctx.engine.saved_states.get(&name).cloned().ok_or_else(unknown)?;
                let program = ctx.engine.compiler.compile(&format!("state {}", name), &script)?;
                let mut flags = ctx.flags();
                flags.is_state_script = true;
                match ctx.run_nested(ExecutionContext::script(Arc::new(program), flags))? {
                    None | Some(ControlSignal::Return(_)) => {}
                    Some(signal) => return Ok(Step::Signal(signal)),
                }
            }
            Some("selection") => {
                let saved = ctx.engine.saved_selections.get(&name).cloned().ok_or_else(unknown)?;
                let selection = ctx.restrict(saved);
                ctx.effect(|scene| scene.set_selected_atoms(&selection));
            }
            _ => return Err(what_error()),
        }
        Ok(Step::Next)
    }
}

// ============================================================================
// history command
// ============================================================================

struct HistoryCommand;

impl Command for HistoryCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::History
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "history" prints the most recent commands, oldest first, or clears
    the history.

USAGE

    history [count]
    history clear
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        if word_at(args, 1).as_deref() == Some("clear") {
            if !ctx.is_checking() {
                ctx.engine.history.clear();
            }
            return Ok(Step::Next);
        }
        let count = number_in_range(ctx, args, 1, 0.0, f64::from(i32::MAX))?
            .map_or(ctx.engine.history.len(), |n| n as usize);
        let lines: Vec<String> = ctx
            .engine
            .history
            .last_n(count)
            .into_iter()
            .map(str::to_string)
            .collect();
        for line in lines {
            ctx.print(line);
        }
        Ok(Step::Next)
    }
}
