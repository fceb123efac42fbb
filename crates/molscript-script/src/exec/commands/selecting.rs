//! Selection and visibility: select, restrict, display, hide, delete

use molscript_select::Selection;

use super::{expression_at, Command, CommandRegistry};
use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::exec::{Executor, Step};
use crate::token::{CommandKind, Token};

/// Register selection commands
pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(SelectCommand);
    registry.register(RestrictCommand);
    registry.register(DisplayCommand);
    registry.register(HideCommand);
    registry.register(DeleteCommand);
}

/// Target atoms of a command, or `None` when no expression was given
fn target_atoms(ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Option<Selection>> {
    match expression_at(args, 1)? {
        Some((start, end)) => ctx
            .evaluate_selection(&args[start..end])
            .map(Some)
            .map_err(|err| err.offset_token(start)),
        None => Ok(None),
    }
}

fn all_atoms(ctx: &Executor<'_>) -> Selection {
    ctx.restrict(Selection::all(ctx.scene.atom_count()))
}

fn required_atoms(ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Selection> {
    target_atoms(ctx, args)?
        .ok_or_else(|| ScriptError::of(ErrorKind::ExpressionExpected).at_token(0))
}

// ============================================================================
// select command
// ============================================================================

struct SelectCommand;

impl Command for SelectCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Select
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "select" replaces the current selection. Without an expression every
    atom is selected. Atoms outside the active subset and deleted atoms
    are never selected.

USAGE

    select [atom-expression]

EXAMPLES

    select atomno < 10
    select carbon and not within(3.0, oxygen)
    select {0:4}
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let atoms = match target_atoms(ctx, args)? {
            Some(atoms) => atoms,
            None => all_atoms(ctx),
        };
        let count = atoms.count();
        ctx.effect(|scene| scene.set_selected_atoms(&atoms));
        ctx.status(format!("{} atoms selected", count));
        Ok(Step::Next)
    }
}

// ============================================================================
// restrict command
// ============================================================================

struct RestrictCommand;

impl Command for RestrictCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Restrict
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "restrict" selects the given atoms, shows them and hides all others.

USAGE

    restrict atom-expression
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let atoms = match target_atoms(ctx, args)? {
            Some(atoms) => atoms,
            None => all_atoms(ctx),
        };
        let others = atoms.complement();
        let count = atoms.count();
        ctx.effect(|scene| {
            scene.set_selected_atoms(&atoms);
            scene.set_visibility(&others, false);
            scene.set_visibility(&atoms, true);
        });
        ctx.status(format!("{} atoms selected", count));
        Ok(Step::Next)
    }
}

// ============================================================================
// display command
// ============================================================================

struct DisplayCommand;

impl Command for DisplayCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Display
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "display" makes atoms visible. Without an expression every atom is
    shown.

USAGE

    display [atom-expression]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let atoms = match target_atoms(ctx, args)? {
            Some(atoms) => atoms,
            None => all_atoms(ctx),
        };
        ctx.effect(|scene| scene.set_visibility(&atoms, true));
        Ok(Step::Next)
    }
}

// ============================================================================
// hide command
// ============================================================================

struct HideCommand;

impl Command for HideCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Hide
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "hide" makes the given atoms invisible.

USAGE

    hide atom-expression
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let atoms = required_atoms(ctx, args)?;
        ctx.effect(|scene| scene.set_visibility(&atoms, false));
        Ok(Step::Next)
    }
}

// ============================================================================
// delete command
// ============================================================================

struct DeleteCommand;

impl Command for DeleteCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Delete
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "delete" removes atoms from the scene. Deleted atoms no longer match
    any atom expression.

USAGE

    delete atom-expression
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let atoms = required_atoms(ctx, args)?;
        if let Some(count) = ctx.effect(|scene| scene.delete_atoms(&atoms)) {
            ctx.status(format!("{} atoms deleted", count));
        }
        Ok(Step::Next)
    }
}
