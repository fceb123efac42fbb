//! Variables, parameters and defined sets: var, assignment, set, reset,
//! define, subset

use molscript_scene::ViewChange;

use super::{expression_at, word_at, Command, CommandRegistry};
use crate::config::ScriptOption;
use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::exec::{Executor, Step};
use crate::token::{render_statement, CommandKind, Token};
use crate::value::Value;
use crate::variables::{DefinedSet, Definition};

/// Register variable and parameter commands
pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(VarCommand);
    registry.register(AssignCommand);
    registry.register(SetCommand);
    registry.register(ResetCommand);
    registry.register(DefineCommand);
    registry.register(SubsetCommand);
}

// ============================================================================
// var command
// ============================================================================

struct VarCommand;

impl Command for VarCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Var
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "var" declares variables local to the current function. Outside a
    function the variables are global. Undeclared names start out as
    the empty string.

USAGE

    var name [, name ...]
    var name = expression
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        match args.iter().position(|t| *t == Token::AssignOp) {
            Some(at) => {
                let Some(Token::Identifier(name)) = args.get(1).filter(|_| at == 2) else {
                    return Err(ScriptError::of(ErrorKind::InvalidArgument).at_token(1));
                };
                let value = ctx.eval_range(args, at + 1, args.len())?;
                ctx.declare(name, value);
            }
            None => {
                if args.len() < 2 {
                    return Err(ScriptError::of(ErrorKind::InsufficientArguments).at_token(0));
                }
                for token in &args[1..] {
                    if let Token::Identifier(name) = token {
                        ctx.declare(name, Value::default());
                    }
                }
            }
        }
        Ok(Step::Next)
    }
}

// ============================================================================
// assignment
// ============================================================================

struct AssignCommand;

impl Command for AssignCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Assign
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    Assignment stores a value in a variable, a list element or an atom
    property. A variable not yet bound anywhere becomes global.

USAGE

    name = expression
    name[index] = expression
    {atom expression}.property = expression
    name += expression
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        ctx.run_clause(args, 1, args.len())?;
        Ok(Step::Next)
    }
}

// ============================================================================
// set command
// ============================================================================

struct SetCommand;

impl Command for SetCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Set
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "set" changes an interpreter option or a scene parameter. Any other
    name is stored as a user variable. Without a value the setting is
    turned on.

USAGE

    set name [=] value
    set name

EXAMPLES

    set debugScript on
    set bondTolerance 0.5
    set historyLevel 1
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let Some(Token::Identifier(name)) = args.get(1) else {
            return Err(ScriptError::of(ErrorKind::InsufficientArguments).at_token(0));
        };
        let value = match &args[2..] {
            [] => Value::Boolean(true),
            [Token::Identifier(word)] => ctx
                .lookup(word)
                .unwrap_or_else(|| Value::String(word.clone())),
            _ => ctx.eval_range(args, 2, args.len())?,
        };

        if let Some(option) = ScriptOption::lookup(name) {
            option
                .apply(&mut ctx.engine.options, &value)
                .ok_or_else(|| ScriptError::invalid_argument(value.to_string()).at_token(2))?;
            return Ok(Step::Next);
        }

        if ctx.scene.parameter(name).is_some() {
            let property = value.to_property();
            ctx.try_effect(|scene| scene.set_parameter(name, property))?;
            return Ok(Step::Next);
        }

        if ctx.flags().is_state_script {
            ctx.warn(ScriptError::new(ErrorKind::UnrecognizedParameterWarning, &[name]));
        }
        ctx.assign(name, value);
        Ok(Step::Next)
    }
}

// ============================================================================
// reset command
// ============================================================================

struct ResetCommand;

impl Command for ResetCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Reset
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "reset" without arguments restores the default view. With a name it
    removes the innermost variable of that name, or resets an option or
    parameter to its default.
    "reset variables" removes every global variable and "reset functions"
    forgets every user function.

USAGE

    reset
    reset name
    reset variables | functions
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let Some(name) = word_at(args, 1) else {
            if args.len() > 1 {
                return Err(ScriptError::of(ErrorKind::InvalidArgument).at_token(1));
            }
            ctx.effect(|scene| scene.transform_view(ViewChange::Reset));
            return Ok(Step::Next);
        };

        match name.as_str() {
            "variables" => ctx.engine.globals.clear(),
            "functions" => ctx.engine.functions.clear(),
            _ if ctx.unset(&name) => {}
            _ => {
                if let Some(option) = ScriptOption::lookup(&name) {
                    option.reset(&mut ctx.engine.options);
                } else if ctx.scene.parameter(&name).is_some() {
                    ctx.effect(|scene| scene.reset_parameter(&name));
                } else {
                    return Err(
                        ScriptError::new(ErrorKind::UnrecognizedParameter, &["RESET"]).at_token(1),
                    );
                }
            }
        }
        Ok(Step::Next)
    }
}

// ============================================================================
// define command
// ============================================================================

struct DefineCommand;

impl Command for DefineCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Define
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "define" names an atom set. A plain definition is evaluated once; a
    dynamic one is evaluated again every time the name is used.

USAGE

    define name atom-expression
    define dynamic name atom-expression

EXAMPLES

    define heavy not hydrogen
    define dynamic hot temperature > 50
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let dynamic = matches!(args.get(1), Some(Token::Identifier(word)) if word == "dynamic")
            && matches!(args.get(2), Some(Token::Identifier(_)));
        let at = if dynamic { 2 } else { 1 };
        let Some(Token::Identifier(name)) = args.get(at) else {
            return Err(ScriptError::of(ErrorKind::StringOrIdentifierExpected).at_token(at));
        };
        let (start, end) = expression_at(args, at + 1)?
            .ok_or_else(|| ScriptError::of(ErrorKind::ExpressionExpected).at_token(at + 1))?;
        let expression = &args[start..end];

        let definition = if dynamic {
            Definition::Dynamic(expression.to_vec())
        } else {
            let selection = ctx
                .evaluate_selection(expression)
                .map_err(|err| err.offset_token(start))?;
            Definition::Static(selection)
        };
        ctx.engine.definitions.define(DefinedSet {
            name: name.clone(),
            source: render_statement(expression, None),
            definition,
        });
        Ok(Step::Next)
    }
}

// ============================================================================
// subset command
// ============================================================================

struct SubsetCommand;

impl Command for SubsetCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Subset
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "subset" limits every following atom expression to the given atoms.
    Without an expression the limit is removed.

USAGE

    subset [atom-expression]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        ctx.engine.subset = match expression_at(args, 1)? {
            Some((start, end)) => {
                let mut selection = ctx
                    .selection_expression(&args[start..end])
                    .map_err(|err| err.offset_token(start))?;
                selection.subtract(&ctx.scene.deleted_atoms());
                Some(selection)
            }
            None => None,
        };
        Ok(Step::Next)
    }
}
