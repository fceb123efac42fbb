//! Control flow: if, elseif, else, end, while, for, break, continue,
//! function, return, exit, goto, message

use std::sync::Arc;

use super::{value_from, Command, CommandRegistry};
use crate::error::{ControlSignal, ErrorKind, ScriptError, ScriptResult};
use crate::exec::{Executor, Step};
use crate::program::Program;
use crate::rpn::split_args;
use crate::token::{BlockKind, CommandKind, Token};

/// Register flow control commands
pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(IfCommand);
    registry.register(ElseIfCommand);
    registry.register(ElseCommand);
    registry.register(EndCommand);
    registry.register(WhileCommand);
    registry.register(ForCommand);
    registry.register(BreakCommand);
    registry.register(ContinueCommand);
    registry.register(FunctionCommand);
    registry.register(ReturnCommand);
    registry.register(ExitCommand);
    registry.register(GotoCommand);
    registry.register(MessageCommand);
}

/// Program and statement index being executed
fn position(ctx: &Executor<'_>) -> ScriptResult<(Arc<Program>, usize)> {
    ctx.stack
        .current()
        .map(|context| (Arc::clone(context.program()), context.pc))
        .ok_or_else(|| ScriptError::of(ErrorKind::CommandExpected))
}

fn missing_end(kind: CommandKind) -> ScriptError {
    ScriptError::new(ErrorKind::InvalidArgument, &[&format!("{} without end", kind)]).at_token(0)
}

/// Statement after the `end` closing the block at `pc`
fn past_end(program: &Program, pc: usize, kind: CommandKind) -> ScriptResult<Step> {
    program
        .block_end(pc)
        .map(|end| Step::Jump(end + 1))
        .ok_or_else(|| missing_end(kind))
}

fn jump_target(args: &[Token]) -> ScriptResult<usize> {
    match args.get(1) {
        Some(Token::JumpTarget(target)) => Ok(*target),
        _ => Err(ScriptError::of(ErrorKind::InvalidArgument).at_token(0)),
    }
}

// ============================================================================
// if command
// ============================================================================

struct IfCommand;

impl Command for IfCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::If
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "if" runs the following block when its condition is true, otherwise
    the first "elseif" whose condition holds, otherwise the "else" block.

USAGE

    if (condition) { ... } elseif (condition) { ... } else { ... }
    if condition ... else ... endif
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        if ctx.condition(args, 1)? {
            return Ok(Step::Next);
        }
        let (program, pc) = position(ctx)?;
        let mut at = pc;
        loop {
            let target = program
                .branch_target(at)
                .ok_or_else(|| missing_end(CommandKind::If))?;
            let branch = program.statement(target).unwrap_or(&[]);
            match branch.first().and_then(Token::command) {
                Some(CommandKind::ElseIf) => {
                    if ctx.condition(branch, 1)? {
                        return Ok(Step::Jump(target + 1));
                    }
                    at = target;
                }
                _ => return Ok(Step::Jump(target + 1)),
            }
        }
    }
}

// ============================================================================
// elseif command
// ============================================================================

struct ElseIfCommand;

impl Command for ElseIfCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::ElseIf
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "elseif" starts an alternative branch of an "if" block. Reaching it
    from the branch above ends the whole block.

USAGE

    elseif (condition)
    else if (condition)
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, _args: &[Token]) -> ScriptResult<Step> {
        let (program, pc) = position(ctx)?;
        past_end(&program, pc, CommandKind::If)
    }
}

// ============================================================================
// else command
// ============================================================================

struct ElseCommand;

impl Command for ElseCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Else
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "else" starts the final branch of an "if" block.

USAGE

    else
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, _args: &[Token]) -> ScriptResult<Step> {
        let (program, pc) = position(ctx)?;
        past_end(&program, pc, CommandKind::If)
    }
}

// ============================================================================
// end command
// ============================================================================

struct EndCommand;

impl Command for EndCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::End
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "end" closes an "if", "while", "for" or "function" block. Closing a
    loop returns to its header; closing a function definition makes the
    function callable.

USAGE

    end if | end while | end for | end function
    endif
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let block = match args.get(1) {
            Some(Token::Block(kind)) => *kind,
            _ => BlockKind::If,
        };
        match block {
            BlockKind::If => Ok(Step::Next),
            BlockKind::Function => {
                let pending = ctx
                    .stack
                    .current_mut()
                    .and_then(|context| context.pending_function.take());
                if let Some(function) = pending {
                    log::debug!("defining function {}", function.signature());
                    ctx.engine.functions.register(function);
                }
                Ok(Step::Next)
            }
            BlockKind::While | BlockKind::For => {
                let (program, pc) = position(ctx)?;
                let header = program
                    .block_start(pc)
                    .ok_or_else(|| ScriptError::of(ErrorKind::InvalidArgument).at_token(0))?;
                if block == BlockKind::For {
                    if let Some(context) = ctx.stack.current_mut() {
                        context.loop_reentry = Some(header);
                    }
                }
                Ok(Step::Jump(header))
            }
        }
    }
}

// ============================================================================
// while command
// ============================================================================

struct WhileCommand;

impl Command for WhileCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::While
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "while" repeats its block as long as the condition is true. The
    condition is evaluated again before every pass.

USAGE

    while (condition) { ... }
    while condition ... end while
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        if ctx.condition(args, 1)? {
            return Ok(Step::Next);
        }
        let (program, pc) = position(ctx)?;
        past_end(&program, pc, CommandKind::While)
    }
}

// ============================================================================
// for command
// ============================================================================

struct ForCommand;

impl Command for ForCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::For
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "for" runs its init clause once, then repeats the block while the
    condition holds, running the step clause before each further pass.
    An empty condition is true.

USAGE

    for (init; condition; step) { ... }
    for (var i = 1; i <= 3; i = i + 1) { print i }
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let (program, pc) = position(ctx)?;
        let close = args.len().saturating_sub(1);
        let clauses = split_args(args, 2, close, &Token::Semicolon);
        let [(init_start, init_end), (cond_start, cond_end), (step_start, step_end)] =
            clauses.as_slice()
        else {
            return Err(ScriptError::bad_argument_count().at_token(0));
        };

        let reentry = ctx.stack.current_mut().is_some_and(|context| {
            if context.loop_reentry == Some(pc) {
                context.loop_reentry = None;
                true
            } else {
                false
            }
        });
        if reentry {
            ctx.run_clause(args, *step_start, *step_end)?;
        } else {
            ctx.run_clause(args, *init_start, *init_end)?;
        }

        let proceed = if cond_start >= cond_end {
            true
        } else {
            ctx.eval_range(args, *cond_start, *cond_end)?.is_truthy()
        };
        if proceed {
            Ok(Step::Next)
        } else {
            past_end(&program, pc, CommandKind::For)
        }
    }
}

// ============================================================================
// break command
// ============================================================================

struct BreakCommand;

impl Command for BreakCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Break
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "break" leaves the innermost loop, or the n-th enclosing loop.

USAGE

    break [levels]
"#
    }

    fn execute(&self, _ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        Ok(Step::Jump(jump_target(args)?))
    }
}

// ============================================================================
// continue command
// ============================================================================

struct ContinueCommand;

impl Command for ContinueCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Continue
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "continue" starts the next pass of the innermost (or n-th enclosing)
    loop. A "for" loop runs its step clause first.

USAGE

    continue [levels]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let target = jump_target(args)?;
        let (program, _) = position(ctx)?;
        let is_for = program
            .statement(target)
            .and_then(|s| s.first())
            .and_then(Token::command)
            == Some(CommandKind::For);
        if is_for {
            if let Some(context) = ctx.stack.current_mut() {
                context.loop_reentry = Some(target);
            }
        }
        Ok(Step::Jump(target))
    }
}

// ============================================================================
// function command
// ============================================================================

struct FunctionCommand;

impl Command for FunctionCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Function
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "function" defines a user function. Parameters are bound positionally;
    missing arguments are empty strings. The function becomes callable
    once its definition is complete.

USAGE

    function name(a, b) { ... return value }

EXAMPLES

    function twice(x) { return x * 2 }
    print twice(21)
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let Some(Token::FunctionDef(function)) = args.get(1) else {
            return Err(ScriptError::of(ErrorKind::InvalidArgument).at_token(0));
        };
        if let Some(context) = ctx.stack.current_mut() {
            context.pending_function = Some(Arc::clone(function));
        }
        Ok(Step::Next)
    }
}

// ============================================================================
// return command
// ============================================================================

struct ReturnCommand;

impl Command for ReturnCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Return
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "return" leaves the current function or script, optionally with a
    value for the caller.

USAGE

    return [expression]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let value = value_from(ctx, args, 1)?;
        Ok(Step::Signal(ControlSignal::Return(value)))
    }
}

// ============================================================================
// exit command
// ============================================================================

struct ExitCommand;

impl Command for ExitCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Exit
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "exit" stops every running script, nested ones included.

USAGE

    exit
    quit
"#
    }

    fn execute(&self, _ctx: &mut Executor<'_>, _args: &[Token]) -> ScriptResult<Step> {
        Ok(Step::Signal(ControlSignal::Exit))
    }
}

// ============================================================================
// goto command
// ============================================================================

struct GotoCommand;

impl Command for GotoCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Goto
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "goto" continues at the "message" statement carrying the given label
    in the current script.

USAGE

    goto label
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let Some(Token::Str(label)) = args.get(1) else {
            return Err(ScriptError::of(ErrorKind::StringExpected).at_token(0));
        };
        let (program, _) = position(ctx)?;
        let target = program.statements().iter().position(|statement| {
            matches!(
                statement.as_slice(),
                [Token::Command(CommandKind::Message), Token::Str(text)]
                    if text.eq_ignore_ascii_case(label)
            )
        });
        target
            .map(Step::Jump)
            .ok_or_else(|| ScriptError::new(ErrorKind::InvalidArgument, &[label]).at_token(1))
    }
}

// ============================================================================
// message command
// ============================================================================

struct MessageCommand;

impl Command for MessageCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Message
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "message" reports its text as a status line. It also serves as a
    label for "goto".

USAGE

    message text
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        if let Some(Token::Str(text)) = args.get(1) {
            ctx.status(text.clone());
        }
        Ok(Step::Next)
    }
}
