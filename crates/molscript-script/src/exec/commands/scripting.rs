//! Nested scripts and run control: script, pause, resume, step, delay

use std::sync::Arc;
use std::time::Duration;

use super::{number_in_range, path_at, value_from, Command, CommandRegistry};
use crate::error::{ControlSignal, ErrorKind, ScriptError, ScriptResult};
use crate::exec::{Executor, Step};
use crate::token::{CommandKind, Token};

/// Register script and run-control commands
pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(ScriptCommand);
    registry.register(PauseCommand);
    registry.register(ResumeCommand);
    registry.register(StepCommand);
    registry.register(DelayCommand);
}

// ============================================================================
// script command
// ============================================================================

struct ScriptCommand;

impl Command for ScriptCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Script
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "script" runs another script in a nested context. "return" in the
    nested script ends only that script; "exit" ends every script.

USAGE

    script filename
    script @variable
    script inline "text"

EXAMPLES

    script setup.spt
    script inline "select *; color red"
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let (name, source) = match args.get(1) {
            Some(Token::Identifier(word)) if word == "inline" => {
                let text = value_from(ctx, args, 2)?
                    .ok_or_else(|| ScriptError::of(ErrorKind::StringExpected).at_token(1))?;
                ("inline".to_string(), text.to_string())
            }
            Some(Token::Str(_)) | Some(Token::VarRef(_)) => {
                let path = path_at(ctx, args, 1)
                    .ok_or_else(|| ScriptError::of(ErrorKind::FilenameExpected).at_token(1))?;
                let source = ctx.scene.read_file(&path)?;
                (path, source)
            }
            _ => return Err(ScriptError::of(ErrorKind::FilenameExpected).at_token(0)),
        };

        log::debug!("running script {}", name);
        match ctx.run_source(&name, &source)? {
            None | Some(ControlSignal::Return(_)) => Ok(Step::Next),
            Some(signal) => Ok(Step::Signal(signal)),
        }
    }
}

// ============================================================================
// pause command
// ============================================================================

struct PauseCommand;

impl Command for PauseCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Pause
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "pause" suspends the script before its next statement until another
    thread resumes, steps or interrupts it. Scripts queued while paused
    run immediately.

USAGE

    pause [message]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        if ctx.is_checking() {
            return Ok(Step::Next);
        }
        let message = match args.get(1) {
            Some(Token::Str(text)) => text.clone(),
            _ => "script paused".to_string(),
        };
        ctx.status(message);
        ctx.engine.controller.pause();
        Ok(Step::Next)
    }
}

// ============================================================================
// resume command
// ============================================================================

struct ResumeCommand;

impl Command for ResumeCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Resume
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "resume" continues a paused script. Usually issued from a script
    queued while the main script is paused.

USAGE

    resume
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, _args: &[Token]) -> ScriptResult<Step> {
        if !ctx.is_checking() {
            ctx.engine.controller.resume();
        }
        Ok(Step::Next)
    }
}

// ============================================================================
// step command
// ============================================================================

struct StepCommand;

impl Command for StepCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Step
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "step" lets a paused script run one more statement, then pause again.

USAGE

    step
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, _args: &[Token]) -> ScriptResult<Step> {
        if !ctx.is_checking() {
            ctx.engine.controller.step();
        }
        Ok(Step::Next)
    }
}

// ============================================================================
// delay command
// ============================================================================

struct DelayCommand;

impl Command for DelayCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Delay
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "delay" waits the given number of seconds (default 1), refreshing the
    display as it goes. An interrupt cuts the wait short and stops the
    script.

USAGE

    delay [seconds]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let seconds = number_in_range(ctx, args, 1, 0.0, 3600.0)?.unwrap_or(1.0);
        if ctx.is_checking() {
            return Ok(Step::Next);
        }
        let controller = Arc::clone(&ctx.engine.controller);
        let increment = ctx.engine.config.delay_increment();
        let scene = &mut *ctx.scene;
        let finished =
            controller.sleep(Duration::from_secs_f64(seconds), increment, || scene.render_refresh());
        if finished {
            Ok(Step::Next)
        } else {
            Ok(Step::Signal(ControlSignal::Interrupt))
        }
    }
}
