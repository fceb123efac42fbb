//! Printing and inspection: print, echo, show

use super::{value_from, word_at, Command, CommandRegistry};
use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::exec::{Executor, Step};
use crate::state::dump_state;
use crate::token::{CommandKind, Token};

/// Register output commands
pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(PrintCommand);
    registry.register(EchoCommand);
    registry.register(ShowCommand);
}

// ============================================================================
// print command
// ============================================================================

struct PrintCommand;

impl Command for PrintCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Print
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "print" evaluates an expression and writes the result to the script
    output. Lists print one element per line.

USAGE

    print [expression]

EXAMPLES

    print {carbon}.size
    print "x = " + x
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let text = value_from(ctx, args, 1)?
            .map(|value| value.to_string())
            .unwrap_or_default();
        ctx.print(text);
        Ok(Step::Next)
    }
}

// ============================================================================
// echo command
// ============================================================================

struct EchoCommand;

impl Command for EchoCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Echo
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "echo" writes its text to the script output as written. Only
    "@name" and "@{expression}" are replaced by their values.

USAGE

    echo text
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let text = match args.get(1) {
            Some(Token::Str(text)) => text.clone(),
            _ => String::new(),
        };
        ctx.print(text);
        Ok(Step::Next)
    }
}

// ============================================================================
// show command
// ============================================================================

const SHOW_TOPICS: &str = "state, variables, functions, sets, history or a parameter name";

struct ShowCommand;

impl Command for ShowCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Show
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "show" prints part of the interpreter state: the restorable state
    script, global variables, user functions, defined sets, the command
    history, or the value of one parameter or variable.

USAGE

    show state | variables | functions | sets | history
    show name
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let Some(topic) = word_at(args, 1) else {
            return Err(ScriptError::new(ErrorKind::UnrecognizedShowParameter, &[SHOW_TOPICS])
                .at_token(0));
        };

        let lines: Vec<String> = match topic.as_str() {
            "state" => vec![dump_state(&*ctx.engine, &*ctx.scene)],
            "variables" => ctx
                .engine
                .globals
                .sorted()
                .into_iter()
                .map(|(name, value)| format!("{} = {}", name, value.to_literal()))
                .collect(),
            "functions" => ctx
                .engine
                .functions
                .sorted()
                .iter()
                .map(|function| function.signature())
                .collect(),
            "sets" => ctx
                .engine
                .definitions
                .sorted()
                .into_iter()
                .map(|set| {
                    let dynamic = if set.is_dynamic() { "dynamic " } else { "" };
                    format!("define {}{} {}", dynamic, set.name, set.source)
                })
                .collect(),
            "history" => ctx.engine.history.iter().map(str::to_string).collect(),
            _ => {
                let name = match args.get(1) {
                    Some(Token::Identifier(name)) | Some(Token::Str(name)) => name.clone(),
                    _ => topic,
                };
                let value = ctx.lookup(&name).ok_or_else(|| {
                    ScriptError::new(ErrorKind::UnrecognizedShowParameter, &[SHOW_TOPICS])
                        .at_token(1)
                })?;
                vec![format!("{} = {}", name, value.to_literal())]
            }
        };

        for line in lines {
            ctx.print(line);
        }
        Ok(Step::Next)
    }
}
