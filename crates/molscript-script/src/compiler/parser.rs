//! Statement builder
//!
//! Works in three passes over the lexemes: split them into raw statements
//! while tracking braces and keyword blocks, assemble the raw statements
//! into a program (extracting function bodies and resolving `break` and
//! `continue` targets), and compile each statement's arguments into tokens.

use std::sync::Arc;

use lin_alg::f64::Vec3;
use molscript_select::{lookup_atom_property, lookup_bond_property, AtomProperty, CompareOp};

use super::lexer::{Lex, Lexeme};
use super::CompileError;
use crate::functions::ScriptFunction;
use crate::program::{Program, Statement};
use crate::token::{
    lookup_command, lookup_function, BlockKind, CommandKind, Comparison, FunctionKind, Operand,
    Operator, PropertyRef, Token,
};

/// Placeholder jump target patched once the loop end is known
const UNRESOLVED: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Normal,
    End(BlockKind),
}

#[derive(Debug, Clone)]
struct RawStatement {
    kind: RawKind,
    lexemes: Vec<Lexeme>,
    line: usize,
    span: (usize, usize),
}

impl RawStatement {
    /// Lowercased leading word
    fn head(&self) -> Option<String> {
        self.lexemes.first().and_then(Lexeme::word)
    }

    fn opens_block(&self) -> bool {
        self.kind == RawKind::Normal
            && matches!(
                self.head().as_deref(),
                Some("if" | "while" | "for" | "function")
            )
            && !self.lexemes.get(1).is_some_and(|l| l.is_punct("="))
    }
}

fn block_kind(word: &str) -> Option<BlockKind> {
    match word {
        "if" => Some(BlockKind::If),
        "while" => Some(BlockKind::While),
        "for" => Some(BlockKind::For),
        "function" => Some(BlockKind::Function),
        _ => None,
    }
}

// =============================================================================
// Pass 1: statement splitting
// =============================================================================

#[derive(Debug)]
struct Frame {
    kind: BlockKind,
    braced: bool,
    line: usize,
}

struct Splitter<'a> {
    script: &'a str,
    source: &'a str,
    out: Vec<RawStatement>,
    frames: Vec<Frame>,
    current: Vec<Lexeme>,
}

impl<'a> Splitter<'a> {
    fn error(&self, message: &str, line: usize) -> CompileError {
        let text = match (self.current.first(), self.current.last()) {
            (Some(first), Some(last)) => self.source.get(first.start..last.end).unwrap_or(""),
            _ => "",
        };
        CompileError::new(self.script, message, line, text)
    }

    fn head(&self) -> Option<String> {
        self.current.first().and_then(Lexeme::word)
    }

    /// Whether a `{` now opens the body of the current block header
    fn header_ready(&self) -> bool {
        if self.current.get(1).is_some_and(|l| l.is_punct("=")) {
            return false;
        }
        match self.head().as_deref() {
            Some("else") if self.current.len() == 1 => true,
            Some("else" | "elseif" | "if" | "while" | "for" | "function") => {
                self.current.last().is_some_and(|l| l.is_punct(")"))
            }
            _ => false,
        }
    }

    fn push_raw(&mut self, kind: RawKind, lexemes: Vec<Lexeme>) {
        let (Some(first), Some(last)) = (lexemes.first(), lexemes.last()) else {
            return;
        };
        let line = first.line;
        let span = (first.start, last.end);
        self.out.push(RawStatement {
            kind,
            lexemes,
            line,
            span,
        });
    }

    /// Finish the current statement; `braced` when it ended with `{`
    fn flush(&mut self, braced: bool, line: usize) -> Result<(), CompileError> {
        if self.current.is_empty() {
            if braced {
                return Err(self.error("unexpected '{'", line));
            }
            return Ok(());
        }
        let lexemes = std::mem::take(&mut self.current);
        let line = lexemes[0].line;
        let assignment = lexemes.get(1).is_some_and(|l| l.is_punct("="));
        let head = lexemes[0].word().filter(|_| !assignment);

        match head.as_deref() {
            Some("end" | "endif") => {
                let requested = if head.as_deref() == Some("endif") {
                    Some(BlockKind::If)
                } else {
                    lexemes.get(1).and_then(Lexeme::word).and_then(|w| block_kind(&w))
                };
                let Some(frame) = self.frames.pop() else {
                    self.current = lexemes;
                    return Err(self.error("end without a matching block", line));
                };
                if requested.is_some_and(|k| k != frame.kind) {
                    let message = format!("end does not match {} block", frame.kind.name());
                    self.current = lexemes;
                    return Err(self.error(&message, line));
                }
                self.push_raw(RawKind::End(frame.kind), lexemes);
            }
            Some("else" | "elseif") => {
                match self.frames.last_mut() {
                    Some(frame) if frame.kind == BlockKind::If => frame.braced = braced,
                    _ => {
                        self.current = lexemes;
                        return Err(self.error("else without if", line));
                    }
                }
                self.push_raw(RawKind::Normal, lexemes);
            }
            Some(word) if block_kind(word).is_some() => {
                if let Some(kind) = block_kind(word) {
                    self.frames.push(Frame { kind, braced, line });
                }
                self.push_raw(RawKind::Normal, lexemes);
            }
            _ => {
                if braced {
                    self.current = lexemes;
                    return Err(self.error("unexpected '{'", line));
                }
                self.push_raw(RawKind::Normal, lexemes);
            }
        }
        Ok(())
    }

    /// Handle a block-closing `}`; `next` is the following significant lexeme
    fn close_brace(&mut self, brace: &Lexeme, next: Option<&Lexeme>) -> Result<(), CompileError> {
        let continues = next.is_some_and(|l| l.is_word("else") || l.is_word("elseif"));
        match self.frames.last_mut() {
            Some(frame) if frame.braced => {
                if continues && frame.kind == BlockKind::If {
                    frame.braced = false;
                    return Ok(());
                }
                let kind = frame.kind;
                self.frames.pop();
                self.push_raw(RawKind::End(kind), vec![brace.clone()]);
                Ok(())
            }
            _ => Err(self.error("unexpected '}'", brace.line)),
        }
    }

    fn split(mut self, lexemes: Vec<Lexeme>) -> Result<Vec<RawStatement>, CompileError> {
        let mut depth = 0usize;
        for (i, lx) in lexemes.iter().enumerate() {
            match &lx.kind {
                Lex::Newline if depth == 0 => self.flush(false, lx.line)?,
                Lex::Newline => {}
                Lex::Punct(";") if depth == 0 => self.flush(false, lx.line)?,
                Lex::Punct("{") if depth == 0 && self.header_ready() => {
                    self.flush(true, lx.line)?
                }
                Lex::Punct("}") if depth == 0 => {
                    self.flush(false, lx.line)?;
                    let next = lexemes[i + 1..]
                        .iter()
                        .find(|l| !matches!(l.kind, Lex::Newline));
                    self.close_brace(lx, next)?;
                }
                Lex::Punct("(" | "[" | "{") => {
                    depth += 1;
                    self.current.push(lx.clone());
                }
                Lex::Punct(")" | "]" | "}") => {
                    if depth == 0 {
                        return Err(self.error("unbalanced parentheses", lx.line));
                    }
                    depth -= 1;
                    self.current.push(lx.clone());
                }
                _ => self.current.push(lx.clone()),
            }
        }
        let last_line = lexemes.last().map_or(1, |l| l.line);
        if depth > 0 {
            return Err(self.error("unbalanced parentheses", last_line));
        }
        self.flush(false, last_line)?;
        if let Some(frame) = self.frames.last() {
            let message = format!("missing end for {} block", frame.kind.name());
            return Err(CompileError::new(self.script, &message, frame.line, ""));
        }
        Ok(self.out)
    }
}

// =============================================================================
// Pass 2: program assembly
// =============================================================================

struct LoopFrame {
    header: usize,
    breaks: Vec<usize>,
}

struct Assembler<'a> {
    script: &'a str,
    source: Arc<str>,
}

impl<'a> Assembler<'a> {
    fn error(&self, raw: &RawStatement, message: &str) -> CompileError {
        let text = self.source.get(raw.span.0..raw.span.1).unwrap_or("");
        CompileError::new(self.script, message, raw.line, text)
    }

    fn assemble(&self, name: &str, raws: &[RawStatement]) -> Result<Program, CompileError> {
        let mut program = Program::new(name, Arc::clone(&self.source));
        let mut loops: Vec<LoopFrame> = Vec::new();
        let mut blocks: Vec<BlockKind> = Vec::new();

        let mut i = 0;
        while i < raws.len() {
            let raw = &raws[i];
            let index = program.len();

            if let RawKind::End(kind) = raw.kind {
                if blocks.pop() != Some(kind) {
                    return Err(self.error(raw, "end does not match its block"));
                }
                if kind.is_loop() {
                    if let Some(frame) = loops.pop() {
                        for b in frame.breaks {
                            if let Some(stmt) = program.statement_mut(b) {
                                stmt[1] = Token::JumpTarget(index + 1);
                            }
                        }
                    }
                }
                program.push(
                    vec![Token::Command(CommandKind::End), Token::Block(kind)],
                    raw.line,
                    raw.span,
                );
                i += 1;
                continue;
            }

            let head = raw.head();
            let is_command = !raw.lexemes.get(1).is_some_and(|l| l.is_punct("="));
            match head.as_deref().filter(|_| is_command) {
                Some("function") => {
                    let end = matching_end(raws, i)
                        .ok_or_else(|| self.error(raw, "missing end for function block"))?;
                    let function = self.function(raw, &raws[i + 1..end])?;
                    program.push(
                        vec![
                            Token::Command(CommandKind::Function),
                            Token::FunctionDef(Arc::new(function)),
                        ],
                        raw.line,
                        raw.span,
                    );
                    let end_raw = &raws[end];
                    program.push(
                        vec![
                            Token::Command(CommandKind::End),
                            Token::Block(BlockKind::Function),
                        ],
                        end_raw.line,
                        end_raw.span,
                    );
                    i = end + 1;
                    continue;
                }
                Some(word @ ("break" | "continue")) => {
                    let levels = match raw.lexemes.get(1).map(|l| &l.kind) {
                        Some(Lex::Int(n)) if *n >= 1 => *n as usize,
                        None => 1,
                        _ => return Err(self.error(raw, "integer expected")),
                    };
                    if levels > loops.len() {
                        let message = format!("{} outside of a loop", word);
                        return Err(self.error(raw, &message));
                    }
                    let target_loop = loops.len() - levels;
                    let (kind, target) = if word == "break" {
                        loops[target_loop].breaks.push(index);
                        (CommandKind::Break, UNRESOLVED)
                    } else {
                        (CommandKind::Continue, loops[target_loop].header)
                    };
                    program.push(
                        vec![Token::Command(kind), Token::JumpTarget(target)],
                        raw.line,
                        raw.span,
                    );
                    i += 1;
                    continue;
                }
                Some("if") => blocks.push(BlockKind::If),
                Some("while") => {
                    blocks.push(BlockKind::While);
                    loops.push(LoopFrame {
                        header: index,
                        breaks: Vec::new(),
                    });
                }
                Some("for") => {
                    blocks.push(BlockKind::For);
                    loops.push(LoopFrame {
                        header: index,
                        breaks: Vec::new(),
                    });
                }
                _ => {}
            }

            let tokens = StatementCompiler::new(self.script, &self.source, raw).compile()?;
            program.push(tokens, raw.line, raw.span);
            i += 1;
        }
        Ok(program)
    }

    /// Compile `function name(a, b)` and its body
    fn function(
        &self,
        header: &RawStatement,
        body: &[RawStatement],
    ) -> Result<ScriptFunction, CompileError> {
        let lexemes = &header.lexemes;
        let name = match lexemes.get(1).map(|l| &l.kind) {
            Some(Lex::Word(name)) => name.clone(),
            _ => return Err(self.error(header, "function name expected")),
        };
        let mut parameters = Vec::new();
        if lexemes.len() > 2 {
            if !lexemes[2].is_punct("(") || !lexemes.last().is_some_and(|l| l.is_punct(")")) {
                return Err(self.error(header, "parameter list expected"));
            }
            for lx in &lexemes[3..lexemes.len() - 1] {
                match &lx.kind {
                    Lex::Word(p) => parameters.push(p.clone()),
                    Lex::Punct(",") => {}
                    _ => return Err(self.error(header, "parameter name expected")),
                }
            }
        }
        let program = self.assemble(&name, body)?;
        Ok(ScriptFunction::new(name, parameters, program))
    }
}

/// Index of the `end` closing the block opened at `start`
fn matching_end(raws: &[RawStatement], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (k, raw) in raws.iter().enumerate().skip(start + 1) {
        if raw.opens_block() {
            depth += 1;
        } else if matches!(raw.kind, RawKind::End(_)) {
            if depth == 0 {
                return Some(k);
            }
            depth -= 1;
        }
    }
    None
}

// =============================================================================
// Pass 3: statement compilation
// =============================================================================

struct StatementCompiler<'a> {
    script: &'a str,
    source: &'a str,
    raw: &'a RawStatement,
}

impl<'a> StatementCompiler<'a> {
    fn new(script: &'a str, source: &'a str, raw: &'a RawStatement) -> Self {
        Self {
            script,
            source,
            raw,
        }
    }

    fn error(&self, message: &str) -> CompileError {
        let text = self.source.get(self.raw.span.0..self.raw.span.1).unwrap_or("");
        CompileError::new(self.script, message, self.raw.line, text)
    }

    /// Source text covered by a run of lexemes
    fn text(&self, lexemes: &[Lexeme]) -> String {
        match (lexemes.first(), lexemes.last()) {
            (Some(first), Some(last)) => self
                .source
                .get(first.start..last.end)
                .unwrap_or("")
                .trim()
                .to_string(),
            _ => String::new(),
        }
    }

    fn compile(&self) -> Result<Statement, CompileError> {
        let lexemes = &self.raw.lexemes;
        let command = lexemes.first().and_then(|l| match &l.kind {
            Lex::Word(w) => lookup_command(w),
            _ => None,
        });
        let assigns_to_head = lexemes
            .get(1)
            .is_some_and(|l| l.is_punct("=") || l.is_punct("+=") || l.is_punct("-="));

        match command {
            Some(kind) if !assigns_to_head => self.command(kind, &lexemes[1..]),
            _ if top_level_assignment(lexemes).is_some() => {
                let mut out = vec![Token::Command(CommandKind::Assign)];
                out.extend(self.assignment(lexemes)?);
                Ok(out)
            }
            _ => self.math(lexemes),
        }
    }

    fn command(&self, kind: CommandKind, args: &[Lexeme]) -> Result<Statement, CompileError> {
        let mut out = vec![Token::Command(kind)];
        match kind {
            CommandKind::If | CommandKind::ElseIf | CommandKind::While => {
                if args.is_empty() {
                    return Err(self.error("condition expected"));
                }
                out.extend(self.math(args)?);
            }
            CommandKind::Else => {
                if args.first().is_some_and(|l| l.is_word("if")) {
                    out[0] = Token::Command(CommandKind::ElseIf);
                    if args.len() < 2 {
                        return Err(self.error("condition expected"));
                    }
                    out.extend(self.math(&args[1..])?);
                }
            }
            CommandKind::For => out.extend(self.for_header(args)?),
            CommandKind::Goto | CommandKind::Message => {
                let label = match args.first().map(|l| &l.kind) {
                    Some(Lex::Raw(text)) => unquote(text),
                    _ => return Err(self.error("label expected")),
                };
                out.push(Token::Str(label));
            }
            CommandKind::Echo | CommandKind::Label | CommandKind::Pause => {
                if let Some(Lex::Raw(text)) = args.first().map(|l| &l.kind) {
                    out.push(Token::Str(text.clone()));
                }
            }
            CommandKind::Script => {
                if args.first().is_some_and(|l| l.is_word("inline")) {
                    out.push(Token::Identifier("inline".to_string()));
                    out.extend(self.math(&args[1..])?);
                } else if let Some(path) = self.file_name(args) {
                    out.push(Token::Str(path));
                }
            }
            CommandKind::Load => {
                let mut rest = args;
                if rest.first().is_some_and(|l| l.is_word("append")) {
                    out.push(Token::Identifier("append".to_string()));
                    rest = &rest[1..];
                }
                if let Some(path) = self.file_name(rest) {
                    out.push(Token::Str(path));
                }
            }
            CommandKind::Select
            | CommandKind::Restrict
            | CommandKind::Display
            | CommandKind::Hide
            | CommandKind::Delete
            | CommandKind::Subset
            | CommandKind::Center => {
                if !args.is_empty() {
                    out.push(Token::ExpressionBegin);
                    out.extend(self.atoms(args)?);
                    out.push(Token::ExpressionEnd);
                }
            }
            CommandKind::Define => {
                let mut rest = args;
                if rest.first().is_some_and(|l| l.is_word("dynamic")) {
                    out.push(Token::Identifier("dynamic".to_string()));
                    rest = &rest[1..];
                }
                match rest.first().map(|l| &l.kind) {
                    Some(Lex::Word(name)) => out.push(Token::Identifier(name.clone())),
                    _ => return Err(self.error("set name expected")),
                }
                out.push(Token::ExpressionBegin);
                out.extend(self.atoms(&rest[1..])?);
                out.push(Token::ExpressionEnd);
            }
            CommandKind::Set => {
                match args.first().map(|l| &l.kind) {
                    Some(Lex::Word(name)) => out.push(Token::Identifier(name.clone())),
                    Some(_) => return Err(self.error("parameter name expected")),
                    None => {}
                }
                let value = match args.get(1) {
                    Some(l) if l.is_punct("=") => &args[2..],
                    Some(_) => &args[1..],
                    None => &[][..],
                };
                out.extend(self.math(value)?);
            }
            CommandKind::Var => {
                if top_level_assignment(args).is_some() {
                    out.extend(self.assignment(args)?);
                } else {
                    for lx in args {
                        match &lx.kind {
                            Lex::Word(name) => out.push(Token::Identifier(name.clone())),
                            Lex::Punct(",") => {}
                            _ => return Err(self.error("variable name expected")),
                        }
                    }
                }
            }
            CommandKind::Break
            | CommandKind::Continue
            | CommandKind::End
            | CommandKind::Function
            | CommandKind::Assign => {
                return Err(self.error("misplaced block statement"));
            }
            _ => out.extend(self.math(args)?),
        }
        Ok(out)
    }

    /// A quoted string, or the raw text of an unquoted file name
    fn file_name(&self, args: &[Lexeme]) -> Option<String> {
        match args {
            [] => None,
            [single] => match &single.kind {
                Lex::Str(s) => Some(s.clone()),
                _ => Some(self.text(args)),
            },
            _ => Some(self.text(args)),
        }
    }

    /// `(init; condition; step)`
    fn for_header(&self, args: &[Lexeme]) -> Result<Vec<Token>, CompileError> {
        let inner = match (args.first(), args.last()) {
            (Some(open), Some(close)) if open.is_punct("(") && close.is_punct(")") => {
                &args[1..args.len() - 1]
            }
            _ => return Err(self.error("for (init; condition; step) expected")),
        };
        let clauses = split_top_level(inner, ";");
        if clauses.len() < 3 || clauses[3..].iter().any(|c| !c.is_empty()) {
            return Err(self.error("for (init; condition; step) expected"));
        }

        let mut out = vec![Token::LeftParen];
        out.extend(self.clause(clauses[0])?);
        out.push(Token::Semicolon);
        out.extend(self.math(clauses[1])?);
        out.push(Token::Semicolon);
        out.extend(self.clause(clauses[2])?);
        out.push(Token::RightParen);
        Ok(out)
    }

    /// Init or step clause of a `for` header
    fn clause(&self, lexemes: &[Lexeme]) -> Result<Vec<Token>, CompileError> {
        let mut out = Vec::new();
        let mut rest = lexemes;
        if rest.first().is_some_and(|l| l.is_word("var")) {
            out.push(Token::Declare);
            rest = &rest[1..];
        }
        if top_level_assignment(rest).is_some() {
            out.extend(self.assignment(rest)?);
        } else {
            out.extend(self.math(rest)?);
        }
        Ok(out)
    }

    /// `target = value`, `target += value`, `target -= value`
    fn assignment(&self, lexemes: &[Lexeme]) -> Result<Vec<Token>, CompileError> {
        let Some(at) = top_level_assignment(lexemes) else {
            return Err(self.error("assignment expected"));
        };
        let target = self.math(&lexemes[..at])?;
        if target.is_empty() {
            return Err(self.error("variable name expected"));
        }
        let value = self.math(&lexemes[at + 1..])?;
        if value.is_empty() {
            return Err(self.error("value expected"));
        }

        let mut out = target.clone();
        out.push(Token::AssignOp);
        let op = match &lexemes[at].kind {
            Lex::Punct("+=") => Some(Operator::Plus),
            Lex::Punct("-=") => Some(Operator::Minus),
            _ => None,
        };
        match op {
            Some(op) => {
                out.extend(target);
                out.push(Token::Op(op));
                out.push(Token::LeftParen);
                out.extend(value);
                out.push(Token::RightParen);
            }
            None => out.extend(value),
        }
        Ok(out)
    }

    /// Math-expression tokens
    fn math(&self, lexemes: &[Lexeme]) -> Result<Vec<Token>, CompileError> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < lexemes.len() {
            let lx = &lexemes[i];
            let next = lexemes.get(i + 1);
            match &lx.kind {
                Lex::Int(n) => out.push(Token::Integer(*n)),
                Lex::Float(f) => out.push(Token::Decimal(*f)),
                Lex::Str(s) | Lex::Raw(s) => out.push(Token::Str(s.clone())),
                Lex::Bitset(sel) => out.push(Token::Bitset(sel.clone())),
                Lex::VarRef(name) => out.push(Token::VarRef(name.clone())),
                Lex::Subst(text) => out.push(Token::Substitution(text.clone())),
                Lex::Newline => {}
                Lex::Word(w) => out.push(word_token(w, next)),
                Lex::Punct(".") => match next.map(|l| &l.kind) {
                    Some(Lex::Word(member)) => {
                        out.push(Token::Member(member.clone()));
                        i += 1;
                    }
                    _ => return Err(self.error("property name expected")),
                },
                Lex::Punct("{") => {
                    let close = matching_brace(lexemes, i)
                        .ok_or_else(|| self.error("unbalanced braces"))?;
                    out.extend(self.braces(&lexemes[i + 1..close])?);
                    i = close;
                }
                Lex::Punct(p) => out.push(self.punct(p)?),
            }
            i += 1;
        }
        Ok(out)
    }

    fn punct(&self, p: &str) -> Result<Token, CompileError> {
        Ok(match p {
            "(" => Token::LeftParen,
            ")" => Token::RightParen,
            "[" => Token::LeftBracket,
            "]" => Token::RightBracket,
            "," => Token::Comma,
            ";" => Token::Semicolon,
            "=" | "==" => Token::Op(Operator::Eq),
            "!=" | "<>" => Token::Op(Operator::Ne),
            "<" => Token::Op(Operator::Lt),
            "<=" => Token::Op(Operator::Le),
            ">" => Token::Op(Operator::Gt),
            ">=" => Token::Op(Operator::Ge),
            "+" => Token::Op(Operator::Plus),
            "-" => Token::Op(Operator::Minus),
            "*" => Token::Op(Operator::Times),
            "/" => Token::Op(Operator::Divide),
            "\\" => Token::Op(Operator::IntDivide),
            "%" => Token::Op(Operator::Modulo),
            "**" => Token::Op(Operator::Power),
            "&" | "&&" => Token::Op(Operator::And),
            "|" | "||" => Token::Op(Operator::Or),
            "!" => Token::Op(Operator::Not),
            other => return Err(self.error(&format!("unexpected '{}'", other))),
        })
    }

    /// Contents of `{...}`: a point, a plane, or an atom expression
    fn braces(&self, inner: &[Lexeme]) -> Result<Vec<Token>, CompileError> {
        if let Some(numbers) = number_list(inner) {
            match numbers.as_slice() {
                [x, y, z] => return Ok(vec![Token::Point3(Vec3::new(*x, *y, *z))]),
                [a, b, c, d] => return Ok(vec![Token::Plane4([*a, *b, *c, *d])]),
                _ => {}
            }
        }
        let mut out = vec![Token::ExpressionBegin];
        out.extend(self.atoms(inner)?);
        out.push(Token::ExpressionEnd);
        Ok(out)
    }

    /// Atom-expression tokens
    fn atoms(&self, lexemes: &[Lexeme]) -> Result<Vec<Token>, CompileError> {
        let mut out: Vec<Token> = Vec::new();
        // whether each open paren belongs to a function call
        let mut parens: Vec<bool> = Vec::new();
        let mut i = 0;
        while i < lexemes.len() {
            let lx = &lexemes[i];
            let next = lexemes.get(i + 1);
            let in_call = parens.last().copied().unwrap_or(false);
            match &lx.kind {
                Lex::Word(w) if next.is_some_and(is_comparison) => {
                    let op_lexeme = &lexemes[i + 1];
                    let (operand, used) = self.operand(&lexemes[i + 2..])?;
                    out.push(self.comparison(w, op_lexeme, operand)?);
                    i += 2 + used;
                    continue;
                }
                Lex::Word(w) => match w.to_ascii_lowercase().as_str() {
                    "and" => out.push(Token::Op(Operator::And)),
                    "or" => out.push(Token::Op(Operator::Or)),
                    "xor" => out.push(Token::Op(Operator::Xor)),
                    "not" => out.push(Token::Op(Operator::Not)),
                    _ if next.is_some_and(|l| l.is_punct("(")) => {
                        match lookup_function(w) {
                            Some(kind) => out.push(Token::Function(kind)),
                            None => out.push(Token::Call(w.clone())),
                        }
                        parens.push(true);
                        out.push(Token::LeftParen);
                        i += 2;
                        continue;
                    }
                    _ => out.push(Token::Identifier(w.clone())),
                },
                Lex::Int(n) if in_call => out.push(Token::Integer(*n)),
                Lex::Int(n) => {
                    let range_end = match (next, lexemes.get(i + 2).map(|l| &l.kind)) {
                        (Some(dash), Some(Lex::Int(m))) if dash.is_punct("-") => Some(*m),
                        _ => None,
                    };
                    match range_end {
                        Some(m) => {
                            out.push(Token::LeftParen);
                            out.push(resno(CompareOp::Ge, *n));
                            out.push(Token::Op(Operator::And));
                            out.push(resno(CompareOp::Le, m));
                            out.push(Token::RightParen);
                            i += 3;
                            continue;
                        }
                        None => out.push(resno(CompareOp::Eq, *n)),
                    }
                }
                Lex::Float(f) => out.push(Token::Decimal(*f)),
                Lex::Str(s) | Lex::Raw(s) => out.push(Token::Str(s.clone())),
                Lex::Bitset(sel) => out.push(Token::Bitset(sel.clone())),
                Lex::VarRef(name) => out.push(Token::VarRef(name.clone())),
                Lex::Subst(text) => out.push(Token::Substitution(text.clone())),
                Lex::Newline => {}
                Lex::Punct("{") => {
                    let close = matching_brace(lexemes, i)
                        .ok_or_else(|| self.error("unbalanced braces"))?;
                    out.extend(self.braces(&lexemes[i + 1..close])?);
                    i = close + 1;
                    continue;
                }
                Lex::Punct("(") => {
                    parens.push(false);
                    out.push(Token::LeftParen);
                }
                Lex::Punct(")") => {
                    parens.pop();
                    out.push(Token::RightParen);
                }
                Lex::Punct(",") if in_call => out.push(Token::Comma),
                Lex::Punct(",") => out.push(Token::Op(Operator::Or)),
                Lex::Punct("*") => out.push(Token::Identifier("all".to_string())),
                Lex::Punct("-") if in_call => out.push(Token::Op(Operator::Minus)),
                Lex::Punct("&" | "&&") => out.push(Token::Op(Operator::And)),
                Lex::Punct("|" | "||") => out.push(Token::Op(Operator::Or)),
                Lex::Punct("!") => out.push(Token::Op(Operator::Not)),
                Lex::Punct(p) => {
                    return Err(self.error(&format!("unexpected '{}' in atom expression", p)))
                }
            }
            i += 1;
        }
        Ok(out)
    }

    /// Right-hand side of a comparison; returns the operand and lexemes used
    fn operand(&self, lexemes: &[Lexeme]) -> Result<(Operand, usize), CompileError> {
        let negative = lexemes.first().is_some_and(|l| l.is_punct("-"));
        let start = usize::from(negative);
        let sign = if negative { -1 } else { 1 };
        let operand = match lexemes.get(start).map(|l| &l.kind) {
            Some(Lex::Int(n)) => Operand::Int(sign * n),
            Some(Lex::Float(f)) => Operand::Float(sign as f64 * f),
            Some(Lex::Str(s)) if !negative => Operand::Str(s.clone()),
            Some(Lex::Word(w)) if !negative => Operand::Str(w.clone()),
            Some(Lex::VarRef(name)) if !negative => Operand::VarRef(name.clone()),
            _ => return Err(self.error("comparison value expected")),
        };
        Ok((operand, start + 1))
    }

    fn comparison(
        &self,
        name: &str,
        op: &Lexeme,
        operand: Operand,
    ) -> Result<Token, CompileError> {
        let property = match (lookup_atom_property(name), lookup_bond_property(name)) {
            (Some(p), _) => PropertyRef::Atom(p),
            (None, Some(p)) => PropertyRef::Bond(p),
            (None, None) => {
                return Err(self.error(&format!("unrecognized atom property '{}'", name)))
            }
        };
        let op = match &op.kind {
            Lex::Punct("=" | "==") => CompareOp::Eq,
            Lex::Punct("!=" | "<>") => CompareOp::Ne,
            Lex::Punct("<") => CompareOp::Lt,
            Lex::Punct("<=") => CompareOp::Le,
            Lex::Punct(">") => CompareOp::Gt,
            Lex::Punct(">=") => CompareOp::Ge,
            _ => return Err(self.error("comparison operator expected")),
        };
        Ok(Token::Comparison(Box::new(Comparison {
            property,
            op,
            operand,
        })))
    }
}

fn resno(op: CompareOp, n: i32) -> Token {
    Token::Comparison(Box::new(Comparison {
        property: PropertyRef::Atom(AtomProperty::ResNo),
        op,
        operand: Operand::Int(n),
    }))
}

fn is_comparison(lx: &Lexeme) -> bool {
    matches!(
        lx.kind,
        Lex::Punct("=" | "==" | "!=" | "<>" | "<" | "<=" | ">" | ">=")
    )
}

/// Token for a word in a math expression
fn word_token(word: &str, next: Option<&Lexeme>) -> Token {
    let lower = word.to_ascii_lowercase();
    match lower.as_str() {
        "true" => return Token::Boolean(true),
        "false" => return Token::Boolean(false),
        "and" => return Token::Op(Operator::And),
        "or" => return Token::Op(Operator::Or),
        "xor" => return Token::Op(Operator::Xor),
        "not" => return Token::Op(Operator::Not),
        _ => {}
    }
    if next.is_some_and(|l| l.is_punct("(")) {
        return match lookup_function(&lower) {
            Some(kind) => Token::Function(kind),
            None => Token::Call(word.to_string()),
        };
    }
    Token::Identifier(word.to_string())
}

/// Position of the top-level `=`, `+=` or `-=` in a statement
fn top_level_assignment(lexemes: &[Lexeme]) -> Option<usize> {
    let mut depth = 0i32;
    for (i, lx) in lexemes.iter().enumerate() {
        match &lx.kind {
            Lex::Punct("(" | "[" | "{") => depth += 1,
            Lex::Punct(")" | "]" | "}") => depth -= 1,
            Lex::Punct("=" | "+=" | "-=") if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split at a separator outside any brackets
fn split_top_level<'l>(lexemes: &'l [Lexeme], sep: &str) -> Vec<&'l [Lexeme]> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, lx) in lexemes.iter().enumerate() {
        match &lx.kind {
            Lex::Punct("(" | "[" | "{") => depth += 1,
            Lex::Punct(")" | "]" | "}") => depth -= 1,
            Lex::Punct(p) if *p == sep && depth == 0 => {
                parts.push(&lexemes[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&lexemes[start..]);
    parts
}

fn matching_brace(lexemes: &[Lexeme], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, lx) in lexemes.iter().enumerate().skip(open) {
        if lx.is_punct("{") {
            depth += 1;
        } else if lx.is_punct("}") {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Numbers of a point or plane literal, optionally comma separated
fn number_list(lexemes: &[Lexeme]) -> Option<Vec<f64>> {
    let mut numbers = Vec::new();
    let mut negative = false;
    for lx in lexemes {
        match &lx.kind {
            Lex::Punct("-") if !negative => negative = true,
            Lex::Punct(",") if !negative => {}
            Lex::Int(n) => {
                numbers.push(if negative { -(*n as f64) } else { *n as f64 });
                negative = false;
            }
            Lex::Float(f) => {
                numbers.push(if negative { -f } else { *f });
                negative = false;
            }
            _ => return None,
        }
    }
    (!negative && !numbers.is_empty()).then_some(numbers)
}

fn unquote(text: &str) -> String {
    let t = text.trim();
    let quoted = t.len() >= 2
        && ((t.starts_with('"') && t.ends_with('"')) || (t.starts_with('\'') && t.ends_with('\'')));
    if quoted {
        t[1..t.len() - 1].to_string()
    } else {
        t.to_string()
    }
}

// =============================================================================
// Entry points
// =============================================================================

pub(crate) fn build_program(
    name: &str,
    source: &str,
    lexemes: Vec<Lexeme>,
) -> Result<Program, CompileError> {
    let splitter = Splitter {
        script: name,
        source,
        out: Vec::new(),
        frames: Vec::new(),
        current: Vec::new(),
    };
    let raws = splitter.split(lexemes)?;
    let assembler = Assembler {
        script: name,
        source: Arc::from(source),
    };
    assembler.assemble(name, &raws)
}

pub(crate) fn build_expression(
    name: &str,
    source: &str,
    lexemes: Vec<Lexeme>,
) -> Result<Vec<Token>, CompileError> {
    let lexemes: Vec<Lexeme> = lexemes
        .into_iter()
        .filter(|l| !matches!(l.kind, Lex::Newline))
        .collect();
    let raw = RawStatement {
        kind: RawKind::Normal,
        line: lexemes.first().map_or(1, |l| l.line),
        span: (0, source.len()),
        lexemes,
    };
    StatementCompiler::new(name, source, &raw).math(&raw.lexemes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Compiler, ScriptCompiler};

    fn compile(source: &str) -> Program {
        ScriptCompiler::new().compile("test", source).unwrap()
    }

    fn heads(program: &Program) -> Vec<Option<CommandKind>> {
        program
            .statements()
            .iter()
            .map(|s| s.first().and_then(Token::command))
            .collect()
    }

    #[test]
    fn test_braced_if_else() {
        let p = compile("x = 1; if (x == 1) { x = 2 } else { x = 3 }; print x");
        assert_eq!(
            heads(&p),
            vec![
                Some(CommandKind::Assign),
                Some(CommandKind::If),
                Some(CommandKind::Assign),
                Some(CommandKind::Else),
                Some(CommandKind::Assign),
                Some(CommandKind::End),
                Some(CommandKind::Print),
            ]
        );
        assert_eq!(p.branch_target(1), Some(3));
        assert_eq!(p.block_end(3), Some(5));
    }

    #[test]
    fn test_keyword_blocks() {
        let p = compile("if (a)\n print 1\nelse if (b)\n print 2\nendif\nwhile (c)\nend while");
        assert_eq!(
            heads(&p),
            vec![
                Some(CommandKind::If),
                Some(CommandKind::Print),
                Some(CommandKind::ElseIf),
                Some(CommandKind::Print),
                Some(CommandKind::End),
                Some(CommandKind::While),
                Some(CommandKind::End),
            ]
        );
        assert_eq!(p.statement(6), Some(&[Token::Command(CommandKind::End), Token::Block(BlockKind::While)][..]));
        assert_eq!(p.line(5), 6);
    }

    #[test]
    fn test_for_header() {
        let p = compile("for (var i = 0; i < 3; i = i + 1) { x = i }");
        let header = p.statement(0).unwrap();
        assert_eq!(header[0], Token::Command(CommandKind::For));
        assert_eq!(header[2], Token::Declare);
        assert_eq!(header[3], Token::Identifier("i".into()));
        assert_eq!(header[4], Token::AssignOp);
        assert_eq!(header.iter().filter(|t| **t == Token::Semicolon).count(), 2);
        assert_eq!(header.iter().filter(|t| **t == Token::AssignOp).count(), 2);
    }

    #[test]
    fn test_break_and_continue_targets() {
        let p = compile("while (true) {\n if (x) { break }\n continue\n}\nprint 1");
        // 0 while, 1 if, 2 break, 3 end if, 4 continue, 5 end while, 6 print
        assert_eq!(p.statement(2).unwrap()[1], Token::JumpTarget(6));
        assert_eq!(p.statement(4).unwrap()[1], Token::JumpTarget(0));
    }

    #[test]
    fn test_break_outside_loop_fails() {
        let err = ScriptCompiler::new().compile("t", "break").unwrap_err();
        assert!(err.message.contains("outside of a loop"));
    }

    #[test]
    fn test_function_body_is_separate_program() {
        let p = compile("function twice(a, b) {\n return a * 2\n}\nprint twice(3)");
        assert_eq!(p.len(), 3);
        match &p.statement(0).unwrap()[1] {
            Token::FunctionDef(f) => {
                assert_eq!(f.name(), "twice");
                assert_eq!(f.parameters(), &["a".to_string(), "b".to_string()]);
                assert_eq!(f.body().len(), 1);
            }
            other => panic!("unexpected token {:?}", other),
        }
        assert_eq!(p.statement(2).unwrap()[1], Token::Call("twice".into()));
    }

    #[test]
    fn test_atom_expression_comparisons() {
        let p = compile("select atomno=1 or atomno=3");
        let s = p.statement(0).unwrap();
        assert_eq!(s[1], Token::ExpressionBegin);
        assert!(matches!(&s[2], Token::Comparison(c)
            if c.property == PropertyRef::Atom(AtomProperty::AtomNo) && c.operand == Operand::Int(1)));
        assert_eq!(s[3], Token::Op(Operator::Or));
        assert_eq!(s.last(), Some(&Token::ExpressionEnd));
    }

    #[test]
    fn test_braces_in_math() {
        let p = compile("print {selected}.size; p = {1 -2 3.5}");
        let print = p.statement(0).unwrap();
        assert_eq!(
            &print[1..],
            &[
                Token::ExpressionBegin,
                Token::Identifier("selected".into()),
                Token::ExpressionEnd,
                Token::Member("size".into()),
            ]
        );
        assert_eq!(
            p.statement(1).unwrap()[3],
            Token::Point3(Vec3::new(1.0, -2.0, 3.5))
        );
    }

    #[test]
    fn test_within_arguments_stay_numeric() {
        let p = compile("select within(3, atomno=1)");
        let s = p.statement(0).unwrap();
        assert_eq!(s[2], Token::Function(FunctionKind::Within));
        assert_eq!(s[4], Token::Integer(3));
        assert_eq!(s[5], Token::Comma);
    }

    #[test]
    fn test_compound_assignment() {
        let p = compile("n += 2");
        assert_eq!(
            p.statement(0).unwrap(),
            &[
                Token::Command(CommandKind::Assign),
                Token::Identifier("n".into()),
                Token::AssignOp,
                Token::Identifier("n".into()),
                Token::Op(Operator::Plus),
                Token::LeftParen,
                Token::Integer(2),
                Token::RightParen,
            ][..]
        );
    }

    #[test]
    fn test_missing_end_is_reported() {
        let err = ScriptCompiler::new().compile("t", "if (x) {\n print 1").unwrap_err();
        assert!(err.message.contains("missing end"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_raw_text_commands() {
        let p = compile("echo hello world\nload append \"1crn.pdb\"\ngoto \"top\"");
        assert_eq!(p.statement(0).unwrap()[1], Token::Str("hello world".into()));
        assert_eq!(p.statement(1).unwrap()[1], Token::Identifier("append".into()));
        assert_eq!(p.statement(1).unwrap()[2], Token::Str("1crn.pdb".into()));
        assert_eq!(p.statement(2).unwrap()[1], Token::Str("top".into()));
    }

    #[test]
    fn test_statement_text_and_offsets() {
        let p = compile("x = 1\n  print x + 1");
        assert_eq!(p.statement_text(1), "print x + 1");
        assert_eq!(p.line(1), 2);
    }
}
