//! Compiled programs
//!
//! A [`Program`] is the compiler's output: statements plus the maps back to
//! source lines and character offsets. Block jump targets are resolved the
//! first time a block statement runs and cached in a write-once cell beside
//! the statement, so the instructions themselves never change.

use std::sync::{Arc, OnceLock};

use crate::token::{CommandKind, Token};

/// One statement's worth of instructions
pub type Statement = Vec<Token>;

/// Lazily resolved jump targets of one statement
#[derive(Debug, Default)]
struct JumpCell {
    /// Next `elseif`/`else`/`end` of an `if` chain
    branch: OnceLock<usize>,
    /// Matching `end` of a block header
    block_end: OnceLock<usize>,
    /// Matching header of an `end`
    block_start: OnceLock<usize>,
}

/// A compiled script
#[derive(Debug)]
pub struct Program {
    name: String,
    source: Arc<str>,
    statements: Vec<Statement>,
    lines: Vec<usize>,
    offsets: Vec<(usize, usize)>,
    jumps: Vec<JumpCell>,
}

impl Program {
    /// Create an empty program for the given source
    pub fn new(name: impl Into<String>, source: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            statements: Vec::new(),
            lines: Vec::new(),
            offsets: Vec::new(),
            jumps: Vec::new(),
        }
    }

    /// Append a statement with its 1-based source line and character span
    pub fn push(&mut self, statement: Statement, line: usize, span: (usize, usize)) {
        self.statements.push(statement);
        self.lines.push(line);
        self.offsets.push(span);
        self.jumps.push(JumpCell::default());
    }

    pub(crate) fn statement_mut(&mut self, index: usize) -> Option<&mut Statement> {
        self.statements.get_mut(index)
    }

    /// Script name (file name, function name or a placeholder)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statement(&self, index: usize) -> Option<&[Token]> {
        self.statements.get(index).map(Vec::as_slice)
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Source line of a statement (1-based)
    pub fn line(&self, index: usize) -> usize {
        self.lines.get(index).copied().unwrap_or(0)
    }

    /// Character span of a statement in the source
    pub fn offsets(&self, index: usize) -> Option<(usize, usize)> {
        self.offsets.get(index).copied()
    }

    /// Source text of a statement
    pub fn statement_text(&self, index: usize) -> &str {
        self.offsets(index)
            .and_then(|(start, end)| self.source.get(start..end))
            .map(str::trim)
            .unwrap_or("")
    }

    fn command(&self, index: usize) -> Option<CommandKind> {
        self.statements
            .get(index)
            .and_then(|s| s.first())
            .and_then(Token::command)
    }

    /// Next branch of the `if` chain that `index` belongs to
    pub(crate) fn branch_target(&self, index: usize) -> Option<usize> {
        cached(&self.jumps.get(index)?.branch, || {
            let mut depth = 0usize;
            for j in index + 1..self.len() {
                match self.command(j) {
                    Some(cmd) if cmd.opens_block() => depth += 1,
                    Some(CommandKind::End) if depth == 0 => return Some(j),
                    Some(CommandKind::End) => depth -= 1,
                    Some(CommandKind::ElseIf | CommandKind::Else) if depth == 0 => {
                        return Some(j)
                    }
                    _ => {}
                }
            }
            None
        })
    }

    /// `end` statement closing the block that `index` opens or continues
    pub(crate) fn block_end(&self, index: usize) -> Option<usize> {
        cached(&self.jumps.get(index)?.block_end, || {
            let mut depth = 0usize;
            for j in index + 1..self.len() {
                match self.command(j) {
                    Some(cmd) if cmd.opens_block() => depth += 1,
                    Some(CommandKind::End) if depth == 0 => return Some(j),
                    Some(CommandKind::End) => depth -= 1,
                    _ => {}
                }
            }
            None
        })
    }

    /// Header statement of the block closed by the `end` at `index`
    pub(crate) fn block_start(&self, index: usize) -> Option<usize> {
        cached(&self.jumps.get(index)?.block_start, || {
            let mut depth = 0usize;
            for j in (0..index).rev() {
                match self.command(j) {
                    Some(CommandKind::End) => depth += 1,
                    Some(cmd) if cmd.opens_block() && depth == 0 => return Some(j),
                    Some(cmd) if cmd.opens_block() => depth -= 1,
                    _ => {}
                }
            }
            None
        })
    }
}

/// Read a write-once cell, computing it on first use
///
/// A failed resolution is not cached so the error is raised every time.
fn cached(cell: &OnceLock<usize>, resolve: impl FnOnce() -> Option<usize>) -> Option<usize> {
    if let Some(target) = cell.get() {
        return Some(*target);
    }
    let target = resolve()?;
    Some(*cell.get_or_init(|| target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::BlockKind;

    fn stmt(cmd: CommandKind) -> Statement {
        vec![Token::Command(cmd)]
    }

    fn end(kind: BlockKind) -> Statement {
        vec![Token::Command(CommandKind::End), Token::Block(kind)]
    }

    /// if / while / end / elseif / else / end
    fn sample() -> Program {
        let mut p = Program::new("test", "");
        p.push(stmt(CommandKind::If), 1, (0, 0));
        p.push(stmt(CommandKind::While), 2, (0, 0));
        p.push(end(BlockKind::While), 3, (0, 0));
        p.push(stmt(CommandKind::ElseIf), 4, (0, 0));
        p.push(stmt(CommandKind::Else), 5, (0, 0));
        p.push(end(BlockKind::If), 6, (0, 0));
        p
    }

    #[test]
    fn test_branch_targets_skip_nested_blocks() {
        let p = sample();
        assert_eq!(p.branch_target(0), Some(3));
        assert_eq!(p.branch_target(3), Some(4));
        assert_eq!(p.branch_target(4), Some(5));
        // cached value is returned on the second visit
        assert_eq!(p.branch_target(0), Some(3));
    }

    #[test]
    fn test_block_end_and_start() {
        let p = sample();
        assert_eq!(p.block_end(0), Some(5));
        assert_eq!(p.block_end(1), Some(2));
        assert_eq!(p.block_end(3), Some(5));
        assert_eq!(p.block_start(2), Some(1));
        assert_eq!(p.block_start(5), Some(0));
    }

    #[test]
    fn test_unbalanced_block_has_no_target() {
        let mut p = Program::new("test", "");
        p.push(stmt(CommandKind::While), 1, (0, 0));
        assert_eq!(p.block_end(0), None);
        assert_eq!(p.line(0), 1);
        assert_eq!(p.line(7), 0);
    }

    #[test]
    fn test_statement_text() {
        let mut p = Program::new("t", "x = 1;  print x ");
        p.push(Vec::new(), 1, (0, 5));
        p.push(Vec::new(), 1, (6, 16));
        assert_eq!(p.statement_text(0), "x = 1");
        assert_eq!(p.statement_text(1), "print x");
    }
}
