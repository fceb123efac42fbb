//! Command history
//!
//! Stores executed statements for `show history`/`history` and for hosts
//! that offer recall.

use std::collections::VecDeque;

/// Default maximum number of commands to store
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Bounded history of executed statements
#[derive(Debug, Clone)]
pub struct CommandHistory {
    /// Executed statements (most recent at back)
    commands: VecDeque<String>,
    /// Maximum number of statements to store
    max_size: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_HISTORY)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            commands: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Record a statement
    ///
    /// Empty statements and repeats of the previous entry are ignored.
    pub fn push(&mut self, command: impl Into<String>) {
        let command = command.into();
        if command.is_empty() || self.max_size == 0 {
            return;
        }
        if self.commands.back() == Some(&command) {
            return;
        }

        while self.commands.len() >= self.max_size {
            self.commands.pop_front();
        }
        self.commands.push_back(command);
    }

    /// Change the capacity, dropping the oldest entries if needed
    pub fn set_capacity(&mut self, max_size: usize) {
        self.max_size = max_size;
        while self.commands.len() > max_size {
            self.commands.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// The `n` most recent statements, oldest first
    pub fn last_n(&self, n: usize) -> Vec<&str> {
        let skip = self.commands.len().saturating_sub(n);
        self.commands.iter().skip(skip).map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_empty_and_repeats() {
        let mut history = CommandHistory::new();
        history.push("select *");
        history.push("select *");
        history.push("");
        history.push("zoom 50");
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["select *", "zoom 50"]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut history = CommandHistory::with_capacity(2);
        history.push("a");
        history.push("b");
        history.push("c");
        assert_eq!(history.last_n(5), vec!["b", "c"]);
        history.set_capacity(1);
        assert_eq!(history.last_n(5), vec!["c"]);
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let mut history = CommandHistory::with_capacity(0);
        history.push("a");
        assert!(history.is_empty());
    }
}
