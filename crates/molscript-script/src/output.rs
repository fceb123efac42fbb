//! Script output
//!
//! Everything a script prints goes through an [`OutputSink`]. `print`
//! output and status lines are kept apart so that hosts (and tests) can
//! read exactly what the script printed.

use std::sync::Arc;

use parking_lot::Mutex;

/// Kind of output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Text written by `print`, `echo` or `show`
    Print,
    /// Status produced by a command (e.g. "2 atoms selected")
    Status,
    /// Non-fatal warning
    Warning,
    /// Reported error
    Error,
}

/// One line of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMessage {
    pub text: String,
    pub kind: OutputKind,
}

impl OutputMessage {
    pub fn print(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: OutputKind::Print,
        }
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: OutputKind::Status,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: OutputKind::Warning,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: OutputKind::Error,
        }
    }
}

/// Destination for script output
pub trait OutputSink: Send {
    fn emit(&mut self, message: OutputMessage);
}

/// Sink that forwards every line to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOutput;

impl OutputSink for LogOutput {
    fn emit(&mut self, message: OutputMessage) {
        match message.kind {
            OutputKind::Print | OutputKind::Status => log::info!("{}", message.text),
            OutputKind::Warning => log::warn!("{}", message.text),
            OutputKind::Error => log::error!("{}", message.text),
        }
    }
}

/// In-memory sink; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct BufferedOutput {
    messages: Arc<Mutex<Vec<OutputMessage>>>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages, in order
    pub fn messages(&self) -> Vec<OutputMessage> {
        self.messages.lock().clone()
    }

    /// Lines of one kind
    pub fn lines(&self, kind: OutputKind) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Printed text joined by newlines
    pub fn printed(&self) -> String {
        self.lines(OutputKind::Print).join("\n")
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl OutputSink for BufferedOutput {
    fn emit(&mut self, message: OutputMessage) {
        self.messages.lock().push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_shared_between_clones() {
        let buffer = BufferedOutput::new();
        let mut sink: Box<dyn OutputSink> = Box::new(buffer.clone());
        sink.emit(OutputMessage::print("2"));
        sink.emit(OutputMessage::status("2 atoms selected"));
        sink.emit(OutputMessage::print("done"));

        assert_eq!(buffer.printed(), "2\ndone");
        assert_eq!(buffer.lines(OutputKind::Status), vec!["2 atoms selected"]);
        buffer.clear();
        assert!(buffer.messages().is_empty());
    }
}
