//! Engine configuration and per-run execution flags

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Default nesting limit for scripts and function calls
pub const DEFAULT_MAX_CONTEXT_DEPTH: usize = 10;

/// Static engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of nested script/function contexts
    pub max_context_depth: usize,
    /// How long a paused script waits between checks for queued work
    pub pause_poll_interval_ms: u64,
    /// Sleep increment used by `delay`
    pub delay_increment_ms: u64,
    /// Number of commands kept by the history
    pub history_capacity: usize,
    /// Whether executed commands are recorded at all
    pub record_history: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_context_depth: DEFAULT_MAX_CONTEXT_DEPTH,
            pause_poll_interval_ms: 50,
            delay_increment_ms: 100,
            history_capacity: 1000,
            record_history: true,
        }
    }
}

impl EngineConfig {
    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms.max(1))
    }

    pub fn delay_increment(&self) -> Duration {
        Duration::from_millis(self.delay_increment_ms.max(1))
    }
}

/// Flags threaded through every execution context of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionFlags {
    /// Run the full interpreter but skip every scene effect
    pub syntax_check: bool,
    /// Suppress echo of status messages
    pub quiet: bool,
    /// The script is a saved state being restored
    pub is_state_script: bool,
    /// Only compile the script; do not execute it
    pub is_cmdline_check: bool,
}

impl ExecutionFlags {
    /// Flags for a syntax-check-only run
    pub fn syntax_check() -> Self {
        Self {
            syntax_check: true,
            ..Self::default()
        }
    }

    /// Flags for restoring a saved state
    pub fn state_script() -> Self {
        Self {
            is_state_script: true,
            ..Self::default()
        }
    }
}

/// Interpreter options changed with `set` while a script runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptOptions {
    /// Trace every statement at debug level
    pub debug_script: bool,
    /// Deepest context level whose commands enter the history
    pub history_level: usize,
    /// Whether `refresh` redraws the scene
    pub refreshing: bool,
    /// Echo every statement as a status line
    pub echo: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            debug_script: false,
            history_level: 0,
            refreshing: true,
            echo: false,
        }
    }
}

/// A `set` name handled by the interpreter rather than the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOption {
    DebugScript,
    HistoryLevel,
    Refreshing,
    Echo,
}

static SCRIPT_OPTIONS: phf::Map<&'static str, ScriptOption> = phf::phf_map! {
    "debugscript" => ScriptOption::DebugScript,
    "historylevel" => ScriptOption::HistoryLevel,
    "refreshing" => ScriptOption::Refreshing,
    "echo" => ScriptOption::Echo,
};

impl ScriptOption {
    /// Look up an option by (case-insensitive) name
    pub fn lookup(name: &str) -> Option<Self> {
        SCRIPT_OPTIONS.get(name.to_ascii_lowercase().as_str()).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            ScriptOption::DebugScript => "debugScript",
            ScriptOption::HistoryLevel => "historyLevel",
            ScriptOption::Refreshing => "refreshing",
            ScriptOption::Echo => "echo",
        }
    }

    /// Store a value; `None` means the value had the wrong type
    pub fn apply(self, options: &mut ScriptOptions, value: &Value) -> Option<()> {
        match self {
            ScriptOption::HistoryLevel => {
                let level = value.as_int().filter(|n| *n >= 0)?;
                options.history_level = level as usize;
            }
            flag => {
                let on = match value {
                    Value::Boolean(b) => *b,
                    Value::Integer(i) => *i != 0,
                    Value::String(s) if s.eq_ignore_ascii_case("on") => true,
                    Value::String(s) if s.eq_ignore_ascii_case("off") => false,
                    _ => return None,
                };
                match flag {
                    ScriptOption::DebugScript => options.debug_script = on,
                    ScriptOption::Refreshing => options.refreshing = on,
                    _ => options.echo = on,
                }
            }
        }
        Some(())
    }

    /// Current value
    pub fn get(self, options: &ScriptOptions) -> Value {
        match self {
            ScriptOption::DebugScript => Value::Boolean(options.debug_script),
            ScriptOption::HistoryLevel => {
                Value::Integer(i32::try_from(options.history_level).unwrap_or(i32::MAX))
            }
            ScriptOption::Refreshing => Value::Boolean(options.refreshing),
            ScriptOption::Echo => Value::Boolean(options.echo),
        }
    }

    /// Restore the default value
    pub fn reset(self, options: &mut ScriptOptions) {
        let defaults = ScriptOptions::default();
        match self {
            ScriptOption::DebugScript => options.debug_script = defaults.debug_script,
            ScriptOption::HistoryLevel => options.history_level = defaults.history_level,
            ScriptOption::Refreshing => options.refreshing = defaults.refreshing,
            ScriptOption::Echo => options.echo = defaults.echo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_context_depth, 10);
        assert_eq!(config.delay_increment(), Duration::from_millis(100));
        assert!(config.record_history);
    }

    #[test]
    fn test_flag_constructors() {
        assert!(ExecutionFlags::syntax_check().syntax_check);
        assert!(!ExecutionFlags::syntax_check().quiet);
        assert!(ExecutionFlags::state_script().is_state_script);
    }

    #[test]
    fn test_script_options() {
        let mut options = ScriptOptions::default();
        let option = ScriptOption::lookup("HistoryLevel").unwrap();
        assert_eq!(option.apply(&mut options, &Value::Integer(2)), Some(()));
        assert_eq!(options.history_level, 2);
        assert_eq!(option.apply(&mut options, &Value::Integer(-1)), None);
        let refreshing = ScriptOption::lookup("refreshing").unwrap();
        assert!(refreshing.apply(&mut options, &Value::Boolean(false)).is_some());
        assert!(!options.refreshing);
        refreshing.reset(&mut options);
        assert!(options.refreshing);
        assert!(ScriptOption::lookup("bondTolerance").is_none());
    }
}
