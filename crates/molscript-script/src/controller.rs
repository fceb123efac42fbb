//! Pause / step / interrupt control
//!
//! A [`PauseController`] is shared (behind an `Arc`) between the thread
//! running a script and any thread that wants to steer it. The running
//! script calls [`PauseController::next_action`] once per statement; while
//! paused it blocks on a condition variable, waking on resume, step,
//! interrupt, or a queued interrupt script, and at least every poll interval.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Run state of the controlled script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    /// Run a fixed number of statements, then pause
    Stepping,
    /// Terminal until the next top-level run
    Interrupted,
}

/// What the running script should do before its next statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Proceed,
    Interrupt,
    /// Run this script text in a nested context, then ask again
    RunScript(String),
}

#[derive(Debug)]
struct ControlState {
    state: RunState,
    steps: usize,
    queued: VecDeque<String>,
}

/// Shared pause/step/interrupt switch
#[derive(Debug)]
pub struct PauseController {
    inner: Mutex<ControlState>,
    signal: Condvar,
}

impl Default for PauseController {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseController {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ControlState {
                state: RunState::Running,
                steps: 0,
                queued: VecDeque::new(),
            }),
            signal: Condvar::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.inner.lock().state
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RunState::Paused
    }

    pub fn is_interrupted(&self) -> bool {
        self.state() == RunState::Interrupted
    }

    /// Pause before the next statement
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.state != RunState::Interrupted {
            log::debug!("script paused");
            inner.state = RunState::Paused;
        }
        self.signal.notify_all();
    }

    /// Continue a paused or stepping script
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, RunState::Paused | RunState::Stepping) {
            log::debug!("script resumed");
            inner.state = RunState::Running;
            inner.steps = 0;
        }
        self.signal.notify_all();
    }

    /// Run one more statement, then pause again
    pub fn step(&self) {
        let mut inner = self.inner.lock();
        if inner.state != RunState::Interrupted {
            inner.state = RunState::Stepping;
            inner.steps = 1;
        }
        self.signal.notify_all();
    }

    /// Stop the running script and every context below it
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock();
        log::debug!("script interrupted");
        inner.state = RunState::Interrupted;
        inner.queued.clear();
        self.signal.notify_all();
    }

    /// Queue a script to run while the current one is paused
    pub fn queue_script(&self, script: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.queued.push_back(script.into());
        self.signal.notify_all();
    }

    /// Back to `Running` with nothing queued
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = RunState::Running;
        inner.steps = 0;
        inner.queued.clear();
    }

    /// Decide what happens before the next statement, blocking while paused
    pub fn next_action(&self, poll: Duration) -> Action {
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                RunState::Interrupted => return Action::Interrupt,
                RunState::Running => return Action::Proceed,
                RunState::Stepping if inner.steps > 0 => {
                    inner.steps -= 1;
                    return Action::Proceed;
                }
                RunState::Stepping => inner.state = RunState::Paused,
                RunState::Paused => {
                    if let Some(script) = inner.queued.pop_front() {
                        return Action::RunScript(script);
                    }
                    self.signal.wait_for(&mut inner, poll);
                }
            }
        }
    }

    /// Sleep for `duration` in increments, calling `tick` after each one
    ///
    /// Returns `false` if the script was interrupted while sleeping.
    pub fn sleep(&self, duration: Duration, increment: Duration, mut tick: impl FnMut()) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return !self.is_interrupted();
            }
            {
                let mut inner = self.inner.lock();
                if inner.state == RunState::Interrupted {
                    return false;
                }
                let wait = increment.min(deadline - now);
                self.signal.wait_for(&mut inner, wait);
            }
            tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn test_running_proceeds() {
        let controller = PauseController::new();
        assert_eq!(controller.next_action(POLL), Action::Proceed);
    }

    #[test]
    fn test_step_runs_one_statement() {
        let controller = PauseController::new();
        controller.step();
        assert_eq!(controller.next_action(POLL), Action::Proceed);
        assert_eq!(controller.state(), RunState::Stepping);

        controller.queue_script("print 1");
        // the second statement pauses and picks up the queued script
        assert_eq!(
            controller.next_action(POLL),
            Action::RunScript("print 1".to_string())
        );
        assert!(controller.is_paused());
    }

    #[test]
    fn test_resume_from_other_thread() {
        let controller = Arc::new(PauseController::new());
        controller.pause();

        let remote = Arc::clone(&controller);
        let handle = thread::spawn(move || {
            while !remote.is_paused() {
                thread::yield_now();
            }
            thread::sleep(Duration::from_millis(20));
            remote.resume();
        });

        assert_eq!(controller.next_action(POLL), Action::Proceed);
        handle.join().unwrap();
    }

    #[test]
    fn test_interrupt_is_terminal_until_reset() {
        let controller = PauseController::new();
        controller.interrupt();
        controller.resume();
        assert_eq!(controller.next_action(POLL), Action::Interrupt);
        assert!(!controller.sleep(Duration::from_millis(50), POLL, || {}));
        controller.reset();
        assert_eq!(controller.next_action(POLL), Action::Proceed);
    }

    #[test]
    fn test_sleep_ticks() {
        let controller = PauseController::new();
        let mut ticks = 0;
        assert!(controller.sleep(Duration::from_millis(20), Duration::from_millis(5), || ticks += 1));
        assert!(ticks >= 1);
    }
}
