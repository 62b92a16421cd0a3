//! The failure-recovery loop.
//!
//! Each step consumes the current [`State`] and returns the next one, so the
//! live command is carried as a value between transitions:
//!
//! ```text
//! Running(cmd) --success--------------------------> Terminated(Succeeded)
//! Running(cmd) --failure, oracle error------------> Terminated(SuggestionFailed)
//! Running(cmd) --failure, suggestions-------------> AwaitingSelection
//! AwaitingSelection --digit in 1..=len------------> Running(chosen)
//! AwaitingSelection --any other key---------------> Terminated(Declined)
//! ```

use crate::executor::{ExecutionResult, Executor, ProcessRunner};
use crate::history::HistoryProvider;
use crate::selection::{render_suggestions, KeySource};
use crate::suggestion::{SuggestionError, SuggestionList, SuggestionSource};
use anyhow::Result;
use std::io::Write;
use tracing::info;

/// How the loop ended.
#[derive(Debug)]
pub enum Outcome {
    /// The live command exited successfully.
    Succeeded,
    /// The user pressed a non-digit or an out-of-range digit.
    Declined,
    /// Suggestions could not be obtained.
    SuggestionFailed(SuggestionError),
}

impl Outcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Succeeded => 0,
            Outcome::Declined => 1,
            Outcome::SuggestionFailed(_) => 2,
        }
    }
}

/// Where the loop is; `step` consumes one state and returns the next.
#[derive(Debug)]
pub enum State {
    Running(String),
    AwaitingSelection { suggestions: SuggestionList },
    Terminated(Outcome),
}

/// Drives execute → suggest → select → re-execute until an exit condition.
pub struct RecoveryLoop<'a, P: ProcessRunner, K: KeySource, O: Write, E: Write> {
    executor: Executor<P>,
    history: &'a dyn HistoryProvider,
    suggester: &'a dyn SuggestionSource,
    keys: K,
    stdout: O,
    stderr: E,
}

impl<'a, P, K, O, E> RecoveryLoop<'a, P, K, O, E>
where
    P: ProcessRunner,
    K: KeySource,
    O: Write,
    E: Write,
{
    pub fn new(
        executor: Executor<P>,
        history: &'a dyn HistoryProvider,
        suggester: &'a dyn SuggestionSource,
        keys: K,
        stdout: O,
        stderr: E,
    ) -> Self {
        Self {
            executor,
            history,
            suggester,
            keys,
            stdout,
            stderr,
        }
    }

    /// Runs the loop starting from `command` until it terminates.
    pub async fn run(&mut self, command: String) -> Result<Outcome> {
        let mut state = State::Running(command);
        loop {
            state = match state {
                State::Terminated(outcome) => {
                    info!("Recovery loop finished: {:?}", outcome);
                    return Ok(outcome);
                }
                other => self.step(other).await?,
            };
        }
    }

    /// Performs one transition.
    pub async fn step(&mut self, state: State) -> Result<State> {
        match state {
            State::Running(command) => self.run_command(command).await,
            State::AwaitingSelection { suggestions } => self.await_selection(suggestions),
            State::Terminated(outcome) => Ok(State::Terminated(outcome)),
        }
    }

    async fn run_command(&mut self, command: String) -> Result<State> {
        let (stderr, exit) = match self.executor.execute(&command).await {
            ExecutionResult::Success { stdout, stderr } => {
                if !stderr.is_empty() {
                    write!(self.stderr, "{}", stderr)?;
                    self.stderr.flush()?;
                }
                write!(self.stdout, "{}", stdout)?;
                self.stdout.flush()?;
                return Ok(State::Terminated(Outcome::Succeeded));
            }
            ExecutionResult::Failure { stderr, exit } => (stderr, exit),
        };

        info!("Command '{}' failed ({}), asking for suggestions", command, exit);
        if !stderr.is_empty() {
            write!(self.stderr, "{}", stderr)?;
            self.stderr.flush()?;
        }

        let context = self.history.recent_commands();
        match self.suggester.suggest(&context, &stderr, &command).await {
            Ok(suggestions) => {
                render_suggestions(&suggestions, &mut self.stdout)?;
                Ok(State::AwaitingSelection { suggestions })
            }
            Err(e) => {
                writeln!(self.stderr, "{}", e)?;
                self.stderr.flush()?;
                Ok(State::Terminated(Outcome::SuggestionFailed(e)))
            }
        }
    }

    fn await_selection(&mut self, suggestions: SuggestionList) -> Result<State> {
        let key = self.keys.read_key()?;
        match key.resolve(&suggestions) {
            Some(next) => {
                info!("Selected suggestion: {}", next);
                Ok(State::Running(next))
            }
            None => {
                info!("Selection {:?} ends the session", key);
                Ok(State::Terminated(Outcome::Declined))
            }
        }
    }
}
