//! Redo - run a shell command and recover from its failure with suggested fixes.
//!
//! When the wrapped command fails, redo sends the failing command, its error
//! output and a few lines of recent shell history to a text-generation
//! service, shows the returned candidates and re-runs the one the user picks
//! with a single keypress.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management (API key, model, shell, timeouts)
//! - [`executor`] - Runs the live command through a shell
//! - [`history`] - Recent shell history used as context
//! - [`http_client`] - HTTP client abstraction
//! - [`suggestion`] - Oracle prompt, request and reply parsing
//! - [`selection`] - Suggestion rendering and single-key input
//! - [`recovery`] - The execute, suggest, select, re-execute state machine
//!
//! # Example
//!
//! ```ignore
//! use redo::executor::{Executor, ShellProcessRunner};
//! use redo::history::ShellHistory;
//! use redo::recovery::RecoveryLoop;
//! use redo::selection::TerminalKeys;
//! use redo::suggestion::MockSuggester;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let history = ShellHistory::discover(None);
//!     let suggester = MockSuggester::new(Some("[\"ls /\"]".to_string()));
//!     let mut recovery = RecoveryLoop::new(
//!         Executor::new(ShellProcessRunner::new("/bin/sh"), None),
//!         &history,
//!         &suggester,
//!         TerminalKeys::new(None),
//!         std::io::stdout(),
//!         std::io::stderr(),
//!     );
//!
//!     let outcome = recovery.run("ls /nonexistent".to_string()).await?;
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

pub mod config;
pub mod executor;
pub mod history;
pub mod http_client;
pub mod recovery;
pub mod selection;
pub mod suggestion;
