//! Recent shell history used as context for the suggestion oracle.

use dirs::home_dir;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Maximum number of history lines handed to the oracle.
pub const HISTORY_LIMIT: usize = 5;

/// Trait for supplying recent shell commands.
///
/// Implementations are best effort: they never fail, they degrade to the
/// single-empty-entry sentinel instead.
pub trait HistoryProvider: Send + Sync {
    /// Returns at most [`HISTORY_LIMIT`] commands, most recent last.
    fn recent_commands(&self) -> Vec<String>;
}

/// Reads the tail of the user's shell history file.
pub struct ShellHistory {
    path: Option<PathBuf>,
}

impl ShellHistory {
    /// Creates a provider for a fixed history file.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Resolves the history file: explicit path, `$HISTFILE`, then the
    /// usual zsh and bash locations under the home directory.
    pub fn discover(configured: Option<PathBuf>) -> Self {
        if configured.is_some() {
            return Self::new(configured);
        }

        if let Some(histfile) = std::env::var_os("HISTFILE").filter(|v| !v.is_empty()) {
            return Self::new(Some(PathBuf::from(histfile)));
        }

        let path = home_dir().and_then(|home| {
            [".zsh_history", ".bash_history"]
                .iter()
                .map(|name| home.join(name))
                .find(|candidate| candidate.exists())
        });
        Self::new(path)
    }

    fn unavailable() -> Vec<String> {
        vec![String::new()]
    }
}

impl HistoryProvider for ShellHistory {
    fn recent_commands(&self) -> Vec<String> {
        let Some(path) = &self.path else {
            debug!("No shell history file found");
            return Self::unavailable();
        };

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not read history file {}: {}", path.display(), e);
                return Self::unavailable();
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(HISTORY_LIMIT);
        info!("Using {} history lines from {}", lines.len() - start, path.display());

        lines[start..].iter().map(|line| line.to_string()).collect()
    }
}
