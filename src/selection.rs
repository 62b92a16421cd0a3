//! Presenting suggestions and reading the user's single-key choice.
//!
//! The wait for a key is a blocking read on the current thread: one key
//! event resolves exactly one selection. When stdin is a terminal it is
//! switched to raw mode for the duration of the read so that the key does
//! not need to be followed by Enter.

use crate::suggestion::SuggestionList;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal;
use std::io::{self, IsTerminal, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A single keypress, reduced to what the recovery loop cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKey {
    Digit(u32),
    Other,
}

impl SelectionKey {
    pub fn from_char(c: char) -> Self {
        match c.to_digit(10) {
            Some(d) => SelectionKey::Digit(d),
            None => SelectionKey::Other,
        }
    }

    /// Maps the key onto the list. Digits outside `1..=len` and non-digits
    /// both resolve to `None`, which the caller treats as quitting.
    pub fn resolve(self, suggestions: &SuggestionList) -> Option<String> {
        match self {
            SelectionKey::Digit(d) => suggestions.get(d as usize).map(str::to_string),
            SelectionKey::Other => None,
        }
    }
}

/// Writes the numbered suggestion list and the selection prompt.
pub fn render_suggestions<W: Write>(suggestions: &SuggestionList, output: &mut W) -> io::Result<()> {
    writeln!(output, "{}", "Did you mean:".cyan())?;
    for (i, command) in suggestions.iter().enumerate() {
        writeln!(output, "{}", format!("{}. {}", i + 1, command).yellow())?;
    }
    writeln!(
        output,
        "Enter a number 1 - {} of command to run, or q to quit\n",
        suggestions.len()
    )?;
    output.flush()
}

/// Trait for the source of the selection keypress.
pub trait KeySource {
    /// Blocks until exactly one key is available.
    fn read_key(&mut self) -> Result<SelectionKey>;
}

/// Reads one key from the controlling terminal, or one byte from stdin
/// when stdin is not a terminal.
pub struct TerminalKeys {
    timeout: Option<Duration>,
}

impl TerminalKeys {
    /// `timeout` bounds the terminal wait; an expired wait reads as a
    /// non-digit key. Piped input is never timed out.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn read_raw_key(&self) -> Result<SelectionKey> {
        let _raw = RawModeGuard::enable()?;
        let deadline = self.timeout.map(|limit| Instant::now() + limit);

        loop {
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if !event::poll(remaining)? {
                    info!("Selection timed out");
                    return Ok(SelectionKey::Other);
                }
            }

            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    debug!("Key pressed: {:?}", key.code);
                    return Ok(match key.code {
                        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                            SelectionKey::from_char(c)
                        }
                        _ => SelectionKey::Other,
                    });
                }
                _ => continue,
            }
        }
    }

    fn read_piped_byte(&self) -> Result<SelectionKey> {
        let mut byte = [0u8; 1];
        let read = io::stdin().lock().read(&mut byte)?;
        if read == 0 {
            debug!("stdin closed before a key arrived");
            return Ok(SelectionKey::Other);
        }
        Ok(SelectionKey::from_char(char::from(byte[0])))
    }
}

impl KeySource for TerminalKeys {
    fn read_key(&mut self) -> Result<SelectionKey> {
        if io::stdin().is_terminal() {
            self.read_raw_key()
        } else {
            self.read_piped_byte()
        }
    }
}

/// Keeps the terminal in raw mode until dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(commands: &[&str]) -> SuggestionList {
        SuggestionList::new(commands.iter().map(|c| c.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_digit_chars_become_digits() {
        assert_eq!(SelectionKey::from_char('1'), SelectionKey::Digit(1));
        assert_eq!(SelectionKey::from_char('9'), SelectionKey::Digit(9));
        assert_eq!(SelectionKey::from_char('0'), SelectionKey::Digit(0));
    }

    #[test]
    fn test_other_chars_are_other() {
        assert_eq!(SelectionKey::from_char('q'), SelectionKey::Other);
        assert_eq!(SelectionKey::from_char(' '), SelectionKey::Other);
        assert_eq!(SelectionKey::from_char('\n'), SelectionKey::Other);
    }

    #[test]
    fn test_resolve_in_range_digit() {
        let suggestions = list(&["ls /", "ls ."]);

        assert_eq!(SelectionKey::Digit(2).resolve(&suggestions), Some("ls .".to_string()));
    }

    #[test]
    fn test_resolve_out_of_range_digits() {
        assert_eq!(SelectionKey::Digit(0).resolve(&list(&["a"])), None);
        assert_eq!(SelectionKey::Digit(2).resolve(&list(&["a"])), None);
        assert_eq!(SelectionKey::Digit(9).resolve(&list(&["a", "b", "c"])), None);
    }

    #[test]
    fn test_resolve_other_key() {
        assert_eq!(SelectionKey::Other.resolve(&list(&["a"])), None);
    }

    #[test]
    fn test_render_numbers_from_one() {
        let mut output = Vec::new();

        render_suggestions(&list(&["ls /", "ls ."]), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Did you mean:"));
        assert!(text.contains("1. ls /"));
        assert!(text.contains("2. ls ."));
        assert!(!text.contains("3."));
        assert!(text.contains("Enter a number 1 - 2 of command to run, or q to quit"));
    }
}
