//! Interactive input
//!
//! Stands in for the editor's input boxes. A dismissed prompt (empty input,
//! closed stdin, or no TTY) yields `None` and the calling command does
//! nothing.

use anyhow::Result;
use std::io::{self, BufRead, Write};

/// Prompt for a value, showing the current one
///
/// Returns `None` when the user just presses Enter.
pub fn prompt_with_default(prompt: &str, current: &str) -> Result<Option<String>> {
    if !atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    if current.is_empty() {
        print!("{}: ", prompt);
    } else {
        print!("{} [{}]: ", prompt, current);
    }
    io::stdout().flush()?;

    read_answer(io::stdin().lock())
}

/// Prompt for confirmation
///
/// Returns true if user confirms, false otherwise.
/// In non-interactive mode (no TTY), returns false.
pub fn confirm(prompt: &str) -> Result<bool> {
    if !atty::is(atty::Stream::Stdin) {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let answer = read_answer(io::stdin().lock())?.unwrap_or_default();
    Ok(is_yes(&answer))
}

fn read_answer(mut input: impl BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let line = line.trim();
    if line.is_empty() {
        Ok(None)
    } else {
        Ok(Some(line.to_string()))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_lowercase().as_str(), "y" | "yes")
}
