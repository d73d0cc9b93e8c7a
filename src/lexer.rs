//! Lexical analysis of a command line: stages separated by `|`, words separated
//! by whitespace.
//!
//! There is no quoting or escaping, so a literal `|` can't be passed to a command.

use crate::error::{Result, ShellError};

const PIPE: char = '|';

/// Splits `line` into pipeline stages, each a non-empty list of words.
///
/// Runs of whitespace collapse, leading and trailing whitespace is dropped.
///
/// # Errors
/// [`ShellError::EmptyLine`] when the line holds nothing but whitespace,
/// [`ShellError::EmptyStage`] when one of the stages has no words.
pub(crate) fn split_into_stages(line: &str) -> Result<Vec<Vec<&str>>> {
    if line.trim().is_empty() {
        return Err(ShellError::EmptyLine);
    }

    line.split(PIPE)
        .enumerate()
        .map(|(index, stage)| {
            let words: Vec<&str> = stage.split_whitespace().collect();
            if words.is_empty() {
                Err(ShellError::EmptyStage(index))
            } else {
                Ok(words)
            }
        })
        .collect()
}
