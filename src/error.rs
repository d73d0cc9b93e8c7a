//! Error types for the pipeline engine.

use crate::command::ExitCode;
use std::io;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ShellError>;

/// Errors raised while building, wiring or running a pipeline.
///
/// Builtins never surface their own failures through this type: they report
/// them on their stderr and finish with a non-zero status instead.
#[derive(Error, Debug)]
pub enum ShellError {
    /// The line contained nothing but whitespace.
    #[error("empty command line")]
    EmptyLine,

    /// One of the pipe-separated stages had no words, e.g. `ls | | wc`.
    #[error("syntax error: stage {0} of the pipeline is empty")]
    EmptyStage(usize),

    /// The OS refused to create a pipe between two stages.
    #[error("{name}: failed to create pipe: {source}")]
    Pipe {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The executable could not be resolved.
    #[error("{0}: command not found")]
    NotFound(String),

    /// The executable was found but the process could not be started.
    #[error("{name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The process finished with a non-zero status. `stdout` holds whatever
    /// was captured before it exited.
    #[error("{name}: exited with status {code}")]
    Exited {
        name: String,
        code: ExitCode,
        stdout: Vec<u8>,
    },

    /// Output was requested but stdout is already bound elsewhere or was
    /// consumed by an earlier `run`.
    #[error("{0}: stdout already bound")]
    StdoutBound(String),

    /// `run` was called before `parse_args`.
    #[error("{0}: arguments were not parsed")]
    NotParsed(String),

    /// A command can only be run once.
    #[error("{0}: command already ran")]
    AlreadyRun(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ShellError {
    /// Conventional shell status for a stage that failed with this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ShellError::NotFound(_) => 127,
            ShellError::Spawn { .. } => 126,
            ShellError::Exited { code, .. } => *code,
            _ => 1,
        }
    }
}
