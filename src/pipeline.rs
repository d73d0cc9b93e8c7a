//! Turning a command line into a sequence of commands and running them as a
//! pipeline.

use crate::command::{Command, ExitCode, Stdout};
use crate::error::{Result, ShellError};
use crate::external::ExternalCommand;
use crate::lexer;
use crate::registry::Registry;
use std::io::{self, PipeReader};
use tracing::{debug, warn};

/// Builds the commands of `line` in pipe order.
///
/// The first word of every stage is looked up in the registry; names it does
/// not know become [`ExternalCommand`]s. Arguments are parsed right away, but
/// nothing runs and unknown programs are only detected when executed.
///
/// # Errors
/// [`ShellError::EmptyLine`] for a blank line and [`ShellError::EmptyStage`]
/// when a stage between pipes has no words.
pub fn construct(registry: &Registry, line: &str) -> Result<Vec<Box<dyn Command>>> {
    let stages = lexer::split_into_stages(line)?;
    let mut commands = Vec::with_capacity(stages.len());

    for (index, words) in stages.iter().enumerate() {
        let Some((name, args)) = words.split_first() else {
            return Err(ShellError::EmptyStage(index));
        };

        let command = match registry.create(name) {
            Some(mut builtin) => {
                builtin.parse_args(args);
                builtin
            }
            None => {
                let mut external = ExternalCommand::new(registry.session().clone());
                external.parse_args(words);
                Box::new(external) as Box<dyn Command>
            }
        };
        debug!(stage = index, name, builtin = registry.contains(name), "constructed stage");
        commands.push(command);
    }

    Ok(commands)
}

/// Failure of one stage. Other stages are not affected by it.
#[derive(Debug)]
pub struct StageError {
    /// Position of the stage in the pipeline, starting at 0.
    pub stage: usize,
    pub error: ShellError,
}

/// What a pipeline produced.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    /// Captured stdout of the last stage.
    pub stdout: Vec<u8>,
    /// Exit code of the last stage.
    pub status: ExitCode,
    /// Stage failures ordered by stage.
    pub errors: Vec<StageError>,
}

impl PipelineOutcome {
    pub fn first_failure(&self) -> Option<&StageError> {
        self.errors.first()
    }
}

/// Runs `stages` with their error streams bound to the process stderr.
pub fn execute(stages: Vec<Box<dyn Command>>) -> Result<PipelineOutcome> {
    execute_with_stderr(stages, || Box::new(io::stderr()))
}

/// Wires and runs `stages`, binding every error stream to a fresh `stderr()`.
///
/// Stage *i* is connected to stage *i + 1* through a pipe and run before the
/// next one is wired, so builtins finish and external programs are started in
/// order. The output of the last stage is captured, then every earlier stage
/// is reaped.
///
/// # Errors
/// Only [`ShellError::Pipe`]: when a pipe can't be created, stages already
/// started are killed and reaped, and nothing else runs. Any other failure is
/// recorded in [`PipelineOutcome::errors`].
pub fn execute_with_stderr(
    mut stages: Vec<Box<dyn Command>>,
    stderr: impl Fn() -> Box<dyn Stdout>,
) -> Result<PipelineOutcome> {
    let Some(mut last) = stages.pop() else {
        return Err(ShellError::EmptyLine);
    };

    let mut outcome = PipelineOutcome::default();
    let mut started: Vec<Box<dyn Command>> = Vec::with_capacity(stages.len());
    let mut pending_stdin: Option<PipeReader> = None;

    for (index, mut stage) in stages.into_iter().enumerate() {
        if let Some(stdin) = pending_stdin.take() {
            stage.set_stdin(Box::new(stdin));
        }
        let reader = match stage.stdout_pipe() {
            Ok(reader) => reader,
            Err(source) => {
                warn!(stage = index, error = %source, "pipe creation failed, aborting pipeline");
                let name = stage.name().to_string();
                // Closes the read end it was given, so upstream writers can finish.
                drop(stage);
                abort_all(&mut started);
                return Err(ShellError::Pipe { name, source });
            }
        };
        stage.set_stderr(stderr());
        if let Err(error) = stage.run() {
            warn!(stage = index, error = %error, "stage failed");
            outcome.errors.push(StageError {
                stage: index,
                error,
            });
        }
        pending_stdin = Some(reader);
        started.push(stage);
    }

    let last_index = started.len();
    if let Some(stdin) = pending_stdin {
        last.set_stdin(Box::new(stdin));
    }
    last.set_stderr(stderr());
    match last.output() {
        Ok(stdout) => outcome.stdout = stdout,
        // A non-zero status is reported through `status`, not as an error.
        Err(ShellError::Exited { stdout, .. }) => outcome.stdout = stdout,
        Err(error) => {
            warn!(stage = last_index, error = %error, "stage failed");
            outcome.errors.push(StageError {
                stage: last_index,
                error,
            });
        }
    }
    outcome.status = match last.wait() {
        Ok(code) => code,
        Err(error) => {
            let code = error.exit_code();
            outcome.errors.push(StageError {
                stage: last_index,
                error,
            });
            code
        }
    };

    for (index, stage) in started.iter_mut().enumerate() {
        match stage.wait() {
            Ok(code) => debug!(stage = index, code, "stage reaped"),
            Err(error) => outcome.errors.push(StageError {
                stage: index,
                error,
            }),
        }
    }
    outcome.errors.sort_by_key(|e| e.stage);

    Ok(outcome)
}

fn abort_all(started: &mut [Box<dyn Command>]) {
    for stage in started.iter_mut() {
        stage.abort();
        if let Err(err) = stage.wait() {
            debug!(command = stage.name(), error = %err, "reaping aborted stage failed");
        }
    }
}
