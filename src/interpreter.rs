use crate::command::ExitCode;
use crate::error::ShellError;
use crate::pipeline::{self, PipelineOutcome};
use crate::registry::Registry;
use crate::session::{Session, SessionHandle};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;
use tracing::debug;

/// A minimal shell-like interpreter that runs pipelines of built-in and
/// external commands.
///
/// The interpreter owns a [`Registry`] of builtins and shares its session with
/// every command it builds. See [`Default`] for the builtins included out of
/// the box.
///
/// Example
/// ```
/// use my_little_shell::Interpreter;
/// let mut sh = Interpreter::default();
/// let outcome = sh.run_line("echo hello   world").unwrap();
/// assert_eq!(outcome.stdout, b"hello world\n");
/// assert_eq!(outcome.status, 0);
/// ```
pub struct Interpreter {
    session: SessionHandle,
    registry: Registry,
}

impl Interpreter {
    /// Create an interpreter around an existing registry, sharing its session.
    pub fn new(registry: Registry) -> Self {
        Self {
            session: registry.session().clone(),
            registry,
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Build and run the pipeline described by `line`.
    ///
    /// Returns the captured output of the last stage together with its status
    /// and the failures of individual stages.
    pub fn run_line(&mut self, line: &str) -> crate::Result<PipelineOutcome> {
        let stages = pipeline::construct(&self.registry, line)?;
        debug!(line, stages = stages.len(), "running pipeline");
        pipeline::execute(stages)
    }

    /// Exit code requested by the `exit` builtin, if it ran.
    pub fn exit_requested(&self) -> Option<ExitCode> {
        self.session.borrow().exit_code
    }

    /// Read-Eval-Print Loop over the terminal.
    ///
    /// Returns the code requested through `exit`, or `None` when input ends.
    pub fn repl(&mut self) -> rustyline::Result<Option<ExitCode>> {
        let mut rl = DefaultEditor::new()?;

        loop {
            let prompt = self.session.borrow().prompt();
            match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.eval_and_print(&line);
                    if let Some(code) = self.exit_requested() {
                        return Ok(Some(code));
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Ok(None),
                Err(err) => return Err(err),
            }
        }
    }

    /// Run `line`, print its output to stdout and every failure to stderr.
    ///
    /// Returns the status of the last stage.
    pub fn eval_and_print(&mut self, line: &str) -> ExitCode {
        match self.run_line(line) {
            Ok(outcome) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(err) = stdout.write_all(&outcome.stdout).and_then(|()| stdout.flush()) {
                    debug!(error = %err, "failed to print pipeline output");
                }
                for failure in &outcome.errors {
                    eprintln!("{}", failure.error);
                }
                outcome.status
            }
            Err(ShellError::EmptyLine) => 0,
            Err(err) => {
                eprintln!("{err}");
                err.exit_code()
            }
        }
    }
}

impl Default for Interpreter {
    /// Interpreter over the current process state with the default builtins:
    /// `pwd`, `echo`, `cd`, `ps` and `kill`.
    fn default() -> Self {
        Self::new(Registry::with_builtins(Session::new().into_handle()))
    }
}
