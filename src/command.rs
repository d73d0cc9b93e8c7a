use crate::error::Result;
use std::io::{self, PipeReader, Read, Write};
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Abstraction over a readable input stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// A blanket implementation exists for any type that implements `Read` and
/// `Into<Stdio>` (e.g. `File`, `PipeReader` or `ChildStdout`).
pub trait Stdin: Read {
    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Read + Into<Stdio>> Stdin for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Abstraction over a writable output stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// A blanket implementation exists for any type that implements `Write` and `Into<Stdio>`.
pub trait Stdout: Write {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Write + Into<Stdio>> Stdout for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Standard input of the interpreter itself.
///
/// `io::Stdin` can't be turned into a `Stdio`, so children get `Stdio::inherit()`.
pub struct InheritedStdin(io::Stdin);

impl Default for InheritedStdin {
    fn default() -> Self {
        Self(io::stdin())
    }
}

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Stdin for InheritedStdin {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

/// The three stream roles every command carries.
pub struct Streams {
    pub stdin: Box<dyn Stdin>,
    pub stdout: Box<dyn Stdout>,
    pub stderr: Box<dyn Stdout>,
}

impl Default for Streams {
    /// Streams of the interpreter process.
    fn default() -> Self {
        Self {
            stdin: Box::new(InheritedStdin::default()),
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }
}

/// Object-safe contract shared by builtins and external programs.
///
/// A command is single use: [`parse_args`](Command::parse_args) first, then
/// either [`run`](Command::run) or [`output`](Command::output), and finally
/// [`wait`](Command::wait) to collect its status. Streams may be rebound at any
/// point before it runs.
pub trait Command {
    /// Name the command was invoked with.
    fn name(&self) -> &str;

    /// Arguments recorded by `parse_args`, without the command name.
    fn args(&self) -> &[String];

    /// Consume the argument tokens of this stage.
    ///
    /// Never fails: malformed arguments are remembered and reported by `run`.
    fn parse_args(&mut self, args: &[&str]);

    fn set_stdin(&mut self, stdin: Box<dyn Stdin>);
    fn set_stdout(&mut self, stdout: Box<dyn Stdout>);
    fn set_stderr(&mut self, stderr: Box<dyn Stdout>);

    fn stdin(&mut self) -> &mut dyn Stdin;
    fn stdout(&mut self) -> &mut dyn Stdout;
    fn stderr(&mut self) -> &mut dyn Stdout;

    /// Create a pipe, bind its write end as this command's stdout and hand the
    /// read end to the caller.
    fn stdout_pipe(&mut self) -> io::Result<PipeReader> {
        let (reader, writer) = io::pipe()?;
        self.set_stdout(Box::new(writer));
        Ok(reader)
    }

    /// Execute against the currently bound streams.
    ///
    /// Builtins finish before returning, external programs are only started.
    fn run(&mut self) -> Result<()>;

    /// Bytes the command produced on stdout, running it first if needed.
    fn output(&mut self) -> Result<Vec<u8>>;

    /// Wait for the command to finish and return its exit code.
    fn wait(&mut self) -> Result<ExitCode>;

    /// Stop a command that is still running. Builtins have nothing to stop.
    fn abort(&mut self) {}
}
