use crate::command::{Command, ExitCode, Stdin, Stdout, Streams};
use crate::error::{Result, ShellError};
use crate::session::SessionHandle;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use tracing::{debug, warn};

enum Process {
    /// Configured but not started yet.
    Idle,
    Running(Child),
    Finished(ExitCode),
    /// The executable could not be resolved or started.
    Failed(ExitCode),
}

/// Command that is not a builtin: a program launched as a child process.
///
/// Starting and reaping are two separate steps: [`run`](Command::run) spawns
/// and returns right away, [`wait`](Command::wait) or
/// [`output`](Command::output) join the child.
pub struct ExternalCommand {
    session: SessionHandle,
    argv: Vec<String>,
    streams: Streams,
    stdout_bound: bool,
    process: Process,
}

impl ExternalCommand {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            argv: Vec::new(),
            streams: Streams::default(),
            stdout_bound: false,
            process: Process::Idle,
        }
    }

    fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Resolve the program and prepare a process in the session's directory.
    fn prepare(&self) -> Result<std::process::Command> {
        let session = self.session.borrow();
        let search_paths = session.get_var("PATH").unwrap_or_default();
        let executable = find_command_path(
            OsStr::new(&search_paths),
            &session.current_dir,
            Path::new(self.program()),
        )
        .ok_or_else(|| ShellError::NotFound(self.program().to_string()))?;

        let mut cmd = std::process::Command::new(&*executable);
        cmd.args(&self.argv[1..])
            .envs(session.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&session.current_dir);
        Ok(cmd)
    }

    fn spawn(&mut self, stdout: Stdio) -> Result<Child> {
        // Taken before resolving so a failed start still drops the pipe ends.
        let streams = std::mem::take(&mut self.streams);
        let mut cmd = match self.prepare() {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!(program = self.program(), "not found");
                self.process = Process::Failed(err.exit_code());
                return Err(err);
            }
        };

        cmd.stdin(streams.stdin.stdio())
            .stdout(stdout)
            .stderr(streams.stderr.stdio());

        // `cmd` owns the parent's copies of the pipe ends; they close when it drops.
        match cmd.spawn() {
            Ok(child) => {
                debug!(program = self.program(), pid = child.id(), "spawned");
                Ok(child)
            }
            Err(source) => {
                warn!(program = self.program(), error = %source, "failed to start");
                let err = ShellError::Spawn {
                    name: self.program().to_string(),
                    source,
                };
                self.process = Process::Failed(err.exit_code());
                Err(err)
            }
        }
    }
}

impl Command for ExternalCommand {
    fn name(&self) -> &str {
        self.program()
    }

    fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    /// Token 0 is the program, the rest is its argument vector.
    fn parse_args(&mut self, args: &[&str]) {
        self.argv = args.iter().map(|a| a.to_string()).collect();
    }

    fn set_stdin(&mut self, stdin: Box<dyn Stdin>) {
        self.streams.stdin = stdin;
    }

    fn set_stdout(&mut self, stdout: Box<dyn Stdout>) {
        self.streams.stdout = stdout;
        self.stdout_bound = true;
    }

    fn set_stderr(&mut self, stderr: Box<dyn Stdout>) {
        self.streams.stderr = stderr;
    }

    fn stdin(&mut self) -> &mut dyn Stdin {
        self.streams.stdin.as_mut()
    }

    fn stdout(&mut self) -> &mut dyn Stdout {
        self.streams.stdout.as_mut()
    }

    fn stderr(&mut self) -> &mut dyn Stdout {
        self.streams.stderr.as_mut()
    }

    fn run(&mut self) -> Result<()> {
        if !matches!(self.process, Process::Idle) {
            return Err(ShellError::AlreadyRun(self.program().to_string()));
        }
        if self.argv.is_empty() {
            return Err(ShellError::NotParsed(String::new()));
        }
        let stdout = std::mem::replace(&mut self.streams.stdout, Box::new(io::stdout()));
        let child = self.spawn(stdout.stdio())?;
        self.process = Process::Running(child);
        Ok(())
    }

    /// Spawns with stdout captured and waits for the process to exit.
    ///
    /// Fails with [`ShellError::StdoutBound`] when stdout was rebound or the
    /// command was already started with `run`; a started process is still reaped.
    fn output(&mut self) -> Result<Vec<u8>> {
        match self.process {
            Process::Idle => {}
            Process::Running(_) | Process::Finished(_) => {
                self.wait()?;
                return Err(ShellError::StdoutBound(self.program().to_string()));
            }
            Process::Failed(code) => {
                let name = self.program().to_string();
                return Err(if code == 127 {
                    ShellError::NotFound(name)
                } else {
                    ShellError::Spawn {
                        name,
                        source: io::Error::other("could not be started"),
                    }
                });
            }
        }
        if self.stdout_bound {
            return Err(ShellError::StdoutBound(self.program().to_string()));
        }
        if self.argv.is_empty() {
            return Err(ShellError::NotParsed(String::new()));
        }

        let child = self.spawn(Stdio::piped())?;
        let output = child.wait_with_output()?;
        let code = exit_code(output.status);
        self.process = Process::Finished(code);
        debug!(program = self.program(), code, "finished");

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(ShellError::Exited {
                name: self.program().to_string(),
                code,
                stdout: output.stdout,
            })
        }
    }

    fn wait(&mut self) -> Result<ExitCode> {
        match &mut self.process {
            Process::Idle => Ok(0),
            Process::Running(child) => {
                let code = exit_code(child.wait()?);
                debug!(program = self.program(), code, "reaped");
                self.process = Process::Finished(code);
                Ok(code)
            }
            Process::Finished(code) | Process::Failed(code) => Ok(*code),
        }
    }

    fn abort(&mut self) {
        if let Process::Running(child) = &mut self.process {
            if let Err(err) = child.kill() {
                warn!(program = self.program(), error = %err, "failed to kill");
            }
        }
    }
}

fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it names a file.
/// - Relative with multiple components (e.g., `bin/sh`, `./foo`): joined onto
///   `current_dir`, returned if it names a file.
/// - Any name on platforms other than Unix is first tried in `current_dir`.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first match.
/// - Empty path: returns `None`.
///
/// `current_dir` is the directory the child will run in, not necessarily the
/// working directory of this process.
pub fn find_command_path<'a>(
    search_paths: &OsStr,
    current_dir: &Path,
    path: &'a Path,
) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    if cfg!(not(unix)) && !path.as_os_str().is_empty() {
        if let Some(found) = find_by_path(&current_dir.join(path)) {
            return Some(Cow::Owned(found.to_path_buf()));
        }
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        // Single component -> search in PATH
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        // Multiple components -> relative to the session's directory
        _ => find_by_path(&current_dir.join(path)).map(|p| Cow::Owned(p.to_path_buf())),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}
