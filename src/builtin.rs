use crate::command::{Command, ExitCode, InheritedStdin, Stdin, Stdout, Streams};
use crate::error::{Result, ShellError};
use crate::io_adapters::MemWriter;
use crate::registry::{CommandFactory, Factory};
use crate::session::{Session, SessionHandle};
use anyhow::{Context, anyhow};
use argh::{EarlyExit, FromArgs};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::env;
use std::fs;
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use sysinfo::System;
use tracing::{debug, warn};

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process. They are wrapped into a
/// [`Builtin`] to take part in pipelines.
pub trait BuiltinCommand: Sized + FromArgs + 'static {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and session.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    /// An `Err` is printed to the command's stderr and turns into status 1.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> anyhow::Result<ExitCode>;
}

/// Adapter running a [`BuiltinCommand`] behind the [`Command`] contract.
pub struct Builtin<T> {
    session: SessionHandle,
    argv: Vec<String>,
    parsed: Option<std::result::Result<T, EarlyExit>>,
    streams: Streams,
    /// Write end handed out by `stdout_pipe`, filled once the builtin has run.
    pipe: Option<PipeWriter>,
    drain: Option<JoinHandle<io::Result<()>>>,
    captured: Vec<u8>,
    status: Option<ExitCode>,
}

impl<T: BuiltinCommand> Builtin<T> {
    /// Fresh command bound to the interpreter's streams.
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            argv: Vec::new(),
            parsed: None,
            streams: Streams::default(),
            pipe: None,
            drain: None,
            captured: Vec::new(),
            status: None,
        }
    }

    fn execute_parsed(&mut self, parsed: std::result::Result<T, EarlyExit>) -> Result<ExitCode> {
        let mut stdout = Recorder {
            inner: &mut self.streams.stdout,
            record: &mut self.captured,
        };
        match parsed {
            Ok(cmd) => {
                let mut session = self.session.borrow_mut();
                match cmd.execute(&mut self.streams.stdin, &mut stdout, &mut session) {
                    Ok(code) => Ok(code),
                    Err(err) => {
                        writeln!(self.streams.stderr, "{err:#}")?;
                        Ok(1)
                    }
                }
            }
            // --help lands here with an Ok status
            Err(EarlyExit {
                output,
                status: Ok(()),
            }) => {
                writeln!(stdout, "{}", output.trim_end())?;
                Ok(0)
            }
            Err(EarlyExit { output, .. }) => {
                writeln!(self.streams.stderr, "{}", output.trim_end())?;
                Ok(1)
            }
        }
    }
}

impl<T: BuiltinCommand> Command for Builtin<T> {
    fn name(&self) -> &str {
        T::name()
    }

    fn args(&self) -> &[String] {
        &self.argv
    }

    fn parse_args(&mut self, args: &[&str]) {
        self.argv = args.iter().map(|a| a.to_string()).collect();
        self.parsed = Some(T::from_args(&[T::name()], args));
    }

    fn set_stdin(&mut self, stdin: Box<dyn Stdin>) {
        self.streams.stdin = stdin;
    }

    fn set_stdout(&mut self, stdout: Box<dyn Stdout>) {
        self.streams.stdout = stdout;
        self.pipe = None;
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

    /// Output is buffered while the builtin runs and written into the pipe by
    /// a background thread, so a large output never blocks the pipeline.
    fn stdout_pipe(&mut self) -> io::Result<PipeReader> {
        let (reader, writer) = io::pipe()?;
        self.set_stdout(Box::new(MemWriter::new()));
        self.pipe = Some(writer);
        Ok(reader)
    }

    fn run(&mut self) -> Result<()> {
        if self.status.is_some() {
            return Err(ShellError::AlreadyRun(T::name().to_string()));
        }
        let parsed = self
            .parsed
            .take()
            .ok_or_else(|| ShellError::NotParsed(T::name().to_string()))?;

        let result = self.execute_parsed(parsed);
        if let Err(err) = self.streams.stdout.flush() {
            debug!(command = T::name(), error = %err, "flushing stdout failed");
        }
        // Upstream writers get EPIPE instead of blocking on a reader nobody drains.
        self.streams.stdin = Box::new(InheritedStdin::default());
        if let Some(pipe) = self.pipe.take() {
            self.streams.stdout = Box::new(io::stdout());
            self.drain = Some(drain_into(pipe, self.captured.clone()));
        }

        let status = match result {
            Ok(status) => status,
            Err(err) => {
                self.status = Some(1);
                return Err(err);
            }
        };
        debug!(command = T::name(), status, "builtin finished");
        self.status = Some(status);
        Ok(())
    }

    /// Runs the builtin if needed, capturing instead of printing, and returns
    /// what it wrote to stdout. Repeated calls return the same bytes.
    fn output(&mut self) -> Result<Vec<u8>> {
        if self.status.is_none() {
            self.set_stdout(Box::new(MemWriter::new()));
            self.run()?;
        }
        Ok(self.captured.clone())
    }

    fn wait(&mut self) -> Result<ExitCode> {
        if let Some(drain) = self.drain.take() {
            match drain.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(command = T::name(), error = %err, "reader went away before the end of output")
                }
                Err(_) => warn!(command = T::name(), "pipe writer thread panicked"),
            }
        }
        Ok(self.status.unwrap_or(0))
    }
}

/// Writes `bytes` into `pipe` and closes it, so the reader sees EOF.
fn drain_into(mut pipe: PipeWriter, bytes: Vec<u8>) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || pipe.write_all(&bytes))
}

impl<T: BuiltinCommand> CommandFactory for Factory<T> {
    fn create(&self, session: &SessionHandle) -> Box<dyn Command> {
        Box::new(Builtin::<T>::new(session.clone()))
    }
}

/// Forwards writes and keeps a copy of everything that got through.
struct Recorder<'a> {
    inner: &'a mut dyn Write,
    record: &'a mut Vec<u8>,
}

impl Write for Recorder<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.record.extend_from_slice(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> anyhow::Result<ExitCode> {
        writeln!(stdout, "{}", session.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

/// Change the current working directory.
/// If no target is provided, changes to the home directory.
///
/// The single argument is always a path, even when it looks like an option or
/// reads `help`.
pub struct Cd {
    pub target: Option<String>,
}

impl FromArgs for Cd {
    fn from_args(command_name: &[&str], args: &[&str]) -> std::result::Result<Self, EarlyExit> {
        match args {
            [] => Ok(Self { target: None }),
            [target] => Ok(Self {
                target: Some(target.to_string()),
            }),
            [_, extra, ..] => Err(EarlyExit {
                output: format!("{}: too many arguments: {extra}", command_name.join(" ")),
                status: Err(()),
            }),
        }
    }
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        session: &mut Session,
    ) -> anyhow::Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => session
                .home_dir()
                .ok_or_else(|| anyhow!("cd: no target and HOME not set"))?,
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            session.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        session.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional)]
    /// exit status; 1 when omitted or not a number.
    pub code: Option<String>,
}

impl Exit {
    fn code(&self) -> ExitCode {
        self.code
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(1)
    }
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    /// Records the request in the session, the REPL terminates the process.
    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        session: &mut Session,
    ) -> anyhow::Result<ExitCode> {
        let code = self.code();
        session.exit_code = Some(code);
        Ok(code)
    }
}

/// Write the arguments to standard output, separated by spaces.
///
/// Arguments are printed verbatim, including ones starting with `-`. Only an
/// exact `-n` in first position is taken as a flag and drops the trailing newline.
pub struct Echo {
    pub no_newline: bool,
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> std::result::Result<Self, EarlyExit> {
        let (no_newline, rest) = match args {
            ["-n", rest @ ..] => (true, rest),
            _ => (false, args),
        };
        Ok(Self {
            no_newline,
            args: rest.iter().map(|a| a.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _session: &mut Session,
    ) -> anyhow::Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// list running processes as `pid<TAB>name`, ordered by pid.
pub struct Ps {}

impl BuiltinCommand for Ps {
    fn name() -> &'static str {
        "ps"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _session: &mut Session,
    ) -> anyhow::Result<ExitCode> {
        let system = System::new_all();
        let mut processes: Vec<_> = system
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .collect();
        processes.sort_by_key(|(pid, _)| pid.as_u32());

        for (pid, process) in processes {
            writeln!(stdout, "{}\t{}", pid, process.name().to_string_lossy())?;
        }
        Ok(0)
    }
}

/// Terminate a process with SIGKILL.
///
/// Takes exactly one positive process id. Anything else, including no
/// argument, extra arguments or option-like tokens, is ignored.
pub struct Kill {
    pub args: Vec<String>,
}

impl FromArgs for Kill {
    fn from_args(_command_name: &[&str], args: &[&str]) -> std::result::Result<Self, EarlyExit> {
        Ok(Self {
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }
}

impl Kill {
    fn pid(&self) -> Option<Pid> {
        let [target] = self.args.as_slice() else {
            return None;
        };
        target
            .parse::<i32>()
            .ok()
            .filter(|pid| *pid > 0)
            .map(Pid::from_raw)
    }
}

impl BuiltinCommand for Kill {
    fn name() -> &'static str {
        "kill"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _session: &mut Session,
    ) -> anyhow::Result<ExitCode> {
        let Some(pid) = self.pid() else {
            debug!(args = ?self.args, "kill: not a single process id, nothing to do");
            return Ok(0);
        };
        signal::kill(pid, Signal::SIGKILL).with_context(|| format!("kill: ({pid})"))?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fixture_handle, fixture_session, lock_current_dir};
    use std::env as stdenv;
    use std::io::Cursor;
    use std::path::Path;

    fn parsed<T: BuiltinCommand>(session: &SessionHandle, args: &[&str]) -> Builtin<T> {
        let mut cmd = Builtin::<T>::new(session.clone());
        cmd.parse_args(args);
        cmd
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let mut session = fixture_session(Path::new("/some/where"));

        let mut out = Vec::new();
        let cmd = Pwd {};
        let res = cmd.execute(&mut Cursor::new(Vec::new()), &mut out, &mut session);

        assert_eq!(res.unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "/some/where\n");
    }

    #[test]
    fn test_pwd_output_is_idempotent() {
        let session = fixture_handle(Path::new("/srv/data"));
        let stdout = MemWriter::new();

        let mut pwd = parsed::<Pwd>(&session, &[]);
        pwd.set_stdout(Box::new(stdout.clone()));
        pwd.run().unwrap();

        let first = pwd.output().unwrap();
        let second = pwd.output().unwrap();
        assert_eq!(first, b"/srv/data\n");
        assert_eq!(first, second);
        // Nothing was written a second time.
        assert_eq!(stdout.text(), "/srv/data\n");
    }

    #[test]
    fn test_output_captures_instead_of_printing() {
        let session = fixture_handle(Path::new("/"));
        let mut echo = parsed::<Echo>(&session, &["a", "b", "c"]);
        assert_eq!(echo.output().unwrap(), b"a b c\n");
        assert_eq!(echo.wait().unwrap(), 0);
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let mut session = fixture_session(Path::new("/"));

        // With newline
        let mut out1 = Vec::new();
        let echo1 = Echo {
            no_newline: false,
            args: vec!["hello".to_string(), "world".to_string()],
        };
        let res1 = echo1.execute(&mut Cursor::new(Vec::new()), &mut out1, &mut session);

        assert!(res1.is_ok());
        assert_eq!(String::from_utf8(out1).unwrap(), "hello world\n");

        // Without newline
        let mut out2 = Vec::new();
        let echo2 = Echo {
            no_newline: true,
            args: vec!["foo".to_string(), "bar".to_string()],
        };
        let res2 = echo2.execute(&mut Cursor::new(Vec::new()), &mut out2, &mut session);

        assert!(res2.is_ok());
        assert_eq!(String::from_utf8(out2).unwrap(), "foo bar");
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(temp.path()).expect("canonicalize failed");

        // save cwd to restore later
        let orig = stdenv::current_dir().unwrap();
        let mut session = fixture_session(&orig);

        let cmd = Cd {
            target: Some(canonical_temp.to_string_lossy().to_string()),
        };
        let res = cmd.execute(&mut Cursor::new(Vec::new()), &mut Vec::new(), &mut session);
        let new_cwd = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
        assert_eq!(session.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(temp.path()).expect("canonicalize failed");

        let orig = stdenv::current_dir().unwrap();
        let mut session = fixture_session(&orig);
        session.set_var("HOME", canonical_temp.to_string_lossy().to_string());

        let cmd = Cd { target: None };
        let res = cmd.execute(&mut Cursor::new(Vec::new()), &mut Vec::new(), &mut session);
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(session.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_failure_reports_and_keeps_state() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let session = fixture_handle(&orig);
        let stderr = MemWriter::new();

        let name = format!("nonexistent_dir_for_cd_test_{}", std::process::id());
        let mut cd = parsed::<Cd>(&session, &[name.as_str()]);
        cd.set_stderr(Box::new(stderr.clone()));

        assert!(cd.run().is_ok());
        assert_eq!(cd.wait().unwrap(), 1);
        assert!(stderr.text().contains("cd: can't canonicalize"));
        assert_eq!(session.borrow().current_dir, orig);
        assert_eq!(stdenv::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_kill_ignores_malformed_pid() {
        let session = fixture_handle(Path::new("/"));

        for args in [&["notanumber"][..], &["-abc"], &["-1"], &[], &["notanumber", "extra"]] {
            let stderr = MemWriter::new();
            let mut kill = parsed::<Kill>(&session, args);
            kill.set_stderr(Box::new(stderr.clone()));

            assert_eq!(kill.output().unwrap(), b"", "{args:?}");
            assert_eq!(kill.wait().unwrap(), 0, "{args:?}");
            assert_eq!(stderr.text(), "", "{args:?}");
        }
    }

    #[test]
    fn test_kill_needs_exactly_one_positive_pid() {
        for args in [&["0"][..], &["-1"], &["-abc"], &[], &["12", "34"]] {
            let kill = Kill::from_args(&["kill"], args).unwrap();
            assert!(kill.pid().is_none(), "{args:?}");
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_kill_terminates_process() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let session = fixture_handle(Path::new("/"));

        let pid = child.id().to_string();
        let mut kill = parsed::<Kill>(&session, &[pid.as_str()]);
        kill.run().unwrap();

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGKILL as i32));
    }

    #[test]
    fn test_kill_reports_missing_process() {
        let session = fixture_handle(Path::new("/"));
        let stderr = MemWriter::new();

        // Above the default pid_max, so nothing can own it.
        let mut kill = parsed::<Kill>(&session, &["2147483646"]);
        kill.set_stderr(Box::new(stderr.clone()));
        kill.run().unwrap();

        assert_eq!(kill.wait().unwrap(), 1);
        assert!(stderr.text().starts_with("kill: (2147483646)"));
    }

    #[test]
    fn test_ps_lists_current_process() {
        let mut session = fixture_session(Path::new("/"));
        let mut out = Vec::new();
        Ps {}
            .execute(&mut Cursor::new(Vec::new()), &mut out, &mut session)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let me = std::process::id().to_string();
        assert!(
            text.lines()
                .any(|line| line.split('\t').next() == Some(me.as_str())),
            "own pid {me} missing from ps output"
        );
    }

    #[test]
    fn test_exit_records_code() {
        let session = fixture_handle(Path::new("/"));

        let mut exit = parsed::<Exit>(&session, &["3"]);
        exit.run().unwrap();
        assert_eq!(exit.wait().unwrap(), 3);
        assert_eq!(session.borrow().exit_code, Some(3));

        let mut exit = parsed::<Exit>(&session, &[]);
        exit.run().unwrap();
        assert_eq!(session.borrow().exit_code, Some(1));

        let mut exit = parsed::<Exit>(&session, &["soon"]);
        exit.run().unwrap();
        assert_eq!(session.borrow().exit_code, Some(1));
    }

    #[test]
    fn test_invalid_args_reported_at_run() {
        let session = fixture_handle(Path::new("/"));
        let stderr = MemWriter::new();

        let mut pwd = parsed::<Pwd>(&session, &["--bogus"]);
        pwd.set_stderr(Box::new(stderr.clone()));

        assert!(pwd.run().is_ok());
        assert_eq!(pwd.wait().unwrap(), 1);
        assert!(stderr.text().contains("--bogus"));
    }

    #[test]
    fn test_run_requires_parsed_args_and_runs_once() {
        let session = fixture_handle(Path::new("/"));

        let mut pwd = Builtin::<Pwd>::new(session.clone());
        assert!(matches!(pwd.run(), Err(ShellError::NotParsed(_))));

        let mut echo = parsed::<Echo>(&session, &["once"]);
        echo.set_stdout(Box::new(MemWriter::new()));
        echo.run().unwrap();
        assert!(matches!(echo.run(), Err(ShellError::AlreadyRun(_))));
    }

    #[test]
    fn test_stdout_pipe_is_released_after_run() {
        let session = fixture_handle(Path::new("/"));
        let mut echo = parsed::<Echo>(&session, &["through", "the", "pipe"]);

        let mut reader = echo.stdout_pipe().unwrap();
        echo.run().unwrap();

        // Would block forever if the write end were still open.
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "through the pipe\n");
        assert_eq!(echo.wait().unwrap(), 0);
    }

    #[test]
    fn test_large_output_does_not_block_on_pipe() {
        let session = fixture_handle(Path::new("/"));
        let words = vec!["abcdefgh"; 20_000];
        let mut echo = parsed::<Echo>(&session, &words);

        let mut reader = echo.stdout_pipe().unwrap();
        // Far above the pipe buffer; returns before anything is read.
        echo.run().unwrap();

        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 20_000 * 9);
        assert_eq!(echo.wait().unwrap(), 0);
    }

    #[test]
    fn test_pipe_output_dropped_by_reader() {
        let session = fixture_handle(Path::new("/"));
        let words = vec!["abcdefgh"; 20_000];
        let mut echo = parsed::<Echo>(&session, &words);

        let reader = echo.stdout_pipe().unwrap();
        echo.run().unwrap();
        drop(reader);

        assert_eq!(echo.wait().unwrap(), 0);
    }

    #[test]
    fn test_echo_prints_option_like_words_verbatim() {
        let session = fixture_handle(Path::new("/"));

        let cases: [(&[&str], &str); 6] = [
            (&["-x", "foo"], "-x foo\n"),
            (&["-5"], "-5\n"),
            (&["help"], "help\n"),
            (&["--help"], "--help\n"),
            (&["a", "-n"], "a -n\n"),
            (&["-n", "-n", "b"], "-n b"),
        ];
        for (args, expected) in cases {
            let stderr = MemWriter::new();
            let mut echo = parsed::<Echo>(&session, args);
            echo.set_stderr(Box::new(stderr.clone()));

            assert_eq!(String::from_utf8(echo.output().unwrap()).unwrap(), expected);
            assert_eq!(echo.wait().unwrap(), 0);
            assert_eq!(stderr.text(), "");
        }
    }

    #[test]
    fn test_cd_help_is_a_directory_name() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(temp.path()).unwrap();
        fs::create_dir(base.join("help")).unwrap();
        let session = fixture_handle(&base);

        let mut cd = parsed::<Cd>(&session, &["help"]);
        let out = cd.output().unwrap();
        stdenv::set_current_dir(&orig).unwrap();

        assert!(out.is_empty());
        assert_eq!(cd.wait().unwrap(), 0);
        assert_eq!(session.borrow().current_dir, base.join("help"));
    }

    #[test]
    fn test_cd_rejects_extra_arguments() {
        let session = fixture_handle(Path::new("/"));
        let stderr = MemWriter::new();

        let mut cd = parsed::<Cd>(&session, &["/tmp", "/var"]);
        cd.set_stderr(Box::new(stderr.clone()));
        cd.run().unwrap();

        assert_eq!(cd.wait().unwrap(), 1);
        assert!(stderr.text().contains("too many arguments"));
        assert_eq!(session.borrow().current_dir, Path::new("/"));
    }

    struct BrokenStream;

    impl Write for BrokenStream {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Stdout for BrokenStream {
        fn stdio(self: Box<Self>) -> std::process::Stdio {
            std::process::Stdio::null()
        }
    }

    #[test]
    fn test_failed_report_still_counts_as_run() {
        let session = fixture_handle(Path::new("/"));
        let mut pwd = parsed::<Pwd>(&session, &["--bogus"]);
        pwd.set_stderr(Box::new(BrokenStream));

        assert!(matches!(pwd.run(), Err(ShellError::Io(_))));
        assert!(matches!(pwd.run(), Err(ShellError::AlreadyRun(_))));
        assert_eq!(pwd.wait().unwrap(), 1);
    }
}
