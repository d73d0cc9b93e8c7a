use crate::command::ExitCode;
use nix::unistd::{Gid, Group, Uid, User};
use std::cell::RefCell;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;
use std::rc::Rc;

/// Shared handle to the session, handed to every command at construction.
///
/// The interpreter runs one line at a time on one thread, so a `RefCell` is enough.
pub type SessionHandle = Rc<RefCell<Session>>;

/// Mutable state shared by the commands of one interpreter run.
///
/// The session contains:
/// - `vars`: environment variables visible to executed commands (`PATH`, `HOME`, ...).
/// - `current_dir`: the working directory, changed by `cd`.
/// - `user` and `group`: names shown in the prompt.
/// - `exit_code`: set by `exit`; the REPL stops once it holds a value.
#[derive(Debug, Clone)]
pub struct Session {
    pub vars: HashMap<String, String>,
    pub current_dir: PathBuf,
    pub user: String,
    pub group: String,
    pub exit_code: Option<ExitCode>,
}

impl Session {
    /// Capture the state of the current process.
    ///
    /// User and group names come from the passwd and group databases; when an
    /// entry is missing the numeric id is used instead.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            user: current_user_name(),
            group: current_group_name(),
            exit_code: None,
        }
    }

    /// Wrap the session into a shareable handle.
    pub fn into_handle(self) -> SessionHandle {
        Rc::new(RefCell::new(self))
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Home directory: `HOME` if set, otherwise the passwd entry of the current user.
    pub fn home_dir(&self) -> Option<PathBuf> {
        if let Some(home) = self.get_var("HOME").filter(|h| !h.is_empty()) {
            return Some(PathBuf::from(home));
        }
        User::from_uid(Uid::current()).ok().flatten().map(|u| u.dir)
    }

    /// Prompt shown before each line, `user@group:cwd$ `.
    pub fn prompt(&self) -> String {
        format!(
            "{}@{}:{}$ ",
            self.user,
            self.group,
            self.current_dir.display()
        )
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn current_user_name() -> String {
    let uid = Uid::current();
    match User::from_uid(uid) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

fn current_group_name() -> String {
    let gid = Gid::current();
    match Group::from_gid(gid) {
        Ok(Some(group)) => group.name,
        _ => gid.to_string(),
    }
}
