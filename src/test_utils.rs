//! Shared test helpers.

use crate::session::{Session, SessionHandle};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Serializes tests that read or change the process working directory.
pub fn lock_current_dir() -> MutexGuard<'static, ()> {
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Session with a fixed identity and only `PATH` copied from the process.
pub fn fixture_session(dir: &Path) -> Session {
    let mut vars = HashMap::new();
    if let Ok(path) = std::env::var("PATH") {
        vars.insert("PATH".to_string(), path);
    }
    Session {
        vars,
        current_dir: dir.to_path_buf(),
        user: "alice".to_string(),
        group: "staff".to_string(),
        exit_code: None,
    }
}

pub fn fixture_handle(dir: &Path) -> SessionHandle {
    fixture_session(dir).into_handle()
}
