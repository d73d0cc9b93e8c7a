//! Name to factory mapping for builtin commands.

use crate::builtin::{BuiltinCommand, Cd, Echo, Kill, Ps, Pwd};
use crate::command::Command;
use crate::session::SessionHandle;
use std::collections::HashMap;

/// Produces a fresh command bound to the session and the default streams.
pub trait CommandFactory {
    fn create(&self, session: &SessionHandle) -> Box<dyn Command>;
}

impl<F: Fn(&SessionHandle) -> Box<dyn Command>> CommandFactory for F {
    fn create(&self, session: &SessionHandle) -> Box<dyn Command> {
        self(session)
    }
}

/// Factory for a builtin type known at compile time.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Builtins the interpreter knows about.
///
/// Lookup is exact and case-sensitive. A name missing from the registry is not
/// an error: the pipeline constructor hands it to the external command adapter.
pub struct Registry {
    session: SessionHandle,
    factories: HashMap<String, Box<dyn CommandFactory>>,
}

impl Registry {
    /// An empty registry; every name resolves to an external program.
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            factories: HashMap::new(),
        }
    }

    /// Registry with `pwd`, `echo`, `cd`, `ps` and `kill`.
    ///
    /// `exit` is left out, add it with `register::<Exit>()`.
    pub fn with_builtins(session: SessionHandle) -> Self {
        let mut registry = Self::new(session);
        registry
            .register::<Pwd>()
            .register::<Echo>()
            .register::<Cd>()
            .register::<Ps>()
            .register::<Kill>();
        registry
    }

    /// Register a builtin under its canonical name, replacing any previous entry.
    pub fn register<T: BuiltinCommand>(&mut self) -> &mut Self {
        self.register_with(T::name(), Factory::<T>::default())
    }

    /// Register an arbitrary factory under `name`.
    pub fn register_with(
        &mut self,
        name: impl Into<String>,
        factory: impl CommandFactory + 'static,
    ) -> &mut Self {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Fresh command for `name`, or `None` when it is not a builtin.
    pub fn create(&self, name: &str) -> Option<Box<dyn Command>> {
        self.factories
            .get(name)
            .map(|factory| factory.create(&self.session))
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}
