//! A small line-oriented shell built around a pipeline engine.
//!
//! A line like `ps | grep ssh` is split into stages, every stage is resolved
//! either to a builtin implemented in Rust or to an external program, the
//! stages are chained through OS pipes and the output of the last one is
//! returned to the caller.
//!
//! The main entry point is [`Interpreter`]. The public modules [`command`],
//! [`registry`] and [`session`] expose the pieces needed to plug in your own
//! commands, and [`pipeline`] exposes the constructor and executor on their own.

pub mod builtin;
pub mod command;
pub mod error;
pub mod external;
mod interpreter;
mod io_adapters;
mod lexer;
pub mod pipeline;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{Result, ShellError};
pub use interpreter::Interpreter;
pub use io_adapters::MemWriter;
