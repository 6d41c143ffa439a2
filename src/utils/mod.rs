//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Process execution with a deadline
//! - `io` - File I/O with consistent error handling
//! - `shell` - Shell escaping and quoting
//! - `template` - String template rendering

pub mod command;
pub mod io;
pub mod shell;
pub(crate) mod template;
