//! Remote command execution.

mod client;

pub use client::{ConnectionProfile, SshClient};

use std::path::PathBuf;

use crate::error::Result;

/// Remote side effects used by the orchestrator. No retries: callers decide.
pub trait RemoteShell {
    /// Run `command` on `host`, returning combined stdout/stderr.
    ///
    /// A non-zero exit is `remote.command_failed`; an expired timeout is
    /// `remote.command_timeout`.
    fn run(&self, host: &str, command: &str) -> Result<String>;

    /// Recursively copy local `sources` into `remote_dir` on `host`.
    fn copy_to(&self, host: &str, sources: &[PathBuf], remote_dir: &str) -> Result<()>;
}

/// SSH exit status for connection-level failures.
pub const SSH_CONNECTION_EXIT: i64 = 255;
