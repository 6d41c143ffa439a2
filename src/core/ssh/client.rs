use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::defaults::SshConfig;
use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::utils::command::{self, CommandOutput, RunOutcome};
use crate::utils::shell;

use super::RemoteShell;

/// Bulk copies get this many command timeouts.
const TRANSFER_TIMEOUT_FACTOR: u32 = 10;

/// How to reach and authenticate against target hosts.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    pub connect_timeout_secs: u64,
    pub command_timeout: Duration,
    pub scp_flags: Vec<String>,
}

impl ConnectionProfile {
    pub fn from_config(config: &SshConfig) -> Result<Self> {
        if config.user.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "ssh.user",
                None,
                "SSH user must not be empty",
            ));
        }

        let identity_file = match &config.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::config_invalid_value(
                        "ssh.identityFile",
                        Some(expanded),
                        "SSH identity file not found",
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        Ok(Self {
            user: config.user.clone(),
            port: config.port,
            identity_file,
            connect_timeout_secs: config.connect_timeout_secs,
            command_timeout: config.command_timeout(),
            scp_flags: config.scp_flags.clone(),
        })
    }

    fn destination(&self, host: &str) -> String {
        format!("{}@{}", self.user, host)
    }
}

pub struct SshClient {
    pub profile: ConnectionProfile,
}

impl SshClient {
    pub fn new(profile: ConnectionProfile) -> Self {
        Self { profile }
    }

    fn build_ssh_args(&self, host: &str, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.profile.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        args.push("-p".to_string());
        args.push(self.profile.port.to_string());

        // Non-interactive: never prompt, never hang on a stalled connection.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.profile.connect_timeout_secs),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(self.profile.destination(host));
        args.push(command.to_string());

        args
    }

    fn build_scp_args(&self, host: &str, sources: &[PathBuf], remote_dir: &str) -> Vec<String> {
        let mut args: Vec<String> = self.profile.scp_flags.clone();
        args.push("-r".to_string());

        if let Some(identity_file) = &self.profile.identity_file {
            args.extend(["-i".to_string(), identity_file.clone()]);
        }

        args.extend(["-P".to_string(), self.profile.port.to_string()]);
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.profile.connect_timeout_secs),
        ]);

        args.extend(sources.iter().map(|p| p.to_string_lossy().to_string()));
        args.push(format!(
            "{}:{}/",
            self.profile.destination(host),
            shell::quote_path(remote_dir.trim_end_matches('/'))
        ));

        args
    }

    fn finish(
        &self,
        host: &str,
        label: &str,
        program: &str,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(&args);

        let outcome = command::run_with_timeout(cmd, timeout).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("spawn {}", program)))
        })?;

        match outcome {
            RunOutcome::TimedOut => {
                log_status!("ssh", "[{}] Timed out: {}", host, label);
                Err(Error::remote_command_timeout(label, host, timeout.as_secs()))
            }
            RunOutcome::Completed(output) if output.success => Ok(output),
            RunOutcome::Completed(output) => {
                log_status!(
                    "ssh",
                    "[{}] Failed (exit {}): {}",
                    host,
                    output.exit_code,
                    output.error_text()
                );
                Err(Error::remote_command_failed(RemoteCommandFailedDetails {
                    command: label.to_string(),
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    host: host.to_string(),
                }))
            }
        }
    }
}

impl RemoteShell for SshClient {
    fn run(&self, host: &str, command: &str) -> Result<String> {
        log_status!("ssh", "[{}] {}", host, command);
        let args = self.build_ssh_args(host, command);
        let output = self.finish(host, command, "ssh", args, self.profile.command_timeout)?;
        Ok(output.combined())
    }

    fn copy_to(&self, host: &str, sources: &[PathBuf], remote_dir: &str) -> Result<()> {
        if sources.is_empty() {
            return Ok(());
        }

        let label = format!("scp -r ({} entries) -> {}", sources.len(), remote_dir);
        log_status!("ssh", "[{}] {}", host, label);
        let args = self.build_scp_args(host, sources, remote_dir);
        let timeout = self.profile.command_timeout * TRANSFER_TIMEOUT_FACTOR;
        self.finish(host, &label, "scp", args, timeout)?;
        Ok(())
    }
}
