use clap::Args;
use serde::Serialize;

use rollout::artifact::ArtifactSummary;
use rollout::defaults::{self, Defaults};
use rollout::deploy::DeployReport;
use rollout::digest::DigestCheck;
use rollout::log_status;
use rollout::request::{self, Action};
use rollout::ssh::{ConnectionProfile, SshClient};

pub mod deploy;
pub mod restart;
pub mod rollback;

pub type CmdResult<T> = rollout::Result<(T, i32)>;

/// Flags accepted by the `rollout` binary. The camelCase names match the
/// release pipeline that invokes it.
#[derive(Args, Debug)]
pub struct RolloutArgs {
    /// What to do on the target hosts
    #[arg(long, value_enum)]
    pub action: Action,

    /// Release package file name, e.g. build_42_myapp.tar.gz (deploy only)
    #[arg(long = "packageName", visible_alias = "package-name")]
    pub package_name: Option<String>,

    /// Service name; also the binary name inside the package
    #[arg(long = "appName", visible_alias = "app-name")]
    pub app_name: String,

    /// Environment label, logged and echoed in the output (deploy only)
    #[arg(long = "envName", visible_alias = "env-name")]
    pub env_name: Option<String>,

    /// Expected digest of the downloaded package
    #[arg(long = "md5Value", visible_alias = "md5-value")]
    pub md5_value: Option<String>,

    /// Check the package against --md5Value (true/false, yes/no, verify/skip)
    #[arg(
        long = "checkMD5",
        visible_alias = "check-md5",
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub check_md5: DigestCheck,

    /// Comma-separated target hosts, processed in order
    #[arg(long)]
    pub servers: String,

    /// Override the package base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Override the SSH user
    #[arg(long)]
    pub ssh_user: Option<String>,

    /// Override the SSH port
    #[arg(long)]
    pub ssh_port: Option<u16>,

    /// SSH private key to authenticate with
    #[arg(long)]
    pub identity_file: Option<String>,

    /// Number of releases kept on each host
    #[arg(long)]
    pub keep_releases: Option<usize>,

    /// Stop at the first failing host and skip the rest
    #[arg(long)]
    pub fail_fast: bool,
}

impl RolloutArgs {
    /// Layer command-line overrides over the loaded configuration.
    pub fn apply_overrides(&self, defaults: &mut Defaults) {
        if let Some(base_url) = &self.base_url {
            defaults.artifact.base_url = base_url.clone();
        }
        if let Some(user) = &self.ssh_user {
            defaults.ssh.user = user.clone();
        }
        if let Some(port) = self.ssh_port {
            defaults.ssh.port = port;
        }
        if let Some(identity_file) = &self.identity_file {
            defaults.ssh.identity_file = Some(identity_file.clone());
        }
        if let Some(keep) = self.keep_releases {
            defaults.deploy.keep_releases = keep;
        }
        if self.fail_fast {
            defaults.deploy.fail_fast = true;
        }
    }

    pub fn hosts(&self) -> rollout::Result<Vec<String>> {
        request::parse_hosts(&self.servers)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactSummary>,
    #[serde(flatten)]
    pub report: DeployReport,
}

impl RolloutOutput {
    fn new(args: &RolloutArgs, artifact: Option<ArtifactSummary>, report: DeployReport) -> (Self, i32) {
        let exit_code = if report.has_failures() { 1 } else { 0 };
        (
            Self {
                env_name: args.env_name.clone(),
                artifact,
                report,
            },
            exit_code,
        )
    }
}

fn ssh_client(defaults: &Defaults) -> rollout::Result<SshClient> {
    Ok(SshClient::new(ConnectionProfile::from_config(&defaults.ssh)?))
}

pub fn run(args: RolloutArgs) -> CmdResult<RolloutOutput> {
    let mut defaults = defaults::load_defaults();
    args.apply_overrides(&mut defaults);

    if let Some(env_name) = &args.env_name {
        log_status!("config", "Environment: {}", env_name);
    }

    match args.action {
        Action::Deploy => deploy::run(&args, &defaults),
        Action::Restart => restart::run(&args, &defaults),
        Action::Rollback => rollback::run(&args, &defaults),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RolloutArgs,
    }

    fn parse(argv: &[&str]) -> RolloutArgs {
        TestCli::try_parse_from(std::iter::once("rollout").chain(argv.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn parses_legacy_camel_case_flags() {
        let args = parse(&[
            "--packageName",
            "build_42_myapp.tar.gz",
            "--appName",
            "myapp",
            "--envName",
            "prod",
            "--md5Value",
            "abc",
            "--checkMD5",
            "yes",
            "--action",
            "deploy",
            "--servers",
            "10.0.0.5,10.0.0.6",
        ]);
        assert_eq!(args.action, Action::Deploy);
        assert_eq!(args.check_md5, DigestCheck::Verify);
        assert_eq!(args.hosts().unwrap(), vec!["10.0.0.5", "10.0.0.6"]);
    }

    #[test]
    fn check_md5_defaults_to_skip_and_bare_flag_verifies() {
        let args = parse(&["--appName", "a", "--action", "restart", "--servers", "h"]);
        assert_eq!(args.check_md5, DigestCheck::Skip);

        let args = parse(&["--appName", "a", "--action", "restart", "--servers", "h", "--checkMD5"]);
        assert_eq!(args.check_md5, DigestCheck::Verify);
    }

    #[test]
    fn unknown_action_is_usage_error() {
        let result = TestCli::try_parse_from([
            "rollout", "--appName", "a", "--action", "redeploy", "--servers", "h",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let args = parse(&[
            "--appName",
            "a",
            "--action",
            "restart",
            "--servers",
            "h",
            "--ssh-port",
            "22",
            "--keep-releases",
            "3",
            "--fail-fast",
        ]);
        let mut defaults = defaults::builtin_defaults();
        args.apply_overrides(&mut defaults);
        assert_eq!(defaults.ssh.port, 22);
        assert_eq!(defaults.ssh.user, "root");
        assert_eq!(defaults.deploy.keep_releases, 3);
        assert!(defaults.deploy.fail_fast);
    }
}
