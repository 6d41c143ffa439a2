use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::digest::DigestAlgorithm;
use crate::paths;

/// Root configuration structure for rollout.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolloutConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via rollout.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_artifact")]
    pub artifact: ArtifactConfig,

    #[serde(default = "default_ssh")]
    pub ssh: SshConfig,

    #[serde(default = "default_deploy")]
    pub deploy: DeployConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            artifact: default_artifact(),
            ssh: default_ssh(),
            deploy: default_deploy(),
        }
    }
}

/// Where artifacts come from and how they are checked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(default)]
    pub digest_algorithm: DigestAlgorithm,
}

/// Connection profile for remote hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default)]
    pub identity_file: Option<String>,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_scp_flags")]
    pub scp_flags: Vec<String>,
}

/// Remote layout and rollout policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    #[serde(default = "default_app_root")]
    pub app_root: String,

    #[serde(default = "default_unit_dir")]
    pub unit_dir: String,

    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,

    #[serde(default)]
    pub fail_fast: bool,

    #[serde(default = "default_limit_nofile")]
    pub limit_nofile: u64,
}

impl ArtifactConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl SshConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_artifact() -> ArtifactConfig {
    ArtifactConfig {
        base_url: default_base_url(),
        fetch_timeout_secs: default_fetch_timeout_secs(),
        max_redirects: default_max_redirects(),
        digest_algorithm: DigestAlgorithm::default(),
    }
}

fn default_base_url() -> String {
    "https://jenkins-buildpackage.s3.ap-east-1.amazonaws.com/".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    300
}

fn default_max_redirects() -> usize {
    10
}

fn default_ssh() -> SshConfig {
    SshConfig {
        user: default_ssh_user(),
        port: default_ssh_port(),
        identity_file: None,
        command_timeout_secs: default_command_timeout_secs(),
        connect_timeout_secs: default_connect_timeout_secs(),
        scp_flags: default_scp_flags(),
    }
}

/// Legacy scp protocol: SFTP mode (OpenSSH 9+) keeps the remote path quotes.
fn default_scp_flags() -> Vec<String> {
    vec!["-O".to_string()]
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    10086
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_deploy() -> DeployConfig {
    DeployConfig {
        app_root: default_app_root(),
        unit_dir: default_unit_dir(),
        keep_releases: default_keep_releases(),
        fail_fast: false,
        limit_nofile: default_limit_nofile(),
    }
}

fn default_app_root() -> String {
    "/data/app".to_string()
}

fn default_unit_dir() -> String {
    "/usr/lib/systemd/system".to_string()
}

fn default_keep_releases() -> usize {
    5
}

fn default_limit_nofile() -> u64 {
    65535
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If rollout.json is missing or invalid, silently returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full rollout.json config, falling back to defaults on any error.
pub fn load_config() -> RolloutConfig {
    let Ok(path) = paths::rollout_json() else {
        return RolloutConfig::default();
    };

    match load_config_from(&path) {
        Ok(config) => config,
        Err(err) if path.exists() => {
            log_status!("config", "Ignoring {}: {}", path.display(), err.summary());
            RolloutConfig::default()
        }
        Err(_) => RolloutConfig::default(),
    }
}

/// Parse a rollout.json file.
pub fn load_config_from(path: &Path) -> crate::Result<RolloutConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| crate::Error::config_invalid_json(path.display().to_string(), e))
}

/// Get built-in defaults (ignoring any file config)
pub fn builtin_defaults() -> Defaults {
    Defaults::default()
}
