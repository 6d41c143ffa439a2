use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::digest::DigestCheck;
use crate::error::{Error, Result};
use crate::release::{self, ARCHIVE_SUFFIXES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Deploy,
    Restart,
    Rollback,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Deploy => "deploy",
            Action::Restart => "restart",
            Action::Rollback => "rollback",
        }
    }
}

/// Everything a deploy run needs from the operator. Immutable once built.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    package_name: String,
    app_name: String,
    digest_check: DigestCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_digest: Option<String>,
    target_hosts: Vec<String>,
}

impl DeploymentRequest {
    pub fn new(
        package_name: &str,
        app_name: &str,
        digest_check: DigestCheck,
        expected_digest: Option<&str>,
        target_hosts: Vec<String>,
    ) -> Result<Self> {
        let package_name = package_name.trim();
        if package_name.is_empty() {
            return Err(Error::validation_missing_argument(vec![
                "packageName".to_string()
            ]));
        }
        if release::strip_archive_suffix(package_name).is_none() {
            return Err(Error::validation_invalid_argument(
                "packageName",
                format!("must end with one of: {}", ARCHIVE_SUFFIXES.join(", ")),
                Some(package_name.to_string()),
                None,
            ));
        }
        if package_name.contains('/') {
            return Err(Error::validation_invalid_argument(
                "packageName",
                "must be a file name, not a path",
                Some(package_name.to_string()),
                None,
            ));
        }

        validate_app_name(app_name)?;

        // Compared byte for byte; only an empty value counts as absent.
        let expected_digest = expected_digest
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        if digest_check == DigestCheck::Verify && expected_digest.is_none() {
            return Err(Error::validation_missing_argument(vec!["md5Value".to_string()])
                .with_hint("--checkMD5 requires --md5Value with the archive digest"));
        }

        if target_hosts.is_empty() {
            return Err(Error::validation_missing_argument(vec!["servers".to_string()]));
        }

        Ok(Self {
            package_name: package_name.to_string(),
            app_name: app_name.to_string(),
            digest_check,
            expected_digest,
            target_hosts,
        })
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Expected archive digest when verification is requested.
    pub fn archive_digest(&self) -> Option<&str> {
        match self.digest_check {
            DigestCheck::Verify => self.expected_digest.as_deref(),
            DigestCheck::Skip => None,
        }
    }

    pub fn target_hosts(&self) -> &[String] {
        &self.target_hosts
    }
}

static APP_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// App names become remote path components and unit names.
pub fn validate_app_name(app_name: &str) -> Result<()> {
    if app_name.is_empty() {
        return Err(Error::validation_missing_argument(vec!["appName".to_string()]));
    }

    if !APP_NAME_PATTERN.is_match(app_name) {
        return Err(Error::validation_invalid_argument(
            "appName",
            "may only contain letters, digits, '.', '_' and '-', and must start with a letter or digit",
            Some(app_name.to_string()),
            None,
        ));
    }

    Ok(())
}

/// Split a comma-separated host list, keeping first-seen order.
pub fn parse_hosts(raw: &str) -> Result<Vec<String>> {
    let mut hosts: Vec<String> = Vec::new();
    for host in raw.split(',').map(str::trim).filter(|h| !h.is_empty()) {
        if host.chars().any(char::is_whitespace) || host.starts_with('-') {
            return Err(Error::validation_invalid_argument(
                "servers",
                format!("'{}' is not a valid host address", host),
                Some(host.to_string()),
                None,
            ));
        }
        if !hosts.iter().any(|h| h == host) {
            hosts.push(host.to_string());
        }
    }

    if hosts.is_empty() {
        return Err(Error::validation_missing_argument(vec!["servers".to_string()]));
    }

    Ok(hosts)
}
