//! Multi-host release orchestration.
//!
//! Hosts are processed one at a time, in the order given. Each host runs
//! prepare, transfer, service_unit, switch, prune and restart; the first
//! failing step ends that host and is recorded in its [`HostOutcome`]. Other
//! hosts still run unless `failFast` is set, in which case they are reported
//! as skipped.
//!
//! The `current` symlink is only touched after the transfer step returned
//! successfully, so a host whose copy failed keeps serving its old release.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::defaults::DeployConfig;
use crate::error::{Error, ErrorCode};
use crate::layout::RemoteLayout;
use crate::request::Action;
use crate::ssh::{RemoteShell, SSH_CONNECTION_EXIT};
use crate::unit;
use crate::utils::shell;

/// Files shipped to every host for one release.
#[derive(Debug, Clone)]
pub struct ReleasePayload {
    pub release_name: String,
    /// Top-level entries of the extracted release, copied into the release directory.
    pub entries: Vec<PathBuf>,
    /// Local scratch directory for generated files (the service unit).
    pub staging_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Resolve,
    Prepare,
    Transfer,
    ServiceUnit,
    Switch,
    Prune,
    Restart,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Resolve => "resolve",
            Step::Prepare => "prepare",
            Step::Transfer => "transfer",
            Step::ServiceUnit => "service_unit",
            Step::Switch => "switch",
            Step::Prune => "prune",
            Step::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Result for a single host.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostOutcome {
    pub host: String,
    pub status: HostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub unit_installed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pruned: Vec<String>,
}

impl HostOutcome {
    fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            status: HostStatus::Succeeded,
            release: None,
            previous_release: None,
            step: None,
            error: None,
            error_code: None,
            unit_installed: false,
            pruned: Vec::new(),
        }
    }

    fn skipped(host: &str) -> Self {
        Self {
            status: HostStatus::Skipped,
            ..Self::new(host)
        }
    }

    fn fail(&mut self, failure: StepFailure) {
        self.status = HostStatus::Failed;
        self.step = Some(failure.step);
        self.error = Some(failure.error.summary());
        self.error_code = Some(failure.error.code.as_str().to_string());
    }
}

/// Summary of a multi-host run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeploySummary {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl DeploySummary {
    fn from_outcomes(outcomes: &[HostOutcome]) -> Self {
        let count = |status: HostStatus| {
            outcomes.iter().filter(|o| o.status == status).count() as u32
        };
        Self {
            total: outcomes.len() as u32,
            succeeded: count(HostStatus::Succeeded),
            failed: count(HostStatus::Failed),
            skipped: count(HostStatus::Skipped),
        }
    }
}

/// Aggregate report for one action across all hosts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub action: Action,
    pub app: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    pub started_at: String,
    pub finished_at: String,
    pub hosts: Vec<HostOutcome>,
    pub summary: DeploySummary,
}

impl DeployReport {
    /// True when any host failed or was skipped.
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0 || self.summary.skipped > 0
    }
}

struct StepFailure {
    step: Step,
    error: Error,
}

type StepResult<T> = std::result::Result<T, StepFailure>;

fn at(step: Step) -> impl FnOnce(Error) -> StepFailure {
    move |error| StepFailure { step, error }
}

pub struct Deployer<'a, S: RemoteShell> {
    shell: &'a S,
    layout: RemoteLayout,
    config: &'a DeployConfig,
}

impl<'a, S: RemoteShell> Deployer<'a, S> {
    pub fn new(shell: &'a S, app_name: &str, config: &'a DeployConfig) -> Self {
        Self {
            shell,
            layout: RemoteLayout::new(&config.app_root, &config.unit_dir, app_name),
            config,
        }
    }

    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    /// Roll `payload` out to every host.
    pub fn deploy(&self, hosts: &[String], payload: &ReleasePayload) -> DeployReport {
        self.run_hosts(
            Action::Deploy,
            Some(payload.release_name.clone()),
            hosts,
            |host, outcome| self.deploy_host(host, payload, outcome),
        )
    }

    /// Restart the service on every host. Does not check that the unit exists.
    pub fn restart(&self, hosts: &[String]) -> DeployReport {
        self.run_hosts(Action::Restart, None, hosts, |host, _| {
            log_status!("restart", "[{}] Restarting {}", host, self.layout.unit_file_name());
            self.restart_service(host)
        })
    }

    /// Point `current` back at the newest release older than the live one.
    pub fn rollback(&self, hosts: &[String]) -> DeployReport {
        self.run_hosts(Action::Rollback, None, hosts, |host, outcome| {
            self.rollback_host(host, outcome)
        })
    }

    fn run_hosts<F>(
        &self,
        action: Action,
        release: Option<String>,
        hosts: &[String],
        mut per_host: F,
    ) -> DeployReport
    where
        F: FnMut(&str, &mut HostOutcome) -> StepResult<()>,
    {
        let started_at = Utc::now().to_rfc3339();
        let mut outcomes = Vec::with_capacity(hosts.len());
        let mut halted = false;

        for (index, host) in hosts.iter().enumerate() {
            if halted {
                log_status!("deploy", "[{}] Skipped ({} halted by failFast)", host, action.as_str());
                outcomes.push(HostOutcome::skipped(host));
                continue;
            }

            log_status!(
                "deploy",
                "{} {} ({}/{})",
                action.as_str(),
                host,
                index + 1,
                hosts.len()
            );

            let mut outcome = HostOutcome::new(host);
            if let Err(failure) = per_host(host, &mut outcome) {
                log_status!(
                    "deploy",
                    "[{}] Failed at {}: {}",
                    host,
                    failure.step.as_str(),
                    failure.error.summary()
                );
                outcome.fail(failure);
                halted = self.config.fail_fast;
            } else {
                log_status!("deploy", "[{}] Done", host);
            }
            outcomes.push(outcome);
        }

        let summary = DeploySummary::from_outcomes(&outcomes);
        DeployReport {
            action,
            app: self.layout.app_name().to_string(),
            release,
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            hosts: outcomes,
            summary,
        }
    }

    fn deploy_host(
        &self,
        host: &str,
        payload: &ReleasePayload,
        outcome: &mut HostOutcome,
    ) -> StepResult<()> {
        let release = payload.release_name.as_str();
        let dest = self.layout.release_dir(release);
        outcome.release = Some(release.to_string());

        let prepare = format!(
            "mkdir -p {dir} && find {dir} -mindepth 1 -maxdepth 1 -exec rm -rf {{}} +",
            dir = shell::quote_path(&dest)
        );
        self.shell.run(host, &prepare).map_err(at(Step::Prepare))?;

        self.shell
            .copy_to(host, &payload.entries, &dest)
            .map_err(at(Step::Transfer))?;

        outcome.unit_installed = self
            .reconcile_unit(host, payload)
            .map_err(at(Step::ServiceUnit))?;

        let switch = format!(
            "ln -sfn {} {}",
            shell::quote_path(&dest),
            shell::quote_path(&self.layout.current_link())
        );
        self.shell.run(host, &switch).map_err(at(Step::Switch))?;
        log_status!("deploy", "[{}] current -> {}", host, dest);

        outcome.pruned = self.prune(host, release).map_err(at(Step::Prune))?;

        self.restart_service(host)
    }

    /// Install the unit when the host does not have it. Returns whether it was installed.
    fn reconcile_unit(&self, host: &str, payload: &ReleasePayload) -> crate::Result<bool> {
        let probe = format!(
            "systemctl cat {}",
            shell::quote_path(&self.layout.unit_file_name())
        );
        match self.shell.run(host, &probe) {
            Ok(_) => return Ok(false),
            Err(err) if is_missing_unit(&err) => {}
            Err(err) => return Err(err),
        }

        log_status!("deploy", "[{}] Installing {}", host, self.layout.unit_file_name());
        let unit_file = unit::write_unit(
            &payload.staging_dir,
            &self.layout,
            self.config.limit_nofile,
        )?;
        self.shell
            .copy_to(host, &[unit_file], &self.layout.release_root())?;

        let install = format!(
            "cp {} {} && systemctl daemon-reload",
            shell::quote_path(&self.layout.staged_unit_path()),
            shell::quote_path(&self.layout.installed_unit_path())
        );
        self.shell.run(host, &install)?;
        Ok(true)
    }

    fn prune(&self, host: &str, keep_release: &str) -> crate::Result<Vec<String>> {
        let listing = self.shell.run(host, &self.list_releases_command())?;
        let stale = select_stale_releases(&listing, self.config.keep_releases, keep_release);
        if stale.is_empty() {
            return Ok(stale);
        }

        let targets: Vec<String> = stale
            .iter()
            .map(|name| shell::quote_path(&self.layout.release_dir(name)))
            .collect();
        self.shell
            .run(host, &format!("rm -rf {}", targets.join(" ")))?;
        log_status!("deploy", "[{}] Pruned {}", host, stale.join(", "));
        Ok(stale)
    }

    fn restart_service(&self, host: &str) -> StepResult<()> {
        let restart = format!(
            "systemctl restart {}",
            shell::quote_path(&self.layout.unit_file_name())
        );
        self.shell
            .run(host, &restart)
            .map(|_| ())
            .map_err(at(Step::Restart))
    }

    fn rollback_host(&self, host: &str, outcome: &mut HostOutcome) -> StepResult<()> {
        let readlink = format!("readlink {}", shell::quote_path(&self.layout.current_link()));
        let target = self.shell.run(host, &readlink).map_err(at(Step::Resolve))?;
        let current = release_from_link(&target).ok_or_else(|| {
            at(Step::Resolve)(Error::validation_invalid_argument(
                "current",
                format!("{} does not point at a release", self.layout.current_link()),
                Some(target.trim().to_string()),
                None,
            ))
        })?;
        outcome.previous_release = Some(current.clone());

        let listing = self
            .shell
            .run(host, &self.list_releases_command())
            .map_err(at(Step::Resolve))?;
        let previous = select_rollback_target(&listing, &current).ok_or_else(|| {
            at(Step::Resolve)(Error::validation_invalid_argument(
                "release",
                format!("no release older than '{}' on {}", current, host),
                Some(current.clone()),
                None,
            ))
        })?;
        outcome.release = Some(previous.clone());

        let switch = format!(
            "ln -sfn {} {}",
            shell::quote_path(&self.layout.release_dir(&previous)),
            shell::quote_path(&self.layout.current_link())
        );
        self.shell.run(host, &switch).map_err(at(Step::Switch))?;
        log_status!("rollback", "[{}] current -> {} (was {})", host, previous, current);

        self.restart_service(host)
    }

    fn list_releases_command(&self) -> String {
        format!(
            "find {} -mindepth 1 -maxdepth 1 -type d -printf '%T@ %f\\n'",
            shell::quote_path(&self.layout.release_root())
        )
    }
}

/// A failed `systemctl cat` that reached the host means the unit is absent.
/// Timeouts and ssh connection failures do not.
fn is_missing_unit(err: &Error) -> bool {
    err.code == ErrorCode::RemoteCommandFailed
        && err.details.get("exitCode").and_then(Value::as_i64) != Some(SSH_CONNECTION_EXIT)
}

/// Parse `find -printf '%T@ %f\n'` output into release names, newest first.
/// Ties on modification time are ordered by name. Unparseable lines are ignored.
pub fn releases_newest_first(listing: &str) -> Vec<String> {
    let mut entries: Vec<(f64, &str)> = listing
        .lines()
        .filter_map(|line| {
            let (mtime, name) = line.trim().split_once(' ')?;
            let mtime = mtime.parse::<f64>().ok()?;
            let name = name.trim();
            if name.is_empty() || name.contains('/') {
                return None;
            }
            Some((mtime, name))
        })
        .collect();

    entries.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    entries.into_iter().map(|(_, name)| name.to_string()).collect()
}

/// Releases to delete so that at most `keep` remain.
///
/// `protect` always survives and counts toward `keep`: when it is listed, only
/// the newest `keep - 1` other releases are kept alongside it. With `keep` of
/// zero, `protect` is still the one survivor.
pub fn select_stale_releases(listing: &str, keep: usize, protect: &str) -> Vec<String> {
    let releases = releases_newest_first(listing);
    let others_kept = if releases.iter().any(|name| name == protect) {
        keep.saturating_sub(1)
    } else {
        keep
    };

    releases
        .into_iter()
        .filter(|name| name != protect)
        .skip(others_kept)
        .collect()
}

/// The newest release older than `current`.
pub fn select_rollback_target(listing: &str, current: &str) -> Option<String> {
    let releases = releases_newest_first(listing);
    let position = releases.iter().position(|name| name == current)?;
    releases.into_iter().nth(position + 1)
}

fn release_from_link(target: &str) -> Option<String> {
    let line = target.lines().map(str::trim).rfind(|l| !l.is_empty())?;
    let name = line.trim_end_matches('/').rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
