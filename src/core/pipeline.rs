//! End-to-end release flow: artifact first, hosts second.

use serde::Serialize;

use crate::artifact::{self, ArtifactSummary};
use crate::defaults::Defaults;
use crate::deploy::{DeployReport, Deployer};
use crate::error::Result;
use crate::request::DeploymentRequest;
use crate::ssh::RemoteShell;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDeployment {
    pub artifact: ArtifactSummary,
    #[serde(flatten)]
    pub report: DeployReport,
}

/// Fetch, verify and unpack the package, then roll it out host by host.
///
/// Any artifact error returns before `shell` is used, so no host is contacted
/// for a package that failed to download or verify.
pub fn deploy_release<S: RemoteShell>(
    request: &DeploymentRequest,
    defaults: &Defaults,
    shell: &S,
) -> Result<ReleaseDeployment> {
    let local = artifact::fetch_and_prepare(request, &defaults.artifact)?;
    let summary = artifact::summarize(&local, request);
    let payload = local.payload()?;

    log_status!(
        "deploy",
        "Release {} -> {} host(s)",
        payload.release_name,
        request.target_hosts().len()
    );
    let report = Deployer::new(shell, request.app_name(), &defaults.deploy)
        .deploy(request.target_hosts(), &payload);

    Ok(ReleaseDeployment {
        artifact: summary,
        report,
    })
}
