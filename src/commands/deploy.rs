use rollout::defaults::Defaults;
use rollout::pipeline;
use rollout::request::DeploymentRequest;
use rollout::Error;

use super::{CmdResult, RolloutArgs, RolloutOutput};

pub fn run(args: &RolloutArgs, defaults: &Defaults) -> CmdResult<RolloutOutput> {
    let (Some(package_name), Some(_)) = (args.package_name.as_deref(), args.env_name.as_deref())
    else {
        let missing = [("packageName", &args.package_name), ("envName", &args.env_name)]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        return Err(Error::validation_missing_argument(missing)
            .with_hint("deploy needs --packageName and --envName"));
    };

    let request = DeploymentRequest::new(
        package_name,
        &args.app_name,
        args.check_md5,
        args.md5_value.as_deref(),
        args.hosts()?,
    )?;

    // Resolve the connection profile before downloading anything.
    let client = super::ssh_client(defaults)?;
    let deployment = pipeline::deploy_release(&request, defaults, &client)?;

    Ok(RolloutOutput::new(
        args,
        Some(deployment.artifact),
        deployment.report,
    ))
}
