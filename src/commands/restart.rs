use rollout::defaults::Defaults;
use rollout::deploy::Deployer;
use rollout::request;

use super::{CmdResult, RolloutArgs, RolloutOutput};

pub fn run(args: &RolloutArgs, defaults: &Defaults) -> CmdResult<RolloutOutput> {
    request::validate_app_name(&args.app_name)?;
    let hosts = args.hosts()?;
    let client = super::ssh_client(defaults)?;

    let report = Deployer::new(&client, &args.app_name, &defaults.deploy).restart(&hosts);
    Ok(RolloutOutput::new(args, None, report))
}
