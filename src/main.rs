use clap::Parser;

mod commands;
mod output;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "rollout")]
#[command(version = VERSION)]
#[command(about = "Fetch a release package and roll it out to hosts over SSH")]
struct Cli {
    #[command(flatten)]
    args: commands::RolloutArgs,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let (json_result, exit_code) = output::map_cmd_result_to_json(commands::run(cli.args));
    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::FAILURE;
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
