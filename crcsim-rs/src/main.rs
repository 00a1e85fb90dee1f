use std::process::ExitCode;

use log::error;

use crcsim::config::SimConfig;
use crcsim::environment::RunEnvironment;
use crcsim::simulation;

fn run() -> crcsim::Result<()> {
    let env = RunEnvironment::from_stdin()?;

    // Optional TOML model configuration, overridden by the run input
    let base = env.file("config").map(SimConfig::read_base).transpose()?;
    let env = env.with_input_type::<SimConfig>(base)?;

    simulation::run(&env)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
