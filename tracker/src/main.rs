use clap::{Args, Parser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod config;
mod observability;

use config::{Config, ConfigError};
use observability::ObservabilityError;

#[derive(Parser)]
#[command(version, about = "Competitive player stats tracker")]
enum CliCommand {
    /// Serve the stats API.
    Run(ConfigArgs),
    /// Load and validate a config file, then exit.
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Observability(#[from] ObservabilityError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Aggregator(#[from] aggregator::StartupError),
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let result = match &cli {
        CliCommand::Run(args) => run(&args.config),
        CliCommand::CheckConfig(args) => check_config(&args.config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = Config::from_file(path)?;
    config.validate()?;
    Ok(config)
}

fn check_config(path: &Path) -> Result<(), CliError> {
    load_config(path)?;
    println!("{} is valid", path.display());
    Ok(())
}

fn run(path: &Path) -> Result<(), CliError> {
    let config = load_config(path)?;

    let _sentry = observability::init_sentry(&config.common.logging);
    observability::init_logging(&config.common.logging)?;
    if let Some(metrics) = &config.common.metrics {
        observability::init_metrics(metrics)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(aggregator::run(config.aggregator))?;
    Ok(())
}
