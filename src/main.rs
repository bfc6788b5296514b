mod alerts;
mod cli;
mod config;
mod cron;
mod dispatcher;
mod error;
mod job;
mod logging;
mod mail;
mod model;
mod scheduler;
mod store;
mod utils;

use anyhow::bail;
use clap::Parser;
use log::{error, info, warn};

use config::file::read_config_file;
use config::parse_config_file;
use config::validation::{validate_config, ValidationResult};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long)]
    config: String,

    /// Print config validation result
    #[arg(long)]
    validate: bool,

    #[command(subcommand)]
    command: Option<cli::Command>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_file = read_config_file(&args.config)?;

    // Resolve schedules and time zone
    let config = parse_config_file(&config_file)?;

    // Setup logging
    logging::setup_logging(&config.logging)?;

    info!("Starting migration-mailer with config file: {}", args.config);

    // Validate config file
    if args.validate {
        let info = validate_config(&config_file);

        for msg in &info {
            match msg {
                ValidationResult::Error(m) => {
                    error!("{}", m);
                }
                ValidationResult::Warning(m) => {
                    warn!("{}", m);
                }
            }
        }

        if info.iter().any(ValidationResult::is_error) {
            bail!("Config file '{}' is not valid", args.config);
        }
        if info.is_empty() {
            info!("Config file is valid");
        }
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(cli::run(args.command.unwrap_or_default(), config))?;

    info!("Exiting");
    Ok(())
}
