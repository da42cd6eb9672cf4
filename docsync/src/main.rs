use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use docsync::cli::{self, Cli};
use docsync::logging::{self, format_from_env};
use docsync::{Dependencies, Settings};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    logging::init_logging(format_from_env()?, "info");

    let settings = Settings::from_env().context("Failed to read settings")?;
    let mut deps = Dependencies::new(settings)
        .await
        .context("Failed to initialize dependencies")?;

    let mut input = io::stdin().lock();
    let mut out = io::stdout().lock();
    let result = tokio::select! {
        result = cli::run(&cli, &mut deps, &mut input, &mut out) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            return Ok(ExitCode::from(130));
        }
    };

    match result {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => {
            info!("Command did not complete successfully");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e).context("Command failed")
        }
    }
}
