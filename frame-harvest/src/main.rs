use std::process;

use anyhow::Context;
use clap::Parser;
use frame_harvest::cli::{Args, Command};
use frame_harvest::commands::{self, Harvest};
use frame_harvest::config::AppConfig;
use frame_harvest::logging::init_logging;
use mimalloc::MiMalloc;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config =
        AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply_overrides(&mut config);

    let command = args.command.clone().unwrap_or(Command::Run);
    config.validate(command.needs_platform())?;

    let _log_guard = init_logging(&config.log_dir, args.verbose)?;
    info!(version = env!("CARGO_PKG_VERSION"), command = ?command, "frame-harvest starting");

    let harvest = Harvest::open(config)
        .await
        .context("failed to open the dataset")?;

    let result = match command {
        Command::Run => commands::run::execute(&harvest).await.map(|_| ()),
        Command::Sync => commands::sync::execute(&harvest).await,
        Command::Info {
            resolve_names,
            json,
        } => commands::info::execute(&harvest, resolve_names, json).await,
    };

    harvest.close().await;
    result?;
    Ok(())
}
