mod reset;
mod storage;

use anyhow::Result;
use clap::Parser;
use reset::ResetPlan;
use std::io;
use std::path::PathBuf;
use storage::{DirFilesystem, FilePreferences};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wipes the flash filesystem and preference namespaces, then verifies
#[derive(Debug, Parser)]
#[command(name = "reset-tool", version)]
struct Cli {
    /// Directory holding the flash filesystem
    #[arg(long)]
    fs_root: PathBuf,
    /// Directory holding one JSON file per preference namespace
    #[arg(long)]
    prefs_root: PathBuf,
    /// Namespace to clear (repeatable)
    #[arg(long = "namespace", default_value = "vehicle_config")]
    namespaces: Vec<String>,
    /// Key checked to confirm a namespace was cleared
    #[arg(long, default_value = "ngrokHost")]
    probe_key: String,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let plan = ResetPlan {
        namespaces: cli.namespaces,
        probe_key: cli.probe_key,
    };

    let mut flash = DirFilesystem::new(cli.fs_root);
    let prefs = FilePreferences::new(cli.prefs_root);
    let mut out = io::stdout().lock();

    reset::print_banner(&mut out)?;
    let report = reset::run(&mut flash, &prefs, &plan, &mut out)?;

    if report.is_clean(&plan.namespaces) {
        info!("Storage verified empty");
    } else {
        warn!("Reset incomplete: {:?}", report);
    }
    Ok(())
}
