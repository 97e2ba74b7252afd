mod routes;
mod session;

use clap::Parser;
use probe_shared::defaults;
use session::{ReportSession, SessionOutcome};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Receives status reports posted by field devices
#[derive(Debug, Parser)]
#[command(name = "status-server", version)]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = defaults::PORT)]
    port: u16,
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
    /// Give up on a client that sends nothing for this many seconds
    #[arg(long, default_value_t = 30)]
    read_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let read_timeout = Duration::from_secs(cli.read_timeout_secs);

    let listener = TcpListener::bind((cli.bind.as_str(), cli.port)).await?;
    info!("===== ESP32 DATA RECEIVER SERVER =====");
    info!("Server running on {}", listener.local_addr()?);
    info!("Local URL: http://localhost:{}", cli.port);
    info!("Waiting for ESP32 data...");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, addr) = accepted?;
                info!("Connection from: {}", addr);

                tokio::spawn(async move {
                    match ReportSession::new(socket, addr, read_timeout).serve().await {
                        Ok(SessionOutcome::Answered(status)) => info!("{} answered with {}", addr, status),
                        Ok(SessionOutcome::Abandoned) => info!("Client disconnected: {}", addr),
                        Err(e) => error!("Session with {} failed: {}", addr, e),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Server shutting down gracefully...");
                return Ok(());
            }
        }
    }
}
