mod cycle;
mod exchange;
mod operator;
mod transport;

use anyhow::Result;
use clap::Parser;
use cycle::{CycleDriver, ProbeConfig};
use exchange::DrainPolicy;
use operator::{ConsoleSink, OperatorSink};
use probe_shared::{defaults, Endpoint};
use std::time::Duration;
use transport::{ensure_associated, RouteLink, TcpConnector};

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Periodically posts a status report to a fixed peer over a raw TCP
/// connection and prints the reply or a failure diagnosis.
#[derive(Debug, Parser)]
#[command(name = "tcp-probe", version)]
struct Cli {
    /// Peer address (numeric, no name resolution)
    #[arg(long, default_value_t = defaults::HOST.to_string())]
    host: String,
    /// Peer port
    #[arg(long, default_value_t = defaults::PORT)]
    port: u16,
    /// Network to join
    #[arg(long, env = "WIFI_SSID", default_value = "")]
    ssid: String,
    /// Shared secret of the network
    #[arg(long, env = "WIFI_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,
    /// Device identifier sent in the payload
    #[arg(long, default_value = defaults::DEVICE_ID)]
    device: String,
    /// Seconds between cycles
    #[arg(long, default_value_t = defaults::CYCLE_INTERVAL_MS / 1000)]
    interval_secs: u64,
    /// Wait for the first response byte, in milliseconds
    #[arg(long, default_value_t = defaults::RESPONSE_TIMEOUT_MS)]
    response_timeout_ms: u64,
    /// Upper bound on a connect attempt, in milliseconds
    #[arg(long, default_value_t = defaults::CONNECT_TIMEOUT_MS)]
    connect_timeout_ms: u64,
    /// Keep reading the response until the peer closes
    #[arg(long)]
    drain_until_closed: bool,
    /// Stop after this many cycles (default: run forever)
    #[arg(long)]
    cycles: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<ProbeConfig> {
        Ok(ProbeConfig {
            device_id: self.device,
            endpoint: Endpoint::new(&self.host, self.port)?,
            ssid: self.ssid,
            password: self.password,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            cycle_interval: Duration::from_secs(self.interval_secs),
            drain_policy: if self.drain_until_closed {
                DrainPolicy::UntilClosed
            } else {
                DrainPolicy::BestEffort
            },
            max_cycles: self.cycles,
            ..Default::default()
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Cli::parse().into_config()?;

    info!("Probe starting: device {}", config.device_id);
    info!("  Peer: {}", config.endpoint);
    info!("  Interval: {:?}, response timeout: {:?}", config.cycle_interval, config.response_timeout);
    info!("  Drain policy: {:?}", config.drain_policy);

    let mut sink = ConsoleSink;
    sink.line("");
    sink.line("=== Direct TCP Test ===");

    let mut link = RouteLink::new(config.endpoint);
    ensure_associated(
        &mut link,
        &config.ssid,
        &config.password,
        config.association_poll,
        &mut sink,
    )
    .await?;

    let connector = TcpConnector::new(config.connect_timeout);
    let mut driver = CycleDriver::new(config, connector)?;
    let tally = driver.run(&mut sink).await;

    info!(
        "Finished {} cycles: responded={} timeout={} failed={}",
        tally.total(),
        tally.responded,
        tally.timed_out,
        tally.connect_failed
    );
    Ok(())
}
