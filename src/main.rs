//! Vigil - liveness monitor daemon.
//!
//! Wires the configured server monitor to the delivery queue and runs the
//! queue consumer against the reporting webhook until shutdown.

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil::config::Config;
use vigil::delivery::{run_delivery_loop, WebhookSink};
use vigil::monitor::ServerMonitor;
use vigil::scheduler::{Cron, JobSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vigil=info".parse()?),
        )
        .init();

    let webhook_url = std::env::var("REPORT_WEBHOOK")
        .map_err(|_| "environment variable REPORT_WEBHOOK is not defined")?;

    let config = Config::from_env()?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let mut crons = Vec::new();

    match config.servers() {
        Ok(servers) => {
            let monitor = ServerMonitor::from_config(&servers);
            tracing::info!(
                "monitoring {} servers every {}s",
                monitor.len(),
                servers.ping_interval_sec
            );
            crons.push(Cron::spawn(
                monitor,
                Duration::from_secs(servers.ping_interval_sec),
                Some(JobSink::Queue(tx.clone())),
            ));
        }
        Err(e) => {
            tracing::warn!("server monitor: {}", e);
            tracing::info!("disabling server monitor");
        }
    }

    if crons.is_empty() {
        return Err("no monitoring features enabled".into());
    }

    tracing::info!("running");
    let sink = WebhookSink::new(&webhook_url);
    tokio::select! {
        _ = run_delivery_loop(rx, tx.clone(), sink) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    for cron in crons {
        cron.abort();
        cron.join().await;
    }
    tracing::info!("stopped");

    Ok(())
}
