//! Parking gateway - serial-driven access control for a parking facility
//!
//! An ESP32 on the serial link sends environmental telemetry and entry/exit
//! requests; the gateway recognizes the vehicle plate, consults the durable
//! presence ledger, and opens the gate only for legal, durably recorded
//! admissions.
//!
//! Module structure:
//! - `domain/` - Core types (AdmissionEvent, TelemetryReading, Message)
//! - `io/` - External interfaces (serial link, gate writer, ledger, camera)
//! - `services/` - Business logic (AccessController, recognition, telemetry)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use parking_gateway::infra::{Config, Metrics};
use parking_gateway::io::{create_gate_writer, open_link, CommandFrameSource, LinkMonitor, PresenceLedger};
use parking_gateway::services::{AccessController, CommandRecognizer};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Parking gateway - automated parking facility gate control
#[derive(Parser, Debug)]
#[command(name = "parking-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to the CONFIG_FILE
    /// environment variable, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("parking-gateway starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        serial_device = %config.serial_device(),
        serial_baud = %config.serial_baud(),
        ledger_file = %config.ledger_file(),
        capture_cmd = %config.capture_cmd(),
        recognizer_cmd = %config.recognizer_cmd(),
        metrics_interval_secs = %config.metrics_interval_secs(),
        "config_loaded"
    );

    // Fatal acquisitions: a physical access controller has no degraded mode
    // without its link or its ledger
    let (link_reader, link_writer) = open_link(config.serial_device(), config.serial_baud())?;
    let ledger = Arc::new(
        PresenceLedger::open(config.ledger_file())
            .with_context(|| format!("failed to open presence ledger {}", config.ledger_file()))?,
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(1000);

    // Start the serial reader
    let monitor = LinkMonitor::new(link_reader, event_tx);
    let monitor_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        monitor.run(monitor_shutdown).await;
    });

    // Start the gate writer (owns the serial write half)
    let (gate, gate_writer) = create_gate_writer(link_writer, 64);
    let gate_writer_handle = tokio::spawn(async move {
        gate_writer.run().await;
    });

    // Start metrics reporter
    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // External collaborators behind their ports
    let frames = Box::new(CommandFrameSource::new(config.capture_cmd()));
    let recognizer = Box::new(CommandRecognizer::new(config.recognizer_cmd()));

    let mut controller =
        AccessController::new(ledger, frames, recognizer, Box::new(gate), metrics);
    info!("controller_starting");

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run the control loop - consumes messages until shutdown or channel close
    controller.run(event_rx, shutdown_rx).await;

    // Dropping the controller closes the gate command channel; wait for the
    // writer to drain queued commands onto the link before exiting, so a
    // recorded admission is never left without its OPEN command
    drop(controller);
    let _ = gate_writer_handle.await;

    info!("parking-gateway shutdown complete");
    Ok(())
}
