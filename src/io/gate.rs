//! Gate command port and serial writer worker
//!
//! Gate commands are queued through an mpsc channel to a dedicated writer
//! task that owns the serial write half. This keeps link writes off the
//! decision path and gives the physical gate a single-writer boundary.

use crate::domain::types::Direction;
use async_trait::async_trait;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("gate command queue unavailable")]
    QueueClosed,
}

/// External collaborator interface: sends a gate-open command for a
/// direction over the link
#[async_trait]
pub trait GatePort: Send + Sync {
    async fn open(&self, direction: Direction) -> Result<(), GateError>;
}

/// A gate command queued for the writer task
#[derive(Debug)]
pub struct GateCmd {
    pub direction: Direction,
    /// When the command was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// GatePort backed by the serial writer queue
pub struct SerialGate {
    cmd_tx: mpsc::Sender<GateCmd>,
}

#[async_trait]
impl GatePort for SerialGate {
    async fn open(&self, direction: Direction) -> Result<(), GateError> {
        self.cmd_tx
            .send(GateCmd { direction, enqueued_at: Instant::now() })
            .await
            .map_err(|_| GateError::QueueClosed)
    }
}

/// Worker that owns the link write half and drains the command queue
pub struct GateCmdWriter<W> {
    writer: W,
    cmd_rx: mpsc::Receiver<GateCmd>,
}

impl<W: AsyncWrite + Unpin + Send> GateCmdWriter<W> {
    pub fn new(writer: W, cmd_rx: mpsc::Receiver<GateCmd>) -> Self {
        Self { writer, cmd_rx }
    }

    /// Run the worker, processing commands until the channel closes
    pub async fn run(mut self) {
        info!("gate_writer_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            let queue_delay_us = cmd.enqueued_at.elapsed().as_micros() as u64;
            let write_start = Instant::now();

            let result = async {
                self.writer.write_all(cmd.direction.open_command()).await?;
                self.writer.flush().await
            }
            .await;

            match result {
                Ok(()) => {
                    let write_us = write_start.elapsed().as_micros() as u64;
                    info!(
                        direction = %cmd.direction,
                        queue_delay_us = %queue_delay_us,
                        write_us = %write_us,
                        "gate_open_sent"
                    );
                    if queue_delay_us > 1000 {
                        warn!(queue_delay_us = %queue_delay_us, "gate_cmd_queue_delay_high");
                    }
                }
                Err(e) => {
                    error!(direction = %cmd.direction, error = %e, "gate_write_error");
                }
            }
        }

        info!("gate_writer_stopped");
    }
}

/// Create the gate command channel, its port, and the writer worker
/// (to be spawned)
pub fn create_gate_writer<W: AsyncWrite + Unpin + Send>(
    writer: W,
    buffer_size: usize,
) -> (SerialGate, GateCmdWriter<W>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size);
    (SerialGate { cmd_tx }, GateCmdWriter::new(writer, cmd_rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writer_emits_exact_open_literals() {
        let (tx, rx) = tokio::io::duplex(64);
        let (gate, writer) = create_gate_writer(tx, 8);
        let handle = tokio::spawn(writer.run());

        gate.open(Direction::In).await.unwrap();
        gate.open(Direction::Out).await.unwrap();
        drop(gate);

        handle.await.unwrap();

        let mut out = Vec::new();
        let mut rx = rx;
        tokio::io::AsyncReadExt::read_to_end(&mut rx, &mut out).await.unwrap();
        assert_eq!(out, b"OPEN_IN\nOPEN_OUT\n");
    }

    #[tokio::test]
    async fn test_open_fails_when_queue_closed() {
        let (tx, _rx) = tokio::io::duplex(64);
        let (gate, writer) = create_gate_writer(tx, 8);
        drop(writer);

        let result = gate.open(Direction::In).await;
        assert!(matches!(result, Err(GateError::QueueClosed)));
    }
}
