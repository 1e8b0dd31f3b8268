//! Serial link framing and message classification
//!
//! Protocol (ASCII, newline-terminated, one message per line):
//! - Telemetry: `DHT:<tempC>,<humidityPct>,<flame:0|1>` - exactly three fields
//! - Requests: `REQ_IN`, `REQ_OUT` - exact literal match
//! - Anything else: ignored, non-fatal

use crate::domain::types::{Direction, Message, TelemetryReading};
use anyhow::Context;
use chrono::Utc;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, trace, warn};

const TELEMETRY_PREFIX: &str = "DHT:";
const READ_CHUNK: usize = 256;

pub type LinkReader = tokio::io::ReadHalf<tokio_serial::SerialStream>;
pub type LinkWriter = tokio::io::WriteHalf<tokio_serial::SerialStream>;

/// Open the serial device and split it into read/write halves.
/// Startup-fatal on failure: the gateway has no degraded mode without its link.
pub fn open_link(device: &str, baud: u32) -> anyhow::Result<(LinkReader, LinkWriter)> {
    let port = tokio_serial::new(device, baud)
        .timeout(Duration::from_millis(100))
        .open_native_async()
        .with_context(|| format!("failed to open serial device {}", device))?;
    info!(device = %device, baud = %baud, "link_opened");
    Ok(tokio::io::split(port))
}

/// Line framer and classifier for the ESP32 link.
///
/// Keeps a persistent byte buffer because serial reads arrive in arbitrary
/// chunks; a line is only classified once its terminating newline is seen.
#[derive(Debug, Default)]
pub struct LinkCodec {
    buf: Vec<u8>,
}

impl LinkCodec {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(READ_CHUNK) }
    }

    /// Append raw bytes read from the link
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Non-blocking poll: classify the next complete buffered line.
    /// Returns None when no full line is available. Empty lines are skipped.
    pub fn next_message(&mut self) -> Option<Message> {
        loop {
            let nl = self.buf.iter().position(|&b| b == b'\n')?;
            let raw: Vec<u8> = self.buf.drain(..=nl).collect();
            let line = String::from_utf8_lossy(&raw[..nl]);
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            return Some(classify_line(line));
        }
    }
}

/// Classify one complete line (line terminator already stripped)
fn classify_line(line: &str) -> Message {
    if let Some(fields) = line.strip_prefix(TELEMETRY_PREFIX) {
        return match parse_telemetry(fields) {
            Some(reading) => Message::Telemetry(reading),
            None => Message::MalformedTelemetry { raw: line.to_string() },
        };
    }
    for direction in [Direction::In, Direction::Out] {
        if line == direction.request_token() {
            return Message::Request(direction);
        }
    }
    Message::Unknown { raw: line.to_string() }
}

/// Parse the payload of a `DHT:` line: exactly three comma-separated fields,
/// flame strictly 0 or 1
fn parse_telemetry(fields: &str) -> Option<TelemetryReading> {
    let mut parts = fields.split(',');
    let temperature_c = parts.next()?.trim().parse::<f64>().ok()?;
    let humidity_pct = parts.next()?.trim().parse::<f64>().ok()?;
    let flame = match parts.next()?.trim() {
        "0" => false,
        "1" => true,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(TelemetryReading { temperature_c, humidity_pct, flame, observed_at: Utc::now() })
}

/// Owns the serial read half: decodes lines and forwards classified
/// messages into the controller's event channel.
pub struct LinkMonitor {
    reader: LinkReader,
    codec: LinkCodec,
    event_tx: mpsc::Sender<Message>,
}

impl LinkMonitor {
    pub fn new(reader: LinkReader, event_tx: mpsc::Sender<Message>) -> Self {
        Self { reader, codec: LinkCodec::new(), event_tx }
    }

    /// Read loop; exits on shutdown signal or when the event channel closes
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("link_monitor_started");

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("link_monitor_shutdown");
                        return;
                    }
                }
                read = self.reader.read(&mut chunk) => {
                    match read {
                        Ok(0) => {
                            // Serial devices normally never report EOF; back off
                            // instead of spinning if one does
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                        Ok(n) => {
                            trace!(bytes = n, "link_bytes_read");
                            self.codec.push_bytes(&chunk[..n]);
                            while let Some(msg) = self.codec.next_message() {
                                if self.event_tx.send(msg).await.is_err() {
                                    info!("link_monitor_channel_closed");
                                    return;
                                }
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::TimedOut => {}
                        Err(e) => {
                            warn!(error = %e, "link_read_error");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }
    }
}
