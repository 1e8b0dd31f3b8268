//! Shared types for the parking gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Travel direction through the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    /// Serial token the ESP32 sends to request passage in this direction
    pub fn request_token(&self) -> &'static str {
        match self {
            Direction::In => "REQ_IN",
            Direction::Out => "REQ_OUT",
        }
    }

    /// Serial command that opens the gate for this direction
    pub fn open_command(&self) -> &'static [u8] {
        match self {
            Direction::In => b"OPEN_IN\n",
            Direction::Out => b"OPEN_OUT\n",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environmental reading reported by the ESP32 over the serial link
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub flame: bool,
    pub observed_at: DateTime<Utc>,
}

/// One admission decision as persisted in the presence ledger.
///
/// Rows are append-only; their file order is the ledger's total order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionEvent {
    pub event_id: String,
    pub plate: String,
    pub direction: Direction,
    pub ts: DateTime<Utc>,
    /// Telemetry held at decision time, if any had arrived yet.
    /// Denormalized snapshot, never retroactively corrected.
    pub telemetry: Option<TelemetryReading>,
}

impl AdmissionEvent {
    pub fn new(plate: String, direction: Direction, telemetry: Option<TelemetryReading>) -> Self {
        Self { event_id: new_uuid_v7(), plate, direction, ts: Utc::now(), telemetry }
    }
}

/// Bounding region reported by the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    /// A zero-area region means the detector fired on nothing usable
    pub fn is_degenerate(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }
}

/// Message classified from one complete serial line
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Telemetry(TelemetryReading),
    Request(Direction),
    /// `DHT:`-shaped line that failed to parse; recoverable, the previous
    /// telemetry value is retained
    MalformedTelemetry { raw: String },
    Unknown { raw: String },
}

/// Normalize a recognized identifier: keep ASCII alphanumerics, uppercase.
/// Returns None when nothing survives normalization.
pub fn normalize_plate(raw: &str) -> Option<String> {
    let plate: String =
        raw.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_uppercase()).collect();
    if plate.is_empty() {
        None
    } else {
        Some(plate)
    }
}

/// Policy reason a request was denied (no gate command sent)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoPlateRecognized,
    VehicleNotRegisteredAsInside,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NoPlateRecognized => "no_plate_recognized",
            DenyReason::VehicleNotRegisteredAsInside => "vehicle_not_registered_as_inside",
        }
    }
}

/// Resource failure that terminated a request (fails closed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    FrameCaptureFailed,
    LedgerQueryFailed,
    LedgerWriteFailed,
    GateUnavailable,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::FrameCaptureFailed => "frame_capture_failed",
            FailReason::LedgerQueryFailed => "ledger_query_failed",
            FailReason::LedgerWriteFailed => "ledger_write_failed",
            FailReason::GateUnavailable => "gate_unavailable",
        }
    }
}

/// Terminal outcome of one request's decision run
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Admitted { plate: String, direction: Direction },
    Denied(DenyReason),
    Failed(FailReason),
}
