//! Domain models - core types shared across the gateway
//!
//! This module contains the canonical data types used throughout the system:
//! - `AdmissionEvent` - the persisted record of one gate decision
//! - `TelemetryReading` - environmental reading from the ESP32
//! - `Message` - classification of one serial line
//! - `Direction` / `RequestOutcome` - decision vocabulary

pub mod types;

// Re-export commonly used types at module level
pub use types::{
    normalize_plate, AdmissionEvent, DenyReason, Direction, FailReason, Message, Rect,
    RequestOutcome, TelemetryReading,
};
