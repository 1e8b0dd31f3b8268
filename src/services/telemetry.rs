//! Last-observed environmental telemetry
//!
//! Holds the most recent reading from the ESP32, overwritten on every
//! telemetry message. No history; last-write-wins. Owned by the controller
//! loop, so no locking is needed.

use crate::domain::types::TelemetryReading;
use tracing::debug;

#[derive(Debug, Default)]
pub struct TelemetryStore {
    current: Option<TelemetryReading>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored reading
    pub fn update(&mut self, reading: TelemetryReading) {
        debug!(
            temperature_c = reading.temperature_c,
            humidity_pct = reading.humidity_pct,
            flame = reading.flame,
            "telemetry_updated"
        );
        self.current = Some(reading);
    }

    /// The reading held right now; None before the first telemetry arrives
    pub fn current(&self) -> Option<TelemetryReading> {
        self.current
    }
}
