//! Services - business logic and state management
//!
//! This module contains the core business logic:
//! - `controller` - the access decision state machine and control loop
//! - `telemetry` - last-observed environmental telemetry store
//! - `recognition` - plate recognition port (external collaborator)

pub mod controller;
pub mod recognition;
pub mod telemetry;

// Re-export commonly used types
pub use controller::AccessController;
pub use recognition::{CommandRecognizer, Recognition, RecognitionPort};
pub use telemetry::TelemetryStore;
