//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `link` - serial line framing and message classification (ESP32 link)
//! - `gate` - gate command port and serial writer worker
//! - `ledger` - durable presence ledger (JSONL admission log)
//! - `camera` - frame acquisition via an external capture command

pub mod camera;
pub mod gate;
pub mod ledger;
pub mod link;

// Re-export commonly used types
pub use camera::{CaptureError, CommandFrameSource, Frame, FrameSource};
pub use gate::{create_gate_writer, GateCmd, GateCmdWriter, GateError, GatePort, SerialGate};
pub use ledger::{LedgerError, LedgerTxn, PresenceLedger};
pub use link::{open_link, LinkCodec, LinkMonitor};
