//! Frame acquisition via an external capture command
//!
//! Camera hardware is an external collaborator: the gateway runs a
//! configured command once per decision cycle and takes its stdout as the
//! frame bytes (e.g. a libcamera/ffmpeg one-shot JPEG capture).

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// A captured camera frame (opaque image bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture command failed to run: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("capture command exited with {0}")]
    NonZeroExit(std::process::ExitStatus),
    #[error("capture command produced no frame data")]
    EmptyFrame,
}

/// Capability for acquiring a fresh frame per decision cycle.
/// Passed into the controller explicitly; there is no ambient camera state.
#[async_trait]
pub trait FrameSource: Send {
    async fn capture(&mut self) -> Result<Frame, CaptureError>;
}

/// FrameSource that shells out to a configured capture command
pub struct CommandFrameSource {
    program: String,
    args: Vec<String>,
}

impl CommandFrameSource {
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self { program, args: parts.collect() }
    }
}

#[async_trait]
impl FrameSource for CommandFrameSource {
    async fn capture(&mut self) -> Result<Frame, CaptureError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(CaptureError::Spawn)?;

        if !output.status.success() {
            return Err(CaptureError::NonZeroExit(output.status));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::EmptyFrame);
        }

        debug!(bytes = output.stdout.len(), "frame_captured");
        Ok(Frame { bytes: output.stdout })
    }
}
