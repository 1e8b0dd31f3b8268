//! Plate recognition port
//!
//! The recognition pipeline (detection + OCR) is an opaque external
//! collaborator. Given a frame it returns at most one identifier and
//! bounding region; any internal recognizer error degrades to "nothing
//! found" - the core never distinguishes the two.

use crate::domain::types::Rect;
use crate::io::camera::Frame;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Result of one recognition attempt
pub type Recognition = (Option<String>, Option<Rect>);

#[async_trait]
pub trait RecognitionPort: Send {
    /// `(None, None)` means "no plate found"; recognizer failures must
    /// degrade to the same rather than signal an error
    async fn recognize(&mut self, frame: &Frame) -> Recognition;
}

/// RecognitionPort that pipes the frame to an external recognizer command.
///
/// Expected stdout, single line: `NONE`, or `<plate> <x1> <y1> <x2> <y2>`.
/// Only the first line is used; recognizers with multiple candidate regions
/// must print their highest-confidence one first.
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self { program, args: parts.collect() }
    }

    async fn run(&self, frame: &Frame) -> std::io::Result<Recognition> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&frame.bytes).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            warn!(status = %output.status, "recognizer_nonzero_exit");
            return Ok((None, None));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_recognizer_line(stdout.lines().next().unwrap_or("")))
    }
}

#[async_trait]
impl RecognitionPort for CommandRecognizer {
    async fn recognize(&mut self, frame: &Frame) -> Recognition {
        match self.run(frame).await {
            Ok(recognition) => recognition,
            Err(e) => {
                warn!(error = %e, "recognizer_degraded");
                (None, None)
            }
        }
    }
}

/// Parse one recognizer output line. Anything malformed, and any degenerate
/// (zero-area) region, counts as "no plate found".
fn parse_recognizer_line(line: &str) -> Recognition {
    let line = line.trim();
    if line.is_empty() || line == "NONE" {
        return (None, None);
    }

    let mut parts = line.split_whitespace();
    let plate = match parts.next() {
        Some(p) => p.to_string(),
        None => return (None, None),
    };
    let coords: Vec<i32> = parts.filter_map(|p| p.parse().ok()).collect();
    if coords.len() != 4 {
        warn!(raw = %line, "recognizer_output_malformed");
        return (None, None);
    }

    let region = Rect { x1: coords[0], y1: coords[1], x2: coords[2], y2: coords[3] };
    if region.is_degenerate() {
        debug!(raw = %line, "recognizer_region_degenerate");
        return (None, None);
    }

    (Some(plate), Some(region))
}
