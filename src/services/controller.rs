//! Access decision state machine
//!
//! The controller consumes classified link messages. Telemetry overwrites
//! the store; each request runs one strictly sequential decision:
//! capture frame -> recognize -> consult presence ledger -> record -> open
//! gate. The presence query and the append happen inside one ledger
//! transaction, and the gate command is only sent after the event is
//! durably recorded. Every error fails closed (gate stays shut) and is
//! contained within that request; the loop never aborts.

use crate::domain::types::{
    normalize_plate, AdmissionEvent, DenyReason, Direction, FailReason, Message, RequestOutcome,
    TelemetryReading,
};
use crate::infra::metrics::Metrics;
use crate::io::camera::FrameSource;
use crate::io::gate::GatePort;
use crate::io::ledger::PresenceLedger;
use crate::services::recognition::RecognitionPort;
use crate::services::telemetry::TelemetryStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

pub struct AccessController {
    telemetry: TelemetryStore,
    ledger: Arc<PresenceLedger>,
    frames: Box<dyn FrameSource>,
    recognizer: Box<dyn RecognitionPort>,
    gate: Box<dyn GatePort>,
    metrics: Arc<Metrics>,
}

impl AccessController {
    pub fn new(
        ledger: Arc<PresenceLedger>,
        frames: Box<dyn FrameSource>,
        recognizer: Box<dyn RecognitionPort>,
        gate: Box<dyn GatePort>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { telemetry: TelemetryStore::new(), ledger, frames, recognizer, gate, metrics }
    }

    /// Main control loop: consumes messages until the channel closes or
    /// shutdown is signalled. Messages are handled one at a time, so the
    /// in-flight request always reaches a terminal state before exit.
    pub async fn run(
        &mut self,
        mut event_rx: mpsc::Receiver<Message>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("controller_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("controller_shutdown");
                        return;
                    }
                }
                msg = event_rx.recv() => {
                    match msg {
                        Some(msg) => self.process_message(msg).await,
                        None => {
                            info!("controller_channel_closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Dispatch a single classified link message
    pub async fn process_message(&mut self, msg: Message) {
        match msg {
            Message::Telemetry(reading) => {
                self.telemetry.update(reading);
                self.metrics.record_telemetry_update();
            }
            Message::Request(direction) => {
                let start = Instant::now();
                let outcome = self.handle_request(direction).await;
                let latency_us = start.elapsed().as_micros() as u64;
                self.metrics.record_request(&outcome, latency_us);

                match &outcome {
                    RequestOutcome::Admitted { plate, direction } => {
                        info!(
                            plate = %plate,
                            direction = %direction,
                            latency_us = %latency_us,
                            "request_admitted"
                        );
                    }
                    RequestOutcome::Denied(reason) => {
                        info!(
                            direction = %direction,
                            reason = %reason.as_str(),
                            latency_us = %latency_us,
                            "request_denied"
                        );
                    }
                    RequestOutcome::Failed(reason) => {
                        warn!(
                            direction = %direction,
                            reason = %reason.as_str(),
                            latency_us = %latency_us,
                            "request_failed"
                        );
                    }
                }
            }
            Message::MalformedTelemetry { raw } => {
                // Previous store value is retained; never fatal
                warn!(raw = %raw, "telemetry_malformed");
            }
            Message::Unknown { raw } => {
                debug!(raw = %raw, "link_line_ignored");
            }
        }
    }

    /// One request's full lifecycle; always reaches a terminal outcome.
    /// No response is written to the link on denial or failure - the
    /// closed gate is the fail-safe default and the ESP32 may retry.
    pub async fn handle_request(&mut self, direction: Direction) -> RequestOutcome {
        let frame = match self.frames.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "frame_capture_failed");
                return RequestOutcome::Failed(FailReason::FrameCaptureFailed);
            }
        };

        let (identifier, _region) = self.recognizer.recognize(&frame).await;
        let Some(plate) = identifier.as_deref().and_then(normalize_plate) else {
            return RequestOutcome::Denied(DenyReason::NoPlateRecognized);
        };

        // Presence check and append under one ledger transaction so two
        // concurrent requests for the same plate serialize
        let mut txn = self.ledger.begin();

        // Entry carries no presence precondition; duplicate IN events
        // accumulate under the counted rule. Exit requires known presence.
        if direction == Direction::Out {
            match txn.is_inside(&plate) {
                Ok(true) => {}
                Ok(false) => {
                    return RequestOutcome::Denied(DenyReason::VehicleNotRegisteredAsInside)
                }
                Err(e) => {
                    error!(plate = %plate, error = %e, "ledger_query_failed");
                    return RequestOutcome::Failed(FailReason::LedgerQueryFailed);
                }
            }
        }

        let event = AdmissionEvent::new(plate.clone(), direction, self.telemetry.current());
        if let Err(e) = txn.record(&event) {
            error!(plate = %plate, error = %e, "ledger_record_failed");
            return RequestOutcome::Failed(FailReason::LedgerWriteFailed);
        }
        drop(txn);

        // Only after the durable record: command the physical gate
        if let Err(e) = self.gate.open(direction).await {
            error!(plate = %plate, direction = %direction, error = %e, "gate_open_failed");
            return RequestOutcome::Failed(FailReason::GateUnavailable);
        }

        RequestOutcome::Admitted { plate, direction }
    }

    /// Telemetry held right now (snapshot attached to admissions)
    pub fn current_telemetry(&self) -> Option<TelemetryReading> {
        self.telemetry.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Rect;
    use crate::io::camera::{CaptureError, Frame};
    use crate::services::recognition::Recognition;
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;

    struct FakeFrames {
        fail: bool,
    }

    #[async_trait]
    impl FrameSource for FakeFrames {
        async fn capture(&mut self) -> Result<Frame, CaptureError> {
            if self.fail {
                Err(CaptureError::EmptyFrame)
            } else {
                Ok(Frame { bytes: vec![0xFF, 0xD8] })
            }
        }
    }

    struct FakeRecognizer {
        plate: Option<String>,
    }

    #[async_trait]
    impl RecognitionPort for FakeRecognizer {
        async fn recognize(&mut self, _frame: &Frame) -> Recognition {
            match &self.plate {
                Some(plate) => {
                    (Some(plate.clone()), Some(Rect { x1: 0, y1: 0, x2: 100, y2: 40 }))
                }
                None => (None, None),
            }
        }
    }

    struct ChannelGate {
        tx: mpsc::UnboundedSender<Direction>,
    }

    #[async_trait]
    impl GatePort for ChannelGate {
        async fn open(&self, direction: Direction) -> Result<(), crate::io::gate::GateError> {
            self.tx.send(direction).map_err(|_| crate::io::gate::GateError::QueueClosed)
        }
    }

    struct TestController {
        controller: AccessController,
        gate_rx: mpsc::UnboundedReceiver<Direction>,
        ledger: Arc<PresenceLedger>,
        ledger_path: std::path::PathBuf,
        #[allow(dead_code)]
        dir: TempDir,
    }

    impl TestController {
        fn gate_commands(&mut self) -> Vec<Direction> {
            let mut commands = Vec::new();
            while let Ok(direction) = self.gate_rx.try_recv() {
                commands.push(direction);
            }
            commands
        }

        fn ledger_rows(&self) -> Vec<AdmissionEvent> {
            match std::fs::read_to_string(&self.ledger_path) {
                Ok(content) => content
                    .lines()
                    .map(|line| serde_json::from_str(line).unwrap())
                    .collect(),
                Err(_) => Vec::new(),
            }
        }
    }

    fn create_controller(plate: Option<&str>) -> TestController {
        create_controller_with(plate, false)
    }

    fn create_controller_with(plate: Option<&str>, capture_fails: bool) -> TestController {
        let dir = tempfile::tempdir().unwrap();
        let ledger_path = dir.path().join("ledger.jsonl");
        let ledger = Arc::new(PresenceLedger::open(&ledger_path).unwrap());
        let (gate_tx, gate_rx) = mpsc::unbounded_channel();

        let controller = AccessController::new(
            ledger.clone(),
            Box::new(FakeFrames { fail: capture_fails }),
            Box::new(FakeRecognizer { plate: plate.map(str::to_string) }),
            Box::new(ChannelGate { tx: gate_tx }),
            Arc::new(Metrics::new()),
        );

        TestController { controller, gate_rx, ledger, ledger_path, dir }
    }

    fn telemetry(temp: f64) -> TelemetryReading {
        TelemetryReading {
            temperature_c: temp,
            humidity_pct: 60.0,
            flame: false,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_entry_admitted_and_recorded() {
        // Scenario A: REQ_IN, recognized ABC123, ledger empty
        let mut t = create_controller(Some("ABC123"));

        let outcome = t.controller.handle_request(Direction::In).await;
        assert_eq!(
            outcome,
            RequestOutcome::Admitted { plate: "ABC123".to_string(), direction: Direction::In }
        );

        let rows = t.ledger_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].plate, "ABC123");
        assert_eq!(rows[0].direction, Direction::In);
        assert_eq!(t.gate_commands(), vec![Direction::In]);
    }

    #[tokio::test]
    async fn test_exit_after_entry_admitted() {
        // Scenario B: REQ_OUT immediately after the matching entry
        let mut t = create_controller(Some("ABC123"));

        t.controller.handle_request(Direction::In).await;
        let outcome = t.controller.handle_request(Direction::Out).await;

        assert_eq!(
            outcome,
            RequestOutcome::Admitted { plate: "ABC123".to_string(), direction: Direction::Out }
        );
        assert_eq!(t.ledger_rows().len(), 2);
        assert_eq!(t.gate_commands(), vec![Direction::In, Direction::Out]);
        assert!(!t.ledger.is_inside("ABC123").unwrap());
    }

    #[tokio::test]
    async fn test_exit_without_entry_denied() {
        // Scenario C: REQ_OUT for a plate never admitted
        let mut t = create_controller(Some("XYZ999"));

        let outcome = t.controller.handle_request(Direction::Out).await;

        assert_eq!(outcome, RequestOutcome::Denied(DenyReason::VehicleNotRegisteredAsInside));
        assert!(t.ledger_rows().is_empty());
        assert!(t.gate_commands().is_empty());
    }

    #[tokio::test]
    async fn test_no_plate_denied_without_side_effects() {
        // Scenario D: recognition yields no identifier
        let mut t = create_controller(None);

        let outcome = t.controller.handle_request(Direction::In).await;

        assert_eq!(outcome, RequestOutcome::Denied(DenyReason::NoPlateRecognized));
        assert!(t.ledger_rows().is_empty());
        assert!(t.gate_commands().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_write_failure_fails_closed() {
        let mut t = create_controller(Some("ABC123"));
        t.ledger.set_fail_writes(true);

        let outcome = t.controller.handle_request(Direction::In).await;

        assert_eq!(outcome, RequestOutcome::Failed(FailReason::LedgerWriteFailed));
        assert!(t.gate_commands().is_empty());
        assert!(t.ledger_rows().is_empty());

        // Loop keeps serving once the ledger recovers
        t.ledger.set_fail_writes(false);
        let outcome = t.controller.handle_request(Direction::In).await;
        assert!(matches!(outcome, RequestOutcome::Admitted { .. }));
    }

    #[tokio::test]
    async fn test_frame_capture_failure_fails_closed() {
        let mut t = create_controller_with(Some("ABC123"), true);

        let outcome = t.controller.handle_request(Direction::In).await;

        assert_eq!(outcome, RequestOutcome::Failed(FailReason::FrameCaptureFailed));
        assert!(t.gate_commands().is_empty());
    }

    #[tokio::test]
    async fn test_plate_normalized_before_ledger() {
        let mut t = create_controller(Some("ab-12.3c"));

        t.controller.handle_request(Direction::In).await;

        let rows = t.ledger_rows();
        assert_eq!(rows[0].plate, "AB123C");
        assert!(t.ledger.is_inside("AB123C").unwrap());
    }

    #[tokio::test]
    async fn test_identifier_empty_after_normalization_is_denied() {
        let mut t = create_controller(Some("---"));

        let outcome = t.controller.handle_request(Direction::In).await;
        assert_eq!(outcome, RequestOutcome::Denied(DenyReason::NoPlateRecognized));
    }

    #[tokio::test]
    async fn test_admission_snapshots_current_telemetry() {
        let mut t = create_controller(Some("ABC123"));

        t.controller.process_message(Message::Telemetry(telemetry(21.0))).await;
        t.controller.process_message(Message::Telemetry(telemetry(27.5))).await;
        t.controller.process_message(Message::Request(Direction::In)).await;

        let rows = t.ledger_rows();
        let snapshot = rows[0].telemetry.expect("snapshot attached");
        assert_eq!(snapshot.temperature_c, 27.5);
    }

    #[tokio::test]
    async fn test_admission_without_telemetry_has_null_snapshot() {
        let mut t = create_controller(Some("ABC123"));

        t.controller.process_message(Message::Request(Direction::In)).await;

        assert_eq!(t.ledger_rows()[0].telemetry, None);
    }

    #[tokio::test]
    async fn test_malformed_telemetry_retains_previous_reading() {
        let mut t = create_controller(Some("ABC123"));

        for temp in [20.0, 21.0, 22.0] {
            t.controller.process_message(Message::Telemetry(telemetry(temp))).await;
        }
        t.controller
            .process_message(Message::MalformedTelemetry { raw: "DHT:abc,60.0,0".to_string() })
            .await;

        assert_eq!(t.controller.current_telemetry().unwrap().temperature_c, 22.0);
    }

    #[tokio::test]
    async fn test_unknown_line_is_ignored() {
        let mut t = create_controller(Some("ABC123"));

        t.controller.process_message(Message::Unknown { raw: "GARBAGE".to_string() }).await;

        assert!(t.ledger_rows().is_empty());
        assert!(t.gate_commands().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_entries_accumulate() {
        // Preserved from the source system: IN has no presence precondition
        let mut t = create_controller(Some("ABC123"));

        t.controller.handle_request(Direction::In).await;
        t.controller.handle_request(Direction::In).await;
        t.controller.handle_request(Direction::Out).await;

        // Two INs against one OUT: still inside under the counted rule
        assert!(t.ledger.is_inside("ABC123").unwrap());
    }
}
