//! Sequence Processing Engine
//!
//! Runs an ordered list of (operation, frame) steps through one engine.
//! Every failure is recorded against its own step and the run moves on.
//! With `abort_on_engine_failure` set, an engine failure stops the sequence.

use crate::config::RunConfiguration;
use crate::engine::{EngineStatus, SecurityEngine};
use crate::error::{EngineFailure, HarnessError};
use crate::frame_source;
use crate::types::{Direction, OperationKind, SequenceStep};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SequenceState {
    Idle,
    StepInFlight,
    Completed,
    Aborted,
}

impl SequenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceState::Idle => "IDLE",
            SequenceState::StepInFlight => "STEP_IN_FLIGHT",
            SequenceState::Completed => "COMPLETED",
            SequenceState::Aborted => "ABORTED",
        }
    }
}

/// Result of one executed step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// 1-based position in the sequence
    pub index: usize,
    pub kind: OperationKind,
    pub source_id: String,
    /// Length of the resolved input frame, if it could be read
    pub input_len: Option<usize>,
    /// Bytes produced (secured frame or recovered payload)
    pub result: Result<usize, HarnessError>,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything a sequence run produced, in step order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub state: SequenceState,
    pub steps_total: usize,
    pub outcomes: Vec<StepOutcome>,
    /// Set when the run ended in `Aborted`
    pub abort_reason: Option<HarnessError>,
}

impl SequenceReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Steps never attempted because the run aborted
    pub fn not_executed(&self) -> usize {
        self.steps_total - self.outcomes.len()
    }

    /// True when every step ran and succeeded
    pub fn is_clean(&self) -> bool {
        self.state == SequenceState::Completed && self.failed() == 0
    }
}

pub struct SequenceEngine<'a, E: SecurityEngine + ?Sized> {
    engine: &'a mut E,
    abort_on_engine_failure: bool,
    state: SequenceState,
}

impl<'a, E: SecurityEngine + ?Sized> SequenceEngine<'a, E> {
    pub fn new(engine: &'a mut E) -> Self {
        Self {
            engine,
            abort_on_engine_failure: false,
            state: SequenceState::Idle,
        }
    }

    /// Stop at the first engine failure instead of recording it and moving on
    pub fn abort_on_engine_failure(mut self, abort: bool) -> Self {
        self.abort_on_engine_failure = abort;
        self
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    /// Initialize the engine, execute every step in order, shut it down
    pub fn run(&mut self, config: &RunConfiguration, steps: &[SequenceStep]) -> SequenceReport {
        let mut report = SequenceReport {
            state: SequenceState::Idle,
            steps_total: steps.len(),
            outcomes: Vec::with_capacity(steps.len()),
            abort_reason: None,
        };

        if let Err(status) = self.engine.initialize(config) {
            let failure =
                EngineFailure::initialization(status.code(), self.engine.status_name(status));
            warn!(%failure, "engine initialization failed");
            self.state = SequenceState::Aborted;
            report.state = self.state;
            report.abort_reason = Some(HarnessError::EngineFailure(failure));
            return report;
        }

        info!(steps = steps.len(), "starting crypto sequence");
        for (idx, step) in steps.iter().enumerate() {
            self.state = SequenceState::StepInFlight;
            let outcome = self.execute(idx + 1, step);

            if let Err(err) = &outcome.result {
                warn!(step = idx + 1, kind = %step.kind, "{}", err);
                if self.abort_on_engine_failure && err.aborts_sequence() {
                    report.abort_reason = Some(err.clone());
                    report.outcomes.push(outcome);
                    self.state = SequenceState::Aborted;
                    break;
                }
            }
            report.outcomes.push(outcome);
        }

        if self.state != SequenceState::Aborted {
            self.state = SequenceState::Completed;
        }
        self.engine.shutdown();
        report.state = self.state;
        info!(
            state = self.state.as_str(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "crypto sequence finished"
        );
        report
    }

    /// Resolve, dispatch, release. The frame buffer never outlives this call.
    fn execute(&mut self, index: usize, step: &SequenceStep) -> StepOutcome {
        let source_id = step.source.identifier();
        debug!(step = index, kind = %step.kind, source = %source_id, "dispatching step");

        let buffer = match frame_source::resolve(&step.source) {
            Ok(buffer) => buffer,
            Err(err) => {
                return StepOutcome {
                    index,
                    kind: step.kind,
                    source_id,
                    input_len: None,
                    result: Err(err),
                };
            }
        };
        let input_len = Some(buffer.len());
        debug!(frame = %buffer.to_hex(), "step input");

        if !step.kind.is_implemented() {
            return StepOutcome {
                index,
                kind: step.kind,
                source_id,
                input_len,
                result: Err(HarnessError::NotImplemented { kind: step.kind }),
            };
        }

        let layer = step.kind.layer();
        let result = match step.kind.direction() {
            Direction::Apply => self
                .engine
                .apply_security(layer, buffer.as_slice())
                .map(|out| {
                    debug!(len = out.len(), frame = %hex::encode_upper(&out), "applied frame");
                    out.len()
                }),
            Direction::Process => {
                let mut input = buffer.into_inner();
                self.engine
                    .process_security(layer, &mut input)
                    .map(|processed| {
                        debug!(
                            spi = processed.spi,
                            len = processed.payload_len(),
                            "processed frame"
                        );
                        processed.payload_len()
                    })
            }
        };

        StepOutcome {
            index,
            kind: step.kind,
            result: result.map_err(|status| self.engine_failure(step.kind, &source_id, status)),
            source_id,
            input_len,
        }
    }

    fn engine_failure(
        &self,
        kind: OperationKind,
        source_id: &str,
        status: EngineStatus,
    ) -> HarnessError {
        HarnessError::EngineFailure(EngineFailure {
            kind: Some(kind),
            source_id: source_id.to_string(),
            status: status.code(),
            status_name: self.engine.status_name(status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProcessedFrame;
    use crate::types::{FrameSource, SecurityLayer};

    /// Records every call; fails the calls listed in `fail_calls`
    #[derive(Default)]
    struct RecordingEngine {
        calls: Vec<(SecurityLayer, Direction, Vec<u8>)>,
        fail_calls: Vec<usize>,
        fail_init: bool,
        shut_down: bool,
    }

    impl RecordingEngine {
        fn status(&self) -> Result<(), EngineStatus> {
            if self.fail_calls.contains(&self.calls.len()) {
                Err(EngineStatus::MAC_VALIDATION_ERROR)
            } else {
                Ok(())
            }
        }
    }

    impl SecurityEngine for RecordingEngine {
        fn initialize(&mut self, _: &RunConfiguration) -> Result<(), EngineStatus> {
            if self.fail_init {
                Err(EngineStatus::INTERNAL_ERROR)
            } else {
                Ok(())
            }
        }

        fn apply_security(
            &mut self,
            layer: SecurityLayer,
            frame: &[u8],
        ) -> Result<Vec<u8>, EngineStatus> {
            self.calls.push((layer, Direction::Apply, frame.to_vec()));
            self.status()?;
            Ok([frame, &[0u8; 4]].concat())
        }

        fn process_security(
            &mut self,
            layer: SecurityLayer,
            frame: &mut [u8],
        ) -> Result<ProcessedFrame, EngineStatus> {
            self.calls.push((layer, Direction::Process, frame.to_vec()));
            self.status()?;
            Ok(ProcessedFrame {
                spi: 1,
                sequence_number: 1,
                payload: frame[1..].to_vec(),
            })
        }

        fn shutdown(&mut self) {
            self.shut_down = true;
        }
    }

    fn bytes(data: &[u8]) -> FrameSource {
        FrameSource::Bytes(data.to_vec())
    }

    #[test]
    fn test_mixed_sequence_runs_in_order() {
        let mut engine = RecordingEngine::default();
        let steps = vec![
            SequenceStep::new(OperationKind::ApplyTelecommand, bytes(&[1, 1])),
            SequenceStep::new(OperationKind::ProcessTelecommand, bytes(&[2, 2, 2])),
            SequenceStep::new(OperationKind::ApplyTelemetry, bytes(&[3])),
        ];

        let report = SequenceEngine::new(&mut engine).run(&RunConfiguration::unit_test(), &steps);

        assert_eq!(report.state, SequenceState::Completed);
        assert_eq!(report.outcomes.len(), 3);
        let indices: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(report.outcomes[0].result, Ok(6));
        assert_eq!(report.outcomes[1].result, Ok(2));
        assert_eq!(
            report.outcomes[2].result,
            Err(HarnessError::NotImplemented {
                kind: OperationKind::ApplyTelemetry
            })
        );
        assert_eq!(report.outcomes[2].input_len, Some(1));

        assert_eq!(engine.calls.len(), 2);
        assert_eq!(engine.calls[0].1, Direction::Apply);
        assert_eq!(engine.calls[1].1, Direction::Process);
        assert_eq!(engine.calls[1].2, vec![2, 2, 2]);
        assert!(engine.shut_down);
    }

    #[test]
    fn test_unreadable_frame_fails_only_its_step() {
        let mut engine = RecordingEngine::default();
        let steps = vec![
            SequenceStep::new(
                OperationKind::ApplyTelecommand,
                FrameSource::File("/nonexistent/tc.bin".into()),
            ),
            SequenceStep::new(OperationKind::ApplyTelecommand, FrameSource::Hex("0G".into())),
            SequenceStep::new(OperationKind::ApplyTelecommand, bytes(&[9])),
        ];

        let report = SequenceEngine::new(&mut engine).run(&RunConfiguration::unit_test(), &steps);

        assert_eq!(report.state, SequenceState::Completed);
        assert!(matches!(
            report.outcomes[0].result,
            Err(HarnessError::SourceUnavailable { .. })
        ));
        assert!(matches!(
            report.outcomes[1].result,
            Err(HarnessError::InvalidEncoding { .. })
        ));
        assert!(report.outcomes[2].is_success());
        assert_eq!(engine.calls.len(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_engine_failure_is_recorded_and_sequence_continues() {
        let mut engine = RecordingEngine {
            fail_calls: vec![1],
            ..Default::default()
        };
        let steps = vec![
            SequenceStep::new(OperationKind::ApplyTelecommand, bytes(&[1])),
            SequenceStep::new(OperationKind::ApplyTelecommand, bytes(&[2])),
        ];

        let mut sequence = SequenceEngine::new(&mut engine);
        let report = sequence.run(&RunConfiguration::unit_test(), &steps);

        assert_eq!(sequence.state(), SequenceState::Completed);
        assert_eq!(report.state, SequenceState::Completed);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.not_executed(), 0);
        assert!(report.abort_reason.is_none());
        assert!(matches!(
            report.outcomes[0].result,
            Err(HarnessError::EngineFailure(_))
        ));
        assert!(report.outcomes[1].is_success());
        assert_eq!(report.failed(), 1);
        assert!(!report.is_clean());
        assert_eq!(engine.calls.len(), 2);
    }

    #[test]
    fn test_abort_on_engine_failure_skips_remaining_steps() {
        let mut engine = RecordingEngine {
            fail_calls: vec![1],
            ..Default::default()
        };
        let steps = vec![
            SequenceStep::new(OperationKind::ProcessTelecommand, bytes(&[1, 2])),
            SequenceStep::new(OperationKind::ApplyTelemetry, bytes(&[4])),
            SequenceStep::new(OperationKind::ApplyTelecommand, bytes(&[3])),
        ];

        let mut sequence = SequenceEngine::new(&mut engine).abort_on_engine_failure(true);
        let report = sequence.run(&RunConfiguration::unit_test(), &steps);

        assert_eq!(sequence.state(), SequenceState::Aborted);
        assert_eq!(report.state, SequenceState::Aborted);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.not_executed(), 2);
        match report.abort_reason {
            Some(HarnessError::EngineFailure(ref f)) => {
                assert_eq!(f.kind, Some(OperationKind::ProcessTelecommand));
                assert_eq!(f.status, -5);
            }
            ref other => panic!("unexpected abort reason: {:?}", other),
        }
        assert_eq!(engine.calls.len(), 1);
        assert!(engine.shut_down);
    }

    #[test]
    fn test_abort_on_engine_failure_still_continues_past_unimplemented() {
        let mut engine = RecordingEngine::default();
        let steps = vec![
            SequenceStep::new(OperationKind::ApplyTelemetry, bytes(&[1])),
            SequenceStep::new(OperationKind::ApplyTelecommand, bytes(&[2])),
        ];

        let report = SequenceEngine::new(&mut engine)
            .abort_on_engine_failure(true)
            .run(&RunConfiguration::unit_test(), &steps);

        assert_eq!(report.state, SequenceState::Completed);
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes[1].is_success());
    }

    #[test]
    fn test_init_failure_aborts_before_any_step() {
        let mut engine = RecordingEngine {
            fail_init: true,
            ..Default::default()
        };
        let steps = vec![SequenceStep::new(
            OperationKind::ApplyTelecommand,
            bytes(&[1]),
        )];

        let report = SequenceEngine::new(&mut engine).run(&RunConfiguration::unit_test(), &steps);

        assert_eq!(report.state, SequenceState::Aborted);
        assert!(report.outcomes.is_empty());
        assert!(engine.calls.is_empty());
        assert!(matches!(
            report.abort_reason,
            Some(HarnessError::EngineFailure(EngineFailure { kind: None, .. }))
        ));
    }
}
