//! Performance Measurement Loop
//!
//! Repeats one apply or process call against a fixed frame and derives
//! latency and throughput statistics from the per-iteration timings.

use crate::engine::{EngineStatus, SecurityEngine};
use crate::error::{EngineFailure, HarnessError, Result};
use crate::frame_source::FrameBuffer;
use crate::types::{Direction, OperationKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Total time reported when an iteration fails
pub const FAILURE_SENTINEL: f64 = -1.0;

/// Monotonic time source sampled around every engine call
pub trait MonotonicClock {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&mut self) -> Duration;
}

/// Wall-clock monotonic time via `Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now(&mut self) -> Duration {
        self.origin.elapsed()
    }
}

/// Replays a fixed list of readings, for deterministic measurements
#[derive(Debug, Clone)]
pub struct ScriptedClock {
    readings: VecDeque<Duration>,
    last: Duration,
}

impl ScriptedClock {
    /// Clock whose consecutive before/after pairs are `latencies` seconds apart
    pub fn from_latencies(latencies: &[f64]) -> Self {
        let mut readings = VecDeque::with_capacity(latencies.len() * 2);
        let mut t = Duration::ZERO;
        for &latency in latencies {
            readings.push_back(t);
            t += Duration::from_secs_f64(latency);
            readings.push_back(t);
        }
        Self {
            readings,
            last: Duration::ZERO,
        }
    }
}

impl MonotonicClock for ScriptedClock {
    /// Holds the final reading once the script runs out
    fn now(&mut self) -> Duration {
        if let Some(next) = self.readings.pop_front() {
            self.last = next;
        }
        self.last
    }
}

/// One timed engine call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSample {
    /// 1-based iteration number
    pub iteration: u32,
    pub elapsed_secs: f64,
    pub success: bool,
    /// Output frame length (apply) or recovered payload length (process)
    pub bytes: usize,
}

/// The iteration that ended a run early
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopFailure {
    pub iteration: u32,
    pub status: i32,
    pub status_name: String,
}

/// Aggregate statistics of one benchmarking run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub kind: OperationKind,
    pub started_at: DateTime<Utc>,
    pub iterations_requested: u32,
    /// Iterations attempted, including a failing one
    pub count: u32,
    pub successful: u32,
    /// Bytes produced per frame by the last successful call
    pub bytes_per_frame: usize,
    /// Sum of successful latencies, or `FAILURE_SENTINEL`
    pub total_time: f64,
    pub min_time: Option<f64>,
    pub max_time: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    /// Throughput at the slowest call
    pub min_kbps: Option<f64>,
    pub avg_kbps: Option<f64>,
    /// Throughput at the fastest call
    pub max_kbps: Option<f64>,
    pub failure: Option<LoopFailure>,
    pub samples: Vec<PerformanceSample>,
}

impl PerformanceSummary {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Engine failure with enough context to reproduce the run
    pub fn failure_error(&self, source_id: &str) -> Option<HarnessError> {
        self.failure.as_ref().map(|f| {
            HarnessError::EngineFailure(EngineFailure {
                kind: Some(self.kind),
                source_id: format!("{} (iteration {})", source_id, f.iteration),
                status: f.status,
                status_name: f.status_name.clone(),
            })
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn export_csv(&self) -> String {
        let mut csv = String::from("iteration,elapsed_us,success,bytes\n");
        for s in &self.samples {
            csv.push_str(&format!(
                "{},{:.3},{},{}\n",
                s.iteration,
                s.elapsed_secs * 1_000_000.0,
                s.success,
                s.bytes
            ));
        }
        csv
    }
}

/// Kibibits per second for `bytes` moved in `secs`
pub fn kbps(bytes: usize, secs: f64) -> Option<f64> {
    if secs > 0.0 && secs.is_finite() {
        Some(((bytes as f64 * 8.0) / secs) / 1024.0)
    } else {
        None
    }
}

/// Seconds rendered as μs below one millisecond, ms above
pub fn format_seconds(secs: f64) -> String {
    let d = Duration::from_secs_f64(secs.max(0.0));
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{}μs", micros)
    } else {
        format!("{:.2}ms", d.as_secs_f64() * 1000.0)
    }
}

/// Benchmarking driver for one operation kind
pub struct PerformanceLoop<C: MonotonicClock = SystemClock> {
    kind: OperationKind,
    iterations: u32,
    clock: C,
}

impl PerformanceLoop<SystemClock> {
    pub fn new(kind: OperationKind, iterations: u32) -> Self {
        Self {
            kind,
            iterations,
            clock: SystemClock::new(),
        }
    }
}

impl<C: MonotonicClock> PerformanceLoop<C> {
    pub fn with_clock<D: MonotonicClock>(self, clock: D) -> PerformanceLoop<D> {
        PerformanceLoop {
            kind: self.kind,
            iterations: self.iterations,
            clock,
        }
    }

    /// Checks that need no engine; callers run this before `initialize`.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(HarnessError::configuration(
                "numloops",
                "at least one iteration is required",
            ));
        }
        if !self.kind.is_implemented() {
            return Err(HarnessError::NotImplemented { kind: self.kind });
        }
        Ok(())
    }

    /// Run the loop. Engine failures end the run early and are carried in
    /// the summary rather than returned as errors.
    pub fn run<E>(&mut self, engine: &mut E, frame: &FrameBuffer) -> Result<PerformanceSummary>
    where
        E: SecurityEngine + ?Sized,
    {
        self.validate()?;

        let started_at = Utc::now();
        let layer = self.kind.layer();
        let mut samples = Vec::with_capacity(self.iterations as usize);
        let mut failure = None;

        info!(
            kind = %self.kind,
            iterations = self.iterations,
            frame_len = frame.len(),
            "beginning performance test"
        );

        for iteration in 1..=self.iterations {
            let (elapsed, outcome) = match self.kind.direction() {
                Direction::Apply => {
                    let start = self.clock.now();
                    let result = engine.apply_security(layer, frame.as_slice());
                    let end = self.clock.now();
                    (end.saturating_sub(start), result.map(|out| out.len()))
                }
                Direction::Process => {
                    let mut input = frame.working_copy();
                    let start = self.clock.now();
                    let result = engine.process_security(layer, &mut input);
                    let end = self.clock.now();
                    (end.saturating_sub(start), result.map(|p| p.payload_len()))
                }
            };
            let elapsed_secs = elapsed.as_secs_f64();

            match outcome {
                Ok(bytes) => samples.push(PerformanceSample {
                    iteration,
                    elapsed_secs,
                    success: true,
                    bytes,
                }),
                Err(status) => {
                    warn!(iteration, %status, "iteration failed, stopping early");
                    samples.push(PerformanceSample {
                        iteration,
                        elapsed_secs,
                        success: false,
                        bytes: 0,
                    });
                    failure = Some(loop_failure(engine, iteration, status));
                    break;
                }
            }
        }

        let summary = summarize(self.kind, started_at, self.iterations, samples, failure);
        debug!(
            count = summary.count,
            total = summary.total_time,
            "performance test complete"
        );
        Ok(summary)
    }
}

fn loop_failure<E: SecurityEngine + ?Sized>(
    engine: &E,
    iteration: u32,
    status: EngineStatus,
) -> LoopFailure {
    LoopFailure {
        iteration,
        status: status.code(),
        status_name: engine.status_name(status),
    }
}

fn summarize(
    kind: OperationKind,
    started_at: DateTime<Utc>,
    iterations_requested: u32,
    samples: Vec<PerformanceSample>,
    failure: Option<LoopFailure>,
) -> PerformanceSummary {
    let mut latencies: Vec<f64> = samples
        .iter()
        .filter(|s| s.success)
        .map(|s| s.elapsed_secs)
        .collect();
    latencies.sort_by(|a, b| a.total_cmp(b));

    let successful = latencies.len() as u32;
    let bytes_per_frame = samples
        .iter()
        .rev()
        .find(|s| s.success)
        .map(|s| s.bytes)
        .unwrap_or(0);

    let percentile = |q: f64| -> Option<f64> {
        if latencies.is_empty() {
            return None;
        }
        let idx = (latencies.len() as f64 * q) as usize;
        Some(latencies[idx.min(latencies.len() - 1)])
    };

    let min_time = latencies.first().copied();
    let max_time = latencies.last().copied();
    let total_time = if failure.is_some() {
        FAILURE_SENTINEL
    } else {
        latencies.iter().sum()
    };

    // Slowest call pairs with the minimum throughput
    let min_kbps = max_time.and_then(|t| kbps(bytes_per_frame, t));
    let max_kbps = min_time.and_then(|t| kbps(bytes_per_frame, t));
    let avg_kbps = if failure.is_some() {
        None
    } else {
        kbps(bytes_per_frame * successful as usize, total_time)
    };

    PerformanceSummary {
        kind,
        started_at,
        iterations_requested,
        count: samples.len() as u32,
        successful,
        bytes_per_frame,
        total_time,
        min_time,
        max_time,
        p50: percentile(0.50),
        p95: percentile(0.95),
        p99: percentile(0.99),
        min_kbps,
        avg_kbps,
        max_kbps,
        failure,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfiguration;
    use crate::engine::ProcessedFrame;
    use crate::types::SecurityLayer;
    use proptest::prelude::*;

    /// Succeeds with a fixed output length, optionally failing on one call
    struct StubEngine {
        output_len: usize,
        fail_on: Option<u32>,
        calls: u32,
        inputs_seen: Vec<Vec<u8>>,
    }

    impl StubEngine {
        fn new(output_len: usize) -> Self {
            Self {
                output_len,
                fail_on: None,
                calls: 0,
                inputs_seen: Vec::new(),
            }
        }

        fn failing_on(mut self, call: u32) -> Self {
            self.fail_on = Some(call);
            self
        }

        fn next_status(&mut self) -> std::result::Result<(), EngineStatus> {
            self.calls += 1;
            if self.fail_on == Some(self.calls) {
                Err(EngineStatus::MAC_VALIDATION_ERROR)
            } else {
                Ok(())
            }
        }
    }

    impl SecurityEngine for StubEngine {
        fn initialize(&mut self, _: &RunConfiguration) -> std::result::Result<(), EngineStatus> {
            Ok(())
        }

        fn apply_security(
            &mut self,
            _: SecurityLayer,
            _: &[u8],
        ) -> std::result::Result<Vec<u8>, EngineStatus> {
            self.next_status()?;
            Ok(vec![0u8; self.output_len])
        }

        fn process_security(
            &mut self,
            _: SecurityLayer,
            frame: &mut [u8],
        ) -> std::result::Result<ProcessedFrame, EngineStatus> {
            self.inputs_seen.push(frame.to_vec());
            frame.fill(0xEE);
            self.next_status()?;
            Ok(ProcessedFrame {
                spi: 1,
                sequence_number: self.calls,
                payload: vec![0u8; self.output_len],
            })
        }

        fn shutdown(&mut self) {}
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_reference_throughput_pairing() {
        let mut engine = StubEngine::new(10);
        let frame = FrameBuffer::new(vec![0u8; 4]);
        let summary = PerformanceLoop::new(OperationKind::ApplyTelecommand, 3)
            .with_clock(ScriptedClock::from_latencies(&[0.01, 0.02, 0.005]))
            .run(&mut engine, &frame)
            .unwrap();

        assert_eq!(summary.count, 3);
        assert_eq!(summary.bytes_per_frame, 10);
        assert!(approx(summary.total_time, 0.035));
        assert!(approx(summary.min_time.unwrap(), 0.005));
        assert!(approx(summary.max_time.unwrap(), 0.02));
        assert!(approx(summary.min_kbps.unwrap(), (80.0 / 0.02) / 1024.0));
        assert!(approx(summary.max_kbps.unwrap(), (80.0 / 0.005) / 1024.0));
        assert!(approx(summary.avg_kbps.unwrap(), (240.0 / 0.035) / 1024.0));
        assert!(approx(summary.p50.unwrap(), 0.01));
        assert!(!summary.is_failure());
    }

    #[test]
    fn test_failure_stops_loop_and_sets_sentinel() {
        let mut engine = StubEngine::new(10).failing_on(2);
        let frame = FrameBuffer::new(vec![0u8; 4]);
        let summary = PerformanceLoop::new(OperationKind::ApplyTelecommand, 5)
            .with_clock(ScriptedClock::from_latencies(&[0.01; 5]))
            .run(&mut engine, &frame)
            .unwrap();

        assert_eq!(engine.calls, 2);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.total_time, FAILURE_SENTINEL);
        assert!(summary.avg_kbps.is_none());
        let failure = summary.failure.as_ref().unwrap();
        assert_eq!(failure.iteration, 2);
        assert_eq!(failure.status_name, "MAC_VALIDATION_ERROR");

        let err = summary.failure_error("hex:2003").unwrap();
        assert!(err.to_string().contains("iteration 2"));
    }

    #[test]
    fn test_process_gets_fresh_copy_each_iteration() {
        let mut engine = StubEngine::new(6);
        let frame = FrameBuffer::new(vec![1, 2, 3, 4]);
        let summary = PerformanceLoop::new(OperationKind::ProcessTelecommand, 3)
            .run(&mut engine, &frame)
            .unwrap();

        assert_eq!(summary.count, 3);
        assert_eq!(summary.bytes_per_frame, 6);
        assert!(engine.inputs_seen.iter().all(|i| i == &[1, 2, 3, 4]));
        assert_eq!(frame.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut engine = StubEngine::new(10);
        let err = PerformanceLoop::new(OperationKind::ApplyTelecommand, 0)
            .run(&mut engine, &FrameBuffer::new(vec![0]))
            .unwrap_err();
        assert!(matches!(err, HarnessError::ConfigurationInvalid { .. }));
        assert_eq!(engine.calls, 0);
    }

    #[test]
    fn test_validate_needs_no_engine() {
        let err = PerformanceLoop::new(OperationKind::ProcessTelecommand, 0)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::ConfigurationInvalid { ref field, .. } if field == "numloops"
        ));
        assert!(PerformanceLoop::new(OperationKind::ApplyTelecommand, 1)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_unimplemented_layer_is_fatal() {
        let mut engine = StubEngine::new(10);
        let err = PerformanceLoop::new(OperationKind::ApplyTelemetry, 3)
            .run(&mut engine, &FrameBuffer::new(vec![0]))
            .unwrap_err();
        assert!(matches!(err, HarnessError::NotImplemented { .. }));
        assert_eq!(engine.calls, 0);
    }

    #[test]
    fn test_csv_export_has_row_per_sample() {
        let mut engine = StubEngine::new(10);
        let summary = PerformanceLoop::new(OperationKind::ApplyTelecommand, 2)
            .with_clock(ScriptedClock::from_latencies(&[0.001, 0.002]))
            .run(&mut engine, &FrameBuffer::new(vec![0]))
            .unwrap();
        let csv = summary.export_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "iteration,elapsed_us,success,bytes");
        assert_eq!(lines[1], "1,1000.000,true,10");
        assert_eq!(lines.len(), 3);

        let json = summary.to_json().unwrap();
        assert!(json.contains("\"kind\": \"ApplyTelecommand\""));
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.000_250), "250μs");
        assert_eq!(format_seconds(0.0125), "12.50ms");
    }

    #[test]
    fn test_zero_latency_has_no_throughput() {
        assert_eq!(kbps(10, 0.0), None);
        assert_eq!(kbps(128, 1.0), Some(1.0));
    }

    proptest! {
        #[test]
        fn prop_count_matches_iterations(n in 1u32..200, latency in 0.000_001f64..0.01) {
            let mut engine = StubEngine::new(16);
            let latencies = vec![latency; n as usize];
            let summary = PerformanceLoop::new(OperationKind::ApplyTelecommand, n)
                .with_clock(ScriptedClock::from_latencies(&latencies))
                .run(&mut engine, &FrameBuffer::new(vec![0u8; 8]))
                .unwrap();
            prop_assert_eq!(summary.count, n);
            prop_assert!(summary.total_time >= 0.0);
            prop_assert!(summary.total_time >= summary.max_time.unwrap());
        }

        #[test]
        fn prop_stops_at_failing_iteration(n in 1u32..100, k_offset in 0u32..100) {
            let k = 1 + k_offset % n;
            let mut engine = StubEngine::new(16).failing_on(k);
            let summary = PerformanceLoop::new(OperationKind::ProcessTelecommand, n)
                .run(&mut engine, &FrameBuffer::new(vec![0u8; 8]))
                .unwrap();
            prop_assert_eq!(engine.calls, k);
            prop_assert_eq!(summary.count, k);
            prop_assert_eq!(summary.total_time, FAILURE_SENTINEL);
        }
    }
}
