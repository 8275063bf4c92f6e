pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame_source;
pub mod performance;
pub mod report;
pub mod sequence;
pub mod telemetry;
pub mod types;

pub use config::{RunConfiguration, RunConfigurationBuilder};
pub use engine::{EngineStatus, ProcessedFrame, SecurityEngine, VirtualSdlsEngine};
pub use error::{EngineFailure, HarnessError, Result};
pub use frame_source::FrameBuffer;
pub use performance::{PerformanceLoop, PerformanceSummary};
pub use report::ReportFormatter;
pub use sequence::{SequenceEngine, SequenceReport, SequenceState};
pub use types::{Direction, FrameSource, OperationKind, SecurityLayer, SequenceStep};
