// Security Engine seam
// The harness only ever talks to an engine through `SecurityEngine`.

use crate::config::RunConfiguration;
use crate::types::SecurityLayer;
use serde::Serialize;
use std::fmt;

// Private modules
mod crypto;

// Public modules
pub mod frame;
pub mod replay;
pub mod virtual_engine;

pub use frame::TcPrimaryHeader;
pub use replay::{ReplayWindow, ReplayWindowError};
pub use virtual_engine::VirtualSdlsEngine;

/// Signed status code returned by the engine, zero is success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EngineStatus(pub i32);

impl EngineStatus {
    pub const SUCCESS: EngineStatus = EngineStatus(0);
    pub const NOT_INITIALIZED: EngineStatus = EngineStatus(-1);
    pub const INVALID_FRAME_LENGTH: EngineStatus = EngineStatus(-2);
    pub const UNKNOWN_CHANNEL: EngineStatus = EngineStatus(-3);
    pub const VCID_NOT_ADMITTED: EngineStatus = EngineStatus(-4);
    pub const MAC_VALIDATION_ERROR: EngineStatus = EngineStatus(-5);
    pub const ANTI_REPLAY_VIOLATION: EngineStatus = EngineStatus(-6);
    pub const FECF_MISMATCH: EngineStatus = EngineStatus(-7);
    pub const FRAME_TOO_LARGE: EngineStatus = EngineStatus(-8);
    pub const LAYER_UNSUPPORTED: EngineStatus = EngineStatus(-9);
    pub const INVALID_SPI: EngineStatus = EngineStatus(-10);
    pub const INTERNAL_ERROR: EngineStatus = EngineStatus(-99);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }

    pub fn code(&self) -> i32 {
        self.0
    }

    /// Symbolic name of the codes defined above
    pub fn name(&self) -> &'static str {
        match *self {
            EngineStatus::SUCCESS => "SUCCESS",
            EngineStatus::NOT_INITIALIZED => "NOT_INITIALIZED",
            EngineStatus::INVALID_FRAME_LENGTH => "INVALID_FRAME_LENGTH",
            EngineStatus::UNKNOWN_CHANNEL => "UNKNOWN_CHANNEL",
            EngineStatus::VCID_NOT_ADMITTED => "VCID_NOT_ADMITTED",
            EngineStatus::MAC_VALIDATION_ERROR => "MAC_VALIDATION_ERROR",
            EngineStatus::ANTI_REPLAY_VIOLATION => "ANTI_REPLAY_VIOLATION",
            EngineStatus::FECF_MISMATCH => "FECF_MISMATCH",
            EngineStatus::FRAME_TOO_LARGE => "FRAME_TOO_LARGE",
            EngineStatus::LAYER_UNSUPPORTED => "LAYER_UNSUPPORTED",
            EngineStatus::INVALID_SPI => "INVALID_SPI",
            EngineStatus::INTERNAL_ERROR => "INTERNAL_ERROR",
            _ => "UNKNOWN_STATUS",
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// Payload recovered by a successful process call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFrame {
    /// Security parameter index the frame was protected under
    pub spi: u16,
    /// Anti-replay sequence number carried in the security header
    pub sequence_number: u32,
    pub payload: Vec<u8>,
}

impl ProcessedFrame {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Apply/process call surface of a frame-security engine
pub trait SecurityEngine {
    /// Configure the engine. Called once, before any apply/process call.
    fn initialize(&mut self, config: &RunConfiguration) -> Result<(), EngineStatus>;

    /// Protect a plaintext transfer frame, returning the secured frame
    fn apply_security(&mut self, layer: SecurityLayer, frame: &[u8])
    -> Result<Vec<u8>, EngineStatus>;

    /// Verify and strip security from a received frame. The input may be
    /// modified in place.
    fn process_security(
        &mut self,
        layer: SecurityLayer,
        frame: &mut [u8],
    ) -> Result<ProcessedFrame, EngineStatus>;

    fn shutdown(&mut self);

    fn status_name(&self, status: EngineStatus) -> String {
        status.name().to_string()
    }
}
