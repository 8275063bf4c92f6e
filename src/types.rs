use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// CCSDS space data link layer a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityLayer {
    Telecommand,
    Telemetry,
    Aos,
}

impl SecurityLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLayer::Telecommand => "TC",
            SecurityLayer::Telemetry => "TM",
            SecurityLayer::Aos => "AOS",
        }
    }

    /// Only telecommand frames are backed by the engine today
    pub fn is_implemented(&self) -> bool {
        matches!(self, SecurityLayer::Telecommand)
    }
}

/// Whether security is being added to or removed from a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Apply,
    Process,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Apply => "APPLY",
            Direction::Process => "PROCESS",
        }
    }
}

/// One of the six apply/process entry points, per layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    ApplyTelecommand,
    ApplyTelemetry,
    ApplyAos,
    ProcessTelecommand,
    ProcessTelemetry,
    ProcessAos,
}

impl OperationKind {
    pub fn new(direction: Direction, layer: SecurityLayer) -> Self {
        match (direction, layer) {
            (Direction::Apply, SecurityLayer::Telecommand) => OperationKind::ApplyTelecommand,
            (Direction::Apply, SecurityLayer::Telemetry) => OperationKind::ApplyTelemetry,
            (Direction::Apply, SecurityLayer::Aos) => OperationKind::ApplyAos,
            (Direction::Process, SecurityLayer::Telecommand) => OperationKind::ProcessTelecommand,
            (Direction::Process, SecurityLayer::Telemetry) => OperationKind::ProcessTelemetry,
            (Direction::Process, SecurityLayer::Aos) => OperationKind::ProcessAos,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            OperationKind::ApplyTelecommand
            | OperationKind::ApplyTelemetry
            | OperationKind::ApplyAos => Direction::Apply,
            OperationKind::ProcessTelecommand
            | OperationKind::ProcessTelemetry
            | OperationKind::ProcessAos => Direction::Process,
        }
    }

    pub fn layer(&self) -> SecurityLayer {
        match self {
            OperationKind::ApplyTelecommand | OperationKind::ProcessTelecommand => {
                SecurityLayer::Telecommand
            }
            OperationKind::ApplyTelemetry | OperationKind::ProcessTelemetry => {
                SecurityLayer::Telemetry
            }
            OperationKind::ApplyAos | OperationKind::ProcessAos => SecurityLayer::Aos,
        }
    }

    pub fn is_implemented(&self) -> bool {
        self.layer().is_implemented()
    }

    /// Command-line token used by the sequence driver (`tc_a`, `tm_p`, ...)
    pub fn token(&self) -> &'static str {
        match self {
            OperationKind::ApplyTelecommand => "tc_a",
            OperationKind::ApplyTelemetry => "tm_a",
            OperationKind::ApplyAos => "aos_a",
            OperationKind::ProcessTelecommand => "tc_p",
            OperationKind::ProcessTelemetry => "tm_p",
            OperationKind::ProcessAos => "aos_p",
        }
    }

    /// Parse the apply-only tokens (`tc`, `tm`, `aos`) of the single-frame driver
    pub fn parse_apply_token(token: &str) -> Option<Self> {
        match token {
            "tc" => Some(OperationKind::ApplyTelecommand),
            "tm" => Some(OperationKind::ApplyTelemetry),
            "aos" => Some(OperationKind::ApplyAos),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.layer().as_str(), self.direction().as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tc_a" => Ok(OperationKind::ApplyTelecommand),
            "tm_a" => Ok(OperationKind::ApplyTelemetry),
            "aos_a" => Ok(OperationKind::ApplyAos),
            "tc_p" => Ok(OperationKind::ProcessTelecommand),
            "tm_p" => Ok(OperationKind::ProcessTelemetry),
            "aos_p" => Ok(OperationKind::ProcessAos),
            other => Err(format!(
                "unknown operation '{}', expected one of tc_a|tm_a|aos_a|tc_p|tm_p|aos_p",
                other
            )),
        }
    }
}

/// Where a frame's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSource {
    /// Binary file holding exactly one transfer frame
    File(PathBuf),
    /// Hexadecimal text, two digits per byte
    Hex(String),
    /// Bytes already in memory
    Bytes(Vec<u8>),
}

impl FrameSource {
    /// Human-readable identifier used in error reports
    pub fn identifier(&self) -> String {
        match self {
            FrameSource::File(path) => path.display().to_string(),
            FrameSource::Hex(text) => {
                if text.chars().count() > 16 {
                    let head: String = text.chars().take(16).collect();
                    format!("hex:{}...", head)
                } else {
                    format!("hex:{}", text)
                }
            }
            FrameSource::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }
}

/// One entry of a crypto sequence: an operation applied to one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceStep {
    pub kind: OperationKind,
    pub source: FrameSource,
}

impl SequenceStep {
    pub fn new(kind: OperationKind, source: FrameSource) -> Self {
        Self { kind, source }
    }
}
