//! Fault taxonomy shared by the controller, the executor and the boundary.

use serde::Serialize;
use thiserror::Error;

use crate::state::{SampleFault, TcChannel};

/// A condition the controller records, rejects a command with, or faults on.
///
/// `ErrorKind` travels in three places: inside `RunState::Fault`, in the
/// bounded error log attached to every snapshot, and as the `reason` of a
/// rejected command.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum ErrorKind {
    #[error("sensor fault on {which}: {reason}")]
    SensorFault { which: TcChannel, reason: SampleFault },
    #[error("both thermocouples lost")]
    SensorLost,
    #[error("emergency stop")]
    Emergency,
    #[error("door opened during run")]
    DoorOpenedDuringRun,
    #[error("interlock active")]
    InterlockActive,
    #[error("GPIO hardware unavailable")]
    HardwareUnavailable,
    #[error("invalid program: {0}")]
    InvalidProgram(String),
    #[error("persistence error: {0}")]
    PersistenceError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Startup and task-level failures. Everything recoverable at runtime goes
/// through `ErrorKind` instead.
#[derive(Debug, Error)]
pub enum FurnaceError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("hardware error: {0}")]
    Hardware(#[from] crate::hardware::HardwareError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}
