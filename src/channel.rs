//! Command mailbox between the boundary and the controller task.
//!
//! Every intent carries a `oneshot` reply channel. The controller drains
//! the mailbox at the start of a tick and answers from there, so commands
//! are applied between ticks, never in the middle of one.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::program::{CatalogError, Program, Step};
use crate::state::{Sample, Snapshot};

/// Reply to a successful `Start`.
#[derive(Debug, Clone, Serialize)]
pub struct StartedInfo {
    pub started: bool,
    pub program_name: String,
    pub total_steps: usize,
    pub first_target: f64,
}

/// Reply to a successful `TunePid`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TunedPid {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Actuator or sensor exercised by a self-test command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestTarget {
    Heater,
    Vacuum,
    Fan,
    Sensors,
}

impl TestTarget {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "heater" => Some(Self::Heater),
            "vacuum" => Some(Self::Vacuum),
            "fan" => Some(Self::Fan),
            "sensors" => Some(Self::Sensors),
            _ => None,
        }
    }
}

/// Reply to a self-test command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "test")]
pub enum TestReport {
    Pulsed { target: String },
    Sensors { tc1: Sample, tc2: Sample },
}

/// A request sent from the boundary to the controller task.
#[derive(Debug)]
pub enum FurnaceRequest {
    GetPrograms {
        respond_to: oneshot::Sender<Vec<Program>>,
    },
    Start {
        program_id: u32,
        respond_to: oneshot::Sender<Result<StartedInfo, String>>,
    },
    Stop {
        respond_to: oneshot::Sender<()>,
    },
    /// Toggle between Running and Paused; replies with the new state name.
    TogglePause {
        respond_to: oneshot::Sender<Result<String, String>>,
    },
    Resume {
        respond_to: oneshot::Sender<Result<(), String>>,
    },
    EmergencyStop {
        respond_to: oneshot::Sender<()>,
    },
    TunePid {
        kp: f64,
        ki: f64,
        kd: f64,
        respond_to: oneshot::Sender<Result<TunedPid, String>>,
    },
    SaveProgram {
        name: String,
        steps: Vec<Step>,
        respond_to: oneshot::Sender<Result<Program, CatalogError>>,
    },
    DeleteProgram {
        id: u32,
        respond_to: oneshot::Sender<Result<(), CatalogError>>,
    },
    ClearErrors {
        respond_to: oneshot::Sender<()>,
    },
    SelfTest {
        target: TestTarget,
        respond_to: oneshot::Sender<Result<TestReport, String>>,
    },
}

/// Boundary handle: command sender plus both snapshot feeds. Cheap to
/// clone; every adapter (web, telemetry) gets its own copy.
#[derive(Clone)]
pub struct FurnaceHandle {
    pub commands: mpsc::Sender<FurnaceRequest>,
    snapshot: watch::Receiver<Snapshot>,
    broadcast: broadcast::Sender<Snapshot>,
}

impl FurnaceHandle {
    pub fn new(
        commands: mpsc::Sender<FurnaceRequest>,
        snapshot: watch::Receiver<Snapshot>,
        broadcast: broadcast::Sender<Snapshot>,
    ) -> Self {
        Self {
            commands,
            snapshot,
            broadcast,
        }
    }

    /// Immutable copy of the most recent snapshot.
    pub fn latest(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Best-effort snapshot stream. Slow subscribers lag and drop; the
    /// controller never blocks on them.
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.broadcast.subscribe()
    }
}
