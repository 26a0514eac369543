//! Core data model: samples, run state and the per-tick snapshot.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::ErrorKind;

/// Admissible temperature range in degrees Celsius. Decoded readings
/// outside this range are faults, not samples.
pub const TEMP_MIN_C: f64 = -50.0;
pub const TEMP_MAX_C: f64 = 1400.0;

/// Ambient temperature the simulated furnace decays toward.
pub const AMBIENT_C: f64 = 20.0;

/// Why a thermocouple read produced no temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleFault {
    /// Thermocouple fault flag set in the frame (broken or disconnected probe).
    OpenCircuit,
    /// Decoded temperature outside [`TEMP_MIN_C`, `TEMP_MAX_C`].
    OutOfRange,
    /// All-ones or all-zeros frame: converter absent or wiring shorted.
    BusError,
    /// Malformed frame that is neither a valid reading nor a bus pattern.
    BadFrame,
}

impl fmt::Display for SampleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SampleFault::OpenCircuit => "open circuit",
            SampleFault::OutOfRange => "out of range",
            SampleFault::BusError => "bus error",
            SampleFault::BadFrame => "bad frame",
        };
        f.write_str(s)
    }
}

/// One thermocouple read: a temperature in degrees Celsius, or a fault.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum Sample {
    Temperature(f64),
    Fault(SampleFault),
}

impl Sample {
    pub fn temperature(&self) -> Option<f64> {
        match self {
            Sample::Temperature(t) => Some(*t),
            Sample::Fault(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Sample::Temperature(_))
    }
}

/// Which thermocouple channel a sample or fault refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TcChannel {
    Tc1,
    Tc2,
}

impl fmt::Display for TcChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TcChannel::Tc1 => f.write_str("TC1"),
            TcChannel::Tc2 => f.write_str("TC2"),
        }
    }
}

/// Controller-internal run state. Timestamps are monotonic `Instant`s and
/// never serialized; the boundary sees [`RunStateView`].
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Idle,
    Running {
        step_idx: usize,
        step_started_at: Instant,
    },
    Paused {
        step_idx: usize,
        elapsed_in_step: Duration,
    },
    Cooldown {
        entered_at: Instant,
    },
    Fault(ErrorKind),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running { .. })
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, RunState::Fault(_))
    }

    /// Step index for states that carry one.
    pub fn step_idx(&self) -> Option<usize> {
        match self {
            RunState::Running { step_idx, .. } | RunState::Paused { step_idx, .. } => {
                Some(*step_idx)
            }
            _ => None,
        }
    }

    pub fn view(&self) -> RunStateView {
        match self {
            RunState::Idle => RunStateView::Idle,
            RunState::Running { .. } => RunStateView::Running,
            RunState::Paused { .. } => RunStateView::Paused,
            RunState::Cooldown { .. } => RunStateView::Cooldown,
            RunState::Fault(kind) => RunStateView::Fault { fault: kind.clone() },
        }
    }
}

/// Serializable projection of [`RunState`] carried in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStateView {
    Idle,
    Running,
    Paused,
    Cooldown,
    Fault { fault: ErrorKind },
}

/// Vacuum subsystem state. `current_kpa` is synthetic: it asymptotes toward
/// the target while the pump runs and back toward zero when it stops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VacuumState {
    pub enabled: bool,
    pub target_kpa: f64,
    pub current_kpa: f64,
}

impl Default for VacuumState {
    fn default() -> Self {
        Self {
            enabled: false,
            target_kpa: 0.0,
            current_kpa: 0.0,
        }
    }
}

/// One entry of the bounded in-memory error log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    /// Monotonic milliseconds since controller start.
    pub at_ms: u64,
    pub kind: ErrorKind,
    pub message: String,
}

/// Immutable cross-section of controller state, published once per tick.
///
/// Readers never see torn fields: the controller assembles the whole value
/// and replaces the published copy atomically after actuation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub run_state: RunStateView,
    pub program_id: Option<u32>,
    pub program_name: Option<String>,
    pub step_idx: Option<usize>,
    pub total_steps: usize,
    /// Seconds since the current program was started, pauses included.
    pub elapsed_s: u64,
    pub tc1: Sample,
    pub tc2: Sample,
    /// Fused temperature in degrees Celsius (see the controller's fusion policy).
    pub current_temp: f64,
    pub target_temp: f64,
    /// Commanded heater duty in percent, after interlock gating.
    pub heater_duty: f64,
    pub vacuum: VacuumState,
    pub fan_on: bool,
    pub door_open: bool,
    pub emergency: bool,
    pub gpio_available: bool,
    pub errors: Vec<ErrorEntry>,
    /// Monotonic milliseconds since controller start; non-decreasing.
    pub tick_time_ms: u64,
}

impl Snapshot {
    /// Snapshot published before the first tick completes.
    pub fn initial(gpio_available: bool) -> Self {
        Self {
            run_state: RunStateView::Idle,
            program_id: None,
            program_name: None,
            step_idx: None,
            total_steps: 0,
            elapsed_s: 0,
            tc1: Sample::Temperature(AMBIENT_C),
            tc2: Sample::Temperature(AMBIENT_C),
            current_temp: AMBIENT_C,
            target_temp: 0.0,
            heater_duty: 0.0,
            vacuum: VacuumState::default(),
            fan_on: false,
            door_open: false,
            emergency: false,
            gpio_available,
            errors: Vec::new(),
            tick_time_ms: 0,
        }
    }
}
