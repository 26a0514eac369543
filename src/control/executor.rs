//! Firing-program state machine.
//!
//! Owns the run state and the borrowed program of the active run, and does
//! all step time accounting. It decides nothing about actuation: the
//! controller maps the resulting state onto heater/vacuum/fan each tick.
//!
//! The setpoint is flat per step: ramp, soak and hold share the step's
//! target temperature and only extend its time budget.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::error::ErrorKind;
use crate::program::{Program, Step};
use crate::state::RunState;

/// Fan-assisted cooldown dwell after a run ends or is stopped.
pub const COOLDOWN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error, PartialEq)]
pub enum ExecError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

/// Time-driven transitions reported by [`Executor::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecEvent {
    StepAdvanced { step_idx: usize },
    Completed,
    CooldownOver,
}

#[derive(Debug)]
struct ActiveRun {
    program: Program,
    started_at: Instant,
}

#[derive(Debug)]
pub struct Executor {
    state: RunState,
    run: Option<ActiveRun>,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            run: None,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn program(&self) -> Option<&Program> {
        self.run.as_ref().map(|r| &r.program)
    }

    pub fn total_steps(&self) -> usize {
        self.run.as_ref().map(|r| r.program.steps.len()).unwrap_or(0)
    }

    /// The active step while Running or Paused.
    pub fn current_step(&self) -> Option<&Step> {
        let idx = self.state.step_idx()?;
        self.run.as_ref().and_then(|r| r.program.steps.get(idx))
    }

    /// Setpoint for the PID: the current step's target, if any.
    pub fn target_temp(&self) -> Option<f64> {
        self.current_step().map(|s| s.temp)
    }

    /// Seconds since the program started, pauses included. Zero when no
    /// program is loaded.
    pub fn elapsed_s(&self, now: Instant) -> u64 {
        self.run
            .as_ref()
            .map(|r| now.duration_since(r.started_at).as_secs())
            .unwrap_or(0)
    }

    /// Begin a program from Idle. Interlock preconditions are the
    /// controller's to check before calling.
    pub fn start(&mut self, program: Program, now: Instant) -> Result<(), ExecError> {
        if self.state != RunState::Idle {
            return Err(ExecError::InvalidTransition(
                "a program is already active".to_string(),
            ));
        }
        self.run = Some(ActiveRun {
            program,
            started_at: now,
        });
        self.state = RunState::Running {
            step_idx: 0,
            step_started_at: now,
        };
        Ok(())
    }

    /// Door opened mid-run: freeze the step clock.
    pub fn pause(&mut self, now: Instant) -> Result<(), ExecError> {
        match self.state {
            RunState::Running {
                step_idx,
                step_started_at,
            } => {
                self.state = RunState::Paused {
                    step_idx,
                    elapsed_in_step: now.duration_since(step_started_at),
                };
                Ok(())
            }
            _ => Err(ExecError::InvalidTransition(
                "not running".to_string(),
            )),
        }
    }

    /// Resume a paused run, re-anchoring the step clock so the elapsed
    /// time inside the step is preserved.
    pub fn resume(&mut self, now: Instant) -> Result<(), ExecError> {
        match self.state {
            RunState::Paused {
                step_idx,
                elapsed_in_step,
            } => {
                self.state = RunState::Running {
                    step_idx,
                    step_started_at: now - elapsed_in_step,
                };
                Ok(())
            }
            _ => Err(ExecError::InvalidTransition("not paused".to_string())),
        }
    }

    /// Operator stop from any state. Anything with residual heat goes
    /// through the fan-assisted cooldown; stopping an idle furnace is a
    /// no-op.
    pub fn stop(&mut self, now: Instant) {
        if self.state == RunState::Idle {
            return;
        }
        self.state = RunState::Cooldown { entered_at: now };
    }

    /// Latch a fault. Never recovered implicitly; only `stop` leaves it.
    pub fn fault(&mut self, kind: ErrorKind) {
        self.state = RunState::Fault(kind);
    }

    /// Advance time-based transitions: step completion, program
    /// completion, end of cooldown.
    pub fn tick(&mut self, now: Instant) -> Option<ExecEvent> {
        match self.state {
            RunState::Running {
                step_idx,
                step_started_at,
            } => {
                let run = self.run.as_ref()?;
                let step = run.program.steps.get(step_idx)?;
                if now.duration_since(step_started_at) < step.total_duration() {
                    return None;
                }
                if step_idx + 1 < run.program.steps.len() {
                    let next = step_idx + 1;
                    self.state = RunState::Running {
                        step_idx: next,
                        step_started_at: now,
                    };
                    Some(ExecEvent::StepAdvanced { step_idx: next })
                } else {
                    self.state = RunState::Cooldown { entered_at: now };
                    Some(ExecEvent::Completed)
                }
            }
            RunState::Cooldown { entered_at } => {
                if now.duration_since(entered_at) >= COOLDOWN {
                    self.state = RunState::Idle;
                    self.run = None;
                    Some(ExecEvent::CooldownOver)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}
