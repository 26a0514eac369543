//! Output drivers: heater SSR, vacuum pump, cooling fan.
//!
//! Each driver owns its pin exclusively. Heater and vacuum writes are
//! unconditionally gated through the interlock state; the fan is not, since
//! it is itself a cooling safety device and runs during emergency cooldown.

use std::time::Duration;

use crate::config::PinConfig;
use crate::hardware::interlock::InterlockState;
use crate::hardware::{GpioBackend, HardwareError, OutputLine};
use crate::state::VacuumState;

/// Below this duty the SSR is held off outright.
pub const HEATER_MIN_ON_DUTY: f64 = 5.0;

/// Time constant of the synthetic pump-down/vent curve.
const VACUUM_TAU_S: f64 = 12.0;

pub struct HeaterDriver {
    line: Box<dyn OutputLine>,
    duty: f64,
}

impl HeaterDriver {
    pub fn new(backend: &GpioBackend, pins: &PinConfig) -> Result<Self, HardwareError> {
        Ok(Self {
            line: backend.output(pins.heater)?,
            duty: 0.0,
        })
    }

    /// Command a duty in percent. An active interlock forces 0 regardless
    /// of the request; the stored duty is what was actually issued.
    pub fn set_duty(&mut self, duty: f64, interlock: &InterlockState) {
        let duty = if interlock.active() {
            0.0
        } else {
            duty.clamp(0.0, 100.0)
        };
        self.line.write(duty >= HEATER_MIN_ON_DUTY);
        self.duty = duty;
    }

    pub fn off(&mut self) {
        self.line.write(false);
        self.duty = 0.0;
    }

    /// Duty actually issued on the last write.
    pub fn duty(&self) -> f64 {
        self.duty
    }
}

pub struct VacuumDriver {
    line: Box<dyn OutputLine>,
    enabled: bool,
    target_kpa: f64,
    current_kpa: f64,
}

impl VacuumDriver {
    pub fn new(backend: &GpioBackend, pins: &PinConfig) -> Result<Self, HardwareError> {
        Ok(Self {
            line: backend.output(pins.vacuum)?,
            enabled: false,
            target_kpa: 0.0,
            current_kpa: 0.0,
        })
    }

    /// Run the pump toward `target_kpa` (negative, gauge pressure). An
    /// active interlock turns the pump off instead.
    pub fn enable(&mut self, target_kpa: f64, interlock: &InterlockState) {
        if interlock.active() {
            self.disable();
            return;
        }
        self.enabled = true;
        self.target_kpa = target_kpa.min(0.0);
        self.line.write(true);
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.target_kpa = 0.0;
        self.line.write(false);
    }

    /// Advance the synthetic pressure: asymptotically toward the target
    /// while pumping, back toward atmosphere when off.
    pub fn update(&mut self, dt: Duration) {
        let goal = if self.enabled { self.target_kpa } else { 0.0 };
        let alpha = 1.0 - (-dt.as_secs_f64() / VACUUM_TAU_S).exp();
        self.current_kpa += (goal - self.current_kpa) * alpha;
    }

    pub fn state(&self) -> VacuumState {
        VacuumState {
            enabled: self.enabled,
            target_kpa: self.target_kpa,
            current_kpa: self.current_kpa,
        }
    }
}

pub struct FanDriver {
    line: Box<dyn OutputLine>,
    on: bool,
}

impl FanDriver {
    pub fn new(backend: &GpioBackend, pins: &PinConfig) -> Result<Self, HardwareError> {
        Ok(Self {
            line: backend.output(pins.fan)?,
            on: false,
        })
    }

    pub fn set(&mut self, on: bool) {
        self.line.write(on);
        self.on = on;
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}
