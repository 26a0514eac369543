//! Door and emergency-stop inputs.
//!
//! Both are active-low with pull-ups: a low level means the door is open or
//! the mushroom is pressed. A two-of-two consecutive-sample debounce
//! rejects single-tick glitches; a reading must repeat on the next tick
//! before the debounced value moves.

use crate::config::PinConfig;
use crate::hardware::{GpioBackend, HardwareError, InputLine};

/// Debounced interlock readings for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterlockState {
    pub door_open: bool,
    pub emergency: bool,
}

impl InterlockState {
    /// True when any interlock must force actuation safe.
    pub fn active(&self) -> bool {
        self.door_open || self.emergency
    }
}

#[derive(Debug, Default)]
struct Debounce {
    stable: bool,
    last_raw: Option<bool>,
}

impl Debounce {
    /// Feed one raw sample; the stable value changes only after two equal
    /// consecutive samples.
    fn update(&mut self, raw: bool) -> bool {
        if self.last_raw == Some(raw) {
            self.stable = raw;
        }
        self.last_raw = Some(raw);
        self.stable
    }
}

pub struct InterlockMonitor {
    door: Box<dyn InputLine>,
    emergency: Box<dyn InputLine>,
    door_db: Debounce,
    emergency_db: Debounce,
}

impl InterlockMonitor {
    pub fn new(backend: &GpioBackend, pins: &PinConfig) -> Result<Self, HardwareError> {
        Ok(Self {
            door: backend.input_pullup(pins.door)?,
            emergency: backend.input_pullup(pins.emergency)?,
            door_db: Debounce::default(),
            emergency_db: Debounce::default(),
        })
    }

    /// Sample both inputs once. Call exactly once per tick.
    pub fn poll(&mut self) -> InterlockState {
        let door_raw = !self.door.read();
        let emergency_raw = !self.emergency.read();
        InterlockState {
            door_open: self.door_db.update(door_raw),
            emergency: self.emergency_db.update(emergency_raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Debounce;

    #[test]
    fn single_tick_glitch_rejected() {
        let mut db = Debounce::default();
        assert!(!db.update(true));
        assert!(!db.update(false));
        assert!(!db.update(true));
        // Second consecutive true flips the stable value.
        assert!(db.update(true));
        // And one stray false does not clear it.
        assert!(db.update(false));
        assert!(!db.update(false));
    }
}
