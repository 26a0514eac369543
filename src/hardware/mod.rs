//! GPIO capability layer.
//!
//! Two backends behind one seam: real Raspberry Pi GPIO via `rppal`, and a
//! simulated pin bus used when no GPIO character device exists (desktop
//! development, CI) or when `rppal` fails to probe the board. The rest of
//! the controller is written against [`OutputLine`]/[`InputLine`] and never
//! learns which backend it got.
//!
//! Pin ownership is single-writer: each driver claims its pins once at
//! startup and keeps the boxed line for the life of the process.

pub mod actuators;
pub mod interlock;
pub mod thermocouple;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::state::SampleFault;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("GPIO unavailable: {0}")]
    Unavailable(String),
    #[error("failed to claim pin {pin}: {source}")]
    PinClaim {
        pin: u8,
        #[source]
        source: rppal::gpio::Error,
    },
}

/// A single output pin. `write(true)` drives the line high.
pub trait OutputLine: Send {
    fn write(&mut self, high: bool);
}

/// A single input pin. `read()` returns true for a high level.
pub trait InputLine: Send {
    fn read(&self) -> bool;
}

/// GPIO driver selected at startup: hardware when the board answers,
/// simulation otherwise.
pub enum GpioBackend {
    Hardware(rppal::gpio::Gpio),
    Simulated(SimBus),
}

impl GpioBackend {
    /// Probe the board. A missing GPIO driver is not fatal: the furnace
    /// degrades to simulation mode and says so once.
    pub fn probe() -> Self {
        match rppal::gpio::Gpio::new() {
            Ok(gpio) => {
                tracing::info!("GPIO driver available, running against hardware");
                GpioBackend::Hardware(gpio)
            }
            Err(e) => {
                tracing::warn!("GPIO unavailable ({}), entering simulation mode", e);
                GpioBackend::Simulated(SimBus::new())
            }
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, GpioBackend::Hardware(_))
    }

    /// The simulated bus, when running without hardware.
    pub fn sim_bus(&self) -> Option<SimBus> {
        match self {
            GpioBackend::Simulated(bus) => Some(bus.clone()),
            GpioBackend::Hardware(_) => None,
        }
    }

    /// Claim `pin` as an output, driven low.
    pub fn output(&self, pin: u8) -> Result<Box<dyn OutputLine>, HardwareError> {
        match self {
            GpioBackend::Hardware(gpio) => {
                let line = gpio
                    .get(pin)
                    .map_err(|source| HardwareError::PinClaim { pin, source })?
                    .into_output_low();
                Ok(Box::new(HwOutput { line }))
            }
            GpioBackend::Simulated(bus) => {
                bus.set_level(pin, false);
                Ok(Box::new(SimOutput {
                    pin,
                    bus: bus.clone(),
                }))
            }
        }
    }

    /// Claim `pin` as an input with the internal pull-up enabled.
    pub fn input_pullup(&self, pin: u8) -> Result<Box<dyn InputLine>, HardwareError> {
        match self {
            GpioBackend::Hardware(gpio) => {
                let line = gpio
                    .get(pin)
                    .map_err(|source| HardwareError::PinClaim { pin, source })?
                    .into_input_pullup();
                Ok(Box::new(HwInput { line }))
            }
            GpioBackend::Simulated(bus) => {
                bus.seed_level(pin, true);
                Ok(Box::new(SimInput {
                    pin,
                    bus: bus.clone(),
                }))
            }
        }
    }
}

struct HwOutput {
    line: rppal::gpio::OutputPin,
}

impl OutputLine for HwOutput {
    fn write(&mut self, high: bool) {
        if high {
            self.line.set_high();
        } else {
            self.line.set_low();
        }
    }
}

struct HwInput {
    line: rppal::gpio::InputPin,
}

impl InputLine for HwInput {
    fn read(&self) -> bool {
        self.line.is_high()
    }
}

/// Shared simulated pin bus. Outputs write levels into it, inputs read
/// levels out of it, and tests inject levels (door, emergency) or observe
/// them (heater, fan) through the same map the drivers use.
#[derive(Clone, Default)]
pub struct SimBus {
    levels: Arc<Mutex<HashMap<u8, bool>>>,
    tc_fault: Arc<Mutex<Option<SampleFault>>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level of a pin; unclaimed and unwritten pins read low.
    pub fn level(&self, pin: u8) -> bool {
        *self.levels.lock().unwrap().get(&pin).unwrap_or(&false)
    }

    pub fn set_level(&self, pin: u8, high: bool) {
        self.levels.lock().unwrap().insert(pin, high);
    }

    /// Like `set_level` but keeps an already-injected value (pull-up seed).
    fn seed_level(&self, pin: u8, high: bool) {
        self.levels.lock().unwrap().entry(pin).or_insert(high);
    }

    /// Force every simulated thermocouple read to the given fault until
    /// cleared with `None`.
    pub fn force_tc_fault(&self, fault: Option<SampleFault>) {
        *self.tc_fault.lock().unwrap() = fault;
    }

    pub fn forced_tc_fault(&self) -> Option<SampleFault> {
        *self.tc_fault.lock().unwrap()
    }
}

struct SimOutput {
    pin: u8,
    bus: SimBus,
}

impl OutputLine for SimOutput {
    fn write(&mut self, high: bool) {
        self.bus.set_level(self.pin, high);
    }
}

struct SimInput {
    pin: u8,
    bus: SimBus,
}

impl InputLine for SimInput {
    fn read(&self) -> bool {
        self.bus.level(self.pin)
    }
}
