//! MAX6675-class thermocouple reader.
//!
//! Each converter speaks a 16-bit synchronous serial frame: pull CS low,
//! wait out the 5 ms conversion window, clock 16 bits MSB-first on the
//! shared CLK line, raise CS. Both channels share CLK, so reads are
//! serialized by this module owning all five lines.
//!
//! In simulation mode no frames exist; samples come from a small thermal
//! model so the rest of the control plane stays testable without hardware.

use std::time::Duration;

use crate::config::PinConfig;
use crate::hardware::{GpioBackend, HardwareError, InputLine, OutputLine, SimBus};
use crate::state::{Sample, SampleFault, AMBIENT_C, TEMP_MAX_C, TEMP_MIN_C};

/// Conversion settle time after CS is asserted (MAX6675 datasheet minimum).
const SETTLE: Duration = Duration::from_millis(5);
/// Half-cycle of the bit-banged clock. User-space timers cannot do better
/// than about a millisecond reliably, and the converter tops out well below
/// that anyway.
const HALF_CYCLE: Duration = Duration::from_millis(1);

/// Decode one 16-bit converter frame into a sample.
///
/// Frame layout, MSB first: bit 15 dummy (always 0), bits 14..3 the 12-bit
/// reading in 0.25 degree steps, bit 2 the open-thermocouple flag, bits
/// 1..0 device ID and tri-state.
pub fn decode_frame(raw: u16) -> Sample {
    if raw == 0xFFFF || raw == 0x0000 {
        return Sample::Fault(SampleFault::BusError);
    }
    if raw & 0x8000 != 0 {
        // The dummy sign bit never reads 1 from a live converter; treat it
        // as clocking misalignment rather than an electrical fault.
        return Sample::Fault(SampleFault::BadFrame);
    }
    if raw & 0x0004 != 0 {
        return Sample::Fault(SampleFault::OpenCircuit);
    }
    let temp = ((raw >> 3) & 0x0FFF) as f64 * 0.25;
    if !(TEMP_MIN_C..=TEMP_MAX_C).contains(&temp) {
        return Sample::Fault(SampleFault::OutOfRange);
    }
    Sample::Temperature(temp)
}

/// Heating context handed to the simulated model each tick.
#[derive(Debug, Clone, Copy)]
pub struct Heating {
    pub target: f64,
    pub duty: f64,
}

struct TcLines {
    cs: Box<dyn OutputLine>,
    dout: Box<dyn InputLine>,
}

enum Bank {
    Hardware {
        clk: Box<dyn OutputLine>,
        ch1: TcLines,
        ch2: TcLines,
    },
    Simulated {
        bus: SimBus,
        model: SimThermalModel,
    },
}

/// Owns both converter channels and the shared clock line.
pub struct ThermocoupleBank {
    bank: Bank,
}

impl ThermocoupleBank {
    pub fn new(backend: &GpioBackend, pins: &PinConfig) -> Result<Self, HardwareError> {
        let bank = match backend {
            GpioBackend::Hardware(_) => {
                let mut ch1 = TcLines {
                    cs: backend.output(pins.tc1_cs)?,
                    dout: backend.input_pullup(pins.tc1_do)?,
                };
                let mut ch2 = TcLines {
                    cs: backend.output(pins.tc2_cs)?,
                    dout: backend.input_pullup(pins.tc2_do)?,
                };
                // CS idles high (deselected).
                ch1.cs.write(true);
                ch2.cs.write(true);
                Bank::Hardware {
                    clk: backend.output(pins.clk)?,
                    ch1,
                    ch2,
                }
            }
            GpioBackend::Simulated(bus) => Bank::Simulated {
                bus: bus.clone(),
                model: SimThermalModel::new(),
            },
        };
        Ok(Self { bank })
    }

    /// Read both channels, channel 1 first. `dt` is the elapsed time since
    /// the previous read and `heating` the active setpoint/duty, both of
    /// which only matter to the simulated model.
    pub fn read_both(&mut self, dt: Duration, heating: Option<Heating>) -> (Sample, Sample) {
        match &mut self.bank {
            Bank::Hardware { clk, ch1, ch2 } => {
                let s1 = decode_frame(read_frame(clk, ch1));
                let s2 = decode_frame(read_frame(clk, ch2));
                (s1, s2)
            }
            Bank::Simulated { bus, model } => {
                if let Some(fault) = bus.forced_tc_fault() {
                    return (Sample::Fault(fault), Sample::Fault(fault));
                }
                let temp = model.step(dt.as_secs_f64(), heating);
                (Sample::Temperature(temp), Sample::Temperature(temp))
            }
        }
    }
}

/// Bit-bang one 16-bit frame from a single converter.
fn read_frame(clk: &mut Box<dyn OutputLine>, ch: &mut TcLines) -> u16 {
    ch.cs.write(false);
    std::thread::sleep(SETTLE);
    let mut raw: u16 = 0;
    for _ in 0..16 {
        clk.write(true);
        std::thread::sleep(HALF_CYCLE);
        raw = (raw << 1) | u16::from(ch.dout.read());
        clk.write(false);
        std::thread::sleep(HALF_CYCLE);
    }
    ch.cs.write(true);
    raw
}

/// First-order thermal model for simulation mode: the charge heats at up to
/// 0.5 deg/s scaled by heater duty while below target, and coasts back
/// toward ambient at 0.1 deg/s otherwise.
struct SimThermalModel {
    temp: f64,
}

impl SimThermalModel {
    fn new() -> Self {
        Self { temp: AMBIENT_C }
    }

    fn step(&mut self, dt_s: f64, heating: Option<Heating>) -> f64 {
        match heating {
            Some(h) if h.target > self.temp && h.duty > 0.0 => {
                let rise = 0.5 * (h.duty / 100.0) * dt_s;
                self.temp = (self.temp + rise).min(h.target);
                let noise = rand::random::<f64>() * 2.0 - 1.0;
                self.temp + noise
            }
            _ => {
                let fall = 0.1 * dt_s;
                if self.temp > AMBIENT_C {
                    self.temp = (self.temp - fall).max(AMBIENT_C);
                } else {
                    self.temp = (self.temp + fall).min(AMBIENT_C);
                }
                self.temp
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_nominal_reading() {
        // 100.0 C = 400 counts of 0.25 C, shifted into bits 14..3.
        let raw = (400u16) << 3;
        assert_eq!(decode_frame(raw), Sample::Temperature(100.0));
    }

    #[test]
    fn decode_open_circuit_flag() {
        let raw = ((400u16) << 3) | 0x0004;
        assert_eq!(decode_frame(raw), Sample::Fault(SampleFault::OpenCircuit));
    }

    #[test]
    fn decode_bus_patterns() {
        assert_eq!(decode_frame(0x0000), Sample::Fault(SampleFault::BusError));
        assert_eq!(decode_frame(0xFFFF), Sample::Fault(SampleFault::BusError));
    }

    #[test]
    fn decode_dummy_bit_is_bad_frame() {
        assert_eq!(decode_frame(0x8008), Sample::Fault(SampleFault::BadFrame));
    }
}
