//! Exhaustive checks of the MAX6675 frame decoder.

use kiln_rs::hardware::thermocouple::decode_frame;
use kiln_rs::{Sample, SampleFault};

#[test]
fn every_pattern_decodes_to_exactly_one_outcome() {
    for raw in 0..=u16::MAX {
        let sample = decode_frame(raw);
        match (raw, sample) {
            (0x0000 | 0xFFFF, Sample::Fault(SampleFault::BusError)) => {}
            (r, Sample::Fault(SampleFault::BadFrame)) => {
                assert!(r & 0x8000 != 0, "BadFrame only for dummy-bit frames: {:#06x}", r);
            }
            (r, Sample::Fault(SampleFault::OpenCircuit)) => {
                assert!(r & 0x0004 != 0, "OpenCircuit needs the fault flag: {:#06x}", r);
            }
            (r, Sample::Temperature(t)) => {
                assert_eq!(t, ((r >> 3) & 0x0FFF) as f64 * 0.25);
                assert!((-50.0..=1400.0).contains(&t));
            }
            (r, s) => panic!("unexpected decode of {:#06x}: {:?}", r, s),
        }
    }
}

#[test]
fn bus_patterns_win_over_everything() {
    assert_eq!(decode_frame(0x0000), Sample::Fault(SampleFault::BusError));
    assert_eq!(decode_frame(0xFFFF), Sample::Fault(SampleFault::BusError));
}

#[test]
fn dummy_bit_is_bad_frame_even_with_fault_flag() {
    assert_eq!(decode_frame(0x8004), Sample::Fault(SampleFault::BadFrame));
}

#[test]
fn open_circuit_beats_the_reading() {
    // A plausible temperature with the fault flag set is still a fault.
    let raw = (400u16 << 3) | 0x0004;
    assert_eq!(decode_frame(raw), Sample::Fault(SampleFault::OpenCircuit));
}

#[test]
fn quarter_degree_resolution() {
    assert_eq!(decode_frame(1u16 << 3), Sample::Temperature(0.25));
    assert_eq!(decode_frame(4000u16 << 3), Sample::Temperature(1000.0));
}

#[test]
fn full_scale_reading_is_in_range() {
    // 0xFFF counts = 1023.75 C, the converter's ceiling, inside [-50, 1400].
    assert_eq!(decode_frame(0x0FFF << 3), Sample::Temperature(1023.75));
}
