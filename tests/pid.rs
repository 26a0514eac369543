//! Regulator contract: clamps, rounding and reset behavior.

use std::time::{Duration, Instant};

use kiln_rs::config::PidConfig;
use kiln_rs::control::pid::{Pid, INTEGRAL_MAX, INTEGRAL_MIN, OUTPUT_MAX, OUTPUT_MIN};

fn stepped(setpoints: &[(f64, f64)]) -> Pid {
    let mut pid = Pid::new(&PidConfig::default());
    let t0 = Instant::now();
    pid.reset(t0);
    for (i, (setpoint, current)) in setpoints.iter().enumerate() {
        let now = t0 + Duration::from_millis(500 * (i as u64 + 1));
        let out = pid.calculate(*setpoint, *current, now);
        assert!((OUTPUT_MIN..=OUTPUT_MAX).contains(&out), "duty {} escaped clamp", out);
        assert!((INTEGRAL_MIN..=INTEGRAL_MAX).contains(&pid.integral()));
    }
    pid
}

#[test]
fn output_and_integral_clamped_under_extreme_errors() {
    stepped(&[
        (1400.0, -50.0),
        (1400.0, -50.0),
        (-50.0, 1400.0),
        (0.0, 0.0),
        (850.0, 849.9),
        (850.0, 850.1),
    ]);
}

#[test]
fn sustained_error_saturates_integral_at_clamp() {
    let pid = stepped(&[(1000.0, 20.0); 500]);
    assert_eq!(pid.integral(), INTEGRAL_MAX);
}

#[test]
fn output_rounded_to_tenth_of_percent() {
    let mut pid = Pid::new(&PidConfig {
        kp: 1.0,
        ki: 0.0,
        kd: 0.0,
        autotune: false,
    });
    let t0 = Instant::now();
    pid.reset(t0);
    let out = pid.calculate(20.123, 0.0, t0 + Duration::from_millis(500));
    assert_eq!(out, 20.1);
}

#[test]
fn dt_floor_prevents_divide_by_zero() {
    let mut pid = Pid::new(&PidConfig::default());
    let t0 = Instant::now();
    pid.reset(t0);
    // Two calls at the same instant: dt floors to 1 ms instead of zero.
    let a = pid.calculate(850.0, 20.0, t0);
    let b = pid.calculate(850.0, 20.0, t0);
    assert!(a.is_finite() && b.is_finite());
}

#[test]
fn reset_prevents_carry_over_kick() {
    let mut pid = Pid::new(&PidConfig::default());
    let t0 = Instant::now();
    pid.reset(t0);
    for i in 1..200 {
        pid.calculate(1200.0, 20.0, t0 + Duration::from_millis(500 * i));
    }
    let later = t0 + Duration::from_secs(600);
    pid.reset(later);
    assert_eq!(pid.integral(), 0.0);
    // First post-reset output is pure P on the new error, no inherited I/D.
    let out = pid.calculate(20.0, 20.0, later + Duration::from_millis(500));
    assert_eq!(out, 0.0);
}
