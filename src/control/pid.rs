//! Discrete PI-D regulator for the heater.
//!
//! Output is a duty in percent, clamped to [0, 100] and rounded to 0.1.
//! The integral term is clamped to [-50, 50] for anti-windup. An optional
//! auto-adjust nudges `kp` up while the error is large and back down once
//! the loop settles; it is off by default.

use std::collections::VecDeque;
use std::time::Instant;

use crate::config::PidConfig;

pub const OUTPUT_MIN: f64 = 0.0;
pub const OUTPUT_MAX: f64 = 100.0;
pub const INTEGRAL_MIN: f64 = -50.0;
pub const INTEGRAL_MAX: f64 = 50.0;

/// Auto-adjust bounds for the proportional gain.
const KP_MIN: f64 = 2.0;
const KP_MAX: f64 = 5.0;

/// Diagnostic error history depth.
const HISTORY_LEN: usize = 100;

#[derive(Debug)]
pub struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    integral: f64,
    last_error: f64,
    last_tick: Option<Instant>,
    autotune: bool,
    history: VecDeque<f64>,
}

impl Pid {
    pub fn new(config: &PidConfig) -> Self {
        Self {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
            integral: 0.0,
            last_error: 0.0,
            last_tick: None,
            autotune: config.autotune,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    pub fn set_autotune(&mut self, enabled: bool) {
        self.autotune = enabled;
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Recent errors, oldest first. Diagnostic only.
    pub fn error_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    /// Zero the integrator and derivative history and re-anchor `dt`.
    /// Called on program start, stop, emergency and fault so no kick
    /// carries over between runs.
    pub fn reset(&mut self, now: Instant) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last_tick = Some(now);
    }

    /// One regulator step: returns the heater duty in percent.
    pub fn calculate(&mut self, setpoint: f64, current: f64, now: Instant) -> f64 {
        let dt = self
            .last_tick
            .map(|t| now.duration_since(t).as_secs_f64())
            .unwrap_or(0.0)
            .max(0.001);
        self.last_tick = Some(now);

        let error = setpoint - current;
        self.integral = (self.integral + error * dt).clamp(INTEGRAL_MIN, INTEGRAL_MAX);
        let derivative = (error - self.last_error) / dt;
        self.last_error = error;

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(error);

        if self.autotune {
            if error.abs() > 50.0 {
                self.kp = (self.kp * 1.01).min(KP_MAX);
            } else if error.abs() < 5.0 && derivative.abs() < 1.0 {
                self.kp = (self.kp * 0.99).max(KP_MIN);
            }
        }

        let output = self.kp * error + self.ki * self.integral + self.kd * derivative;
        let output = output.clamp(OUTPUT_MIN, OUTPUT_MAX);
        (output * 10.0).round() / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pid() -> Pid {
        Pid::new(&PidConfig::default())
    }

    #[test]
    fn output_clamped_to_duty_range() {
        let mut p = pid();
        let t0 = Instant::now();
        p.reset(t0);
        let out = p.calculate(1000.0, 20.0, t0 + Duration::from_millis(500));
        assert_eq!(out, 100.0);
        let out = p.calculate(0.0, 1000.0, t0 + Duration::from_secs(1));
        assert_eq!(out, 0.0);
    }

    #[test]
    fn integral_stays_within_windup_clamp() {
        let mut p = pid();
        let t0 = Instant::now();
        p.reset(t0);
        for i in 1..1000 {
            p.calculate(1000.0, 20.0, t0 + Duration::from_millis(500 * i));
        }
        assert!(p.integral() <= INTEGRAL_MAX);
        assert!(p.integral() >= INTEGRAL_MIN);
    }

    #[test]
    fn reset_clears_carry_over() {
        let mut p = pid();
        let t0 = Instant::now();
        p.reset(t0);
        for i in 1..100 {
            p.calculate(1000.0, 20.0, t0 + Duration::from_millis(500 * i));
        }
        p.reset(t0 + Duration::from_secs(60));
        assert_eq!(p.integral(), 0.0);
    }

    #[test]
    fn autotune_disabled_leaves_gains_alone() {
        let mut p = pid();
        let t0 = Instant::now();
        p.reset(t0);
        let before = p.gains();
        for i in 1..50 {
            p.calculate(1000.0, 20.0, t0 + Duration::from_millis(500 * i));
        }
        assert_eq!(p.gains(), before);
    }

    #[test]
    fn autotune_raises_kp_on_large_error_up_to_cap() {
        let mut p = Pid::new(&PidConfig {
            autotune: true,
            ..PidConfig::default()
        });
        let t0 = Instant::now();
        p.reset(t0);
        for i in 1..2000 {
            p.calculate(1000.0, 20.0, t0 + Duration::from_millis(500 * i));
        }
        let (kp, _, _) = p.gains();
        assert!(kp > 3.2);
        assert!(kp <= KP_MAX);
    }
}
