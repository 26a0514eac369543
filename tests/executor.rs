//! Firing-program state machine: progression, time accounting, latching.

use std::time::{Duration, Instant};

use kiln_rs::control::executor::{ExecEvent, Executor, COOLDOWN};
use kiln_rs::{ErrorKind, Program, ProgramOrigin, RunState, Step};

fn program(steps: Vec<Step>) -> Program {
    Program {
        id: 99,
        name: "Test".to_string(),
        steps,
        origin: ProgramOrigin::User,
    }
}

fn one_step() -> Program {
    program(vec![Step {
        temp: 700.0,
        time: 10.0,
        vacuum: 0.0,
        hold: 2.0,
        ramp: 5.0,
    }])
}

#[test]
fn step_total_duration_unit_conversion() {
    // Minutes in the data model, seconds on the clock: 5 + 10 + 2 minutes
    // is exactly 1020 seconds, not 17 or 61200.
    let p = one_step();
    assert_eq!(p.steps[0].total_duration(), Duration::from_secs(1020));
}

#[test]
fn completes_at_total_time_and_not_before() {
    let mut exec = Executor::new();
    let t0 = Instant::now();
    exec.start(one_step(), t0).unwrap();
    assert!(exec.tick(t0 + Duration::from_secs(1019)).is_none());
    assert!(exec.state().is_running());
    assert_eq!(
        exec.tick(t0 + Duration::from_secs(1020)),
        Some(ExecEvent::Completed)
    );
    assert!(matches!(exec.state(), RunState::Cooldown { .. }));
}

#[test]
fn multi_step_program_advances_in_order() {
    let steps = vec![
        Step { temp: 300.0, time: 1.0, vacuum: 0.0, hold: 0.0, ramp: 0.0 },
        Step { temp: 600.0, time: 2.0, vacuum: -50.0, hold: 0.0, ramp: 0.0 },
    ];
    let mut exec = Executor::new();
    let t0 = Instant::now();
    exec.start(program(steps), t0).unwrap();
    assert_eq!(exec.target_temp(), Some(300.0));

    let e = exec.tick(t0 + Duration::from_secs(60));
    assert_eq!(e, Some(ExecEvent::StepAdvanced { step_idx: 1 }));
    assert_eq!(exec.target_temp(), Some(600.0));

    // Step 2's clock starts at the advance, not at program start.
    assert!(exec.tick(t0 + Duration::from_secs(179)).is_none());
    assert_eq!(
        exec.tick(t0 + Duration::from_secs(180)),
        Some(ExecEvent::Completed)
    );
}

#[test]
fn cooldown_returns_to_idle_after_five_minutes() {
    let mut exec = Executor::new();
    let t0 = Instant::now();
    exec.start(one_step(), t0).unwrap();
    exec.stop(t0 + Duration::from_secs(10));
    let entered = t0 + Duration::from_secs(10);
    assert!(exec.tick(entered + COOLDOWN - Duration::from_secs(1)).is_none());
    assert_eq!(exec.tick(entered + COOLDOWN), Some(ExecEvent::CooldownOver));
    assert_eq!(*exec.state(), RunState::Idle);
    assert!(exec.program().is_none());
}

#[test]
fn pause_freezes_the_step_clock() {
    let mut exec = Executor::new();
    let t0 = Instant::now();
    exec.start(one_step(), t0).unwrap();

    // 100 s in, pause for an hour, resume.
    exec.pause(t0 + Duration::from_secs(100)).unwrap();
    assert!(matches!(
        exec.state(),
        RunState::Paused { step_idx: 0, elapsed_in_step } if *elapsed_in_step == Duration::from_secs(100)
    ));
    // Time passing while paused changes nothing.
    assert!(exec.tick(t0 + Duration::from_secs(2000)).is_none());

    let resumed_at = t0 + Duration::from_secs(3700);
    exec.resume(resumed_at).unwrap();
    // 920 s of step budget remain.
    assert!(exec.tick(resumed_at + Duration::from_secs(919)).is_none());
    assert_eq!(
        exec.tick(resumed_at + Duration::from_secs(920)),
        Some(ExecEvent::Completed)
    );
}

#[test]
fn start_rejected_unless_idle() {
    let mut exec = Executor::new();
    let t0 = Instant::now();
    exec.start(one_step(), t0).unwrap();
    assert!(exec.start(one_step(), t0).is_err());

    exec.stop(t0 + Duration::from_secs(5));
    assert!(exec.start(one_step(), t0 + Duration::from_secs(6)).is_err());
}

#[test]
fn fault_latches_until_stop() {
    let mut exec = Executor::new();
    let t0 = Instant::now();
    exec.start(one_step(), t0).unwrap();
    exec.fault(ErrorKind::Emergency);
    assert!(exec.state().is_fault());

    // Time never clears a fault.
    assert!(exec.tick(t0 + Duration::from_secs(100_000)).is_none());
    assert!(exec.state().is_fault());

    // Operator acknowledgement does, via the cooldown path.
    exec.stop(t0 + Duration::from_secs(100_001));
    assert!(matches!(exec.state(), RunState::Cooldown { .. }));
}

#[test]
fn stop_when_idle_is_a_no_op() {
    let mut exec = Executor::new();
    exec.stop(Instant::now());
    assert_eq!(*exec.state(), RunState::Idle);
}
