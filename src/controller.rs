//! The periodic control loop.
//!
//! One task owns everything that mutates: run state, PID state, actuator
//! drivers, the program catalog and the error log. Each tick runs the same
//! fixed order: poll interlocks, read both thermocouples, fold interlock
//! edges and sensor faults into the run state, regulate and actuate,
//! advance the executor, then publish one consistent snapshot.
//!
//! The loop is missed-tick tolerant: a slow tick is not caught up, the next
//! one simply sees a larger `dt` through the clock.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::channel::{
    FurnaceHandle, FurnaceRequest, StartedInfo, TestReport, TestTarget, TunedPid,
};
use crate::config::Config;
use crate::control::executor::{ExecEvent, Executor};
use crate::control::pid::Pid;
use crate::error::{ErrorKind, FurnaceError};
use crate::hardware::actuators::{FanDriver, HeaterDriver, VacuumDriver};
use crate::hardware::interlock::{InterlockMonitor, InterlockState};
use crate::hardware::thermocouple::{Heating, ThermocoupleBank};
use crate::hardware::GpioBackend;
use crate::program::ProgramCatalog;
use crate::state::{ErrorEntry, RunState, Sample, Snapshot, TcChannel};
use crate::time::Clock;

/// Consecutive ticks with no valid sample on either channel before the
/// controller declares the charge unobservable.
const SENSOR_LOST_TICKS: u8 = 3;

/// Heater duty used by the actuator self-test pulse.
const TEST_PULSE_DUTY: f64 = 10.0;

/// Vacuum target used by the pump self-test pulse, in kPa.
const TEST_PULSE_VACUUM_KPA: f64 = -20.0;

/// Bounded error log depth carried in the snapshot.
const ERROR_LOG_LEN: usize = 64;

/// Command mailbox depth. Senders get backpressure beyond this.
const MAILBOX_DEPTH: usize = 16;

/// Broadcast ring for snapshot subscribers; laggards drop, never block.
const BROADCAST_DEPTH: usize = 32;

pub struct FurnaceController {
    config: Config,
    clock: Arc<dyn Clock>,
    epoch: Instant,
    gpio_available: bool,

    tcr: ThermocoupleBank,
    heater: HeaterDriver,
    vacuum: VacuumDriver,
    fan: FanDriver,
    interlocks: InterlockMonitor,

    pid: Pid,
    catalog: ProgramCatalog,
    executor: Executor,

    interlock_state: InterlockState,
    current_temp: f64,
    last_samples: (Sample, Sample),
    channel_valid: (bool, bool),
    invalid_ticks: u8,
    errors: VecDeque<ErrorEntry>,
    last_tick: Option<Instant>,
    test_pulse: Option<(TestTarget, Instant)>,

    commands: mpsc::Receiver<FurnaceRequest>,
    snapshot_tx: watch::Sender<Snapshot>,
    broadcast_tx: broadcast::Sender<Snapshot>,
}

impl FurnaceController {
    /// Build the controller against a probed GPIO backend. Claims every
    /// pin; the returned handle is the only way in from outside.
    pub fn new(
        config: Config,
        backend: GpioBackend,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, FurnaceHandle), FurnaceError> {
        let gpio_available = backend.is_hardware();
        let tcr = ThermocoupleBank::new(&backend, &config.pins)?;
        let heater = HeaterDriver::new(&backend, &config.pins)?;
        let vacuum = VacuumDriver::new(&backend, &config.pins)?;
        let fan = FanDriver::new(&backend, &config.pins)?;
        let interlocks = InterlockMonitor::new(&backend, &config.pins)?;

        let pid = Pid::new(&config.pid);
        let catalog = ProgramCatalog::open(&config.persistence.user_programs_path);

        let (cmd_tx, cmd_rx) = mpsc::channel(MAILBOX_DEPTH);
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::initial(gpio_available));
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_DEPTH);
        let handle = FurnaceHandle::new(cmd_tx, snapshot_rx, broadcast_tx.clone());

        let epoch = clock.now();
        let ambient = crate::state::AMBIENT_C;
        let controller = Self {
            config,
            clock,
            epoch,
            gpio_available,
            tcr,
            heater,
            vacuum,
            fan,
            interlocks,
            pid,
            catalog,
            executor: Executor::new(),
            interlock_state: InterlockState::default(),
            current_temp: ambient,
            last_samples: (Sample::Temperature(ambient), Sample::Temperature(ambient)),
            channel_valid: (true, true),
            invalid_ticks: 0,
            errors: VecDeque::new(),
            last_tick: None,
            test_pulse: None,
            commands: cmd_rx,
            snapshot_tx,
            broadcast_tx,
        };
        Ok((controller, handle))
    }

    /// Drive the loop until shutdown. A panic inside a tick forces the
    /// heater off, turns the fan on, publishes a `Fault(Internal)` snapshot
    /// and terminates the task; the heater is never left energized.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.furnace.tick_period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            "Controller loop started (period {} ms, gpio {})",
            self.config.furnace.tick_period().as_millis(),
            if self.gpio_available { "hardware" } else { "simulated" },
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    self.shutdown();
                    break;
                }
                _ = interval.tick() => {
                    let result = std::panic::catch_unwind(AssertUnwindSafe(|| self.tick()));
                    if let Err(panic) = result {
                        let msg = panic_message(&panic);
                        tracing::error!("Tick panicked: {}", msg);
                        self.heater.off();
                        self.vacuum.disable();
                        self.fan.set(true);
                        self.executor.fault(ErrorKind::Internal(msg.clone()));
                        let now = self.clock.now();
                        self.push_error(now, ErrorKind::Internal(msg));
                        self.publish(now);
                        break;
                    }
                }
            }
        }
    }

    /// One full tick: apply queued commands, then sense, decide, actuate
    /// and publish. Public so tests can step the loop synchronously.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        self.drain_commands(now);
        self.step(now);
    }

    fn step(&mut self, now: Instant) {
        let dt = self
            .last_tick
            .map(|t| now.duration_since(t))
            .unwrap_or_else(|| self.config.furnace.tick_period());
        self.last_tick = Some(now);

        // 1. Interlocks, debounced. Keep the previous state for edges.
        let prev = self.interlock_state;
        let il = self.interlocks.poll();
        self.interlock_state = il;

        // 2. Sense. The simulated bank wants to know whether the charge is
        // being heated; hardware ignores the context.
        let heating = match self.executor.state() {
            RunState::Running { .. } => self.executor.target_temp().map(|target| Heating {
                target,
                duty: self.heater.duty(),
            }),
            _ => None,
        };
        let (tc1, tc2) = self.tcr.read_both(dt, heating);
        self.fuse_samples(now, tc1, tc2);

        // 3. Emergency is dominant from every state, other faults included.
        if il.emergency
            && !prev.emergency
            && !matches!(self.executor.state(), RunState::Fault(ErrorKind::Emergency))
        {
            tracing::warn!("Emergency stop input asserted");
            self.enter_fault(now, ErrorKind::Emergency);
        }
        // 4. Door open pauses a running program.
        else if il.door_open && !prev.door_open && self.executor.state().is_running() {
            tracing::warn!("Door opened during run, pausing");
            self.push_error(now, ErrorKind::DoorOpenedDuringRun);
            // Pause cannot fail here: the state was just checked.
            let _ = self.executor.pause(now);
        }

        // 5/6. Regulate and actuate according to the run state. Heater and
        // vacuum writes stay interlock-gated even on the Running path.
        match self.executor.state().clone() {
            RunState::Running { .. } => {
                let target = self.executor.target_temp().unwrap_or(0.0);
                let duty = self.pid.calculate(target, self.current_temp, now);
                self.heater.set_duty(duty, &il);
                match self.executor.current_step() {
                    Some(step) if step.wants_vacuum() => {
                        let target_kpa = step.vacuum;
                        self.vacuum.enable(target_kpa, &il);
                    }
                    _ => self.vacuum.disable(),
                }
                self.fan.set(false);
            }
            RunState::Idle => {
                self.apply_idle_outputs(now, &il);
            }
            RunState::Paused { .. } => {
                self.heater.off();
                self.vacuum.disable();
                self.fan.set(false);
            }
            RunState::Cooldown { .. } | RunState::Fault(_) => {
                self.heater.off();
                self.vacuum.disable();
                self.fan.set(true);
            }
        }

        // 7. Advance step and cooldown timers.
        if let Some(event) = self.executor.tick(now) {
            match event {
                ExecEvent::StepAdvanced { step_idx } => {
                    tracing::info!("Advancing to step {}", step_idx + 1);
                    self.pid.reset(now);
                }
                ExecEvent::Completed => {
                    tracing::info!("Program complete, entering cooldown");
                    self.pid.reset(now);
                    self.heater.off();
                    self.vacuum.disable();
                    self.fan.set(true);
                }
                ExecEvent::CooldownOver => {
                    tracing::info!("Cooldown finished");
                    self.fan.set(false);
                }
            }
        }

        self.vacuum.update(dt);

        // 8. Publish after all actuation for this tick has been issued.
        self.publish(now);
    }

    /// Idle outputs are all off, except while a self-test pulse is live.
    fn apply_idle_outputs(&mut self, now: Instant, il: &InterlockState) {
        let pulse = match self.test_pulse {
            Some((target, expires)) if now < expires => Some(target),
            Some(_) => {
                self.test_pulse = None;
                None
            }
            None => None,
        };
        match pulse {
            Some(TestTarget::Heater) => self.heater.set_duty(TEST_PULSE_DUTY, il),
            _ => self.heater.off(),
        }
        match pulse {
            Some(TestTarget::Vacuum) => self.vacuum.enable(TEST_PULSE_VACUUM_KPA, il),
            _ => self.vacuum.disable(),
        }
        self.fan.set(pulse == Some(TestTarget::Fan));
    }

    /// Fusion policy: mean of both valid channels, else the single valid
    /// one, else hold the previous value and count the outage.
    fn fuse_samples(&mut self, now: Instant, tc1: Sample, tc2: Sample) {
        let prev_valid = self.channel_valid;
        self.channel_valid = (tc1.is_valid(), tc2.is_valid());
        for (channel, sample, was_valid) in [
            (TcChannel::Tc1, &tc1, prev_valid.0),
            (TcChannel::Tc2, &tc2, prev_valid.1),
        ] {
            if let Sample::Fault(reason) = sample {
                if was_valid {
                    self.push_error(
                        now,
                        ErrorKind::SensorFault {
                            which: channel,
                            reason: *reason,
                        },
                    );
                }
            }
        }
        self.last_samples = (tc1, tc2);

        match (tc1.temperature(), tc2.temperature()) {
            (Some(a), Some(b)) => {
                self.current_temp = round_tenth((a + b) / 2.0);
                self.invalid_ticks = 0;
            }
            (Some(t), None) | (None, Some(t)) => {
                self.current_temp = round_tenth(t);
                self.invalid_ticks = 0;
            }
            (None, None) => {
                self.invalid_ticks = self.invalid_ticks.saturating_add(1);
                if self.invalid_ticks >= SENSOR_LOST_TICKS && !self.executor.state().is_fault() {
                    tracing::error!(
                        "No valid thermocouple sample for {} ticks",
                        self.invalid_ticks
                    );
                    self.enter_fault(now, ErrorKind::SensorLost);
                }
            }
        }
    }

    /// Latch a fault: outputs safe, fan on, PID reset, error logged.
    fn enter_fault(&mut self, now: Instant, kind: ErrorKind) {
        self.heater.off();
        self.vacuum.disable();
        self.fan.set(true);
        self.pid.reset(now);
        self.push_error(now, kind.clone());
        self.executor.fault(kind);
    }

    fn push_error(&mut self, now: Instant, kind: ErrorKind) {
        if self.errors.len() == ERROR_LOG_LEN {
            self.errors.pop_front();
        }
        self.errors.push_back(ErrorEntry {
            at_ms: self.elapsed_ms(now),
            message: kind.to_string(),
            kind,
        });
    }

    fn elapsed_ms(&self, now: Instant) -> u64 {
        now.duration_since(self.epoch).as_millis() as u64
    }

    fn publish(&mut self, now: Instant) {
        let program = self.executor.program();
        let snapshot = Snapshot {
            run_state: self.executor.state().view(),
            program_id: program.map(|p| p.id),
            program_name: program.map(|p| p.name.clone()),
            step_idx: self.executor.state().step_idx(),
            total_steps: self.executor.total_steps(),
            elapsed_s: self.executor.elapsed_s(now),
            tc1: self.last_samples.0,
            tc2: self.last_samples.1,
            current_temp: self.current_temp,
            target_temp: self.executor.target_temp().unwrap_or(0.0),
            heater_duty: self.heater.duty(),
            vacuum: self.vacuum.state(),
            fan_on: self.fan.is_on(),
            door_open: self.interlock_state.door_open,
            emergency: self.interlock_state.emergency,
            gpio_available: self.gpio_available,
            errors: self.errors.iter().cloned().collect(),
            tick_time_ms: self.elapsed_ms(now),
        };
        self.snapshot_tx.send_replace(snapshot.clone());
        // Best effort: an error only means nobody is subscribed.
        let _ = self.broadcast_tx.send(snapshot);
    }

    // ── Command intake ────────────────────────────────────────────

    fn drain_commands(&mut self, now: Instant) {
        while let Ok(request) = self.commands.try_recv() {
            self.handle_request(now, request);
        }
    }

    fn handle_request(&mut self, now: Instant, request: FurnaceRequest) {
        match request {
            FurnaceRequest::GetPrograms { respond_to } => {
                let programs = self.catalog.list().into_iter().cloned().collect();
                let _ = respond_to.send(programs);
            }
            FurnaceRequest::Start {
                program_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_start(now, program_id));
            }
            FurnaceRequest::Stop { respond_to } => {
                self.handle_stop(now);
                let _ = respond_to.send(());
            }
            FurnaceRequest::TogglePause { respond_to } => {
                let _ = respond_to.send(self.handle_toggle_pause(now));
            }
            FurnaceRequest::Resume { respond_to } => {
                let _ = respond_to.send(self.handle_resume(now));
            }
            FurnaceRequest::EmergencyStop { respond_to } => {
                tracing::warn!("Emergency stop commanded");
                if !self.executor.state().is_fault() {
                    self.enter_fault(now, ErrorKind::Emergency);
                }
                let _ = respond_to.send(());
            }
            FurnaceRequest::TunePid {
                kp,
                ki,
                kd,
                respond_to,
            } => {
                let result = if [kp, ki, kd].iter().all(|g| g.is_finite()) {
                    self.pid.set_gains(kp, ki, kd);
                    tracing::info!("PID gains set to kp={} ki={} kd={}", kp, ki, kd);
                    Ok(TunedPid { kp, ki, kd })
                } else {
                    Err("PID gains must be finite numbers".to_string())
                };
                let _ = respond_to.send(result);
            }
            FurnaceRequest::SaveProgram {
                name,
                steps,
                respond_to,
            } => {
                let result = self
                    .catalog
                    .save_user(&name, steps)
                    .map(|id| self.catalog.get(id).cloned().unwrap_or_else(|| {
                        unreachable!("saved program must resolve")
                    }));
                let _ = respond_to.send(result);
            }
            FurnaceRequest::DeleteProgram { id, respond_to } => {
                let _ = respond_to.send(self.catalog.delete_user(id));
            }
            FurnaceRequest::ClearErrors { respond_to } => {
                self.errors.clear();
                let _ = respond_to.send(());
            }
            FurnaceRequest::SelfTest { target, respond_to } => {
                let _ = respond_to.send(self.handle_self_test(now, target));
            }
        }
    }

    fn handle_start(&mut self, now: Instant, program_id: u32) -> Result<StartedInfo, String> {
        if self.interlock_state.active() {
            return Err(ErrorKind::InterlockActive.to_string());
        }
        let program = self.catalog.get(program_id).cloned().ok_or_else(|| {
            ErrorKind::InvalidProgram(format!("program {} not found", program_id)).to_string()
        })?;
        let name = program.name.clone();
        let total_steps = program.steps.len();
        let first_target = program.steps[0].temp;
        self.executor
            .start(program, now)
            .map_err(|e| e.to_string())?;
        self.pid.reset(now);
        self.invalid_ticks = 0;
        self.test_pulse = None;
        tracing::info!(
            "Started program {} '{}' ({} step(s), first target {} C)",
            program_id,
            name,
            total_steps,
            first_target
        );
        Ok(StartedInfo {
            started: true,
            program_name: name,
            total_steps,
            first_target,
        })
    }

    fn handle_stop(&mut self, now: Instant) {
        tracing::info!("Stop commanded");
        self.executor.stop(now);
        self.pid.reset(now);
        self.heater.off();
        self.vacuum.disable();
        // Cooldown keeps the fan running; stop from Idle stays Idle.
        self.fan
            .set(matches!(self.executor.state(), RunState::Cooldown { .. }));
    }

    fn handle_toggle_pause(&mut self, now: Instant) -> Result<String, String> {
        match self.executor.state() {
            RunState::Running { .. } => {
                self.executor.pause(now).map_err(|e| e.to_string())?;
                Ok("paused".to_string())
            }
            RunState::Paused { .. } => {
                self.handle_resume(now)?;
                Ok("running".to_string())
            }
            _ => Err("no program is running".to_string()),
        }
    }

    fn handle_resume(&mut self, now: Instant) -> Result<(), String> {
        if !matches!(self.executor.state(), RunState::Paused { .. }) {
            return Err("not paused".to_string());
        }
        if self.interlock_state.door_open {
            return Err("door is open".to_string());
        }
        if self.interlock_state.emergency {
            return Err(ErrorKind::InterlockActive.to_string());
        }
        self.executor.resume(now).map_err(|e| e.to_string())
    }

    fn handle_self_test(
        &mut self,
        now: Instant,
        target: TestTarget,
    ) -> Result<TestReport, String> {
        if !matches!(self.executor.state(), RunState::Idle) {
            return Err("self-test requires an idle furnace".to_string());
        }
        match target {
            TestTarget::Sensors => {
                let (tc1, tc2) = self.tcr.read_both(Duration::ZERO, None);
                Ok(TestReport::Sensors { tc1, tc2 })
            }
            TestTarget::Heater | TestTarget::Vacuum | TestTarget::Fan => {
                self.test_pulse = Some((target, now + self.config.furnace.tick_period()));
                let name = match target {
                    TestTarget::Heater => "heater",
                    TestTarget::Vacuum => "vacuum",
                    TestTarget::Fan => "fan",
                    TestTarget::Sensors => unreachable!(),
                };
                tracing::info!("Self-test pulse: {}", name);
                Ok(TestReport::Pulsed {
                    target: name.to_string(),
                })
            }
        }
    }

    /// Graceful shutdown: a running program is stopped, then every output
    /// is driven safe and a final snapshot is published.
    fn shutdown(&mut self) {
        let now = self.clock.now();
        if self.executor.state().is_running() {
            self.executor.stop(now);
        }
        self.heater.off();
        self.vacuum.disable();
        self.fan.set(false);
        self.publish(now);
        tracing::info!("Controller stopped, outputs driven safe");
    }
}

fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
