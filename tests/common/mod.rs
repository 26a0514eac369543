#![allow(dead_code)] // each test binary uses a different slice of the harness

//! Shared harness: a fully simulated furnace stepped by hand.
//!
//! The controller runs against the simulated GPIO bus and a manual clock,
//! so tests drive hours of firing in milliseconds and observe actuator
//! pins through the same map the drivers write.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use kiln_rs::channel::{FurnaceRequest, StartedInfo};
use kiln_rs::config::Config;
use kiln_rs::hardware::{GpioBackend, SimBus};
use kiln_rs::time::ManualClock;
use kiln_rs::{FurnaceController, FurnaceHandle, Snapshot};

static TEST_SEQ: AtomicU32 = AtomicU32::new(0);

/// A throwaway path for the user-program document, unique per test.
pub fn scratch_programs_path() -> String {
    let seq = TEST_SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir()
        .join(format!("kiln-rs-test-{}-{}.json", std::process::id(), seq))
        .to_string_lossy()
        .to_string()
}

pub struct TestFurnace {
    pub controller: FurnaceController,
    pub handle: FurnaceHandle,
    pub clock: ManualClock,
    pub bus: SimBus,
    pub config: Config,
}

pub fn furnace() -> TestFurnace {
    furnace_with(|_| {})
}

pub fn furnace_with(customize: impl FnOnce(&mut Config)) -> TestFurnace {
    let mut config = Config::default();
    config.persistence.user_programs_path = scratch_programs_path();
    customize(&mut config);
    let bus = SimBus::new();
    let clock = ManualClock::new();
    let (controller, handle) = FurnaceController::new(
        config.clone(),
        GpioBackend::Simulated(bus.clone()),
        Arc::new(clock.clone()),
    )
    .expect("simulated controller construction cannot fail");
    TestFurnace {
        controller,
        handle,
        clock,
        bus,
        config,
    }
}

impl TestFurnace {
    pub fn tick_period(&self) -> Duration {
        self.config.furnace.tick_period()
    }

    /// Advance one tick period and run one controller tick.
    pub fn tick(&mut self) {
        self.clock.advance(self.tick_period());
        self.controller.tick();
    }

    /// Tick for (at least) the given simulated seconds.
    pub fn run_for_secs(&mut self, secs: u64) {
        let ticks = secs * 1000 / self.tick_period().as_millis() as u64;
        for _ in 0..ticks {
            self.tick();
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.handle.latest()
    }

    /// Queue a request; it is applied on the next tick.
    pub fn send(&self, request: FurnaceRequest) {
        self.handle
            .commands
            .try_send(request)
            .expect("mailbox full in test");
    }

    /// Start a program and tick once to apply the command.
    pub fn start(&mut self, program_id: u32) -> Result<StartedInfo, String> {
        let (tx, mut rx) = oneshot::channel();
        self.send(FurnaceRequest::Start {
            program_id,
            respond_to: tx,
        });
        self.tick();
        rx.try_recv().expect("controller dropped reply")
    }

    /// Stop and tick once to apply it.
    pub fn stop(&mut self) {
        let (tx, mut rx) = oneshot::channel();
        self.send(FurnaceRequest::Stop { respond_to: tx });
        self.tick();
        rx.try_recv().expect("controller dropped reply");
    }

    // Interlock inputs are active-low: driving the pin low asserts them.

    pub fn open_door(&self) {
        self.bus.set_level(self.config.pins.door, false);
    }

    pub fn close_door(&self) {
        self.bus.set_level(self.config.pins.door, true);
    }

    pub fn press_emergency(&self) {
        self.bus.set_level(self.config.pins.emergency, false);
    }

    pub fn release_emergency(&self) {
        self.bus.set_level(self.config.pins.emergency, true);
    }

    pub fn heater_pin_high(&self) -> bool {
        self.bus.level(self.config.pins.heater)
    }

    pub fn vacuum_pin_high(&self) -> bool {
        self.bus.level(self.config.pins.vacuum)
    }

    pub fn fan_pin_high(&self) -> bool {
        self.bus.level(self.config.pins.fan)
    }
}
