//! kiln-rs: control firmware for a dental ceramic firing furnace.
//!
//! The core is a single-writer control task ticking at a fixed period:
//! read both thermocouples, fold interlocks and sensor faults into the run
//! state, run the PID, drive heater/vacuum/fan, advance the firing-program
//! executor and publish an immutable snapshot. Adapters (the HTTP surface,
//! telemetry subscribers) talk to it only through a bounded command mailbox
//! and the snapshot channels.

pub mod channel;
pub mod config;
pub mod control;
pub mod controller;
pub mod error;
pub mod hardware;
pub mod program;
pub mod state;
pub mod time;
pub mod web;

pub use channel::{FurnaceHandle, FurnaceRequest, StartedInfo, TestReport, TestTarget};
pub use config::{load_config, Config};
pub use controller::FurnaceController;
pub use error::{ErrorKind, FurnaceError};
pub use program::{Program, ProgramCatalog, ProgramOrigin, Step};
pub use state::{RunState, RunStateView, Sample, SampleFault, Snapshot};
