//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::program::Step;
use crate::state::Snapshot;

/// Response for `GET /api/v1/status`: the latest snapshot plus the server's
/// current monotonic time.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub now_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub program_id: u32,
}

#[derive(Debug, Deserialize)]
pub struct TunePidRequest {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

#[derive(Debug, Deserialize)]
pub struct SaveProgramRequest {
    pub name: String,
    pub steps: Vec<Step>,
}
