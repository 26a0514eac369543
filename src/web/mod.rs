//! HTTP boundary: a thin axum adapter over the command mailbox and the
//! published snapshot. No authentication, no UI, no telemetry wire format;
//! those live outside this crate.

pub mod api;
pub mod models;
