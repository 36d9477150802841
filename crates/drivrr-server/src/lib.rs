//! # drivrr-server
//!
//! Real-time dispatch core for the Drivrr ride-hailing backend.
//!
//! - `websocket`: per-connection session loops, the shared connection registry
//! - `dispatch`: wire protocol decode/encode and the ride state machine handlers
//! - `estimator`: pluggable arrival-time estimation
//! - HTTP endpoints: `/ws` upgrade, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod estimator;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
