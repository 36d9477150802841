//! WebSocket connections: per-client handles, the shared registry, and the
//! session read/write loops.

pub mod connection;
pub mod registry;
pub mod session;
