//! # drivrr-core
//!
//! Foundation types shared by the Drivrr dispatch crates.
//!
//! - **Branded IDs**: `UserId`, `RideId`, `ConnectionId` as newtypes for type safety
//! - **Ride domain**: `Role`, `DriverAvailability`, `TripStatus`, `Coordinates`, `ActiveRide`
//! - **Logging**: global `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod logging;
pub mod ride;

pub use ids::{ConnectionId, RideId, UserId};
pub use ride::{ActiveRide, Coordinates, DriverAvailability, Role, TripStatus};
