//! Shared routing tables: live connections, role indexes, driver
//! availability, and active rides.
//!
//! All tables sit behind one readers–writer lock. Lookups and broadcast
//! snapshots take the read side; every mutation takes the write side. The
//! lock is never held across an `.await` or a socket write: sends go through
//! the non-blocking per-connection queue, and broadcasts snapshot recipients
//! before sending.

use std::collections::HashMap;
use std::sync::Arc;

use drivrr_core::{
    ActiveRide, ConnectionId, Coordinates, DriverAvailability, RideId, Role, TripStatus, UserId,
};
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::connection::ClientConnection;
use crate::dispatch::protocol::OutboundMessage;

/// Why a ride transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RideError {
    /// No active ride has this ID.
    #[error("ride {0} is not active")]
    UnknownRide(RideId),
    /// The ride ID is already assigned.
    #[error("ride {0} is already active")]
    AlreadyActive(RideId),
    /// The driver already has an active ride.
    #[error("driver {0} is busy")]
    DriverBusy(UserId),
    /// The driver is offline or has never connected.
    #[error("driver {0} is not available")]
    DriverUnavailable(UserId),
    /// The caller is not the driver assigned to the ride.
    #[error("{user_id} is not the driver of ride {ride_id}")]
    NotAssignedDriver {
        /// Ride in question.
        ride_id: RideId,
        /// Caller.
        user_id: UserId,
    },
    /// The caller is neither party to the ride.
    #[error("{user_id} is not a participant in ride {ride_id}")]
    NotParticipant {
        /// Ride in question.
        ride_id: RideId,
        /// Caller.
        user_id: UserId,
    },
}

/// Point-in-time table sizes, reported by `/health`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Live connections of either role.
    pub connections: usize,
    /// Drivers indexed by user ID.
    pub drivers: usize,
    /// Customers indexed by user ID.
    pub customers: usize,
    /// Drivers currently `available`.
    pub available_drivers: usize,
    /// Drivers currently `busy`.
    pub busy_drivers: usize,
    /// Rides between acceptance and completion.
    pub active_rides: usize,
}

#[derive(Default)]
struct Tables {
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    drivers: HashMap<UserId, Arc<ClientConnection>>,
    customers: HashMap<UserId, Arc<ClientConnection>>,
    driver_status: HashMap<UserId, DriverAvailability>,
    active_rides: HashMap<RideId, ActiveRide>,
}

impl Tables {
    fn role_index(&mut self, role: Role) -> &mut HashMap<UserId, Arc<ClientConnection>> {
        match role {
            Role::Driver => &mut self.drivers,
            Role::Customer => &mut self.customers,
        }
    }

    fn holds_ride(&self, driver_id: &UserId) -> bool {
        self.active_rides.values().any(|r| &r.driver_id == driver_id)
    }
}

/// The shared connection registry and ride table.
#[derive(Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Membership ──────────────────────────────────────────────────

    /// Add a connection and index it by role.
    ///
    /// A driver not already `available` or `busy` becomes `available`, or
    /// `busy` again if it still holds an active ride. A later connection for
    /// the same user replaces the earlier one in the role index.
    pub fn register(&self, conn: Arc<ClientConnection>) {
        let mut t = self.tables.write();
        let _ = t.connections.insert(conn.id.clone(), conn.clone());
        let replaced = t.role_index(conn.role).insert(conn.user_id.clone(), conn.clone());
        if let Some(old) = replaced {
            debug!(user_id = %conn.user_id, old_conn = %old.id, "connection superseded");
        }
        if conn.role == Role::Driver {
            let resumed = if t.holds_ride(&conn.user_id) {
                DriverAvailability::Busy
            } else {
                DriverAvailability::Available
            };
            let status = t.driver_status.entry(conn.user_id.clone()).or_insert(resumed);
            if *status == DriverAvailability::Offline {
                *status = resumed;
            }
        }
        info!(
            user_id = %conn.user_id,
            role = %conn.role,
            drivers = t.drivers.len(),
            customers = t.customers.len(),
            "participant registered"
        );
    }

    /// Remove a connection from every table. Idempotent.
    ///
    /// The role index entry is only removed if it still points at this
    /// connection. Removing a driver drops its availability entry, which
    /// reads back as `offline`.
    pub fn unregister(&self, conn: &ClientConnection) -> bool {
        let mut t = self.tables.write();
        let removed = t.connections.remove(&conn.id).is_some();

        let index = t.role_index(conn.role);
        let owns_entry = index
            .get(&conn.user_id)
            .is_some_and(|current| current.id == conn.id);
        if owns_entry {
            let _ = index.remove(&conn.user_id);
            if conn.role == Role::Driver {
                let _ = t.driver_status.remove(&conn.user_id);
            }
        }

        if removed {
            info!(
                user_id = %conn.user_id,
                role = %conn.role,
                drivers = t.drivers.len(),
                customers = t.customers.len(),
                "participant unregistered"
            );
        }
        removed
    }

    /// Live driver connection for `id`.
    pub fn lookup_driver(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.tables.read().drivers.get(id).cloned()
    }

    /// Live customer connection for `id`.
    pub fn lookup_customer(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.tables.read().customers.get(id).cloned()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.tables.read().connections.len()
    }

    // ── Delivery ────────────────────────────────────────────────────

    /// Enqueue a message on one connection.
    ///
    /// Never blocks. A full queue drops the message and closes the target.
    pub fn send_to(&self, conn: &ClientConnection, message: &OutboundMessage) -> bool {
        match message.to_json() {
            Some(json) => conn.send(json),
            None => false,
        }
    }

    /// Send to a driver by ID. Returns `false` if not connected or dropped.
    pub fn send_to_driver(&self, id: &str, message: &OutboundMessage) -> bool {
        self.lookup_driver(id)
            .is_some_and(|conn| self.send_to(&conn, message))
    }

    /// Send to a customer by ID. Returns `false` if not connected or dropped.
    pub fn send_to_customer(&self, id: &str, message: &OutboundMessage) -> bool {
        self.lookup_customer(id)
            .is_some_and(|conn| self.send_to(&conn, message))
    }

    /// Send to every connected driver. Returns the number of deliveries.
    ///
    /// Recipients are snapshotted under the read lock; drivers joining or
    /// leaving mid-broadcast are either fully included or fully excluded.
    pub fn broadcast_to_drivers(&self, message: &OutboundMessage) -> usize {
        let Some(json) = message.to_json() else {
            return 0;
        };
        let recipients: Vec<Arc<ClientConnection>> =
            self.tables.read().drivers.values().cloned().collect();
        let delivered = recipients
            .iter()
            .filter(|conn| conn.send(Arc::clone(&json)))
            .count();
        debug!(
            message_type = message.type_name(),
            recipients = recipients.len(),
            delivered,
            "broadcast to drivers"
        );
        delivered
    }

    // ── Driver availability ─────────────────────────────────────────

    /// Overwrite a driver's availability.
    pub fn set_driver_availability(&self, id: &UserId, state: DriverAvailability) {
        let _ = self.tables.write().driver_status.insert(id.clone(), state);
    }

    /// Current availability; untracked drivers are `offline`.
    pub fn driver_availability(&self, id: &str) -> DriverAvailability {
        self.tables
            .read()
            .driver_status
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    /// Apply an online/offline toggle from the driver.
    ///
    /// Going online never clears `busy`; going offline always wins. A driver
    /// coming back online while still holding a ride is `busy`.
    pub fn apply_driver_status(&self, id: &UserId, online: bool) -> DriverAvailability {
        let mut t = self.tables.write();
        let holds_ride = t.holds_ride(id);
        let status = t
            .driver_status
            .entry(id.clone())
            .or_insert(DriverAvailability::Offline);
        if !online {
            *status = DriverAvailability::Offline;
        } else if holds_ride {
            *status = DriverAvailability::Busy;
        } else if *status != DriverAvailability::Busy {
            *status = DriverAvailability::Available;
        }
        *status
    }

    // ── Active rides ────────────────────────────────────────────────

    /// Insert or replace a ride record, returning the previous one.
    pub fn put_active_ride(&self, ride: ActiveRide) -> Option<ActiveRide> {
        self.tables
            .write()
            .active_rides
            .insert(ride.ride_id.clone(), ride)
    }

    /// Copy of the ride record, if active.
    pub fn active_ride(&self, id: &str) -> Option<ActiveRide> {
        self.tables.read().active_rides.get(id).cloned()
    }

    /// Remove a ride record without touching driver availability.
    pub fn remove_active_ride(&self, id: &str) -> Option<ActiveRide> {
        self.tables.write().active_rides.remove(id)
    }

    /// Mark an `available` driver busy and store the ride, as one atomic
    /// step.
    ///
    /// Fails without side effects if the ride ID is already active, the
    /// driver is busy or still holds another ride, or the driver is not
    /// `available` (offline, or never connected).
    pub fn assign_ride(&self, ride: ActiveRide) -> Result<(), RideError> {
        let mut t = self.tables.write();
        if t.active_rides.contains_key(&ride.ride_id) {
            return Err(RideError::AlreadyActive(ride.ride_id));
        }
        if t.holds_ride(&ride.driver_id) {
            return Err(RideError::DriverBusy(ride.driver_id));
        }
        let current = t
            .driver_status
            .get(&ride.driver_id)
            .copied()
            .unwrap_or_default();
        match current {
            DriverAvailability::Available => {}
            DriverAvailability::Busy => return Err(RideError::DriverBusy(ride.driver_id)),
            DriverAvailability::Offline => {
                return Err(RideError::DriverUnavailable(ride.driver_id));
            }
        }
        let _ = t
            .driver_status
            .insert(ride.driver_id.clone(), DriverAvailability::Busy);
        let _ = t.active_rides.insert(ride.ride_id.clone(), ride);
        Ok(())
    }

    /// Record a new driver position and ETA on the ride.
    pub fn update_driver_location(
        &self,
        ride_id: &str,
        driver_id: &UserId,
        location: Coordinates,
        eta_minutes: u32,
    ) -> Result<ActiveRide, RideError> {
        let mut t = self.tables.write();
        let ride = assigned_ride_mut(&mut t, ride_id, driver_id)?;
        ride.driver_location = location;
        ride.driver_eta_minutes = eta_minutes;
        Ok(ride.clone())
    }

    /// Advance the ride's trip status.
    pub fn update_trip_status(
        &self,
        ride_id: &str,
        driver_id: &UserId,
        status: TripStatus,
    ) -> Result<ActiveRide, RideError> {
        let mut t = self.tables.write();
        let ride = assigned_ride_mut(&mut t, ride_id, driver_id)?;
        ride.status = status;
        Ok(ride.clone())
    }

    /// Remove the ride and return its driver to `available`.
    pub fn complete_ride(&self, ride_id: &str, driver_id: &UserId) -> Result<ActiveRide, RideError> {
        let mut t = self.tables.write();
        let _ = assigned_ride_mut(&mut t, ride_id, driver_id)?;
        let ride = t
            .active_rides
            .remove(ride_id)
            .ok_or_else(|| RideError::UnknownRide(ride_id.into()))?;
        let _ = t
            .driver_status
            .insert(ride.driver_id.clone(), DriverAvailability::Available);
        Ok(ride)
    }

    /// Remove the ride on behalf of either participant.
    ///
    /// A `busy` driver becomes `available`; an offline driver stays offline.
    pub fn cancel_ride(&self, ride_id: &str, by: &UserId) -> Result<ActiveRide, RideError> {
        let mut t = self.tables.write();
        let involved = t
            .active_rides
            .get(ride_id)
            .ok_or_else(|| RideError::UnknownRide(ride_id.into()))?
            .involves(by);
        if !involved {
            return Err(RideError::NotParticipant {
                ride_id: ride_id.into(),
                user_id: by.clone(),
            });
        }
        let ride = t
            .active_rides
            .remove(ride_id)
            .ok_or_else(|| RideError::UnknownRide(ride_id.into()))?;
        if let Some(status) = t.driver_status.get_mut(&ride.driver_id) {
            if *status == DriverAvailability::Busy {
                *status = DriverAvailability::Available;
            }
        }
        Ok(ride)
    }

    /// Table sizes.
    pub fn stats(&self) -> RegistryStats {
        let t = self.tables.read();
        let count = |wanted: DriverAvailability| {
            t.driver_status.values().filter(|s| **s == wanted).count()
        };
        RegistryStats {
            connections: t.connections.len(),
            drivers: t.drivers.len(),
            customers: t.customers.len(),
            available_drivers: count(DriverAvailability::Available),
            busy_drivers: count(DriverAvailability::Busy),
            active_rides: t.active_rides.len(),
        }
    }
}

fn assigned_ride_mut<'a>(
    t: &'a mut Tables,
    ride_id: &str,
    driver_id: &UserId,
) -> Result<&'a mut ActiveRide, RideError> {
    let ride = t
        .active_rides
        .get_mut(ride_id)
        .ok_or_else(|| RideError::UnknownRide(ride_id.into()))?;
    if &ride.driver_id != driver_id {
        return Err(RideError::NotAssignedDriver {
            ride_id: ride_id.into(),
            user_id: driver_id.clone(),
        });
    }
    Ok(ride)
}
