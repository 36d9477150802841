//! Ride domain types: participant roles, driver availability, and the
//! stored record of an accepted ride.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RideId, UserId};

/// Which side of the marketplace a connection belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Offers rides and reports location.
    Driver,
    /// Requests rides and accepts offers.
    Customer,
}

impl Role {
    /// Parse a role from the upgrade query string. Case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "driver" => Some(Self::Driver),
            "customer" => Some(Self::Customer),
            _ => None,
        }
    }

    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch eligibility of a driver.
///
/// A driver with no tracked entry is `Offline`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverAvailability {
    /// Connected and free to take a ride.
    Available,
    /// Assigned to exactly one active ride.
    Busy,
    /// Not taking rides.
    #[default]
    Offline,
}

impl DriverAvailability {
    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for DriverAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of an accepted ride, reported by the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    /// Offer accepted, driver heading to pickup.
    #[default]
    Accepted,
    /// Driver at the pickup point.
    Pickup,
    /// Passenger on board.
    InTransit,
    /// Arrived at the destination.
    Arrived,
}

impl TripStatus {
    /// Percentage shown to clients for this stage.
    pub fn progress(self) -> u8 {
        match self {
            Self::Accepted => 10,
            Self::Pickup => 25,
            Self::InTransit => 50,
            Self::Arrived => 75,
        }
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

impl Coordinates {
    /// Create a coordinate pair.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Shift both axes by `delta` degrees.
    #[must_use]
    pub fn offset(self, delta: f64) -> Self {
        Self {
            lat: self.lat + delta,
            lng: self.lng + delta,
        }
    }
}

/// Stored state of a ride from acceptance until completion or cancellation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRide {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Customer who accepted the offer.
    pub customer_id: UserId,
    /// Driver assigned to the ride.
    pub driver_id: UserId,
    /// Current trip stage.
    pub status: TripStatus,
    /// Pickup point.
    pub pickup: Coordinates,
    /// Destination.
    pub destination: Coordinates,
    /// Agreed fare.
    pub final_price: f64,
    /// When the offer was accepted.
    pub accepted_at: DateTime<Utc>,
    /// Last known driver position.
    pub driver_location: Coordinates,
    /// Current arrival estimate in minutes.
    pub driver_eta_minutes: u32,
}

impl ActiveRide {
    /// Whether `user` is the customer or the driver of this ride.
    pub fn involves(&self, user: &UserId) -> bool {
        &self.customer_id == user || &self.driver_id == user
    }

    /// The other participant, if `user` is one of them.
    pub fn counterpart(&self, user: &UserId) -> Option<&UserId> {
        if &self.driver_id == user {
            Some(&self.customer_id)
        } else if &self.customer_id == user {
            Some(&self.driver_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ride() -> ActiveRide {
        ActiveRide {
            ride_id: "ride_1".into(),
            customer_id: "c1".into(),
            driver_id: "d1".into(),
            status: TripStatus::default(),
            pickup: Coordinates::new(24.86, 67.00),
            destination: Coordinates::new(24.90, 67.05),
            final_price: 480.0,
            accepted_at: Utc::now(),
            driver_location: Coordinates::new(24.87, 67.01),
            driver_eta_minutes: 5,
        }
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_matches!(Role::parse("Driver"), Some(Role::Driver));
        assert_matches!(Role::parse(" customer "), Some(Role::Customer));
        assert_matches!(Role::parse("admin"), None);
    }

    #[test]
    fn untracked_driver_is_offline() {
        assert_eq!(DriverAvailability::default(), DriverAvailability::Offline);
    }

    #[test]
    fn availability_serializes_snake_case() {
        let json = serde_json::to_string(&DriverAvailability::Busy).unwrap();
        assert_eq!(json, "\"busy\"");
    }

    #[test]
    fn trip_status_progress_increases() {
        let stages = [
            TripStatus::Accepted,
            TripStatus::Pickup,
            TripStatus::InTransit,
            TripStatus::Arrived,
        ];
        let progress: Vec<u8> = stages.iter().map(|s| s.progress()).collect();
        assert_eq!(progress, vec![10, 25, 50, 75]);
    }

    #[test]
    fn trip_status_rejects_completed() {
        assert!(serde_json::from_str::<TripStatus>("\"completed\"").is_err());
        assert_eq!(
            serde_json::from_str::<TripStatus>("\"in_transit\"").unwrap(),
            TripStatus::InTransit
        );
    }

    #[test]
    fn offset_shifts_both_axes() {
        let c = Coordinates::new(1.0, 2.0).offset(0.5);
        assert!((c.lat - 1.5).abs() < f64::EPSILON);
        assert!((c.lng - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn counterpart_resolves_both_sides() {
        let r = ride();
        assert_eq!(r.counterpart(&"d1".into()), Some(&UserId::from("c1")));
        assert_eq!(r.counterpart(&"c1".into()), Some(&UserId::from("d1")));
        assert_eq!(r.counterpart(&"x".into()), None);
        assert!(r.involves(&"d1".into()));
        assert!(!r.involves(&"x".into()));
    }
}
