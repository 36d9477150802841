//! `/health` endpoint.

use std::time::Instant;

use drivrr_core::constants::BACKEND;
use serde::Serialize;

use crate::websocket::registry::RegistryStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Implementation tag.
    pub backend: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Connected drivers.
    pub drivers: usize,
    /// Connected customers.
    pub customers: usize,
    /// Drivers free for new rides.
    pub available_drivers: usize,
    /// Drivers on a ride.
    pub busy_drivers: usize,
    /// Rides in progress.
    pub active_rides: usize,
    /// RFC 3339 time of the check.
    pub timestamp: String,
}

/// Build a health response from registry counters.
pub fn health_check(start_time: Instant, stats: RegistryStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        backend: BACKEND.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        drivers: stats.drivers,
        customers: stats.customers,
        available_drivers: stats.available_drivers,
        busy_drivers: stats.busy_drivers,
        active_rides: stats.active_rides,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), RegistryStats::default());
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.backend, "rust");
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, RegistryStats::default());
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn counters_copied_from_stats() {
        let stats = RegistryStats {
            connections: 5,
            drivers: 3,
            customers: 2,
            available_drivers: 2,
            busy_drivers: 1,
            active_rides: 1,
        };
        let resp = health_check(Instant::now(), stats);
        assert_eq!(resp.connections, 5);
        assert_eq!(resp.drivers, 3);
        assert_eq!(resp.customers, 2);
        assert_eq!(resp.busy_drivers, 1);
    }

    #[test]
    fn serialization_uses_camel_case() {
        let resp = health_check(Instant::now(), RegistryStats::default());
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert!(parsed["uptimeSecs"].is_number());
        assert!(parsed["availableDrivers"].is_number());
        assert!(parsed["activeRides"].is_number());
        assert!(parsed["timestamp"].is_string());
    }
}
