//! Arrival-time estimation.
//!
//! The dispatch handlers only see the [`EtaEstimator`] trait. A routing
//! backend can be plugged in at server construction; the crate ships a
//! clock-driven mock and a fixed estimator for tests.

use std::time::{SystemTime, UNIX_EPOCH};

/// Estimates how many minutes a driver needs to reach a pickup point.
///
/// Called outside the registry lock, so implementations may be slow, but
/// they must not panic.
pub trait EtaEstimator: Send + Sync {
    /// Minutes until arrival at (`lat`, `lng`).
    fn estimate_eta_minutes(&self, lat: f64, lng: f64) -> u32;
}

/// Placeholder estimator returning 3 to 8 minutes, varied by the clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockEtaEstimator;

impl MockEtaEstimator {
    const MIN_MINUTES: u32 = 3;
    const SPREAD: u32 = 6;
}

impl EtaEstimator for MockEtaEstimator {
    fn estimate_eta_minutes(&self, _lat: f64, _lng: f64) -> u32 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.subsec_nanos());
        Self::MIN_MINUTES + nanos % Self::SPREAD
    }
}

/// Always returns the same estimate.
#[derive(Clone, Copy, Debug)]
pub struct FixedEtaEstimator(pub u32);

impl EtaEstimator for FixedEtaEstimator {
    fn estimate_eta_minutes(&self, _lat: f64, _lng: f64) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_stays_in_range() {
        let est = MockEtaEstimator;
        for _ in 0..200 {
            let eta = est.estimate_eta_minutes(24.86, 67.00);
            assert!((3..=8).contains(&eta), "eta {eta} out of range");
        }
    }

    #[test]
    fn fixed_returns_configured_value() {
        assert_eq!(FixedEtaEstimator(7).estimate_eta_minutes(0.0, 0.0), 7);
    }

    #[test]
    fn usable_as_trait_object() {
        let est: std::sync::Arc<dyn EtaEstimator> = std::sync::Arc::new(FixedEtaEstimator(4));
        assert_eq!(est.estimate_eta_minutes(1.0, 1.0), 4);
    }
}
