//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long listeners get to drain before they are abandoned.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Signals the listener and every session to stop.
///
/// Session loops select on a child token, so cancelling here closes all
/// live connections.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token cancelled with the root but cancellable on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop accepting connections and drain live sessions.
    ///
    /// Cancelling the root token makes the listener stop accepting and every
    /// session close its socket with a close frame. `handles` are the listener
    /// tasks returned by `DispatchServer::listen`; they finish once axum has
    /// drained. Anything still running after `drain_for` (default 10 s) is
    /// left behind and reported.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        drain_for: Option<Duration>,
    ) {
        let drain_for = drain_for.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        let listeners = handles.len();

        self.shutdown();
        info!(listeners, drain_secs = drain_for.as_secs(), "draining dispatch sessions");

        match tokio::time::timeout(drain_for, futures::future::join_all(handles)).await {
            Ok(_) => info!(listeners, "listeners drained"),
            Err(_) => warn!(listeners, ?drain_for, "drain deadline passed, abandoning listeners"),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        assert!(!ShutdownCoordinator::new().is_shutting_down());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn child_tokens_follow_root() {
        let coord = ShutdownCoordinator::new();
        let a = coord.child_token();
        let b = coord.child_token();
        a.cancel();
        assert!(!coord.is_shutting_down());
        assert!(!b.is_cancelled());
        coord.shutdown();
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        coord.graceful_shutdown(vec![handle], None).await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_times_out_on_stuck_task() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let start = std::time::Instant::now();
        coord
            .graceful_shutdown(vec![handle], Some(Duration::from_millis(50)))
            .await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
