//! Per-connection handle shared between a session's loops and the registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use drivrr_core::{ConnectionId, Role, UserId};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::warn;

use crate::metrics::WS_OUTBOUND_DROPS_TOTAL;

/// A connected driver or customer.
///
/// The registry holds these behind `Arc`; the socket itself is owned by the
/// session's read and write loops. Sends never block: a full queue drops the
/// message and closes the connection.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Participant identity supplied at upgrade.
    pub user_id: UserId,
    /// Driver or customer.
    pub role: Role,
    /// Bounded queue feeding the write loop.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Cancelled when the connection must shut down.
    closed: CancellationToken,
    /// One-shot latch guarding unregister + close.
    torn_down: AtomicBool,
    /// Count of messages dropped due to a full or closed queue.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection with a fresh ID.
    pub fn new(user_id: UserId, role: Role, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self::with_id(ConnectionId::generate(), user_id, role, tx)
    }

    /// Create a connection with an explicit ID.
    pub fn with_id(
        id: ConnectionId,
        user_id: UserId,
        role: Role,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Self {
        Self {
            id,
            user_id,
            role,
            tx,
            connected_at: Instant::now(),
            closed: CancellationToken::new(),
            torn_down: AtomicBool::new(false),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Enqueue a serialized message for the write loop.
    ///
    /// Returns `false` if the message was dropped. A full queue marks the
    /// client unresponsive and closes the connection.
    pub fn send(&self, message: Arc<String>) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                counter!(WS_OUTBOUND_DROPS_TOTAL).increment(1);
                warn!(
                    conn_id = %self.id,
                    user_id = %self.user_id,
                    "outbound queue full, disconnecting slow client"
                );
                self.close();
                false
            }
            Err(TrySendError::Closed(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Signal both session loops to stop. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether the connection has been asked to close.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Claim the teardown latch.
    ///
    /// Returns `true` for exactly one caller; every later call returns `false`.
    pub fn begin_teardown(&self) -> bool {
        self.torn_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new("driver_1".into(), Role::Driver, tx);
        (conn, rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.id.starts_with("conn_"));
        assert_eq!(conn.user_id.as_str(), "driver_1");
        assert_eq!(conn.role, Role::Driver);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection(4);
        assert!(conn.send(Arc::new("hello".into())));
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn send_preserves_order() {
        let (conn, mut rx) = make_connection(8);
        for i in 0..5 {
            assert!(conn.send(Arc::new(format!("msg_{i}"))));
        }
        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(&*msg, &format!("msg_{i}"));
        }
    }

    #[test]
    fn full_queue_drops_and_closes() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(Arc::new("msg1".into())));
        assert!(!conn.send(Arc::new("msg2".into())));
        assert_eq!(conn.drop_count(), 1);
        assert!(conn.is_closed());
    }

    #[test]
    fn send_to_closed_channel_returns_false() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn teardown_latch_fires_once() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.begin_teardown());
        assert!(!conn.begin_teardown());
        assert!(!conn.begin_teardown());
    }

    #[test]
    fn teardown_latch_single_winner_across_threads() {
        let (conn, _rx) = make_connection(4);
        let conn = Arc::new(conn);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = conn.clone();
                std::thread::spawn(move || c.begin_teardown())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn closed_future_resolves_after_close() {
        let (conn, _rx) = make_connection(4);
        let conn = Arc::new(conn);
        let waiter = conn.clone();
        let handle = tokio::spawn(async move {
            waiter.closed().await;
            true
        });
        conn.close();
        conn.close();
        assert!(handle.await.unwrap());
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection(1);
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.age() > age1);
    }
}
