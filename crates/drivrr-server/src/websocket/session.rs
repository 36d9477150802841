//! WebSocket session lifecycle: one connected participant from upgrade
//! through disconnect.
//!
//! Each session runs a read loop (this task) and a write loop (spawned). The
//! two share a [`ClientConnection`]; whichever loop exits first triggers
//! teardown, and the connection's latch makes that cleanup happen once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use drivrr_core::{Role, UserId};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::registry::Registry;
use crate::config::SessionLimits;
use crate::dispatch::Dispatcher;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Why the read loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadExit {
    Closed,
    Shutdown,
    ClientClose,
    Eof,
    ReadTimeout,
    ReadError,
}

/// Run a session for an upgraded socket until either side goes away.
#[instrument(skip_all, fields(user_id = %user_id, role = %role))]
pub async fn run_ws_session(
    ws: WebSocket,
    user_id: UserId,
    role: Role,
    dispatcher: Arc<Dispatcher>,
    limits: SessionLimits,
    shutdown: CancellationToken,
) {
    let (ws_tx, ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(limits.queue_capacity);
    let conn = Arc::new(ClientConnection::new(user_id, role, send_tx));
    let registry = dispatcher.registry().clone();

    info!(conn_id = %conn.id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL, "role" => role.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    registry.register(conn.clone());

    let writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        conn.clone(),
        registry.clone(),
        limits,
    ));

    let exit = read_loop(ws_rx, &conn, &dispatcher, limits, &shutdown).await;
    debug!(conn_id = %conn.id, ?exit, "read loop finished");
    let _ = teardown(&registry, &conn);

    // The write loop observes the closed connection and sends a close frame
    // within its write deadline.
    let _ = writer.await;

    info!(conn_id = %conn.id, dropped = conn.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "role" => role.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());
}

/// Unregister and close, once. Returns `true` for the caller that did it.
pub fn teardown(registry: &Registry, conn: &ClientConnection) -> bool {
    if !conn.begin_teardown() {
        return false;
    }
    let _ = registry.unregister(conn);
    conn.close();
    true
}

async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    conn: &ClientConnection,
    dispatcher: &Dispatcher,
    limits: SessionLimits,
    shutdown: &CancellationToken,
) -> ReadExit {
    loop {
        let next = tokio::select! {
            () = conn.closed() => return ReadExit::Closed,
            () = shutdown.cancelled() => return ReadExit::Shutdown,
            next = tokio::time::timeout(limits.read_timeout, ws_rx.next()) => next,
        };

        let msg = match next {
            Err(_) => {
                warn!(conn_id = %conn.id, timeout = ?limits.read_timeout, "read deadline exceeded");
                return ReadExit::ReadTimeout;
            }
            Ok(None) => return ReadExit::Eof,
            Ok(Some(Err(error))) => {
                debug!(conn_id = %conn.id, %error, "read failed");
                return ReadExit::ReadError;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => {
                let _ = dispatcher.dispatch(conn, text.as_str());
            }
            Message::Binary(data) => {
                if let Ok(text) = std::str::from_utf8(&data) {
                    let _ = dispatcher.dispatch(conn, text);
                } else {
                    debug!(conn_id = %conn.id, len = data.len(), "non-UTF8 binary frame dropped");
                }
            }
            // Any frame refreshes the deadline; nothing else to do.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return ReadExit::ClientClose,
        }
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    conn: Arc<ClientConnection>,
    registry: Arc<Registry>,
    limits: SessionLimits,
) {
    let start = tokio::time::Instant::now() + limits.ping_interval;
    let mut ping = tokio::time::interval_at(start, limits.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            biased;
            () = conn.closed() => break,
            msg = send_rx.recv() => match msg {
                Some(text) => Message::Text(String::clone(&text).into()),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };
        if !write_frame(&mut ws_tx, frame, limits.write_timeout, &conn).await {
            let _ = teardown(&registry, &conn);
            return;
        }
    }

    let close = tokio::time::timeout(limits.write_timeout, ws_tx.send(Message::Close(None)));
    if close.await.is_err() {
        debug!(conn_id = %conn.id, "close handshake timed out");
    }
    let _ = teardown(&registry, &conn);
}

async fn write_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame: Message,
    deadline: Duration,
    conn: &ClientConnection,
) -> bool {
    let started = Instant::now();
    match tokio::time::timeout(deadline, ws_tx.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            debug!(conn_id = %conn.id, %error, "write failed");
            false
        }
        Err(_) => {
            warn!(
                conn_id = %conn.id,
                elapsed_ms = started.elapsed().as_millis(),
                "write deadline exceeded"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(4);
        (
            Arc::new(ClientConnection::new("d1".into(), Role::Driver, tx)),
            rx,
        )
    }

    #[test]
    fn teardown_unregisters_and_closes() {
        let registry = Registry::new();
        let (conn, _rx) = connection();
        registry.register(conn.clone());

        assert!(teardown(&registry, &conn));
        assert!(conn.is_closed());
        assert!(registry.lookup_driver("d1").is_none());
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn teardown_runs_once() {
        let registry = Registry::new();
        let (conn, _rx) = connection();
        registry.register(conn.clone());

        assert!(teardown(&registry, &conn));
        assert!(!teardown(&registry, &conn));
    }

    #[test]
    fn concurrent_teardown_single_cleanup() {
        let registry = Arc::new(Registry::new());
        let (conn, _rx) = connection();
        registry.register(conn.clone());

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let registry = registry.clone();
                let conn = conn.clone();
                std::thread::spawn(move || teardown(&registry, &conn))
            })
            .collect();
        let cleanups = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|did| *did)
            .count();
        assert_eq!(cleanups, 1);
        assert_eq!(registry.stats().drivers, 0);
    }

    #[test]
    fn teardown_of_superseded_connection_keeps_replacement() {
        let registry = Registry::new();
        let (old, _rx1) = connection();
        let (new, _rx2) = connection();
        registry.register(old.clone());
        registry.register(new.clone());

        assert!(teardown(&registry, &old));
        assert_eq!(registry.lookup_driver("d1").unwrap().id, new.id);
        assert!(!new.is_closed());
    }
}
