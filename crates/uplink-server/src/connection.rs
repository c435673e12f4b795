//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uplink_core::ClientId;

/// Close code and reason recorded when a connection is told to shut down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseSignal {
    /// WebSocket close code.
    pub code: u16,
    /// Human-readable close reason.
    pub reason: String,
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self {
            code: 1000, // normal closure
            reason: String::new(),
        }
    }
}

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique client ID.
    pub id: ClientId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has produced traffic since the last check.
    pub is_alive: AtomicBool,
    /// When the last frame (of any kind) was received.
    last_seen: Mutex<Instant>,
    /// Count of messages dropped due to full channel.
    pub dropped_messages: AtomicU64,
    /// First close request wins; later ones are ignored.
    close: Mutex<Option<CloseSignal>>,
    /// Cancelled once a close has been requested.
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ClientId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            close: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Send a text message to the client.
    ///
    /// Returns `false` if the connection is closing, or if the channel is
    /// full or closed. Full/closed channels increment the dropped counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Whether the client can still receive messages.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed() && !self.cancel.is_cancelled()
    }

    /// Request a close with the given code and reason.
    ///
    /// The first call records the signal; subsequent calls are no-ops.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        {
            let mut guard = self.close.lock();
            if guard.is_none() {
                *guard = Some(CloseSignal {
                    code,
                    reason: reason.into(),
                });
            }
        }
        self.cancel.cancel();
    }

    /// The recorded close signal, or a normal closure if none was set.
    pub fn close_signal(&self) -> CloseSignal {
        self.close.lock().clone().unwrap_or_default()
    }

    /// Resolves once a close has been requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Duration since the last received frame (or connection establishment).
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
