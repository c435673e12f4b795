//! Connection registry and outbound fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::ws::close_code;
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uplink_core::ClientId;

use crate::connection::ClientConnection;
use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_MESSAGES_SENT_TOTAL};

/// Close reason for clients that cannot keep up with outbound traffic.
const SLOW_CLIENT_REASON: &str = "send buffer overflow";

/// Tracks connected clients and fans outbound payloads out to them.
///
/// A connection whose write fails is removed and asked to close before the
/// delivering call returns; its session task finishes the disconnect.
pub struct ConnectionRegistry {
    /// Connected clients indexed by client ID.
    connections: RwLock<HashMap<ClientId, Arc<ClientConnection>>>,
    /// Atomic counter tracking total connections (avoids read-locking for count queries).
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection.
    pub async fn register(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection by ID.
    pub async fn remove(&self, client_id: &ClientId) -> Option<Arc<ClientConnection>> {
        let mut conns = self.connections.write().await;
        let removed = conns.remove(client_id);
        if removed.is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Look up a connection by ID.
    pub async fn get(&self, client_id: &ClientId) -> Option<Arc<ClientConnection>> {
        let conns = self.connections.read().await;
        conns.get(client_id).cloned()
    }

    /// Whether the given client is registered and can still receive.
    pub async fn is_open(&self, client_id: &ClientId) -> bool {
        let conns = self.connections.read().await;
        conns.get(client_id).is_some_and(|c| c.is_open())
    }

    /// IDs of all registered clients.
    pub async fn client_ids(&self) -> Vec<ClientId> {
        let conns = self.connections.read().await;
        conns.keys().cloned().collect()
    }

    /// Snapshot of all registered connections.
    pub async fn all(&self) -> Vec<Arc<ClientConnection>> {
        let conns = self.connections.read().await;
        conns.values().cloned().collect()
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Whether no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every connection and return the drained handles.
    pub async fn clear(&self) -> Vec<Arc<ClientConnection>> {
        let mut conns = self.connections.write().await;
        let drained: Vec<_> = conns.drain().map(|(_, conn)| conn).collect();
        self.active_count.store(0, Ordering::Relaxed);
        drained
    }

    /// Fan a serialized payload out to every registered client.
    ///
    /// Clients whose write fails are removed and closed before this returns.
    /// Returns the number of clients that accepted the payload.
    pub async fn deliver_all(&self, payload: Arc<String>) -> usize {
        let mut delivered = 0usize;
        let mut to_remove = Vec::new();
        {
            let conns = self.connections.read().await;
            for conn in conns.values() {
                if conn.send(Arc::clone(&payload)) {
                    delivered += 1;
                } else {
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    warn!(client_id = %conn.id, drops = conn.drop_count(), "dropping client on failed send");
                    to_remove.push(conn.id.clone());
                }
            }
            debug!(recipients = delivered, dropped = to_remove.len(), "broadcast payload");
        }
        self.remove_failed(&to_remove).await;
        counter!(WS_MESSAGES_SENT_TOTAL).increment(delivered as u64);
        delivered
    }

    /// Deliver a serialized payload to one client.
    ///
    /// Returns `false` if the client is unknown, closed, or its write fails.
    /// A failed write removes and closes the connection before returning.
    pub async fn deliver_to(&self, client_id: &ClientId, payload: Arc<String>) -> bool {
        let Some(conn) = self.get(client_id).await else {
            debug!(client_id = %client_id, "unicast target not registered");
            return false;
        };
        if !conn.is_open() {
            self.remove_failed(std::slice::from_ref(client_id)).await;
            return false;
        }
        if conn.send(payload) {
            counter!(WS_MESSAGES_SENT_TOTAL).increment(1);
            true
        } else {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            warn!(client_id = %client_id, "dropping client on failed send");
            self.remove_failed(std::slice::from_ref(client_id)).await;
            false
        }
    }

    /// Remove the given clients and ask each to close.
    async fn remove_failed(&self, client_ids: &[ClientId]) {
        if client_ids.is_empty() {
            return;
        }
        let mut removed = Vec::with_capacity(client_ids.len());
        {
            let mut conns = self.connections.write().await;
            for id in client_ids {
                if let Some(conn) = conns.remove(id) {
                    let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                    removed.push(conn);
                }
            }
        }
        for conn in removed {
            conn.close(close_code::AGAIN, SLOW_CLIENT_REASON);
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
