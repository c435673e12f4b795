//! Server lifecycle, outbound operations, and the WebSocket router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::close_code;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uplink_core::{ClientId, OutboundEnvelope, message_type};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::handlers::EventHandlers;
use crate::registry::ConnectionRegistry;
use crate::session;
use crate::status::{self, ServerStatus};

/// Reason sent to clients when the server shuts down.
const SHUTDOWN_REASON: &str = "server shutting down";

/// How long to wait for the serve task to drain on stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared between the server handle, the router, and sessions.
pub(crate) struct ServerShared {
    /// Immutable configuration.
    pub(crate) config: ServerConfig,
    /// Connected clients.
    pub(crate) registry: ConnectionRegistry,
    /// Application callbacks, merged under the lock.
    handlers: parking_lot::RwLock<EventHandlers>,
    /// Whether the server is accepting connections.
    running: AtomicBool,
    /// Bound address and start time while running.
    listen: parking_lot::Mutex<Option<ListenInfo>>,
}

#[derive(Clone, Copy)]
struct ListenInfo {
    addr: SocketAddr,
    started_at: Instant,
}

impl ServerShared {
    /// Cheap clone of the current handler set.
    pub(crate) fn handlers_snapshot(&self) -> EventHandlers {
        self.handlers.read().clone()
    }
}

/// Owned by `start`, consumed by `stop`.
struct RunningState {
    addr: SocketAddr,
    shutdown: CancellationToken,
    serve_task: JoinHandle<()>,
}

/// Embeddable WebSocket broadcast server.
///
/// Cheap to clone; clones share the same underlying server, so a clone can
/// be moved into a callback or a spawned task.
#[derive(Clone)]
pub struct UplinkServer {
    shared: Arc<ServerShared>,
    lifecycle: Arc<Mutex<Option<RunningState>>>,
}

impl UplinkServer {
    /// Create a stopped server with the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            shared: Arc::new(ServerShared {
                config,
                registry: ConnectionRegistry::new(),
                handlers: parking_lot::RwLock::new(EventHandlers::default()),
                running: AtomicBool::new(false),
                listen: parking_lot::Mutex::new(None),
            }),
            lifecycle: Arc::new(Mutex::new(None)),
        }
    }

    /// Merge the given callbacks into the current handler set.
    ///
    /// Slots present in `handlers` overwrite; absent slots keep their
    /// current value. Applies to frames processed after the call.
    pub fn set_handlers(&self, handlers: EventHandlers) {
        self.shared.handlers.write().merge(handlers);
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.shared.registry
    }

    /// Whether the server is accepting connections.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// The bound address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.listen.lock().map(|info| info.addr)
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// IDs of all connected clients.
    pub async fn connected_clients(&self) -> Vec<ClientId> {
        self.shared.registry.client_ids().await
    }

    /// Whether the given client is connected and able to receive.
    pub async fn is_client_connected(&self, client_id: &ClientId) -> bool {
        self.shared.registry.is_open(client_id).await
    }

    /// Point-in-time status snapshot.
    #[must_use]
    pub fn status(&self) -> ServerStatus {
        let listen = *self.shared.listen.lock();
        status::snapshot(
            self.is_running(),
            self.shared.config.host.clone(),
            self.shared.config.port,
            listen.map(|info| info.addr),
            self.shared.registry.len(),
            listen.map(|info| info.started_at),
        )
    }

    /// Bind the configured address and start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyRunning`] if called while running, or
    /// [`ServerError::Bind`] when the address cannot be bound; the server
    /// stays stopped in that case.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Some(running) = lifecycle.as_ref() {
            return Err(ServerError::AlreadyRunning { addr: running.addr });
        }

        let bind_addr = self.shared.config.bind_addr();
        let listener = TcpListener::bind(bind_addr.as_str())
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                addr: bind_addr,
                source,
            })?;

        let shutdown = CancellationToken::new();
        let app = router(Arc::clone(&self.shared));

        let serve_shutdown = shutdown.clone();
        let serve_task = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { serve_shutdown.cancelled().await });
            if let Err(error) = serve.await {
                error!(%error, "server task failed");
            }
        });

        *self.shared.listen.lock() = Some(ListenInfo {
            addr,
            started_at: Instant::now(),
        });
        self.shared.running.store(true, Ordering::SeqCst);
        *lifecycle = Some(RunningState {
            addr,
            shutdown,
            serve_task,
        });

        info!(%addr, path = %self.shared.config.path, "server listening");
        Ok(())
    }

    /// Close every client, clear the registry, and release the listener.
    ///
    /// No-op if already stopped. Safe to call while sends are in flight;
    /// those sends fail silently.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            debug!("stop called while already stopped");
            return;
        };

        self.shared.running.store(false, Ordering::SeqCst);

        let connections = self.shared.registry.clear().await;
        let clients = connections.len();
        for connection in connections {
            connection.close(close_code::NORMAL, SHUTDOWN_REASON);
        }

        running.shutdown.cancel();
        let mut serve_task = running.serve_task;
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut serve_task).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(%error, "server task ended abnormally"),
            Err(_) => {
                warn!("graceful shutdown timed out, aborting server task");
                serve_task.abort();
            }
        }

        *self.shared.listen.lock() = None;
        info!(clients, "server stopped");
    }

    /// Broadcast `data` to every connected client as a `message` envelope.
    ///
    /// Returns how many clients accepted the payload. Does nothing (with a
    /// warning) while stopped.
    pub async fn send(&self, data: Value) -> usize {
        self.send_with_type(message_type::MESSAGE, data).await
    }

    /// Broadcast `data` with an explicit envelope type.
    pub async fn send_with_type(&self, message_type: &str, data: Value) -> usize {
        if !self.is_running() {
            warn!(message_type, "send ignored, server not running");
            return 0;
        }
        let envelope = OutboundEnvelope::new(message_type, data);
        let payload = Arc::new(envelope.to_wire());
        let delivered = self.shared.registry.deliver_all(payload).await;
        debug!(message_type, delivered, "broadcast envelope");
        delivered
    }

    /// Send `data` to one client as a `message` envelope.
    ///
    /// Returns `false` (with a warning) if the server is stopped, the client
    /// is unknown, or the write fails.
    pub async fn send_to_client(&self, client_id: &ClientId, data: Value) -> bool {
        self.send_to_client_with_type(client_id, message_type::MESSAGE, data)
            .await
    }

    /// Send `data` to one client with an explicit envelope type.
    pub async fn send_to_client_with_type(
        &self,
        client_id: &ClientId,
        message_type: &str,
        data: Value,
    ) -> bool {
        if !self.is_running() {
            warn!(message_type, "unicast ignored, server not running");
            return false;
        }
        let envelope = OutboundEnvelope::for_client(client_id.clone(), message_type, data);
        let payload = Arc::new(envelope.to_wire());
        let delivered = self.shared.registry.deliver_to(client_id, payload).await;
        if !delivered {
            warn!(client_id = %client_id, message_type, "unicast not delivered");
        }
        delivered
    }
}

impl Default for UplinkServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

/// Build the router: WebSocket upgrades on the configured path, 404 for
/// everything else.
fn router(shared: Arc<ServerShared>) -> Router {
    Router::new()
        .route(&shared.config.path, get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Assign a client ID and hand the socket to a session.
async fn ws_upgrade(
    State(shared): State<Arc<ServerShared>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let client_id = ClientId::new();
    ws.max_message_size(shared.config.max_message_size)
        .on_upgrade(move |socket| session::run_session(socket, client_id, shared))
}
