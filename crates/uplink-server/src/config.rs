//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the uplink server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"localhost"`).
    pub host: String,
    /// Port to bind (default `3001`, use `0` for auto-assign).
    pub port: u16,
    /// URL path that accepts WebSocket upgrades (default `"/ws"`).
    ///
    /// Must be a literal path segment starting with `/`. Route-template
    /// characters (`{`, `}`) are not supported; `start` panics on them when
    /// building the router.
    pub path: String,
    /// Per-client outbound queue capacity in messages.
    pub send_buffer: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds (close after this long without traffic).
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 3001,
            path: "/ws".into(),
            send_buffer: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl ServerConfig {
    /// Set the bind host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the WebSocket upgrade path. A missing leading `/` is added.
    ///
    /// The path is used verbatim as a route, so it must not contain
    /// route-template characters (`{`, `}`).
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Address string suitable for `TcpListener::bind`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
