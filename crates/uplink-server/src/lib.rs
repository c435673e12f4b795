//! # uplink-server
//!
//! Embeddable `WebSocket` broadcast server.
//!
//! - Connection registry keyed by generated client IDs
//! - Inbound protocol: JSON envelopes, built-in `ping`/`pong` heartbeat,
//!   error replies for malformed frames
//! - Broadcast and unicast delivery, best-effort with slow-client removal
//! - Optional per-event callbacks for the embedding application
//! - Graceful shutdown that closes every client and clears the registry
//!
//! Construct an [`UplinkServer`] from a [`ServerConfig`] and an initial
//! [`EventHandlers`] set, call [`UplinkServer::start`], and push data out
//! with [`UplinkServer::send`] / [`UplinkServer::send_to_client`].

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod registry;
pub mod server;
mod session;
pub mod status;

pub use config::ServerConfig;
pub use connection::{ClientConnection, CloseSignal};
pub use errors::ServerError;
pub use handlers::EventHandlers;
pub use registry::ConnectionRegistry;
pub use server::UplinkServer;
pub use status::ServerStatus;
