//! # uplink-core
//!
//! Shared vocabulary for the uplink `WebSocket` broadcast server.
//!
//! - **Branded IDs**: [`ClientId`] newtype identifying one connected client
//! - **Wire envelopes**: [`OutboundEnvelope`] and [`InboundFrame`], the JSON
//!   messages exchanged with clients
//! - **Handler messages**: [`ClientMessage`] as delivered to application
//!   callbacks
//! - **Logging**: [`logging::init_subscriber`] for `tracing` setup

#![deny(unsafe_code)]

pub mod envelope;
pub mod ids;
pub mod logging;

pub use envelope::{ClientMessage, InboundFrame, OutboundEnvelope, message_type, now_ms};
pub use ids::ClientId;
