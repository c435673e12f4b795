//! Application event callbacks.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use uplink_core::{ClientId, ClientMessage};

/// Callback for every well-formed inbound message.
pub type MessageHandler = Arc<dyn Fn(ClientMessage) + Send + Sync>;
/// Callback invoked after a client registers.
pub type ConnectHandler = Arc<dyn Fn(ClientId) + Send + Sync>;
/// Callback invoked after a client is removed.
pub type DisconnectHandler = Arc<dyn Fn(ClientId) + Send + Sync>;
/// Callback for inbound messages other than the built-in heartbeat.
pub type CustomMessageHandler = Arc<dyn Fn(String, Value, ClientId) + Send + Sync>;

/// Optional callbacks the embedding application can register.
///
/// All slots start empty. [`EventHandlers::merge`] overlays another set on
/// top of this one: slots present in the other set win, absent slots keep
/// their current value.
#[derive(Clone, Default)]
pub struct EventHandlers {
    on_message: Option<MessageHandler>,
    on_client_connect: Option<ConnectHandler>,
    on_client_disconnect: Option<DisconnectHandler>,
    on_custom_message: Option<CustomMessageHandler>,
}

impl EventHandlers {
    /// Create an empty handler set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handler for every well-formed inbound message.
    #[must_use]
    pub fn with_on_message(
        mut self,
        handler: impl Fn(ClientMessage) + Send + Sync + 'static,
    ) -> Self {
        self.on_message = Some(Arc::new(handler));
        self
    }

    /// Set the handler invoked after a client connects.
    #[must_use]
    pub fn with_on_client_connect(
        mut self,
        handler: impl Fn(ClientId) + Send + Sync + 'static,
    ) -> Self {
        self.on_client_connect = Some(Arc::new(handler));
        self
    }

    /// Set the handler invoked after a client disconnects.
    #[must_use]
    pub fn with_on_client_disconnect(
        mut self,
        handler: impl Fn(ClientId) + Send + Sync + 'static,
    ) -> Self {
        self.on_client_disconnect = Some(Arc::new(handler));
        self
    }

    /// Set the handler for non-heartbeat inbound message types.
    #[must_use]
    pub fn with_on_custom_message(
        mut self,
        handler: impl Fn(String, Value, ClientId) + Send + Sync + 'static,
    ) -> Self {
        self.on_custom_message = Some(Arc::new(handler));
        self
    }

    /// Overlay `other` on top of this set; present slots overwrite.
    pub fn merge(&mut self, other: Self) {
        if other.on_message.is_some() {
            self.on_message = other.on_message;
        }
        if other.on_client_connect.is_some() {
            self.on_client_connect = other.on_client_connect;
        }
        if other.on_client_disconnect.is_some() {
            self.on_client_disconnect = other.on_client_disconnect;
        }
        if other.on_custom_message.is_some() {
            self.on_custom_message = other.on_custom_message;
        }
    }

    /// Invoke the message handler, if set.
    pub fn dispatch_message(&self, message: ClientMessage) {
        if let Some(handler) = &self.on_message {
            handler(message);
        }
    }

    /// Invoke the connect handler, if set.
    pub fn dispatch_connect(&self, client_id: ClientId) {
        if let Some(handler) = &self.on_client_connect {
            handler(client_id);
        }
    }

    /// Invoke the disconnect handler, if set.
    pub fn dispatch_disconnect(&self, client_id: ClientId) {
        if let Some(handler) = &self.on_client_disconnect {
            handler(client_id);
        }
    }

    /// Invoke the custom message handler, if set.
    pub fn dispatch_custom(&self, message_type: String, data: Value, client_id: ClientId) {
        if let Some(handler) = &self.on_custom_message {
            handler(message_type, data, client_id);
        }
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_message", &self.on_message.is_some())
            .field("on_client_connect", &self.on_client_connect.is_some())
            .field("on_client_disconnect", &self.on_client_disconnect.is_some())
            .field("on_custom_message", &self.on_custom_message.is_some())
            .finish()
    }
}
