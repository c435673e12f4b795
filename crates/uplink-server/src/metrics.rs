//! Metric name constants.
//!
//! Recorded through the [`metrics`] facade; the embedding application
//! decides which recorder (if any) to install.

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound text frames total (counter).
pub const WS_MESSAGES_RECEIVED_TOTAL: &str = "ws_messages_received_total";
/// Outbound envelopes delivered total (counter).
pub const WS_MESSAGES_SENT_TOTAL: &str = "ws_messages_sent_total";
/// Sends dropped due to full or closed client channels (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Inbound frames rejected as malformed (counter).
pub const WS_INVALID_FRAMES_TOTAL: &str = "ws_invalid_frames_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            WS_MESSAGES_RECEIVED_TOTAL,
            WS_MESSAGES_SENT_TOTAL,
            WS_BROADCAST_DROPS_TOTAL,
            WS_INVALID_FRAMES_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
