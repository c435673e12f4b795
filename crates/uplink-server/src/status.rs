//! Server status snapshot.

use serde::Serialize;
use std::net::SocketAddr;
use std::time::Instant;

/// Point-in-time view of the server, for logs and health reporting.
///
/// `host` and `port` are the configured values and are always present, even
/// while stopped; `address` is the actually-bound address while running
/// (which differs from the configured port when binding port 0).
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    /// Whether the server is accepting connections.
    pub running: bool,
    /// Configured bind host.
    pub host: String,
    /// Configured bind port.
    pub port: u16,
    /// Bound address while running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<SocketAddr>,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Seconds since the server started, while running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
}

/// Build a status snapshot from configuration and live counters.
pub fn snapshot(
    running: bool,
    host: String,
    port: u16,
    address: Option<SocketAddr>,
    connections: usize,
    started_at: Option<Instant>,
) -> ServerStatus {
    ServerStatus {
        running,
        host,
        port,
        address,
        connections,
        uptime_secs: started_at.map(|t| t.elapsed().as_secs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_snapshot() {
        let status = snapshot(false, "localhost".into(), 3001, None, 0, None);
        assert!(!status.running);
        assert!(status.address.is_none());
        assert!(status.uptime_secs.is_none());
    }

    #[test]
    fn stopped_snapshot_keeps_configured_endpoint() {
        let status = snapshot(false, "localhost".into(), 3001, None, 0, None);
        assert_eq!(status.host, "localhost");
        assert_eq!(status.port, 3001);
    }

    #[test]
    fn running_snapshot_has_uptime() {
        let addr: SocketAddr = "127.0.0.1:3001".parse().unwrap();
        let status = snapshot(
            true,
            "localhost".into(),
            3001,
            Some(addr),
            2,
            Some(Instant::now()),
        );
        assert!(status.running);
        assert_eq!(status.address, Some(addr));
        assert_eq!(status.connections, 2);
        assert!(status.uptime_secs.unwrap() < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let status = snapshot(true, "localhost".into(), 0, None, 0, Some(start));
        assert!(status.uptime_secs.unwrap() >= 59);
    }

    #[test]
    fn serialization_skips_absent_fields() {
        let status = snapshot(false, "localhost".into(), 3001, None, 0, None);
        let json = serde_json::to_string(&status).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["running"], false);
        assert_eq!(parsed["host"], "localhost");
        assert_eq!(parsed["port"], 3001);
        assert_eq!(parsed["connections"], 0);
        assert!(parsed.get("address").is_none());
        assert!(parsed.get("uptime_secs").is_none());
    }

    #[test]
    fn serialization_includes_present_fields() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let status = snapshot(
            true,
            "127.0.0.1".into(),
            9000,
            Some(addr),
            5,
            Some(Instant::now()),
        );
        let json = serde_json::to_string(&status).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["running"], true);
        assert_eq!(parsed["host"], "127.0.0.1");
        assert_eq!(parsed["port"], 9000);
        assert_eq!(parsed["address"], "127.0.0.1:9000");
        assert_eq!(parsed["connections"], 5);
        assert!(parsed["uptime_secs"].is_number());
    }
}
