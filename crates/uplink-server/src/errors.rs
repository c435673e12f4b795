//! Server error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors returned by server lifecycle operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called while the server was already running.
    #[error("server already running on {addr}")]
    AlreadyRunning {
        /// Address the running instance is bound to.
        addr: SocketAddr,
    },

    /// The configured address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was attempted.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn already_running_display() {
        let err = ServerError::AlreadyRunning {
            addr: "127.0.0.1:3001".parse().unwrap(),
        };
        assert_eq!(err.to_string(), "server already running on 127.0.0.1:3001");
    }

    #[test]
    fn bind_display_includes_addr_and_cause() {
        let err = ServerError::Bind {
            addr: "localhost:80".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("failed to bind localhost:80"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn bind_exposes_source() {
        let err = ServerError::Bind {
            addr: "localhost:80".into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn already_running_has_no_source() {
        let err = ServerError::AlreadyRunning {
            addr: "127.0.0.1:0".parse().unwrap(),
        };
        assert!(err.source().is_none());
    }
}
