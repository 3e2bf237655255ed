//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] lfr_protocol::ProtocolError),

    #[error("KISS modem at {0} closed the connection")]
    ModemClosed(std::net::SocketAddr),

    #[error("cannot connect to KISS modem at {addr}: {source}")]
    ModemConnect {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Returns whether restarting the server may clear the error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServerError::ModemClosed(_) | ServerError::ModemConnect { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modem_errors_are_retryable() {
        let addr = "127.0.0.1:52001".parse().unwrap();
        assert!(ServerError::ModemClosed(addr).is_retryable());
        assert!(!ServerError::ShuttingDown.is_retryable());
        assert_eq!(
            ServerError::ModemClosed(addr).to_string(),
            "KISS modem at 127.0.0.1:52001 closed the connection"
        );
    }
}
