//! Error types for eventbus-ws.

use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WsError>;

#[derive(Error, Debug)]
pub enum WsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No keepalive within {0:?}")]
    KeepaliveTimeout(Duration),
}

impl WsError {
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl(url.into())
    }

    fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Io(e) => e.kind(),
            Self::WebSocket(tungstenite::Error::Io(e)) => e.kind(),
            Self::WebSocket(tungstenite::Error::ConnectionClosed) | Self::ConnectionClosed => {
                io::ErrorKind::ConnectionAborted
            }
            Self::WebSocket(tungstenite::Error::AlreadyClosed) => io::ErrorKind::NotConnected,
            Self::WebSocket(_) => io::ErrorKind::Other,
            Self::InvalidUrl(_) => io::ErrorKind::InvalidInput,
            Self::KeepaliveTimeout(_) => io::ErrorKind::TimedOut,
        }
    }
}

impl From<WsError> for io::Error {
    fn from(err: WsError) -> Self {
        match err {
            WsError::Io(e) | WsError::WebSocket(tungstenite::Error::Io(e)) => e,
            other => io::Error::new(other.kind(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_pass_through() {
        let err = WsError::WebSocket(tungstenite::Error::Io(io::Error::new(
            io::ErrorKind::WouldBlock,
            "would block",
        )));
        assert_eq!(io::Error::from(err).kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_kinds() {
        let timeout = io::Error::from(WsError::KeepaliveTimeout(Duration::from_secs(30)));
        assert_eq!(timeout.kind(), io::ErrorKind::TimedOut);
        assert_eq!(timeout.to_string(), "No keepalive within 30s");

        let closed = io::Error::from(WsError::WebSocket(tungstenite::Error::ConnectionClosed));
        assert_eq!(closed.kind(), io::ErrorKind::ConnectionAborted);

        let url = io::Error::from(WsError::invalid_url("nope"));
        assert_eq!(url.kind(), io::ErrorKind::InvalidInput);
    }
}
