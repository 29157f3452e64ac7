//! Error types for eventbus.

use std::io;

use thiserror::Error;

use crate::checkpoint::CheckpointError;

pub type Result<T> = std::result::Result<T, EventbusError>;

/// Error returned by an [`EventHandler`](crate::EventHandler).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum EventbusError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("malformed frame while {state}: {source}")]
    Malformed {
        state: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode handshake: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("handler rejected partition {partition} offset {offset}: {source}")]
    Handler {
        partition: i32,
        offset: i64,
        #[source]
        source: HandlerError,
    },

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("reconnects exhausted")]
    ReconnectsExhausted,

    #[error("internal fault: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EventbusError {
    pub(crate) fn connect(endpoint: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            source,
        }
    }

    pub(crate) fn malformed(state: &'static str, source: serde_json::Error) -> Self {
        Self::Malformed { state, source }
    }

    /// True when the connection loop recovers from this error by discarding
    /// the socket and reconnecting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Receive(_)
                | Self::Send(_)
                | Self::Malformed { .. }
                | Self::Encode(_)
                | Self::Handler { .. }
                | Self::Checkpoint(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let read = EventbusError::Receive(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(read.is_recoverable());

        let handler = EventbusError::Handler {
            partition: 0,
            offset: 7,
            source: "boom".into(),
        };
        assert!(handler.is_recoverable());
        assert_eq!(
            handler.to_string(),
            "handler rejected partition 0 offset 7: boom"
        );

        let connect = EventbusError::connect(
            "ws://localhost:1",
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert!(!connect.is_recoverable());
        assert!(!EventbusError::ReconnectsExhausted.is_recoverable());
        assert!(!EventbusError::Internal("panic".into()).is_recoverable());
    }
}
