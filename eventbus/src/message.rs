//! Stream messages and the handler contract.

use serde::de::DeserializeOwned;

use crate::error::HandlerError;

/// One event as delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub offset: i64,
    pub partition: i32,
    body: Vec<u8>,
}

impl StreamMessage {
    pub fn new(partition: i32, offset: i64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            partition,
            body: body.into(),
        }
    }

    /// Raw JSON of the body, exactly as received.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn decode_body<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Processes stream messages.
///
/// Returning an error means the message is not checkpointed; the connection
/// is dropped and the message is delivered again after reconnecting.
pub trait EventHandler: Send {
    fn handle(&mut self, message: StreamMessage) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: FnMut(StreamMessage) -> Result<(), HandlerError> + Send,
{
    fn handle(&mut self, message: StreamMessage) -> Result<(), HandlerError> {
        self(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_body() {
        let msg = StreamMessage::new(0, 5, br#"{"id":42}"#.to_vec());
        let value: serde_json::Value = msg.decode_body().unwrap();
        assert_eq!(value["id"], 42);
        assert_eq!(msg.body(), br#"{"id":42}"#);
    }

    #[test]
    fn test_closure_is_handler() {
        let mut seen = Vec::new();
        {
            let mut handler = |m: StreamMessage| -> Result<(), HandlerError> {
                seen.push(m.offset);
                Ok(())
            };
            handler.handle(StreamMessage::new(0, 1, b"null".to_vec())).unwrap();
            handler.handle(StreamMessage::new(0, 2, b"null".to_vec())).unwrap();
        }
        assert_eq!(seen, vec![1, 2]);
    }
}
