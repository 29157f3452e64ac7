//! Consumer protocol: wire frames and the per-socket state machine.
//!
//! ```text
//!  server hello {id, status}         ack {id, status, stream}
//! ┌─────────────┐  send handshake  ┌───────────────┐        ┌───────────┐
//! │ Handshaking │ ───────────────► │ Acknowledging │ ─────► │ Streaming │ ◄─┐
//! └─────────────┘                  └───────────────┘        └───────────┘ ──┘
//!                                                  {offset, partition, body}:
//!                                                  handle, then checkpoint
//! ```
//!
//! The handshake `state` field is base64 of either `{"p": {...}}` (resume from
//! stored offsets) or `{"d": "<sentinel>"}` (start at a stream boundary).
//!
//! Any error leaves the state untouched; the caller is expected to drop the
//! socket and start over from [`ConnectionState::Handshaking`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::checkpoint::{CheckpointStore, PartitionOffsets};
use crate::config::{ClientConfig, StartPosition};
use crate::error::{EventbusError, Result};
use crate::message::{EventHandler, StreamMessage};
use crate::transport::Transport;

/// First frame sent by the server on a fresh socket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerHello {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
}

/// Server reply accepting the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub stream: String,
}

/// Client handshake frame.
#[derive(Debug, Serialize)]
pub struct Handshake<'a> {
    pub id: &'a str,
    pub authentication: &'a str,
    pub stream: &'a str,
    pub client: &'a str,
    pub version: &'a str,
    pub state: String,
}

impl<'a> Handshake<'a> {
    pub fn new(server_id: &'a str, config: &'a ClientConfig, state: String) -> Self {
        Self {
            id: server_id,
            authentication: &config.auth_token,
            stream: &config.stream,
            client: &config.client,
            version: &config.version,
            state,
        }
    }
}

#[derive(Deserialize)]
struct WireMessage<'a> {
    offset: i64,
    partition: i32,
    #[serde(borrow, default)]
    body: Option<&'a RawValue>,
}

impl From<WireMessage<'_>> for StreamMessage {
    fn from(wire: WireMessage<'_>) -> Self {
        let body = wire.body.map_or("null", RawValue::get);
        StreamMessage::new(wire.partition, wire.offset, body.as_bytes())
    }
}

#[derive(Serialize)]
struct ResumeState<'a> {
    p: &'a PartitionOffsets,
}

#[derive(Serialize)]
struct BoundaryState {
    d: String,
}

/// Encode the handshake `state`: stored offsets when there are any,
/// otherwise the start position directive.
pub fn encode_state(
    snapshot: Option<&PartitionOffsets>,
    start: StartPosition,
) -> serde_json::Result<String> {
    let json = match snapshot.filter(|offsets| !offsets.is_empty()) {
        Some(offsets) => serde_json::to_vec(&ResumeState { p: offsets })?,
        None => serde_json::to_vec(&BoundaryState {
            d: start.sentinel().to_string(),
        })?,
    };
    Ok(STANDARD.encode(json))
}

/// Everything a state needs to process one frame.
pub struct Session<'a, T: ?Sized, H: ?Sized> {
    pub config: &'a ClientConfig,
    pub start: StartPosition,
    pub store: &'a dyn CheckpointStore,
    pub handler: &'a mut H,
    pub transport: &'a mut T,
}

/// Protocol state of one live socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Handshaking,
    Acknowledging,
    Streaming,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Handshaking => "handshaking",
            Self::Acknowledging => "acknowledging",
            Self::Streaming => "streaming",
        }
    }

    /// Feed one inbound frame. On success the state may have advanced.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn on_frame<T, H>(&mut self, frame: &[u8], session: &mut Session<'_, T, H>) -> Result<()>
    where
        T: Transport + ?Sized,
        H: EventHandler + ?Sized,
    {
        match *self {
            Self::Handshaking => {
                let hello: ServerHello = self.parse(frame)?;
                let snapshot = session.store.get_offsets()?;
                let state =
                    encode_state(snapshot.as_ref(), session.start).map_err(EventbusError::Encode)?;
                let handshake = Handshake::new(&hello.id, session.config, state);
                let payload = serde_json::to_vec(&handshake).map_err(EventbusError::Encode)?;
                session
                    .transport
                    .send(&payload)
                    .map_err(EventbusError::Send)?;
                trace_debug!(server_id = %hello.id, resume = snapshot.is_some(), "handshake sent");
                *self = Self::Acknowledging;
            }
            Self::Acknowledging => {
                let ack: Acknowledgement = self.parse(frame)?;
                trace_info!(stream = %ack.stream, status = %ack.status, "streaming");
                *self = Self::Streaming;
            }
            Self::Streaming => {
                let wire: WireMessage<'_> = self.parse(frame)?;
                let message = StreamMessage::from(wire);
                let (partition, offset) = (message.partition, message.offset);
                session
                    .handler
                    .handle(message)
                    .map_err(|source| EventbusError::Handler {
                        partition,
                        offset,
                        source,
                    })?;
                session.store.set_offset(partition, offset)?;
            }
        }
        Ok(())
    }

    fn parse<'de, D: Deserialize<'de>>(self, frame: &'de [u8]) -> Result<D> {
        serde_json::from_slice(frame).map_err(|e| EventbusError::malformed(self.name(), e))
    }
}
