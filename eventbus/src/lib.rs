//! # eventbus
//!
//! Resumable consumer for single-socket event streams.
//!
//! ## Features
//!
//! - **Resumable**: offsets are checkpointed after the handler accepts a
//!   message; reconnects resume from the last checkpoint
//! - **At-least-once**: a rejected message is never checkpointed and is
//!   delivered again after reconnecting
//! - **Pluggable backoff**: constant, exponential, limited and limited-exponential
//!   reconnection schedulers
//! - **Pluggable storage**: in-memory or remote key-value (Redis with the
//!   `redis` feature) checkpoint stores
//! - **Transport agnostic**: any duplex frame channel implementing
//!   [`Transport`]; see `eventbus-ws` for WebSocket
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventbus::{ClientConfig, Eventbus, ReconnectPolicy, StreamMessage};
//! use eventbus::checkpoint::{KeyValueCheckpointStore, RedisCommands};
//! use eventbus_ws::WsConnector;
//!
//! let config = ClientConfig::from_env()?;
//! let store = KeyValueCheckpointStore::new("billing", RedisCommands::open("redis://127.0.0.1/")?);
//!
//! let handle = Eventbus::builder(config, WsConnector::new(), store, |m: StreamMessage| {
//!     println!("partition {} offset {}", m.partition, m.offset);
//!     Ok(())
//! })
//! .reconnect(ReconnectPolicy::default())
//! .build()
//! .run()?;
//!
//! handle.wait()?;
//! ```

// Tracing macros - no-op when feature disabled
#[cfg(feature = "tracing")]
macro_rules! trace_debug { ($($arg:tt)*) => { tracing::debug!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug { ($($arg:tt)*) => {} }

#[cfg(feature = "tracing")]
macro_rules! trace_info { ($($arg:tt)*) => { tracing::info!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_info { ($($arg:tt)*) => {} }

#[cfg(feature = "tracing")]
macro_rules! trace_warn { ($($arg:tt)*) => { tracing::warn!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn { ($($arg:tt)*) => {} }

pub mod checkpoint;
mod client;
pub mod config;
mod error;
mod message;
pub mod protocol;
pub mod reconnect;
mod shutdown;
mod transport;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore, PartitionOffsets};
pub use client::{ErrorObserver, Eventbus, EventbusBuilder, RunHandle, DEFAULT_KEEPALIVE_TIMEOUT};
pub use config::{ClientConfig, ConfigError, StartPosition};
pub use error::{EventbusError, HandlerError, Result};
pub use message::{EventHandler, StreamMessage};
pub use protocol::ConnectionState;
pub use reconnect::{Backoff, ReconnectPolicy, ReconnectScheduler};
pub use shutdown::Shutdown;
pub use transport::{Connector, Transport};
