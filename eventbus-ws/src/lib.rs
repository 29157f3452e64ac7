//! # eventbus-ws
//!
//! Blocking WebSocket transport for [`eventbus`].
//!
//! - Text and binary frames are delivered as data frames
//! - Pings refresh the keepalive deadline; pongs go out on the next flush
//! - A socket that stays silent past the deadline fails the read with
//!   [`io::ErrorKind::TimedOut`](std::io::ErrorKind::TimedOut)
//! - No read blocks longer than [`POLL_INTERVAL`]; a quiet interval
//!   returns `Ok(None)` so the client can notice shutdown
//!
//! ```rust,ignore
//! use eventbus::{ClientConfig, Eventbus, MemoryCheckpointStore};
//! use eventbus_ws::WsConnector;
//!
//! let config = ClientConfig::from_env()?;
//! let handle = Eventbus::builder(config, WsConnector::new(), MemoryCheckpointStore::new(), handler)
//!     .build()
//!     .run()?;
//! ```

// Tracing macros - no-op when feature disabled
#[cfg(feature = "tracing")]
macro_rules! trace_debug { ($($arg:tt)*) => { tracing::debug!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug { ($($arg:tt)*) => {} }

mod error;
mod transport;

pub use error::{Result, WsError};
pub use transport::{WsConnector, WsTransport, POLL_INTERVAL};
