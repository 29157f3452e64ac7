//! Test support for eventbus.
//!
//! - [`script`]: scripted connectors and transports with recorded traffic
//! - [`fault`]: deterministic and random failure plans
//! - [`handler`]: recording handlers that fail on demand
//! - [`frames`]: server frame builders

pub mod fault;
pub mod frames;
pub mod handler;
pub mod script;

pub use fault::{FaultInjector, FaultPlan};
pub use handler::{Delivery, RecordingHandler};
pub use script::{ConnectionLog, ConnectionRecord, ScriptedConnector, ScriptedTransport, Step};
