//! Scripted transports.
//!
//! A [`ScriptedConnector`] hands out one scripted session per connect call,
//! in order. Each session replays its [`Step`]s on `receive` and records what
//! the client sends. Once the sessions run out, connecting is refused.
//!
//! ```
//! use eventbus_test_support::frames::{ack, hello};
//! use eventbus_test_support::{ScriptedConnector, Step};
//! use std::io::ErrorKind;
//!
//! let connector = ScriptedConnector::new()
//!     .session([Step::Frame(hello("a")), Step::Fail(ErrorKind::ConnectionReset)])
//!     .session([hello("b"), ack("b", "orders")]);
//! let log = connector.log();
//! assert_eq!(log.connections(), 0);
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use eventbus::{Connector, Transport};
use parking_lot::Mutex;

/// One scripted inbound event.
pub enum Step {
    /// Deliver a frame.
    Frame(Vec<u8>),
    /// Fail the read with this error kind.
    Fail(io::ErrorKind),
    /// Report a quiet poll interval (`Ok(None)`).
    Idle,
    /// Run a callback, then continue with the next step.
    Run(Box<dyn FnOnce() + Send>),
}

impl From<Vec<u8>> for Step {
    fn from(frame: Vec<u8>) -> Self {
        Self::Frame(frame)
    }
}

impl Step {
    pub fn run(f: impl FnOnce() + Send + 'static) -> Self {
        Self::Run(Box::new(f))
    }
}

enum Plan {
    Accept(VecDeque<Step>),
    Refuse(io::ErrorKind),
}

/// What happened on one scripted connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRecord {
    pub sent: Vec<Vec<u8>>,
    pub keepalive: Option<Duration>,
    pub closed: bool,
}

/// Shared record of all connection activity.
#[derive(Debug, Clone, Default)]
pub struct ConnectionLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Debug, Default)]
struct LogInner {
    attempts: usize,
    endpoints: Vec<String>,
    connections: Vec<ConnectionRecord>,
}

impl ConnectionLog {
    /// Connect calls, including refused ones.
    pub fn attempts(&self) -> usize {
        self.inner.lock().attempts
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.inner.lock().endpoints.clone()
    }

    /// Successfully opened connections.
    pub fn connections(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn record(&self, connection: usize) -> Option<ConnectionRecord> {
        self.inner.lock().connections.get(connection).cloned()
    }

    pub fn sent(&self, connection: usize) -> Vec<Vec<u8>> {
        self.record(connection).map(|r| r.sent).unwrap_or_default()
    }

    /// First frame each connection sent, parsed as JSON.
    pub fn handshakes(&self) -> Vec<serde_json::Value> {
        self.inner
            .lock()
            .connections
            .iter()
            .filter_map(|c| c.sent.first())
            .filter_map(|frame| serde_json::from_slice(frame).ok())
            .collect()
    }

    pub fn all_closed(&self) -> bool {
        self.inner.lock().connections.iter().all(|c| c.closed)
    }

    fn open(&self, endpoint: &str) -> usize {
        let mut inner = self.inner.lock();
        inner.endpoints.push(endpoint.to_string());
        inner.connections.push(ConnectionRecord::default());
        inner.connections.len() - 1
    }

    fn with_record(&self, connection: usize, f: impl FnOnce(&mut ConnectionRecord)) {
        if let Some(record) = self.inner.lock().connections.get_mut(connection) {
            f(record);
        }
    }
}

/// Connector replaying scripted sessions.
#[derive(Default)]
pub struct ScriptedConnector {
    plans: VecDeque<Plan>,
    log: ConnectionLog,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session that accepts the connection and replays `steps`.
    pub fn session<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        self.plans
            .push_back(Plan::Accept(steps.into_iter().map(Into::into).collect()));
        self
    }

    /// Queue a refused connection attempt.
    pub fn refuse(mut self, kind: io::ErrorKind) -> Self {
        self.plans.push_back(Plan::Refuse(kind));
        self
    }

    pub fn log(&self) -> ConnectionLog {
        self.log.clone()
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    fn connect(&mut self, endpoint: &str) -> io::Result<ScriptedTransport> {
        self.log.inner.lock().attempts += 1;
        match self.plans.pop_front() {
            Some(Plan::Accept(steps)) => Ok(ScriptedTransport {
                steps,
                index: self.log.open(endpoint),
                log: self.log.clone(),
                closed: false,
            }),
            Some(Plan::Refuse(kind)) => Err(io::Error::new(kind, "scripted refusal")),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "no scripted session left",
            )),
        }
    }
}

/// Transport replaying one scripted session.
pub struct ScriptedTransport {
    steps: VecDeque<Step>,
    log: ConnectionLog,
    index: usize,
    closed: bool,
}

impl Transport for ScriptedTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        self.log
            .with_record(self.index, |r| r.sent.push(frame.to_vec()));
        Ok(())
    }

    fn receive(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        loop {
            match self.steps.pop_front() {
                Some(Step::Frame(frame)) => return Ok(Some(frame)),
                Some(Step::Idle) => return Ok(None),
                Some(Step::Fail(kind)) => return Err(io::Error::new(kind, "scripted failure")),
                Some(Step::Run(f)) => f(),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "script exhausted",
                    ))
                }
            }
        }
    }

    fn set_keepalive_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.log
            .with_record(self.index, |r| r.keepalive = Some(timeout));
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        self.log.with_record(self.index, |r| r.closed = true);
        Ok(())
    }
}
