//! WebSocket transport implementation.

use std::io;
use std::net::TcpStream;
use std::time::{Duration, Instant};

use eventbus::{Connector, Transport};
use tungstenite::error::UrlError;
use tungstenite::protocol::WebSocket;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{client, Message};

use crate::error::{Result, WsError};

/// Longest a single socket read may block, so the caller regains control
/// to check for shutdown while the stream is idle.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Client side of one WebSocket connection.
///
/// Each read blocks for at most [`POLL_INTERVAL`] or until the keepalive
/// deadline passes, whichever comes first.
pub struct WsTransport {
    ws: WebSocket<MaybeTlsStream<TcpStream>>,
    keepalive: Option<Duration>,
    deadline: Option<Instant>,
    closed: bool,
}

impl WsTransport {
    /// Connect to a WebSocket server
    pub fn connect(url: &str) -> Result<Self> {
        let (ws, _response) = client::connect(url).map_err(|e| match e {
            tungstenite::Error::Url(UrlError::UnableToConnect(addr)) => WsError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("unable to connect to {addr}"),
            )),
            tungstenite::Error::Url(_) | tungstenite::Error::HttpFormat(_) => {
                WsError::invalid_url(url)
            }
            other => WsError::WebSocket(other),
        })?;

        if let MaybeTlsStream::Plain(ref stream) = ws.get_ref() {
            stream.set_nodelay(true)?;
        }

        Ok(Self {
            ws,
            keepalive: None,
            deadline: None,
            closed: false,
        })
    }

    fn refresh_deadline(&mut self) {
        self.deadline = self
            .keepalive
            .and_then(|timeout| Instant::now().checked_add(timeout));
    }

    /// Bound the next socket read by the poll interval and whatever is left
    /// of the deadline.
    fn arm_read_timeout(&self) -> Result<()> {
        let timeout = match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(WsError::KeepaliveTimeout(self.keepalive.unwrap_or_default()));
                }
                remaining.min(POLL_INTERVAL)
            }
            None => POLL_INTERVAL,
        };
        if let MaybeTlsStream::Plain(ref stream) = self.ws.get_ref() {
            stream.set_read_timeout(Some(timeout))?;
        }
        Ok(())
    }

    /// One bounded read. `None` when only keepalive traffic or nothing at
    /// all arrived.
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        self.arm_read_timeout()?;
        match self.ws.read() {
            Ok(Message::Text(text)) => Ok(Some(text.as_bytes().to_vec())),
            Ok(Message::Binary(data)) => Ok(Some(data.to_vec())),
            Ok(Message::Ping(_)) => {
                self.refresh_deadline();
                trace_debug!("keepalive ping");
                // The pong is queued by tungstenite.
                self.ws.flush()?;
                Ok(None)
            }
            Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => Ok(None),
            Ok(Message::Close(_)) => {
                // Send the queued close reply.
                let _ = self.ws.flush();
                self.closed = true;
                Err(WsError::ConnectionClosed)
            }
            Err(tungstenite::Error::Io(ref e)) if is_timeout(e) => {
                let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
                if expired {
                    return Err(WsError::KeepaliveTimeout(self.keepalive.unwrap_or_default()));
                }
                Ok(None)
            }
            Err(e) => {
                self.closed = true;
                Err(e.into())
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl Transport for WsTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }

        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.ws.send(msg).map_err(WsError::from)?;
        Ok(())
    }

    fn receive(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        Ok(self.read_frame()?)
    }

    fn set_keepalive_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.keepalive = Some(timeout);
        self.refresh_deadline();
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.closed {
            self.closed = true;
            let _ = self.ws.close(None);
            let _ = self.ws.flush();
        }
        Ok(())
    }
}

/// Opens a [`WsTransport`] per connection attempt.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    fn connect(&mut self, endpoint: &str) -> io::Result<WsTransport> {
        trace_debug!(endpoint, "opening websocket");
        Ok(WsTransport::connect(endpoint)?)
    }
}
