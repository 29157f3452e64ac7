//! Transport contract consumed by the connection loop.
//!
//! The loop only needs a message-oriented duplex channel: whole frames in,
//! whole frames out. `eventbus-ws` provides the WebSocket implementation.

use std::io;
use std::time::Duration;

/// An open duplex frame channel.
pub trait Transport: Send {
    /// Send one frame.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Wait for the next data frame. `Ok(None)` means nothing arrived within
    /// the transport's poll interval; the caller may check for shutdown and
    /// call again. Keepalive traffic is handled internally.
    fn receive(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Arm the idle deadline: `receive` fails with `TimedOut` once `timeout`
    /// passes without a keepalive from the peer. Every keepalive re-arms it.
    fn set_keepalive_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Close the channel. Must be safe to call more than once.
    fn close(&mut self) -> io::Result<()>;
}

/// Opens transports.
pub trait Connector: Send {
    type Transport: Transport;

    fn connect(&mut self, endpoint: &str) -> io::Result<Self::Transport>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).send(frame)
    }

    fn receive(&mut self) -> io::Result<Option<Vec<u8>>> {
        (**self).receive()
    }

    fn set_keepalive_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        (**self).set_keepalive_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}
