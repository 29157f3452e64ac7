//! Connection orchestrator.
//!
//! One worker thread owns the socket for the lifetime of the client:
//!
//! 1. Without a socket, ask the scheduler for a delay (exhausted: stop),
//!    sleep it, then open a transport (failure: stop).
//! 2. Arm the keepalive deadline.
//! 3. Read frames and feed them to the protocol state. A read error or a
//!    failed frame goes to the error observer, the socket is dropped and the
//!    loop returns to step 1 in the handshaking state. A quiet poll (no
//!    frame) just loops, so shutdown is noticed while the stream idles.
//!
//! The terminal outcome is reported once through [`RunHandle::wait`]. Panics
//! in the handler or the observer are caught and reported as
//! [`EventbusError::Internal`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::checkpoint::CheckpointStore;
use crate::config::{ClientConfig, StartPosition};
use crate::error::{EventbusError, Result};
use crate::message::EventHandler;
use crate::protocol::{ConnectionState, Session};
use crate::reconnect::{ReconnectPolicy, ReconnectScheduler};
use crate::shutdown::Shutdown;
use crate::transport::{Connector, Transport};

/// Idle time after which a socket without keepalives is considered dead.
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Receives every recoverable error before the socket is dropped.
pub type ErrorObserver = Box<dyn FnMut(&EventbusError) + Send>;

/// A live socket and its protocol state. Dropping it closes the socket.
struct Connection<T: Transport> {
    transport: T,
    state: ConnectionState,
}

impl<T: Transport> Connection<T> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            state: ConnectionState::Handshaking,
        }
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        let _ = self.transport.close();
    }
}

/// Event stream consumer.
///
/// # Example
///
/// ```rust,ignore
/// use eventbus::{ClientConfig, Eventbus, MemoryCheckpointStore, StreamMessage};
/// use eventbus_ws::WsConnector;
///
/// let config = ClientConfig::new("ws://bus:8080/sub", "token", "orders", "billing");
/// let client = Eventbus::builder(config, WsConnector::new(), MemoryCheckpointStore::new(), |m: StreamMessage| {
///     println!("{}:{}", m.partition, m.offset);
///     Ok(())
/// })
/// .start_at_newest()
/// .build();
///
/// let handle = client.run()?;
/// handle.wait()?;
/// ```
pub struct Eventbus<C: Connector, H> {
    config: ClientConfig,
    connector: C,
    handler: H,
    store: Box<dyn CheckpointStore>,
    scheduler: Box<dyn ReconnectScheduler>,
    start: StartPosition,
    keepalive_timeout: Duration,
    observer: ErrorObserver,
    shutdown: Shutdown,
    connection: Option<Connection<C::Transport>>,
}

impl<C, H> Eventbus<C, H>
where
    C: Connector,
    H: EventHandler,
{
    pub fn builder<S>(config: ClientConfig, connector: C, store: S, handler: H) -> EventbusBuilder<C, H>
    where
        S: CheckpointStore + 'static,
    {
        EventbusBuilder {
            config,
            connector,
            handler,
            store: Box::new(store),
            scheduler: None,
            start: StartPosition::default(),
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            observer: None,
            shutdown: Shutdown::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Signal that stops this client once raised.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the loop on the current thread until it terminates.
    ///
    /// Returns `Ok(())` only after a requested shutdown. The socket is closed
    /// before returning. A panic in the handler or the error observer is
    /// reported as [`EventbusError::Internal`].
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn run_blocking(mut self) -> Result<()> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.drive()))
            .unwrap_or_else(|payload| Err(EventbusError::Internal(panic_message(payload.as_ref()))));
        self.connection = None;
        match &result {
            Ok(()) => trace_info!(stream = %self.config.stream, "eventbus stopped"),
            Err(err) => trace_warn!(stream = %self.config.stream, error = %err, "eventbus terminated"),
        }
        result
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            if self.shutdown.is_requested() {
                return Ok(());
            }
            if self.connection.is_none() {
                match self.connect()? {
                    Some(connection) => self.connection = Some(connection),
                    None => return Ok(()),
                }
                continue;
            }
            if let Err(err) = self.step() {
                (self.observer)(&err);
                self.connection = None;
            }
        }
    }

    /// Wait out the next backoff and open a socket. `None` means shutdown
    /// was requested while waiting.
    fn connect(&mut self) -> Result<Option<Connection<C::Transport>>> {
        let backoff = self.scheduler.next_backoff();
        if backoff.is_exhausted() {
            return Err(EventbusError::ReconnectsExhausted);
        }

        let delay = backoff.delay();
        trace_debug!(endpoint = %self.config.endpoint, ?delay, "connecting");
        if self.shutdown.sleep(delay) {
            return Ok(None);
        }

        let endpoint = &self.config.endpoint;
        let transport = self
            .connector
            .connect(endpoint)
            .map_err(|e| EventbusError::connect(endpoint, e))?;
        let mut connection = Connection::new(transport);
        connection
            .transport
            .set_keepalive_timeout(self.keepalive_timeout)
            .map_err(|e| EventbusError::connect(endpoint, e))?;

        trace_info!(endpoint = %endpoint, "connected");
        Ok(Some(connection))
    }

    /// Read one frame and advance the protocol.
    fn step(&mut self) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };
        let Some(frame) = connection
            .transport
            .receive()
            .map_err(EventbusError::Receive)?
        else {
            return Ok(());
        };

        let mut session = Session {
            config: &self.config,
            start: self.start,
            store: self.store.as_ref(),
            handler: &mut self.handler,
            transport: &mut connection.transport,
        };
        connection.state.on_frame(&frame, &mut session)
    }
}

impl<C, H> Eventbus<C, H>
where
    C: Connector + 'static,
    C::Transport: 'static,
    H: EventHandler + 'static,
{
    /// Start the loop on a dedicated thread.
    pub fn run(self) -> Result<RunHandle> {
        let shutdown = self.shutdown.clone();
        let worker = thread::Builder::new()
            .name(format!("eventbus-{}", self.config.stream))
            .spawn(move || self.run_blocking())?;
        Ok(RunHandle { worker, shutdown })
    }
}

/// Handle to a client running on its own thread.
#[derive(Debug)]
pub struct RunHandle {
    worker: JoinHandle<Result<()>>,
    shutdown: Shutdown,
}

impl RunHandle {
    /// Ask the client to stop. Pair with [`RunHandle::wait`].
    pub fn shutdown(&self) {
        self.shutdown.request();
    }

    /// Signal shared with the worker, e.g. for a signal handler.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the client terminates and return why.
    ///
    /// A worker that died without reporting is mapped to
    /// [`EventbusError::Internal`].
    pub fn wait(self) -> Result<()> {
        match self.worker.join() {
            Ok(result) => result,
            Err(payload) => Err(EventbusError::Internal(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn log_error(err: &EventbusError) {
    trace_warn!(error = %err, "eventbus connection dropped");
}

/// Builder for [`Eventbus`].
pub struct EventbusBuilder<C, H> {
    config: ClientConfig,
    connector: C,
    handler: H,
    store: Box<dyn CheckpointStore>,
    scheduler: Option<Box<dyn ReconnectScheduler>>,
    start: StartPosition,
    keepalive_timeout: Duration,
    observer: Option<ErrorObserver>,
    shutdown: Shutdown,
}

impl<C, H> EventbusBuilder<C, H>
where
    C: Connector,
    H: EventHandler,
{
    /// Use a fresh scheduler from `policy`. Defaults to
    /// [`ReconnectPolicy::default`].
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.scheduler = Some(policy.scheduler());
        self
    }

    /// Use a custom scheduler.
    pub fn scheduler(mut self, scheduler: impl ReconnectScheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    /// Where to begin when the store holds no checkpoint.
    pub fn start_at(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }

    pub fn start_at_newest(self) -> Self {
        self.start_at(StartPosition::Newest)
    }

    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = timeout;
        self
    }

    /// Replace the default observer, which logs through `tracing`.
    pub fn error_observer(mut self, observer: impl FnMut(&EventbusError) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Share an existing stop signal.
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn build(self) -> Eventbus<C, H> {
        Eventbus {
            config: self.config,
            connector: self.connector,
            handler: self.handler,
            store: self.store,
            scheduler: self
                .scheduler
                .unwrap_or_else(|| ReconnectPolicy::default().scheduler()),
            start: self.start,
            keepalive_timeout: self.keepalive_timeout,
            observer: self.observer.unwrap_or_else(|| Box::new(log_error)),
            shutdown: self.shutdown,
            connection: None,
        }
    }
}
