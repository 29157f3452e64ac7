//! End-to-end tests of the connection loop over scripted transports.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use eventbus::checkpoint::{CheckpointError, KeyValueCheckpointStore, MemoryHashCommands};
use eventbus::{
    CheckpointStore, ClientConfig, Eventbus, EventbusError, MemoryCheckpointStore,
    PartitionOffsets, ReconnectPolicy, Shutdown, StreamMessage,
};
use eventbus_test_support::fault::FaultInjector;
use eventbus_test_support::frames::{ack, hello, message};
use eventbus_test_support::{RecordingHandler, ScriptedConnector, Step};
use parking_lot::Mutex;
use serde_json::{json, Value};

fn config() -> ClientConfig {
    ClientConfig::new("ws://bus:8080/subscribe", "secret", "orders", "billing")
}

fn immediate() -> ReconnectPolicy {
    ReconnectPolicy::Constant(Duration::ZERO)
}

fn stop(shutdown: &Shutdown) -> Step {
    let shutdown = shutdown.clone();
    Step::run(move || shutdown.request())
}

fn state_of(handshake: &Value) -> Value {
    let encoded = handshake["state"].as_str().unwrap();
    serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap()
}

/// What the error observer saw: recoverability and message of each error.
type Observed = Arc<Mutex<Vec<(bool, String)>>>;

fn observer(seen: &Observed) -> impl FnMut(&EventbusError) + Send + 'static {
    let seen = seen.clone();
    move |err: &EventbusError| seen.lock().push((err.is_recoverable(), err.to_string()))
}

/// Store that fails the next read or write once.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryCheckpointStore,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
}

impl CheckpointStore for FlakyStore {
    fn get_offsets(&self) -> eventbus::checkpoint::Result<Option<PartitionOffsets>> {
        if self.fail_get.swap(false, Ordering::SeqCst) {
            return Err(CheckpointError::Backend("read timeout".into()));
        }
        self.inner.get_offsets()
    }

    fn set_offset(&self, partition: i32, offset: i64) -> eventbus::checkpoint::Result<()> {
        if self.fail_set.swap(false, Ordering::SeqCst) {
            return Err(CheckpointError::Backend("write timeout".into()));
        }
        self.inner.set_offset(partition, offset)
    }
}

#[test]
fn test_consumes_and_checkpoints() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new().session([
        Step::Frame(hello("abc")),
        Step::Frame(ack("abc", "orders")),
        Step::Frame(message(0, 5, json!("x"))),
        stop(&shutdown),
    ]);
    let log = connector.log();
    let store = Arc::new(MemoryCheckpointStore::new());
    let handler = RecordingHandler::new();

    let result = Eventbus::builder(config(), connector, store.clone(), handler.clone())
        .reconnect(immediate())
        .shutdown(shutdown)
        .build()
        .run_blocking();

    assert!(result.is_ok());
    assert_eq!(store.offset(0), Some(5));
    assert_eq!(handler.accepted(), vec![(0, 5)]);
    assert_eq!(handler.deliveries()[0].body, br#""x""#.to_vec());

    assert_eq!(log.endpoints(), vec!["ws://bus:8080/subscribe".to_string()]);
    let handshakes = log.handshakes();
    assert_eq!(handshakes.len(), 1);
    assert_eq!(handshakes[0]["id"], "abc");
    assert_eq!(handshakes[0]["authentication"], "secret");
    assert_eq!(handshakes[0]["stream"], "orders");
    assert_eq!(handshakes[0]["client"], "billing");
    assert_eq!(handshakes[0]["version"], "1");
    assert_eq!(state_of(&handshakes[0]), json!({"d": "-2"}));
    assert!(log.all_closed());
}

#[test]
fn test_rejected_message_is_redelivered_after_reconnect() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new()
        .session([
            hello("s1"),
            ack("s1", "orders"),
            message(0, 1, json!({"n": 1})),
            message(0, 2, json!({"n": 2})),
        ])
        .session([
            Step::Frame(hello("s2")),
            Step::Frame(ack("s2", "orders")),
            Step::Frame(message(0, 2, json!({"n": 2}))),
            stop(&shutdown),
        ]);
    let log = connector.log();
    let store = Arc::new(MemoryCheckpointStore::new());
    let handler = RecordingHandler::with_faults(FaultInjector::specific([2]));
    let seen = Observed::default();

    let result = Eventbus::builder(config(), connector, store.clone(), handler.clone())
        .reconnect(immediate())
        .error_observer(observer(&seen))
        .shutdown(shutdown)
        .build()
        .run_blocking();

    assert!(result.is_ok());
    assert_eq!(handler.accepted(), vec![(0, 1), (0, 2)]);
    assert_eq!(handler.rejected(), vec![(0, 2)]);
    assert_eq!(handler.redeliveries(), 1);
    assert!(handler.is_ordered());
    assert_eq!(store.offset(0), Some(2));

    let handshakes = log.handshakes();
    assert_eq!(handshakes.len(), 2);
    assert_eq!(state_of(&handshakes[0]), json!({"d": "-2"}));
    assert_eq!(handshakes[1]["id"], "s2");
    assert_eq!(state_of(&handshakes[1]), json!({"p": {"0": "1"}}));

    let seen = seen.lock();
    assert!(seen[0].1.starts_with("handler rejected partition 0 offset 2"));
    assert!(seen.iter().all(|(recoverable, _)| *recoverable));
    assert!(log.all_closed());
}

#[test]
fn test_resumes_from_seeded_store() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new().session([Step::Frame(hello("s")), stop(&shutdown)]);
    let log = connector.log();
    let seed: PartitionOffsets = [(0, 100), (3, 7)].into_iter().collect();

    Eventbus::builder(
        config(),
        connector,
        MemoryCheckpointStore::with_offsets(&seed),
        RecordingHandler::new(),
    )
    .reconnect(immediate())
    .start_at_newest()
    .shutdown(shutdown)
    .build()
    .run_blocking()
    .unwrap();

    assert_eq!(
        state_of(&log.handshakes()[0]),
        json!({"p": {"0": "100", "3": "7"}})
    );
}

#[test]
fn test_start_at_newest_without_checkpoint() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new().session([Step::Frame(hello("s")), stop(&shutdown)]);
    let log = connector.log();

    Eventbus::builder(config(), connector, MemoryCheckpointStore::new(), RecordingHandler::new())
        .reconnect(immediate())
        .start_at_newest()
        .shutdown(shutdown)
        .build()
        .run_blocking()
        .unwrap();

    assert_eq!(state_of(&log.handshakes()[0]), json!({"d": "-1"}));
}

#[test]
fn test_reconnects_exhausted() {
    let connector = ScriptedConnector::new()
        .session([hello("a")])
        .session([Step::Fail(ErrorKind::ConnectionReset)]);
    let log = connector.log();
    let seen = Observed::default();

    let err = Eventbus::builder(config(), connector, MemoryCheckpointStore::new(), RecordingHandler::new())
        .reconnect(ReconnectPolicy::Limited {
            attempts: 2,
            delay: Duration::ZERO,
        })
        .error_observer(observer(&seen))
        .build()
        .run_blocking()
        .unwrap_err();

    assert!(matches!(err, EventbusError::ReconnectsExhausted));
    assert_eq!(log.attempts(), 2);
    assert_eq!(log.connections(), 2);
    assert!(log.all_closed());

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (true, "receive failed: script exhausted".to_string()));
    assert_eq!(seen[1], (true, "receive failed: scripted failure".to_string()));
}

#[test]
fn test_limited_exponential_zero_base_allows_one_attempt() {
    let connector = ScriptedConnector::new().session([hello("a")]);
    let log = connector.log();

    let err = Eventbus::builder(config(), connector, MemoryCheckpointStore::new(), RecordingHandler::new())
        .reconnect(ReconnectPolicy::LimitedExponential {
            base: Duration::ZERO,
            max: Duration::from_millis(10),
        })
        .build()
        .run_blocking()
        .unwrap_err();

    assert!(matches!(err, EventbusError::ReconnectsExhausted));
    assert_eq!(log.attempts(), 1);
}

#[test]
fn test_connect_failure_is_fatal() {
    let connector = ScriptedConnector::new().refuse(ErrorKind::ConnectionRefused);
    let log = connector.log();

    let err = Eventbus::builder(config(), connector, MemoryCheckpointStore::new(), RecordingHandler::new())
        .reconnect(immediate())
        .build()
        .run_blocking()
        .unwrap_err();

    match err {
        EventbusError::Connect { endpoint, source } => {
            assert_eq!(endpoint, "ws://bus:8080/subscribe");
            assert_eq!(source.kind(), ErrorKind::ConnectionRefused);
        }
        other => panic!("expected connect error, got {other:?}"),
    }
    assert_eq!(log.attempts(), 1);
    assert_eq!(log.connections(), 0);
}

#[test]
fn test_malformed_frame_restarts_handshake() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new()
        .session([hello("a"), b"{not json".to_vec()])
        .session([
            Step::Frame(hello("b")),
            Step::Frame(ack("b", "orders")),
            Step::Frame(message(1, 40, json!(null))),
            stop(&shutdown),
        ]);
    let log = connector.log();
    let store = Arc::new(MemoryCheckpointStore::new());
    let seen = Observed::default();

    Eventbus::builder(config(), connector, store.clone(), RecordingHandler::new())
        .reconnect(immediate())
        .error_observer(observer(&seen))
        .shutdown(shutdown)
        .build()
        .run_blocking()
        .unwrap();

    assert_eq!(log.connections(), 2);
    assert_eq!(log.sent(0).len(), 1);
    assert_eq!(log.handshakes()[1]["id"], "b");
    assert_eq!(store.offset(1), Some(40));
    assert!(seen.lock()[0].1.starts_with("malformed frame while acknowledging"));
}

#[test]
fn test_checkpoint_failures_reconnect() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new()
        .session([hello("a")])
        .session([hello("b"), ack("b", "orders"), message(0, 7, json!(7))])
        .session([
            Step::Frame(hello("c")),
            Step::Frame(ack("c", "orders")),
            Step::Frame(message(0, 7, json!(7))),
            stop(&shutdown),
        ]);
    let log = connector.log();
    let store = Arc::new(FlakyStore::default());
    store.fail_get.store(true, Ordering::SeqCst);
    store.fail_set.store(true, Ordering::SeqCst);
    let handler = RecordingHandler::new();
    let seen = Observed::default();

    Eventbus::builder(config(), connector, store.clone(), handler.clone())
        .reconnect(immediate())
        .error_observer(observer(&seen))
        .shutdown(shutdown)
        .build()
        .run_blocking()
        .unwrap();

    // Read failure: no handshake on the first socket.
    assert!(log.sent(0).is_empty());
    assert_eq!(log.connections(), 3);
    // Write failure: delivered twice, checkpointed once.
    assert_eq!(handler.accepted(), vec![(0, 7), (0, 7)]);
    assert_eq!(store.inner.offset(0), Some(7));
    assert_eq!(state_of(&log.handshakes()[1]), json!({"d": "-2"}));

    let seen = seen.lock();
    assert_eq!(
        seen[0],
        (true, "checkpoint error: backend error: read timeout".to_string())
    );
    assert_eq!(
        seen[1],
        (true, "checkpoint error: backend error: write timeout".to_string())
    );
}

#[test]
fn test_key_value_store_end_to_end() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new().session([
        Step::Frame(hello("a")),
        Step::Frame(ack("a", "orders")),
        Step::Frame(message(0, 11, json!("a"))),
        Step::Frame(message(2, 4, json!("b"))),
        Step::Frame(message(0, 12, json!("c"))),
        stop(&shutdown),
    ]);
    let store = Arc::new(KeyValueCheckpointStore::new("billing", MemoryHashCommands::new()));

    Eventbus::builder(config(), connector, store.clone(), RecordingHandler::new())
        .reconnect(immediate())
        .shutdown(shutdown)
        .build()
        .run_blocking()
        .unwrap();

    let commands = store.commands();
    assert_eq!(commands.field("billing:offsets", "0").as_deref(), Some("12"));
    assert_eq!(commands.field("billing:offsets", "2").as_deref(), Some("4"));
    let snapshot = store.get_offsets().unwrap().unwrap();
    assert_eq!(snapshot.get(0), Some(12));
    assert_eq!(snapshot.get(2), Some(4));
}

#[test]
fn test_keepalive_timeout_is_armed() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new().session([stop(&shutdown)]);
    let log = connector.log();

    Eventbus::builder(config(), connector, MemoryCheckpointStore::new(), RecordingHandler::new())
        .reconnect(immediate())
        .keepalive_timeout(Duration::from_secs(5))
        .shutdown(shutdown)
        .build()
        .run_blocking()
        .unwrap();

    assert_eq!(log.record(0).unwrap().keepalive, Some(Duration::from_secs(5)));
}

#[test]
fn test_default_keepalive_timeout() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new().session([stop(&shutdown)]);
    let log = connector.log();

    Eventbus::builder(config(), connector, MemoryCheckpointStore::new(), RecordingHandler::new())
        .reconnect(immediate())
        .shutdown(shutdown)
        .build()
        .run_blocking()
        .unwrap();

    assert_eq!(
        log.record(0).unwrap().keepalive,
        Some(eventbus::DEFAULT_KEEPALIVE_TIMEOUT)
    );
}

#[test]
fn test_shutdown_interrupts_backoff() {
    let connector = ScriptedConnector::new().session([hello("never")]);
    let log = connector.log();

    let handle = Eventbus::builder(config(), connector, MemoryCheckpointStore::new(), RecordingHandler::new())
        .reconnect(ReconnectPolicy::Constant(Duration::from_secs(3600)))
        .build()
        .run()
        .unwrap();

    handle.shutdown();
    handle.wait().unwrap();
    assert_eq!(log.attempts(), 0);
}

#[test]
fn test_shutdown_through_shared_handle() {
    let connector = ScriptedConnector::new().session([hello("never")]);

    let handle = Eventbus::builder(config(), connector, MemoryCheckpointStore::new(), RecordingHandler::new())
        .reconnect(ReconnectPolicy::Constant(Duration::from_secs(3600)))
        .build()
        .run()
        .unwrap();
    assert!(!handle.is_finished());

    handle.shutdown_handle().request();
    for _ in 0..500 {
        if handle.is_finished() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(handle.is_finished());
    handle.wait().unwrap();
}

#[test]
fn test_quiet_poll_observes_shutdown() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new().session([
        Step::Frame(hello("a")),
        Step::Frame(ack("a", "orders")),
        stop(&shutdown),
        Step::Idle,
        Step::Frame(message(0, 1, json!(1))),
    ]);
    let log = connector.log();
    let handler = RecordingHandler::new();
    let seen = Observed::default();

    Eventbus::builder(config(), connector, MemoryCheckpointStore::new(), handler.clone())
        .reconnect(immediate())
        .error_observer(observer(&seen))
        .shutdown(shutdown)
        .build()
        .run_blocking()
        .unwrap();

    assert!(handler.deliveries().is_empty());
    assert!(seen.lock().is_empty());
    assert_eq!(log.connections(), 1);
    assert!(log.all_closed());
}

#[test]
fn test_handler_panic_in_run_blocking_is_internal_error() {
    let connector = ScriptedConnector::new().session([
        hello("a"),
        ack("a", "orders"),
        message(0, 5, json!(1)),
    ]);
    let log = connector.log();

    let result = Eventbus::builder(
        config(),
        connector,
        MemoryCheckpointStore::new(),
        RecordingHandler::new().panic_at(5),
    )
    .reconnect(immediate())
    .build()
    .run_blocking();

    match result {
        Err(EventbusError::Internal(msg)) => assert!(msg.contains("offset 5")),
        other => panic!("expected internal error, got {other:?}"),
    }
    assert_eq!(log.connections(), 1);
    assert!(log.all_closed());
}

#[test]
fn test_observer_panic_is_internal_error() {
    let connector = ScriptedConnector::new().session([
        Step::Frame(hello("a")),
        Step::Fail(ErrorKind::ConnectionReset),
    ]);
    let log = connector.log();

    let result = Eventbus::builder(config(), connector, MemoryCheckpointStore::new(), RecordingHandler::new())
        .reconnect(immediate())
        .error_observer(|err: &EventbusError| panic!("observer gave up on {err}"))
        .build()
        .run_blocking();

    match result {
        Err(EventbusError::Internal(msg)) => assert!(msg.starts_with("observer gave up")),
        other => panic!("expected internal error, got {other:?}"),
    }
    assert!(log.all_closed());
}

#[test]
fn test_handler_panic_is_internal_error() {
    let connector = ScriptedConnector::new().session([
        hello("a"),
        ack("a", "orders"),
        message(0, 4, json!(1)),
        message(0, 5, json!(2)),
    ]);
    let log = connector.log();
    let store = Arc::new(MemoryCheckpointStore::new());

    let handle = Eventbus::builder(config(), connector, store.clone(), RecordingHandler::new().panic_at(5))
        .reconnect(immediate())
        .build()
        .run()
        .unwrap();

    match handle.wait() {
        Err(EventbusError::Internal(msg)) => assert!(msg.contains("offset 5")),
        other => panic!("expected internal error, got {other:?}"),
    }
    assert_eq!(store.offset(0), Some(4));
    assert!(log.all_closed());
}

#[test]
fn test_closure_handler_on_worker_thread() {
    let shutdown = Shutdown::new();
    let connector = ScriptedConnector::new().session([
        Step::Frame(hello("a")),
        Step::Frame(ack("a", "orders")),
        Step::Frame(message(0, 1, json!({"sku": "A-1", "qty": 2}))),
        stop(&shutdown),
    ]);
    let skus = Arc::new(Mutex::new(Vec::new()));
    let sink = skus.clone();

    let handle = Eventbus::builder(
        config(),
        connector,
        MemoryCheckpointStore::new(),
        move |m: StreamMessage| -> Result<(), eventbus::HandlerError> {
            let body: Value = m.decode_body()?;
            sink.lock().push(body["sku"].as_str().unwrap_or_default().to_string());
            Ok(())
        },
    )
    .reconnect(immediate())
    .shutdown(shutdown)
    .build()
    .run()
    .unwrap();

    handle.wait().unwrap();
    assert_eq!(*skus.lock(), vec!["A-1".to_string()]);
}
