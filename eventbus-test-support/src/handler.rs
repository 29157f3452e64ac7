//! Recording handlers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use eventbus::{EventHandler, HandlerError, StreamMessage};
use parking_lot::Mutex;

use crate::fault::FaultInjector;

/// One handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
    pub body: Vec<u8>,
    pub accepted: bool,
}

/// Handler that records every delivery and fails according to a
/// [`FaultInjector`]. Clones share the same record.
#[derive(Clone)]
pub struct RecordingHandler {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    deliveries: Vec<Delivery>,
    faults: FaultInjector,
    panic_at: Option<i64>,
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHandler {
    /// Accepts everything.
    pub fn new() -> Self {
        Self::with_faults(FaultInjector::none())
    }

    pub fn with_faults(faults: FaultInjector) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                deliveries: Vec::new(),
                faults,
                panic_at: None,
            })),
        }
    }

    /// Panic when a message with this offset arrives.
    pub fn panic_at(self, offset: i64) -> Self {
        self.inner.lock().panic_at = Some(offset);
        self
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.inner.lock().deliveries.clone()
    }

    pub fn accepted(&self) -> Vec<(i32, i64)> {
        self.positions(true)
    }

    pub fn rejected(&self) -> Vec<(i32, i64)> {
        self.positions(false)
    }

    /// Deliveries of a position that had already been delivered.
    pub fn redeliveries(&self) -> usize {
        let mut seen = HashSet::new();
        self.inner
            .lock()
            .deliveries
            .iter()
            .filter(|d| !seen.insert((d.partition, d.offset)))
            .count()
    }

    /// Accepted offsets strictly increase within every partition.
    pub fn is_ordered(&self) -> bool {
        let mut last: HashMap<i32, i64> = HashMap::new();
        self.inner
            .lock()
            .deliveries
            .iter()
            .filter(|d| d.accepted)
            .all(|d| match last.insert(d.partition, d.offset) {
                Some(prev) => prev < d.offset,
                None => true,
            })
    }

    fn positions(&self, accepted: bool) -> Vec<(i32, i64)> {
        self.inner
            .lock()
            .deliveries
            .iter()
            .filter(|d| d.accepted == accepted)
            .map(|d| (d.partition, d.offset))
            .collect()
    }
}

impl EventHandler for RecordingHandler {
    fn handle(&mut self, message: StreamMessage) -> Result<(), HandlerError> {
        let mut inner = self.inner.lock();
        if inner.panic_at == Some(message.offset) {
            drop(inner);
            panic!("handler panicked at offset {}", message.offset);
        }

        let accepted = !inner.faults.should_fail();
        let (partition, offset) = (message.partition, message.offset);
        inner.deliveries.push(Delivery {
            partition,
            offset,
            body: message.into_body(),
            accepted,
        });

        if accepted {
            Ok(())
        } else {
            Err(format!("injected failure at partition {partition} offset {offset}").into())
        }
    }
}
