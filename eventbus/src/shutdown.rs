//! Caller-initiated shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Cloneable stop signal for a running client.
///
/// The connection loop checks it before every blocking step and wakes from a
/// backoff sleep as soon as it is raised. A pending read is noticed once the
/// transport's poll interval ends.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    requested: Mutex<bool>,
    wake: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        let mut requested = self.inner.requested.lock();
        *requested = true;
        self.inner.wake.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        *self.inner.requested.lock()
    }

    /// Sleep for `duration` or until shutdown is requested. Returns `true`
    /// if shutdown was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut requested = self.inner.requested.lock();
        match Instant::now().checked_add(duration) {
            Some(deadline) => {
                while !*requested {
                    if self.inner.wake.wait_until(&mut requested, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while !*requested {
                    self.inner.wake.wait(&mut requested);
                }
            }
        }
        *requested
    }
}
