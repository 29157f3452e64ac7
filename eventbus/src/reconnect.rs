//! Reconnection schedulers.
//!
//! A scheduler maps the number of connection attempts made so far to the
//! delay before the next one. Every call counts as one attempt; the counter
//! lives as long as the scheduler and is never reset.
//!
//! | Scheduler | Delay | Exhausts |
//! |---|---|---|
//! | [`ConstantScheduler`] | fixed | never |
//! | [`ExponentialScheduler`] | `base * 2^(n-1)`, clamped to `max` | never |
//! | [`LimitedScheduler`] | fixed | after `attempts` calls |
//! | [`LimitedExponentialScheduler`] | `base, 2*base, ...` while `<= max` | after the sequence ends |

use std::time::Duration;

/// Outcome of a single [`ReconnectScheduler::next_backoff`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait for the delay, then connect.
    Continue(Duration),
    /// The scheduler has run out of attempts. The delay is still reported
    /// but the client must stop reconnecting.
    Exhausted(Duration),
}

impl Backoff {
    pub fn delay(&self) -> Duration {
        match self {
            Self::Continue(d) | Self::Exhausted(d) => *d,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
}

/// Decides how long to wait before each connection attempt.
pub trait ReconnectScheduler: Send {
    fn next_backoff(&mut self) -> Backoff;
}

impl<S: ReconnectScheduler + ?Sized> ReconnectScheduler for Box<S> {
    fn next_backoff(&mut self) -> Backoff {
        (**self).next_backoff()
    }
}

/// Reconnection policy; each client gets its own scheduler from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Constant(Duration),
    Exponential { base: Duration, max: Duration },
    Limited { attempts: u32, delay: Duration },
    LimitedExponential { base: Duration, max: Duration },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(32),
        }
    }
}

impl ReconnectPolicy {
    /// Create a fresh scheduler with its own attempt counter.
    pub fn scheduler(&self) -> Box<dyn ReconnectScheduler> {
        match *self {
            Self::Constant(delay) => Box::new(ConstantScheduler::new(delay)),
            Self::Exponential { base, max } => Box::new(ExponentialScheduler::new(base, max)),
            Self::Limited { attempts, delay } => Box::new(LimitedScheduler::new(attempts, delay)),
            Self::LimitedExponential { base, max } => {
                Box::new(LimitedExponentialScheduler::new(base, max))
            }
        }
    }
}

/// Reconnects every `delay`, forever.
#[derive(Debug, Clone)]
pub struct ConstantScheduler {
    delay: Duration,
}

impl ConstantScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ReconnectScheduler for ConstantScheduler {
    fn next_backoff(&mut self) -> Backoff {
        Backoff::Continue(self.delay)
    }
}

/// Doubles the delay on every attempt up to `max`, forever.
#[derive(Debug, Clone)]
pub struct ExponentialScheduler {
    attempts: u32,
    base: Duration,
    max: Duration,
}

impl ExponentialScheduler {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            attempts: 0,
            base,
            max,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl ReconnectScheduler for ExponentialScheduler {
    fn next_backoff(&mut self) -> Backoff {
        self.attempts = self.attempts.saturating_add(1);
        // Overflow of 2^(n-1) * base means we are far past max.
        let delay = 2u32
            .checked_pow(self.attempts - 1)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |d| d.min(self.max));
        Backoff::Continue(delay)
    }
}

/// Fixed delay for `attempts` calls, exhausted afterwards.
#[derive(Debug, Clone)]
pub struct LimitedScheduler {
    calls: u32,
    attempts: u32,
    delay: Duration,
}

impl LimitedScheduler {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            calls: 0,
            attempts,
            delay,
        }
    }
}

impl ReconnectScheduler for LimitedScheduler {
    fn next_backoff(&mut self) -> Backoff {
        self.calls = self.calls.saturating_add(1);
        if self.calls <= self.attempts {
            Backoff::Continue(self.delay)
        } else {
            Backoff::Exhausted(self.delay)
        }
    }
}

/// Walks a precomputed exponential sequence, exhausted once it runs out.
#[derive(Debug, Clone)]
pub struct LimitedExponentialScheduler {
    attempts: usize,
    backoffs: Vec<Duration>,
}

impl LimitedExponentialScheduler {
    pub fn new(base: Duration, max: Duration) -> Self {
        let mut backoffs = Vec::new();
        let mut next = Some(base);
        while let Some(delay) = next.filter(|d| *d <= max) {
            backoffs.push(delay);
            // A zero base never grows; one entry is enough.
            next = delay.checked_mul(2).filter(|d| *d != delay);
        }
        if backoffs.is_empty() {
            backoffs.push(max);
        }
        Self {
            attempts: 0,
            backoffs,
        }
    }

    pub fn backoffs(&self) -> &[Duration] {
        &self.backoffs
    }
}

impl ReconnectScheduler for LimitedExponentialScheduler {
    fn next_backoff(&mut self) -> Backoff {
        self.attempts = self.attempts.saturating_add(1);
        match self.backoffs.get(self.attempts - 1) {
            Some(delay) => Backoff::Continue(*delay),
            None => Backoff::Exhausted(self.backoffs[self.backoffs.len() - 1]),
        }
    }
}
