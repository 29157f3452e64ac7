//! Failure injection plans.
//!
//! Same shape as packet loss generators: a plan decides, per attempt,
//! whether the attempt fails.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Which attempts fail. Attempts are numbered from 1.
#[derive(Debug, Clone)]
pub enum FaultPlan {
    /// Never fail
    None,
    /// Fail every Nth attempt
    Periodic { every_n: usize },
    /// Fail the first N attempts, then succeed
    FirstN(usize),
    /// Fail specific attempts
    Specific(HashSet<usize>),
    /// Fail randomly with the given probability (0.0-1.0)
    Random { probability: f64 },
}

/// Applies a [`FaultPlan`] to a sequence of attempts.
///
/// # Example
///
/// ```
/// use eventbus_test_support::fault::FaultInjector;
///
/// let mut faults = FaultInjector::first_n(2);
/// assert!(faults.should_fail());
/// assert!(faults.should_fail());
/// assert!(!faults.should_fail());
/// ```
#[derive(Debug)]
pub struct FaultInjector {
    plan: FaultPlan,
    attempts: usize,
    injected: usize,
    rng: StdRng,
}

impl FaultInjector {
    pub fn new(plan: FaultPlan) -> Self {
        Self {
            plan,
            attempts: 0,
            injected: 0,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn none() -> Self {
        Self::new(FaultPlan::None)
    }

    pub fn periodic(every_n: usize) -> Self {
        Self::new(FaultPlan::Periodic { every_n })
    }

    pub fn first_n(n: usize) -> Self {
        Self::new(FaultPlan::FirstN(n))
    }

    pub fn specific(attempts: impl IntoIterator<Item = usize>) -> Self {
        Self::new(FaultPlan::Specific(attempts.into_iter().collect()))
    }

    pub fn random(probability: f64) -> Self {
        Self::new(FaultPlan::Random {
            probability: probability.clamp(0.0, 1.0),
        })
    }

    /// Register one attempt and decide whether it fails.
    pub fn should_fail(&mut self) -> bool {
        self.attempts += 1;
        let fail = match &self.plan {
            FaultPlan::None => false,
            FaultPlan::Periodic { every_n } => *every_n > 0 && self.attempts % every_n == 0,
            FaultPlan::FirstN(n) => self.attempts <= *n,
            FaultPlan::Specific(attempts) => attempts.contains(&self.attempts),
            FaultPlan::Random { probability } => self.rng.gen::<f64>() < *probability,
        };
        if fail {
            self.injected += 1;
        }
        fail
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn injected(&self) -> usize {
        self.injected
    }
}
