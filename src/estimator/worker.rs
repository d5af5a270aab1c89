//! Background estimation with last-request-wins semantics.
//!
//! The worker owns one thread and one pending slot. A new request overwrites
//! whatever is waiting in the slot, and every request bumps a generation
//! counter. A result is only delivered if no newer request arrived while it
//! was being computed, so a caller never sees an estimate for a board it has
//! already moved past.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{EstimatorConfig, TerritoryEstimator, estimate_territory};
use crate::position::Position;

/// A finished estimate, tagged with the request generation it answers.
#[derive(Clone, Debug)]
pub struct EstimateOutcome {
    pub generation: u64,
    pub position: Position,
}

#[derive(Default)]
struct Slot {
    request: Option<(u64, Position)>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    wake: Condvar,
    generation: AtomicU64,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

pub struct EstimatorWorker {
    shared: Arc<Shared>,
    results: Receiver<EstimateOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl EstimatorWorker {
    pub fn spawn<E>(estimator: E, config: EstimatorConfig) -> Self
    where
        E: TerritoryEstimator + 'static,
    {
        let shared = Arc::new(Shared::default());
        let (tx, results) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || run(estimator, config, worker_shared, tx));
        Self {
            shared,
            results,
            handle: Some(handle),
        }
    }

    /// Ask for an estimate of `position`, replacing any request not yet
    /// started. Returns the generation the result will carry.
    pub fn request(&self, position: &Position) -> u64 {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut slot = self.shared.slot();
        if let Some((old, _)) = slot.request.replace((generation, position.clone())) {
            trace!(old, generation, "estimate request superseded");
        }
        self.shared.wake.notify_one();
        generation
    }

    /// Generation of the latest request.
    pub fn latest_generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// The newest delivered result that still answers the latest request.
    pub fn try_latest(&self) -> Option<EstimateOutcome> {
        let latest = self.latest_generation();
        self.results.try_iter().filter(|o| o.generation == latest).last()
    }

    /// Wait up to `timeout` for the result of the latest request.
    pub fn wait_latest(&self, timeout: Duration) -> Option<EstimateOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.results.recv_timeout(remaining) {
                Ok(outcome) if outcome.generation == self.latest_generation() => return Some(outcome),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl Drop for EstimatorWorker {
    fn drop(&mut self) {
        self.shared.slot().shutdown = true;
        self.shared.wake.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run<E: TerritoryEstimator>(
    estimator: E,
    config: EstimatorConfig,
    shared: Arc<Shared>,
    tx: Sender<EstimateOutcome>,
) {
    loop {
        let (generation, position) = {
            let mut slot = shared.slot();
            loop {
                if slot.shutdown {
                    debug!("estimator worker stopping");
                    return;
                }
                if let Some(request) = slot.request.take() {
                    break request;
                }
                slot = shared.wake.wait(slot).unwrap_or_else(PoisonError::into_inner);
            }
        };

        if !shared.is_current(generation) {
            trace!(generation, "skipping stale estimate request");
            continue;
        }
        let estimated = estimate_territory(&estimator, &position, &config);
        if !shared.is_current(generation) {
            debug!(generation, "dropping stale estimate");
            continue;
        }
        if tx
            .send(EstimateOutcome {
                generation,
                position: estimated,
            })
            .is_err()
        {
            return;
        }
    }
}
