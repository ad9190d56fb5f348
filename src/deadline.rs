use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wall-clock limits for one decision plus a shared cancellation flag.
///
/// Once one depth has completed, the soft instant ends the search; before that only
/// the hard instant (or the flag) abandons the depth in progress.
#[derive(Debug, Clone)]
pub struct SearchBudget {
    started: Instant,
    soft: Instant,
    hard: Instant,
    cancel: Arc<AtomicBool>,
}

/// Returned up the recursion when a search has to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

impl SearchBudget {
    pub fn new(soft: Duration, hard: Duration) -> Self {
        Self::starting_at(Instant::now(), soft, hard, Arc::new(AtomicBool::new(false)))
    }

    pub fn starting_at(started: Instant, soft: Duration, hard: Duration, cancel: Arc<AtomicBool>) -> Self {
        let hard = started + hard;
        Self {
            started,
            soft: (started + soft).min(hard),
            hard,
            cancel,
        }
    }

    /// Effectively unlimited, for offline use and tests
    pub fn unbounded() -> Self {
        let day = Duration::from_secs(24 * 60 * 60);
        Self::new(day, day)
    }

    pub fn soft_deadline(&self) -> Instant {
        self.soft
    }

    pub fn soft_expired(&self) -> bool {
        self.should_abort() || Instant::now() >= self.soft
    }

    pub fn should_abort(&self) -> bool {
        self.cancel.load(Ordering::Relaxed) || Instant::now() >= self.hard
    }

    /// Whether work projected to take `cost` still finishes before the soft instant
    pub fn fits_before_soft(&self, cost: Duration) -> bool {
        Instant::now() + cost < self.soft
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}
