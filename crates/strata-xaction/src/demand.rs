//! On-demand xaction state
//!
//! An on-demand xaction stays alive between requests. Each in-flight
//! request bumps `pending`; the housekeeper aborts the xaction once
//! `pending == 0` for longer than the idle timeout. Renewing an existing
//! on-demand xaction bumps and releases the counter to refresh its idle
//! clock (defeating a concurrent idle-sweep).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

pub struct DemandState {
    pending: AtomicI64,
    last_active: Mutex<Instant>,
    idle_timeout: Duration,
}

impl DemandState {
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            pending: AtomicI64::new(0),
            last_active: Mutex::new(Instant::now()),
            idle_timeout,
        }
    }

    pub fn inc_pending(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        *self.last_active.lock() = Instant::now();
    }

    pub fn dec_pending(&self) {
        let prev = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "pending underflow");
        *self.last_active.lock() = Instant::now();
    }

    #[must_use]
    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_active.lock().elapsed()
    }

    /// Ready to be reaped by the housekeeper.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0 && self.idle_for() >= self.idle_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_defeats_idle() {
        let demand = DemandState::new(Duration::ZERO);
        demand.inc_pending();
        assert!(!demand.is_idle());
        demand.dec_pending();
        assert!(demand.is_idle());
    }

    #[test]
    fn test_bump_refreshes_idle_clock() {
        let demand = DemandState::new(Duration::from_secs(60));
        demand.inc_pending();
        demand.dec_pending();
        assert!(demand.idle_for() < Duration::from_secs(1));
        assert!(!demand.is_idle());
    }
}
