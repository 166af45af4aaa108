//! Level-triggered shutdown signal observed at every suspension point.
//!
//! Models §5's "cooperative cancellation across threads" without reaching for
//! any runtime-specific cancellation primitive: every worker loop polls
//! [`Shutdown::is_set`] at each blocking/sleeping point and returns promptly
//! once it is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `dur`, but wake early (and return `true`) if shutdown is set.
    pub fn sleep_or_shutdown(&self, dur: Duration) -> bool {
        const POLL: Duration = Duration::from_millis(100);
        let mut remaining = dur;
        while remaining > Duration::ZERO {
            if self.is_set() {
                return true;
            }
            let step = remaining.min(POLL);
            std::thread::sleep(step);
            remaining -= step;
        }
        self.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset() {
        let s = Shutdown::new();
        assert!(!s.is_set());
    }

    #[test]
    fn set_is_observed_across_clones() {
        let s = Shutdown::new();
        let clone = s.clone();
        clone.set();
        assert!(s.is_set());
    }

    #[test]
    fn sleep_or_shutdown_returns_immediately_when_already_set() {
        let s = Shutdown::new();
        s.set();
        let start = std::time::Instant::now();
        assert!(s.sleep_or_shutdown(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
