//! Operational counters.
//!
//! Lock-free counters for the hot paths plus a derived insertion rate the
//! supervisor refreshes on its tick. Relaxed ordering throughout: the
//! numbers feed monitoring text, not control flow.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

#[derive(Debug)]
pub struct TreeStats {
    pub insert_success: AtomicI64,
    pub insert_failed: AtomicI64,
    pub get_success: AtomicI64,
    pub get_failed: AtomicI64,
    pub cuts: AtomicI64,
    pub lists: AtomicI64,
    insert_rate: AtomicI64,
    rate_window: Mutex<RateWindow>,
}

#[derive(Debug)]
struct RateWindow {
    last_check: Instant,
    last_insert_count: i64,
}

impl TreeStats {
    pub fn new() -> TreeStats {
        TreeStats {
            insert_success: AtomicI64::new(0),
            insert_failed: AtomicI64::new(0),
            get_success: AtomicI64::new(0),
            get_failed: AtomicI64::new(0),
            cuts: AtomicI64::new(0),
            lists: AtomicI64::new(0),
            insert_rate: AtomicI64::new(0),
            rate_window: Mutex::new(RateWindow {
                last_check: Instant::now(),
                last_insert_count: 0,
            }),
        }
    }

    /// Recomputes inserts/sec since the previous refresh.
    pub fn refresh_insert_rate(&self) {
        let inserts = self.insert_success.load(Ordering::Relaxed);
        let mut window = self.rate_window.lock();
        let elapsed = window.last_check.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let rate = (inserts - window.last_insert_count) as f64 / elapsed;
            self.insert_rate.store(rate as i64, Ordering::Relaxed);
        }
        window.last_check = Instant::now();
        window.last_insert_count = inserts;
    }

    pub fn insert_rate(&self) -> i64 {
        self.insert_rate.load(Ordering::Relaxed)
    }

    pub fn render(&self) -> String {
        format!(
            "inserts: {} ok / {} failed ({}/s)\ngets: {} ok / {} failed\ncut-edge cycles: {}\nlist calls: {}",
            self.insert_success.load(Ordering::Relaxed),
            self.insert_failed.load(Ordering::Relaxed),
            self.insert_rate(),
            self.get_success.load(Ordering::Relaxed),
            self.get_failed.load(Ordering::Relaxed),
            self.cuts.load(Ordering::Relaxed),
            self.lists.load(Ordering::Relaxed),
        )
    }
}

impl Default for TreeStats {
    fn default() -> Self {
        TreeStats::new()
    }
}
