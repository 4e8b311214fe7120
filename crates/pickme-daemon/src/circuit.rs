//! In-process state that governs when the daemon stops degrading quietly
//! and shuts itself down: the hit-rate ring, the consecutive-DB-error
//! counter, and RSS sampling. All three are single-owner state mutated
//! only from the main loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Fixed-capacity ring of the last `CAPACITY` hit/miss outcomes, with an
/// O(1)-maintained tally of hits. Never shift the buffer; overwriting a
/// slot that held a hit decrements the tally before the new value is
/// written.
pub struct RollingWindow {
    capacity: usize,
    slots: Vec<bool>,
    write_index: usize,
    filled: usize,
    hits: usize,
}

impl RollingWindow {
    pub const CAPACITY: usize = 100;

    pub fn new() -> Self {
        Self {
            capacity: Self::CAPACITY,
            slots: vec![false; Self::CAPACITY],
            write_index: 0,
            filled: 0,
            hits: 0,
        }
    }

    pub fn record(&mut self, hit: bool) {
        if self.filled == self.capacity && self.slots[self.write_index] {
            self.hits -= 1;
        } else if self.filled < self.capacity {
            self.filled += 1;
        }
        self.slots[self.write_index] = hit;
        if hit {
            self.hits += 1;
        }
        self.write_index = (self.write_index + 1) % self.capacity;
    }

    pub fn window_hits(&self) -> usize {
        self.hits
    }

    pub fn window_count(&self) -> usize {
        self.filled
    }

    /// `window_hits / window_count`, or `0.0` when the window is empty.
    pub fn hit_rate(&self) -> f64 {
        if self.filled == 0 {
            0.0
        } else {
            self.hits as f64 / self.filled as f64
        }
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// What the server should do after observing a failure or a resource
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitAction {
    Continue,
    WarnHighRss,
    Shutdown,
}

/// Consecutive-DB-error counter: a second failure in a row without an
/// intervening success trips the breaker.
#[derive(Debug, Default)]
pub struct DbErrorCircuit {
    consecutive: AtomicU64,
}

impl DbErrorCircuit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a DB failure; returns `Shutdown` once two have occurred back
    /// to back.
    pub fn record_failure(&self) -> CircuitAction {
        let count = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= 2 {
            CircuitAction::Shutdown
        } else {
            CircuitAction::Continue
        }
    }

    pub fn record_success(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive.load(Ordering::SeqCst)
    }
}

/// > 256 MiB logs a warning once; > 512 MiB shuts the process down.
pub const RSS_WARN_BYTES: u64 = 256 * 1024 * 1024;
pub const RSS_SHUTDOWN_BYTES: u64 = 512 * 1024 * 1024;
pub const RSS_CHECK_INTERVAL_MS: u64 = 30_000;

/// Samples this process's own RSS via `sysinfo`, no more often than every
/// `rss_check_interval_ms`.
pub struct RssSampler {
    system: System,
    pid: Pid,
    warned: bool,
    last_check: Option<Instant>,
    last_rss: u64,
}

impl RssSampler {
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        Self {
            system,
            pid,
            warned: false,
            last_check: None,
            last_rss: 0,
        }
    }

    /// Current RSS in bytes, or `0` if the process couldn't be read.
    /// Always samples, ignoring the check interval.
    pub fn sample(&mut self) -> u64 {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.last_rss = self
            .system
            .process(self.pid)
            .map(|p| p.memory())
            .unwrap_or(0);
        self.last_rss
    }

    /// Sample RSS and decide what the server should do, but only actually
    /// samples once per `RSS_CHECK_INTERVAL_MS`; calls inside that window
    /// reuse the last reading and report `Continue`.
    pub fn check(&mut self) -> (u64, CircuitAction) {
        let due = match self.last_check {
            Some(at) => at.elapsed() >= Duration::from_millis(RSS_CHECK_INTERVAL_MS),
            None => true,
        };
        if !due {
            return (self.last_rss, CircuitAction::Continue);
        }
        self.last_check = Some(Instant::now());

        let rss = self.sample();
        if rss > RSS_SHUTDOWN_BYTES {
            (rss, CircuitAction::Shutdown)
        } else if rss > RSS_WARN_BYTES {
            if self.warned {
                (rss, CircuitAction::Continue)
            } else {
                self.warned = true;
                (rss, CircuitAction::WarnHighRss)
            }
        } else {
            self.warned = false;
            (rss, CircuitAction::Continue)
        }
    }
}

impl Default for RssSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the last-observed `PRAGMA user_version` so the server can detect
/// external invalidation between requests.
pub struct GenerationTracker {
    current: i64,
}

impl GenerationTracker {
    pub fn new(initial: i64) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> i64 {
        self.current
    }

    /// Update the tracked value if it changed; returns whether it did.
    pub fn observe(&mut self, persisted: i64) -> bool {
        if persisted != self.current {
            self.current = persisted;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_window_empty_rate_is_zero() {
        let w = RollingWindow::new();
        assert_eq!(w.hit_rate(), 0.0);
    }

    #[test]
    fn test_rolling_window_tracks_hits() {
        let mut w = RollingWindow::new();
        w.record(true);
        w.record(false);
        w.record(true);
        assert_eq!(w.window_hits(), 2);
        assert_eq!(w.window_count(), 3);
        assert!((w.hit_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_window_eviction_decrements_tally() {
        let mut w = RollingWindow::new();
        for _ in 0..RollingWindow::CAPACITY {
            w.record(true);
        }
        assert_eq!(w.window_hits(), RollingWindow::CAPACITY);
        w.record(false);
        assert_eq!(w.window_count(), RollingWindow::CAPACITY);
        assert_eq!(w.window_hits(), RollingWindow::CAPACITY - 1);
    }

    #[test]
    fn test_db_error_circuit_trips_on_second_consecutive_failure() {
        let circuit = DbErrorCircuit::new();
        assert_eq!(circuit.record_failure(), CircuitAction::Continue);
        assert_eq!(circuit.record_failure(), CircuitAction::Shutdown);
    }

    #[test]
    fn test_db_error_circuit_resets_on_success() {
        let circuit = DbErrorCircuit::new();
        assert_eq!(circuit.record_failure(), CircuitAction::Continue);
        circuit.record_success();
        assert_eq!(circuit.record_failure(), CircuitAction::Continue);
    }

    #[test]
    fn test_rss_sampler_check_throttles_between_calls() {
        let mut sampler = RssSampler::new();
        let (first, _) = sampler.check();
        let (second, action) = sampler.check();
        assert_eq!(first, second);
        assert_eq!(action, CircuitAction::Continue);
    }

    #[test]
    fn test_generation_tracker_observes_change() {
        let mut tracker = GenerationTracker::new(0);
        assert!(!tracker.observe(0));
        assert!(tracker.observe(1));
        assert_eq!(tracker.current(), 1);
    }
}
