//! Shared daemon state: the DB handle owned exclusively by the main loop,
//! plus the single-owner circuit/generation/stats state the server loop
//! mutates between requests.

use std::sync::Mutex;
use std::time::Instant;

use pickme_core::{Config, Env};
use pickme_query::Picker;

use crate::circuit::{DbErrorCircuit, GenerationTracker, RollingWindow, RssSampler};

/// Everything one daemon process owns for its lifetime. Not `Clone`: the
/// accept loop holds a single `Arc<DaemonState>` and handlers borrow it.
pub struct DaemonState {
    pub picker: Picker,
    pub config: Config,
    pub env: Env,
    pub start_time: Instant,
    pub stats: Mutex<RollingWindow>,
    pub db_errors: DbErrorCircuit,
    pub generation: Mutex<GenerationTracker>,
    pub rss: Mutex<RssSampler>,
}

impl DaemonState {
    pub async fn new(picker: Picker, config: Config, env: Env) -> Self {
        let generation = picker.store().read_generation().await.unwrap_or(0);
        Self {
            picker,
            config,
            env,
            start_time: Instant::now(),
            stats: Mutex::new(RollingWindow::new()),
            db_errors: DbErrorCircuit::new(),
            generation: Mutex::new(GenerationTracker::new(generation)),
            rss: Mutex::new(RssSampler::new()),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.stats.lock().unwrap().hit_rate()
    }

    pub fn record_cache_outcome(&self, hit: bool) {
        self.stats.lock().unwrap().record(hit);
    }
}
