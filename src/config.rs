/// Client configuration
///
/// One explicit context object handed to every component; nothing is read from
/// process-wide state after startup.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::book_builder::DEFAULT_MAX_LEVELS;
use crate::recovery::DEFAULT_BUFFER_CAPACITY;

pub const DEFAULT_DEPTH: usize = 100;
pub const DEFAULT_TARGET_ORDINAL: i64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// REST base, e.g. `http://localhost:9090`
    pub http_url: String,
    /// Delta stream endpoint
    pub ws_url: String,
    /// Ordinal at which the book is submitted for assertion
    pub target_ordinal: i64,
    /// Levels per side requested in snapshots and submitted for assertion
    pub depth: usize,
    /// Levels per side retained in the store
    pub store_cap: usize,
    /// Deltas held while a snapshot is outstanding
    pub buffer_capacity: usize,
    /// Events queued between the stream reader and the reconciler
    pub channel_capacity: usize,
    /// Silence on the delta stream that counts as a dead connection
    pub idle_timeout: Duration,
    /// Per-request timeout for REST calls
    pub request_timeout: Duration,
    /// Re-issue `POST /start` before every resync snapshot
    pub restart_feed_on_resync: bool,
    /// Ordinals between progress log lines
    pub progress_interval: i64,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Storage never holds fewer levels than the submitted depth.
    pub fn effective_store_cap(&self) -> usize {
        self.store_cap.max(self.depth)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            http_url: "http://localhost:9090".to_string(),
            ws_url: "ws://localhost:9091/delta".to_string(),
            target_ordinal: DEFAULT_TARGET_ORDINAL,
            depth: DEFAULT_DEPTH,
            store_cap: DEFAULT_MAX_LEVELS,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            channel_capacity: 65_536,
            idle_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            restart_feed_on_resync: false,
            progress_interval: 1000,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Exponential backoff between reconnect (and REST retry) attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// None retries forever
    pub max_retries: Option<u32>,
    /// Fraction of the delay added as random jitter, 0.0..=1.0
    pub jitter: f64,
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);

        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let extra = base.mul_f64(rand::thread_rng().gen_range(0.0..=jitter));
        (base + extra).min(self.max_backoff)
    }

    /// True once `attempts` failed attempts use up the budget.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_retries.is_some_and(|max| attempts > max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            max_retries: Some(10),
            jitter: 0.2,
        }
    }
}
