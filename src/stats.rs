/// Feed statistics tracking
///
/// Counts frames, applied/dropped deltas, gaps, resyncs and reconnects, and keeps a
/// rolling window of per-delta apply latency.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::info;

const WINDOW_SIZE: usize = 10000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub p50_ns: u64,
    pub p99_ns: u64,
}

#[derive(Debug, Clone)]
pub struct FeedStats {
    start_time: Option<Instant>,
    frames: u64,
    bytes: u64,
    decode_errors: u64,

    applied: u64,
    stale: u64,
    duplicates: u64,

    gap_events: u64,
    resyncs: u64,
    reconnects: u64,
    snapshots: u64,

    apply_latencies: VecDeque<u64>,
}

impl FeedStats {
    pub fn new() -> Self {
        FeedStats {
            start_time: None,
            frames: 0,
            bytes: 0,
            decode_errors: 0,
            applied: 0,
            stale: 0,
            duplicates: 0,
            gap_events: 0,
            resyncs: 0,
            reconnects: 0,
            snapshots: 0,
            apply_latencies: VecDeque::with_capacity(WINDOW_SIZE),
        }
    }

    /// Record a frame received from the stream
    pub fn record_frame(&mut self, size: usize) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
        self.frames += 1;
        self.bytes += size as u64;
    }

    pub fn record_decode_error(&mut self) {
        self.decode_errors += 1;
    }

    /// Record an applied delta and how long the store mutation took
    pub fn record_applied(&mut self, latency_ns: u64) {
        self.applied += 1;
        if self.apply_latencies.len() >= WINDOW_SIZE {
            self.apply_latencies.pop_front();
        }
        self.apply_latencies.push_back(latency_ns);
    }

    pub fn record_stale(&mut self) {
        self.stale += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates += 1;
    }

    pub fn record_gap(&mut self) {
        self.gap_events += 1;
    }

    pub fn record_resync(&mut self) {
        self.resyncs += 1;
    }

    pub fn record_reconnect(&mut self) {
        self.reconnects += 1;
    }

    pub fn record_snapshot(&mut self) {
        self.snapshots += 1;
    }

    /// Get frames per second since the first frame
    pub fn frames_per_sec(&self) -> f64 {
        match self.start_time {
            None => 0.0,
            Some(start) => {
                let elapsed = start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    self.frames as f64 / elapsed
                } else {
                    0.0
                }
            }
        }
    }

    /// Get apply latency statistics over the rolling window
    pub fn apply_latency_stats(&self) -> Option<LatencyStats> {
        if self.apply_latencies.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.apply_latencies.iter().copied().collect();
        sorted.sort_unstable();

        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        let mean = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        let p50 = sorted[sorted.len() / 2];
        let p99 = sorted[(sorted.len() * 99) / 100];

        Some(LatencyStats {
            min_ns: min,
            max_ns: max,
            mean_ns: mean,
            p50_ns: p50,
            p99_ns: p99,
        })
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.start_time.map(|st| st.elapsed())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn stale(&self) -> u64 {
        self.stale
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn gap_events(&self) -> u64 {
        self.gap_events
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    /// Log a one-shot summary of the run
    pub fn log_summary(&self) {
        info!(
            frames = self.frames,
            bytes = self.bytes,
            frames_per_sec = self.frames_per_sec() as u64,
            applied = self.applied,
            stale = self.stale,
            duplicates = self.duplicates,
            decode_errors = self.decode_errors,
            gaps = self.gap_events,
            resyncs = self.resyncs,
            reconnects = self.reconnects,
            snapshots = self.snapshots,
            "feed_summary"
        );

        if let Some(stats) = self.apply_latency_stats() {
            info!(
                min_ns = stats.min_ns,
                max_ns = stats.max_ns,
                mean_ns = stats.mean_ns,
                p50_ns = stats.p50_ns,
                p99_ns = stats.p99_ns,
                "apply_latency"
            );
        }
    }
}

impl Default for FeedStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_frame() {
        let mut stats = FeedStats::new();
        stats.record_frame(26);
        stats.record_frame(28);
        assert_eq!(stats.frames(), 2);
        assert_eq!(stats.bytes(), 54);
        assert!(stats.elapsed().is_some());
    }

    #[test]
    fn test_apply_latency_stats() {
        let mut stats = FeedStats::new();
        assert!(stats.apply_latency_stats().is_none());
        for i in 1..=100 {
            stats.record_applied(i);
        }

        let latency = stats.apply_latency_stats().unwrap();
        assert_eq!(latency.min_ns, 1);
        assert_eq!(latency.max_ns, 100);
        assert_eq!(stats.applied(), 100);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut stats = FeedStats::new();
        for i in 0..(WINDOW_SIZE as u64 + 10) {
            stats.record_applied(i);
        }
        assert_eq!(stats.apply_latency_stats().unwrap().min_ns, 10);
    }
}
