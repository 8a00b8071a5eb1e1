/// Snapshot/delta reconciliation state machine
///
/// Sans-IO: the reconciler never performs a network call. It consumes events (feed
/// started, stream opened, delta, snapshot, disconnect) and answers with a `Step`
/// telling the driver what I/O to perform next. It exclusively owns the book and the
/// pre-snapshot buffer, so every mutation is serialized through `&mut self`.

use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::book_builder::OrderBook;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::gap_detector::{GapDetector, SequenceCheck};
use crate::protocol::DeltaUpdate;
use crate::recovery::DeltaBuffer;
use crate::stats::FeedStats;
use crate::wire::BookSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationState {
    AwaitingStart,
    AwaitingSnapshot,
    Buffering,
    Synchronized,
    Resyncing,
    Complete,
    Failed,
}

impl ReconciliationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReconciliationState::Complete | ReconciliationState::Failed)
    }

    /// States in which live deltas are parked rather than applied.
    pub fn is_buffering(self) -> bool {
        matches!(
            self,
            ReconciliationState::AwaitingSnapshot
                | ReconciliationState::Buffering
                | ReconciliationState::Resyncing
        )
    }
}

/// What the driver must do after feeding an event in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Fetch a snapshot; `restart` asks for `POST /start` first.
    RequestSnapshot { restart: bool },
    /// Target reached: submit the book.
    Complete,
    Failed(ClientError),
}

#[derive(Debug)]
pub struct Reconciler {
    state: ReconciliationState,
    book: OrderBook,
    buffer: DeltaBuffer,
    gaps: GapDetector,
    stats: FeedStats,

    target: i64,
    restart_on_resync: bool,
    progress_interval: i64,
}

impl Reconciler {
    pub fn new(config: &ClientConfig) -> Self {
        Reconciler {
            state: ReconciliationState::AwaitingStart,
            book: OrderBook::with_max_levels(config.effective_store_cap()),
            buffer: DeltaBuffer::with_capacity(config.buffer_capacity),
            gaps: GapDetector::new(),
            stats: FeedStats::new(),
            target: config.target_ordinal,
            restart_on_resync: config.restart_feed_on_resync,
            progress_interval: config.progress_interval.max(1),
        }
    }

    pub fn state(&self) -> ReconciliationState {
        self.state
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn buffer(&self) -> &DeltaBuffer {
        &self.buffer
    }

    pub fn gaps(&self) -> &GapDetector {
        &self.gaps
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut FeedStats {
        &mut self.stats
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    /// Log feed counters plus the gap history seen so far.
    pub fn log_summary(&self) {
        self.stats.log_summary();
        if self.gaps.gap_count() > 0 {
            info!(
                gap_ranges = self.gaps.gap_count(),
                missing_ordinals = self.gaps.total_gaps(),
                gaps = ?self.gaps.gaps(),
                "gap_history"
            );
        }
    }

    /// `POST /start` succeeded.
    pub fn on_started(&mut self) {
        if self.state == ReconciliationState::AwaitingStart {
            self.transition(ReconciliationState::AwaitingSnapshot);
        }
    }

    /// The delta stream is (re)open and delivering; ask for the snapshot it will be merged with.
    pub fn on_stream_opened(&mut self) -> Step {
        match self.state {
            ReconciliationState::AwaitingSnapshot => Step::RequestSnapshot { restart: false },
            _ => Step::Continue,
        }
    }

    pub fn on_delta(&mut self, update: DeltaUpdate) -> Step {
        match self.state {
            ReconciliationState::Synchronized => self.apply_live(update),
            state if state.is_buffering() => {
                self.buffer.push(update);
                Step::Continue
            }
            ReconciliationState::AwaitingStart => {
                trace!(ordinal = update.ordinal, "delta_before_start_dropped");
                Step::Continue
            }
            _ => Step::Continue,
        }
    }

    /// Merge a snapshot with everything buffered since the stream opened.
    pub fn on_snapshot(&mut self, snapshot: BookSnapshot) -> Step {
        match self.state {
            ReconciliationState::AwaitingSnapshot | ReconciliationState::Resyncing => {}
            state => {
                debug!(?state, ordinal = snapshot.last_update_id, "snapshot_ignored");
                return Step::Continue;
            }
        }

        if let Err(e) = snapshot.validate() {
            return self.fail(e);
        }

        let ordinal = snapshot.last_update_id;
        if ordinal > self.target {
            return self.fail(ClientError::TargetOverrun {
                snapshot: ordinal,
                target: self.target,
            });
        }

        self.transition(ReconciliationState::Buffering);
        self.book
            .reset_from(snapshot.bid_levels(), snapshot.ask_levels(), ordinal);
        self.stats.record_snapshot();

        let pending = self.buffer.drain_after(ordinal);
        info!(
            ordinal,
            bids = self.book.bid_levels(),
            asks = self.book.ask_levels(),
            replay = pending.len(),
            "snapshot_applied"
        );

        if self.book.last_update_id() == self.target {
            return self.complete();
        }

        let mut pending = pending.into_iter();
        while let Some(update) = pending.next() {
            match self.gaps.process(self.book.last_update_id(), update.ordinal) {
                SequenceCheck::Next => {
                    self.apply(&update);
                    if self.book.last_update_id() == self.target {
                        return self.complete();
                    }
                }
                SequenceCheck::Gap { expected, actual } => {
                    let step = self.begin_resync(expected, actual);
                    self.buffer.push(update);
                    for rest in pending.by_ref() {
                        self.buffer.push(rest);
                    }
                    return step;
                }
                SequenceCheck::Stale | SequenceCheck::Duplicate => {}
            }
        }

        self.transition(ReconciliationState::Synchronized);
        Step::Continue
    }

    /// The stream dropped. The server is authoritative, so local state is discarded and
    /// the next open starts over from a fresh snapshot.
    pub fn on_disconnect(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        info!(
            last_applied = self.book.last_update_id(),
            buffered = self.buffer.len(),
            "stream_lost"
        );
        self.stats.record_reconnect();
        self.book.clear();
        self.buffer.clear();
        if self.state != ReconciliationState::AwaitingStart {
            self.transition(ReconciliationState::AwaitingSnapshot);
        }
    }

    /// Enter `Failed` with `error`.
    pub fn fail(&mut self, error: ClientError) -> Step {
        self.buffer.clear();
        self.transition(ReconciliationState::Failed);
        Step::Failed(error)
    }

    fn apply_live(&mut self, update: DeltaUpdate) -> Step {
        match self.gaps.process(self.book.last_update_id(), update.ordinal) {
            SequenceCheck::Next => {
                self.apply(&update);
                if self.book.last_update_id() == self.target {
                    return self.complete();
                }
                Step::Continue
            }
            SequenceCheck::Stale => {
                trace!(ordinal = update.ordinal, "stale_delta_dropped");
                self.stats.record_stale();
                Step::Continue
            }
            SequenceCheck::Duplicate => {
                warn!(
                    ordinal = update.ordinal,
                    last_applied = self.book.last_update_id(),
                    "repeated_ordinal_protocol_violation"
                );
                self.stats.record_duplicate();
                Step::Continue
            }
            SequenceCheck::Gap { expected, actual } => {
                let step = self.begin_resync(expected, actual);
                self.buffer.push(update);
                step
            }
        }
    }

    fn apply(&mut self, update: &DeltaUpdate) {
        let started = Instant::now();
        self.book.apply_delta(update);
        self.stats
            .record_applied(started.elapsed().as_nanos() as u64);

        if update.ordinal % self.progress_interval == 0 {
            info!(
                ordinal = update.ordinal,
                bids = self.book.bid_levels(),
                asks = self.book.ask_levels(),
                "progress"
            );
        }
    }

    fn begin_resync(&mut self, expected: i64, actual: i64) -> Step {
        let gap = ClientError::SequenceGap { expected, actual };
        warn!(error = %gap, missing = actual - expected, "resyncing");
        self.stats.record_gap();
        self.stats.record_resync();
        self.book.clear();
        self.buffer.clear();
        self.transition(ReconciliationState::Resyncing);
        Step::RequestSnapshot {
            restart: self.restart_on_resync,
        }
    }

    fn complete(&mut self) -> Step {
        info!(ordinal = self.book.last_update_id(), "target_reached");
        self.buffer.clear();
        self.transition(ReconciliationState::Complete);
        Step::Complete
    }

    fn transition(&mut self, next: ReconciliationState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "state_transition");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::FixedPoint;
    use crate::protocol::Side;

    fn reconciler(target: i64) -> Reconciler {
        let config = ClientConfig {
            target_ordinal: target,
            ..ClientConfig::default()
        };
        Reconciler::new(&config)
    }

    fn snapshot(ordinal: i64) -> BookSnapshot {
        BookSnapshot {
            last_update_id: ordinal,
            bids: vec![[FixedPoint::from_raw(10_000), FixedPoint::from_raw(1_000)]],
            asks: vec![[FixedPoint::from_raw(11_000), FixedPoint::from_raw(4_000)]],
        }
    }

    fn bid(ordinal: i64, price: i64, qty: i64) -> DeltaUpdate {
        DeltaUpdate::new(
            Side::Bid,
            ordinal,
            FixedPoint::from_raw(price),
            FixedPoint::from_raw(qty),
        )
    }

    #[test]
    fn test_lifecycle_to_synchronized() {
        let mut rec = reconciler(100);
        assert_eq!(rec.state(), ReconciliationState::AwaitingStart);
        rec.on_started();
        assert_eq!(rec.state(), ReconciliationState::AwaitingSnapshot);
        assert_eq!(rec.on_stream_opened(), Step::RequestSnapshot { restart: false });
        assert_eq!(rec.on_snapshot(snapshot(5)), Step::Continue);
        assert_eq!(rec.state(), ReconciliationState::Synchronized);
    }

    #[test]
    fn test_deltas_before_start_are_dropped() {
        let mut rec = reconciler(100);
        rec.on_delta(bid(1, 10, 1));
        assert!(rec.buffer().is_empty());
    }

    #[test]
    fn test_snapshot_outside_awaiting_is_ignored() {
        let mut rec = reconciler(100);
        rec.on_started();
        rec.on_snapshot(snapshot(5));
        assert_eq!(rec.on_snapshot(snapshot(50)), Step::Continue);
        assert_eq!(rec.book().last_update_id(), 5);
    }

    #[test]
    fn test_disconnect_rearms() {
        let mut rec = reconciler(100);
        rec.on_started();
        rec.on_snapshot(snapshot(5));
        rec.on_delta(bid(6, 10_000, 7));
        rec.on_disconnect();
        assert_eq!(rec.state(), ReconciliationState::AwaitingSnapshot);
        assert!(rec.book().is_empty());
        assert_eq!(rec.stats().reconnects(), 1);
        assert_eq!(rec.on_stream_opened(), Step::RequestSnapshot { restart: false });
    }
}
