/// Reconciliation engine
///
/// The single consumer of the delta stream. It owns the reconciler (and through it the
/// book), so deltas are applied strictly one at a time. Control-plane calls run as
/// spawned tasks whose results are selected alongside the event channel; the delta path
/// never waits on them. Submission happens here too, after the stream is stopped
/// feeding the book.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{with_retries, FeedApi, HttpFeedApi};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::reconciler::{Reconciler, Step};
use crate::session::{FeedEvent, FeedSession};
use crate::submitter::{AssertionReport, Submitter};
use crate::wire::BookSnapshot;

const SESSION_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type SnapshotTask = JoinHandle<ClientResult<BookSnapshot>>;

enum Wake {
    Snapshot(ClientResult<BookSnapshot>),
    Event(Option<FeedEvent>),
}

pub struct Engine<A: FeedApi + 'static> {
    api: Arc<A>,
    config: ClientConfig,
    reconciler: Reconciler,
    submitter: Submitter,
    snapshot_task: Option<SnapshotTask>,
}

impl<A: FeedApi + 'static> Engine<A> {
    pub fn new(api: Arc<A>, config: ClientConfig) -> Self {
        Engine {
            reconciler: Reconciler::new(&config),
            submitter: Submitter::new(config.depth),
            api,
            config,
            snapshot_task: None,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// `POST /start`, retried on transport faults. Must succeed before the stream opens.
    pub async fn start(&mut self) -> ClientResult<()> {
        let api = &self.api;
        match with_retries(&self.config.reconnect, "start", move || api.start()).await {
            Ok(()) => {
                info!(
                    target_ordinal = self.config.target_ordinal,
                    depth = self.config.depth,
                    "feed_started"
                );
                self.reconciler.on_started();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "feed_start_failed");
                self.reconciler.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Drive the reconciler from `events` until the target is asserted or the run fails.
    pub async fn run(&mut self, mut events: mpsc::Receiver<FeedEvent>) -> ClientResult<AssertionReport> {
        loop {
            let wake = tokio::select! {
                result = join_snapshot(&mut self.snapshot_task) => Wake::Snapshot(result),
                event = events.recv() => Wake::Event(event),
            };

            let step = match wake {
                Wake::Snapshot(Ok(snapshot)) => self.reconciler.on_snapshot(snapshot),
                Wake::Snapshot(Err(e)) => self.reconciler.fail(e),
                Wake::Event(Some(event)) => self.handle(event),
                Wake::Event(None) => self
                    .reconciler
                    .fail(ClientError::Transport("delta stream closed".to_string())),
            };

            match step {
                Step::Continue => {}
                Step::RequestSnapshot { restart } => self.request_snapshot(restart),
                Step::Complete => {
                    self.abort_snapshot();
                    drop(events);
                    self.reconciler.log_summary();
                    return self
                        .submitter
                        .submit(self.api.as_ref(), self.reconciler.book())
                        .await;
                }
                Step::Failed(e) => {
                    self.abort_snapshot();
                    error!(error = %e, state = ?self.reconciler.state(), "reconciliation_failed");
                    self.reconciler.log_summary();
                    return Err(e);
                }
            }
        }
    }

    fn handle(&mut self, event: FeedEvent) -> Step {
        match event {
            FeedEvent::Connected => self.reconciler.on_stream_opened(),
            FeedEvent::Frame { update, len } => {
                self.reconciler.stats_mut().record_frame(len);
                self.reconciler.on_delta(update)
            }
            FeedEvent::Malformed { len, error } => {
                let stats = self.reconciler.stats_mut();
                stats.record_frame(len);
                stats.record_decode_error();
                debug!(error = %ClientError::from(error), "frame_skipped");
                Step::Continue
            }
            FeedEvent::Disconnected { reason } => {
                warn!(reason = %reason, "stream_disconnected");
                self.abort_snapshot();
                self.reconciler.on_disconnect();
                Step::Continue
            }
            FeedEvent::Failed(e) => self.reconciler.fail(e),
        }
    }

    fn request_snapshot(&mut self, restart: bool) {
        if self.snapshot_task.is_some() {
            if !restart {
                debug!("snapshot_already_in_flight");
                return;
            }
            self.abort_snapshot();
        }

        let api = Arc::clone(&self.api);
        let policy = self.config.reconnect.clone();
        let depth = self.config.depth;
        debug!(depth, restart, "snapshot_requested");

        self.snapshot_task = Some(tokio::spawn(async move {
            if restart {
                with_retries(&policy, "start", || api.start()).await?;
            }
            with_retries(&policy, "snapshot", || api.snapshot(depth)).await
        }));
    }

    fn abort_snapshot(&mut self) {
        if let Some(task) = self.snapshot_task.take() {
            task.abort();
        }
    }
}

/// Resolve the in-flight snapshot fetch, or never resolve when there is none.
async fn join_snapshot(slot: &mut Option<SnapshotTask>) -> ClientResult<BookSnapshot> {
    let Some(task) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let joined = task.await;
    *slot = None;
    joined.unwrap_or_else(|e| Err(ClientError::Transport(format!("snapshot task failed: {}", e))))
}

/// Full client run against the HTTP/WebSocket collaborators described by `config`.
pub async fn run_client(config: ClientConfig) -> ClientResult<AssertionReport> {
    let api = Arc::new(HttpFeedApi::new(&config)?);
    let mut engine = Engine::new(api, config.clone());
    engine.start().await?;

    let (events_tx, events_rx) = mpsc::channel(config.channel_capacity.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut session = tokio::spawn(FeedSession::new(&config, events_tx, shutdown_rx).run());

    let result = engine.run(events_rx).await;

    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(SESSION_SHUTDOWN_GRACE, &mut session)
        .await
        .is_err()
    {
        warn!("session_shutdown_timeout");
        session.abort();
    }

    result
}
