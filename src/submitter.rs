/// Validation submitter
///
/// Renders the book at its current ordinal into the assertion format and reports the
/// server's verdict. A mismatch is surfaced with the server's diff untouched and is
/// never retried.

use tracing::{error, info};

use crate::api::{AssertionOutcome, FeedApi};
use crate::book_builder::OrderBook;
use crate::error::{ClientError, ClientResult};
use crate::wire::BookSnapshot;

/// What was submitted, for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionReport {
    pub last_update_id: i64,
    pub bid_levels: usize,
    pub ask_levels: usize,
}

pub struct Submitter {
    depth: usize,
}

impl Submitter {
    pub fn new(depth: usize) -> Self {
        Submitter { depth }
    }

    /// Top `depth` levels of `book` in the wire format.
    pub fn render(&self, book: &OrderBook) -> BookSnapshot {
        BookSnapshot::from(&book.snapshot_view(self.depth))
    }

    pub async fn submit<A>(&self, api: &A, book: &OrderBook) -> ClientResult<AssertionReport>
    where
        A: FeedApi + ?Sized,
    {
        let payload = self.render(book);
        let report = AssertionReport {
            last_update_id: payload.last_update_id,
            bid_levels: payload.bids.len(),
            ask_levels: payload.asks.len(),
        };

        info!(
            ordinal = report.last_update_id,
            bids = report.bid_levels,
            asks = report.ask_levels,
            "submitting_assertion"
        );

        match api.submit_assertion(&payload).await? {
            AssertionOutcome::Passed => {
                info!(ordinal = report.last_update_id, "assertion_passed");
                Ok(report)
            }
            AssertionOutcome::Mismatch { status, diff } => {
                error!(ordinal = report.last_update_id, status, diff = %diff, "assertion_failed");
                Err(ClientError::AssertionMismatch { status, diff })
            }
        }
    }
}
