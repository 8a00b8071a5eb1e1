/// Book Sync - Order Book Reconciliation Client
///
/// Rebuilds an order book from a REST snapshot plus a binary WebSocket delta stream
/// and submits it for assertion at a target ordinal. Features include:
/// - Fixed-point decimals end to end (scale 10^7, no floats)
/// - 26-byte big-endian delta frame decoding
/// - BTreeMap price level store with a per-side level cap
/// - Snapshot/delta merge with ordinal gap detection and resync
/// - WebSocket session supervision with backoff reconnect
/// - Feed statistics and apply latency tracking

pub mod fixed;
pub mod protocol;
pub mod decoder;
pub mod book_builder;
pub mod gap_detector;
pub mod recovery;
pub mod wire;
pub mod error;
pub mod config;
pub mod stats;
pub mod reconciler;
pub mod api;
pub mod submitter;
pub mod session;
pub mod engine;

pub use fixed::{FixedPoint, ParseFixedError};
pub use protocol::{DeltaUpdate, Side, FRAME_SIZE};
pub use decoder::{Decoder, DecodeError, DecodeResult};
pub use book_builder::{OrderBook, PriceLevel, BookDepth};
pub use gap_detector::{GapDetector, SequenceCheck};
pub use recovery::DeltaBuffer;
pub use wire::BookSnapshot;
pub use error::{ClientError, ClientResult};
pub use config::{ClientConfig, ReconnectPolicy};
pub use stats::{FeedStats, LatencyStats};
pub use reconciler::{Reconciler, ReconciliationState, Step};
pub use api::{AssertionOutcome, FeedApi, HttpFeedApi};
pub use submitter::{AssertionReport, Submitter};
pub use session::{FeedEvent, FeedSession};
pub use engine::{run_client, Engine};
