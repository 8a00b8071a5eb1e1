/// Client error taxonomy
///
/// Decode and sequencing faults heal locally; transport faults are retried up to the
/// reconnect policy; server-protocol faults and assertion mismatches always reach the
/// operator.

use thiserror::Error;

use crate::decoder::DecodeError;

pub const EXIT_ASSERTION_MISMATCH: i32 = 1;
pub const EXIT_FAILURE: i32 = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("malformed delta frame: {0}")]
    Decode(#[from] DecodeError),

    #[error("sequence gap: expected ordinal {expected}, got {actual}")]
    SequenceGap { expected: i64, actual: i64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("server protocol error: {0}")]
    ServerProtocol(String),

    #[error("assertion mismatch (HTTP {status}): {diff}")]
    AssertionMismatch { status: u16, diff: String },

    #[error("snapshot ordinal {snapshot} is already past target ordinal {target}")]
    TargetOverrun { snapshot: i64, target: i64 },
}

impl ClientError {
    /// Worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::AssertionMismatch { .. } => EXIT_ASSERTION_MISMATCH,
            _ => EXIT_FAILURE,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
