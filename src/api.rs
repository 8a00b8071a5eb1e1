/// Control-plane collaborator: start, snapshot and assertion calls
///
/// `FeedApi` is the seam between the engine and the REST server. `HttpFeedApi` is the
/// reqwest implementation; tests substitute an in-process one.

use std::future::Future;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, error, warn};

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::{ClientError, ClientResult};
use crate::wire::BookSnapshot;

/// Server verdict on a submitted book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionOutcome {
    Passed,
    /// The server's diff, verbatim.
    Mismatch { status: u16, diff: String },
}

#[async_trait]
pub trait FeedApi: Send + Sync {
    /// `POST /start`
    async fn start(&self) -> ClientResult<()>;

    /// `GET /snapshot?depth=N`
    async fn snapshot(&self, depth: usize) -> ClientResult<BookSnapshot>;

    /// `POST /assertion`
    async fn submit_assertion(&self, book: &BookSnapshot) -> ClientResult<AssertionOutcome>;
}

pub struct HttpFeedApi {
    client: reqwest::Client,
    base_url: String,
}

fn transport(e: reqwest::Error) -> ClientError {
    ClientError::Transport(e.to_string())
}

impl HttpFeedApi {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(transport)?;

        Ok(HttpFeedApi {
            client,
            base_url: config.http_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl FeedApi for HttpFeedApi {
    async fn start(&self) -> ClientResult<()> {
        let response = self
            .client
            .post(self.url("/start"))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::ServerProtocol(format!(
                "POST /start returned {}: {}",
                status, body
            )));
        }
        debug!(%status, "feed_started");
        Ok(())
    }

    async fn snapshot(&self, depth: usize) -> ClientResult<BookSnapshot> {
        let response = self
            .client
            .get(self.url("/snapshot"))
            .query(&[("depth", depth)])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::ServerProtocol(format!(
                "GET /snapshot returned {}: {}",
                status, body
            )));
        }

        let body = response.bytes().await.map_err(transport)?;
        let snapshot = serde_json::from_slice::<BookSnapshot>(&body)
            .map_err(|e| ClientError::ServerProtocol(format!("malformed snapshot: {}", e)))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    async fn submit_assertion(&self, book: &BookSnapshot) -> ClientResult<AssertionOutcome> {
        let response = self
            .client
            .post(self.url("/assertion"))
            .json(book)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        match status {
            StatusCode::OK => Ok(AssertionOutcome::Passed),
            StatusCode::BAD_REQUEST => {
                let diff = response.text().await.map_err(transport)?;
                Ok(AssertionOutcome::Mismatch {
                    status: status.as_u16(),
                    diff,
                })
            }
            other => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::ServerProtocol(format!(
                    "POST /assertion returned {}: {}",
                    other, body
                )))
            }
        }
    }
}

/// Run `op`, retrying transient failures with the policy's backoff.
pub async fn with_retries<T, F, Fut>(
    policy: &ReconnectPolicy,
    operation: &'static str,
    mut op: F,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let mut attempts = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                attempts += 1;
                if policy.exhausted(attempts) {
                    error!(operation, attempts, error = %e, "retries_exhausted");
                    return Err(ClientError::RetriesExhausted { attempts });
                }
                let delay = policy.backoff(attempts);
                warn!(
                    operation,
                    attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "request_retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
