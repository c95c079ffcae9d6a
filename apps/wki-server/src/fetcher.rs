use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use wki_model::{FetchMeta, WireRecord};

use crate::discovery::BackendLocator;
use crate::http_client;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Path appended to the backend base URL.
    pub path: String,
    /// Record cap per request; zero or negative asks for everything.
    pub limit: i64,
    /// Only records from the last N days; zero means unbounded.
    pub lookback_days: u32,
    pub max_attempts: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("backend answered {0}")]
    Status(reqwest::StatusCode),
    #[error("undecodable body: {0}")]
    Decode(#[source] reqwest::Error),
}

/// One page of training data as returned by the backend.
#[derive(Debug, Clone, Default)]
pub struct FetchedBatch {
    pub records: Vec<WireRecord>,
    pub meta: FetchMeta,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Payload,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    termine: Vec<Value>,
    #[serde(default)]
    meta: FetchMeta,
}

/// Delay before retry number `attempt` (1-based): doubles from `initial`,
/// capped at `max`.
pub fn backoff_delay(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    initial.saturating_mul(1u32 << shift).min(max)
}

pub struct TrainingDataFetcher {
    client: reqwest::Client,
    locator: Arc<BackendLocator>,
    settings: FetchSettings,
}

impl TrainingDataFetcher {
    pub fn new(locator: Arc<BackendLocator>, settings: FetchSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client::client_with_timeout(settings.timeout)?,
            locator,
            settings,
        })
    }

    /// Fetch records newer than `since_id`, retrying transient failures.
    ///
    /// `None` when no backend is known (no retry) or when every attempt
    /// failed. The backoff starts over on every call.
    pub async fn fetch(&self, since_id: u64) -> Option<FetchedBatch> {
        let base = self.locator.resolve()?;
        let attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.fetch_once(&base, since_id).await {
                Ok(batch) => {
                    info!(
                        target: "wki::fetch",
                        records = batch.records.len(),
                        since_id,
                        attempt,
                        "training data received"
                    );
                    return Some(batch);
                }
                Err(err) if attempt < attempts => {
                    let delay =
                        backoff_delay(self.settings.backoff_initial, self.settings.backoff_max, attempt);
                    warn!(
                        target: "wki::fetch",
                        %err,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "training data fetch failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(
                        target: "wki::fetch",
                        %err,
                        attempts,
                        "training data fetch gave up"
                    );
                }
            }
        }
        None
    }

    pub(crate) fn query(&self, since_id: u64) -> Vec<(&'static str, String)> {
        let mut query = vec![(
            "limit",
            if self.settings.limit <= 0 {
                "all".to_string()
            } else {
                self.settings.limit.to_string()
            },
        )];
        if self.settings.lookback_days > 0 {
            query.push(("lookback_days", self.settings.lookback_days.to_string()));
        }
        if since_id > 0 {
            query.push(("since_id", since_id.to_string()));
        }
        query
    }

    async fn fetch_once(&self, base: &str, since_id: u64) -> Result<FetchedBatch, FetchError> {
        let url = format!("{base}{}", self.settings.path);
        let resp = self
            .client
            .get(&url)
            .query(&self.query(since_id))
            .send()
            .await
            .map_err(FetchError::Transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let envelope: Envelope = resp.json().await.map_err(FetchError::Decode)?;
        let total = envelope.data.termine.len();
        let records: Vec<WireRecord> = envelope
            .data
            .termine
            .into_iter()
            .filter_map(|raw| serde_json::from_value(raw).ok())
            .collect();
        if records.len() < total {
            debug!(
                target: "wki::fetch",
                dropped = total - records.len(),
                "non-object training records dropped"
            );
        }
        Ok(FetchedBatch {
            records,
            meta: envelope.data.meta,
        })
    }
}
