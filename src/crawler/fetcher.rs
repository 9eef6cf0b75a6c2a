//! HTTP fetching and outcome classification
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the identifying user agent
//! - The `Transport` seam between the crawler and the network
//! - Classifying responses as success, transient or permanent failure
//! - Retrying transient failures with exponential backoff
//!
//! # Classification
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | HTTP 2xx | Success |
//! | HTTP 429 | Transient |
//! | HTTP 5xx | Transient |
//! | Other HTTP status | Permanent |
//! | Timeout, connection or body error | Transient |
//! | Redirect loop / too many redirects | Permanent |

use crate::config::Config;
use crate::crawler::pacer::Pacer;
use crate::crawler::retry::{RetryPolicy, RetryState, Sleeper};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{redirect::Policy, Client};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const MAX_REDIRECTS: usize = 10;

/// Network-level failure reported by a `Transport`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("redirect error: {0}")]
    Redirect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Returns true if retrying the request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout(_) | TransportError::Connect(_) | TransportError::Body(_)
        )
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_redirect() {
            TransportError::Redirect(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// A completed HTTP exchange
///
/// `body` is only populated for 2xx responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub final_url: Url,
    pub body: Vec<u8>,
}

/// The network as seen by the crawler
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a GET, following redirects
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, TransportError>;

    /// Checks that the host answers at all within `timeout`, returning the
    /// HTTP status
    async fn head(&self, url: &Url, timeout: Duration) -> Result<u16, TransportError>;
}

/// Builds the HTTP client used for every request of a crawl
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    Client::builder()
        .user_agent(config.user_agent.header_value())
        .default_headers(headers)
        .connect_timeout(config.timeout().min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `Transport` backed by a reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let final_url = response.url().clone();
        let body = if status.is_success() {
            response
                .bytes()
                .await
                .map_err(TransportError::from_reqwest)?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            final_url,
            body,
        })
    }

    async fn head(&self, url: &Url, timeout: Duration) -> Result<u16, TransportError> {
        let response = self
            .client
            .head(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;
        Ok(response.status().as_u16())
    }
}

/// Result of a single fetch attempt, or of a retried fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success {
        status: u16,
        final_url: Url,
        body: Vec<u8>,
    },
    TransientFailure {
        reason: String,
        status: Option<u16>,
    },
    PermanentFailure {
        reason: String,
        status: Option<u16>,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    fn from_response(response: HttpResponse) -> Self {
        let status = response.status;
        match status {
            200..=299 => FetchOutcome::Success {
                status,
                final_url: response.final_url,
                body: response.body,
            },
            429 | 500..=599 => FetchOutcome::TransientFailure {
                reason: format!("HTTP {}", status),
                status: Some(status),
            },
            _ => FetchOutcome::PermanentFailure {
                reason: format!("HTTP {}", status),
                status: Some(status),
            },
        }
    }

    fn from_error(error: TransportError) -> Self {
        if error.is_transient() {
            FetchOutcome::TransientFailure {
                reason: error.to_string(),
                status: None,
            }
        } else {
            FetchOutcome::PermanentFailure {
                reason: error.to_string(),
                status: None,
            }
        }
    }
}

/// Final outcome of a fetch after retries
///
/// A `TransientFailure` here means the attempt budget is exhausted.
#[derive(Debug, Clone)]
pub struct RetriedFetch {
    pub outcome: FetchOutcome,
    pub attempts: u32,
    pub backoffs: Vec<Duration>,
}

/// Applies timeout, classification and retry policy on top of a `Transport`
#[derive(Clone)]
pub struct FetchExecutor {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl FetchExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            timeout,
        }
    }

    /// Performs one classified fetch attempt
    pub async fn fetch(&self, url: &Url, timeout: Duration) -> FetchOutcome {
        match self.transport.get(url, timeout).await {
            Ok(response) => FetchOutcome::from_response(response),
            Err(error) => FetchOutcome::from_error(error),
        }
    }

    /// Fetches `url`, retrying transient failures per the retry policy
    ///
    /// The first attempt is assumed to be already paced by the caller;
    /// every later attempt waits for the backoff delay and then for its
    /// own pacer slot.
    pub async fn fetch_with_retry(&self, url: &Url, pacer: &Pacer) -> RetriedFetch {
        let mut retry = RetryState::new();

        loop {
            if retry.attempts > 0 {
                pacer.wait().await;
            }
            retry.attempts += 1;

            let outcome = self.fetch(url, self.timeout).await;

            if let FetchOutcome::TransientFailure { reason, .. } = &outcome {
                if let Some(delay) = retry.schedule_retry(&self.policy) {
                    warn!(
                        "Transient failure on {} (attempt {}/{}): {}; retrying in {:.2}s",
                        url,
                        retry.attempts,
                        self.policy.max_attempts,
                        reason,
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay).await;
                    continue;
                }
            }

            debug!("Fetched {} after {} attempt(s)", url, retry.attempts);
            return RetriedFetch {
                outcome,
                attempts: retry.attempts,
                backoffs: retry.backoffs,
            };
        }
    }
}
