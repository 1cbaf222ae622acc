use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use std::collections::HashMap;
use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::SubmissionSettings;
use crate::models::{SubmissionRequest, SubmissionResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Timeout,
    ConnectionReset,
    Connect,
    Other,
}

/// Whatever a submission call can fail with, before classification.
#[derive(Debug, Clone, Error)]
pub enum SubmissionFailure {
    #[error("no network connectivity")]
    Offline,

    #[error("endpoint rejected submission with status {status}: {message}")]
    Rejected {
        status: u16,
        message: String,
        field_errors: HashMap<String, String>,
        retry_after: Option<Duration>,
    },

    #[error("transport failure ({kind:?}): {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("malformed endpoint response: {0}")]
    Malformed(String),
}

/// Accepts a finalized set of answers and returns the created response id.
#[async_trait]
pub trait SubmissionEndpoint: Send + Sync {
    async fn submit(&self, request: &SubmissionRequest) -> Result<String, SubmissionFailure>;
}

/// JSON-over-HTTP submission endpoint.
#[derive(Debug, Clone)]
pub struct HttpSubmissionEndpoint {
    http_client: Client,
    url: Url,
}

impl HttpSubmissionEndpoint {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build submission HTTP client")?;
        Ok(Self { http_client, url })
    }

    pub fn from_settings(settings: &SubmissionSettings) -> Result<Self> {
        Self::new(settings.endpoint_url()?, settings.timeout())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SubmissionEndpoint for HttpSubmissionEndpoint {
    async fn submit(&self, request: &SubmissionRequest) -> Result<String, SubmissionFailure> {
        tracing::debug!(
            url = %self.url,
            attempt_id = %request.attempt_context.attempt_id,
            answers = request.answers.len(),
            "Posting submission"
        );

        let response = self
            .http_client
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        let retry_after = parse_retry_after(&response);
        let body = response.text().await.map_err(transport_failure)?;
        let parsed: Option<SubmissionResponse> = serde_json::from_str(&body).ok();

        if status.is_success() {
            return match parsed {
                Some(SubmissionResponse {
                    success: true,
                    id: Some(id),
                    ..
                }) => Ok(id),
                Some(other) => Err(SubmissionFailure::Malformed(
                    other
                        .error
                        .unwrap_or_else(|| "response lacks success=true and an id".to_string()),
                )),
                None => Err(SubmissionFailure::Malformed(format!(
                    "unparseable body with status {}",
                    status
                ))),
            };
        }

        let (message, field_errors) = match parsed {
            Some(body) => (
                body.error.unwrap_or_else(|| reason(status)),
                body.field_errors,
            ),
            None => (reason(status), HashMap::new()),
        };

        Err(SubmissionFailure::Rejected {
            status: status.as_u16(),
            message,
            field_errors,
            retry_after,
        })
    }
}

fn reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("unexpected status")
        .to_string()
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| retry_after_delay(value, Utc::now()))
}

/// Accepts both `Retry-After` forms: delay-seconds and an HTTP-date. A date
/// in the past means "retry now".
fn retry_after_delay(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn transport_failure(err: reqwest::Error) -> SubmissionFailure {
    let kind = if err.is_timeout() {
        TransportKind::Timeout
    } else if err.is_connect() {
        TransportKind::Connect
    } else if is_connection_reset(&err) {
        TransportKind::ConnectionReset
    } else {
        TransportKind::Other
    };

    SubmissionFailure::Transport {
        kind,
        message: err.to_string(),
    }
}

fn is_connection_reset(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            );
        }
        // hyper reports dropped connections without an io::Error source
        let text = inner.to_string();
        if text.contains("connection closed") || text.contains("connection reset") {
            return true;
        }
        source = inner.source();
    }
    false
}
