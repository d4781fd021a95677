use crate::config::types::{BadRequestStrategy, LokiConfig};
use crate::loki::push::PushRequest;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const PUSH_PATH: &str = "/loki/api/v1/push";

/// Failure of a single push attempt. Always retried.
#[derive(Debug, Error)]
pub enum LokiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("unexpected response from loki endpoint, code: {status}, body: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

/// Terminal outcome of [`LokiClient::push`].
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery cancelled")]
    Cancelled,

    #[error("failed to encode push request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// HTTP client for the Loki push API
#[derive(Debug)]
pub struct LokiClient {
    push_url: String,
    client: reqwest::Client,
    credentials: Option<(String, Option<String>)>,
    retry_interval: Duration,
    on_bad_request: BadRequestStrategy,
}

impl LokiClient {
    pub fn new(config: &LokiConfig) -> Result<Self, LokiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let credentials = config
            .user
            .as_ref()
            .filter(|user| !user.is_empty())
            .map(|user| (user.clone(), config.password.clone()));

        Ok(Self {
            push_url: format!("{}{}", config.url.trim_end_matches('/'), PUSH_PATH),
            client,
            credentials,
            retry_interval: config.retry_interval,
            on_bad_request: config.on_bad_request,
        })
    }

    pub fn push_url(&self) -> &str {
        &self.push_url
    }

    /// Deliver `request`, retrying at a fixed interval until Loki answers 204.
    ///
    /// Only cancellation ends the loop early; an in-flight request or retry
    /// wait is abandoned as soon as `cancel` fires.
    pub async fn push(
        &self,
        request: &PushRequest,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(request)?;
        let lines = request.line_count();
        let mut attempts = 0u64;

        loop {
            attempts += 1;

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
                result = self.send(body.clone()) => result,
            };

            match result {
                Ok(()) => {
                    if attempts > 1 {
                        info!(attempts = attempts, lines = lines, "Loki push succeeded after retries");
                    } else {
                        debug!(lines = lines, streams = request.streams.len(), "Pushed batch to Loki");
                    }
                    return Ok(());
                }
                Err(LokiError::UnexpectedStatus { status: 400, body })
                    if self.on_bad_request == BadRequestStrategy::Drop =>
                {
                    warn!(lines = lines, body = %body, "Loki rejected batch with 400, dropping it");
                    return Ok(());
                }
                Err(e) => {
                    error!(
                        attempt = attempts,
                        retry_ms = self.retry_interval.as_millis() as u64,
                        error = %e,
                        "Received error from Loki"
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    async fn send(&self, body: Vec<u8>) -> Result<(), LokiError> {
        let mut request = self
            .client
            .post(&self.push_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await?;
        if response.status() != StatusCode::NO_CONTENT {
            return Err(LokiError::UnexpectedStatus {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}
