//! Webhook delivery with bounded exponential-backoff retries.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::models::Lead;
use crate::storage::LeadStore;
use crate::webhook_models::{NotifyOutcome, WebhookPayload};

const USER_AGENT: &str = "UniversityLeads-Server/1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Network,
}

/// A request that produced no HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

/// Outbound JSON POST. Any HTTP response, whatever its status, is `Ok(status)`.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<u16, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create webhook client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::timeout(format!("timeout of {}ms exceeded", timeout.as_millis()))
                } else {
                    TransportError::network(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }
}

/// Retry budget for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait after the zero-based attempt `k`: `initial_delay * 2^k`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Delivered(u16),
    /// 4xx: the receiver rejected the payload, retrying cannot help.
    Terminal(u16),
    Retryable {
        status: Option<u16>,
        error: String,
    },
}

impl AttemptResult {
    pub fn classify(result: Result<u16, TransportError>) -> Self {
        match result {
            Ok(status) if (200..300).contains(&status) => AttemptResult::Delivered(status),
            Ok(status) if (400..500).contains(&status) => AttemptResult::Terminal(status),
            Ok(status) => AttemptResult::Retryable {
                status: Some(status),
                error: status_error(status),
            },
            Err(e) => AttemptResult::Retryable {
                status: None,
                error: e.message,
            },
        }
    }
}

fn status_error(status: u16) -> String {
    format!("Request failed with status code {}", status)
}

/// What the caller does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Finished(NotifyOutcome),
    RetryAfter(Duration),
}

/// Per-delivery retry state machine. Feed it each attempt's result with
/// [`RetryState::advance`] until it yields [`Step::Finished`].
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn advance(&mut self, result: AttemptResult) -> Step {
        let attempt = self.attempts;
        self.attempts += 1;

        match result {
            AttemptResult::Delivered(status) => {
                Step::Finished(NotifyOutcome::delivered(status, self.attempts))
            }
            AttemptResult::Terminal(status) => Step::Finished(NotifyOutcome::failed(
                Some(status),
                self.attempts,
                status_error(status),
            )),
            AttemptResult::Retryable { status, error } => {
                if self.attempts >= self.policy.max_attempts {
                    Step::Finished(NotifyOutcome::failed(status, self.attempts, error))
                } else {
                    Step::RetryAfter(self.policy.delay_after(attempt))
                }
            }
        }
    }
}

/// Sends lead payloads to the automation webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    transport: Arc<dyn WebhookTransport>,
    url: Option<String>,
    policy: RetryPolicy,
}

impl WebhookNotifier {
    pub fn new(transport: Arc<dyn WebhookTransport>, url: Option<String>) -> Self {
        Self {
            transport,
            url,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Delivers one payload. Never fails: every failure is described by the outcome.
    pub async fn notify(&self, payload: &WebhookPayload) -> NotifyOutcome {
        let Some(url) = self.url.as_deref() else {
            tracing::warn!("N8N_WEBHOOK_URL not configured. Skipping webhook trigger.");
            return NotifyOutcome::skipped();
        };

        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(e) => return NotifyOutcome::failed(None, 0, format!("Invalid payload: {}", e)),
        };

        let mut state = RetryState::new(self.policy);
        loop {
            tracing::debug!(
                "Webhook attempt {}/{}",
                state.attempts() + 1,
                self.policy.max_attempts
            );
            let result = self
                .transport
                .post_json(url, &body, self.policy.attempt_timeout)
                .await;
            let attempt = AttemptResult::classify(result);
            if let AttemptResult::Retryable { ref error, .. } = attempt {
                tracing::warn!("Webhook attempt {} failed: {}", state.attempts() + 1, error);
            }

            match state.advance(attempt) {
                Step::Finished(outcome) => {
                    if outcome.success {
                        tracing::info!(
                            "Webhook delivered (status {:?}, {} attempt(s))",
                            outcome.status,
                            outcome.attempts
                        );
                    } else {
                        tracing::error!(
                            "Webhook delivery failed after {} attempt(s): {}",
                            outcome.attempts,
                            outcome.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    return outcome;
                }
                Step::RetryAfter(delay) => {
                    tracing::debug!("Waiting {}ms before retry", delay.as_millis());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Notifies for `lead` and records the outcome on it. A skipped delivery
    /// records nothing; a recording failure is logged.
    pub async fn deliver(&self, store: &dyn LeadStore, lead: &Lead) -> NotifyOutcome {
        let outcome = self.notify(&WebhookPayload::from(lead)).await;
        if outcome.skipped {
            return outcome;
        }

        if let Err(e) = store
            .record_webhook_outcome(lead.id, outcome.log_entry())
            .await
        {
            tracing::error!("Failed to record webhook outcome for lead {}: {}", lead.id, e);
        }
        outcome
    }
}
