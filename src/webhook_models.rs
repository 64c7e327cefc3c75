use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Lead;

/// Body posted to the automation webhook.
///
/// Key names are display-cased because the receiving workflow maps them
/// straight into its call script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Phone Number")]
    pub phone_number: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Stream")]
    pub stream: String,
    /// RFC 3339, millisecond precision, `Z` suffix.
    #[serde(rename = "submittedAt")]
    pub submitted_at: String,
}

impl From<&Lead> for WebhookPayload {
    fn from(lead: &Lead) -> Self {
        Self {
            name: lead.name.clone(),
            phone_number: lead.phone_number.clone(),
            email: lead.email.clone(),
            stream: lead.stream.as_str().to_string(),
            submitted_at: lead
                .submitted_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Result of one notifier invocation. Never an error: every failure is captured here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyOutcome {
    pub success: bool,
    /// HTTP status of the last response, if any response arrived.
    pub status: Option<u16>,
    pub attempts: u32,
    pub error: Option<String>,
    /// No webhook URL configured; nothing was sent.
    pub skipped: bool,
}

impl NotifyOutcome {
    pub fn skipped() -> Self {
        Self {
            success: false,
            status: None,
            attempts: 0,
            error: Some("Webhook URL not configured".to_string()),
            skipped: true,
        }
    }

    pub fn delivered(status: u16, attempts: u32) -> Self {
        Self {
            success: true,
            status: Some(status),
            attempts,
            error: None,
            skipped: false,
        }
    }

    pub fn failed(status: Option<u16>, attempts: u32, error: String) -> Self {
        Self {
            success: false,
            status,
            attempts,
            error: Some(error),
            skipped: false,
        }
    }

    /// Attempt-log entry recorded on the lead.
    pub fn log_entry(&self) -> WebhookLogEntry {
        WebhookLogEntry {
            timestamp: Utc::now(),
            success: self.success,
            error: self.error.clone(),
            attempts: self.attempts,
        }
    }
}

/// One entry of a lead's append-only webhook attempt log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookLogEntry {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub attempts: u32,
}
