use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::phone;
use crate::webhook_models::WebhookLogEntry;

// ============ Enumerations ============

/// Academic track selected by the applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stream {
    Science,
    Commerce,
    Humanities,
}

impl Stream {
    pub const ALL: [Stream; 3] = [Stream::Science, Stream::Commerce, Stream::Humanities];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Science => "Science",
            Stream::Commerce => "Commerce",
            Stream::Humanities => "Humanities",
        }
    }
}

impl FromStr for Stream {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Science" => Ok(Stream::Science),
            "Commerce" => Ok(Stream::Commerce),
            "Humanities" => Ok(Stream::Humanities),
            other => Err(format!("Unknown stream: {}", other)),
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the follow-up call for a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Pending,
    Called,
    Voicemail,
    IncorrectPhone,
    Failed,
}

impl CallStatus {
    pub const ALL: [CallStatus; 5] = [
        CallStatus::Pending,
        CallStatus::Called,
        CallStatus::Voicemail,
        CallStatus::IncorrectPhone,
        CallStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Called => "called",
            CallStatus::Voicemail => "voicemail",
            CallStatus::IncorrectPhone => "incorrect_phone",
            CallStatus::Failed => "failed",
        }
    }
}

impl FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CallStatus::Pending),
            "called" => Ok(CallStatus::Called),
            "voicemail" => Ok(CallStatus::Voicemail),
            "incorrect_phone" => Ok(CallStatus::IncorrectPhone),
            "failed" => Ok(CallStatus::Failed),
            other => Err(format!("Unknown call status: {}", other)),
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of the outbound automation webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Pending => "pending",
            WebhookStatus::Sent => "sent",
            WebhookStatus::Failed => "failed",
        }
    }
}

impl FromStr for WebhookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WebhookStatus::Pending),
            "sent" => Ok(WebhookStatus::Sent),
            "failed" => Ok(WebhookStatus::Failed),
            other => Err(format!("Unknown webhook status: {}", other)),
        }
    }
}

// ============ Lead Records ============

/// Field-attributed validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A prospective-student record created from a form submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    /// Always exactly 10 digits.
    pub phone_number: String,
    /// Trimmed and lower-cased.
    pub email: String,
    pub stream: Stream,
    pub submitted_at: DateTime<Utc>,
    pub call_status: CallStatus,
    pub call_details: Value,
    pub webhook_status: WebhookStatus,
    pub webhook_attempts: i32,
    pub webhook_error: Option<String>,
    pub webhook_logs: Vec<WebhookLogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Builds a freshly submitted lead with default status fields.
    pub fn from_new(new_lead: NewLead) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new_lead.name,
            phone_number: new_lead.phone_number,
            email: new_lead.email,
            stream: new_lead.stream,
            submitted_at: now,
            call_status: CallStatus::Pending,
            call_details: Value::Object(Default::default()),
            webhook_status: WebhookStatus::Pending,
            webhook_attempts: 0,
            webhook_error: None,
            webhook_logs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// JSON representation including the derived `formattedPhone`.
    pub fn view(&self) -> LeadView<'_> {
        LeadView {
            lead: self,
            formatted_phone: phone::format_for_display(&self.phone_number),
        }
    }
}

/// Serialized form of a [`Lead`] as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadView<'a> {
    #[serde(flatten)]
    pub lead: &'a Lead,
    pub formatted_phone: String,
}

/// A validated, normalized lead ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLead {
    pub name: String,
    pub phone_number: String,
    pub email: String,
    pub stream: Stream,
}

/// Partial update of the call outcome.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub call_status: CallStatus,
    /// Replaces the stored details when present.
    pub call_details: Option<Value>,
}

// ============ Request Models ============

/// Raw lead form body. Every field is optional so missing fields surface as
/// field errors instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSubmission {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub stream: Option<String>,
}

/// Body of `PATCH /api/leads/:id/status`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    #[serde(default)]
    pub call_status: Option<String>,
    #[serde(default)]
    pub call_details: Option<Value>,
}

/// Body of `POST /api/leads/check-phone`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPhoneRequest {
    #[serde(default, deserialize_with = "string_or_number")]
    pub phone_number: Option<String>,
}

/// Query string of `GET /api/leads`. Numbers are parsed leniently.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub stream: Option<String>,
    pub call_status: Option<String>,
    pub search: Option<String>,
}

/// Accepts a JSON string or number (phone numbers often arrive as numbers).
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ============ Query Models ============

/// Filters accepted by [`crate::storage::LeadStore::list`].
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub stream: Option<Stream>,
    pub call_status: Option<CallStatus>,
    /// Case-insensitive substring over name, email and phone.
    pub search: Option<String>,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        if self.stream.is_some_and(|s| s != lead.stream) {
            return false;
        }
        if self.call_status.is_some_and(|c| c != lead.call_status) {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            return lead.name.to_lowercase().contains(&term)
                || lead.email.to_lowercase().contains(&term)
                || lead.phone_number.contains(&term);
        }
        true
    }
}

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Mirrors `parseInt(x) || default`: unparsable or zero values fall back.
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        let parse = |raw: Option<&str>| {
            raw.and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0)
        };
        Self {
            page: parse(page).unwrap_or(1),
            limit: parse(limit)
                .unwrap_or(Self::DEFAULT_LIMIT)
                .min(Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// One page of leads plus the unpaged total.
#[derive(Debug, Clone)]
pub struct LeadPage {
    pub leads: Vec<Lead>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub current: u32,
    pub pages: u64,
    pub total: u64,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: PageRequest, total: u64) -> Self {
        Self {
            current: page.page,
            pages: total.div_ceil(u64::from(page.limit)),
            total,
            limit: page.limit,
        }
    }
}

/// Counts per call status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverview {
    pub total: u64,
    pub pending: u64,
    pub called: u64,
    pub voicemail: u64,
    pub incorrect_phone: u64,
    pub failed: u64,
}

impl StatsOverview {
    pub fn add(&mut self, status: CallStatus, count: u64) {
        self.total += count;
        match status {
            CallStatus::Pending => self.pending += count,
            CallStatus::Called => self.called += count,
            CallStatus::Voicemail => self.voicemail += count,
            CallStatus::IncorrectPhone => self.incorrect_phone += count,
            CallStatus::Failed => self.failed += count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamCount {
    pub stream: Stream,
    pub count: u64,
}

/// Aggregate counts returned by `GET /api/leads/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadStats {
    pub overview: StatsOverview,
    /// Always lists all three streams, zero counts included.
    pub by_stream: Vec<StreamCount>,
}

impl LeadStats {
    pub fn from_counts(
        status_counts: impl IntoIterator<Item = (CallStatus, u64)>,
        stream_counts: impl IntoIterator<Item = (Stream, u64)>,
    ) -> Self {
        let mut overview = StatsOverview::default();
        for (status, count) in status_counts {
            overview.add(status, count);
        }

        let mut by_stream: Vec<StreamCount> = Stream::ALL
            .iter()
            .map(|s| StreamCount {
                stream: *s,
                count: 0,
            })
            .collect();
        for (stream, count) in stream_counts {
            if let Some(entry) = by_stream.iter_mut().find(|e| e.stream == stream) {
                entry.count += count;
            }
        }

        Self {
            overview,
            by_stream,
        }
    }
}

// ============ Response Models ============

/// Immediate acknowledgment of a stored submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAck {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub stream: Stream,
    pub submitted_at: DateTime<Utc>,
}

impl From<&Lead> for SubmissionAck {
    fn from(lead: &Lead) -> Self {
        Self {
            id: lead.id,
            name: lead.name.clone(),
            email: lead.email.clone(),
            stream: lead.stream,
            submitted_at: lead.submitted_at,
        }
    }
}
