//! Lead persistence abstraction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Lead, LeadFilter, LeadPage, LeadStats, NewLead, PageRequest, StatusUpdate};
use crate::webhook_models::WebhookLogEntry;

/// Owns every lead record. Mutations are whole-field updates keyed by id;
/// concurrent writes to the same lead are last-write-wins.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Persists a new lead with default status fields.
    ///
    /// Fails with `SchemaValidation` when the record breaks a stored invariant and
    /// with `DuplicateKey` when phone uniqueness is enforced and violated.
    async fn create(&self, lead: NewLead) -> Result<Lead, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Lead, AppError>;

    /// Sets the call outcome; call details are kept when the update carries none.
    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<Lead, AppError>;

    /// Non-authoritative existence check on a cleaned phone number.
    async fn phone_exists(&self, phone_number: &str) -> Result<bool, AppError>;

    /// Newest first, with the unpaged total.
    async fn list(&self, filter: &LeadFilter, page: PageRequest) -> Result<LeadPage, AppError>;

    async fn aggregate_stats(&self) -> Result<LeadStats, AppError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppError>;

    /// Applies a webhook outcome: status, accumulated attempts, last error and
    /// an appended log entry.
    async fn record_webhook_outcome(&self, id: Uuid, entry: WebhookLogEntry)
        -> Result<(), AppError>;
}

pub(crate) fn lead_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Lead {} not found", id))
}
