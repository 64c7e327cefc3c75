use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::DuplicatePhonePolicy;
use crate::errors::AppError;
use crate::models::{
    Lead, LeadFilter, LeadPage, LeadStats, NewLead, PageRequest, StatusUpdate, WebhookStatus,
};
use crate::storage::{lead_not_found, LeadStore};
use crate::webhook_models::WebhookLogEntry;

/// Process-local lead store.
///
/// Uniqueness is checked and the lead inserted under a single write lock, so
/// the duplicate policy holds under concurrent submissions.
pub struct MemoryLeadStore {
    leads: RwLock<HashMap<Uuid, Lead>>,
    policy: DuplicatePhonePolicy,
}

impl MemoryLeadStore {
    pub fn new(policy: DuplicatePhonePolicy) -> Self {
        Self {
            leads: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub async fn len(&self) -> usize {
        self.leads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.leads.read().await.is_empty()
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn create(&self, lead: NewLead) -> Result<Lead, AppError> {
        lead.check().map_err(AppError::SchemaValidation)?;

        let mut leads = self.leads.write().await;
        if self.policy == DuplicatePhonePolicy::Reject
            && leads.values().any(|l| l.phone_number == lead.phone_number)
        {
            return Err(AppError::DuplicateKey {
                field: "phoneNumber".to_string(),
            });
        }

        let lead = Lead::from_new(lead);
        leads.insert(lead.id, lead.clone());
        Ok(lead)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Lead, AppError> {
        self.leads
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| lead_not_found(id))
    }

    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<Lead, AppError> {
        let mut leads = self.leads.write().await;
        let lead = leads.get_mut(&id).ok_or_else(|| lead_not_found(id))?;

        lead.call_status = update.call_status;
        if let Some(details) = update.call_details {
            lead.call_details = details;
        }
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    async fn phone_exists(&self, phone_number: &str) -> Result<bool, AppError> {
        Ok(self
            .leads
            .read()
            .await
            .values()
            .any(|l| l.phone_number == phone_number))
    }

    async fn list(&self, filter: &LeadFilter, page: PageRequest) -> Result<LeadPage, AppError> {
        let leads = self.leads.read().await;
        let mut matching: Vec<&Lead> = leads.values().filter(|l| filter.matches(l)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let leads = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok(LeadPage { leads, total })
    }

    async fn aggregate_stats(&self) -> Result<LeadStats, AppError> {
        let leads = self.leads.read().await;
        Ok(LeadStats::from_counts(
            leads.values().map(|l| (l.call_status, 1)),
            leads.values().map(|l| (l.stream, 1)),
        ))
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.leads
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| lead_not_found(id))
    }

    async fn record_webhook_outcome(
        &self,
        id: Uuid,
        entry: WebhookLogEntry,
    ) -> Result<(), AppError> {
        let mut leads = self.leads.write().await;
        let lead = leads.get_mut(&id).ok_or_else(|| lead_not_found(id))?;

        lead.webhook_status = if entry.success {
            WebhookStatus::Sent
        } else {
            WebhookStatus::Failed
        };
        lead.webhook_attempts = lead
            .webhook_attempts
            .saturating_add(i32::try_from(entry.attempts).unwrap_or(i32::MAX));
        lead.webhook_error = entry.error.clone();
        lead.webhook_logs.push(entry);
        lead.updated_at = Utc::now();
        Ok(())
    }
}
