use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

use crate::errors::AppError;
use crate::models::{LeadSubmission, SubmissionAck};
use crate::notifier::WebhookNotifier;
use crate::storage::LeadStore;
use crate::validation::validate_submission;

/// Accepts lead submissions: validate, persist, acknowledge, then notify the
/// webhook on a tracked background task.
#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn LeadStore>,
    notifier: WebhookNotifier,
    tasks: TaskTracker,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn LeadStore>, notifier: WebhookNotifier) -> Self {
        Self {
            store,
            notifier,
            tasks: TaskTracker::new(),
        }
    }

    /// Stores a valid submission and returns without waiting for the webhook.
    pub async fn submit(&self, input: LeadSubmission) -> Result<SubmissionAck, AppError> {
        let new_lead = validate_submission(&input).map_err(AppError::Validation)?;

        let lead = match self.store.create(new_lead).await {
            Ok(lead) => lead,
            Err(e @ AppError::DuplicateKey { .. }) => {
                tracing::info!("Rejected duplicate phone number submission");
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        tracing::info!("New lead created: {} ({})", lead.id, lead.stream);

        let ack = SubmissionAck::from(&lead);
        let store = Arc::clone(&self.store);
        let notifier = self.notifier.clone();
        self.tasks.spawn(async move {
            notifier.deliver(store.as_ref(), &lead).await;
        });

        Ok(ack)
    }

    /// Stops accepting deliveries and waits up to `timeout` for in-flight ones.
    /// Returns `false` when deliveries were still running at the deadline.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            tracing::info!("Waiting for {} webhook delivery task(s)", pending);
        }

        match tokio::time::timeout(timeout, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    "{} webhook delivery task(s) still running after {}s; abandoning",
                    self.tasks.len(),
                    timeout.as_secs()
                );
                false
            }
        }
    }
}
