use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::Database;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    CallStatus, Lead, LeadFilter, LeadPage, LeadStats, NewLead, PageRequest, StatusUpdate, Stream,
};
use crate::storage::{lead_not_found, LeadStore};
use crate::webhook_models::WebhookLogEntry;

const LEAD_COLUMNS: &str = "id, name, phone_number, email, stream, submitted_at, call_status, \
     call_details, webhook_status, webhook_attempts, webhook_error, webhook_logs, \
     created_at, updated_at";

/// Raw `leads` row; enum columns are decoded and checked in `TryFrom`.
#[derive(Debug, FromRow)]
struct LeadRow {
    id: Uuid,
    name: String,
    phone_number: String,
    email: String,
    stream: String,
    submitted_at: DateTime<Utc>,
    call_status: String,
    call_details: Value,
    webhook_status: String,
    webhook_attempts: i32,
    webhook_error: Option<String>,
    webhook_logs: Json<Vec<WebhookLogEntry>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = AppError;

    fn try_from(row: LeadRow) -> Result<Self, Self::Error> {
        let corrupt = |e: String| AppError::InternalError(format!("lead {}: {}", row.id, e));
        Ok(Lead {
            stream: row.stream.parse().map_err(corrupt)?,
            call_status: row.call_status.parse().map_err(corrupt)?,
            webhook_status: row.webhook_status.parse().map_err(corrupt)?,
            id: row.id,
            name: row.name,
            phone_number: row.phone_number,
            email: row.email,
            submitted_at: row.submitted_at,
            call_details: row.call_details,
            webhook_attempts: row.webhook_attempts,
            webhook_error: row.webhook_error,
            webhook_logs: row.webhook_logs.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed lead store.
pub struct PgLeadStore {
    db: Arc<Database>,
}

impl PgLeadStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn pool(&self) -> Result<PgPool, AppError> {
        self.db.connect().await
    }
}

/// Maps constraint violations to domain errors; everything else stays a database error.
fn map_write_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return AppError::DuplicateKey {
                field: "phoneNumber".to_string(),
            };
        }
        if db_err.is_check_violation() {
            return AppError::SchemaValidation(vec![crate::models::FieldError::new(
                db_err.constraint().unwrap_or("lead"),
                db_err.message().to_string(),
            )]);
        }
    }
    AppError::DatabaseError(err)
}

/// Escapes LIKE metacharacters so search terms match literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &LeadFilter) {
    qb.push(" WHERE TRUE");
    if let Some(stream) = filter.stream {
        qb.push(" AND stream = ").push_bind(stream.as_str());
    }
    if let Some(status) = filter.call_status {
        qb.push(" AND call_status = ").push_bind(status.as_str());
    }
    if let Some(term) = filter.search.as_deref().filter(|t| !t.is_empty()) {
        let pattern = like_pattern(term);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR phone_number ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn create(&self, lead: NewLead) -> Result<Lead, AppError> {
        lead.check().map_err(AppError::SchemaValidation)?;
        let pool = self.pool().await?;

        let row = sqlx::query_as::<_, LeadRow>(&format!(
            r#"
            INSERT INTO leads (id, name, phone_number, email, stream, submitted_at)
            VALUES ($1, $2, $3, $4, $5, now())
            RETURNING {}
            "#,
            LEAD_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&lead.name)
        .bind(&lead.phone_number)
        .bind(&lead.email)
        .bind(lead.stream.as_str())
        .fetch_one(&pool)
        .await
        .map_err(map_write_error)?;

        tracing::debug!("Inserted lead {}", row.id);
        Lead::try_from(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Lead, AppError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {} FROM leads WHERE id = $1",
            LEAD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&pool)
        .await
        .context("loading lead")?
        .ok_or_else(|| lead_not_found(id))?;

        Lead::try_from(row)
    }

    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<Lead, AppError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, LeadRow>(&format!(
            r#"
            UPDATE leads
            SET call_status = $2,
                call_details = COALESCE($3, call_details),
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            LEAD_COLUMNS
        ))
        .bind(id)
        .bind(update.call_status.as_str())
        .bind(update.call_details)
        .fetch_optional(&pool)
        .await
        .map_err(map_write_error)?
        .ok_or_else(|| lead_not_found(id))?;

        Lead::try_from(row)
    }

    async fn phone_exists(&self, phone_number: &str) -> Result<bool, AppError> {
        let pool = self.pool().await?;
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM leads WHERE phone_number = $1)",
        )
        .bind(phone_number)
        .fetch_one(&pool)
        .await
        .context("checking phone number")?;

        Ok(exists)
    }

    async fn list(&self, filter: &LeadFilter, page: PageRequest) -> Result<LeadPage, AppError> {
        let pool = self.pool().await?;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM leads");
        push_filters(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&pool)
            .await
            .context("counting leads")?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM leads", LEAD_COLUMNS));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        let rows: Vec<LeadRow> = qb
            .build_query_as::<LeadRow>()
            .fetch_all(&pool)
            .await
            .context("listing leads")?;

        let leads = rows
            .into_iter()
            .map(Lead::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LeadPage {
            leads,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn aggregate_stats(&self) -> Result<LeadStats, AppError> {
        let pool = self.pool().await?;

        let by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT call_status, COUNT(*) FROM leads GROUP BY call_status",
        )
        .fetch_all(&pool)
        .await
        .context("counting leads by call status")?;

        let by_stream: Vec<(String, i64)> =
            sqlx::query_as("SELECT stream, COUNT(*) FROM leads GROUP BY stream")
                .fetch_all(&pool)
                .await
                .context("counting leads by stream")?;

        let status_counts = by_status.into_iter().filter_map(|(status, count)| {
            let status = status.parse::<CallStatus>().ok()?;
            Some((status, u64::try_from(count).unwrap_or_default()))
        });
        let stream_counts = by_stream.into_iter().filter_map(|(stream, count)| {
            let stream = stream.parse::<Stream>().ok()?;
            Some((stream, u64::try_from(count).unwrap_or_default()))
        });

        Ok(LeadStats::from_counts(status_counts, stream_counts))
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&pool)
            .await
            .context("deleting lead")?;

        if result.rows_affected() == 0 {
            return Err(lead_not_found(id));
        }
        Ok(())
    }

    async fn record_webhook_outcome(
        &self,
        id: Uuid,
        entry: WebhookLogEntry,
    ) -> Result<(), AppError> {
        let pool = self.pool().await?;
        let status = if entry.success { "sent" } else { "failed" };
        let attempts = i32::try_from(entry.attempts).unwrap_or(i32::MAX);

        let result = sqlx::query(
            r#"
            UPDATE leads
            SET webhook_status = $2,
                webhook_attempts = webhook_attempts + $3,
                webhook_error = $4,
                webhook_logs = webhook_logs || jsonb_build_array($5::jsonb),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(attempts)
        .bind(entry.error.as_deref())
        .bind(Json(&entry))
        .execute(&pool)
        .await
        .context("recording webhook outcome")?;

        if result.rows_affected() == 0 {
            return Err(lead_not_found(id));
        }
        Ok(())
    }
}
