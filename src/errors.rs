use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use std::time::Duration;

use crate::models::FieldError;

/// Message returned when a phone number is already registered.
pub const DUPLICATE_PHONE_MESSAGE: &str =
    "This phone number is already registered. We will contact you soon!";

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Submitted fields failed the form rules.
    Validation(Vec<FieldError>),
    /// A record reached the store without satisfying the stored invariants.
    SchemaValidation(Vec<FieldError>),
    /// Malformed request (unparsable body, bad id, bad filter).
    BadRequest(String),
    /// A unique field already holds this value.
    DuplicateKey {
        /// The conflicting field, in API naming (e.g. `phoneNumber`).
        field: String,
    },
    /// Resource not found error.
    NotFound(String),
    /// Client exceeded its request quota.
    RateLimited {
        message: String,
        /// Time until the current window resets.
        retry_after: Duration,
        /// Length of the quota window.
        window: Duration,
    },
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(errors) => {
                write!(f, "Validation failed: {}", join_field_errors(errors))
            }
            AppError::SchemaValidation(errors) => {
                write!(f, "Schema validation failed: {}", join_field_errors(errors))
            }
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::DuplicateKey { field } => write!(f, "Duplicate key: {}", field),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::RateLimited { message, .. } => write!(f, "Rate limited: {}", message),
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} ({})", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders a window length the way rate-limit messages state it ("1 hour", "15 minutes").
pub fn describe_window(window: Duration) -> String {
    let secs = window.as_secs();
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    };
    if secs >= 3600 && secs % 3600 == 0 {
        plural(secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        plural(secs / 60, "minute")
    } else {
        plural(secs, "second")
    }
}

impl AppError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::SchemaValidation(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::DuplicateKey { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::DatabaseError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::WithContext { source, .. } => source.status_code(),
        }
    }
}

impl IntoResponse for AppError {
    /// Maps each variant to a status code and the uniform
    /// `{success:false, message, errors}` body. Internal details are logged,
    /// never returned.
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            AppError::Validation(errors) => {
                tracing::info!("Validation errors: {:?}", errors);
                failure(status, "Validation failed", errors)
            }
            AppError::SchemaValidation(errors) => {
                tracing::warn!("Record rejected at persistence boundary: {:?}", errors);
                failure(status, "Validation failed", errors)
            }
            AppError::BadRequest(msg) => failure(status, &msg, Vec::new()),
            AppError::DuplicateKey { field } => {
                let message = if field == "phoneNumber" {
                    DUPLICATE_PHONE_MESSAGE.to_string()
                } else {
                    format!("A record with this {} already exists", field)
                };
                failure(status, &message, Vec::new())
            }
            AppError::NotFound(msg) => failure(status, &msg, Vec::new()),
            AppError::RateLimited {
                message,
                retry_after,
                window,
            } => {
                let body = Json(json!({
                    "success": false,
                    "message": message,
                    "errors": [],
                    "retryAfter": describe_window(window),
                    "retryAfterSeconds": retry_after.as_secs().max(1),
                }));
                let mut response = (status, body).into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string())
                {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                failure(status, "Internal Server Error", Vec::new())
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                failure(status, "Internal Server Error", Vec::new())
            }
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
                source.into_response()
            }
        }
    }
}

fn failure(status: StatusCode, message: &str, errors: Vec<FieldError>) -> Response {
    let body = Json(json!({
        "success": false,
        "message": message,
        "errors": errors,
    }));
    (status, body).into_response()
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }
}
