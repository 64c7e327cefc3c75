//! University Lead Generation API Library
//!
//! This library provides the core functionality for the lead-capture API:
//! phone and form validation, lead persistence (Postgres or in-memory),
//! background webhook delivery with retries, rate limiting and HTTP handlers.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `db`: Database connection handle and schema bootstrap.
//! - `db_storage`: Postgres lead store.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `memory_storage`: Process-local lead store.
//! - `models`: Lead records, request and response models.
//! - `notifier`: Webhook transport and retry state machine.
//! - `phone`: Phone number cleaning, normalization and validation.
//! - `rate_limit`: Per-client submission quota.
//! - `routes`: Router assembly and middleware.
//! - `storage`: Lead store trait.
//! - `submission`: Submission orchestration.
//! - `validation`: Form validation rules.
//! - `webhook_models`: Webhook payload and outcome models.

pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod memory_storage;
pub mod models;
pub mod notifier;
pub mod phone;
pub mod rate_limit;
pub mod routes;
pub mod storage;
pub mod submission;
pub mod validation;
pub mod webhook_models;
