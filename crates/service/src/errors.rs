use std::fmt;

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::context::CancelCause;

/// Classification every store failure falls into. Callers branch on this,
/// not on the concrete variant payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Duplicate,
    NotFound,
    Cancelled,
    Backend,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Backend => "backend",
        };
        f.write_str(s)
    }
}

/// Errors returned by every store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
    #[error("operation aborted: {0}")]
    Cancelled(CancelCause),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }

    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn duplicate(entity: &'static str, key: impl Into<String>) -> Self {
        Self::Duplicate { entity, key: key.into() }
    }

    /// Attribute a unique violation raised by the database to `entity`.
    /// Other errors pass through unchanged.
    pub(crate) fn for_entity(self, entity: &'static str, key: &str) -> Self {
        match self {
            StoreError::Duplicate { .. } => Self::duplicate(entity, key),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::Duplicate { .. } => ErrorKind::Duplicate,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Cancelled(_) => ErrorKind::Cancelled,
            StoreError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 2001,
            ErrorKind::Duplicate => 2002,
            ErrorKind::NotFound => 2003,
            ErrorKind::Cancelled => 2101,
            ErrorKind::Backend => 2200,
        }
    }

    /// Whether repeating the call with a fresh context may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Cancelled | ErrorKind::Backend)
    }
}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Duplicate { entity: "record", key: detail },
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

impl From<models::errors::ModelError> for StoreError {
    fn from(e: models::errors::ModelError) -> Self {
        match e {
            models::errors::ModelError::Validation(msg) => StoreError::Validation(msg),
            models::errors::ModelError::Db(msg) => StoreError::Backend(msg),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self { StoreError::Backend(format!("serialization: {e}")) }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self { StoreError::Backend(format!("io: {e}")) }
}

pub type StoreResult<T> = Result<T, StoreError>;
