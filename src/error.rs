//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Settings and schema document errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid setting {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
    #[error("schema load: {0}")]
    Load(String),
}

/// Errors raised by the entity core: schema lookups, value validation, relation access and storage.
#[derive(Error, Debug)]
pub enum OrmError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("unknown column: {entity}.{column}")]
    UnknownColumn { entity: String, column: String },
    #[error("unknown relation: {entity}.{relation}")]
    UnknownRelation { entity: String, relation: String },
    #[error("schema conflict: {0}")]
    SchemaConflict(String),
    #[error("invalid value for {entity}.{column}: {reason}")]
    InvalidValue {
        entity: String,
        column: String,
        reason: String,
    },
    #[error("relation not resolved: {entity}.{relation}")]
    RelationNotResolved { entity: String, relation: String },
    #[error("duplicate key in {table}: {detail}")]
    DuplicateKey { table: String, detail: String },
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("link not found: {entity}.{relation} -> {target}")]
    LinkNotFound {
        entity: String,
        relation: String,
        target: String,
    },
    #[error("not found: {entity} {key}")]
    NotFound { entity: String, key: String },
    #[error("storage call timed out after {0:?}")]
    StorageTimeout(Duration),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl OrmError {
    pub(crate) fn invalid_value(entity: &str, column: &str, reason: impl Into<String>) -> Self {
        OrmError::InvalidValue {
            entity: entity.to_string(),
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown_column(entity: &str, column: &str) -> Self {
        OrmError::UnknownColumn {
            entity: entity.to_string(),
            column: column.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Orm(#[from] OrmError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Orm(e) => match e {
                OrmError::UnknownEntity(_) => (StatusCode::NOT_FOUND, "unknown_entity"),
                OrmError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                OrmError::UnknownColumn { .. } | OrmError::UnknownRelation { .. } => {
                    (StatusCode::BAD_REQUEST, "bad_request")
                }
                OrmError::InvalidValue { .. } | OrmError::ValidationFailed(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "validation_error")
                }
                OrmError::DuplicateKey { .. } => (StatusCode::CONFLICT, "duplicate_key"),
                OrmError::ConstraintViolation(_) => (StatusCode::CONFLICT, "constraint_violation"),
                OrmError::LinkNotFound { .. } => (StatusCode::NOT_FOUND, "link_not_found"),
                OrmError::StorageTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "storage_timeout"),
                OrmError::SchemaConflict(_)
                | OrmError::RelationNotResolved { .. }
                | OrmError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "schema_error"),
                OrmError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
