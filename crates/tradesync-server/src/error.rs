//! Errors surfaced at the ingestion boundary

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tradesync_common::EntityKind;

use crate::api::response::ErrorResponse;
use crate::store::StoreError;

/// Why a batch was not accepted
#[derive(Error, Debug)]
pub enum IngestError {
    /// The batch failed shape checks; nothing was touched
    #[error("Invalid {kind} batch: {message}")]
    Validation { kind: EntityKind, message: String },

    /// The unit of work failed and was rolled back
    #[error("Failed to store {kind} batch: {source}")]
    Storage {
        kind: EntityKind,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    pub fn validation(kind: EntityKind, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            message: message.into(),
        }
    }

    pub fn storage(kind: EntityKind, source: StoreError) -> Self {
        Self::Storage { kind, source }
    }

    /// Kind of the batch that failed
    pub fn kind(&self) -> EntityKind {
        match self {
            IngestError::Validation { kind, .. } | IngestError::Storage { kind, .. } => *kind,
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, code) = match &self {
            IngestError::Validation { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            IngestError::Storage { source, .. } => {
                tracing::error!(kind = %kind, error = %source, "Batch rolled back");
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            },
        };

        let error = ErrorResponse::new(code, self.to_string()).with_details(json!({ "kind": kind }));
        (status, Json(error)).into_response()
    }
}
