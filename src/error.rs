use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ports::StoreError;
use crate::services::PaymentError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid checksum")]
    InvalidSignature,

    #[error("Failed to initiate payment")]
    InitiationFailed,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidSignature => StatusCode::BAD_REQUEST,
            AppError::InitiationFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::InvalidSignature => AppError::InvalidSignature,
            PaymentError::MalformedCallback(msg) => AppError::BadRequest(msg),
            PaymentError::InitiationFailed { .. } => AppError::InitiationFailed,
            PaymentError::NotFound(id) => AppError::NotFound(format!("Transaction {} not found", id)),
            PaymentError::Validation(msg) => AppError::Validation(msg),
            e @ PaymentError::AmountMismatch { .. } => AppError::BadRequest(e.to_string()),
            PaymentError::Store(StoreError::Duplicate(id)) => {
                AppError::Internal(format!("Transaction {} already exists", id))
            }
            PaymentError::Store(e) => AppError::DatabaseError(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
