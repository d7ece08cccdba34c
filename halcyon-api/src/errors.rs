use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::payments::PaymentError;
use crate::virtfusion::VfError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    /// The control plane or payment processor rejected the call. The message is
    /// theirs and is shown to the user as-is.
    #[error("{0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<halcyon::ValidationError> for AppError {
    fn from(err: halcyon::ValidationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<VfError> for AppError {
    fn from(err: VfError) -> Self {
        match err {
            VfError::NotFound => AppError::NotFound,
            VfError::Api { message, .. } => AppError::Upstream(message),
            VfError::Transport(e) => {
                tracing::error!("VirtFusion request failed: {e}");
                AppError::Upstream("Virtualization control plane is unreachable".into())
            }
            VfError::Decode(msg) => AppError::Internal(format!("VirtFusion response: {msg}")),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::CardDeclined(msg) => AppError::PaymentRequired(msg),
            PaymentError::RequiresAction { .. } => {
                AppError::PaymentRequired("Additional authentication is required".into())
            }
            PaymentError::NotCompleted => {
                AppError::PaymentRequired("Payment not completed yet".into())
            }
            PaymentError::InvalidData(msg) => AppError::BadRequest(msg),
            PaymentError::NoCustomer => {
                AppError::BadRequest("No saved payment details for this account".into())
            }
            PaymentError::ProviderApi(msg) => AppError::Upstream(msg),
            PaymentError::Database(e) => AppError::Sqlx(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, self.to_string()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Sqlx(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".into())
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, Json(json!({ "error": msg }))).into_response()
    }
}
