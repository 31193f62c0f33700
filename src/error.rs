use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use uuid::Uuid;

use crate::pricing::Phase;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("no free listings left for this period")]
    QuotaExhausted,
    #[error("user {0} not found")]
    InvalidUser(Uuid),
    #[error("pricing configuration unavailable: {reason}")]
    ConfigMissing { reason: String },
    #[error("cannot advance past phase {from}")]
    InvalidTransition { from: Phase },
    #[error("launch phase can no longer be extended (current phase: {phase})")]
    LaunchPhaseClosed { phase: Phase },
    #[error("launch phase end date must lie in the future")]
    InvalidLaunchEnd,
    #[error("unknown or read-only price field: {0}")]
    InvalidPriceField(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidPriceValue { field: String, reason: String },
    #[error("invalid period {month}/{year}")]
    InvalidPeriod { month: u32, year: i32 },
    #[error("storage failure during {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl QuotaError {
    pub fn storage(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| QuotaError::Storage { operation, source }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            QuotaError::QuotaExhausted => StatusCode::PAYMENT_REQUIRED,
            QuotaError::InvalidUser(_) => StatusCode::NOT_FOUND,
            QuotaError::InvalidTransition { .. } | QuotaError::LaunchPhaseClosed { .. } => {
                StatusCode::CONFLICT
            }
            QuotaError::InvalidLaunchEnd
            | QuotaError::InvalidPriceField(_)
            | QuotaError::InvalidPriceValue { .. }
            | QuotaError::InvalidPeriod { .. } => StatusCode::BAD_REQUEST,
            QuotaError::ConfigMissing { .. } | QuotaError::Storage { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for QuotaError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::error!(?self);
        (status, self.to_string()).into_response()
    }
}

pub type QuotaResult<T> = Result<T, QuotaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_maps_to_payment_required() {
        assert_eq!(
            QuotaError::QuotaExhausted.status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            QuotaError::InvalidUser(Uuid::nil()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            QuotaError::InvalidTransition {
                from: Phase::PaidSystem
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            QuotaError::InvalidPriceField("tax_rate".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn storage_errors_keep_operation_context() {
        let err = QuotaError::storage("consume_free_listing")(sqlx::Error::RowNotFound);
        assert!(err.to_string().contains("consume_free_listing"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
