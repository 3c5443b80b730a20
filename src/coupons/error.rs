use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::discounts::error::DiscountError;
use crate::error::ErrorResponse;

/// Error types for coupon administration
#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Coupon {0} not found")]
    NotFound(Uuid),

    #[error("Coupon code already exists: {0}")]
    DuplicateCode(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result type alias for coupon administration
pub type CouponResult<T> = Result<T, CouponError>;

impl From<validator::ValidationErrors> for CouponError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CouponError::ValidationError(errors.to_string())
    }
}

impl From<CouponError> for DiscountError {
    fn from(err: CouponError) -> Self {
        match err {
            CouponError::DatabaseError(e) => DiscountError::DatabaseError(e),
            other => DiscountError::CalculationError(other.to_string()),
        }
    }
}

impl IntoResponse for CouponError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            CouponError::DatabaseError(e) => {
                tracing::error!("Database error in coupon administration: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            CouponError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            CouponError::DuplicateCode(_) => {
                tracing::warn!("{}", self);
                (StatusCode::CONFLICT, "CONFLICT", self.to_string())
            }
            CouponError::Conflict(_) => {
                tracing::warn!("{}", self);
                (StatusCode::CONFLICT, "CONFLICT", self.to_string())
            }
            CouponError::ValidationError(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", self.to_string())
            }
        };

        ErrorResponse::new(kind, message).into_response_with(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(CouponError::NotFound(id).into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            CouponError::DuplicateCode("X".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CouponError::ValidationError("bad".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CouponError::DatabaseError(sqlx::Error::PoolClosed).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_database_error_converts_for_evaluator() {
        let err: DiscountError = CouponError::DatabaseError(sqlx::Error::PoolClosed).into();
        assert!(matches!(err, DiscountError::DatabaseError(_)));
    }
}
