// Error types for the discount engine
// Every failure of an evaluation ends up in one of three response kinds

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use thiserror::Error;

use crate::error::ErrorResponse;

/// Response kind for missing or malformed input and failed lookups
pub const KIND_DATA_ERROR: &str = "ERROR_DATOS";
/// Response kind for any coupon that cannot be redeemed
pub const KIND_COUPON_ERROR: &str = "ERROR_CUPON";
/// Response kind for everything else
pub const KIND_APPLICATION_ERROR: &str = "ERROR_APLICACION";

/// Why a coupon cannot be redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponRejection {
    NotFound,
    Expired,
    /// Also reported when a concurrent redemption took the last use
    Exhausted,
    BelowMinimum,
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouponRejection::NotFound => write!(f, "not found"),
            CouponRejection::Expired => write!(f, "expired"),
            CouponRejection::Exhausted => write!(f, "exhausted"),
            CouponRejection::BelowMinimum => write!(f, "below minimum"),
        }
    }
}

/// Main error type for discount evaluation
#[derive(Debug, Error)]
pub enum DiscountError {
    /// Required request fields are missing or malformed
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// The sale or customer does not exist in its owning subsystem
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    /// The owning subsystem did not answer in time
    #[error("Lookup of {resource} {id} timed out after {timeout_ms} ms")]
    LookupTimeout {
        resource: &'static str,
        id: String,
        timeout_ms: u64,
    },

    /// Coupon missing, expired, exhausted or below its minimum sale amount
    #[error("Invalid coupon: {0}")]
    CouponInvalid(CouponRejection),

    /// Rule configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Calculation produced an invalid result
    #[error("Calculation error: {0}")]
    CalculationError(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Result type alias for discount operations
pub type DResult<T> = Result<T, DiscountError>;

impl DiscountError {
    /// Response kind reported to the caller
    pub fn kind(&self) -> &'static str {
        match self {
            DiscountError::ValidationError(_)
            | DiscountError::NotFound { .. }
            | DiscountError::LookupTimeout { .. } => KIND_DATA_ERROR,
            DiscountError::CouponInvalid(_) => KIND_COUPON_ERROR,
            DiscountError::InvalidConfiguration(_)
            | DiscountError::CalculationError(_)
            | DiscountError::DatabaseError(_) => KIND_APPLICATION_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for DiscountError {
    fn from(err: validator::ValidationErrors) -> Self {
        DiscountError::ValidationError(err.to_string())
    }
}

impl IntoResponse for DiscountError {
    fn into_response(self) -> Response {
        let message = match &self {
            DiscountError::DatabaseError(e) => {
                // Driver details stay in the logs
                tracing::error!("Database error during discount evaluation: {}", e);
                "A database error occurred".to_string()
            }
            DiscountError::InvalidConfiguration(_) | DiscountError::CalculationError(_) => {
                tracing::error!("Discount evaluation failed: {}", self);
                self.to_string()
            }
            _ => {
                tracing::debug!("Discount request rejected: {}", self);
                self.to_string()
            }
        };

        ErrorResponse::new(self.kind(), message).into_response_with(StatusCode::BAD_REQUEST)
    }
}
