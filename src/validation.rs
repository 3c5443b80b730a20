// Validation utilities module
// Provides custom validation functions for discount and coupon payloads

use regex::Regex;
use rust_decimal::Decimal;
use std::sync::OnceLock;
use validator::ValidationError;

/// Accepted coupon code shape after normalization
const COUPON_CODE_PATTERN: &str = r"^[A-Z0-9][A-Z0-9_-]{2,39}$";

fn coupon_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(COUPON_CODE_PATTERN).expect("coupon code pattern is valid"))
}

/// Trim and upper-case a customer-entered coupon code
pub fn normalize_coupon_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Validates a coupon code: 3-40 characters of A-Z, 0-9, '_' or '-'
/// (case-insensitive, codes are stored upper-cased)
pub fn validate_coupon_code(code: &str) -> Result<(), ValidationError> {
    if coupon_code_regex().is_match(&normalize_coupon_code(code)) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_coupon_code"))
    }
}

/// Validates that a monetary or rate value is strictly positive
pub fn validate_positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        Err(ValidationError::new("must_be_positive"))
    } else {
        Ok(())
    }
}

/// Validates that a monetary value is zero or more
pub fn validate_non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        Err(ValidationError::new("must_be_non_negative"))
    } else {
        Ok(())
    }
}

/// Validates that a rate lies in (0, 1]
pub fn validate_rate(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO || *value > Decimal::ONE {
        Err(ValidationError::new("rate_out_of_range"))
    } else {
        Ok(())
    }
}

/// Validates that an identifier is not blank
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("must_not_be_blank"))
    } else {
        Ok(())
    }
}
