use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::coupons::status_machine::CouponStatus;
use crate::discounts::error::CouponRejection;
use crate::discounts::strategy::{DiscountStrategy, MONEY_SCALE};
use crate::discounts::types::DiscountType;
use crate::validation::{
    validate_coupon_code, validate_non_negative_decimal, validate_not_blank,
    validate_positive_decimal,
};

/// Largest number of codes a single batch request may generate
pub const MAX_BATCH_SIZE: u32 = 1000;

/// Domain model representing a coupon in the database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    #[schema(example = "XMAS-7KQ2M9ZD")]
    pub code: String,
    pub campaign_name: Option<String>,
    pub discount_kind: DiscountType,
    /// Rate in (0, 1] for percentages, currency amount otherwise
    #[schema(value_type = String, example = "0.15")]
    pub value: Decimal,
    pub expiration_date: NaiveDate,
    /// None means unlimited
    pub max_uses: Option<i32>,
    pub uses_consumed: i32,
    #[schema(value_type = String, example = "0.00")]
    pub minimum_sale_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// Lifecycle status on `today`
    pub fn status(&self, today: NaiveDate) -> CouponStatus {
        CouponStatus::derive(self.uses_consumed, self.max_uses, self.expiration_date, today)
    }

    /// Uses left before exhaustion, None when unlimited
    pub fn remaining_uses(&self) -> Option<i32> {
        self.max_uses.map(|max| (max - self.uses_consumed).max(0))
    }

    /// Why this coupon cannot be redeemed against `sale_total` on `today`
    pub fn rejection(&self, today: NaiveDate, sale_total: Decimal) -> Option<CouponRejection> {
        let status = self.status(today);
        if !status.is_redeemable() {
            return Some(match status {
                CouponStatus::Exhausted => CouponRejection::Exhausted,
                _ => CouponRejection::Expired,
            });
        }

        (sale_total < self.minimum_sale_amount).then_some(CouponRejection::BelowMinimum)
    }

    /// Deduction this coupon grants on `sale_total`
    pub fn deduction(&self, sale_total: Decimal) -> Decimal {
        DiscountStrategy::from(self.discount_kind).calculate(sale_total, self.value)
    }
}

/// Fields needed to insert a coupon; id, counters and timestamps are assigned by the store
#[derive(Debug, Clone)]
pub struct NewCouponRecord {
    pub code: String,
    pub campaign_name: Option<String>,
    pub discount_kind: DiscountType,
    pub value: Decimal,
    pub expiration_date: NaiveDate,
    pub max_uses: Option<i32>,
    pub minimum_sale_amount: Decimal,
}

/// Editable coupon fields after merging an update request
#[derive(Debug, Clone)]
pub struct CouponChanges {
    pub discount_kind: DiscountType,
    pub value: Decimal,
    pub expiration_date: NaiveDate,
    pub max_uses: Option<i32>,
    pub minimum_sale_amount: Decimal,
}

/// Percentage coupons carry a rate, which cannot exceed 1; fixed amounts are
/// money and carry at most two decimal places
pub fn validate_kind_and_value(kind: DiscountType, value: Decimal) -> Result<(), ValidationError> {
    match kind {
        DiscountType::Percentage if value > Decimal::ONE => {
            let mut error = ValidationError::new("percentage_rate_above_one");
            error.message = Some("Percentage coupons take a rate in (0, 1]".into());
            Err(error)
        }
        DiscountType::FixedAmount if value.normalize().scale() > MONEY_SCALE => {
            let mut error = ValidationError::new("fixed_amount_precision");
            error.message = Some("Fixed amounts take at most two decimal places".into());
            Err(error)
        }
        _ => Ok(()),
    }
}

fn validate_create_coupon(request: &CreateCouponRequest) -> Result<(), ValidationError> {
    validate_kind_and_value(request.discount_kind, request.value)
}

fn validate_batch_request(request: &BatchCreateCouponsRequest) -> Result<(), ValidationError> {
    validate_kind_and_value(request.discount_kind, request.value)
}

/// Request DTO for creating a single coupon
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_create_coupon"))]
pub struct CreateCouponRequest {
    #[validate(custom = "validate_coupon_code")]
    #[schema(example = "WELCOME10")]
    pub code: String,
    pub discount_kind: DiscountType,
    #[validate(custom = "validate_positive_decimal")]
    #[schema(value_type = String, example = "0.10")]
    pub value: Decimal,
    pub expiration_date: NaiveDate,
    #[validate(range(min = 1, message = "maxUses must be at least 1"))]
    pub max_uses: Option<i32>,
    #[validate(custom = "validate_non_negative_decimal")]
    #[schema(value_type = Option<String>, example = "0.00")]
    pub minimum_sale_amount: Option<Decimal>,
}

/// Request DTO for generating a campaign's worth of coupons
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_batch_request"))]
pub struct BatchCreateCouponsRequest {
    #[validate(
        length(min = 1, max = 100, message = "campaignName must be 1-100 characters"),
        custom = "validate_not_blank"
    )]
    #[schema(example = "Xmas 2024")]
    pub campaign_name: String,
    #[validate(range(min = 1, max = 1000, message = "count must be between 1 and 1000"))]
    pub count: u32,
    pub discount_kind: DiscountType,
    #[validate(custom = "validate_positive_decimal")]
    #[schema(value_type = String, example = "20.00")]
    pub value: Decimal,
    pub expiration_date: NaiveDate,
    #[validate(custom = "validate_non_negative_decimal")]
    #[schema(value_type = Option<String>, example = "100.00")]
    pub minimum_amount: Option<Decimal>,
    /// Defaults to single-use codes
    #[validate(range(min = 1, message = "maxUses must be at least 1"))]
    pub max_uses: Option<i32>,
}

fn validate_update_request(request: &UpdateCouponRequest) -> Result<(), ValidationError> {
    if request.clear_max_uses && request.max_uses.is_some() {
        let mut error = ValidationError::new("max_uses_conflict");
        error.message = Some("maxUses and clearMaxUses cannot be combined".into());
        return Err(error);
    }
    Ok(())
}

/// Request DTO for editing a coupon; omitted fields keep their value
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_update_request"))]
pub struct UpdateCouponRequest {
    pub discount_kind: Option<DiscountType>,
    #[validate(custom = "validate_positive_decimal")]
    #[schema(value_type = Option<String>)]
    pub value: Option<Decimal>,
    pub expiration_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "maxUses must be at least 1"))]
    pub max_uses: Option<i32>,
    /// Make the coupon unlimited; omitted or null `maxUses` keeps the current cap
    #[serde(default)]
    pub clear_max_uses: bool,
    #[validate(custom = "validate_non_negative_decimal")]
    #[schema(value_type = Option<String>)]
    pub minimum_sale_amount: Option<Decimal>,
}

impl UpdateCouponRequest {
    /// Merge the request over the stored coupon
    pub fn merge(&self, existing: &Coupon) -> CouponChanges {
        CouponChanges {
            discount_kind: self.discount_kind.unwrap_or(existing.discount_kind),
            value: self.value.unwrap_or(existing.value),
            expiration_date: self.expiration_date.unwrap_or(existing.expiration_date),
            max_uses: if self.clear_max_uses {
                None
            } else {
                self.max_uses.or(existing.max_uses)
            },
            minimum_sale_amount: self.minimum_sale_amount.unwrap_or(existing.minimum_sale_amount),
        }
    }
}

/// Response DTO for a coupon, including its derived status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub campaign_name: Option<String>,
    pub discount_kind: DiscountType,
    #[schema(value_type = String)]
    pub value: Decimal,
    pub expiration_date: NaiveDate,
    pub max_uses: Option<i32>,
    pub uses_consumed: i32,
    pub remaining_uses: Option<i32>,
    #[schema(value_type = String)]
    pub minimum_sale_amount: Decimal,
    pub status: CouponStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CouponResponse {
    pub fn from_coupon(coupon: Coupon, today: NaiveDate) -> Self {
        let status = coupon.status(today);
        let remaining_uses = coupon.remaining_uses();
        Self {
            id: coupon.id,
            code: coupon.code,
            campaign_name: coupon.campaign_name,
            discount_kind: coupon.discount_kind,
            value: coupon.value,
            expiration_date: coupon.expiration_date,
            max_uses: coupon.max_uses,
            uses_consumed: coupon.uses_consumed,
            remaining_uses,
            minimum_sale_amount: coupon.minimum_sale_amount,
            status,
            created_at: coupon.created_at,
            updated_at: coupon.updated_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Coupon with sensible defaults for tests
    pub fn coupon(code: &str, kind: DiscountType, value: Decimal) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: code.to_string(),
            campaign_name: None,
            discount_kind: kind,
            value,
            expiration_date: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap(),
            max_uses: Some(1),
            uses_consumed: 0,
            minimum_sale_amount: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
