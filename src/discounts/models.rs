use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::discounts::strategy::MONEY_SCALE;
use crate::discounts::types::DiscountKind;
use crate::validation::{normalize_coupon_code, validate_not_blank};

/// Request DTO for evaluating the discount of a sale
///
/// Identifiers are optional at the type level so a missing field is reported
/// as a validation failure instead of a JSON rejection.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyDiscountRequest {
    #[validate(required(message = "saleId is required"), custom = "validate_not_blank")]
    #[schema(example = "S-1001")]
    pub sale_id: Option<String>,

    #[validate(required(message = "customerId is required"), custom = "validate_not_blank")]
    #[schema(example = "C-42")]
    pub customer_id: Option<String>,

    /// Blank codes are treated as no code
    #[schema(example = "WELCOME10")]
    pub coupon_code: Option<String>,
}

impl ApplyDiscountRequest {
    /// Upper-cased coupon code, None when absent or blank
    pub fn normalized_coupon_code(&self) -> Option<String> {
        self.coupon_code
            .as_deref()
            .map(normalize_coupon_code)
            .filter(|code| !code.is_empty())
    }
}

/// Outcome of a discount evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscountResult {
    pub kind: DiscountKind,
    #[schema(value_type = String, example = "15.00")]
    pub amount_deducted: Decimal,
    #[schema(value_type = String, example = "85.00")]
    pub new_sale_total: Decimal,
    #[schema(example = "PLATINUM customer discount of 15%")]
    pub message: String,
}

impl DiscountResult {
    /// A discount of `amount_deducted` taken off `sale_total`
    pub fn applied(
        kind: DiscountKind,
        amount_deducted: Decimal,
        sale_total: Decimal,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            amount_deducted: money(amount_deducted),
            new_sale_total: money(sale_total - amount_deducted),
            message: message.into(),
        }
    }

    /// No rule applied; the total is unchanged
    pub fn none(sale_total: Decimal) -> Self {
        Self {
            kind: DiscountKind::NoDiscount,
            amount_deducted: money(Decimal::ZERO),
            new_sale_total: money(sale_total),
            message: "No discount applicable".to_string(),
        }
    }
}

/// Present amounts with cent precision
fn money(amount: Decimal) -> Decimal {
    let mut amount = amount;
    if amount.scale() < MONEY_SCALE {
        amount.rescale(MONEY_SCALE);
    }
    amount
}
