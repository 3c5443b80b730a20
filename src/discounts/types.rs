// Domain type definitions for the discount engine
// Shared by the rules, the evaluator and the coupon store

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// How a discount value is interpreted
///
/// Percentage values are rates in (0, 1], so 0.15 means 15% off.
/// Fixed amounts are currency values subtracted from the sale total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Rate applied to the base amount
    Percentage,

    /// Currency amount capped at the base amount
    FixedAmount,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountType::Percentage => write!(f, "percentage"),
            DiscountType::FixedAmount => write!(f, "fixed_amount"),
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed_amount" => Ok(DiscountType::FixedAmount),
            _ => Err(format!("Invalid discount type: {}", s)),
        }
    }
}

/// Customer loyalty classification supplied by the customer subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoyaltyTier {
    Standard,
    Silver,
    Gold,
    Platinum,
    Vip,
}

impl fmt::Display for LoyaltyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoyaltyTier::Standard => write!(f, "STANDARD"),
            LoyaltyTier::Silver => write!(f, "SILVER"),
            LoyaltyTier::Gold => write!(f, "GOLD"),
            LoyaltyTier::Platinum => write!(f, "PLATINUM"),
            LoyaltyTier::Vip => write!(f, "VIP"),
        }
    }
}

impl std::str::FromStr for LoyaltyTier {
    type Err = String;

    /// Tier names are matched case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STANDARD" => Ok(LoyaltyTier::Standard),
            "SILVER" => Ok(LoyaltyTier::Silver),
            "GOLD" => Ok(LoyaltyTier::Gold),
            "PLATINUM" => Ok(LoyaltyTier::Platinum),
            "VIP" => Ok(LoyaltyTier::Vip),
            _ => Err(format!("Invalid loyalty tier: {}", s)),
        }
    }
}

/// Identifies which rule produced a discount result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum DiscountKind {
    #[serde(rename = "CLIENT_TIER")]
    ClientTier,
    #[serde(rename = "MINIMUM_AMOUNT")]
    MinimumAmount,
    #[serde(rename = "SEASONAL")]
    Seasonal,
    #[serde(rename = "COUPON")]
    Coupon,
    /// No rule applied
    #[serde(rename = "NONE")]
    NoDiscount,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::ClientTier => "CLIENT_TIER",
            DiscountKind::MinimumAmount => "MINIMUM_AMOUNT",
            DiscountKind::Seasonal => "SEASONAL",
            DiscountKind::Coupon => "COUPON",
            DiscountKind::NoDiscount => "NONE",
        }
    }
}

impl fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side of the no-stacking split a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleChannel {
    /// Applied without customer action (tier, amount, season)
    Automatic,

    /// Triggered by a customer-entered coupon code
    Coupon,
}

/// How coupon and automatic discounts combine
///
/// Only one discount is ever applied to a sale. The policy decides which rules
/// compete for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionPolicy {
    /// A supplied coupon code excludes every automatic discount, and without
    /// a code coupon rules never compete.
    #[default]
    NoStacking,
}

impl CompositionPolicy {
    /// Whether rules on `channel` take part in an evaluation
    pub fn admits(&self, channel: RuleChannel, coupon_supplied: bool) -> bool {
        match self {
            CompositionPolicy::NoStacking => match channel {
                RuleChannel::Coupon => coupon_supplied,
                RuleChannel::Automatic => !coupon_supplied,
            },
        }
    }

    /// Why a rule on `channel` was left out of an evaluation
    pub fn exclusion_reason(&self, channel: RuleChannel) -> &'static str {
        match (self, channel) {
            (CompositionPolicy::NoStacking, RuleChannel::Automatic) => {
                "coupon code supplied; automatic discounts do not stack with coupons"
            }
            (CompositionPolicy::NoStacking, RuleChannel::Coupon) => "no coupon code supplied",
        }
    }
}
