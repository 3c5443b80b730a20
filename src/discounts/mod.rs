// Discount Engine Module
//
// Picks the single best discount for a sale among the configured rules:
// customer tier, minimum purchase amount, seasonal promotion and coupons.
// Coupon and automatic discounts never stack.

pub mod audit;
pub mod error;
pub mod evaluator;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod rules;
pub mod strategy;
pub mod types;

pub use audit::{AuditLogger, AuditRecord};
pub use error::{CouponRejection, DResult, DiscountError};
pub use evaluator::DiscountEvaluator;
pub use metrics::{DiscountMetrics, MetricsSummary};
pub use models::{ApplyDiscountRequest, DiscountResult};
pub use providers::{
    CustomerProvider, InMemoryCustomerProvider, InMemorySaleProvider, PgCustomerProvider,
    PgSaleProvider, SaleProvider,
};
pub use rules::{DiscountRule, RuleRegistry, SeasonalWindow};
pub use strategy::DiscountStrategy;
pub use types::{CompositionPolicy, DiscountKind, DiscountType, LoyaltyTier, RuleChannel};
