// Discount Evaluator - Orchestrator
//
// Resolves the sale and customer, runs the rule registry, and commits the
// coupon usage when a coupon wins.

use rust_decimal::Decimal;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::coupons::models::Coupon;
use crate::coupons::repository::CouponRepository;
use crate::discounts::audit::AuditLogger;
use crate::discounts::error::{DResult, DiscountError};
use crate::discounts::metrics::DiscountMetrics;
use crate::discounts::models::DiscountResult;
use crate::discounts::providers::{CustomerProvider, SaleProvider};
use crate::discounts::rules::{RuleContext, RuleRegistry};
use crate::discounts::types::{DiscountKind, LoyaltyTier};

/// Discount Evaluator
///
/// Stateless per request. The rule registry is shared read-only; the coupon
/// usage counter in the repository is the only state an evaluation changes.
#[derive(Clone)]
pub struct DiscountEvaluator {
    registry: Arc<RuleRegistry>,
    sales: Arc<dyn SaleProvider>,
    customers: Arc<dyn CustomerProvider>,
    coupons: Arc<dyn CouponRepository>,
    clock: Arc<dyn Clock>,
    audit_logger: AuditLogger,
    metrics: DiscountMetrics,
    lookup_timeout: Duration,
}

impl DiscountEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<RuleRegistry>,
        sales: Arc<dyn SaleProvider>,
        customers: Arc<dyn CustomerProvider>,
        coupons: Arc<dyn CouponRepository>,
        clock: Arc<dyn Clock>,
        audit_logger: AuditLogger,
        metrics: DiscountMetrics,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            sales,
            customers,
            coupons,
            clock,
            audit_logger,
            metrics,
            lookup_timeout,
        }
    }

    pub fn metrics(&self) -> &DiscountMetrics {
        &self.metrics
    }

    /// Evaluate the best discount for a sale
    ///
    /// Flow:
    /// 1. Resolve the sale total and customer tier in parallel, each bounded by the lookup timeout
    /// 2. Look up the coupon when a code is supplied (read only)
    /// 3. Run every rule and select the winner
    /// 4. If a coupon won, consume one use atomically and settle the deduction
    ///
    /// Any failure before step 4 leaves no trace besides logs and audit records.
    pub async fn apply(
        &self,
        sale_id: &str,
        customer_id: &str,
        coupon_code: Option<&str>,
    ) -> DResult<DiscountResult> {
        let _timer = self.metrics.start_evaluation();
        let evaluation_id = Uuid::new_v4();

        let result = self
            .evaluate(evaluation_id, sale_id, customer_id, coupon_code)
            .await;

        match &result {
            Ok(outcome) => {
                self.metrics.record_outcome(outcome.kind);
                tracing::info!(
                    "Sale {}: {} deducts {} (new total {})",
                    sale_id,
                    outcome.kind,
                    outcome.amount_deducted,
                    outcome.new_sale_total
                );
                self.audit_logger
                    .log_outcome(
                        evaluation_id,
                        sale_id,
                        outcome.kind.as_str(),
                        json!({
                            "customer_id": customer_id,
                            "coupon_code": coupon_code,
                            "amount_deducted": outcome.amount_deducted,
                            "new_sale_total": outcome.new_sale_total,
                        }),
                        &outcome.message,
                    )
                    .await;
            }
            Err(e) => {
                self.metrics.record_failure();
                if matches!(e, DiscountError::CouponInvalid(_)) {
                    self.metrics.record_coupon_rejection();
                }
                self.audit_logger
                    .log_outcome(
                        evaluation_id,
                        sale_id,
                        e.kind(),
                        json!({
                            "customer_id": customer_id,
                            "coupon_code": coupon_code,
                        }),
                        &e.to_string(),
                    )
                    .await;
            }
        }

        result
    }

    async fn evaluate(
        &self,
        evaluation_id: Uuid,
        sale_id: &str,
        customer_id: &str,
        coupon_code: Option<&str>,
    ) -> DResult<DiscountResult> {
        let (sale_total, loyalty_tier) =
            tokio::try_join!(self.lookup_sale(sale_id), self.lookup_customer(customer_id))?;

        let today = self.clock.today();
        let coupon: Option<Coupon> = match coupon_code {
            Some(code) => self.coupons.find_by_code(code).await?,
            None => None,
        };

        let ctx = RuleContext {
            sale_total,
            loyalty_tier,
            coupon: coupon.as_ref(),
            coupon_supplied: coupon_code.is_some(),
            today,
        };
        let outcome = self.registry.evaluate(&ctx);

        for decision in &outcome.decisions {
            self.audit_logger
                .log_rule_decision(evaluation_id, sale_id, decision)
                .await;
        }

        if let Some(rejection) = outcome.coupon_rejection {
            tracing::warn!(
                "Coupon {} rejected for sale {}: {}",
                coupon_code.unwrap_or_default(),
                sale_id,
                rejection
            );
            return Err(DiscountError::CouponInvalid(rejection));
        }

        let Some(winner) = outcome.winner else {
            return Ok(DiscountResult::none(sale_total));
        };

        if winner.kind != DiscountKind::Coupon {
            check_deduction(winner.amount, sale_total)?;
            return Ok(DiscountResult::applied(
                winner.kind,
                winner.amount,
                sale_total,
                winner.message,
            ));
        }

        // The coupon is re-checked by the conditional increment itself; the
        // read above only decided that it should compete.
        let code = coupon_code.unwrap_or_default();
        let settle = move |fresh: &Coupon| -> DResult<Decimal> {
            let amount = fresh.deduction(sale_total);
            check_deduction(amount, sale_total)?;
            Ok(amount)
        };
        let redemption = self.coupons.redeem(code, today, sale_total, &settle).await?;

        Ok(DiscountResult::applied(
            DiscountKind::Coupon,
            redemption.amount_deducted,
            sale_total,
            winner.message,
        ))
    }

    async fn lookup_sale(&self, sale_id: &str) -> DResult<Decimal> {
        let total = self
            .bounded("Sale", sale_id, self.sales.sale_total(sale_id))
            .await?;
        total.ok_or_else(|| {
            self.metrics.record_lookup_failure();
            DiscountError::NotFound {
                resource: "Sale",
                id: sale_id.to_string(),
            }
        })
    }

    async fn lookup_customer(&self, customer_id: &str) -> DResult<Option<LoyaltyTier>> {
        let tier = self
            .bounded("Customer", customer_id, self.customers.loyalty_tier(customer_id))
            .await?;
        tier.ok_or_else(|| {
            self.metrics.record_lookup_failure();
            DiscountError::NotFound {
                resource: "Customer",
                id: customer_id.to_string(),
            }
        })
    }

    /// Run a collaborator lookup under the configured timeout
    async fn bounded<T>(
        &self,
        resource: &'static str,
        id: &str,
        lookup: impl Future<Output = DResult<T>>,
    ) -> DResult<T> {
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(result) => result.map_err(|e| {
                self.metrics.record_lookup_failure();
                e
            }),
            Err(_) => {
                self.metrics.record_lookup_failure();
                tracing::warn!(
                    "{} lookup for {} timed out after {:?}",
                    resource,
                    id,
                    self.lookup_timeout
                );
                Err(DiscountError::LookupTimeout {
                    resource,
                    id: id.to_string(),
                    timeout_ms: self.lookup_timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// A deduction may never be negative or exceed the sale total
fn check_deduction(amount: Decimal, sale_total: Decimal) -> DResult<()> {
    if amount < Decimal::ZERO || amount > sale_total.max(Decimal::ZERO) {
        return Err(DiscountError::CalculationError(format!(
            "deduction {} is outside [0, {}]",
            amount, sale_total
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::DiscountConfig;
    use crate::coupons::models::NewCouponRecord;
    use crate::coupons::repository::InMemoryCouponRepository;
    use crate::discounts::error::CouponRejection;
    use crate::discounts::providers::{InMemoryCustomerProvider, InMemorySaleProvider};
    use crate::discounts::types::DiscountType;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    struct Fixture {
        evaluator: DiscountEvaluator,
        sales: Arc<InMemorySaleProvider>,
        customers: Arc<InMemoryCustomerProvider>,
        coupons: Arc<InMemoryCouponRepository>,
    }

    fn fixture_on(today: NaiveDate) -> Fixture {
        let sales = Arc::new(InMemorySaleProvider::new());
        let customers = Arc::new(InMemoryCustomerProvider::new());
        let coupons = Arc::new(InMemoryCouponRepository::new());
        let evaluator = DiscountEvaluator::new(
            Arc::new(RuleRegistry::from_config(&DiscountConfig::default())),
            sales.clone(),
            customers.clone(),
            coupons.clone(),
            Arc::new(FixedClock(today)),
            AuditLogger::tracing_only(),
            DiscountMetrics::new(),
            Duration::from_millis(200),
        );
        Fixture {
            evaluator,
            sales,
            customers,
            coupons,
        }
    }

    fn fixture() -> Fixture {
        fixture_on(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    fn coupon_record(code: &str, kind: DiscountType, value: Decimal, max_uses: Option<i32>) -> NewCouponRecord {
        NewCouponRecord {
            code: code.to_string(),
            campaign_name: None,
            discount_kind: kind,
            value,
            expiration_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            max_uses,
            minimum_sale_amount: dec!(0),
        }
    }

    #[tokio::test]
    async fn test_platinum_customer() {
        let f = fixture();
        f.sales.insert("S-1", dec!(100)).await;
        f.customers.insert("C-1", Some("PLATINUM")).await;

        let result = f.evaluator.apply("S-1", "C-1", None).await.unwrap();
        assert_eq!(result.kind, DiscountKind::ClientTier);
        assert_eq!(result.amount_deducted, dec!(15.00));
        assert_eq!(result.new_sale_total, dec!(85.00));
    }

    #[tokio::test]
    async fn test_minimum_amount_without_tier() {
        let f = fixture();
        f.sales.insert("S-1", dec!(1200)).await;
        f.customers.insert("C-1", None).await;

        let result = f.evaluator.apply("S-1", "C-1", None).await.unwrap();
        assert_eq!(result.kind, DiscountKind::MinimumAmount);
        assert_eq!(result.amount_deducted, dec!(50.00));
        assert_eq!(result.new_sale_total, dec!(1150.00));
    }

    #[tokio::test]
    async fn test_no_applicable_rule() {
        let f = fixture();
        f.sales.insert("S-1", dec!(40)).await;
        f.customers.insert("C-1", Some("SILVER")).await;

        let result = f.evaluator.apply("S-1", "C-1", None).await.unwrap();
        assert_eq!(result, DiscountResult::none(dec!(40)));
        assert_eq!(f.evaluator.metrics().summary().no_discount, 1);
    }

    #[tokio::test]
    async fn test_seasonal_discount_on_christmas_eve() {
        let f = fixture_on(NaiveDate::from_ymd_opt(2024, 12, 24).unwrap());
        f.sales.insert("S-1", dec!(80)).await;
        f.customers.insert("C-1", None).await;

        let result = f.evaluator.apply("S-1", "C-1", None).await.unwrap();
        assert_eq!(result.kind, DiscountKind::Seasonal);
        assert_eq!(result.amount_deducted, dec!(8.00));
    }

    #[tokio::test]
    async fn test_missing_sale_is_lookup_error() {
        let f = fixture();
        f.customers.insert("C-1", None).await;

        let err = f.evaluator.apply("S-404", "C-1", None).await.unwrap_err();
        assert!(matches!(err, DiscountError::NotFound { resource: "Sale", .. }));
    }

    #[tokio::test]
    async fn test_missing_customer_is_lookup_error() {
        let f = fixture();
        f.sales.insert("S-1", dec!(100)).await;

        let err = f.evaluator.apply("S-1", "C-404", None).await.unwrap_err();
        assert!(matches!(err, DiscountError::NotFound { resource: "Customer", .. }));
    }

    #[tokio::test]
    async fn test_coupon_wins_and_consumes_one_use() {
        let f = fixture();
        f.sales.insert("S-1", dec!(1200)).await;
        f.customers.insert("C-1", Some("PLATINUM")).await;
        f.coupons
            .insert(coupon_record("FIVEOFF", DiscountType::FixedAmount, dec!(5), Some(3)))
            .await
            .unwrap();

        let result = f.evaluator.apply("S-1", "C-1", Some("FIVEOFF")).await.unwrap();
        assert_eq!(result.kind, DiscountKind::Coupon);
        assert_eq!(result.amount_deducted, dec!(5.00));
        assert_eq!(result.new_sale_total, dec!(1195.00));

        let stored = f.coupons.find_by_code("FIVEOFF").await.unwrap().unwrap();
        assert_eq!(stored.uses_consumed, 1);
    }

    #[tokio::test]
    async fn test_expired_coupon_leaves_counter_unchanged() {
        let f = fixture();
        f.sales.insert("S-1", dec!(100)).await;
        f.customers.insert("C-1", None).await;
        let mut record = coupon_record("OLD10", DiscountType::Percentage, dec!(0.10), Some(5));
        record.expiration_date = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        f.coupons.insert(record).await.unwrap();

        let err = f.evaluator.apply("S-1", "C-1", Some("OLD10")).await.unwrap_err();
        assert!(matches!(err, DiscountError::CouponInvalid(CouponRejection::Expired)));

        let stored = f.coupons.find_by_code("OLD10").await.unwrap().unwrap();
        assert_eq!(stored.uses_consumed, 0);
        assert_eq!(f.evaluator.metrics().summary().coupon_rejections, 1);
    }

    #[tokio::test]
    async fn test_unknown_coupon_does_not_fall_back_to_automatic_rules() {
        let f = fixture();
        f.sales.insert("S-1", dec!(100)).await;
        f.customers.insert("C-1", Some("PLATINUM")).await;

        let err = f.evaluator.apply("S-1", "C-1", Some("NOPE")).await.unwrap_err();
        assert!(matches!(err, DiscountError::CouponInvalid(CouponRejection::NotFound)));
    }

    #[tokio::test]
    async fn test_single_use_coupon_under_concurrency() {
        let f = fixture();
        f.sales.insert("S-1", dec!(100)).await;
        f.sales.insert("S-2", dec!(100)).await;
        f.customers.insert("C-1", None).await;
        f.coupons
            .insert(coupon_record("ONCE", DiscountType::Percentage, dec!(0.5), Some(1)))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            f.evaluator.apply("S-1", "C-1", Some("ONCE")),
            f.evaluator.apply("S-2", "C-1", Some("ONCE"))
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(DiscountError::CouponInvalid(CouponRejection::Exhausted))
        )));

        let stored = f.coupons.find_by_code("ONCE").await.unwrap().unwrap();
        assert_eq!(stored.uses_consumed, 1);
    }

    struct SlowSales;

    #[async_trait]
    impl SaleProvider for SlowSales {
        async fn sale_total(&self, _sale_id: &str) -> DResult<Option<Decimal>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(dec!(100)))
        }

        async fn record_discounted_total(&self, _sale_id: &str, _new_total: Decimal) -> DResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lookup_timeout() {
        let customers = Arc::new(InMemoryCustomerProvider::new());
        customers.insert("C-1", None).await;
        let evaluator = DiscountEvaluator::new(
            Arc::new(RuleRegistry::from_config(&DiscountConfig::default())),
            Arc::new(SlowSales),
            customers,
            Arc::new(InMemoryCouponRepository::new()),
            Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())),
            AuditLogger::tracing_only(),
            DiscountMetrics::new(),
            Duration::from_millis(50),
        );

        let err = evaluator.apply("S-1", "C-1", None).await.unwrap_err();
        assert!(matches!(
            err,
            DiscountError::LookupTimeout {
                resource: "Sale",
                timeout_ms: 50,
                ..
            }
        ));
        assert_eq!(evaluator.metrics().summary().lookup_failures, 1);
    }

    #[test]
    fn test_check_deduction_bounds() {
        assert!(check_deduction(dec!(0), dec!(10)).is_ok());
        assert!(check_deduction(dec!(10), dec!(10)).is_ok());
        assert!(check_deduction(dec!(10.01), dec!(10)).is_err());
        assert!(check_deduction(dec!(-1), dec!(10)).is_err());
    }
}
