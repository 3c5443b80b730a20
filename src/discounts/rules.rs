// Discount rules
//
// Each rule decides whether it applies to a sale and how much it deducts.
// The registry holds the fixed list of rules built at startup and picks the
// single winning discount for an evaluation.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::config::DiscountConfig;
use crate::coupons::models::Coupon;
use crate::discounts::error::{CouponRejection, DResult, DiscountError};
use crate::discounts::strategy::DiscountStrategy;
use crate::discounts::types::{CompositionPolicy, DiscountKind, LoyaltyTier, RuleChannel};

/// Inputs a rule is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub sale_total: Decimal,
    pub loyalty_tier: Option<LoyaltyTier>,
    /// Coupon looked up for the supplied code, if one exists
    pub coupon: Option<&'a Coupon>,
    pub coupon_supplied: bool,
    pub today: NaiveDate,
}

/// Outcome of a rule's applicability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicability {
    Applicable,
    NotApplicable(String),
    /// The supplied coupon cannot be redeemed; fails the whole evaluation
    CouponRejected(CouponRejection),
}

impl Applicability {
    pub fn is_applicable(&self) -> bool {
        matches!(self, Applicability::Applicable)
    }
}

/// Discounts given to PLATINUM and VIP customers
#[derive(Debug, Clone)]
pub struct ClientTierRule {
    pub platinum_rate: Decimal,
    pub vip_rate: Decimal,
    pub priority: i32,
}

impl ClientTierRule {
    fn rate_for(&self, tier: Option<LoyaltyTier>) -> Option<Decimal> {
        match tier? {
            LoyaltyTier::Platinum => Some(self.platinum_rate),
            LoyaltyTier::Vip => Some(self.vip_rate),
            _ => None,
        }
    }

    fn is_applicable(&self, ctx: &RuleContext<'_>) -> Applicability {
        match (ctx.loyalty_tier, self.rate_for(ctx.loyalty_tier)) {
            (_, Some(_)) => Applicability::Applicable,
            (Some(tier), None) => {
                Applicability::NotApplicable(format!("tier {} has no tier discount", tier))
            }
            (None, None) => Applicability::NotApplicable("customer has no loyalty tier".into()),
        }
    }

    fn apply(&self, ctx: &RuleContext<'_>) -> Decimal {
        self.rate_for(ctx.loyalty_tier)
            .map(|rate| DiscountStrategy::Percentage.calculate(ctx.sale_total, rate))
            .unwrap_or(Decimal::ZERO)
    }

    fn describe(&self, ctx: &RuleContext<'_>) -> String {
        let rate = self.rate_for(ctx.loyalty_tier).unwrap_or(Decimal::ZERO);
        match ctx.loyalty_tier {
            Some(tier) => format!("{} customer discount of {}%", tier, percent(rate)),
            None => "Customer tier discount".to_string(),
        }
    }
}

/// Fixed deduction once the sale total reaches a threshold
#[derive(Debug, Clone)]
pub struct MinimumAmountRule {
    pub threshold: Decimal,
    pub amount: Decimal,
    pub priority: i32,
}

impl MinimumAmountRule {
    fn is_applicable(&self, ctx: &RuleContext<'_>) -> Applicability {
        if ctx.sale_total >= self.threshold {
            Applicability::Applicable
        } else {
            Applicability::NotApplicable(format!(
                "sale total {} is below {}",
                ctx.sale_total, self.threshold
            ))
        }
    }

    fn apply(&self, ctx: &RuleContext<'_>) -> Decimal {
        DiscountStrategy::FixedAmount.calculate(ctx.sale_total, self.amount)
    }

    fn describe(&self) -> String {
        format!(
            "Purchase of {} or more: {} off",
            self.threshold.normalize(),
            self.amount.normalize()
        )
    }
}

/// Month-day range, inclusive at both ends
///
/// A window whose end comes before its start wraps over the new year,
/// so `12-28..01-05` covers the last days of December and the first of January.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonalWindow {
    start: (u32, u32),
    end: (u32, u32),
}

impl SeasonalWindow {
    pub fn new(start: (u32, u32), end: (u32, u32)) -> DResult<Self> {
        for (month, day) in [start, end] {
            // 2000 is a leap year, so 02-29 is accepted
            if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
                return Err(DiscountError::InvalidConfiguration(format!(
                    "invalid month-day {:02}-{:02} in seasonal window",
                    month, day
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let md = (date.month(), date.day());
        if self.start <= self.end {
            self.start <= md && md <= self.end
        } else {
            md >= self.start || md <= self.end
        }
    }
}

impl Default for SeasonalWindow {
    /// December 20th to 25th
    fn default() -> Self {
        Self {
            start: (12, 20),
            end: (12, 25),
        }
    }
}

impl fmt::Display for SeasonalWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}-{:02}..{:02}-{:02}",
            self.start.0, self.start.1, self.end.0, self.end.1
        )
    }
}

/// Parse a single "MM-DD" bound
pub fn parse_month_day(value: &str) -> DResult<(u32, u32)> {
    let invalid = || {
        DiscountError::InvalidConfiguration(format!(
            "expected a month-day like 12-20, got '{}'",
            value
        ))
    };

    let (month, day) = value.trim().split_once('-').ok_or_else(invalid)?;
    let month = u32::from_str(month).map_err(|_| invalid())?;
    let day = u32::from_str(day).map_err(|_| invalid())?;
    Ok((month, day))
}

/// Percentage off during the promotional window
#[derive(Debug, Clone)]
pub struct SeasonalRule {
    pub window: SeasonalWindow,
    pub rate: Decimal,
    pub priority: i32,
}

impl SeasonalRule {
    fn is_applicable(&self, ctx: &RuleContext<'_>) -> Applicability {
        if self.window.contains(ctx.today) {
            Applicability::Applicable
        } else {
            Applicability::NotApplicable(format!(
                "{} is outside the seasonal window {}",
                ctx.today, self.window
            ))
        }
    }

    fn apply(&self, ctx: &RuleContext<'_>) -> Decimal {
        DiscountStrategy::Percentage.calculate(ctx.sale_total, self.rate)
    }

    fn describe(&self) -> String {
        format!("Seasonal promotion: {}% off", percent(self.rate))
    }
}

/// Discount granted by a customer-entered coupon code
#[derive(Debug, Clone)]
pub struct CouponRule {
    pub priority: i32,
}

impl CouponRule {
    fn is_applicable(&self, ctx: &RuleContext<'_>) -> Applicability {
        match ctx.coupon {
            None => Applicability::CouponRejected(CouponRejection::NotFound),
            Some(coupon) => match coupon.rejection(ctx.today, ctx.sale_total) {
                Some(reason) => Applicability::CouponRejected(reason),
                None => Applicability::Applicable,
            },
        }
    }

    fn apply(&self, ctx: &RuleContext<'_>) -> Decimal {
        ctx.coupon
            .map(|coupon| coupon.deduction(ctx.sale_total))
            .unwrap_or(Decimal::ZERO)
    }

    fn describe(&self, ctx: &RuleContext<'_>) -> String {
        match ctx.coupon {
            Some(coupon) => format!("Coupon {} applied", coupon.code),
            None => "Coupon applied".to_string(),
        }
    }
}

/// Every rule the engine knows about
#[derive(Debug, Clone)]
pub enum DiscountRule {
    ClientTier(ClientTierRule),
    MinimumAmount(MinimumAmountRule),
    Seasonal(SeasonalRule),
    Coupon(CouponRule),
}

impl DiscountRule {
    pub fn kind(&self) -> DiscountKind {
        match self {
            DiscountRule::ClientTier(_) => DiscountKind::ClientTier,
            DiscountRule::MinimumAmount(_) => DiscountKind::MinimumAmount,
            DiscountRule::Seasonal(_) => DiscountKind::Seasonal,
            DiscountRule::Coupon(_) => DiscountKind::Coupon,
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            DiscountRule::ClientTier(r) => r.priority,
            DiscountRule::MinimumAmount(r) => r.priority,
            DiscountRule::Seasonal(r) => r.priority,
            DiscountRule::Coupon(r) => r.priority,
        }
    }

    pub fn channel(&self) -> RuleChannel {
        match self {
            DiscountRule::Coupon(_) => RuleChannel::Coupon,
            _ => RuleChannel::Automatic,
        }
    }

    pub fn is_applicable(&self, ctx: &RuleContext<'_>) -> Applicability {
        match self {
            DiscountRule::ClientTier(r) => r.is_applicable(ctx),
            DiscountRule::MinimumAmount(r) => r.is_applicable(ctx),
            DiscountRule::Seasonal(r) => r.is_applicable(ctx),
            DiscountRule::Coupon(r) => r.is_applicable(ctx),
        }
    }

    /// Deduction for an applicable rule
    pub fn apply(&self, ctx: &RuleContext<'_>) -> Decimal {
        match self {
            DiscountRule::ClientTier(r) => r.apply(ctx),
            DiscountRule::MinimumAmount(r) => r.apply(ctx),
            DiscountRule::Seasonal(r) => r.apply(ctx),
            DiscountRule::Coupon(r) => r.apply(ctx),
        }
    }

    pub fn describe(&self, ctx: &RuleContext<'_>) -> String {
        match self {
            DiscountRule::ClientTier(r) => r.describe(ctx),
            DiscountRule::MinimumAmount(r) => r.describe(),
            DiscountRule::Seasonal(r) => r.describe(),
            DiscountRule::Coupon(r) => r.describe(ctx),
        }
    }
}

/// A discount an applicable rule offers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: DiscountKind,
    pub priority: i32,
    /// Position in the registry, the last tie-breaker
    pub position: usize,
    pub amount: Decimal,
    pub message: String,
}

/// What happened to one rule during an evaluation
#[derive(Debug, Clone, Serialize)]
pub struct RuleDecision {
    pub kind: DiscountKind,
    pub priority: i32,
    pub applicable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

/// Result of running the registry against a context
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub decisions: Vec<RuleDecision>,
    pub winner: Option<Candidate>,
    /// Set when a coupon code was supplied but cannot be redeemed
    pub coupon_rejection: Option<CouponRejection>,
}

/// Pick the winning candidate
///
/// Largest deduction wins. Equal deductions go to the higher priority, then to
/// the rule registered first.
pub fn select_winner(candidates: Vec<Candidate>) -> Option<Candidate> {
    let mut winner: Option<Candidate> = None;
    for candidate in candidates {
        let better = match &winner {
            None => true,
            Some(best) => {
                candidate.amount > best.amount
                    || (candidate.amount == best.amount && candidate.priority > best.priority)
                    || (candidate.amount == best.amount
                        && candidate.priority == best.priority
                        && candidate.position < best.position)
            }
        };
        if better {
            winner = Some(candidate);
        }
    }
    winner
}

/// The fixed list of rules, built once at startup
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<DiscountRule>,
    policy: CompositionPolicy,
}

impl RuleRegistry {
    pub fn new(rules: Vec<DiscountRule>, policy: CompositionPolicy) -> Self {
        Self { rules, policy }
    }

    /// Build the standard rule set from configuration
    pub fn from_config(config: &DiscountConfig) -> Self {
        Self::new(
            vec![
                DiscountRule::ClientTier(ClientTierRule {
                    platinum_rate: config.platinum_rate,
                    vip_rate: config.vip_rate,
                    priority: config.client_tier_priority,
                }),
                DiscountRule::MinimumAmount(MinimumAmountRule {
                    threshold: config.minimum_threshold,
                    amount: config.minimum_amount,
                    priority: config.minimum_amount_priority,
                }),
                DiscountRule::Seasonal(SeasonalRule {
                    window: config.seasonal_window,
                    rate: config.seasonal_rate,
                    priority: config.seasonal_priority,
                }),
                DiscountRule::Coupon(CouponRule {
                    priority: config.coupon_priority,
                }),
            ],
            CompositionPolicy::NoStacking,
        )
    }

    /// Run every rule and select the winner
    ///
    /// Rules outside the channel admitted by the composition policy are
    /// recorded as not applicable without being asked. A rule that is not
    /// applicable never stops the remaining rules from being evaluated.
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        let mut decisions = Vec::with_capacity(self.rules.len());
        let mut candidates = Vec::new();
        let mut coupon_rejection = None;

        for (position, rule) in self.rules.iter().enumerate() {
            let verdict = if self.policy.admits(rule.channel(), ctx.coupon_supplied) {
                rule.is_applicable(ctx)
            } else {
                Applicability::NotApplicable(self.policy.exclusion_reason(rule.channel()).into())
            };

            let decision = match verdict {
                Applicability::Applicable => {
                    let amount = rule.apply(ctx);
                    tracing::debug!("Rule {} applicable, deducts {}", rule.kind(), amount);

                    if amount > Decimal::ZERO {
                        candidates.push(Candidate {
                            kind: rule.kind(),
                            priority: rule.priority(),
                            position,
                            amount,
                            message: rule.describe(ctx),
                        });
                    }

                    RuleDecision {
                        kind: rule.kind(),
                        priority: rule.priority(),
                        applicable: true,
                        reason: None,
                        amount: Some(amount),
                    }
                }
                Applicability::NotApplicable(reason) => {
                    tracing::debug!("Rule {} not applicable: {}", rule.kind(), reason);
                    RuleDecision {
                        kind: rule.kind(),
                        priority: rule.priority(),
                        applicable: false,
                        reason: Some(reason),
                        amount: None,
                    }
                }
                Applicability::CouponRejected(rejection) => {
                    coupon_rejection = Some(rejection);
                    RuleDecision {
                        kind: rule.kind(),
                        priority: rule.priority(),
                        applicable: false,
                        reason: Some(format!("coupon {}", rejection)),
                        amount: None,
                    }
                }
            };
            decisions.push(decision);
        }

        RuleOutcome {
            decisions,
            winner: select_winner(candidates),
            coupon_rejection,
        }
    }
}

/// Render a rate as a percentage, e.g. 0.15 -> "15"
fn percent(rate: Decimal) -> String {
    (rate * Decimal::ONE_HUNDRED).normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupons::models::fixtures::coupon;
    use crate::discounts::types::DiscountType;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn registry() -> RuleRegistry {
        RuleRegistry::from_config(&DiscountConfig::default())
    }

    fn ctx(total: Decimal, tier: Option<LoyaltyTier>, today: NaiveDate) -> RuleContext<'static> {
        RuleContext {
            sale_total: total,
            loyalty_tier: tier,
            coupon: None,
            coupon_supplied: false,
            today,
        }
    }

    fn june() -> NaiveDate {
        date(2024, 6, 1)
    }

    #[test]
    fn test_platinum_customer_gets_fifteen_percent() {
        let outcome = registry().evaluate(&ctx(dec!(100), Some(LoyaltyTier::Platinum), june()));
        let winner = outcome.winner.unwrap();

        assert_eq!(winner.kind, DiscountKind::ClientTier);
        assert_eq!(winner.amount, dec!(15.00));
        assert_eq!(winner.message, "PLATINUM customer discount of 15%");
    }

    #[test]
    fn test_vip_customer_gets_ten_percent() {
        let outcome = registry().evaluate(&ctx(dec!(80), Some(LoyaltyTier::Vip), june()));
        assert_eq!(outcome.winner.unwrap().amount, dec!(8.00));
    }

    #[test]
    fn test_minimum_amount_without_tier() {
        let outcome = registry().evaluate(&ctx(dec!(1200), None, june()));
        let winner = outcome.winner.unwrap();

        assert_eq!(winner.kind, DiscountKind::MinimumAmount);
        assert_eq!(winner.amount, dec!(50.00));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let outcome = registry().evaluate(&ctx(dec!(1000.00), None, june()));
        assert_eq!(outcome.winner.unwrap().kind, DiscountKind::MinimumAmount);

        let outcome = registry().evaluate(&ctx(dec!(999.99), None, june()));
        assert!(outcome.winner.is_none());
    }

    #[test]
    fn test_largest_deduction_wins() {
        // 15% of 1200 = 180 beats the fixed 50
        let outcome =
            registry().evaluate(&ctx(dec!(1200), Some(LoyaltyTier::Platinum), june()));
        let winner = outcome.winner.unwrap();
        assert_eq!(winner.kind, DiscountKind::ClientTier);
        assert_eq!(winner.amount, dec!(180.00));
        assert_eq!(outcome.decisions.iter().filter(|d| d.applicable).count(), 2);
    }

    #[test]
    fn test_seasonal_rule_inside_window() {
        let outcome = registry().evaluate(&ctx(dec!(200), None, date(2024, 12, 24)));
        let winner = outcome.winner.unwrap();
        assert_eq!(winner.kind, DiscountKind::Seasonal);
        assert_eq!(winner.amount, dec!(20.00));
    }

    #[test]
    fn test_equal_amounts_go_to_higher_priority() {
        // VIP 10% and seasonal 10% tie; tier priority 50 beats seasonal 10
        let outcome =
            registry().evaluate(&ctx(dec!(300), Some(LoyaltyTier::Vip), date(2024, 12, 22)));
        assert_eq!(outcome.winner.unwrap().kind, DiscountKind::ClientTier);
    }

    #[test]
    fn test_full_tie_goes_to_registry_order() {
        let candidates = vec![
            Candidate {
                kind: DiscountKind::Seasonal,
                priority: 10,
                position: 2,
                amount: dec!(5),
                message: String::new(),
            },
            Candidate {
                kind: DiscountKind::MinimumAmount,
                priority: 10,
                position: 1,
                amount: dec!(5),
                message: String::new(),
            },
        ];
        assert_eq!(select_winner(candidates).unwrap().kind, DiscountKind::MinimumAmount);
    }

    #[test]
    fn test_no_rule_applies() {
        let outcome = registry().evaluate(&ctx(dec!(50), Some(LoyaltyTier::Gold), june()));
        assert!(outcome.winner.is_none());
        assert!(outcome.coupon_rejection.is_none());
        assert_eq!(outcome.decisions.len(), 4);
        assert!(outcome.decisions.iter().all(|d| !d.applicable));
    }

    #[test]
    fn test_coupon_excludes_automatic_rules() {
        let c = coupon("SAVE5", DiscountType::FixedAmount, dec!(5));
        let context = RuleContext {
            sale_total: dec!(1200),
            loyalty_tier: Some(LoyaltyTier::Platinum),
            coupon: Some(&c),
            coupon_supplied: true,
            today: june(),
        };

        let outcome = registry().evaluate(&context);
        let winner = outcome.winner.unwrap();
        assert_eq!(winner.kind, DiscountKind::Coupon);
        assert_eq!(winner.amount, dec!(5));
        assert_eq!(winner.message, "Coupon SAVE5 applied");
    }

    #[test]
    fn test_unknown_coupon_is_rejected() {
        let context = RuleContext {
            sale_total: dec!(100),
            loyalty_tier: None,
            coupon: None,
            coupon_supplied: true,
            today: june(),
        };

        let outcome = registry().evaluate(&context);
        assert!(outcome.winner.is_none());
        assert_eq!(outcome.coupon_rejection, Some(CouponRejection::NotFound));
    }

    #[test]
    fn test_coupon_below_minimum_is_rejected() {
        let mut c = coupon("BIGSPEND", DiscountType::Percentage, dec!(0.2));
        c.minimum_sale_amount = dec!(500);
        let context = RuleContext {
            sale_total: dec!(100),
            loyalty_tier: None,
            coupon: Some(&c),
            coupon_supplied: true,
            today: june(),
        };

        let outcome = registry().evaluate(&context);
        assert_eq!(outcome.coupon_rejection, Some(CouponRejection::BelowMinimum));
    }

    #[test]
    fn test_zero_total_yields_no_candidate() {
        let outcome = registry().evaluate(&ctx(dec!(0), Some(LoyaltyTier::Platinum), june()));
        assert!(outcome.winner.is_none());
    }

    #[test]
    fn test_seasonal_window_bounds() {
        let window = SeasonalWindow::default();
        assert!(window.contains(date(2024, 12, 20)));
        assert!(window.contains(date(2024, 12, 25)));
        assert!(!window.contains(date(2024, 12, 19)));
        assert!(!window.contains(date(2024, 12, 26)));
    }

    #[test]
    fn test_seasonal_window_wraps_year() {
        let window = SeasonalWindow::new((12, 28), (1, 5)).unwrap();
        assert!(window.contains(date(2024, 12, 31)));
        assert!(window.contains(date(2025, 1, 3)));
        assert!(!window.contains(date(2025, 1, 6)));
        assert!(!window.contains(date(2024, 6, 1)));
    }

    #[test]
    fn test_month_day_parsing() {
        assert_eq!(parse_month_day("12-20").unwrap(), (12, 20));
        assert_eq!(parse_month_day(" 02-29 ").unwrap(), (2, 29));
        assert!(parse_month_day("1220").is_err());
        assert!(parse_month_day("xx-01").is_err());
        assert!(SeasonalWindow::new((13, 1), (12, 25)).is_err());
        assert!(SeasonalWindow::new((2, 30), (3, 1)).is_err());
    }
}
