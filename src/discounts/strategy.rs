use rust_decimal::{Decimal, RoundingStrategy};

use crate::discounts::types::DiscountType;

/// Number of decimal places money is rounded to
pub const MONEY_SCALE: u32 = 2;

/// Round a currency value to cents, half-up
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Turns a base amount and a rule parameter into a deduction
///
/// Strategies are pure and never fail: inputs that make no sense for a
/// discount (non-positive base or parameter) yield a zero deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountStrategy {
    /// `parameter` is a rate in (0, 1]
    Percentage,

    /// `parameter` is a currency amount
    FixedAmount,
}

impl DiscountStrategy {
    /// Calculate the deduction for `base_amount`
    ///
    /// # Arguments
    /// * `base_amount` - Sale total before discount
    /// * `parameter` - Rate for percentages, amount for fixed discounts
    ///
    /// # Returns
    /// Deduction as Decimal, never negative and never above `base_amount`
    pub fn calculate(&self, base_amount: Decimal, parameter: Decimal) -> Decimal {
        if base_amount <= Decimal::ZERO || parameter <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        match self {
            // Rounded once, on the final value
            DiscountStrategy::Percentage => round_money(base_amount * parameter).min(base_amount),
            DiscountStrategy::FixedAmount => base_amount.min(parameter),
        }
    }
}

impl From<DiscountType> for DiscountStrategy {
    fn from(discount_type: DiscountType) -> Self {
        match discount_type {
            DiscountType::Percentage => DiscountStrategy::Percentage,
            DiscountType::FixedAmount => DiscountStrategy::FixedAmount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_percentage_basic() {
        let deduction = DiscountStrategy::Percentage.calculate(dec!(100.00), dec!(0.15));
        assert_eq!(deduction, dec!(15.00));
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        // 10.05 * 0.5 = 5.025
        let deduction = DiscountStrategy::Percentage.calculate(dec!(10.05), dec!(0.5));
        assert_eq!(deduction, dec!(5.03));

        // 33.33 * 0.15 = 4.9995
        let deduction = DiscountStrategy::Percentage.calculate(dec!(33.33), dec!(0.15));
        assert_eq!(deduction, dec!(5.00));
    }

    #[test]
    fn test_percentage_full_rate() {
        let deduction = DiscountStrategy::Percentage.calculate(dec!(42.10), dec!(1));
        assert_eq!(deduction, dec!(42.10));
    }

    #[test]
    fn test_percentage_non_positive_inputs() {
        assert_eq!(DiscountStrategy::Percentage.calculate(dec!(0), dec!(0.10)), Decimal::ZERO);
        assert_eq!(DiscountStrategy::Percentage.calculate(dec!(-10), dec!(0.10)), Decimal::ZERO);
        assert_eq!(DiscountStrategy::Percentage.calculate(dec!(100), dec!(0)), Decimal::ZERO);
        assert_eq!(DiscountStrategy::Percentage.calculate(dec!(100), dec!(-0.1)), Decimal::ZERO);
    }

    #[test]
    fn test_fixed_amount_below_base() {
        let deduction = DiscountStrategy::FixedAmount.calculate(dec!(1200.00), dec!(50.00));
        assert_eq!(deduction, dec!(50.00));
    }

    #[test]
    fn test_fixed_amount_capped_at_base() {
        let deduction = DiscountStrategy::FixedAmount.calculate(dec!(30.00), dec!(50.00));
        assert_eq!(deduction, dec!(30.00));
    }

    #[test]
    fn test_fixed_amount_non_positive_inputs() {
        assert_eq!(DiscountStrategy::FixedAmount.calculate(dec!(0), dec!(50)), Decimal::ZERO);
        assert_eq!(DiscountStrategy::FixedAmount.calculate(dec!(-5), dec!(50)), Decimal::ZERO);
        assert_eq!(DiscountStrategy::FixedAmount.calculate(dec!(100), dec!(0)), Decimal::ZERO);
    }

    #[test]
    fn test_strategy_from_discount_type() {
        assert_eq!(DiscountStrategy::from(DiscountType::Percentage), DiscountStrategy::Percentage);
        assert_eq!(DiscountStrategy::from(DiscountType::FixedAmount), DiscountStrategy::FixedAmount);
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
        assert_eq!(round_money(dec!(2.344)), dec!(2.34));
        assert_eq!(round_money(dec!(7)), dec!(7));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    /// Percentage deduction equals the product rounded half-up to cents
    #[test]
    fn prop_percentage_matches_rounded_product() {
        proptest!(|(
            total_cents in 0u64..=100_000_000u64,
            rate_bp in 1u32..=10_000u32
        )| {
            let total = Decimal::from(total_cents) / Decimal::from(100);
            let rate = Decimal::from(rate_bp) / Decimal::from(10_000);

            let deduction = DiscountStrategy::Percentage.calculate(total, rate);
            let expected = if total.is_zero() {
                Decimal::ZERO
            } else {
                (total * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            };

            prop_assert_eq!(deduction, expected);
        });
    }

    /// A fixed discount never exceeds the base amount
    #[test]
    fn prop_fixed_amount_never_exceeds_base() {
        proptest!(|(
            total_cents in 0u64..=10_000_000u64,
            fixed_cents in 0u64..=10_000_000u64
        )| {
            let total = Decimal::from(total_cents) / Decimal::from(100);
            let fixed = Decimal::from(fixed_cents) / Decimal::from(100);

            let deduction = DiscountStrategy::FixedAmount.calculate(total, fixed);

            prop_assert!(deduction <= total, "deduction {} exceeds total {}", deduction, total);
            prop_assert!(deduction >= Decimal::ZERO);
        });
    }

    /// The discounted total is never negative, whatever the strategy
    #[test]
    fn prop_new_total_is_non_negative() {
        proptest!(|(
            total_cents in 0u64..=10_000_000u64,
            rate_bp in 1u32..=10_000u32,
            fixed_cents in 0u64..=10_000_000u64
        )| {
            let total = Decimal::from(total_cents) / Decimal::from(100);
            let rate = Decimal::from(rate_bp) / Decimal::from(10_000);
            let fixed = Decimal::from(fixed_cents) / Decimal::from(100);

            let after_percentage = total - DiscountStrategy::Percentage.calculate(total, rate);
            let after_fixed = total - DiscountStrategy::FixedAmount.calculate(total, fixed);

            prop_assert!(after_percentage >= Decimal::ZERO);
            prop_assert!(after_fixed >= Decimal::ZERO);
        });
    }
}
