use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Lifecycle state of a coupon, derived from its own fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponStatus {
    /// Never redeemed, not expired
    Created,
    /// Redeemed at least once, uses remain, not expired
    Active,
    /// Every allowed use consumed
    Exhausted,
    /// Expiration date has passed
    Expired,
}

impl CouponStatus {
    /// Derive the status of a coupon on `today`
    ///
    /// Exhaustion is checked first: a coupon used up before its expiration
    /// date stays exhausted afterwards.
    pub fn derive(
        uses_consumed: i32,
        max_uses: Option<i32>,
        expiration_date: NaiveDate,
        today: NaiveDate,
    ) -> Self {
        if let Some(max) = max_uses {
            if uses_consumed >= max {
                return CouponStatus::Exhausted;
            }
        }

        if today > expiration_date {
            return CouponStatus::Expired;
        }

        if uses_consumed == 0 {
            CouponStatus::Created
        } else {
            CouponStatus::Active
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CouponStatus::Created => "CREATED",
            CouponStatus::Active => "ACTIVE",
            CouponStatus::Exhausted => "EXHAUSTED",
            CouponStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CouponStatus::Exhausted | CouponStatus::Expired)
    }

    pub fn is_redeemable(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allowed coupon state transitions
pub struct StatusMachine;

impl StatusMachine {
    /// Check if a status transition is valid
    ///
    /// # Valid Transitions
    /// - Created → Active, Exhausted, Expired
    /// - Active → Exhausted, Expired
    /// - Exhausted, Expired → (terminal, no transitions)
    /// - Any status → Same status (idempotent)
    pub fn is_valid_transition(from: CouponStatus, to: CouponStatus) -> bool {
        if from == to {
            return true;
        }

        match (from, to) {
            (CouponStatus::Created, _) => true,
            (CouponStatus::Active, CouponStatus::Exhausted) => true,
            (CouponStatus::Active, CouponStatus::Expired) => true,
            (CouponStatus::Exhausted, _) | (CouponStatus::Expired, _) => false,
            _ => false,
        }
    }

    /// Attempt to transition from one status to another
    pub fn transition(from: CouponStatus, to: CouponStatus) -> Result<CouponStatus, String> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(format!("Invalid coupon status transition from {} to {}", from, to))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_derive_created() {
        let status = CouponStatus::derive(0, Some(3), date(2024, 12, 31), date(2024, 6, 1));
        assert_eq!(status, CouponStatus::Created);
    }

    #[test]
    fn test_derive_active() {
        let status = CouponStatus::derive(1, Some(3), date(2024, 12, 31), date(2024, 6, 1));
        assert_eq!(status, CouponStatus::Active);

        let unlimited = CouponStatus::derive(500, None, date(2024, 12, 31), date(2024, 6, 1));
        assert_eq!(unlimited, CouponStatus::Active);
    }

    #[test]
    fn test_derive_exhausted() {
        let status = CouponStatus::derive(3, Some(3), date(2024, 12, 31), date(2024, 6, 1));
        assert_eq!(status, CouponStatus::Exhausted);
    }

    #[test]
    fn test_expiration_day_is_still_valid() {
        let status = CouponStatus::derive(0, Some(1), date(2024, 6, 1), date(2024, 6, 1));
        assert_eq!(status, CouponStatus::Created);

        let status = CouponStatus::derive(0, Some(1), date(2024, 6, 1), date(2024, 6, 2));
        assert_eq!(status, CouponStatus::Expired);
    }

    #[test]
    fn test_exhausted_stays_exhausted_after_expiry() {
        let status = CouponStatus::derive(1, Some(1), date(2024, 6, 1), date(2025, 1, 1));
        assert_eq!(status, CouponStatus::Exhausted);
    }

    #[test]
    fn test_created_transitions() {
        assert!(StatusMachine::is_valid_transition(CouponStatus::Created, CouponStatus::Active));
        assert!(StatusMachine::is_valid_transition(CouponStatus::Created, CouponStatus::Exhausted));
        assert!(StatusMachine::is_valid_transition(CouponStatus::Created, CouponStatus::Expired));
    }

    #[test]
    fn test_active_cannot_go_back_to_created() {
        assert!(!StatusMachine::is_valid_transition(CouponStatus::Active, CouponStatus::Created));
        assert!(StatusMachine::is_valid_transition(CouponStatus::Active, CouponStatus::Exhausted));
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for to in [CouponStatus::Created, CouponStatus::Active, CouponStatus::Expired] {
            assert!(!StatusMachine::is_valid_transition(CouponStatus::Exhausted, to));
        }
        for to in [CouponStatus::Created, CouponStatus::Active, CouponStatus::Exhausted] {
            assert!(!StatusMachine::is_valid_transition(CouponStatus::Expired, to));
        }
        assert!(CouponStatus::Expired.is_terminal());
        assert!(!CouponStatus::Active.is_terminal());
    }

    #[test]
    fn test_transition_error_message() {
        let err = StatusMachine::transition(CouponStatus::Expired, CouponStatus::Active).unwrap_err();
        assert_eq!(err, "Invalid coupon status transition from EXPIRED to ACTIVE");
    }
}
