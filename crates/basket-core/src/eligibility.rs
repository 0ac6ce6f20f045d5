//! # Coupon Eligibility
//!
//! The authoritative eligibility predicate. The storefront API (and the
//! SQLite-backed reference in basket-db) run it; the client only mirrors the
//! verdict it is sent.
//!
//! ## Check Order
//! The first failing check decides the reason reported to the shopper:
//!
//! 1. inactive
//! 2. not-yet-started
//! 3. expired
//! 4. usage-limit-reached
//! 5. per-user-limit-reached
//! 6. below-minimum
//! 7. first-order-only

use chrono::{DateTime, Utc};

use crate::error::RejectionReason;
use crate::money::Money;
use crate::types::Coupon;

/// Everything eligibility depends on besides the coupon itself.
///
/// Time is injected so the predicate stays pure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityContext {
    pub now: DateTime<Utc>,
    pub subtotal: Money,
    /// Times this shopper has already redeemed the coupon.
    pub user_redemptions: i64,
    pub is_first_time_buyer: bool,
}

/// Evaluates whether `coupon` may be applied.
pub fn evaluate(coupon: &Coupon, ctx: &EligibilityContext) -> Result<(), RejectionReason> {
    if !coupon.is_active {
        return Err(RejectionReason::Inactive);
    }
    if ctx.now < coupon.start_date {
        return Err(RejectionReason::NotYetStarted);
    }
    if ctx.now > coupon.end_date {
        return Err(RejectionReason::Expired);
    }
    if coupon.is_exhausted() {
        return Err(RejectionReason::UsageLimitReached);
    }
    if matches!(coupon.per_user_limit, Some(limit) if ctx.user_redemptions >= limit) {
        return Err(RejectionReason::PerUserLimitReached);
    }
    if !coupon.meets_minimum(ctx.subtotal) {
        return Err(RejectionReason::BelowMinimum);
    }
    if coupon.is_first_order && !ctx.is_first_time_buyer {
        return Err(RejectionReason::FirstOrderOnly);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiscountKind, Percent};
    use chrono::TimeZone;

    fn coupon() -> Coupon {
        Coupon {
            id: "c-1".to_string(),
            code: "WELCOME".to_string(),
            discount: DiscountKind::Percentage {
                rate: Percent::from_whole(10),
            },
            min_order_value: Money::from_cents(2000),
            max_discount: None,
            start_date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap(),
            usage_limit: Some(5),
            per_user_limit: Some(1),
            usage_count: 0,
            is_first_order: true,
            is_active: true,
        }
    }

    fn ctx() -> EligibilityContext {
        EligibilityContext {
            now: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
            subtotal: Money::from_cents(5000),
            user_redemptions: 0,
            is_first_time_buyer: true,
        }
    }

    #[test]
    fn test_eligible() {
        assert_eq!(evaluate(&coupon(), &ctx()), Ok(()));
    }

    #[test]
    fn test_window_boundaries_are_inclusive() {
        let c = coupon();
        let at_start = EligibilityContext {
            now: c.start_date,
            ..ctx()
        };
        let at_end = EligibilityContext { now: c.end_date, ..ctx() };
        assert_eq!(evaluate(&c, &at_start), Ok(()));
        assert_eq!(evaluate(&c, &at_end), Ok(()));

        let late = EligibilityContext {
            now: c.end_date + chrono::Duration::seconds(1),
            ..ctx()
        };
        assert_eq!(evaluate(&c, &late), Err(RejectionReason::Expired));
    }

    #[test]
    fn test_each_reason() {
        let mut c = coupon();
        c.usage_count = 5;
        assert_eq!(evaluate(&c, &ctx()), Err(RejectionReason::UsageLimitReached));

        let used = EligibilityContext {
            user_redemptions: 1,
            ..ctx()
        };
        assert_eq!(evaluate(&coupon(), &used), Err(RejectionReason::PerUserLimitReached));

        let small = EligibilityContext {
            subtotal: Money::from_cents(1500),
            ..ctx()
        };
        assert_eq!(evaluate(&coupon(), &small), Err(RejectionReason::BelowMinimum));

        let returning = EligibilityContext {
            is_first_time_buyer: false,
            ..ctx()
        };
        assert_eq!(evaluate(&coupon(), &returning), Err(RejectionReason::FirstOrderOnly));

        let early = EligibilityContext {
            now: Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap(),
            ..ctx()
        };
        assert_eq!(evaluate(&coupon(), &early), Err(RejectionReason::NotYetStarted));
    }

    #[test]
    fn test_first_failing_check_wins() {
        let mut c = coupon();
        c.is_active = false;
        c.usage_count = 99;
        let bad = EligibilityContext {
            subtotal: Money::zero(),
            is_first_time_buyer: false,
            ..ctx()
        };
        assert_eq!(evaluate(&c, &bad), Err(RejectionReason::Inactive));

        c.is_active = true;
        assert_eq!(evaluate(&c, &bad), Err(RejectionReason::UsageLimitReached));
    }
}
