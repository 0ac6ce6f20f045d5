//! # Coupon Repository
//!
//! Coupon lookup and redemption against the shared usage counters.
//!
//! ## Redemption Is a Single Conditional Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SINGLE TRANSACTION                              │
//! │                                                                         │
//! │  1. UPDATE coupons SET usage_count = usage_count + 1                   │
//! │     WHERE id = ?                                                        │
//! │       AND is_active = 1                                                 │
//! │       AND (usage_limit IS NULL OR usage_count < usage_limit)           │
//! │       AND (per_user_limit IS NULL OR                                    │
//! │            (SELECT COUNT(*) FROM coupon_redemptions                     │
//! │             WHERE coupon_id = ? AND user_id = ?) < per_user_limit)      │
//! │                                                                         │
//! │     0 rows? ──► ROLLBACK, re-read, report why (last unit was taken)    │
//! │                                                                         │
//! │  2. INSERT INTO coupon_redemptions (...)                                │
//! │                                                                         │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two shoppers racing for the last unit cannot both pass step 1: SQLite
//! serialises writers, and the limit is re-checked inside the UPDATE itself.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use basket_core::eligibility::{self, EligibilityContext};
use basket_core::validation::normalize_coupon_code;
use basket_core::wire::{CouponLookupResponse, CouponPayload};
use basket_core::{Coupon, DiscountKind, Money, Percent, RejectionReason};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: String,
    code: String,
    discount_type: String,
    discount_value: i64,
    min_order_value_cents: i64,
    max_discount_cents: Option<i64>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    usage_limit: Option<i64>,
    per_user_limit: Option<i64>,
    usage_count: i64,
    is_first_order: bool,
    is_active: bool,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = DbError;

    fn try_from(row: CouponRow) -> DbResult<Self> {
        let discount = match row.discount_type.as_str() {
            "percentage" => DiscountKind::Percentage {
                rate: u32::try_from(row.discount_value)
                    .map(Percent::from_bps)
                    .map_err(|_| DbError::serialization(format!("coupon {} has an invalid rate", row.id)))?,
            },
            "fixed" => DiscountKind::Fixed {
                amount: Money::from_cents(row.discount_value),
            },
            other => {
                return Err(DbError::serialization(format!(
                    "coupon {} has unknown discount_type '{}'",
                    row.id, other
                )))
            }
        };

        Ok(Coupon {
            id: row.id,
            code: row.code,
            discount,
            min_order_value: Money::from_cents(row.min_order_value_cents),
            max_discount: row.max_discount_cents.map(Money::from_cents),
            start_date: row.start_date,
            end_date: row.end_date,
            usage_limit: row.usage_limit,
            per_user_limit: row.per_user_limit,
            usage_count: row.usage_count,
            is_first_order: row.is_first_order,
            is_active: row.is_active,
        })
    }
}

const COUPON_COLUMNS: &str = r#"
    id, code, discount_type, discount_value, min_order_value_cents,
    max_discount_cents, start_date, end_date, usage_limit, per_user_limit,
    usage_count, is_first_order, is_active
"#;

// =============================================================================
// Redemption Result
// =============================================================================

/// Outcome of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionResult {
    /// Counted. `usage_count` is the coupon's count after this redemption.
    Redeemed { usage_count: i64 },
    /// Not counted; nothing was written.
    Refused(RejectionReason),
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for coupon operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    /// Creates a new CouponRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Inserts a new coupon.
    ///
    /// ## Errors
    /// `UniqueViolation` when the code already exists.
    pub async fn insert(&self, coupon: &Coupon) -> DbResult<()> {
        let (discount_type, discount_value) = match coupon.discount {
            DiscountKind::Percentage { rate } => ("percentage", rate.bps() as i64),
            DiscountKind::Fixed { amount } => ("fixed", amount.cents()),
        };

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, discount_type, discount_value, min_order_value_cents,
                max_discount_cents, start_date, end_date, usage_limit, per_user_limit,
                usage_count, is_first_order, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&coupon.id)
        .bind(&coupon.code)
        .bind(discount_type)
        .bind(discount_value)
        .bind(coupon.min_order_value.cents())
        .bind(coupon.max_discount.map(|m| m.cents()))
        .bind(coupon.start_date)
        .bind(coupon.end_date)
        .bind(coupon.usage_limit)
        .bind(coupon.per_user_limit)
        .bind(coupon.usage_count)
        .bind(coupon.is_first_order)
        .bind(coupon.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, coupon.code.clone()),
            other => other,
        })?;

        info!(code = %coupon.code, "Coupon created");
        Ok(())
    }

    /// Finds a coupon by code (case-insensitive).
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let Ok(code) = normalize_coupon_code(code) else {
            return Ok(None);
        };

        let sql = format!("SELECT {} FROM coupons WHERE code = ?1", COUPON_COLUMNS);
        let row: Option<CouponRow> = sqlx::query_as(&sql)
            .bind(&code)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Coupon::try_from).transpose()
    }

    /// Counts how often `user_id` has redeemed `coupon_id`.
    pub async fn user_redemptions(&self, coupon_id: &str, user_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = ?1 AND user_id = ?2",
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Switches a coupon on or off.
    pub async fn set_active(&self, coupon_id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE coupons SET is_active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(coupon_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Coupon", coupon_id));
        }
        Ok(())
    }

    async fn eligibility_of(
        &self,
        coupon: &Coupon,
        user_id: &str,
        subtotal: Money,
        now: DateTime<Utc>,
        is_first_time_buyer: bool,
    ) -> DbResult<Result<(), RejectionReason>> {
        let ctx = EligibilityContext {
            now,
            subtotal,
            user_redemptions: self.user_redemptions(&coupon.id, user_id).await?,
            is_first_time_buyer,
        };
        Ok(eligibility::evaluate(coupon, &ctx))
    }

    /// Answers a coupon lookup the way the storefront API does.
    ///
    /// Unknown codes come back with `promo: null`. Known codes always carry
    /// the coupon, with `applicable` and `reason` set from the eligibility
    /// check.
    pub async fn lookup(
        &self,
        code: &str,
        user_id: &str,
        subtotal: Money,
        now: DateTime<Utc>,
        is_first_time_buyer: bool,
    ) -> DbResult<CouponLookupResponse> {
        let Some(coupon) = self.find_by_code(code).await? else {
            debug!(code = %code, "Coupon lookup: not found");
            return Ok(CouponLookupResponse {
                promo: None,
                applicable: false,
                reason: Some(RejectionReason::NotFound.as_code().to_string()),
            });
        };

        let verdict = self
            .eligibility_of(&coupon, user_id, subtotal, now, is_first_time_buyer)
            .await?;
        debug!(code = %coupon.code, eligible = verdict.is_ok(), "Coupon lookup");

        Ok(CouponLookupResponse {
            promo: Some(CouponPayload::from_coupon(&coupon)),
            applicable: verdict.is_ok(),
            reason: verdict.err().map(|reason| reason.as_code().to_string()),
        })
    }

    /// Redeems a coupon for an order.
    ///
    /// Re-runs the full eligibility check, then counts the use with one
    /// conditional UPDATE so concurrent redemptions can never exceed
    /// `usage_limit` or `per_user_limit`.
    pub async fn redeem(
        &self,
        code: &str,
        user_id: &str,
        order_ref: &str,
        subtotal: Money,
        now: DateTime<Utc>,
        is_first_time_buyer: bool,
    ) -> DbResult<RedemptionResult> {
        let Some(coupon) = self.find_by_code(code).await? else {
            return Ok(RedemptionResult::Refused(RejectionReason::NotFound));
        };

        if let Err(reason) = self
            .eligibility_of(&coupon, user_id, subtotal, now, is_first_time_buyer)
            .await?
        {
            debug!(code = %coupon.code, reason = %reason.as_code(), "Redemption refused");
            return Ok(RedemptionResult::Refused(reason));
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET usage_count = usage_count + 1
            WHERE id = ?1
              AND is_active = 1
              AND (usage_limit IS NULL OR usage_count < usage_limit)
              AND (
                per_user_limit IS NULL
                OR (SELECT COUNT(*) FROM coupon_redemptions
                    WHERE coupon_id = ?1 AND user_id = ?2) < per_user_limit
              )
            "#,
        )
        .bind(&coupon.id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;

            // Someone else took the last unit between the check and the write
            let reason = match self.find_by_code(&coupon.code).await? {
                Some(current) => self
                    .eligibility_of(&current, user_id, subtotal, now, is_first_time_buyer)
                    .await?
                    .err()
                    .unwrap_or(RejectionReason::UsageLimitReached),
                None => RejectionReason::NotFound,
            };
            info!(code = %coupon.code, reason = %reason.as_code(), "Redemption lost race");
            return Ok(RedemptionResult::Refused(reason));
        }

        sqlx::query(
            r#"
            INSERT INTO coupon_redemptions (id, coupon_id, user_id, order_ref, redeemed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&coupon.id)
        .bind(user_id)
        .bind(order_ref)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let usage_count: i64 = sqlx::query_scalar("SELECT usage_count FROM coupons WHERE id = ?1")
            .bind(&coupon.id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(code = %coupon.code, usage_count, order_ref = %order_ref, "Coupon redeemed");
        Ok(RedemptionResult::Redeemed { usage_count })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn coupon(code: &str) -> Coupon {
        Coupon {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            discount: DiscountKind::Percentage {
                rate: Percent::from_whole(20),
            },
            min_order_value: Money::from_cents(2000),
            max_discount: Some(Money::from_cents(500)),
            start_date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap(),
            usage_limit: None,
            per_user_limit: None,
            usage_count: 0,
            is_first_order: false,
            is_active: true,
        }
    }

    async fn repo() -> CouponRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().coupons()
    }

    #[tokio::test]
    async fn test_insert_and_find_case_insensitive() {
        let repo = repo().await;
        let c = coupon("SAVE20");
        repo.insert(&c).await.unwrap();

        assert_eq!(repo.find_by_code(" save20 ").await.unwrap(), Some(c));
        assert_eq!(repo.find_by_code("OTHER").await.unwrap(), None);
        assert_eq!(repo.find_by_code("not a code!").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let repo = repo().await;
        repo.insert(&coupon("SAVE20")).await.unwrap();
        assert!(matches!(
            repo.insert(&coupon("SAVE20")).await,
            Err(DbError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_lookup_verdicts() {
        let repo = repo().await;
        repo.insert(&coupon("SAVE20")).await.unwrap();

        let ok = repo
            .lookup("save20", "u-1", Money::from_cents(4000), now(), false)
            .await
            .unwrap();
        assert!(ok.applicable);
        assert!(ok.promo.is_some());

        let small = repo
            .lookup("SAVE20", "u-1", Money::from_cents(1500), now(), false)
            .await
            .unwrap();
        assert!(!small.applicable);
        assert_eq!(small.reason.as_deref(), Some("below-minimum"));

        let missing = repo
            .lookup("NOPE", "u-1", Money::from_cents(4000), now(), false)
            .await
            .unwrap();
        assert!(missing.promo.is_none());
    }

    #[tokio::test]
    async fn test_redeem_stops_at_usage_limit() {
        let repo = repo().await;
        let mut c = coupon("LAST1");
        c.usage_limit = Some(1);
        repo.insert(&c).await.unwrap();

        let first = repo
            .redeem("LAST1", "u-1", "order-1", Money::from_cents(4000), now(), false)
            .await
            .unwrap();
        assert_eq!(first, RedemptionResult::Redeemed { usage_count: 1 });

        let second = repo
            .redeem("LAST1", "u-2", "order-2", Money::from_cents(4000), now(), false)
            .await
            .unwrap();
        assert_eq!(
            second,
            RedemptionResult::Refused(RejectionReason::UsageLimitReached)
        );

        let stored = repo.find_by_code("LAST1").await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
    }

    #[tokio::test]
    async fn test_redeem_per_user_limit() {
        let repo = repo().await;
        let mut c = coupon("ONCE");
        c.per_user_limit = Some(1);
        repo.insert(&c).await.unwrap();

        let subtotal = Money::from_cents(4000);
        repo.redeem("ONCE", "u-1", "o-1", subtotal, now(), false).await.unwrap();
        assert_eq!(
            repo.redeem("ONCE", "u-1", "o-2", subtotal, now(), false).await.unwrap(),
            RedemptionResult::Refused(RejectionReason::PerUserLimitReached)
        );
        assert_eq!(
            repo.redeem("ONCE", "u-2", "o-3", subtotal, now(), false).await.unwrap(),
            RedemptionResult::Redeemed { usage_count: 2 }
        );
        assert_eq!(repo.user_redemptions(&c.id, "u-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_never_exceed_limit() {
        let repo = repo().await;
        let mut c = coupon("RACE");
        c.usage_limit = Some(3);
        repo.insert(&c).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.redeem(
                    "RACE",
                    &format!("u-{}", i),
                    &format!("o-{}", i),
                    Money::from_cents(4000),
                    now(),
                    false,
                )
                .await
                .unwrap()
            }));
        }

        let mut redeemed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), RedemptionResult::Redeemed { .. }) {
                redeemed += 1;
            }
        }
        assert_eq!(redeemed, 3);
        assert_eq!(repo.find_by_code("RACE").await.unwrap().unwrap().usage_count, 3);
    }

    #[tokio::test]
    async fn test_inactive_coupon_refused() {
        let repo = repo().await;
        let c = coupon("OFF");
        repo.insert(&c).await.unwrap();
        repo.set_active(&c.id, false).await.unwrap();

        assert_eq!(
            repo.redeem("OFF", "u-1", "o-1", Money::from_cents(4000), now(), false)
                .await
                .unwrap(),
            RedemptionResult::Refused(RejectionReason::Inactive)
        );
        assert!(matches!(
            repo.set_active("missing", true).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
