//! # Promotion Validator
//!
//! State machine for applying a discount code through an asynchronous
//! server lookup.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │          submit(code)               receive(seq, applicable)            │
//! │   Idle ───────────────► Validating ─────────────────────────► Applied   │
//! │    ▲                      │    │                                        │
//! │    │   edit_code() /      │    │  receive(seq, not applicable)          │
//! │    │   network error      │    └──────────────────────────────► Rejected│
//! │    └──────────────────────┘                                             │
//! │                                                                         │
//! │   Every submit takes a new sequence number. A response whose sequence  │
//! │   is not the one in flight is Discarded.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The validator never touches the cart. On `Applied` the caller attaches
//! the coupon with `CartStore::apply_coupon`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult, RejectionReason};
use crate::money::Money;
use crate::types::Coupon;
use crate::validation::normalize_coupon_code;
use crate::wire::{CouponLookupRequest, CouponLookupResponse};

// =============================================================================
// State
// =============================================================================

/// Where the discount code field currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PromotionState {
    #[default]
    Idle,
    Validating {
        sequence: u64,
        code: String,
    },
    Applied {
        coupon: Coupon,
    },
    Rejected {
        code: String,
        reason: RejectionReason,
    },
}

/// A lookup the caller must now perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    pub sequence: u64,
    pub request: CouponLookupRequest,
}

/// What a lookup response did to the validator.
#[derive(Debug, Clone, PartialEq)]
pub enum PromotionOutcome {
    /// The response belonged to a superseded request.
    Discarded,
    Applied(Coupon),
    Rejected(RejectionReason),
    /// Transport or payload failure; the validator is back to Idle.
    Failed(CoreError),
}

// =============================================================================
// Validator
// =============================================================================

#[derive(Debug, Default)]
pub struct PromotionValidator {
    state: PromotionState,
    last_sequence: u64,
}

impl PromotionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PromotionState {
        &self.state
    }

    pub fn is_validating(&self) -> bool {
        matches!(self.state, PromotionState::Validating { .. })
    }

    /// Starts a lookup for `code`.
    ///
    /// ## Errors
    /// - `Validation` when the code is empty or malformed
    /// - `LookupInFlight` when a lookup is already running
    pub fn submit(&mut self, code: &str, user_id: &str, subtotal: Money) -> CoreResult<LookupTicket> {
        if self.is_validating() {
            return Err(CoreError::LookupInFlight);
        }

        let code = normalize_coupon_code(code)?;
        self.last_sequence += 1;
        let sequence = self.last_sequence;

        debug!(sequence, code = %code, "Coupon lookup started");
        self.state = PromotionState::Validating {
            sequence,
            code: code.clone(),
        };

        Ok(LookupTicket {
            sequence,
            request: CouponLookupRequest::new(code, user_id, subtotal),
        })
    }

    /// The shopper edited the code field. Any in-flight lookup is superseded.
    pub fn edit_code(&mut self) {
        if let PromotionState::Validating { sequence, .. } = &self.state {
            debug!(sequence, "Coupon lookup superseded by edit");
            self.state = PromotionState::Idle;
        }
        if matches!(self.state, PromotionState::Rejected { .. }) {
            self.state = PromotionState::Idle;
        }
    }

    /// Returns to Idle, e.g. after the coupon is removed from the cart.
    pub fn reset(&mut self) {
        self.state = PromotionState::Idle;
    }

    /// Feeds a lookup result back in.
    pub fn receive(
        &mut self,
        sequence: u64,
        result: CoreResult<CouponLookupResponse>,
    ) -> PromotionOutcome {
        let code = match &self.state {
            PromotionState::Validating {
                sequence: current,
                code,
            } if *current == sequence => code.clone(),
            _ => {
                debug!(sequence, "Discarding stale coupon lookup response");
                return PromotionOutcome::Discarded;
            }
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                debug!(sequence, error = %err, "Coupon lookup failed");
                self.state = PromotionState::Idle;
                return PromotionOutcome::Failed(err);
            }
        };

        let Some(payload) = response.promo else {
            return self.reject(code, RejectionReason::NotFound);
        };

        if !response.applicable {
            let reason = response
                .reason
                .as_deref()
                .map(RejectionReason::from_code)
                .unwrap_or_else(|| RejectionReason::Other("not applicable".to_string()));
            return self.reject(code, reason);
        }

        let coupon = match Coupon::try_from(payload) {
            Ok(coupon) if coupon.code == code => coupon,
            Ok(coupon) => {
                self.state = PromotionState::Idle;
                return PromotionOutcome::Failed(CoreError::malformed(
                    "coupon lookup response",
                    format!("asked for {} but got {}", code, coupon.code),
                ));
            }
            Err(err) => {
                self.state = PromotionState::Idle;
                return PromotionOutcome::Failed(err);
            }
        };

        debug!(sequence, code = %coupon.code, "Coupon applied");
        self.state = PromotionState::Applied {
            coupon: coupon.clone(),
        };
        PromotionOutcome::Applied(coupon)
    }

    fn reject(&mut self, code: String, reason: RejectionReason) -> PromotionOutcome {
        debug!(code = %code, reason = %reason.as_code(), "Coupon rejected");
        self.state = PromotionState::Rejected {
            code,
            reason: reason.clone(),
        };
        PromotionOutcome::Rejected(reason)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiscountKind, Percent};
    use crate::wire::CouponPayload;
    use chrono::{TimeZone, Utc};

    fn sample_coupon(code: &str) -> Coupon {
        Coupon {
            id: "7".to_string(),
            code: code.to_string(),
            discount: DiscountKind::Percentage {
                rate: Percent::from_whole(20),
            },
            min_order_value: Money::zero(),
            max_discount: None,
            start_date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap(),
            usage_limit: None,
            per_user_limit: None,
            usage_count: 0,
            is_first_order: false,
            is_active: true,
        }
    }

    fn applicable(code: &str) -> CouponLookupResponse {
        CouponLookupResponse {
            promo: Some(CouponPayload::from_coupon(&sample_coupon(code))),
            applicable: true,
            reason: None,
        }
    }

    #[test]
    fn test_submit_normalizes_code() {
        let mut validator = PromotionValidator::new();
        let ticket = validator.submit("  save20 ", "u-1", Money::from_cents(4000)).unwrap();
        assert_eq!(ticket.request.code, "SAVE20");
        assert_eq!(ticket.request.subtotal, "40.00");
        assert!(validator.is_validating());
    }

    #[test]
    fn test_empty_code_is_validation_error() {
        let mut validator = PromotionValidator::new();
        assert!(matches!(
            validator.submit("   ", "u-1", Money::zero()),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(validator.state(), &PromotionState::Idle);
    }

    #[test]
    fn test_double_submit_is_refused() {
        let mut validator = PromotionValidator::new();
        validator.submit("A", "u-1", Money::zero()).unwrap();
        assert_eq!(
            validator.submit("B", "u-1", Money::zero()),
            Err(CoreError::LookupInFlight)
        );
    }

    #[test]
    fn test_applied() {
        let mut validator = PromotionValidator::new();
        let ticket = validator.submit("save20", "u-1", Money::zero()).unwrap();
        let outcome = validator.receive(ticket.sequence, Ok(applicable("SAVE20")));
        assert!(matches!(outcome, PromotionOutcome::Applied(ref c) if c.code == "SAVE20"));
        assert!(matches!(validator.state(), PromotionState::Applied { .. }));
    }

    #[test]
    fn test_null_promo_is_not_found() {
        let mut validator = PromotionValidator::new();
        let ticket = validator.submit("nope", "u-1", Money::zero()).unwrap();
        let response = CouponLookupResponse {
            promo: None,
            applicable: false,
            reason: None,
        };
        assert_eq!(
            validator.receive(ticket.sequence, Ok(response)),
            PromotionOutcome::Rejected(RejectionReason::NotFound)
        );
    }

    #[test]
    fn test_server_reason_is_kept() {
        let mut validator = PromotionValidator::new();
        let ticket = validator.submit("SAVE20", "u-1", Money::zero()).unwrap();
        let mut response = applicable("SAVE20");
        response.applicable = false;
        response.reason = Some("usage-limit-reached".to_string());
        assert_eq!(
            validator.receive(ticket.sequence, Ok(response)),
            PromotionOutcome::Rejected(RejectionReason::UsageLimitReached)
        );

        validator.edit_code();
        let ticket = validator.submit("SAVE20", "u-1", Money::zero()).unwrap();
        let mut response = applicable("SAVE20");
        response.applicable = false;
        response.reason = Some("region-locked".to_string());
        assert_eq!(
            validator.receive(ticket.sequence, Ok(response)),
            PromotionOutcome::Rejected(RejectionReason::Other("region-locked".to_string()))
        );
    }

    #[test]
    fn test_stale_response_is_discarded() {
        let mut validator = PromotionValidator::new();
        let first = validator.submit("OLD", "u-1", Money::zero()).unwrap();
        validator.edit_code();
        let second = validator.submit("NEW", "u-1", Money::zero()).unwrap();

        assert_eq!(
            validator.receive(first.sequence, Ok(applicable("OLD"))),
            PromotionOutcome::Discarded
        );
        assert!(validator.is_validating());

        let outcome = validator.receive(second.sequence, Ok(applicable("NEW")));
        assert!(matches!(outcome, PromotionOutcome::Applied(ref c) if c.code == "NEW"));
    }

    #[test]
    fn test_network_error_returns_to_idle() {
        let mut validator = PromotionValidator::new();
        let ticket = validator.submit("SAVE20", "u-1", Money::zero()).unwrap();
        let outcome = validator.receive(ticket.sequence, Err(CoreError::network("timeout")));
        assert!(matches!(outcome, PromotionOutcome::Failed(ref e) if e.is_retriable()));
        assert_eq!(validator.state(), &PromotionState::Idle);

        // retry is allowed
        assert!(validator.submit("SAVE20", "u-1", Money::zero()).is_ok());
    }

    #[test]
    fn test_mismatched_code_is_malformed() {
        let mut validator = PromotionValidator::new();
        let ticket = validator.submit("SAVE20", "u-1", Money::zero()).unwrap();
        let outcome = validator.receive(ticket.sequence, Ok(applicable("OTHER")));
        assert!(matches!(
            outcome,
            PromotionOutcome::Failed(CoreError::MalformedPayload { .. })
        ));
        assert_eq!(validator.state(), &PromotionState::Idle);
    }
}
