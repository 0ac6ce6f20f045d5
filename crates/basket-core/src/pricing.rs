//! # Pricing Calculator
//!
//! Pure computation of the order price breakdown.
//!
//! ## Calculation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  items ──► subtotal = Σ price_before_vat × quantity                    │
//! │                │                                                        │
//! │                ├──► coupon? ──► subtotal ≥ min? ──► discount            │
//! │                │                    │ no                                │
//! │                │                    └──► 0, applicable = false          │
//! │                │                                                        │
//! │                ├──► shipping selection ──► fee | blocked                │
//! │                │                                                        │
//! │                └──► tax rule(subtotal, region) ──► tax                  │
//! │                                                                         │
//! │  total = max(0, subtotal − discount + shipping + tax)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - `0 ≤ discount_amount ≤ subtotal`
//! - `discount_amount ≤ max_discount` when the coupon has a cap
//! - `total ≥ 0`
//! - Same inputs, same snapshot

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, ShippingError};
use crate::money::Money;
use crate::shipping::ShippingSelection;
use crate::tax::TaxRule;
use crate::types::{CartLineItem, Coupon};

// =============================================================================
// Snapshot Types
// =============================================================================

/// The coupon as it currently prices against the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CouponApplication {
    pub coupon: Coupon,

    /// False when the subtotal is below the coupon's minimum.
    pub applicable: bool,

    /// How much more the shopper needs to spend to reach the minimum.
    pub shortfall: Money,
}

/// Shipping as it prices against the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ShippingStatus {
    NotSelected,
    Charged { city_id: String, fee: Money },
    Waived { city_id: String },
    Unavailable {
        city_id: Option<String>,
        reason: ShippingError,
    },
}

/// Derived price breakdown. Never the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderPricingSnapshot {
    pub subtotal: Money,
    pub discount_amount: Money,
    pub shipping_amount: Money,
    pub tax_amount: Money,
    pub total: Money,
    pub applied_coupon: Option<CouponApplication>,
    pub shipping: ShippingStatus,
    /// Number of distinct lines.
    pub item_count: usize,
    /// Sum of line quantities.
    pub total_quantity: i64,
}

impl Default for OrderPricingSnapshot {
    fn default() -> Self {
        OrderPricingSnapshot {
            subtotal: Money::zero(),
            discount_amount: Money::zero(),
            shipping_amount: Money::zero(),
            tax_amount: Money::zero(),
            total: Money::zero(),
            applied_coupon: None,
            shipping: ShippingStatus::NotSelected,
            item_count: 0,
            total_quantity: 0,
        }
    }
}

impl OrderPricingSnapshot {
    /// Why checkout cannot proceed, if anything prevents it.
    pub fn checkout_blocker(&self) -> Option<CoreError> {
        if self.item_count == 0 {
            return Some(CoreError::EmptyCart);
        }
        match &self.shipping {
            ShippingStatus::NotSelected => {
                Some(CoreError::ShippingUnavailable(ShippingError::NoCitySelected))
            }
            ShippingStatus::Unavailable { reason, .. } => {
                Some(CoreError::ShippingUnavailable(reason.clone()))
            }
            ShippingStatus::Charged { .. } | ShippingStatus::Waived { .. } => None,
        }
    }

    pub fn is_checkout_ready(&self) -> bool {
        self.checkout_blocker().is_none()
    }

    /// Whether a coupon is attached but not currently discounting.
    pub fn has_inapplicable_coupon(&self) -> bool {
        matches!(&self.applied_coupon, Some(application) if !application.applicable)
    }
}

// =============================================================================
// Computation
// =============================================================================

/// Sum of line totals. Bundles count once per bundle.
pub fn subtotal(items: &[CartLineItem]) -> Money {
    items.iter().map(CartLineItem::line_total).sum()
}

/// Prices `coupon` against `subtotal`.
///
/// Returns the clamped discount and the application record. Below the
/// minimum the discount is zero and the coupon is flagged inapplicable.
pub fn apply_coupon(coupon: &Coupon, subtotal: Money) -> (Money, CouponApplication) {
    if !coupon.meets_minimum(subtotal) {
        let application = CouponApplication {
            coupon: coupon.clone(),
            applicable: false,
            shortfall: coupon.min_order_value - subtotal,
        };
        return (Money::zero(), application);
    }

    let raw = coupon.raw_discount(subtotal).non_negative();
    let capped = match coupon.max_discount {
        Some(cap) => raw.min(cap.non_negative()),
        None => raw,
    };
    let discount = capped.min(subtotal.non_negative());

    let application = CouponApplication {
        coupon: coupon.clone(),
        applicable: true,
        shortfall: Money::zero(),
    };
    (discount, application)
}

fn price_shipping(selection: &ShippingSelection, subtotal: Money) -> (Money, ShippingStatus) {
    match selection.fee(subtotal) {
        Ok(fee) => {
            let city_id = selection.city_id().unwrap_or_default().to_string();
            if fee.is_zero() {
                (Money::zero(), ShippingStatus::Waived { city_id })
            } else {
                (fee, ShippingStatus::Charged { city_id, fee })
            }
        }
        Err(ShippingError::NoCitySelected) => (Money::zero(), ShippingStatus::NotSelected),
        Err(reason) => (
            Money::zero(),
            ShippingStatus::Unavailable {
                city_id: selection.city_id().map(str::to_string),
                reason,
            },
        ),
    }
}

/// Computes the full price breakdown.
///
/// The tax region is the selected city id.
pub fn compute(
    items: &[CartLineItem],
    coupon: Option<&Coupon>,
    shipping: &ShippingSelection,
    tax_rule: &dyn TaxRule,
) -> OrderPricingSnapshot {
    let subtotal = subtotal(items);

    let (discount_amount, applied_coupon) = match coupon {
        Some(coupon) => {
            let (discount, application) = apply_coupon(coupon, subtotal);
            (discount, Some(application))
        }
        None => (Money::zero(), None),
    };

    let (shipping_amount, shipping_status) = price_shipping(shipping, subtotal);
    let tax_amount = tax_rule.tax(subtotal, shipping.city_id()).non_negative();
    let total = (subtotal - discount_amount + shipping_amount + tax_amount).non_negative();

    OrderPricingSnapshot {
        subtotal,
        discount_amount,
        shipping_amount,
        tax_amount,
        total,
        applied_coupon,
        shipping: shipping_status,
        item_count: items.len(),
        total_quantity: items.iter().map(|item| item.quantity).sum(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
