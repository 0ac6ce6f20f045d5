//! # Domain Types
//!
//! Core domain types used throughout the basket.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌────────────────────┐    │
//! │  │  CartLineItem   │   │     Coupon      │   │ CityShippingConfig │    │
//! │  │  ─────────────  │   │  ─────────────  │   │  ────────────────  │    │
//! │  │  variant_id     │   │  code (UPPER)   │   │  city_id           │    │
//! │  │  price_before_  │   │  discount       │   │  shipping_fee      │    │
//! │  │    vat          │   │  min_order_value│   │  has_shipping      │    │
//! │  │  quantity       │   │  max_discount   │   │  free_shipping_    │    │
//! │  │  stock_limit    │   │  window, limits │   │    threshold       │    │
//! │  └─────────────────┘   └─────────────────┘   └────────────────────┘    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │    Percent      │   │  DiscountKind   │                             │
//! │  │  ─────────────  │   │  ─────────────  │                             │
//! │  │  bps (u32)      │   │  Percentage     │                             │
//! │  │  2000 = 20%     │   │  Fixed          │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Coupons and cities are authored elsewhere (admin side) and are read-only
//! here. Line items are owned exclusively by the cart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{parse_hundredths, Money};

// =============================================================================
// Percent
// =============================================================================

/// A percentage represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 825 bps = 8.25%, 2000 bps = 20%
///
/// Used for VAT, percentage coupons, and order-level tax. Values above 100%
/// are representable on purpose: a misconfigured 500% coupon must still be
/// priced (and clamped) rather than crash the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Percent(u32);

impl Percent {
    /// Creates a percentage from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Percent(bps)
    }

    /// Creates a percentage from a whole number of percent.
    #[inline]
    pub const fn from_whole(percent: u32) -> Self {
        Percent(percent * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero percent.
    #[inline]
    pub const fn zero() -> Self {
        Percent(0)
    }

    /// Checks if the percentage is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parses a decimal percentage ("8.25" → 825 bps).
    pub fn parse_decimal(input: &str) -> Result<Self, ValidationError> {
        match parse_hundredths(input) {
            Some(bps) if bps >= 0 && bps <= u32::MAX as i64 => Ok(Percent(bps as u32)),
            _ => Err(ValidationError::InvalidFormat {
                field: "percent".to_string(),
                reason: format!("'{}' is not a non-negative percentage", input.trim()),
            }),
        }
    }

    /// Formats as a decimal string without the percent sign ("8.25", "20.00").
    pub fn to_decimal_string(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Default for Percent {
    fn default() -> Self {
        Percent::zero()
    }
}

impl std::fmt::Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.to_decimal_string())
    }
}

// =============================================================================
// Cart Line Item
// =============================================================================

/// A priced variant in the cart.
///
/// ## Bundles
/// A bundle is a fixed multi-unit pack priced as a whole.
/// `price_before_vat` is the price of ONE bundle; `bundle_quantity` (units
/// per bundle) is shown to the shopper but never multiplied into the price.
///
/// ## VAT
/// `vat_percent` is the per-item VAT already embedded in the displayed
/// price story. It feeds the display helpers below and is NOT part of the
/// order totals, which use the order-level tax rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLineItem {
    /// Variant identifier; lines are unique by this id.
    pub variant_id: String,

    /// Display name (product name, optionally with variant suffix).
    pub name: String,

    /// Price per unit, or per bundle when `is_bundle`.
    pub price_before_vat: Money,

    /// VAT rate embedded in the display price.
    pub vat_percent: Percent,

    /// Number of units (or bundles) in the cart. Always `1..=stock_limit`.
    pub quantity: i64,

    /// Maximum purchasable quantity reported by the catalog.
    pub stock_limit: i64,

    /// Whether this line is a fixed multi-unit pack.
    #[serde(default)]
    pub is_bundle: bool,

    /// Units contained in one bundle (display only).
    #[serde(default)]
    pub bundle_quantity: Option<i64>,

    /// Selected variant attribute labels, e.g. ["Red", "M"] (display only).
    #[serde(default)]
    pub types: Vec<String>,

    /// Image URL (display only).
    #[serde(default)]
    pub image: Option<String>,
}

impl CartLineItem {
    /// Creates a plain (non-bundle) line item with quantity 1.
    pub fn new(
        variant_id: impl Into<String>,
        name: impl Into<String>,
        price_before_vat: Money,
        stock_limit: i64,
    ) -> Self {
        CartLineItem {
            variant_id: variant_id.into(),
            name: name.into(),
            price_before_vat,
            vat_percent: Percent::zero(),
            quantity: 1,
            stock_limit,
            is_bundle: false,
            bundle_quantity: None,
            types: Vec::new(),
            image: None,
        }
    }

    /// Sets the quantity (builder style, unclamped; the cart clamps).
    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    /// Sets the display VAT rate.
    pub fn with_vat(mut self, vat_percent: Percent) -> Self {
        self.vat_percent = vat_percent;
        self
    }

    /// Marks the line as a bundle of `units` units priced as a whole.
    pub fn as_bundle(mut self, units: i64) -> Self {
        self.is_bundle = true;
        self.bundle_quantity = Some(units);
        self
    }

    /// Sets the variant attribute labels.
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Line total before VAT (`price_before_vat × quantity`).
    #[inline]
    pub fn line_total(&self) -> Money {
        self.price_before_vat.multiply_quantity(self.quantity)
    }

    /// VAT contained in one unit/bundle, for display.
    pub fn vat_amount(&self) -> Money {
        self.price_before_vat.percent(self.vat_percent)
    }

    /// Unit/bundle price including VAT, for display.
    pub fn price_with_vat(&self) -> Money {
        self.price_before_vat + self.vat_amount()
    }

    /// Total units shipped for this line (bundles expanded), for display.
    pub fn unit_count(&self) -> i64 {
        match (self.is_bundle, self.bundle_quantity) {
            (true, Some(units)) => units * self.quantity,
            _ => self.quantity,
        }
    }

    /// Human label such as "T-Shirt (Red / M)".
    pub fn display_name(&self) -> String {
        if self.types.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.types.join(" / "))
        }
    }
}

// =============================================================================
// Coupon
// =============================================================================

/// How a coupon discounts the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountKind {
    /// A percentage of the subtotal, optionally capped by `max_discount`.
    Percentage { rate: Percent },
    /// A flat amount off the subtotal.
    Fixed { amount: Money },
}

/// A server-authored discount rule.
///
/// Parsed and validated at the network boundary
/// (see [`crate::wire::CouponPayload`]); everything downstream can rely on
/// `code` being upper-case and the discount value being positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Coupon {
    /// Server-side identifier, sent back on order submission.
    pub id: String,

    /// Case-normalized (upper-case) code.
    pub code: String,

    /// Percentage or fixed discount.
    pub discount: DiscountKind,

    /// Minimum subtotal for the coupon to apply.
    pub min_order_value: Money,

    /// Cap on the discount amount (meaningful for percentage coupons).
    pub max_discount: Option<Money>,

    /// Start of the validity window (inclusive).
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,

    /// End of the validity window (inclusive).
    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,

    /// Total redemptions allowed across all shoppers (None = unlimited).
    pub usage_limit: Option<i64>,

    /// Redemptions allowed per shopper (None = unlimited).
    pub per_user_limit: Option<i64>,

    /// Redemptions so far, as last reported by the server.
    pub usage_count: i64,

    /// Restricts the coupon to shoppers placing their first order.
    pub is_first_order: bool,

    /// Admin kill switch.
    pub is_active: bool,
}

impl Coupon {
    /// The undiscounted amount this coupon would take off `subtotal`
    /// before any clamping.
    pub fn raw_discount(&self, subtotal: Money) -> Money {
        match self.discount {
            DiscountKind::Percentage { rate } => subtotal.percent(rate),
            DiscountKind::Fixed { amount } => amount,
        }
    }

    /// Whether `subtotal` reaches the minimum order value.
    #[inline]
    pub fn meets_minimum(&self, subtotal: Money) -> bool {
        subtotal >= self.min_order_value
    }

    /// Whether `now` falls inside the validity window.
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_date && now <= self.end_date
    }

    /// Whether the global usage limit is exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.usage_limit, Some(limit) if self.usage_count >= limit)
    }
}

// =============================================================================
// City Shipping Configuration
// =============================================================================

/// Shipping rules for one delivery city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CityShippingConfig {
    /// City identifier (also used as the tax region key).
    pub city_id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Fee charged when shipping is not waived.
    pub shipping_fee: Money,

    /// Whether the city is serviced at all.
    pub has_shipping: bool,

    /// Subtotal at or above which shipping is waived (None = never waived).
    pub free_shipping_threshold: Option<Money>,

    /// Charge `shipping_fee` even above the free-shipping threshold.
    #[serde(default)]
    pub always_charge_shipping: bool,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn coupon(discount: DiscountKind) -> Coupon {
        Coupon {
            id: "c-1".to_string(),
            code: "SAVE".to_string(),
            discount,
            min_order_value: Money::from_cents(2000),
            max_discount: None,
            start_date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap(),
            usage_limit: Some(10),
            per_user_limit: None,
            usage_count: 10,
            is_first_order: false,
            is_active: true,
        }
    }

    #[test]
    fn test_percent_parse_and_display() {
        let rate = Percent::parse_decimal("8.25").unwrap();
        assert_eq!(rate.bps(), 825);
        assert_eq!(rate.to_string(), "8.25%");
        assert_eq!(Percent::from_whole(20).bps(), 2000);
        assert!(Percent::parse_decimal("-1").is_err());
        assert!(Percent::parse_decimal("ten").is_err());
    }

    #[test]
    fn test_line_total_bundle_priced_per_bundle() {
        let item = CartLineItem::new("SOCKS-6PK", "Socks", Money::from_cents(1200), 10)
            .as_bundle(6)
            .with_quantity(2);

        // 2 bundles × 12.00, never 6 × 2 × 12.00
        assert_eq!(item.line_total().cents(), 2400);
        assert_eq!(item.unit_count(), 12);
    }

    #[test]
    fn test_vat_display_helpers() {
        let item = CartLineItem::new("MUG", "Mug", Money::from_cents(1000), 5)
            .with_vat(Percent::from_whole(15));
        assert_eq!(item.vat_amount().cents(), 150);
        assert_eq!(item.price_with_vat().cents(), 1150);
    }

    #[test]
    fn test_display_name_with_types() {
        let item = CartLineItem::new("TEE-RED-M", "T-Shirt", Money::from_cents(1500), 3)
            .with_types(["Red", "M"]);
        assert_eq!(item.display_name(), "T-Shirt (Red / M)");
    }

    #[test]
    fn test_coupon_helpers() {
        let c = coupon(DiscountKind::Percentage {
            rate: Percent::from_whole(20),
        });
        assert_eq!(c.raw_discount(Money::from_cents(4000)).cents(), 800);
        assert!(c.meets_minimum(Money::from_cents(2000)));
        assert!(!c.meets_minimum(Money::from_cents(1999)));
        assert!(c.is_exhausted());

        let inside = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        assert!(c.is_within_window(inside));
        assert!(!c.is_within_window(after));
    }

    #[test]
    fn test_fixed_raw_discount_ignores_subtotal() {
        let c = coupon(DiscountKind::Fixed {
            amount: Money::from_cents(1500),
        });
        assert_eq!(c.raw_discount(Money::from_cents(1000)).cents(), 1500);
    }
}
