//! # Wire Payloads
//!
//! Loosely-typed JSON shapes exchanged with the storefront API, and their
//! conversion into validated domain types.
//!
//! ## Boundary Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   JSON ──► *Payload (this module) ──► TryFrom ──► Coupon / City         │
//! │            strings or numbers         validated    exact cents          │
//! │            nullable everything        or rejected  upper-case codes     │
//! │                                                                         │
//! │   Nothing past TryFrom ever sees a float or an unchecked string.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Amounts arrive as `"12.50"` or `12.5`; both are accepted and parsed
//! exactly. Outgoing amounts are always decimal strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::{parse_hundredths, Money};
use crate::types::{CartLineItem, CityShippingConfig, Coupon, DiscountKind, Percent};
use crate::validation::normalize_coupon_code;

// =============================================================================
// Scalars
// =============================================================================

/// A decimal amount as the API sends it: a string or a JSON number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Text(String),
    Number(serde_json::Number),
}

impl Amount {
    /// Wraps money as the outgoing decimal string.
    pub fn from_money(money: Money) -> Self {
        Amount::Text(money.to_decimal_string())
    }

    fn hundredths(&self, what: &str) -> CoreResult<i64> {
        let text = match self {
            Amount::Text(text) => text.clone(),
            Amount::Number(number) => number.to_string(),
        };
        parse_hundredths(&text)
            .ok_or_else(|| CoreError::malformed(what, format!("'{}' is not a decimal amount", text)))
    }

    /// Parses as money (cents).
    pub fn to_money(&self, what: &str) -> CoreResult<Money> {
        self.hundredths(what).map(Money::from_cents)
    }

    /// Parses as a percentage ("20" → 20%).
    pub fn to_percent(&self, what: &str) -> CoreResult<Percent> {
        let bps = self.hundredths(what)?;
        u32::try_from(bps)
            .map(Percent::from_bps)
            .map_err(|_| CoreError::malformed(what, format!("{} is not a valid percentage", bps)))
    }
}

/// An identifier the API may send as a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    pub fn into_string(self) -> String {
        match self {
            WireId::Text(text) => text,
            WireId::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for WireId {
    fn from(id: &str) -> Self {
        WireId::Text(id.to_string())
    }
}

/// Parses a coupon window boundary.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC) and a bare
/// `YYYY-MM-DD`. A bare end date covers the whole day.
fn parse_boundary(raw: &str, field: &str, end_of_day: bool) -> CoreResult<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            date.and_hms_opt(23, 59, 59)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        if let Some(naive) = time {
            return Ok(naive.and_utc());
        }
    }

    Err(CoreError::malformed(
        "coupon",
        format!("{} '{}' is not a date", field, raw),
    ))
}

// =============================================================================
// Coupon Payload
// =============================================================================

/// A coupon as returned by the lookup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponPayload {
    pub id: WireId,
    pub code: String,
    /// `"percentage"` or `"fixed"`.
    pub discount_type: String,
    pub discount_value: Amount,
    #[serde(default)]
    pub min_order_value: Option<Amount>,
    #[serde(default)]
    pub max_discount: Option<Amount>,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub per_user_limit: Option<i64>,
    #[serde(default)]
    pub usage_count: i64,
    #[serde(default)]
    pub is_first_order: bool,
    pub is_active: bool,
}

impl CouponPayload {
    /// Renders a domain coupon in wire form.
    pub fn from_coupon(coupon: &Coupon) -> Self {
        let (discount_type, discount_value) = match coupon.discount {
            DiscountKind::Percentage { rate } => ("percentage", Amount::Text(rate.to_decimal_string())),
            DiscountKind::Fixed { amount } => ("fixed", Amount::from_money(amount)),
        };

        CouponPayload {
            id: WireId::Text(coupon.id.clone()),
            code: coupon.code.clone(),
            discount_type: discount_type.to_string(),
            discount_value,
            min_order_value: Some(Amount::from_money(coupon.min_order_value)),
            max_discount: coupon.max_discount.map(Amount::from_money),
            start_date: coupon.start_date.to_rfc3339(),
            end_date: coupon.end_date.to_rfc3339(),
            usage_limit: coupon.usage_limit,
            per_user_limit: coupon.per_user_limit,
            usage_count: coupon.usage_count,
            is_first_order: coupon.is_first_order,
            is_active: coupon.is_active,
        }
    }
}

impl TryFrom<CouponPayload> for Coupon {
    type Error = CoreError;

    fn try_from(payload: CouponPayload) -> CoreResult<Self> {
        let code = normalize_coupon_code(&payload.code)
            .map_err(|e| CoreError::malformed("coupon", e.to_string()))?;

        let discount = match payload.discount_type.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" => DiscountKind::Percentage {
                rate: payload.discount_value.to_percent("coupon discount_value")?,
            },
            "fixed" | "amount" => DiscountKind::Fixed {
                amount: payload.discount_value.to_money("coupon discount_value")?,
            },
            other => {
                return Err(CoreError::malformed(
                    "coupon",
                    format!("unknown discount_type '{}'", other),
                ))
            }
        };

        let positive = match discount {
            DiscountKind::Percentage { rate } => !rate.is_zero(),
            DiscountKind::Fixed { amount } => amount.is_positive(),
        };
        if !positive {
            return Err(CoreError::malformed("coupon", "discount_value must be positive"));
        }

        let min_order_value = match payload.min_order_value {
            Some(amount) => amount.to_money("coupon min_order_value")?,
            None => Money::zero(),
        };
        if min_order_value.is_negative() {
            return Err(CoreError::malformed("coupon", "min_order_value is negative"));
        }

        let max_discount = payload
            .max_discount
            .map(|amount| amount.to_money("coupon max_discount"))
            .transpose()?;
        if matches!(max_discount, Some(cap) if cap.is_negative()) {
            return Err(CoreError::malformed("coupon", "max_discount is negative"));
        }

        let start_date = parse_boundary(&payload.start_date, "start_date", false)?;
        let end_date = parse_boundary(&payload.end_date, "end_date", true)?;
        if end_date < start_date {
            return Err(CoreError::malformed("coupon", "end_date is before start_date"));
        }

        if payload.usage_count < 0 {
            return Err(CoreError::malformed("coupon", "usage_count is negative"));
        }

        Ok(Coupon {
            id: payload.id.into_string(),
            code,
            discount,
            min_order_value,
            max_discount,
            start_date,
            end_date,
            usage_limit: payload.usage_limit,
            per_user_limit: payload.per_user_limit,
            usage_count: payload.usage_count,
            is_first_order: payload.is_first_order,
            is_active: payload.is_active,
        })
    }
}

// =============================================================================
// City Payload
// =============================================================================

/// One entry of the city list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityPayload {
    #[serde(alias = "city_id")]
    pub id: WireId,
    #[serde(default)]
    pub name: String,
    pub shipping_fee: Amount,
    #[serde(default = "default_has_shipping")]
    pub has_shipping: bool,
    #[serde(default)]
    pub free_shipping_threshold: Option<Amount>,
    #[serde(default)]
    pub always_charge_shipping: bool,
}

fn default_has_shipping() -> bool {
    true
}

impl CityPayload {
    pub fn from_config(config: &CityShippingConfig) -> Self {
        CityPayload {
            id: WireId::Text(config.city_id.clone()),
            name: config.name.clone(),
            shipping_fee: Amount::from_money(config.shipping_fee),
            has_shipping: config.has_shipping,
            free_shipping_threshold: config.free_shipping_threshold.map(Amount::from_money),
            always_charge_shipping: config.always_charge_shipping,
        }
    }
}

impl TryFrom<CityPayload> for CityShippingConfig {
    type Error = CoreError;

    fn try_from(payload: CityPayload) -> CoreResult<Self> {
        let city_id = payload.id.into_string();
        if city_id.trim().is_empty() {
            return Err(CoreError::malformed("city", "empty id"));
        }

        let shipping_fee = payload.shipping_fee.to_money("city shipping_fee")?;
        if shipping_fee.is_negative() {
            return Err(CoreError::malformed("city", format!("{} has a negative fee", city_id)));
        }

        let free_shipping_threshold = payload
            .free_shipping_threshold
            .map(|amount| amount.to_money("city free_shipping_threshold"))
            .transpose()?;
        if free_shipping_threshold.is_some_and(|threshold| threshold.is_negative()) {
            return Err(CoreError::malformed(
                "city",
                format!("{} has a negative free shipping threshold", city_id),
            ));
        }

        Ok(CityShippingConfig {
            city_id,
            name: payload.name,
            shipping_fee,
            has_shipping: payload.has_shipping,
            free_shipping_threshold,
            always_charge_shipping: payload.always_charge_shipping,
        })
    }
}

/// `GET /cities` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityListResponse {
    #[serde(default)]
    pub data: Vec<CityPayload>,
}

// =============================================================================
// Coupon Lookup
// =============================================================================

/// `POST /promo-codes/validate` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponLookupRequest {
    pub code: String,
    pub user_id: String,
    /// Decimal string, e.g. "40.00".
    pub subtotal: String,
}

impl CouponLookupRequest {
    pub fn new(code: impl Into<String>, user_id: impl Into<String>, subtotal: Money) -> Self {
        CouponLookupRequest {
            code: code.into(),
            user_id: user_id.into(),
            subtotal: subtotal.to_decimal_string(),
        }
    }
}

/// Lookup verdict from the server.
///
/// `promo` is null when the code does not exist. `reason` is only
/// meaningful when `applicable` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponLookupResponse {
    #[serde(default)]
    pub promo: Option<CouponPayload>,
    #[serde(default)]
    pub applicable: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

// =============================================================================
// Order Submission
// =============================================================================

/// One line of an order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub variant_id: String,
    pub quantity: i64,
}

impl From<&CartLineItem> for OrderLine {
    fn from(item: &CartLineItem) -> Self {
        OrderLine {
            variant_id: item.variant_id.clone(),
            quantity: item.quantity,
        }
    }
}

/// `POST /orders` request body.
///
/// Carries no prices: the server recomputes totals from its own catalog.
/// `shipping_amount` is the client quote, used by the server only to flag
/// disagreements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub user_id: String,
    pub address_id: String,
    pub promo_code_id: Option<String>,
    pub tax_percent: String,
    pub shipping_amount: String,
    pub items: Vec<OrderLine>,
}

/// Totals the server computed for a created order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub id: WireId,
    #[serde(default)]
    pub subtotal: Option<Amount>,
    #[serde(default)]
    pub discount_amount: Option<Amount>,
    #[serde(default)]
    pub shipping_amount: Option<Amount>,
    #[serde(default)]
    pub tax_amount: Option<Amount>,
    #[serde(default)]
    pub total: Option<Amount>,
}

impl Default for WireId {
    fn default() -> Self {
        WireId::Text(String::new())
    }
}

impl OrderReceipt {
    /// The server's grand total, when it sent one.
    pub fn total(&self) -> CoreResult<Option<Money>> {
        self.total
            .as_ref()
            .map(|amount| amount.to_money("order total"))
            .transpose()
    }
}

/// `POST /orders` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order: OrderReceipt,
}

// =============================================================================
// Unit Tests
// =============================================================================
