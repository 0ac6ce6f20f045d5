//! # Error Types
//!
//! Domain-specific error types for basket-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  basket-core errors (this file)                                        │
//! │  ├── CoreError          - Everything a cart/checkout call can fail with│
//! │  ├── ValidationError    - Malformed input (empty code, bad amount)     │
//! │  ├── RejectionReason    - Why a coupon is not eligible                 │
//! │  ├── StockError         - Item cannot be carried at all                │
//! │  └── ShippingError      - City missing or not serviceable              │
//! │                                                                         │
//! │  basket-db errors (separate crate)                                     │
//! │  └── DbError            - Database operation failures                  │
//! │                                                                         │
//! │  storefront app errors                                                 │
//! │  └── AppError           - What the UI sees (code + message)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Recovery Policy
//! Nothing here is fatal. Coupon errors are shown next to the code field,
//! stock and shipping errors only block the checkout action, and network
//! errors can be retried. The cart survives every error path unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Input validation failed (empty or malformed coupon code, bad quantity).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The coupon was looked up but is not eligible for this cart/user.
    #[error("Coupon rejected: {0}")]
    Eligibility(RejectionReason),

    /// The coupon lookup could not reach the storefront API.
    ///
    /// Retriable: the cart is untouched and the shopper can submit again.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The item cannot be carried at all.
    #[error("Stock error: {0}")]
    Stock(#[from] StockError),

    /// The delivery city cannot be shipped to. Blocks checkout only.
    #[error("Shipping unavailable: {0}")]
    ShippingUnavailable(#[from] ShippingError),

    /// A line item command referenced a variant that is not in the cart.
    #[error("Variant {variant_id} is not in the cart")]
    ItemNotFound { variant_id: String },

    /// A coupon lookup is already outstanding.
    ///
    /// ## When This Occurs
    /// The UI failed to disable the apply button while validating.
    #[error("A coupon lookup is already in progress")]
    LookupInFlight,

    /// A payload from the storefront API did not have the expected shape.
    #[error("Malformed {what}: {reason}")]
    MalformedPayload { what: String, reason: String },

    /// Checkout was attempted with no line items.
    #[error("Cart is empty")]
    EmptyCart,
}

impl CoreError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        CoreError::Network {
            message: message.into(),
        }
    }

    /// Creates a malformed payload error.
    pub fn malformed(what: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::MalformedPayload {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, CoreError::Network { .. })
    }

    /// Whether this error only prevents checkout (the cart itself is fine).
    pub fn blocks_checkout(&self) -> bool {
        matches!(
            self,
            CoreError::ShippingUnavailable(_) | CoreError::Stock(_) | CoreError::EmptyCart
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., coupon code characters, decimal amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Rejection Reason
// =============================================================================

/// Why a coupon is not applicable.
///
/// The storefront API reports these as kebab-case codes; they are surfaced
/// to the shopper verbatim. Codes this client does not know are kept as
/// [`RejectionReason::Other`] rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RejectionReason {
    NotFound,
    Inactive,
    Expired,
    NotYetStarted,
    UsageLimitReached,
    PerUserLimitReached,
    BelowMinimum,
    FirstOrderOnly,
    Other(String),
}

impl RejectionReason {
    /// Wire code for this reason.
    pub fn as_code(&self) -> &str {
        match self {
            RejectionReason::NotFound => "not-found",
            RejectionReason::Inactive => "inactive",
            RejectionReason::Expired => "expired",
            RejectionReason::NotYetStarted => "not-yet-started",
            RejectionReason::UsageLimitReached => "usage-limit-reached",
            RejectionReason::PerUserLimitReached => "per-user-limit-reached",
            RejectionReason::BelowMinimum => "below-minimum",
            RejectionReason::FirstOrderOnly => "first-order-only",
            RejectionReason::Other(code) => code,
        }
    }

    /// Parses a wire code. Accepts snake_case and upper-case spellings too.
    pub fn from_code(code: &str) -> Self {
        let normalized = code.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "not-found" => RejectionReason::NotFound,
            "inactive" => RejectionReason::Inactive,
            "expired" => RejectionReason::Expired,
            "not-yet-started" => RejectionReason::NotYetStarted,
            "usage-limit-reached" => RejectionReason::UsageLimitReached,
            "per-user-limit-reached" => RejectionReason::PerUserLimitReached,
            "below-minimum" => RejectionReason::BelowMinimum,
            "first-order-only" => RejectionReason::FirstOrderOnly,
            _ => RejectionReason::Other(code.trim().to_string()),
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            RejectionReason::NotFound => "this code does not exist",
            RejectionReason::Inactive => "this code is no longer active",
            RejectionReason::Expired => "this code has expired",
            RejectionReason::NotYetStarted => "this code is not valid yet",
            RejectionReason::UsageLimitReached => "this code has been fully redeemed",
            RejectionReason::PerUserLimitReached => "you have already used this code",
            RejectionReason::BelowMinimum => "your order is below the minimum for this code",
            RejectionReason::FirstOrderOnly => "this code is only valid on a first order",
            RejectionReason::Other(reason) => reason,
        };
        f.write_str(message)
    }
}

impl From<String> for RejectionReason {
    fn from(code: String) -> Self {
        RejectionReason::from_code(&code)
    }
}

impl From<RejectionReason> for String {
    fn from(reason: RejectionReason) -> Self {
        reason.as_code().to_string()
    }
}

// =============================================================================
// Stock & Shipping Errors
// =============================================================================

/// Stock problems that cannot be resolved by clamping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// The variant has no stock left to put in the cart.
    #[error("{variant_id} is out of stock")]
    OutOfStock { variant_id: String },
}

/// Why shipping cannot be quoted for the selected delivery city.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShippingError {
    /// No delivery city has been chosen yet.
    #[error("no delivery city selected")]
    NoCitySelected,

    /// The city id is not in the shipping configuration.
    #[error("city {city_id} was not found")]
    CityNotFound { city_id: String },

    /// The city exists but is not serviced.
    #[error("we do not deliver to {city_id}")]
    NotServiceable { city_id: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::ItemNotFound {
            variant_id: "TEE-RED-M".to_string(),
        };
        assert_eq!(err.to_string(), "Variant TEE-RED-M is not in the cart");

        let err = CoreError::Eligibility(RejectionReason::Expired);
        assert_eq!(err.to_string(), "Coupon rejected: this code has expired");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "code".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert!(!core_err.is_retriable());
    }

    #[test]
    fn test_rejection_codes_roundtrip() {
        for reason in [
            RejectionReason::NotFound,
            RejectionReason::Inactive,
            RejectionReason::Expired,
            RejectionReason::NotYetStarted,
            RejectionReason::UsageLimitReached,
            RejectionReason::PerUserLimitReached,
            RejectionReason::BelowMinimum,
            RejectionReason::FirstOrderOnly,
        ] {
            assert_eq!(RejectionReason::from_code(reason.as_code()), reason);
        }
    }

    #[test]
    fn test_rejection_code_spellings() {
        assert_eq!(
            RejectionReason::from_code("USAGE_LIMIT_REACHED"),
            RejectionReason::UsageLimitReached
        );
        assert_eq!(
            RejectionReason::from_code("region-locked"),
            RejectionReason::Other("region-locked".to_string())
        );
        assert_eq!(
            RejectionReason::Other("region-locked".to_string()).to_string(),
            "region-locked"
        );
    }

    #[test]
    fn test_rejection_serializes_as_code() {
        let json = serde_json::to_string(&RejectionReason::BelowMinimum).unwrap();
        assert_eq!(json, "\"below-minimum\"");
        let back: RejectionReason = serde_json::from_str("\"first-order-only\"").unwrap();
        assert_eq!(back, RejectionReason::FirstOrderOnly);
    }

    #[test]
    fn test_error_classification() {
        assert!(CoreError::network("timeout").is_retriable());
        assert!(CoreError::ShippingUnavailable(ShippingError::NoCitySelected).blocks_checkout());
        assert!(CoreError::EmptyCart.blocks_checkout());
        assert!(!CoreError::LookupInFlight.blocks_checkout());
    }
}
