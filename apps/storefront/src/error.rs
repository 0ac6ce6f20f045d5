//! # App Error Type
//!
//! Unified error type returned by [`CheckoutSession`](crate::CheckoutSession)
//! operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CoreError::Network ──────────────► NETWORK_ERROR   (retriable)         │
//! │  CoreError::Eligibility ──────────► COUPON_REJECTED                     │
//! │  CoreError::Validation ───────────► VALIDATION_ERROR                    │
//! │  CoreError::Stock / Shipping ─────► CHECKOUT_BLOCKED                    │
//! │  DbError::* ──────────────────────► DATABASE_ERROR  (details logged)    │
//! │  reqwest::Error ──────────────────► NETWORK_ERROR   (retriable)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! This is what the UI receives when an operation fails:
//! ```json
//! {
//!   "code": "COUPON_REJECTED",
//!   "message": "Coupon rejected: this code has expired",
//!   "retriable": false
//! }
//! ```

use serde::Serialize;

use basket_core::CoreError;
use basket_db::DbError;

/// Error returned to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Whether the same call may succeed if retried.
    pub retriable: bool,
}

/// Error codes for UI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed
    ValidationError,

    /// The coupon is not eligible
    CouponRejected,

    /// A coupon lookup is already running
    LookupInFlight,

    /// A cart line was not found
    NotFound,

    /// Stock, shipping or an empty cart prevents checkout
    CheckoutBlocked,

    /// The storefront API could not be reached
    NetworkError,

    /// The storefront API answered with something unexpected
    BadResponse,

    /// Local storage failed
    DatabaseError,

    /// Internal error
    Internal,
}

impl AppError {
    /// Creates a new non-retriable error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError {
            code,
            message: message.into(),
            retriable: false,
        }
    }

    /// Creates a retriable network error.
    pub fn network(message: impl Into<String>) -> Self {
        AppError {
            code: ErrorCode::NetworkError,
            message: message.into(),
            retriable: true,
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        AppError::new(ErrorCode::Internal, message)
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Converts core errors to app errors.
impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::Validation(_) => AppError::new(ErrorCode::ValidationError, message),
            CoreError::Eligibility(_) => AppError::new(ErrorCode::CouponRejected, message),
            CoreError::Network { .. } => AppError::network(message),
            CoreError::Stock(_) | CoreError::ShippingUnavailable(_) | CoreError::EmptyCart => {
                AppError::new(ErrorCode::CheckoutBlocked, message)
            }
            CoreError::ItemNotFound { .. } => AppError::new(ErrorCode::NotFound, message),
            CoreError::LookupInFlight => AppError::new(ErrorCode::LookupInFlight, message),
            CoreError::MalformedPayload { .. } => {
                tracing::warn!(error = %message, "Unexpected storefront API payload");
                AppError::new(ErrorCode::BadResponse, message)
            }
        }
    }
}

/// Converts database errors to app errors.
impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::PoolExhausted => AppError {
                code: ErrorCode::DatabaseError,
                message: "Local storage is busy".to_string(),
                retriable: true,
            },
            other => {
                // Log the actual error but return a generic message
                tracing::error!(error = %other, "Local storage failed");
                AppError::new(ErrorCode::DatabaseError, "Local storage failed")
            }
        }
    }
}

/// Converts HTTP client errors to app errors.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            AppError::internal(format!("HTTP client setup failed: {}", err))
        } else if err.is_decode() {
            AppError::new(ErrorCode::BadResponse, err.to_string())
        } else {
            AppError::network(err.to_string())
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;
    use basket_core::{RejectionReason, ShippingError};

    #[test]
    fn test_network_errors_are_retriable() {
        let err = AppError::from(CoreError::network("timed out"));
        assert_eq!(err.code, ErrorCode::NetworkError);
        assert!(err.retriable);
    }

    #[test]
    fn test_rejection_keeps_reason_text() {
        let err = AppError::from(CoreError::Eligibility(RejectionReason::Expired));
        assert_eq!(err.code, ErrorCode::CouponRejected);
        assert!(err.message.contains("expired"));
        assert!(!err.retriable);
    }

    #[test]
    fn test_shipping_blocks_checkout() {
        let err = AppError::from(CoreError::ShippingUnavailable(ShippingError::NoCitySelected));
        assert_eq!(err.code, ErrorCode::CheckoutBlocked);
    }

    #[test]
    fn test_db_error_message_is_generic() {
        let err = AppError::from(DbError::QueryFailed("syntax error near SELECT".into()));
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.message, "Local storage failed");
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(AppError::network("offline")).unwrap();
        assert_eq!(json["code"], "NETWORK_ERROR");
        assert_eq!(json["retriable"], true);
    }
}
