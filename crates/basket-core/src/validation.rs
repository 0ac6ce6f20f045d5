//! # Validation Module
//!
//! Input validation for cart commands and coupon submission.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI                                                           │
//! │  ├── Disable "apply" while a lookup is running                        │
//! │  └── Immediate feedback on empty input                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: basket-core (THIS MODULE + wire parsing)                     │
//! │  ├── Coupon code normalization and format                              │
//! │  ├── Line item sanity (ids, prices, stock)                             │
//! │  └── Payload shape (see wire.rs)                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Storefront API (authoritative)                               │
//! │  ├── Coupon eligibility with shared usage counters                     │
//! │  └── Order totals recomputed at submission                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::CartLineItem;
use crate::{MAX_CART_ITEMS, MAX_CODE_LENGTH, MAX_ITEM_QUANTITY, MAX_UNIT_PRICE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates and normalizes a coupon code.
///
/// ## Rules
/// - Surrounding whitespace is ignored
/// - Must not be empty
/// - At most [`MAX_CODE_LENGTH`] characters
/// - Letters, digits, hyphens and underscores only
///
/// ## Returns
/// The upper-cased code, which is the form the storefront API stores.
///
/// ## Example
/// ```rust
/// use basket_core::validation::normalize_coupon_code;
///
/// assert_eq!(normalize_coupon_code("  save20 ").unwrap(), "SAVE20");
/// assert!(normalize_coupon_code("   ").is_err());
/// assert!(normalize_coupon_code("SAVE 20").is_err());
/// ```
pub fn normalize_coupon_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.chars().count() > MAX_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_CODE_LENGTH,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(code.to_ascii_uppercase())
}

/// Validates an identifier (variant id, city id, user id).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 128 characters
pub fn validate_identifier(field: &str, id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > 128 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 128,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a requested quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// Stock clamping happens later in the cart; this only rejects values no
/// cart should ever hold.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price.
///
/// ## Rules
/// - Must be non-negative (zero is allowed for free gifts)
/// - Must not exceed MAX_UNIT_PRICE
pub fn validate_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() || price.cents() > MAX_UNIT_PRICE {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_UNIT_PRICE,
        });
    }

    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates a line item before it enters the cart.
///
/// Stock is not checked here: a `stock_limit` below 1 is a stock error,
/// raised by the cart, not a malformed item.
pub fn validate_line_item(item: &CartLineItem) -> ValidationResult<()> {
    validate_identifier("variant_id", &item.variant_id)?;
    validate_price("price_before_vat", item.price_before_vat)?;
    validate_quantity(item.quantity)?;

    if let Some(units) = item.bundle_quantity {
        if units <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "bundle_quantity".to_string(),
            });
        }
    }

    Ok(())
}

/// Validates cart size (number of distinct lines) before adding one more.
///
/// ## Rules
/// - Must not exceed MAX_CART_ITEMS (100)
pub fn validate_cart_size(current_items: usize) -> ValidationResult<()> {
    if current_items >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_coupon_code() {
        assert_eq!(normalize_coupon_code("save20").unwrap(), "SAVE20");
        assert_eq!(normalize_coupon_code(" Black-Friday_24 ").unwrap(), "BLACK-FRIDAY_24");

        assert!(matches!(
            normalize_coupon_code(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            normalize_coupon_code("has space"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            normalize_coupon_code(&"A".repeat(MAX_CODE_LENGTH + 1)),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(normalize_coupon_code("ÉTÉ").is_err());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("variant_id", "TEE-RED-M").is_ok());
        assert!(validate_identifier("variant_id", "  ").is_err());
        assert!(validate_identifier("variant_id", &"x".repeat(200)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_line_item() {
        let item = CartLineItem::new("MUG", "Mug", Money::from_cents(1000), 5);
        assert!(validate_line_item(&item).is_ok());

        let negative = CartLineItem::new("MUG", "Mug", Money::from_cents(-1), 5);
        assert!(validate_line_item(&negative).is_err());

        let empty_bundle = item.clone().as_bundle(0);
        assert!(validate_line_item(&empty_bundle).is_err());
    }

    #[test]
    fn test_validate_price_bounds() {
        assert!(validate_price("price", Money::zero()).is_ok());
        assert!(validate_price("price", Money::from_cents(MAX_UNIT_PRICE)).is_ok());

        assert!(matches!(
            validate_price("price", Money::from_cents(MAX_UNIT_PRICE + 1)),
            Err(ValidationError::OutOfRange { max: MAX_UNIT_PRICE, .. })
        ));
        assert!(validate_price("price", Money::from_cents(i64::MAX)).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(0).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS - 1).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS).is_err());
    }
}
