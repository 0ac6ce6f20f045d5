//! # basket-core: Pure Pricing & Promotion Logic
//!
//! This crate holds the storefront basket's business logic as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Basket Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/storefront (CheckoutSession)               │   │
//! │  │   add/remove items ─► apply code ─► pick city ─► submit order   │   │
//! │  └───────────┬─────────────────────────────────────┬───────────────┘   │
//! │              │                                     │ HTTP               │
//! │  ┌───────────▼─────────────────────────────┐   ┌───▼───────────────┐   │
//! │  │       ★ basket-core (THIS CRATE) ★      │   │  Storefront API   │   │
//! │  │                                         │   │  (authoritative)  │   │
//! │  │  cart ──► pricing ──► snapshot          │   └───────────────────┘   │
//! │  │   │         ▲   ▲                       │                           │
//! │  │   │    shipping tax                     │                           │
//! │  │   ▼                                     │                           │
//! │  │  promotion (sequence-numbered lookups)  │                           │
//! │  │                                         │                           │
//! │  │  NO I/O • NO CLOCK • PURE FUNCTIONS     │                           │
//! │  └───────────┬─────────────────────────────┘                           │
//! │              │                                                          │
//! │  ┌───────────▼─────────────────────────────────────────────────────┐   │
//! │  │              basket-db (SQLite: saved cart, coupons)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`types`] - Line items, coupons, city shipping config, percentages
//! - [`validation`] - Input rules (coupon codes, quantities, ids)
//! - [`wire`] - API payloads and their conversion into domain types
//! - [`shipping`] - City lookup and shipping fees
//! - [`tax`] - Order-level tax rules
//! - [`pricing`] - The price breakdown
//! - [`eligibility`] - Whether a coupon may be applied
//! - [`promotion`] - Discount code lookup state machine
//! - [`cart`] - Cart reducer and store
//! - [`persist`] - Saved cart format
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use basket_core::{CartLineItem, CartStore, Money, TaxPolicy};
//! use basket_core::shipping::ShippingRateResolver;
//!
//! let mut cart = CartStore::new(ShippingRateResolver::default(), TaxPolicy::None);
//! cart.add_item(CartLineItem::new("MUG", "Mug", Money::from_cents(1099), 5).with_quantity(2))
//!     .unwrap();
//!
//! assert_eq!(cart.snapshot().subtotal.cents(), 2198);
//! // No city yet, so checkout is blocked
//! assert!(!cart.snapshot().is_checkout_ready());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod eligibility;
pub mod error;
pub mod money;
pub mod persist;
pub mod pricing;
pub mod promotion;
pub mod shipping;
pub mod tax;
pub mod types;
pub mod validation;
pub mod wire;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{CartCommand, CartNotice, CartState, CartStore};
pub use error::{CoreError, CoreResult, RejectionReason, ShippingError, StockError, ValidationError};
pub use money::Money;
pub use pricing::{OrderPricingSnapshot, ShippingStatus};
pub use promotion::{PromotionOutcome, PromotionState, PromotionValidator};
pub use tax::{RegionalTax, TaxPolicy, TaxRule};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line, regardless of stock.
///
/// Catches typos such as 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum unit or bundle price in cents (100,000,000.00).
///
/// With [`MAX_ITEM_QUANTITY`] and [`MAX_CART_ITEMS`] this keeps every cart
/// total far inside `i64`.
pub const MAX_UNIT_PRICE: i64 = 10_000_000_000;

/// Maximum length of a discount code.
pub const MAX_CODE_LENGTH: usize = 32;
