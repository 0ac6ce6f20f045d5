//! # Basket Storefront
//!
//! The client-side checkout layer: a [`CheckoutSession`] owns the cart and
//! the coupon validator, saves the cart to SQLite after every change, and
//! talks to the storefront API through the [`StorefrontApi`] seam.
//!
//! ## Module Organization
//! ```text
//! basket_storefront/
//! ├── lib.rs          ◄─── You are here (module wiring)
//! ├── config.rs       ◄─── StorefrontConfig (TOML + BASKET_* env)
//! ├── telemetry.rs    ◄─── tracing subscriber setup
//! ├── api.rs          ◄─── StorefrontApi trait + reqwest client
//! ├── session.rs      ◄─── CheckoutSession (cart, promotion, persistence)
//! ├── checkout.rs     ◄─── Order submission building and reconciliation
//! └── error.rs        ◄─── AppError for the UI
//! ```
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  UI action ──► CheckoutSession ──► CartStore::dispatch (pure, sync)     │
//! │                      │                       │                          │
//! │                      │                       ▼                          │
//! │                      │             snapshot recomputed                  │
//! │                      ▼                                                  │
//! │              storage().save_cart()  (lock released first)               │
//! │                                                                         │
//! │  Coupon: submit ──► StorefrontApi::lookup_coupon ──► receive(sequence)  │
//! │          stale responses are discarded by sequence number               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod checkout;
pub mod config;
pub mod error;
pub mod session;
pub mod telemetry;

pub use api::{HttpStorefrontApi, StorefrontApi};
pub use config::{ConfigError, StorefrontConfig};
pub use error::{AppError, AppResult, ErrorCode};
pub use session::CheckoutSession;
