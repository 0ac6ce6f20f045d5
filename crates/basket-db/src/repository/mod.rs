//! # Repository Module
//!
//! Database repositories for the basket.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CheckoutSession                                                       │
//! │       │                                                                 │
//! │       │  db.storage().save_cart(&persisted)                            │
//! │       │  db.coupons().redeem(code, user, order_ref, ...)               │
//! │       ▼                                                                 │
//! │  Repository (owns a pool handle, holds all SQL)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Rows are decoded into private `*Row` structs and converted into       │
//! │  basket-core types at this boundary.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`StorageRepository`] - Key/value store holding the saved cart
//! - [`CityRepository`] - Delivery cities and shipping rules
//! - [`CouponRepository`] - Coupon lookup and atomic redemption

pub mod city;
pub mod coupon;
pub mod storage;

pub use city::CityRepository;
pub use coupon::CouponRepository;
pub use storage::StorageRepository;
