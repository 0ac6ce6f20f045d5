//! # Persisted Cart
//!
//! The shape the cart is saved in between sessions.
//!
//! Only inputs are stored: line items, the attached coupon and the selected
//! city id. Totals are never stored; on reload they are recomputed through
//! the same pricing path as every mutation, and the city id is resolved
//! against the current city list.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{CartLineItem, Coupon};

/// Storage key for the saved cart.
pub const STORAGE_KEY: &str = "basket.cart.v1";

/// Format version written by this build.
pub const PERSISTED_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCart {
    pub version: u32,
    #[serde(default)]
    pub items: Vec<CartLineItem>,
    #[serde(default)]
    pub coupon: Option<Coupon>,
    #[serde(default)]
    pub city_id: Option<String>,
}

impl Default for PersistedCart {
    fn default() -> Self {
        PersistedCart {
            version: PERSISTED_VERSION,
            items: Vec::new(),
            coupon: None,
            city_id: None,
        }
    }
}

impl PersistedCart {
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::malformed("persisted cart", e.to_string()))
    }

    /// Parses a saved cart. Unknown versions are refused rather than guessed.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let cart: PersistedCart =
            serde_json::from_str(json).map_err(|e| CoreError::malformed("persisted cart", e.to_string()))?;

        if cart.version != PERSISTED_VERSION {
            return Err(CoreError::malformed(
                "persisted cart",
                format!("unsupported version {}", cart.version),
            ));
        }
        Ok(cart)
    }
}
