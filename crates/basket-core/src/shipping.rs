//! # Shipping Module
//!
//! City lookup and shipping fee rules.
//!
//! ## Fee Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  compute_fee(config, subtotal)                                          │
//! │                                                                         │
//! │  has_shipping = false? ─── yes ──► Err(NotServiceable)  (blocks        │
//! │        │ no                                               checkout)    │
//! │        ▼                                                                │
//! │  always_charge_shipping? ── yes ──► shipping_fee                        │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │  subtotal ≥ free_shipping_threshold? ── yes ──► 0                       │
//! │        │ no (or no threshold)                                           │
//! │        ▼                                                                │
//! │  shipping_fee                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreResult, ShippingError};
use crate::money::Money;
use crate::types::CityShippingConfig;
use crate::wire::CityListResponse;

// =============================================================================
// Fee Computation
// =============================================================================

/// Computes the shipping fee for `subtotal` under `config`.
///
/// An unserviceable city is an error, never a silent zero.
///
/// ## Example
/// ```rust
/// use basket_core::money::Money;
/// use basket_core::shipping::compute_fee;
/// use basket_core::types::CityShippingConfig;
///
/// let city = CityShippingConfig {
///     city_id: "riyadh".into(),
///     name: "Riyadh".into(),
///     shipping_fee: Money::from_cents(1000),
///     has_shipping: true,
///     free_shipping_threshold: Some(Money::from_cents(20000)),
///     always_charge_shipping: false,
/// };
/// assert_eq!(compute_fee(&city, Money::from_cents(5000)).unwrap().cents(), 1000);
/// assert!(compute_fee(&city, Money::from_cents(20000)).unwrap().is_zero());
/// ```
pub fn compute_fee(config: &CityShippingConfig, subtotal: Money) -> Result<Money, ShippingError> {
    if !config.has_shipping {
        return Err(ShippingError::NotServiceable {
            city_id: config.city_id.clone(),
        });
    }

    if config.always_charge_shipping {
        return Ok(config.shipping_fee);
    }

    match config.free_shipping_threshold {
        Some(threshold) if subtotal >= threshold => Ok(Money::zero()),
        _ => Ok(config.shipping_fee),
    }
}

// =============================================================================
// Shipping Selection
// =============================================================================

/// The delivery city as the cart currently knows it.
///
/// This is the resolver's output handed to the pricing calculator, so the
/// calculator never looks anything up itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ShippingSelection {
    /// No city chosen yet.
    #[default]
    NotSelected,

    /// A known city (serviceable or not).
    City(CityShippingConfig),

    /// A city id that the current configuration does not know.
    Unknown { city_id: String },
}

impl ShippingSelection {
    /// The selected city id, if any.
    pub fn city_id(&self) -> Option<&str> {
        match self {
            ShippingSelection::NotSelected => None,
            ShippingSelection::City(config) => Some(&config.city_id),
            ShippingSelection::Unknown { city_id } => Some(city_id),
        }
    }

    /// Shipping fee for `subtotal`, or why there is none.
    pub fn fee(&self, subtotal: Money) -> Result<Money, ShippingError> {
        match self {
            ShippingSelection::NotSelected => Err(ShippingError::NoCitySelected),
            ShippingSelection::City(config) => compute_fee(config, subtotal),
            ShippingSelection::Unknown { city_id } => Err(ShippingError::CityNotFound {
                city_id: city_id.clone(),
            }),
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Looks up city shipping configuration.
///
/// Built from the storefront's city list. Cities keep the order the API
/// returned them in, which is the order the UI lists them.
#[derive(Debug, Clone, Default)]
pub struct ShippingRateResolver {
    cities: Vec<CityShippingConfig>,
}

impl ShippingRateResolver {
    /// Creates a resolver over already-validated configs.
    ///
    /// Later duplicates of a city id are ignored.
    pub fn new(configs: impl IntoIterator<Item = CityShippingConfig>) -> Self {
        let mut cities: Vec<CityShippingConfig> = Vec::new();
        for config in configs {
            if cities.iter().any(|c| c.city_id == config.city_id) {
                debug!(city_id = %config.city_id, "Ignoring duplicate city config");
                continue;
            }
            cities.push(config);
        }
        ShippingRateResolver { cities }
    }

    /// Parses the `{data: [...]}` city list payload.
    pub fn from_response(response: CityListResponse) -> CoreResult<Self> {
        let configs = response
            .data
            .into_iter()
            .map(CityShippingConfig::try_from)
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self::new(configs))
    }

    /// Looks up a city by id.
    pub fn resolve(&self, city_id: &str) -> Result<&CityShippingConfig, ShippingError> {
        self.cities
            .iter()
            .find(|c| c.city_id == city_id)
            .ok_or_else(|| ShippingError::CityNotFound {
                city_id: city_id.to_string(),
            })
    }

    /// Resolves a city id into the selection the cart stores.
    pub fn select(&self, city_id: &str) -> ShippingSelection {
        match self.resolve(city_id) {
            Ok(config) => ShippingSelection::City(config.clone()),
            Err(_) => ShippingSelection::Unknown {
                city_id: city_id.to_string(),
            },
        }
    }

    /// Fee for `subtotal` in `city_id`.
    pub fn fee_for(&self, city_id: &str, subtotal: Money) -> Result<Money, ShippingError> {
        compute_fee(self.resolve(city_id)?, subtotal)
    }

    /// All known cities.
    pub fn cities(&self) -> &[CityShippingConfig] {
        &self.cities
    }

    /// Cities that can be delivered to.
    pub fn serviceable(&self) -> impl Iterator<Item = &CityShippingConfig> {
        self.cities.iter().filter(|c| c.has_shipping)
    }

    /// Number of known cities.
    pub fn len(&self) -> usize {
        self.cities.len()
    }

    /// Whether no cities are known.
    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
