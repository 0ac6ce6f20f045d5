//! # Order-Level Tax
//!
//! Tax on the order is an injected rule keyed by delivery region:
//! `tax(subtotal, region) -> amount`.
//!
//! ## Two Tax Concepts
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Per-item VAT (CartLineItem::vat_percent)                               │
//! │    • shown next to each line ("incl. 15% VAT")                          │
//! │    • display only, never added to the order total                       │
//! │                                                                         │
//! │  Order tax (THIS MODULE)                                                │
//! │    • one amount for the whole order                                     │
//! │    • computed on the pre-discount subtotal                              │
//! │    • region = selected delivery city id                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any `Fn(Money, Option<&str>) -> Money` closure is a rule too, which keeps
//! tests free of configuration plumbing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::Percent;

// =============================================================================
// Tax Rule Trait
// =============================================================================

/// Computes the order-level tax.
pub trait TaxRule: Send + Sync {
    /// Tax for `subtotal` delivered to `region` (None when no city is set).
    fn tax(&self, subtotal: Money, region: Option<&str>) -> Money;

    /// The percentage this rule charges in `region`, when it is a percentage.
    ///
    /// Sent to the order service as `tax_percent`.
    fn effective_percent(&self, _region: Option<&str>) -> Option<Percent> {
        None
    }
}

impl<F> TaxRule for F
where
    F: Fn(Money, Option<&str>) -> Money + Send + Sync,
{
    fn tax(&self, subtotal: Money, region: Option<&str>) -> Money {
        self(subtotal, region)
    }
}

// =============================================================================
// Tax Policy
// =============================================================================

/// A single tax setting, as written in configuration.
///
/// ```toml
/// [tax.default]
/// kind = "percentage"
/// rate = 1500        # basis points
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaxPolicy {
    /// No order-level tax.
    #[default]
    None,
    /// A percentage of the subtotal, rounded half-up.
    Percentage { rate: Percent },
    /// A flat amount per non-empty order.
    Fixed { amount: Money },
}

impl TaxRule for TaxPolicy {
    fn tax(&self, subtotal: Money, _region: Option<&str>) -> Money {
        if !subtotal.is_positive() {
            return Money::zero();
        }
        match self {
            TaxPolicy::None => Money::zero(),
            TaxPolicy::Percentage { rate } => subtotal.percent(*rate),
            TaxPolicy::Fixed { amount } => *amount,
        }
    }

    fn effective_percent(&self, _region: Option<&str>) -> Option<Percent> {
        match self {
            TaxPolicy::None => Some(Percent::zero()),
            TaxPolicy::Percentage { rate } => Some(*rate),
            TaxPolicy::Fixed { .. } => None,
        }
    }
}

// =============================================================================
// Regional Tax
// =============================================================================

/// Per-region tax table with a fallback for unlisted regions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalTax {
    /// Used when the region is unknown or not listed.
    #[serde(default)]
    pub default: TaxPolicy,

    /// Region (city id) → policy.
    #[serde(default)]
    pub regions: BTreeMap<String, TaxPolicy>,
}

impl RegionalTax {
    /// A table that applies `default` everywhere.
    pub fn uniform(default: TaxPolicy) -> Self {
        RegionalTax {
            default,
            regions: BTreeMap::new(),
        }
    }

    /// Adds or replaces the policy for one region.
    pub fn with_region(mut self, region: impl Into<String>, policy: TaxPolicy) -> Self {
        self.regions.insert(region.into(), policy);
        self
    }

    fn policy_for(&self, region: Option<&str>) -> &TaxPolicy {
        region
            .and_then(|r| self.regions.get(r))
            .unwrap_or(&self.default)
    }
}

impl TaxRule for RegionalTax {
    fn tax(&self, subtotal: Money, region: Option<&str>) -> Money {
        self.policy_for(region).tax(subtotal, region)
    }

    fn effective_percent(&self, region: Option<&str>) -> Option<Percent> {
        self.policy_for(region).effective_percent(region)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_policy() {
        let policy = TaxPolicy::Percentage {
            rate: Percent::from_whole(15),
        };
        assert_eq!(policy.tax(Money::from_cents(1000), None).cents(), 150);
        assert_eq!(policy.effective_percent(None), Some(Percent::from_whole(15)));
    }

    #[test]
    fn test_fixed_policy_skips_empty_orders() {
        let policy = TaxPolicy::Fixed {
            amount: Money::from_cents(200),
        };
        assert_eq!(policy.tax(Money::from_cents(1), None).cents(), 200);
        assert!(policy.tax(Money::zero(), None).is_zero());
        assert_eq!(policy.effective_percent(None), None);
    }

    #[test]
    fn test_regional_fallback() {
        let table = RegionalTax::uniform(TaxPolicy::Percentage {
            rate: Percent::from_whole(5),
        })
        .with_region("dubai", TaxPolicy::None);

        let subtotal = Money::from_cents(10_000);
        assert_eq!(table.tax(subtotal, Some("riyadh")).cents(), 500);
        assert_eq!(table.tax(subtotal, None).cents(), 500);
        assert!(table.tax(subtotal, Some("dubai")).is_zero());
    }

    #[test]
    fn test_closure_is_a_rule() {
        let rule = |subtotal: Money, region: Option<&str>| match region {
            Some("x") => subtotal,
            _ => Money::zero(),
        };
        assert_eq!(rule.tax(Money::from_cents(10), Some("x")).cents(), 10);
        assert!(rule.tax(Money::from_cents(10), None).is_zero());
    }

    #[test]
    fn test_policy_toml_shape() {
        let policy: TaxPolicy = serde_json::from_str(r#"{"kind":"percentage","rate":825}"#).unwrap();
        assert_eq!(
            policy,
            TaxPolicy::Percentage {
                rate: Percent::from_bps(825)
            }
        );
    }
}
