//! # Cart Store
//!
//! The cart state container: line items, the attached coupon and the
//! delivery city, plus the pricing snapshot derived from them.
//!
//! ## Command Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  UI intent ──► CartCommand ──► reduce(state, command)                   │
//! │                                     │                                   │
//! │                    Err ◄────────────┤ (state untouched)                 │
//! │                                     ▼                                   │
//! │                          Transition { state', notices }                 │
//! │                                     │                                   │
//! │                                     ▼                                   │
//! │                 CartStore: state = state', snapshot = compute(state')   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Lines are unique by `variant_id`
//! - Every line has `1 ≤ quantity ≤ stock_limit`
//! - At most one coupon is attached
//! - The snapshot always matches the current state

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult, StockError, ValidationError};
use crate::persist::{PersistedCart, PERSISTED_VERSION};
use crate::pricing::{self, OrderPricingSnapshot};
use crate::shipping::{ShippingRateResolver, ShippingSelection};
use crate::tax::{TaxPolicy, TaxRule};
use crate::types::{CartLineItem, Coupon};
use crate::validation::{validate_cart_size, validate_identifier, validate_line_item};
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// State, Commands, Notices
// =============================================================================

/// Everything the cart owns. Pricing is derived from this alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartState {
    pub items: Vec<CartLineItem>,
    pub coupon: Option<Coupon>,
    pub shipping: ShippingSelection,
}

impl CartState {
    pub fn find(&self, variant_id: &str) -> Option<&CartLineItem> {
        self.items.iter().find(|item| item.variant_id == variant_id)
    }

    fn position(&self, variant_id: &str) -> CoreResult<usize> {
        self.items
            .iter()
            .position(|item| item.variant_id == variant_id)
            .ok_or_else(|| CoreError::ItemNotFound {
                variant_id: variant_id.to_string(),
            })
    }
}

/// A cart mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartCommand {
    AddItem(CartLineItem),
    Increment { variant_id: String },
    Decrement { variant_id: String },
    SetQuantity { variant_id: String, quantity: i64 },
    Remove { variant_id: String },
    Clear,
    ApplyCoupon(Coupon),
    RemoveCoupon,
    SelectShipping(ShippingSelection),
}

/// Something the shopper should be told about a successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartNotice {
    /// The requested quantity was reduced to what is in stock.
    QuantityClamped {
        variant_id: String,
        requested: i64,
        applied: i64,
    },
    /// An increment was ignored because the line is at its stock limit.
    StockLimitReached { variant_id: String, stock_limit: i64 },
    /// The line left the cart (decrement to zero, or dropped on restore).
    ItemRemoved { variant_id: String },
}

/// Result of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: CartState,
    pub notices: Vec<CartNotice>,
}

// =============================================================================
// Reducer
// =============================================================================

/// Largest quantity a line may hold.
fn quantity_ceiling(item: &CartLineItem) -> i64 {
    item.stock_limit.min(MAX_ITEM_QUANTITY)
}

fn clamp_line(item: &mut CartLineItem, requested: i64, notices: &mut Vec<CartNotice>) {
    let applied = requested.clamp(1, quantity_ceiling(item).max(1));
    if applied != requested {
        notices.push(CartNotice::QuantityClamped {
            variant_id: item.variant_id.clone(),
            requested,
            applied,
        });
    }
    item.quantity = applied;
}

/// Applies `command` to `state`.
///
/// Pure: the input state is never modified, and an error means nothing
/// changed.
pub fn reduce(state: &CartState, command: CartCommand) -> CoreResult<Transition> {
    let mut next = state.clone();
    let mut notices = Vec::new();

    match command {
        CartCommand::AddItem(item) => {
            validate_line_item(&item)?;
            if item.stock_limit < 1 {
                return Err(StockError::OutOfStock {
                    variant_id: item.variant_id,
                }
                .into());
            }

            match next.items.iter_mut().find(|line| line.variant_id == item.variant_id) {
                Some(line) => {
                    let requested = line.quantity + item.quantity;
                    // Catalog data on the incoming item is fresher
                    *line = CartLineItem {
                        quantity: line.quantity,
                        ..item
                    };
                    clamp_line(line, requested, &mut notices);
                }
                None => {
                    validate_cart_size(next.items.len())?;
                    let mut line = item;
                    let requested = line.quantity;
                    clamp_line(&mut line, requested, &mut notices);
                    next.items.push(line);
                }
            }
        }

        CartCommand::Increment { variant_id } => {
            let index = next.position(&variant_id)?;
            let line = &mut next.items[index];
            if line.quantity >= quantity_ceiling(line) {
                notices.push(CartNotice::StockLimitReached {
                    variant_id,
                    stock_limit: line.stock_limit,
                });
            } else {
                line.quantity += 1;
            }
        }

        CartCommand::Decrement { variant_id } => {
            let index = next.position(&variant_id)?;
            if next.items[index].quantity <= 1 {
                next.items.remove(index);
                notices.push(CartNotice::ItemRemoved { variant_id });
            } else {
                next.items[index].quantity -= 1;
            }
        }

        CartCommand::SetQuantity {
            variant_id,
            quantity,
        } => {
            let index = next.position(&variant_id)?;
            if quantity < 0 {
                return Err(ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                }
                .into());
            }
            if quantity == 0 {
                next.items.remove(index);
                notices.push(CartNotice::ItemRemoved { variant_id });
            } else {
                clamp_line(&mut next.items[index], quantity, &mut notices);
            }
        }

        CartCommand::Remove { variant_id } => {
            let index = next.position(&variant_id)?;
            next.items.remove(index);
        }

        CartCommand::Clear => {
            next.items.clear();
            next.coupon = None;
        }

        CartCommand::ApplyCoupon(coupon) => {
            next.coupon = Some(coupon);
        }

        CartCommand::RemoveCoupon => {
            next.coupon = None;
        }

        CartCommand::SelectShipping(selection) => {
            next.shipping = selection;
        }
    }

    Ok(Transition {
        state: next,
        notices,
    })
}

// =============================================================================
// Store
// =============================================================================

/// Owns the cart state and keeps its pricing snapshot current.
pub struct CartStore {
    state: CartState,
    snapshot: OrderPricingSnapshot,
    resolver: ShippingRateResolver,
    tax_rule: Box<dyn TaxRule>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("state", &self.state)
            .field("snapshot", &self.snapshot)
            .field("cities", &self.resolver.len())
            .finish_non_exhaustive()
    }
}

impl Default for CartStore {
    fn default() -> Self {
        CartStore::new(ShippingRateResolver::default(), TaxPolicy::None)
    }
}

impl CartStore {
    /// Creates an empty cart.
    pub fn new(resolver: ShippingRateResolver, tax_rule: impl TaxRule + 'static) -> Self {
        let mut store = CartStore {
            state: CartState::default(),
            snapshot: OrderPricingSnapshot::default(),
            resolver,
            tax_rule: Box::new(tax_rule),
        };
        store.recompute();
        store
    }

    /// Rebuilds a cart from its saved form.
    ///
    /// Lines are re-validated and re-clamped; lines that can no longer be
    /// carried are dropped with an `ItemRemoved` notice. The saved city id is
    /// resolved against `resolver`.
    pub fn restore(
        persisted: PersistedCart,
        resolver: ShippingRateResolver,
        tax_rule: impl TaxRule + 'static,
    ) -> (Self, Vec<CartNotice>) {
        let mut store = CartStore::new(resolver, tax_rule);
        let mut notices = Vec::new();

        for item in persisted.items {
            let variant_id = item.variant_id.clone();
            match reduce(&store.state, CartCommand::AddItem(item)) {
                Ok(transition) => {
                    store.state = transition.state;
                    notices.extend(transition.notices);
                }
                Err(err) => {
                    warn!(variant_id = %variant_id, error = %err, "Dropping saved cart line");
                    notices.push(CartNotice::ItemRemoved { variant_id });
                }
            }
        }

        store.state.coupon = persisted.coupon;
        if let Some(city_id) = persisted.city_id {
            store.state.shipping = store.resolver.select(&city_id);
        }

        store.recompute();
        (store, notices)
    }

    /// The saved form of the current cart.
    pub fn to_persisted(&self) -> PersistedCart {
        PersistedCart {
            version: PERSISTED_VERSION,
            items: self.state.items.clone(),
            coupon: self.state.coupon.clone(),
            city_id: self.state.shipping.city_id().map(str::to_string),
        }
    }

    pub fn state(&self) -> &CartState {
        &self.state
    }

    pub fn snapshot(&self) -> &OrderPricingSnapshot {
        &self.snapshot
    }

    pub fn items(&self) -> &[CartLineItem] {
        &self.state.items
    }

    pub fn coupon(&self) -> Option<&Coupon> {
        self.state.coupon.as_ref()
    }

    pub fn resolver(&self) -> &ShippingRateResolver {
        &self.resolver
    }

    pub fn tax_rule(&self) -> &dyn TaxRule {
        self.tax_rule.as_ref()
    }

    /// Runs one command. On error the cart and snapshot are unchanged.
    pub fn dispatch(&mut self, command: CartCommand) -> CoreResult<Vec<CartNotice>> {
        let Transition { state, notices } = reduce(&self.state, command)?;
        self.state = state;
        self.recompute();

        for notice in &notices {
            debug!(?notice, "Cart notice");
        }
        Ok(notices)
    }

    fn recompute(&mut self) {
        self.snapshot = pricing::compute(
            &self.state.items,
            self.state.coupon.as_ref(),
            &self.state.shipping,
            self.tax_rule.as_ref(),
        );
        debug!(
            subtotal = %self.snapshot.subtotal,
            discount = %self.snapshot.discount_amount,
            shipping = %self.snapshot.shipping_amount,
            tax = %self.snapshot.tax_amount,
            total = %self.snapshot.total,
            "Cart repriced"
        );
    }

    pub fn add_item(&mut self, item: CartLineItem) -> CoreResult<Vec<CartNotice>> {
        self.dispatch(CartCommand::AddItem(item))
    }

    pub fn increment_item(&mut self, variant_id: &str) -> CoreResult<Vec<CartNotice>> {
        self.dispatch(CartCommand::Increment {
            variant_id: variant_id.to_string(),
        })
    }

    pub fn decrement_item(&mut self, variant_id: &str) -> CoreResult<Vec<CartNotice>> {
        self.dispatch(CartCommand::Decrement {
            variant_id: variant_id.to_string(),
        })
    }

    pub fn set_quantity(&mut self, variant_id: &str, quantity: i64) -> CoreResult<Vec<CartNotice>> {
        self.dispatch(CartCommand::SetQuantity {
            variant_id: variant_id.to_string(),
            quantity,
        })
    }

    pub fn remove_item(&mut self, variant_id: &str) -> CoreResult<Vec<CartNotice>> {
        self.dispatch(CartCommand::Remove {
            variant_id: variant_id.to_string(),
        })
    }

    /// Empties the cart and detaches the coupon. The city is kept.
    pub fn clear_cart(&mut self) -> CoreResult<Vec<CartNotice>> {
        self.dispatch(CartCommand::Clear)
    }

    /// Attaches `coupon`, replacing any coupon already attached.
    pub fn apply_coupon(&mut self, coupon: Coupon) -> CoreResult<Vec<CartNotice>> {
        self.dispatch(CartCommand::ApplyCoupon(coupon))
    }

    pub fn remove_coupon(&mut self) -> CoreResult<Vec<CartNotice>> {
        self.dispatch(CartCommand::RemoveCoupon)
    }

    /// Selects the delivery city.
    ///
    /// Unknown and unserviceable cities are recorded, not refused; the
    /// snapshot then reports shipping as unavailable and checkout is blocked.
    pub fn set_selected_city(&mut self, city_id: &str) -> CoreResult<Vec<CartNotice>> {
        validate_identifier("city_id", city_id)?;
        let selection = self.resolver.select(city_id.trim());
        self.dispatch(CartCommand::SelectShipping(selection))
    }

    /// Swaps in a fresh city list and re-resolves the selected city.
    pub fn replace_cities(&mut self, resolver: ShippingRateResolver) {
        self.resolver = resolver;
        if let Some(city_id) = self.state.shipping.city_id().map(str::to_string) {
            self.state.shipping = self.resolver.select(&city_id);
        }
        self.recompute();
    }

    /// Swaps the order-level tax rule.
    pub fn set_tax_rule(&mut self, tax_rule: impl TaxRule + 'static) {
        self.tax_rule = Box::new(tax_rule);
        self.recompute();
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
