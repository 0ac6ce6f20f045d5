//! # Checkout
//!
//! Turns a priced cart into an order submission and compares the server's
//! totals with the client quote afterwards.
//!
//! The submission carries no prices: the order service recomputes every
//! total from its own catalog. The client snapshot is advisory.

use tracing::{info, warn};

use basket_core::wire::{OrderLine, OrderReceipt, OrderSubmission};
use basket_core::{CartStore, CoreResult, Money, OrderPricingSnapshot, Percent};

/// Builds the order request for the current cart.
///
/// ## Errors
/// Whatever [`OrderPricingSnapshot::checkout_blocker`] reports: an empty
/// cart, no delivery city, or an unserviceable city.
pub fn build_submission(
    cart: &CartStore,
    user_id: &str,
    address_id: &str,
) -> CoreResult<OrderSubmission> {
    let snapshot = cart.snapshot();
    if let Some(blocker) = snapshot.checkout_blocker() {
        return Err(blocker);
    }

    let region = cart.state().shipping.city_id();
    // Fixed-amount tax has no percentage; the server applies its own table
    let tax_percent = cart
        .tax_rule()
        .effective_percent(region)
        .unwrap_or_else(Percent::zero);

    // An attached coupon below its minimum is not sent
    let promo_code_id = snapshot
        .applied_coupon
        .as_ref()
        .filter(|application| application.applicable)
        .map(|application| application.coupon.id.clone());

    Ok(OrderSubmission {
        user_id: user_id.to_string(),
        address_id: address_id.to_string(),
        promo_code_id,
        tax_percent: tax_percent.to_decimal_string(),
        shipping_amount: snapshot.shipping_amount.to_decimal_string(),
        items: cart.items().iter().map(OrderLine::from).collect(),
    })
}

/// Compares the server total with the client quote.
///
/// Returns `server - client` when the server sent a different total.
pub fn reconcile(snapshot: &OrderPricingSnapshot, receipt: &OrderReceipt) -> Option<Money> {
    let server_total = match receipt.total() {
        Ok(Some(total)) => total,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "Order total could not be read");
            return None;
        }
    };

    if server_total == snapshot.total {
        info!(total = %server_total, "Order total matches quote");
        return None;
    }

    let difference = server_total - snapshot.total;
    warn!(
        client_total = %snapshot.total,
        server_total = %server_total,
        difference = %difference,
        "Order total differs from client quote"
    );
    Some(difference)
}
