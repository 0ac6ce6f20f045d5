//! # basket-quote
//!
//! Prints the price breakdown of the saved cart.
//!
//! ## Usage
//! ```bash
//! basket-quote
//! basket-quote --city riyadh --code SAVE20
//! basket-quote --config ./storefront.toml --user u-42
//! ```
//!
//! The city list is refreshed from the storefront API when it is reachable;
//! otherwise the locally cached list is used.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use basket_core::{PromotionOutcome, ShippingStatus};
use basket_db::{Database, DbConfig};
use basket_storefront::config::{default_config_path, StorefrontConfig};
use basket_storefront::telemetry::init_tracing;
use basket_storefront::{CheckoutSession, HttpStorefrontApi};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    user_id: Option<String>,
    city: Option<String>,
    code: Option<String>,
}

fn parse_args() -> Option<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => args.config = iter.next().map(PathBuf::from),
            "--user" | "-u" => args.user_id = iter.next(),
            "--city" => args.city = iter.next(),
            "--code" => args.code = iter.next(),
            "--help" | "-h" => {
                println!("Usage: basket-quote [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("  -u, --user <ID>       Shopper id (default: guest)");
                println!("      --city <ID>       Select a delivery city");
                println!("      --code <CODE>     Apply a discount code");
                println!("  -h, --help            Show this help message");
                return None;
            }
            other => eprintln!("Ignoring unknown argument: {}", other),
        }
    }

    Some(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(args) = parse_args() else {
        return Ok(());
    };

    init_tracing();

    let config_path = match args.config {
        Some(path) => path,
        None => match std::env::var("BASKET_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => default_config_path()?,
        },
    };
    let config = StorefrontConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let db_path = config.database_path()?;
    info!(db_path = %db_path.display(), "Opening local storage");
    let db = Database::new(DbConfig::new(db_path)).await?;

    let api = Arc::new(HttpStorefrontApi::new(&config.api)?);
    let user_id = args.user_id.unwrap_or_else(|| "guest".to_string());
    let (session, notices) =
        CheckoutSession::open(user_id, db.clone(), api, config.tax.clone()).await?;

    for notice in &notices {
        println!("note: {:?}", notice);
    }

    if let Err(e) = session.refresh_cities().await {
        warn!(error = %e, "Using cached city list");
    }

    if let Some(city) = &args.city {
        session.select_city(city).await?;
    }

    if let Some(code) = &args.code {
        match session.submit_coupon(code).await {
            Ok(PromotionOutcome::Applied(coupon)) => println!("Applied {}", coupon.code),
            Ok(PromotionOutcome::Rejected(reason)) => println!("{}: {}", code, reason),
            Ok(_) => {}
            Err(e) => println!("{}: {}", code, e.message),
        }
    }

    let currency = &config.currency;
    let snapshot = session.snapshot();
    let cart = session.cart_state();

    println!();
    for item in &cart.items {
        println!(
            "  {:<32} x{:<4} {:>14}",
            item.display_name(),
            item.quantity,
            currency.format(item.line_total())
        );
    }
    if cart.items.is_empty() {
        println!("  (cart is empty)");
    }
    println!("  {}", "-".repeat(54));
    println!("  {:<38} {:>14}", "Subtotal", currency.format(snapshot.subtotal));
    if let Some(application) = &snapshot.applied_coupon {
        if application.applicable {
            println!(
                "  {:<38} {:>14}",
                format!("Discount ({})", application.coupon.code),
                format!("-{}", currency.format(snapshot.discount_amount))
            );
        } else {
            println!(
                "  {} needs {} more to apply",
                application.coupon.code,
                currency.format(application.shortfall)
            );
        }
    }
    let shipping = match &snapshot.shipping {
        ShippingStatus::NotSelected => "choose a city".to_string(),
        ShippingStatus::Charged { fee, .. } => currency.format(*fee),
        ShippingStatus::Waived { .. } => "free".to_string(),
        ShippingStatus::Unavailable { reason, .. } => reason.to_string(),
    };
    println!("  {:<38} {:>14}", "Shipping", shipping);
    println!("  {:<38} {:>14}", "Tax", currency.format(snapshot.tax_amount));
    println!("  {:<38} {:>14}", "Total", currency.format(snapshot.total));

    if let Some(blocker) = snapshot.checkout_blocker() {
        println!();
        println!("Checkout unavailable: {}", blocker);
    }

    db.close().await;
    Ok(())
}
