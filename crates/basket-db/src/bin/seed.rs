//! # Seed Data Generator
//!
//! Populates a development database with delivery cities and coupons.
//!
//! ## Usage
//! ```bash
//! cargo run -p basket-db --bin seed
//!
//! # Specify database path
//! cargo run -p basket-db --bin seed -- --db ./data/basket.db
//! ```
//!
//! ## Generated Data
//! - Cities covering every shipping rule: threshold waiver, always-charge,
//!   no waiver, and one unserviceable city
//! - Coupons covering percentage with cap, fixed, first-order-only,
//!   limited-use, expired and inactive codes

use chrono::{Duration, Utc};
use std::env;
use uuid::Uuid;

use basket_core::{CityShippingConfig, Coupon, DiscountKind, Money, Percent};
use basket_db::{Database, DbConfig};

/// (id, name, fee cents, serviceable, free threshold cents, always charge)
const CITIES: &[(&str, &str, i64, bool, Option<i64>, bool)] = &[
    ("riyadh", "Riyadh", 1500, true, Some(20000), false),
    ("jeddah", "Jeddah", 1500, true, Some(20000), false),
    ("dammam", "Dammam", 2000, true, Some(30000), false),
    ("abha", "Abha", 2500, true, None, false),
    ("neom", "NEOM", 5000, true, Some(10000), true),
    ("tabuk", "Tabuk", 3000, false, None, false),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./basket_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Basket Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./basket_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Basket Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    for (order, (id, name, fee, serviceable, threshold, always)) in CITIES.iter().enumerate() {
        let city = CityShippingConfig {
            city_id: id.to_string(),
            name: name.to_string(),
            shipping_fee: Money::from_cents(*fee),
            has_shipping: *serviceable,
            free_shipping_threshold: threshold.map(Money::from_cents),
            always_charge_shipping: *always,
        };
        db.cities().upsert(&city, order as i64).await?;
    }
    println!("✓ {} cities", db.cities().count().await?);

    let mut created = 0;
    for coupon in sample_coupons() {
        match db.coupons().insert(&coupon).await {
            Ok(()) => created += 1,
            Err(e) => eprintln!("  Skipping {}: {}", coupon.code, e),
        }
    }
    println!("✓ {} coupons", created);

    println!();
    println!("Checking a lookup...");
    let verdict = db
        .coupons()
        .lookup("SAVE20", "dev-user", Money::from_cents(4000), Utc::now(), true)
        .await?;
    println!(
        "  SAVE20 on 40.00: applicable = {}, reason = {:?}",
        verdict.applicable, verdict.reason
    );

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn coupon(code: &str, discount: DiscountKind) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: Uuid::new_v4().to_string(),
        code: code.to_string(),
        discount,
        min_order_value: Money::zero(),
        max_discount: None,
        start_date: now - Duration::days(30),
        end_date: now + Duration::days(365),
        usage_limit: None,
        per_user_limit: None,
        usage_count: 0,
        is_first_order: false,
        is_active: true,
    }
}

fn sample_coupons() -> Vec<Coupon> {
    let percent = |whole| DiscountKind::Percentage {
        rate: Percent::from_whole(whole),
    };
    let fixed = |cents| DiscountKind::Fixed {
        amount: Money::from_cents(cents),
    };

    let mut save20 = coupon("SAVE20", percent(20));
    save20.min_order_value = Money::from_cents(2000);
    save20.max_discount = Some(Money::from_cents(500));

    let mut welcome = coupon("WELCOME10", percent(10));
    welcome.is_first_order = true;
    welcome.per_user_limit = Some(1);

    let mut last_units = coupon("FLASH50", percent(50));
    last_units.usage_limit = Some(3);
    last_units.max_discount = Some(Money::from_cents(5000));

    let mut expired = coupon("SUMMER", fixed(1000));
    expired.end_date = Utc::now() - Duration::days(1);
    expired.start_date = expired.end_date - Duration::days(90);

    let mut retired = coupon("RETIRED", fixed(500));
    retired.is_active = false;

    vec![
        save20,
        coupon("TENOFF", fixed(1000)),
        welcome,
        last_units,
        expired,
        retired,
    ]
}
