//! # City Repository
//!
//! Delivery cities and their shipping rules.

use sqlx::{SqliteExecutor, SqlitePool};
use tracing::{debug, info};

use crate::error::DbResult;
use basket_core::shipping::ShippingRateResolver;
use basket_core::{CityShippingConfig, Money};

#[derive(Debug, sqlx::FromRow)]
struct CityRow {
    id: String,
    name: String,
    shipping_fee_cents: i64,
    has_shipping: bool,
    free_shipping_threshold_cents: Option<i64>,
    always_charge_shipping: bool,
}

impl From<CityRow> for CityShippingConfig {
    fn from(row: CityRow) -> Self {
        CityShippingConfig {
            city_id: row.id,
            name: row.name,
            shipping_fee: Money::from_cents(row.shipping_fee_cents),
            has_shipping: row.has_shipping,
            free_shipping_threshold: row.free_shipping_threshold_cents.map(Money::from_cents),
            always_charge_shipping: row.always_charge_shipping,
        }
    }
}

/// Repository for city operations.
#[derive(Debug, Clone)]
pub struct CityRepository {
    pool: SqlitePool,
}

impl CityRepository {
    /// Creates a new CityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CityRepository { pool }
    }

    /// Inserts or replaces a city. `sort_order` controls list order.
    pub async fn upsert(&self, city: &CityShippingConfig, sort_order: i64) -> DbResult<()> {
        write_city(&self.pool, city, sort_order).await?;
        debug!(city_id = %city.city_id, "City saved");
        Ok(())
    }

    /// Replaces the whole city list in one transaction.
    ///
    /// Cities missing from `cities` are deleted; the rest keep the order
    /// they are given in.
    pub async fn replace_all(&self, cities: &[CityShippingConfig]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let previous = sqlx::query("DELETE FROM cities")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        for (order, city) in cities.iter().enumerate() {
            write_city(&mut *tx, city, order as i64).await?;
        }

        tx.commit().await?;
        info!(count = cities.len(), previous, "City list replaced");
        Ok(())
    }

    /// Gets a city by id.
    pub async fn get(&self, city_id: &str) -> DbResult<Option<CityShippingConfig>> {
        let row: Option<CityRow> = sqlx::query_as(
            r#"
            SELECT id, name, shipping_fee_cents, has_shipping,
                   free_shipping_threshold_cents, always_charge_shipping
            FROM cities
            WHERE id = ?1
            "#,
        )
        .bind(city_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CityShippingConfig::from))
    }

    /// Lists all cities in display order.
    pub async fn list(&self) -> DbResult<Vec<CityShippingConfig>> {
        let rows: Vec<CityRow> = sqlx::query_as(
            r#"
            SELECT id, name, shipping_fee_cents, has_shipping,
                   free_shipping_threshold_cents, always_charge_shipping
            FROM cities
            ORDER BY sort_order, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CityShippingConfig::from).collect())
    }

    /// Builds a shipping resolver over every stored city.
    pub async fn resolver(&self) -> DbResult<ShippingRateResolver> {
        Ok(ShippingRateResolver::new(self.list().await?))
    }

    /// Counts stored cities.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn write_city<'e, E>(executor: E, city: &CityShippingConfig, sort_order: i64) -> DbResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO cities (
            id, name, shipping_fee_cents, has_shipping,
            free_shipping_threshold_cents, always_charge_shipping, sort_order
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            shipping_fee_cents = excluded.shipping_fee_cents,
            has_shipping = excluded.has_shipping,
            free_shipping_threshold_cents = excluded.free_shipping_threshold_cents,
            always_charge_shipping = excluded.always_charge_shipping,
            sort_order = excluded.sort_order
        "#,
    )
    .bind(&city.city_id)
    .bind(&city.name)
    .bind(city.shipping_fee.cents())
    .bind(city.has_shipping)
    .bind(city.free_shipping_threshold.map(|m| m.cents()))
    .bind(city.always_charge_shipping)
    .bind(sort_order)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn city(id: &str, name: &str) -> CityShippingConfig {
        CityShippingConfig {
            city_id: id.to_string(),
            name: name.to_string(),
            shipping_fee: Money::from_cents(1500),
            has_shipping: true,
            free_shipping_threshold: Some(Money::from_cents(30000)),
            always_charge_shipping: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_list_in_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.cities();

        repo.upsert(&city("jed", "Jeddah"), 2).await.unwrap();
        repo.upsert(&city("ruh", "Riyadh"), 1).await.unwrap();

        let mut changed = city("jed", "Jeddah");
        changed.has_shipping = false;
        changed.free_shipping_threshold = None;
        repo.upsert(&changed, 2).await.unwrap();

        let cities = repo.list().await.unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[0].city_id, "ruh");
        assert_eq!(cities[1], changed);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_resolver_from_storage() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.cities().upsert(&city("ruh", "Riyadh"), 0).await.unwrap();

        let resolver = db.cities().resolver().await.unwrap();
        assert_eq!(
            resolver.fee_for("ruh", Money::from_cents(1000)).unwrap().cents(),
            1500
        );
        assert!(db.cities().get("nowhere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_all_drops_withdrawn_cities() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.cities();
        repo.upsert(&city("jed", "Jeddah"), 0).await.unwrap();
        repo.upsert(&city("ruh", "Riyadh"), 1).await.unwrap();

        repo.replace_all(&[city("ruh", "Riyadh"), city("dmm", "Dammam")])
            .await
            .unwrap();

        let ids: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.city_id).collect();
        assert_eq!(ids, vec!["ruh", "dmm"]);
        assert!(repo.get("jed").await.unwrap().is_none());

        repo.replace_all(&[]).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
