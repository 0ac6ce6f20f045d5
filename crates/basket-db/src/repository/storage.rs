//! # Storage Repository
//!
//! A small key/value table for client-side state. The saved cart lives
//! under [`STORAGE_KEY`] as JSON.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use basket_core::persist::{PersistedCart, STORAGE_KEY};

/// Repository for key/value storage.
#[derive(Debug, Clone)]
pub struct StorageRepository {
    pool: SqlitePool,
}

impl StorageRepository {
    /// Creates a new StorageRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StorageRepository { pool }
    }

    /// Reads a value.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM local_storage WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Writes a value, replacing any previous one.
    pub async fn put(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO local_storage (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(key = %key, bytes = value.len(), "Stored value");
        Ok(())
    }

    /// Deletes a value. Returns whether anything was deleted.
    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM local_storage WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Saves the cart under the namespaced cart key.
    pub async fn save_cart(&self, cart: &PersistedCart) -> DbResult<()> {
        let json = serde_json::to_string(cart)?;
        self.put(STORAGE_KEY, &json).await
    }

    /// Loads the saved cart.
    ///
    /// ## Returns
    /// * `Ok(None)` - nothing saved yet
    /// * `Err(DbError::Serialization)` - the saved value is unreadable
    pub async fn load_cart(&self) -> DbResult<Option<PersistedCart>> {
        let Some(json) = self.get(STORAGE_KEY).await? else {
            return Ok(None);
        };

        PersistedCart::from_json(&json).map(Some).map_err(|e| {
            warn!(error = %e, "Saved cart is unreadable");
            DbError::serialization(e.to_string())
        })
    }

    /// Removes the saved cart (after a successful order).
    pub async fn clear_cart(&self) -> DbResult<()> {
        self.delete(STORAGE_KEY).await?;
        Ok(())
    }
}
