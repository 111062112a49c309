use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::database::manager::{is_valid_table_name, DatabaseError};
use crate::database::models::Receipt;

pub const DEFAULT_RECEIPTS_TABLE: &str = "receipts";

/// Query surface the VAT job needs from receipt storage
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Up to `limit` receipts with no VAT yet, oldest first, skipping `offset`
    async fn fetch_unprocessed(&self, offset: i64, limit: i64) -> Result<Vec<Receipt>, DatabaseError>;

    /// Store the VAT for one receipt. Returns false when no row changed,
    /// either because the id is unknown or a VAT was already set.
    async fn update_vat(&self, id: &str, vat: &str) -> Result<bool, DatabaseError>;

    async fn close(&self);
}

/// Postgres-backed store over a pool owned by the job
pub struct PgReceiptStore {
    table_name: String,
    pool: PgPool,
}

impl PgReceiptStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            table_name: DEFAULT_RECEIPTS_TABLE.to_string(),
            pool,
        }
    }

    /// Point the store at a different table with the receipts layout
    pub fn with_table(pool: PgPool, table_name: impl Into<String>) -> Result<Self, DatabaseError> {
        let table_name = table_name.into();
        if !is_valid_table_name(&table_name) {
            return Err(DatabaseError::InvalidTableName(table_name));
        }
        Ok(Self { table_name, pool })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReceiptStore for PgReceiptStore {
    async fn fetch_unprocessed(&self, offset: i64, limit: i64) -> Result<Vec<Receipt>, DatabaseError> {
        let query = format!(
            "SELECT id, user_id, qr_data, vat, scanned_at AS created_at
             FROM \"{}\"
             WHERE vat IS NULL
             ORDER BY scanned_at ASC, id ASC
             LIMIT $1 OFFSET $2",
            self.table_name
        );

        let receipts = sqlx::query_as::<_, Receipt>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(receipts)
    }

    async fn update_vat(&self, id: &str, vat: &str) -> Result<bool, DatabaseError> {
        // The vat IS NULL guard keeps an existing value from ever being replaced
        let query = format!(
            "UPDATE \"{}\" SET vat = $1 WHERE id = $2 AND vat IS NULL",
            self.table_name
        );

        let result = sqlx::query(&query)
            .bind(vat)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}
