use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use receipt_vat_rust::database::PgReceiptStore;
use receipt_vat_rust::renderer::{PageRenderer, RenderError};

/// Scratch receipts table in the database named by DATABASE_URL.
/// Each context gets its own uniquely named table.
pub struct TestContext {
    pub pool: PgPool,
    pub table: String,
}

impl TestContext {
    /// None when no database is configured, so callers can skip
    pub async fn new() -> Result<Option<Self>> {
        let _ = dotenvy::dotenv();
        let Ok(url) = std::env::var("DATABASE_URL") else {
            println!("DATABASE_URL not set; skipping database test");
            return Ok(None);
        };

        let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;
        let table = format!("receipts_test_{}", Uuid::new_v4().simple());

        sqlx::query(&format!(
            "CREATE TABLE \"{}\" (
                id text PRIMARY KEY,
                user_id text NOT NULL,
                qr_data text NOT NULL,
                vat text,
                scanned_at timestamp NOT NULL DEFAULT now()
            )",
            table
        ))
        .execute(&pool)
        .await?;

        Ok(Some(Self { pool, table }))
    }

    pub fn store(&self) -> Result<PgReceiptStore> {
        Ok(PgReceiptStore::with_table(self.pool.clone(), &self.table)?)
    }

    /// Insert a receipt `minutes` after a fixed base time
    pub async fn insert(&self, id: &str, qr_data: &str, vat: Option<&str>, minutes: i32) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO \"{}\" (id, user_id, qr_data, vat, scanned_at)
             VALUES ($1, 'user-1', $2, $3, timestamp '2024-01-01 00:00:00' + make_interval(mins => $4))",
            self.table
        ))
        .bind(id)
        .bind(qr_data)
        .bind(vat)
        .bind(minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn vat_of(&self, id: &str) -> Result<Option<String>> {
        let vat: Option<String> = sqlx::query_scalar(&format!("SELECT vat FROM \"{}\" WHERE id = $1", self.table))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(vat)
    }

    pub async fn cleanup(self) -> Result<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", self.table))
            .execute(&self.pool)
            .await?;
        self.pool.close().await;
        Ok(())
    }
}

/// Renderer answering from a URL → markup map; unknown URLs fail like a
/// navigation timeout would
#[derive(Default)]
pub struct StaticRenderer {
    pages: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl StaticRenderer {
    pub fn with_pages(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages.iter().map(|(u, m)| (u.to_string(), m.to_string())).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PageRenderer for StaticRenderer {
    async fn render_frame(&self, url: &str) -> Result<String, RenderError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| RenderError::Navigation(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)))
    }
}
