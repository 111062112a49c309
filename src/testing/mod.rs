use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::database::{DatabaseError, Receipt, ReceiptStore};
use crate::renderer::{PageRenderer, RenderError};

/// In-memory receipt table with the same filter, order and paging rules as
/// the Postgres store
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Receipt>>,
    fetches: Mutex<Vec<(i64, i64)>>,
    failing_updates: Mutex<Vec<String>>,
    fail_fetches: Mutex<bool>,
    closed: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn timestamp(seconds: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t + chrono::Duration::seconds(seconds))
            .expect("valid fixture timestamp")
    }

    /// Insert a row created after every row inserted so far
    pub fn insert(&self, id: &str, qr_data: Option<&str>, vat: Option<&str>) {
        let next = self.rows.lock().unwrap().len() as i64;
        self.insert_at(id, qr_data, vat, next);
    }

    pub fn insert_at(&self, id: &str, qr_data: Option<&str>, vat: Option<&str>, created_secs: i64) {
        self.rows.lock().unwrap().push(Receipt {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            qr_data: qr_data.map(str::to_string),
            vat: vat.map(str::to_string),
            created_at: Self::timestamp(created_secs),
        });
    }

    pub fn fail_updates_for(&self, id: &str) {
        self.failing_updates.lock().unwrap().push(id.to_string());
    }

    pub fn fail_fetches(&self) {
        *self.fail_fetches.lock().unwrap() = true;
    }

    pub fn vat_of(&self, id: &str) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.vat.clone())
    }

    pub fn unprocessed_count(&self) -> usize {
        self.rows.lock().unwrap().iter().filter(|r| r.vat.is_none()).count()
    }

    /// Every (offset, limit) pair requested so far
    pub fn fetches(&self) -> Vec<(i64, i64)> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl ReceiptStore for MemoryStore {
    async fn fetch_unprocessed(&self, offset: i64, limit: i64) -> Result<Vec<Receipt>, DatabaseError> {
        self.fetches.lock().unwrap().push((offset, limit));
        if *self.fail_fetches.lock().unwrap() {
            return Err(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut));
        }

        let mut pending: Vec<Receipt> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.vat.is_none())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(pending
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_vat(&self, id: &str, vat: &str) -> Result<bool, DatabaseError> {
        if self.failing_updates.lock().unwrap().iter().any(|f| f == id) {
            return Err(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut));
        }

        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|r| r.id == id && r.vat.is_none()) {
            Some(row) => {
                row.vat = Some(vat.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}

enum Script {
    Markup(String),
    Timeout,
}

/// Renderer that answers from a fixed URL → markup table and records every
/// URL it was asked for. Unknown URLs render as an empty frame.
#[derive(Default)]
pub struct ScriptedRenderer {
    pages: HashMap<String, Script>,
    rendered: Mutex<Vec<String>>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, markup: &str) -> Self {
        self.pages.insert(url.to_string(), Script::Markup(markup.to_string()));
        self
    }

    pub fn timeout(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), Script::Timeout);
        self
    }

    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn was_rendered(&self, url: &str) -> bool {
        self.rendered.lock().unwrap().iter().any(|u| u == url)
    }
}

#[async_trait]
impl PageRenderer for ScriptedRenderer {
    async fn render_frame(&self, url: &str) -> Result<String, RenderError> {
        self.rendered.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(Script::Markup(markup)) => Ok(markup.clone()),
            Some(Script::Timeout) => Err(RenderError::NavigationTimeout {
                url: url.to_string(),
                after: Duration::from_secs(20),
            }),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_pages_oldest_unprocessed_first() {
        let store = MemoryStore::new();
        store.insert_at("b", None, None, 2);
        store.insert_at("a", None, None, 1);
        store.insert_at("done", None, Some("123456789"), 0);
        store.insert_at("c", None, None, 3);

        let first = store.fetch_unprocessed(0, 2).await.unwrap();
        let ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let second = store.fetch_unprocessed(2, 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "c");
    }

    #[tokio::test]
    async fn memory_store_refuses_to_overwrite() {
        let store = MemoryStore::new();
        store.insert("done", None, Some("123456789"));

        assert!(!store.update_vat("done", "999999999").await.unwrap());
        assert_eq!(store.vat_of("done").as_deref(), Some("123456789"));

        store.close().await;
        assert!(store.is_closed());
    }
}
