use chrono::NaiveDateTime;
use sqlx::FromRow;

/// The slice of a `receipts` row the VAT job reads.
///
/// `created_at` is selected from the `scanned_at` column, which the scan
/// endpoint fills with `now()` on insert.
#[derive(Debug, Clone, FromRow)]
pub struct Receipt {
    pub id: String,
    pub user_id: String,
    pub qr_data: Option<String>,
    pub vat: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Receipt {
    /// The scanned payload, when it looks like an invoice URL
    pub fn source_url(&self) -> Option<&str> {
        self.qr_data
            .as_deref()
            .filter(|raw| crate::job::vat::is_renderable_url(raw))
    }
}
