pub mod vat;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::JobConfig;
use crate::database::{DatabaseError, Receipt, ReceiptStore};
use crate::renderer::PageRenderer;

pub use vat::{extract_vat, is_renderable_url};

/// Errors that end a run. Per-receipt failures never surface here.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// What happened to one receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Updated(String),
    Skipped,
    NotFound,
    Failed(String),
}

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub batches: u64,
    pub fetched: u64,
    pub updated: u64,
    pub skipped: u64,
    pub not_found: u64,
    pub failed: u64,
}

impl JobReport {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Updated(_) => self.updated += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::NotFound => self.not_found += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Walks receipts without a VAT in creation order and fills in the VAT
/// found on each receipt's invoice page.
///
/// Paging is by offset over the `vat IS NULL` set, and the offset moves by a
/// full page after every batch. Receipts updated in one batch therefore shift
/// the window and some receipts are left for the next run. Receipts that are
/// skipped or fail are fetched again on every run; there is no attempt limit.
pub struct VatExtractionJob<S, R> {
    store: S,
    renderer: R,
    batch_size: i64,
}

impl<S, R> VatExtractionJob<S, R>
where
    S: ReceiptStore,
    R: PageRenderer,
{
    pub fn new(store: S, renderer: R, config: &JobConfig) -> Self {
        Self {
            store,
            renderer,
            batch_size: config.batch_size.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn run(&self) -> Result<JobReport, JobError> {
        let mut report = JobReport::default();
        let mut offset: i64 = 0;

        loop {
            let batch = self.store.fetch_unprocessed(offset, self.batch_size).await?;
            if batch.is_empty() {
                info!("No more receipts to process. Total processed: {}", report.updated);
                break;
            }

            report.batches += 1;
            report.fetched += batch.len() as u64;
            info!("Processing batch {} ({} receipts)", report.batches, batch.len());

            for receipt in &batch {
                let outcome = self.process_receipt(receipt).await;
                report.record(&outcome);
            }

            offset += self.batch_size;

            if (batch.len() as i64) < self.batch_size {
                break;
            }
        }

        info!(
            updated = report.updated,
            skipped = report.skipped,
            not_found = report.not_found,
            failed = report.failed,
            "Processing complete. Total receipts processed: {}",
            report.updated
        );
        Ok(report)
    }

    /// Handle one receipt. Every error is absorbed into the outcome.
    pub async fn process_receipt(&self, receipt: &Receipt) -> ItemOutcome {
        info!("Processing receipt {}", receipt.id);

        let Some(url) = receipt.source_url() else {
            warn!("Skipping receipt {}: qr_data is not a valid URL", receipt.id);
            return ItemOutcome::Skipped;
        };

        let markup = match self.renderer.render_frame(url).await {
            Ok(markup) => markup,
            Err(e) => {
                error!("Error processing receipt {}: {}", receipt.id, e);
                return ItemOutcome::Failed(e.to_string());
            }
        };

        let Some(vat) = extract_vat(&markup) else {
            warn!("Could not find VAT/ΑΦΜ number for receipt {}", receipt.id);
            return ItemOutcome::NotFound;
        };

        match self.store.update_vat(&receipt.id, &vat).await {
            Ok(true) => {
                info!("Updated receipt {} with VAT: {}", receipt.id, vat);
                ItemOutcome::Updated(vat)
            }
            Ok(false) => {
                warn!("Receipt {} already had a VAT or no longer exists", receipt.id);
                ItemOutcome::Failed("receipt not updated".to_string())
            }
            Err(e) => {
                error!("Error processing receipt {}: {}", receipt.id, e);
                ItemOutcome::Failed(e.to_string())
            }
        }
    }

    /// Release the store once the run is over
    pub async fn shutdown(self) {
        self.store.close().await;
    }
}
