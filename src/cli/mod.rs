pub mod utils;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config;
use crate::database::{manager, ConnectionSettings, PgReceiptStore};
use crate::job::VatExtractionJob;
use crate::renderer::ChromiumRenderer;

#[derive(Parser)]
#[command(name = "receipt-vat")]
#[command(about = "Fill in missing receipt VAT numbers from their invoice pages")]
#[command(version)]
pub struct Cli {
    #[arg(long, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, help = "Output in JSON format", conflicts_with = "text")]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// One complete pass over unprocessed receipts. The pool is closed before
/// returning on both the success and the error path.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let config = config::config();
    info!("Starting receipt VAT job in {:?} mode", config.environment);

    let settings = ConnectionSettings::from_env()?;
    let pool = manager::connect(&settings, &config.database).await?;

    let store = PgReceiptStore::new(pool);
    let renderer = ChromiumRenderer::new(config.browser.clone());
    let job = VatExtractionJob::new(store, renderer, &config.job);

    let result = job.run().await;
    job.shutdown().await;

    let report = result?;
    utils::output_report(&output_format, &report)
}
