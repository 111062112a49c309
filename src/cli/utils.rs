use serde_json::json;

use crate::cli::OutputFormat;
use crate::job::JobReport;

/// Print the end-of-run summary in the requested format
pub fn output_report(output_format: &OutputFormat, report: &JobReport) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let response = json!({
                "success": true,
                "message": "Processing complete",
                "report": report,
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("{}", summary_line(report));
        }
    }
    Ok(())
}

fn summary_line(report: &JobReport) -> String {
    format!(
        "✓ Processing complete. Total receipts processed: {} ({} batches, {} skipped, {} without VAT, {} failed)",
        report.updated, report.batches, report.skipped, report.not_found, report.failed
    )
}
