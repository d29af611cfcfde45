use super::ui::{self, Status};
use crate::pipeline::{Pipeline, RefreshReport};
use crate::reconcile::CommitResult;
use anyhow::{Result, anyhow};
use comfy_table::Cell;

/// Downloads documents into the import directory.
pub async fn run_refresh(pipeline: &Pipeline) -> Result<()> {
    let pb = ui::new_spinner("Downloading exchange rate tables");
    let report = pipeline.refresh_documents().await;
    pb.finish_and_clear();

    display_refresh(&report);
    ensure_some_success(report.iter().count(), report.failures().count())
}

/// Applies deposited documents to the store.
pub async fn run_process(pipeline: &Pipeline) -> Result<()> {
    let pb = ui::new_spinner("Processing downloaded tables");
    let result = pipeline.process_documents().await;
    pb.finish_and_clear();

    display_commit(&result);
    ensure_some_success(result.len(), result.failures().count())
}

pub async fn run_sync(pipeline: &Pipeline) -> Result<()> {
    let pb = ui::new_spinner("Syncing exchange rate tables");
    let (report, result) = pipeline.sync().await;
    pb.finish_and_clear();

    display_refresh(&report);
    ui::print_separator();
    display_commit(&result);
    ensure_some_success(result.len(), result.failures().count())
}

// Per-label failures are already reported; only a run where every label
// failed is an error for the command.
fn ensure_some_success(attempted: usize, failed: usize) -> Result<()> {
    if attempted > 0 && attempted == failed {
        return Err(anyhow!("All {} tables failed", attempted));
    }
    Ok(())
}

pub fn display_refresh(report: &RefreshReport) {
    println!(
        "\n{}",
        ui::paint("Downloaded documents", ui::Tone::Heading)
    );
    let mut table = ui::table_with_headers(&["Table", "Status", "Details"]);

    for (label, outcome) in report.iter() {
        let (status, details) = match outcome {
            Ok(refresh) => {
                let mut details = format!(
                    "{} entries published {}",
                    refresh.entries, refresh.publication_date
                );
                if let Some(rows) = refresh.archive_rows {
                    details.push_str(&format!(", archive with {rows} days"));
                }
                (ui::status_cell(Status::Ok), details)
            }
            Err(e) => (ui::status_cell(Status::Failed), e.to_string()),
        };
        table.add_row(vec![Cell::new(label), status, Cell::new(details)]);
    }
    println!("{table}");
}

pub fn display_commit(result: &CommitResult) {
    println!(
        "\n{}",
        ui::paint("Processed tables", ui::Tone::Heading)
    );
    if result.is_empty() {
        println!(
            "{}",
            ui::paint("No downloaded documents to process.", ui::Tone::Muted)
        );
        return;
    }

    let mut table = ui::table_with_headers(&["Table", "Status", "Details"]);
    for (label, outcome) in result.iter() {
        let (status, details) = match outcome {
            Ok(change) if change.is_change() => (ui::status_cell(Status::Updated), change.to_string()),
            Ok(change) => (ui::status_cell(Status::Unchanged), change.to_string()),
            Err(e) => (ui::status_cell(Status::Failed), e.to_string()),
        };
        table.add_row(vec![Cell::new(label), status, Cell::new(details)]);
    }
    println!("{table}");
}
