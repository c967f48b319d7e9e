//! Summary output for the CLI.
//!
//! After a verbose run the CLI prints a summary, either as a human-readable
//! table or as JSON for scripts.

use clap::ValueEnum;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use idmapshift::{Confirmation, ShiftStats};
use serde::Serialize;

/// Output format for the summary.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// Machine-parseable JSON format.
    Json,
}

/// Summary of a shift run.
#[derive(Debug, Serialize)]
pub struct ShiftSummary<'a> {
    pub root: String,
    pub dry_run: bool,
    #[serde(flatten)]
    pub stats: &'a ShiftStats,
}

/// Summary of a confirm run.
#[derive(Debug, Serialize)]
pub struct ConfirmSummary<'a> {
    pub root: String,
    #[serde(flatten)]
    pub confirmation: &'a Confirmation,
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["FIELD", "VALUE"]);
    table
}

/// Print a shift summary.
pub fn print_shift_summary(
    summary: &ShiftSummary<'_>,
    format: OutputFormat,
) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        OutputFormat::Table => {
            let stats = summary.stats;
            let mut table = new_table();
            table.add_row(vec!["root".to_string(), summary.root.clone()]);
            table.add_row(vec!["dry run".to_string(), summary.dry_run.to_string()]);
            for (name, value) in [
                ("entries", stats.entries_visited),
                ("directories", stats.directories),
                ("other entries", stats.other_entries),
                ("changed", stats.entries_changed),
                ("written", stats.owners_written),
                ("distinct uids", stats.distinct_uids),
                ("distinct gids", stats.distinct_gids),
            ] {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

/// Print a confirm summary.
pub fn print_confirm_summary(
    summary: &ConfirmSummary<'_>,
    format: OutputFormat,
) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        OutputFormat::Table => {
            let mut table = new_table();
            table.add_row(vec!["root".to_string(), summary.root.clone()]);
            match summary.confirmation {
                Confirmation::Confirmed { entries_checked } => {
                    table.add_row(vec!["result".to_string(), "confirmed".to_string()]);
                    table.add_row(vec!["entries".to_string(), entries_checked.to_string()]);
                }
                Confirmation::Mismatch { path, owner } => {
                    table.add_row(vec!["result".to_string(), "mismatch".to_string()]);
                    table.add_row(vec!["path".to_string(), path.display().to_string()]);
                    table.add_row(vec!["owner".to_string(), owner.to_string()]);
                }
            }
            println!("{table}");
        }
    }
    Ok(())
}
