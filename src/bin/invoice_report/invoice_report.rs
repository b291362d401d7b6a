use anyhow::Result;
use colored::Colorize;

use crate::aggregate::aggregate;
use crate::client::InvoiceSource;
use crate::config::Config;
use crate::fetch::{FetchStrategy, fetch_global, fetch_targeted};
use crate::filter::{AdjustmentTable, apply_adjustments, write_vat_file};
use crate::report::{ReportGrid, write_excel, write_text};

/// Run the whole report: fetch, filter, aggregate and write the output files.
///
/// # Errors
/// Returns an error if an output file cannot be written.
pub fn invoice_report(config: &Config, source: &impl InvoiceSource) -> Result<()> {
    println!("Date range: {} to {}\n", config.range.from, config.range.to);

    if config.verbose
        && let Some(table) = &config.table
    {
        print_table(table);
    }

    let fetched = match (config.strategy, &config.table) {
        (FetchStrategy::Targeted, Some(table)) => fetch_targeted(source, config.range, table, config.verbose),
        _ => fetch_global(source, config.range, config.verbose),
    };

    if fetched.is_empty() {
        println!("\n{}", "No invoice data found".yellow());
        return Ok(());
    }

    if let Some(path) = &config.vat_out {
        write_vat_file(&fetched, path)?;
    }

    let lines = match (config.strategy, &config.table) {
        (FetchStrategy::Global, Some(table)) => {
            let file = config
                .vat_file
                .as_deref()
                .map_or_else(String::new, |path| path.display().to_string());
            println!("\nFiltering by {} VAT number(s) from {file}", table.len());
            let lines = apply_adjustments(fetched, Some(table));
            println!("Records after filtering: {}", lines.len());
            lines
        }
        (FetchStrategy::Targeted, Some(_)) => fetched,
        (_, None) => apply_adjustments(fetched, None),
    };

    if lines.is_empty() {
        println!("\n{}", "No invoice data after filtering".yellow());
        return Ok(());
    }

    let aggregation = aggregate(&lines);
    println!(
        "\nUnique (issuer, item) combinations: {}",
        format!("{}", aggregation.rows.len()).cyan()
    );
    if let (Some(first), Some(last)) = (aggregation.dates.first(), aggregation.dates.last()) {
        println!("Date range in data: {first} to {last}");
    }

    let grid = ReportGrid::from_aggregation(&aggregation);
    if config.format.writes_excel() {
        write_excel(&grid, &config.excel_path())?;
    }
    if config.format.writes_text() {
        write_text(&grid, &config.text_path())?;
    }

    println!("\n{}", "Done!".green());
    Ok(())
}

fn print_table(table: &AdjustmentTable) {
    println!("{}", format!("VAT numbers ({}):", table.len()).bold());
    for (vat, days) in table.iter() {
        println!("  {vat}: {days:+} days");
    }
}
