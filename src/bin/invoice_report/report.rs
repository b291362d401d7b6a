//! Render aggregated quantities as an Excel workbook or semicolon-separated text.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook};

use mydata_tools::date::weekday_name;
use mydata_tools::print_error;

use crate::aggregate::Aggregation;

pub const ISSUER_HEADER: &str = "Issuer";
pub const ITEM_HEADER: &str = "Item Description";
pub const SHEET_NAME: &str = "Invoice Quantities";

const TEXT_SEPARATOR: &str = ";";
const ISSUER_COLUMN_WIDTH: f64 = 50.0;
const ITEM_COLUMN_WIDTH: f64 = 60.0;
const DATE_COLUMN_WIDTH: f64 = 12.0;

/// Number of leading label columns before the date columns.
const LABEL_COLUMNS: usize = 2;

/// One report line for an `(issuer, item)` key.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub issuer: String,
    pub item: String,
    /// One cell per date column, `None` when the summed quantity is not positive.
    pub quantities: Vec<Option<f64>>,
}

/// Dense report grid shared by both output formats.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportGrid {
    pub dates: Vec<String>,
    pub weekdays: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl ReportGrid {
    /// Project the aggregation onto every date column for every key.
    #[must_use]
    pub fn from_aggregation(aggregation: &Aggregation) -> Self {
        let dates = aggregation.dates.clone();
        let weekdays = dates
            .iter()
            .map(|date| weekday_name(date).unwrap_or_default().to_string())
            .collect();

        let rows = aggregation
            .rows
            .iter()
            .map(|((issuer, item), quantities)| ReportRow {
                issuer: issuer.clone(),
                item: item.clone(),
                quantities: dates
                    .iter()
                    .map(|date| quantities.get(date).copied().filter(|quantity| *quantity > 0.0))
                    .collect(),
            })
            .collect();

        Self { dates, weekdays, rows }
    }

    /// Header rows and data rows as text cells.
    #[must_use]
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        let mut rows = Vec::with_capacity(self.rows.len() + 2);

        let mut date_header = vec![ISSUER_HEADER.to_string(), ITEM_HEADER.to_string()];
        date_header.extend(self.dates.iter().cloned());
        rows.push(date_header);

        let mut weekday_header = vec![String::new(); LABEL_COLUMNS];
        weekday_header.extend(self.weekdays.iter().cloned());
        rows.push(weekday_header);

        for row in &self.rows {
            let mut cells = vec![row.issuer.clone(), row.item.clone()];
            cells.extend(row.quantities.iter().map(|quantity| format_text_quantity(*quantity)));
            rows.push(cells);
        }
        rows
    }
}

/// Quantity truncated to a whole number, or an empty string for an empty cell.
#[must_use]
pub fn format_text_quantity(quantity: Option<f64>) -> String {
    quantity.map_or_else(String::new, |value| format!("{}", value.trunc() as i64))
}

/// Semicolon-separated text with one grid row per line.
#[must_use]
pub fn to_text(grid: &ReportGrid) -> String {
    grid.text_rows().iter().fold(String::new(), |mut output, cells| {
        let _ = writeln!(output, "{}", cells.join(TEXT_SEPARATOR));
        output
    })
}

/// Save the report grid as semicolon-separated text.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_text(grid: &ReportGrid, output_file: &Path) -> Result<()> {
    println!(
        "{}",
        format!("Writing data to CSV:   {}", output_file.display()).green()
    );
    remove_existing(output_file);
    let mut file =
        File::create(output_file).with_context(|| format!("Failed to create file: {}", output_file.display()))?;
    file.write_all(to_text(grid).as_bytes())?;
    Ok(())
}

/// Content of one worksheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetValue {
    /// Bold header cell, blank when the text is empty.
    Header(String),
    Text(String),
    Number(f64),
}

/// Worksheet cell position and content.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetCell {
    pub row: RowNum,
    pub column: ColNum,
    pub value: SheetValue,
}

/// All cells written to the worksheet.
/// Empty quantity cells get no entry at all.
///
/// # Errors
/// Returns an error if the grid does not fit in a worksheet.
pub fn sheet_cells(grid: &ReportGrid) -> Result<Vec<SheetCell>> {
    let header = |row: RowNum, column: ColNum, text: &str| SheetCell {
        row,
        column,
        value: SheetValue::Header(text.to_string()),
    };

    let mut cells = vec![
        header(0, 0, ISSUER_HEADER),
        header(0, 1, ITEM_HEADER),
        header(1, 0, ""),
        header(1, 1, ""),
    ];

    for (index, (date, weekday)) in grid.dates.iter().zip(&grid.weekdays).enumerate() {
        let column = date_column(index)?;
        cells.push(header(0, column, date.as_str()));
        cells.push(header(1, column, weekday.as_str()));
    }

    for (index, row) in grid.rows.iter().enumerate() {
        let row_number = RowNum::try_from(index + 2).context("Too many rows for a worksheet")?;
        cells.push(SheetCell {
            row: row_number,
            column: 0,
            value: SheetValue::Text(row.issuer.clone()),
        });
        cells.push(SheetCell {
            row: row_number,
            column: 1,
            value: SheetValue::Text(row.item.clone()),
        });
        for (date_index, quantity) in row.quantities.iter().enumerate() {
            if let Some(quantity) = quantity {
                cells.push(SheetCell {
                    row: row_number,
                    column: date_column(date_index)?,
                    value: SheetValue::Number(*quantity),
                });
            }
        }
    }

    Ok(cells)
}

/// Build the workbook with bold header rows and fixed column widths.
///
/// # Errors
/// Returns an error if a cell or column cannot be written.
pub fn build_workbook(grid: &ReportGrid) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet().set_name(SHEET_NAME)?;
    let header_format = Format::new().set_bold();

    sheet.set_column_width(0, ISSUER_COLUMN_WIDTH)?;
    sheet.set_column_width(1, ITEM_COLUMN_WIDTH)?;
    for index in 0..grid.dates.len() {
        sheet.set_column_width(date_column(index)?, DATE_COLUMN_WIDTH)?;
    }

    for cell in sheet_cells(grid)? {
        match &cell.value {
            SheetValue::Header(text) if text.is_empty() => {
                sheet.write_blank(cell.row, cell.column, &header_format)?;
            }
            SheetValue::Header(text) => {
                sheet.write_string_with_format(cell.row, cell.column, text, &header_format)?;
            }
            SheetValue::Text(text) => {
                sheet.write_string(cell.row, cell.column, text)?;
            }
            SheetValue::Number(number) => {
                sheet.write_number(cell.row, cell.column, *number)?;
            }
        }
    }

    Ok(workbook)
}

/// Save the report grid as an Excel file.
///
/// # Errors
/// Returns an error if the workbook cannot be built or saved.
pub fn write_excel(grid: &ReportGrid, output_file: &Path) -> Result<()> {
    println!(
        "{}",
        format!("Writing data to Excel: {}", output_file.display()).green()
    );
    let mut workbook = build_workbook(grid)?;
    remove_existing(output_file);
    workbook
        .save(output_file)
        .with_context(|| format!("Failed to save Excel file: {}", output_file.display()))?;
    Ok(())
}

fn date_column(index: usize) -> Result<ColNum> {
    ColNum::try_from(index + LABEL_COLUMNS).context("Too many date columns for a worksheet")
}

fn remove_existing(output_file: &Path) {
    if output_file.exists()
        && let Err(e) = fs::remove_file(output_file)
    {
        print_error!("Failed to remove existing file {}: {e}", output_file.display());
    }
}
