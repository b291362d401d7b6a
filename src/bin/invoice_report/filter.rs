//! Issuer VAT number filtering and per-issuer date adjustment.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use colored::Colorize;

use mydata_tools::print_warning;

use crate::parse::InvoiceLine;

/// Date adjustment value parsed from one filter file line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Adjustment {
    Days(i64),
    Missing,
    Invalid(String),
}

/// Mapping from issuer VAT number to a signed day adjustment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjustmentTable {
    adjustments: BTreeMap<String, i64>,
}

impl AdjustmentTable {
    /// Read the table from a filter file.
    ///
    /// # Errors
    /// Returns an error if the file does not exist, cannot be read, or contains no VAT numbers.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("File '{}' not found", path.display());
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("Error reading file '{}'", path.display()))?;

        let table = Self::parse(&content);
        if table.is_empty() {
            bail!("No VAT numbers found in file '{}'", path.display());
        }
        Ok(table)
    }

    /// Parse filter file contents.
    ///
    /// Each line is `VAT_NUMBER DATE_ADJUSTMENT` separated by whitespace,
    /// and everything after a `#` is a comment.
    /// A missing or invalid adjustment defaults to zero with a warning.
    /// Later lines override earlier ones for the same VAT number.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut adjustments = BTreeMap::new();
        for (index, raw_line) in content.lines().enumerate() {
            let line_number = index + 1;
            let Some((vat, adjustment)) = parse_line(raw_line) else {
                continue;
            };
            let days = match adjustment {
                Adjustment::Days(days) => days,
                Adjustment::Missing => {
                    print_warning!("Warning: Line {line_number} missing date adjustment, using 0: {vat}");
                    0
                }
                Adjustment::Invalid(value) => {
                    print_warning!(
                        "Warning: Line {line_number} has invalid date adjustment '{value}', using 0: {vat}"
                    );
                    0
                }
            };
            adjustments.insert(vat, days);
        }
        Self { adjustments }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adjustments.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adjustments.len()
    }

    /// Date adjustment for the exact VAT number.
    #[must_use]
    pub fn get(&self, vat: &str) -> Option<i64> {
        self.adjustments.get(vat.trim()).copied()
    }

    /// VAT numbers with their adjustments, sorted by VAT number.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.adjustments.iter().map(|(vat, days)| (vat.as_str(), *days))
    }
}

/// Split a filter file line into a VAT number and its adjustment.
/// Returns `None` for blank and comment-only lines.
fn parse_line(line: &str) -> Option<(String, Adjustment)> {
    let content = line.split('#').next().unwrap_or_default().trim();
    let mut parts = content.split_whitespace();
    let vat = parts.next()?.to_string();
    let adjustment = match parts.next() {
        None => Adjustment::Missing,
        Some(value) => value
            .parse::<i64>()
            .map_or_else(|_| Adjustment::Invalid(value.to_string()), Adjustment::Days),
    };
    Some((vat, adjustment))
}

/// Keep only lines whose issuer VAT number is in the table and attach its date adjustment.
///
/// Without a table all lines pass through with a zero adjustment.
#[must_use]
pub fn apply_adjustments(lines: Vec<InvoiceLine>, table: Option<&AdjustmentTable>) -> Vec<InvoiceLine> {
    match table {
        None => lines.into_iter().map(|line| line.with_date_adjustment(0)).collect(),
        Some(table) => lines
            .into_iter()
            .filter_map(|line| {
                let days = table.get(&line.issuer_vat)?;
                Some(line.with_date_adjustment(days))
            })
            .collect(),
    }
}

/// Distinct non-empty issuer VAT numbers with the first issuer name seen for each.
#[must_use]
pub fn unique_issuers(lines: &[InvoiceLine]) -> BTreeMap<&str, &str> {
    let mut issuers: BTreeMap<&str, &str> = BTreeMap::new();
    for line in lines {
        if !line.issuer_vat.is_empty() {
            issuers
                .entry(line.issuer_vat.as_str())
                .or_insert(line.issuer_name.as_str());
        }
    }
    issuers
}

/// Write the distinct issuer VAT numbers as a filter file with zero adjustments.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_vat_file(lines: &[InvoiceLine], path: &Path) -> Result<()> {
    let issuers = unique_issuers(lines);
    let mut file =
        fs::File::create(path).with_context(|| format!("Failed to create VAT file: {}", path.display()))?;
    for (vat, name) in &issuers {
        writeln!(file, "{vat}  0   # {name}")?;
    }
    println!(
        "{}",
        format!(
            "VAT numbers file generated: {} ({} unique VAT numbers)",
            path.display(),
            issuers.len()
        )
        .green()
    );
    Ok(())
}
