//! Sum quantities per issuer, item and effective date.

use std::collections::{BTreeMap, BTreeSet};

use mydata_tools::date::shift_iso_date;
use mydata_tools::print_warning;

use crate::parse::InvoiceLine;

/// Report row key: issuer name and item description.
pub type AggregationKey = (String, String);

/// Summed quantities per key and date, together with the shared date columns.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Aggregation {
    /// Date to summed quantity for each `(issuer, item)` key.
    pub rows: BTreeMap<AggregationKey, BTreeMap<String, f64>>,
    /// All effective dates in ascending order without duplicates.
    pub dates: Vec<String>,
}

#[cfg(test)]
impl Aggregation {
    /// Summed quantity for a key on a date, zero when there is none.
    pub fn quantity(&self, issuer: &str, item: &str, date: &str) -> f64 {
        self.rows
            .get(&(issuer.to_string(), item.to_string()))
            .and_then(|dates| dates.get(date))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Issue date moved by the line's date adjustment.
///
/// A date that cannot be shifted is kept as is.
#[must_use]
pub fn effective_date(line: &InvoiceLine) -> String {
    if line.date_adjustment == 0 {
        return line.issue_date.clone();
    }
    shift_iso_date(&line.issue_date, line.date_adjustment).unwrap_or_else(|| {
        print_warning!(
            "Warning: Cannot apply date adjustment {} to issue date '{}' of {}",
            line.date_adjustment,
            line.issue_date,
            line.issuer_name
        );
        line.issue_date.clone()
    })
}

/// Aggregate invoice lines into quantities per `(issuer, item)` and effective date.
#[must_use]
pub fn aggregate(lines: &[InvoiceLine]) -> Aggregation {
    let mut rows: BTreeMap<AggregationKey, BTreeMap<String, f64>> = BTreeMap::new();
    let mut dates: BTreeSet<String> = BTreeSet::new();

    for line in lines {
        let date = effective_date(line);
        let key = (line.issuer_name.clone(), line.item_description.clone());
        *rows.entry(key).or_default().entry(date.clone()).or_insert(0.0) += line.quantity;
        dates.insert(date);
    }

    Aggregation {
        rows,
        dates: dates.into_iter().collect(),
    }
}
