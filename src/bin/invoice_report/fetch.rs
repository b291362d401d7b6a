//! Pagination over the invoice source.

use chrono::NaiveDate;
use colored::Colorize;

use mydata_tools::print_error;

use crate::client::{InvoiceSource, PageQuery};
use crate::filter::AdjustmentTable;
use crate::parse::{Cursor, InvoiceLine, parse_invoices};

/// How invoices are requested from the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Fetch everything for the period and filter by issuer afterwards.
    #[default]
    Global,
    /// Fetch separately for each identifier in the adjustment table.
    Targeted,
}

/// Inclusive date range of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Fetch all pages for the period, following the continuation token until the server stops sending one.
///
/// A failed request ends the pagination and returns the lines collected so far.
pub fn fetch_all_pages(
    source: &impl InvoiceSource,
    range: DateRange,
    receiver_vat: Option<&str>,
    verbose: bool,
) -> Vec<InvoiceLine> {
    let mut lines: Vec<InvoiceLine> = Vec::new();
    let mut cursor = Cursor::default();
    let mut page_number: usize = 1;

    loop {
        let query = PageQuery {
            date_from: range.from,
            date_to: range.to,
            receiver_vat,
            continuation: cursor.continuation(),
        };

        let xml = match source.fetch_page(&query) {
            Ok(xml) => xml,
            Err(error) => {
                print_error!(
                    "Failed to fetch page {page_number} for VAT {}: {error:#}",
                    receiver_vat.unwrap_or("(all)")
                );
                break;
            }
        };
        if xml.is_empty() {
            break;
        }

        let page = parse_invoices(&xml);
        println!(
            "  Page {page_number}: Found {} invoice items",
            format!("{}", page.lines.len()).cyan()
        );
        lines.extend(page.lines);

        let Some((partition_key, row_key)) = page.cursor.continuation() else {
            break;
        };
        if verbose {
            println!("    next partition: {partition_key}, next row: {row_key}");
        }
        cursor = page.cursor;
        page_number += 1;
    }

    lines
}

/// Fetch all invoices for the period without any receiver restriction.
pub fn fetch_global(source: &impl InvoiceSource, range: DateRange, verbose: bool) -> Vec<InvoiceLine> {
    println!(
        "{}",
        format!("Fetching all invoices for period {} to {}...", range.from, range.to)
            .bold()
            .magenta()
    );
    let lines = fetch_all_pages(source, range, None, verbose);
    println!("Total invoice items fetched: {}", lines.len());
    lines
}

/// Fetch invoices separately for each identifier of the table.
///
/// Every line gets the date adjustment of the identifier it was fetched for.
pub fn fetch_targeted(
    source: &impl InvoiceSource,
    range: DateRange,
    table: &AdjustmentTable,
    verbose: bool,
) -> Vec<InvoiceLine> {
    let mut lines: Vec<InvoiceLine> = Vec::new();
    for (vat, days) in table.iter() {
        println!(
            "{}",
            format!("Fetching invoices for VAT {vat} for period {} to {}...", range.from, range.to)
                .bold()
                .magenta()
        );
        lines.extend(
            fetch_all_pages(source, range, Some(vat), verbose)
                .into_iter()
                .map(|line| line.with_date_adjustment(days)),
        );
    }
    println!("Total invoice items fetched: {}", lines.len());
    lines
}


#[cfg(test)]
mod test_fetch_all_pages {
    use super::test_source::{FakeSource, RecordedQuery};
    use super::*;

    use crate::parse::test_data::{continuation, invoice, response};

    fn range() -> DateRange {
        DateRange {
            from: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
            to: NaiveDate::from_ymd_opt(2024, 1, 31).expect("valid date"),
        }
    }

    fn page(cursor: &str, issuer: &str, count: usize) -> String {
        response(cursor, &invoice(issuer, "1", "2024-01-05", &[("Widget", "1")]).repeat(count))
    }

    #[test]
    fn single_page_without_cursor() {
        let source = FakeSource::new(vec![Ok(page("", "A", 2))]);
        let lines = fetch_all_pages(&source, range(), None, false);

        assert_eq!(lines.len(), 2);
        assert_eq!(source.request_count(), 1);
        assert_eq!(
            source.queries.borrow()[0],
            RecordedQuery {
                receiver_vat: None,
                continuation: None
            }
        );
    }

    #[test]
    fn follows_cursor_and_keeps_page_order() {
        let source = FakeSource::new(vec![
            Ok(page(&continuation("p1", "r1"), "FIRST", 2)),
            Ok(page(&continuation("p2", "r2"), "SECOND", 3)),
            Ok(page("", "THIRD", 1)),
        ]);
        let lines = fetch_all_pages(&source, range(), None, false);

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0].issuer_name, "FIRST");
        assert_eq!(lines[2].issuer_name, "SECOND");
        assert_eq!(lines[5].issuer_name, "THIRD");

        let queries = source.queries.borrow();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0].continuation, None);
        assert_eq!(queries[1].continuation, Some(("p1".to_string(), "r1".to_string())));
        assert_eq!(queries[2].continuation, Some(("p2".to_string(), "r2".to_string())));
    }

    #[test]
    fn partial_cursor_stops_pagination() {
        let partial = "<continuationToken><nextPartitionKey>p1</nextPartitionKey></continuationToken>";
        let source = FakeSource::new(vec![Ok(page(partial, "A", 1)), Ok(page("", "B", 1))]);
        let lines = fetch_all_pages(&source, range(), None, false);

        assert_eq!(lines.len(), 1);
        assert_eq!(source.request_count(), 1);
    }

    #[test]
    fn failure_keeps_lines_fetched_so_far() {
        let source = FakeSource::new(vec![
            Ok(page(&continuation("p1", "r1"), "A", 2)),
            Err("HTTP 500".to_string()),
            Ok(page("", "B", 1)),
        ]);
        let lines = fetch_all_pages(&source, range(), None, false);

        assert_eq!(lines.len(), 2);
        assert_eq!(source.request_count(), 2);
    }

    #[test]
    fn failure_on_first_page_gives_no_lines() {
        let source = FakeSource::new(vec![Err("connection refused".to_string())]);
        assert!(fetch_all_pages(&source, range(), None, false).is_empty());
        assert_eq!(source.request_count(), 1);
    }

    #[test]
    fn empty_body_stops_pagination() {
        let source = FakeSource::new(vec![Ok(String::new()), Ok(page("", "A", 1))]);
        assert!(fetch_all_pages(&source, range(), None, false).is_empty());
        assert_eq!(source.request_count(), 1);
    }

    #[test]
    fn malformed_page_stops_pagination() {
        let source = FakeSource::new(vec![Ok("<RequestedDoc>".to_string()), Ok(page("", "A", 1))]);
        assert!(fetch_all_pages(&source, range(), None, false).is_empty());
        assert_eq!(source.request_count(), 1);
    }

    #[test]
    fn passes_receiver_vat_to_every_page() {
        let source = FakeSource::new(vec![Ok(page(&continuation("p", "r"), "A", 1)), Ok(page("", "A", 1))]);
        fetch_all_pages(&source, range(), Some("999"), false);

        let queries = source.queries.borrow();
        assert!(queries.iter().all(|q| q.receiver_vat.as_deref() == Some("999")));
    }
}
