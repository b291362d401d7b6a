//! Normalize one page of myDATA `RequestDocs` XML into flat invoice lines.

use quick_xml::NsReader;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};

/// Namespace of all consumed elements in the `RequestedDoc` response.
pub const INVOICE_NAMESPACE: &[u8] = b"http://www.aade.gr/myDATA/invoice/v1.0";

/// One invoice detail row flattened together with its invoice header data.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceLine {
    pub issuer_name: String,
    pub issuer_vat: String,
    pub item_description: String,
    /// Issue date as given in the source, expected to be `YYYY-MM-DD`.
    pub issue_date: String,
    pub quantity: f64,
    /// Signed number of days the issue date is moved before aggregation.
    pub date_adjustment: i64,
}

impl InvoiceLine {
    #[must_use]
    pub fn new(
        issuer_name: impl Into<String>,
        issuer_vat: impl Into<String>,
        item_description: impl Into<String>,
        issue_date: impl Into<String>,
        quantity: f64,
    ) -> Self {
        Self {
            issuer_name: issuer_name.into(),
            issuer_vat: issuer_vat.into(),
            item_description: item_description.into(),
            issue_date: issue_date.into(),
            quantity,
            date_adjustment: 0,
        }
    }

    /// Return the same line with the given date adjustment.
    #[must_use]
    pub fn with_date_adjustment(self, days: i64) -> Self {
        Self {
            date_adjustment: days,
            ..self
        }
    }
}

/// Pagination token returned by the server when more pages are available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub next_partition_key: Option<String>,
    pub next_row_key: Option<String>,
}

impl Cursor {
    /// Both keys when the cursor points to a next page.
    /// A partially filled cursor means there are no further pages.
    #[must_use]
    pub fn continuation(&self) -> Option<(&str, &str)> {
        match (self.next_partition_key.as_deref(), self.next_row_key.as_deref()) {
            (Some(partition), Some(row)) => Some((partition, row)),
            _ => None,
        }
    }
}

/// Parsed result of one response page.
#[derive(Debug, Default)]
pub struct InvoicePage {
    pub lines: Vec<InvoiceLine>,
    pub cursor: Cursor,
}

/// Header data collected while inside one `invoice` element.
#[derive(Debug, Default)]
struct RawInvoice {
    issuer_vat: Option<String>,
    issuer_name: Option<String>,
    issue_date: Option<String>,
    details: Vec<RawDetail>,
}

#[derive(Debug, Default)]
struct RawDetail {
    item_description: Option<String>,
    quantity: Option<String>,
}

impl RawInvoice {
    /// Convert to invoice lines, skipping the whole invoice if required header fields are missing.
    fn into_lines(self) -> Vec<InvoiceLine> {
        let (Some(issuer_name), Some(issue_date)) = (non_empty(self.issuer_name), non_empty(self.issue_date)) else {
            return Vec::new();
        };
        let issuer_vat = self.issuer_vat.unwrap_or_default();

        self.details
            .into_iter()
            .filter_map(|detail| {
                let item_description = non_empty(detail.item_description)?;
                let quantity = parse_quantity(detail.quantity.as_deref()?)?;
                Some(InvoiceLine::new(
                    issuer_name.clone(),
                    issuer_vat.clone(),
                    item_description,
                    issue_date.clone(),
                    quantity,
                ))
            })
            .collect()
    }
}

/// Accumulates parser state over the event stream of a single document.
#[derive(Debug, Default)]
struct PageBuilder {
    page: InvoicePage,
    text: String,
    invoice: Option<RawInvoice>,
    detail: Option<RawDetail>,
    invoices_doc_done: bool,
    continuation_done: bool,
}

type ElementPath = [Option<String>];

impl PageBuilder {
    fn start(&mut self, path: &ElementPath) {
        self.text.clear();
        match names(path).as_slice() {
            [_, Some("invoicesDoc"), Some("invoice")] if !self.invoices_doc_done => {
                self.invoice = Some(RawInvoice::default());
            }
            [_, Some("invoicesDoc"), Some("invoice"), Some("invoiceDetails")] if self.invoice.is_some() => {
                self.detail = Some(RawDetail::default());
            }
            _ => {}
        }
    }

    fn end(&mut self, path: &ElementPath) {
        let text = std::mem::take(&mut self.text).trim().to_string();
        match names(path).as_slice() {
            [_, Some("continuationToken"), Some("nextPartitionKey")] if !self.continuation_done && !text.is_empty() => {
                set_first(&mut self.page.cursor.next_partition_key, text);
            }
            [_, Some("continuationToken"), Some("nextRowKey")] if !self.continuation_done && !text.is_empty() => {
                set_first(&mut self.page.cursor.next_row_key, text);
            }
            [_, Some("continuationToken")] => {
                self.continuation_done = true;
            }
            [_, Some("invoicesDoc")] => {
                self.invoices_doc_done = true;
            }
            [_, Some("invoicesDoc"), Some("invoice")] => {
                if let Some(invoice) = self.invoice.take() {
                    self.page.lines.extend(invoice.into_lines());
                }
            }
            [_, Some("invoicesDoc"), Some("invoice"), Some("invoiceDetails")] => {
                if let (Some(invoice), Some(detail)) = (self.invoice.as_mut(), self.detail.take()) {
                    invoice.details.push(detail);
                }
            }
            [_, Some("invoicesDoc"), Some("invoice"), Some("issuer"), Some(field)] => {
                if let Some(invoice) = self.invoice.as_mut() {
                    match *field {
                        "vatNumber" => set_first(&mut invoice.issuer_vat, text),
                        "name" => set_first(&mut invoice.issuer_name, text),
                        _ => {}
                    }
                }
            }
            [_, Some("invoicesDoc"), Some("invoice"), Some("invoiceHeader"), Some("issueDate")] => {
                if let Some(invoice) = self.invoice.as_mut() {
                    set_first(&mut invoice.issue_date, text);
                }
            }
            [_, Some("invoicesDoc"), Some("invoice"), Some("invoiceDetails"), Some(field)] => {
                if let Some(detail) = self.detail.as_mut() {
                    match *field {
                        "itemDescr" => set_first(&mut detail.item_description, text),
                        "quantity" => set_first(&mut detail.quantity, text),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

/// Parse one XML response page into invoice lines and the pagination cursor.
///
/// Malformed XML results in an empty page without a cursor.
pub fn parse_invoices(xml: &str) -> InvoicePage {
    if xml.trim().is_empty() {
        return InvoicePage::default();
    }

    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut builder = PageBuilder::default();
    let mut path: Vec<Option<String>> = Vec::new();
    let mut root_closed = false;

    loop {
        match reader.read_resolved_event() {
            Ok((namespace, Event::Start(ref element))) => {
                let Some(name) = element_name(&namespace, element.local_name().as_ref()) else {
                    return InvoicePage::default();
                };
                if root_closed {
                    return InvoicePage::default();
                }
                path.push(name);
                builder.start(&path);
            }
            Ok((namespace, Event::Empty(ref element))) => {
                let Some(name) = element_name(&namespace, element.local_name().as_ref()) else {
                    return InvoicePage::default();
                };
                if root_closed {
                    return InvoicePage::default();
                }
                path.push(name);
                builder.start(&path);
                builder.end(&path);
                path.pop();
                root_closed = path.is_empty();
            }
            Ok((_, Event::Text(ref text))) => match text.unescape() {
                // Character data is only allowed inside the root element
                Ok(content) if path.is_empty() && !content.trim().is_empty() => return InvoicePage::default(),
                Ok(content) => builder.text.push_str(&content),
                Err(_) => return InvoicePage::default(),
            },
            Ok((_, Event::CData(ref data))) => {
                if path.is_empty() {
                    return InvoicePage::default();
                }
                builder.text.push_str(&String::from_utf8_lossy(data));
            }
            Ok((_, Event::End(_))) => {
                builder.end(&path);
                path.pop();
                root_closed = path.is_empty();
            }
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(_) => return InvoicePage::default(),
        }
    }

    if !path.is_empty() {
        // Unclosed elements at the end of input
        return InvoicePage::default();
    }

    builder.page
}

/// Element local name if it belongs to the invoice namespace, `None` inside the
/// outer option for elements of other namespaces.
///
/// Returns `None` for a prefix without a namespace declaration.
fn element_name(namespace: &ResolveResult, local_name: &[u8]) -> Option<Option<String>> {
    match namespace {
        ResolveResult::Bound(Namespace(uri)) if *uri == INVOICE_NAMESPACE => {
            Some(Some(String::from_utf8_lossy(local_name).into_owned()))
        }
        ResolveResult::Unknown(_) => None,
        _ => Some(None),
    }
}

fn names(path: &ElementPath) -> Vec<Option<&str>> {
    path.iter().map(Option::as_deref).collect()
}

/// Only the first matching element counts, like a first-child lookup.
fn set_first(slot: &mut Option<String>, value: String) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.is_empty())
}

/// Parse a quantity value, rejecting anything that is not a finite number.
fn parse_quantity(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|quantity| quantity.is_finite())
}


#[cfg(test)]
mod test_parse_invoices {
    use super::test_data::{continuation, invoice, response};
    use super::*;

    use mydata_tools::assert_f64_eq;

    #[test]
    fn parses_single_invoice_line() {
        let xml = response("", &invoice("ACME", "123", "2024-01-05", &[("Widget", "2")]));
        let page = parse_invoices(&xml);

        assert_eq!(page.lines.len(), 1);
        let line = &page.lines[0];
        assert_eq!(line.issuer_name, "ACME");
        assert_eq!(line.issuer_vat, "123");
        assert_eq!(line.item_description, "Widget");
        assert_eq!(line.issue_date, "2024-01-05");
        assert_f64_eq(line.quantity, 2.0);
        assert_eq!(line.date_adjustment, 0);
    }

    #[test]
    fn one_line_per_invoice_detail() {
        let xml = response(
            "",
            &invoice("ACME", "123", "2024-01-05", &[("Widget", "2"), ("Gadget", "1.5"), ("Widget", "3")]),
        );
        let page = parse_invoices(&xml);

        let descriptions: Vec<&str> = page.lines.iter().map(|l| l.item_description.as_str()).collect();
        assert_eq!(descriptions, ["Widget", "Gadget", "Widget"]);
        assert_f64_eq(page.lines[1].quantity, 1.5);
    }

    #[test]
    fn keeps_invoice_order() {
        let invoices = [
            invoice("B", "2", "2024-01-02", &[("x", "1")]),
            invoice("A", "1", "2024-01-01", &[("y", "1")]),
        ]
        .concat();
        let page = parse_invoices(&response("", &invoices));

        assert_eq!(page.lines[0].issuer_name, "B");
        assert_eq!(page.lines[1].issuer_name, "A");
    }

    #[test]
    fn trims_text_fields() {
        let xml = response(
            "",
            "<invoice><issuer><vatNumber> 123 </vatNumber><name>\n  ACME  \n</name></issuer>\
             <invoiceHeader><issueDate> 2024-01-05 </issueDate></invoiceHeader>\
             <invoiceDetails><itemDescr>  Widget </itemDescr><quantity> 4 </quantity></invoiceDetails></invoice>",
        );
        let page = parse_invoices(&xml);

        assert_eq!(page.lines.len(), 1);
        assert_eq!(page.lines[0].issuer_name, "ACME");
        assert_eq!(page.lines[0].issuer_vat, "123");
        assert_eq!(page.lines[0].item_description, "Widget");
        assert_eq!(page.lines[0].issue_date, "2024-01-05");
    }

    #[test]
    fn unescapes_entities() {
        let xml = response("", &invoice("A &amp; B", "1", "2024-01-05", &[("Nuts &lt;500g&gt;", "1")]));
        let page = parse_invoices(&xml);

        assert_eq!(page.lines[0].issuer_name, "A & B");
        assert_eq!(page.lines[0].item_description, "Nuts <500g>");
    }

    #[test]
    fn missing_vat_number_becomes_empty_string() {
        let xml = response(
            "",
            "<invoice><issuer><name>ACME</name></issuer><invoiceHeader><issueDate>2024-01-05</issueDate></invoiceHeader>\
             <invoiceDetails><itemDescr>Widget</itemDescr><quantity>1</quantity></invoiceDetails></invoice>",
        );
        let page = parse_invoices(&xml);

        assert_eq!(page.lines.len(), 1);
        assert_eq!(page.lines[0].issuer_vat, "");
    }

    #[test]
    fn invoice_without_issuer_name_is_skipped() {
        let invoices = [
            "<invoice><issuer><vatNumber>1</vatNumber></issuer><invoiceHeader><issueDate>2024-01-05</issueDate></invoiceHeader>\
             <invoiceDetails><itemDescr>Widget</itemDescr><quantity>1</quantity></invoiceDetails></invoice>"
                .to_string(),
            invoice("OK", "2", "2024-01-05", &[("Widget", "1")]),
        ]
        .concat();
        let page = parse_invoices(&response("", &invoices));

        assert_eq!(page.lines.len(), 1);
        assert_eq!(page.lines[0].issuer_name, "OK");
    }

    #[test]
    fn invoice_with_empty_issuer_name_is_skipped() {
        let xml = response("", &invoice("", "1", "2024-01-05", &[("Widget", "1")]));
        assert!(parse_invoices(&xml).lines.is_empty());
    }

    #[test]
    fn invoice_without_issue_date_is_skipped() {
        let xml = response(
            "",
            "<invoice><issuer><vatNumber>1</vatNumber><name>ACME</name></issuer><invoiceHeader><series>A</series></invoiceHeader>\
             <invoiceDetails><itemDescr>Widget</itemDescr><quantity>1</quantity></invoiceDetails></invoice>",
        );
        assert!(parse_invoices(&xml).lines.is_empty());
    }

    #[test]
    fn invoice_without_header_is_skipped() {
        let xml = response(
            "",
            "<invoice><issuer><vatNumber>1</vatNumber><name>ACME</name></issuer>\
             <invoiceDetails><itemDescr>Widget</itemDescr><quantity>1</quantity></invoiceDetails></invoice>",
        );
        assert!(parse_invoices(&xml).lines.is_empty());
    }

    #[test]
    fn issue_date_outside_header_is_ignored() {
        let xml = response(
            "",
            "<invoice><issuer><name>ACME</name></issuer><issueDate>2024-01-05</issueDate>\
             <invoiceDetails><itemDescr>Widget</itemDescr><quantity>1</quantity></invoiceDetails></invoice>",
        );
        assert!(parse_invoices(&xml).lines.is_empty());
    }

    #[test]
    fn bad_lines_do_not_discard_sibling_lines() {
        let xml = response(
            "",
            "<invoice><issuer><name>ACME</name></issuer><invoiceHeader><issueDate>2024-01-05</issueDate></invoiceHeader>\
             <invoiceDetails><quantity>1</quantity></invoiceDetails>\
             <invoiceDetails><itemDescr>No quantity</itemDescr></invoiceDetails>\
             <invoiceDetails><itemDescr>Text quantity</itemDescr><quantity>many</quantity></invoiceDetails>\
             <invoiceDetails><itemDescr>Empty quantity</itemDescr><quantity/></invoiceDetails>\
             <invoiceDetails><itemDescr>Widget</itemDescr><quantity>7</quantity></invoiceDetails></invoice>",
        );
        let page = parse_invoices(&xml);

        assert_eq!(page.lines.len(), 1);
        assert_eq!(page.lines[0].item_description, "Widget");
        assert_f64_eq(page.lines[0].quantity, 7.0);
    }

    #[test]
    fn non_finite_quantity_is_skipped() {
        let xml = response("", &invoice("ACME", "1", "2024-01-05", &[("a", "NaN"), ("b", "inf"), ("c", "1e1")]));
        let page = parse_invoices(&xml);

        assert_eq!(page.lines.len(), 1);
        assert_f64_eq(page.lines[0].quantity, 10.0);
    }

    #[test]
    fn issue_date_is_not_validated() {
        let xml = response("", &invoice("ACME", "1", "05/01/2024", &[("Widget", "1")]));
        assert_eq!(parse_invoices(&xml).lines[0].issue_date, "05/01/2024");
    }

    #[test]
    fn invoices_outside_invoices_doc_are_ignored() {
        let xml = format!(
            r#"<RequestedDoc xmlns="http://www.aade.gr/myDATA/invoice/v1.0">{}<other>{}</other></RequestedDoc>"#,
            invoice("ROOT", "1", "2024-01-05", &[("x", "1")]),
            invoice("OTHER", "2", "2024-01-05", &[("y", "1")]),
        );
        assert!(parse_invoices(&xml).lines.is_empty());
    }

    #[test]
    fn nested_invoices_doc_is_ignored() {
        let xml = response(
            "",
            &format!("<wrapper><invoicesDoc>{}</invoicesDoc></wrapper>", invoice("DEEP", "1", "2024-01-05", &[("x", "1")])),
        );
        assert!(parse_invoices(&xml).lines.is_empty());
    }

    #[test]
    fn only_first_invoices_doc_is_read() {
        let xml = format!(
            r#"<RequestedDoc xmlns="http://www.aade.gr/myDATA/invoice/v1.0"><invoicesDoc>{}</invoicesDoc><invoicesDoc>{}</invoicesDoc></RequestedDoc>"#,
            invoice("FIRST", "1", "2024-01-05", &[("x", "1")]),
            invoice("SECOND", "2", "2024-01-05", &[("y", "1")]),
        );
        let page = parse_invoices(&xml);

        assert_eq!(page.lines.len(), 1);
        assert_eq!(page.lines[0].issuer_name, "FIRST");
    }

    #[test]
    fn elements_in_other_namespace_are_ignored() {
        let xml = format!(
            r#"<RequestedDoc xmlns="urn:something:else"><invoicesDoc>{}</invoicesDoc></RequestedDoc>"#,
            invoice("ACME", "1", "2024-01-05", &[("x", "1")]),
        );
        assert!(parse_invoices(&xml).lines.is_empty());
    }

    #[test]
    fn prefixed_namespace_is_supported() {
        let xml = r#"<ns:RequestedDoc xmlns:ns="http://www.aade.gr/myDATA/invoice/v1.0"><ns:invoicesDoc><ns:invoice>
            <ns:issuer><ns:vatNumber>9</ns:vatNumber><ns:name>ACME</ns:name></ns:issuer>
            <ns:invoiceHeader><ns:issueDate>2024-01-05</ns:issueDate></ns:invoiceHeader>
            <ns:invoiceDetails><ns:itemDescr>Widget</ns:itemDescr><ns:quantity>2</ns:quantity></ns:invoiceDetails>
            </ns:invoice></ns:invoicesDoc></ns:RequestedDoc>"#;
        let page = parse_invoices(xml);

        assert_eq!(page.lines.len(), 1);
        assert_eq!(page.lines[0].issuer_vat, "9");
    }

    #[test]
    fn reads_continuation_token() {
        let xml = response(&continuation("partition-1", "row-7"), "");
        let page = parse_invoices(&xml);

        assert!(page.lines.is_empty());
        assert_eq!(page.cursor.next_partition_key.as_deref(), Some("partition-1"));
        assert_eq!(page.cursor.next_row_key.as_deref(), Some("row-7"));
        assert_eq!(page.cursor.continuation(), Some(("partition-1", "row-7")));
    }

    #[test]
    fn missing_continuation_token_has_no_cursor() {
        let xml = response("", &invoice("ACME", "1", "2024-01-05", &[("x", "1")]));
        let page = parse_invoices(&xml);

        assert_eq!(page.cursor, Cursor::default());
        assert!(page.cursor.continuation().is_none());
    }

    #[test]
    fn partial_continuation_token_has_no_continuation() {
        let xml = response(
            "<continuationToken><nextPartitionKey>p</nextPartitionKey></continuationToken>",
            "",
        );
        let page = parse_invoices(&xml);

        assert_eq!(page.cursor.next_partition_key.as_deref(), Some("p"));
        assert!(page.cursor.next_row_key.is_none());
        assert!(page.cursor.continuation().is_none());
    }

    #[test]
    fn empty_continuation_keys_are_absent() {
        let xml = response(
            "<continuationToken><nextPartitionKey/><nextRowKey></nextRowKey></continuationToken>",
            "",
        );
        let page = parse_invoices(&xml);

        assert!(page.cursor.continuation().is_none());
    }

    #[test]
    fn malformed_xml_gives_empty_page() {
        let xml = format!(
            "{}<unclosed>",
            response(&continuation("p", "r"), &invoice("ACME", "1", "2024-01-05", &[("x", "1")]))
        );
        let page = parse_invoices(&xml);

        assert!(page.lines.is_empty());
        assert!(page.cursor.continuation().is_none());
    }

    #[test]
    fn mismatched_end_tag_gives_empty_page() {
        let xml = r#"<RequestedDoc xmlns="http://www.aade.gr/myDATA/invoice/v1.0"><invoicesDoc></invoice></RequestedDoc>"#;
        assert!(parse_invoices(xml).lines.is_empty());
    }

    #[test]
    fn second_root_element_gives_empty_page() {
        let xml = format!(
            "{}<RequestedDoc/>",
            response(&continuation("p", "r"), &invoice("ACME", "1", "2024-01-05", &[("x", "1")]))
        );
        let page = parse_invoices(&xml);

        assert!(page.lines.is_empty());
        assert!(page.cursor.continuation().is_none());
    }

    #[test]
    fn text_after_root_element_gives_empty_page() {
        let xml = format!(
            "{}trailing",
            response(&continuation("p", "r"), &invoice("ACME", "1", "2024-01-05", &[("x", "1")]))
        );
        let page = parse_invoices(&xml);

        assert!(page.lines.is_empty());
        assert!(page.cursor.continuation().is_none());
    }

    #[test]
    fn trailing_whitespace_and_comments_are_allowed() {
        let xml = format!(
            "{}\n<!-- end of page -->\n",
            response("", &invoice("ACME", "1", "2024-01-05", &[("x", "1")]))
        );
        assert_eq!(parse_invoices(&xml).lines.len(), 1);
    }

    #[test]
    fn undeclared_prefix_gives_empty_page() {
        let invoices = format!(
            "{}<x:note>unbound</x:note>",
            invoice("ACME", "1", "2024-01-05", &[("x", "1")])
        );
        let page = parse_invoices(&response(&continuation("p", "r"), &invoices));

        assert!(page.lines.is_empty());
        assert!(page.cursor.continuation().is_none());
    }

    #[test]
    fn declared_foreign_prefix_is_ignored() {
        let invoices = format!(
            r#"{}<x:note xmlns:x="urn:other">bound</x:note>"#,
            invoice("ACME", "1", "2024-01-05", &[("x", "1")])
        );
        assert_eq!(parse_invoices(&response("", &invoices)).lines.len(), 1);
    }

    #[test]
    fn empty_input_gives_empty_page() {
        let page = parse_invoices("");
        assert!(page.lines.is_empty());
        assert!(page.cursor.continuation().is_none());
    }
}
