//! myDATA REST API client.
//!
//! Fetches one page of received invoices per request from the `RequestDocs` endpoint.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use reqwest::blocking::Client;

use mydata_tools::date::to_api_date;

/// Default `RequestDocs` endpoint.
pub const DEFAULT_BASE_URL: &str = "https://mydatapi.aade.gr/myDATA/RequestDocs";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

const USER_ID_HEADER: &str = "aade-user-id";
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// API credentials sent as request headers.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("api_key", &"***")
            .finish()
    }
}

/// Parameters for fetching a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery<'a> {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// Restrict results to this receiver VAT number.
    pub receiver_vat: Option<&'a str>,
    /// Partition and row key from the previous page.
    pub continuation: Option<(&'a str, &'a str)>,
}

impl PageQuery<'_> {
    /// Query string parameters in the order they are sent.
    #[must_use]
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("mark", "1".to_string()),
            ("dateFrom", to_api_date(self.date_from)),
            ("dateTo", to_api_date(self.date_to)),
        ];
        if let Some(vat) = self.receiver_vat {
            params.push(("receiverVatNumber", vat.to_string()));
        }
        if let Some((partition_key, row_key)) = self.continuation {
            params.push(("nextPartitionKey", partition_key.to_string()));
            params.push(("nextRowKey", row_key.to_string()));
        }
        params
    }
}

/// Source of raw invoice response pages.
pub trait InvoiceSource {
    /// Fetch one page of invoices as raw XML.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server responds with an error status.
    fn fetch_page(&self, query: &PageQuery<'_>) -> Result<String>;
}

/// Blocking HTTP client for the myDATA API.
#[derive(Debug)]
pub struct MyDataClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl MyDataClient {
    /// Create a new client with the given endpoint, credentials and per-request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            credentials,
        })
    }
}

impl InvoiceSource for MyDataClient {
    fn fetch_page(&self, query: &PageQuery<'_>) -> Result<String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&query.params())
            .header(USER_ID_HEADER, self.credentials.user_id.as_str())
            .header(SUBSCRIPTION_KEY_HEADER, self.credentials.api_key.as_str())
            .send()
            .with_context(|| {
                format!(
                    "Failed to send request for VAT {}",
                    query.receiver_vat.unwrap_or("(all)")
                )
            })?;

        let status = response.status();
        let body = response.text().context("Failed to read response body")?;

        if !status.is_success() {
            bail!("HTTP {status} - {body}");
        }

        Ok(body)
    }
}
