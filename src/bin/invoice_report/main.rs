//! invreport - Fetch myDATA invoices and report item quantities per day.
//!
//! This CLI tool downloads issued invoices from the myDATA `RequestDocs` endpoint,
//! optionally filters them by issuer VAT number with per-issuer date adjustments,
//! and generates Excel and CSV reports of the summed item quantities for each day.

mod aggregate;
mod client;
mod config;
mod fetch;
mod filter;
mod invoice_report;
mod parse;
mod report;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use crate::client::MyDataClient;
pub use crate::config::{Config, OutputFormat};
use crate::invoice_report::invoice_report;

/// Command line arguments for invreport.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Fetch myDATA invoices and report item quantities per day"
)]
pub struct InvoiceReportArgs {
    /// Start date in YYYY-MM-DD format
    #[arg(value_name = "START_DATE", required_unless_present = "completion")]
    pub start_date: Option<String>,

    /// End date in YYYY-MM-DD format
    #[arg(value_name = "END_DATE", required_unless_present = "completion")]
    pub end_date: Option<String>,

    /// Optional file of issuer VAT numbers with date adjustments
    #[arg(value_name = "VAT_FILE", value_hint = clap::ValueHint::FilePath)]
    pub vat_file: Option<PathBuf>,

    /// Output file name without extension
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write the unique issuer VAT numbers to this file
    #[arg(long, value_name = "PATH", value_hint = clap::ValueHint::FilePath)]
    pub vat_out: Option<PathBuf>,

    /// Fetch separately for each VAT number in the VAT file
    #[arg(short, long, requires = "vat_file")]
    pub targeted: bool,

    /// Generate shell completion
    #[arg(short = 'l', long, value_name = "SHELL")]
    pub completion: Option<Shell>,

    /// Print verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> Result<()> {
    let args = InvoiceReportArgs::parse();
    if let Some(ref shell) = args.completion {
        mydata_tools::generate_shell_completion(
            *shell,
            InvoiceReportArgs::command(),
            true,
            env!("CARGO_BIN_NAME"),
        )
    } else {
        let config = Config::from_args(&args)?;
        let client = MyDataClient::new(&config.base_url, config.credentials.clone(), config.timeout)?;
        invoice_report(&config, &client)
    }
}
