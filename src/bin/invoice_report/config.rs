//! Configuration module for invreport.
//!
//! Handles reading configuration from CLI arguments, environment variables and the user config file.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::ValueEnum;
use serde::Deserialize;

use mydata_tools::date::parse_iso_date;

use crate::InvoiceReportArgs;
use crate::client::{Credentials, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECONDS};
use crate::fetch::{DateRange, FetchStrategy};
use crate::filter::AdjustmentTable;

/// Default output file name without extension.
pub const DEFAULT_OUTPUT_NAME: &str = "invoice_report";

pub const USER_ID_ENV: &str = "MYDATA_USER_ID";
pub const API_KEY_ENV: &str = "MYDATA_API_KEY";

/// Output file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Excel workbook
    #[default]
    #[value(alias = "spreadsheet")]
    #[serde(alias = "spreadsheet")]
    Xlsx,
    /// Semicolon-separated text
    #[value(alias = "text")]
    #[serde(alias = "text")]
    Csv,
    /// Both Excel and text
    Both,
}

impl OutputFormat {
    #[must_use]
    pub const fn writes_excel(self) -> bool {
        matches!(self, Self::Xlsx | Self::Both)
    }

    #[must_use]
    pub const fn writes_text(self) -> bool {
        matches!(self, Self::Csv | Self::Both)
    }
}

/// User configuration from the config file.
#[derive(Debug, Default, Deserialize)]
pub struct InvoiceReportConfig {
    /// myDATA user id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// myDATA API subscription key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// API endpoint override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Output file name without extension.
    #[serde(default)]
    pub output: Option<String>,
    /// Output format.
    #[serde(default)]
    pub format: Option<OutputFormat>,
    /// Fetch separately for each VAT number in the filter file.
    #[serde(default)]
    pub targeted: bool,
    /// Print verbose output.
    #[serde(default)]
    pub verbose: bool,
}

/// Wrapper needed for parsing the config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    invoice_report: InvoiceReportConfig,
}

impl InvoiceReportConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    ///
    /// # Errors
    /// Returns an error if config file exists but cannot be read or parsed.
    pub fn get_user_config() -> Result<Self> {
        match mydata_tools::config::read_user_config()? {
            Some(content) => Self::from_toml_str(&content).map_err(|e| anyhow!("Failed to parse config file:\n{e}")),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.invoice_report)
            .map_err(|e| anyhow!("Failed to parse config: {e}"))
    }
}

/// Credential values from environment variables.
#[derive(Debug, Default, Clone)]
pub struct EnvCredentials {
    pub user_id: Option<String>,
    pub api_key: Option<String>,
}

impl EnvCredentials {
    /// Read `MYDATA_USER_ID` and `MYDATA_API_KEY`, ignoring empty values.
    #[must_use]
    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok().filter(|value| !value.trim().is_empty());
        Self {
            user_id: read(USER_ID_ENV),
            api_key: read(API_KEY_ENV),
        }
    }
}

/// Final config combined from CLI arguments, environment and user config file.
#[derive(Debug)]
pub struct Config {
    /// Requested issue date range.
    pub range: DateRange,
    /// VAT number filter with date adjustments.
    pub table: Option<AdjustmentTable>,
    /// Path of the filter file the table was read from.
    pub vat_file: Option<PathBuf>,
    /// Output file path without extension.
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Write the unique issuer VAT numbers to this file.
    pub vat_out: Option<PathBuf>,
    pub strategy: FetchStrategy,
    pub base_url: String,
    pub timeout: Duration,
    pub credentials: Credentials,
    pub verbose: bool,
}

impl Config {
    /// Create config from given command line args, environment and user config file.
    ///
    /// # Errors
    /// Returns an error if the dates are invalid, the filter file cannot be used,
    /// or the API credentials are missing.
    pub fn from_args(args: &InvoiceReportArgs) -> Result<Self> {
        Self::from_args_and_config(args, &InvoiceReportConfig::get_user_config()?, &EnvCredentials::from_env())
    }

    /// Create config from given command line args and explicit user config and environment.
    /// This is useful for testing without reading from the config file or environment.
    ///
    /// # Errors
    /// Returns an error if the dates are invalid, the filter file cannot be used,
    /// or the API credentials are missing.
    pub fn from_args_and_config(
        args: &InvoiceReportArgs,
        user_config: &InvoiceReportConfig,
        env_credentials: &EnvCredentials,
    ) -> Result<Self> {
        let start_date = args.start_date.as_deref().context("Missing start date")?;
        let end_date = args.end_date.as_deref().context("Missing end date")?;
        let range = DateRange {
            from: parse_iso_date(start_date).context("Invalid start date")?,
            to: parse_iso_date(end_date).context("Invalid end date")?,
        };

        let table = args
            .vat_file
            .as_deref()
            .map(AdjustmentTable::from_file)
            .transpose()?;

        let strategy = if args.targeted || user_config.targeted {
            if table.is_none() {
                bail!("Targeted fetch requires a VAT file");
            }
            FetchStrategy::Targeted
        } else {
            FetchStrategy::Global
        };

        let credentials = resolve_credentials(user_config, env_credentials)?;

        // CLI args take priority over user config
        let output = args
            .output
            .clone()
            .or_else(|| user_config.output.clone())
            .unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_string());
        let format = args.format.or(user_config.format).unwrap_or_default();
        let verbose = args.verbose || user_config.verbose;
        let base_url = user_config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout = Duration::from_secs(user_config.timeout.unwrap_or(DEFAULT_TIMEOUT_SECONDS));

        Ok(Self {
            range,
            table,
            vat_file: args.vat_file.clone(),
            output: PathBuf::from(output),
            format,
            vat_out: args.vat_out.clone(),
            strategy,
            base_url,
            timeout,
            credentials,
            verbose,
        })
    }

    /// Excel output file path.
    #[must_use]
    pub fn excel_path(&self) -> PathBuf {
        mydata_tools::append_extension_to_path(self.output.clone(), "xlsx")
    }

    /// Text output file path.
    #[must_use]
    pub fn text_path(&self) -> PathBuf {
        mydata_tools::append_extension_to_path(self.output.clone(), "csv")
    }
}

/// Environment variables take priority over the config file.
fn resolve_credentials(user_config: &InvoiceReportConfig, env_credentials: &EnvCredentials) -> Result<Credentials> {
    let user_id = env_credentials.user_id.clone().or_else(|| user_config.user_id.clone());
    let api_key = env_credentials.api_key.clone().or_else(|| user_config.api_key.clone());
    match (user_id, api_key) {
        (Some(user_id), Some(api_key)) => Ok(Credentials { user_id, api_key }),
        _ => Err(anyhow!(
            "{USER_ID_ENV} and {API_KEY_ENV} must be set as environment variables or as user_id and api_key in the [invoice_report] section of {}",
            mydata_tools::config::CONFIG_PATH
                .as_deref()
                .map_or_else(|| "the config file".to_string(), |path| path.display().to_string())
        )),
    }
}
