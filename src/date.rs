use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, TimeDelta};

/// Date format used on the command line, in reports and in the invoice XML.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Date format expected by the myDATA REST API query parameters.
pub const API_DATE_FORMAT: &str = "%d/%m/%Y";

/// Weekday names in Greek, starting from Monday.
pub static WEEKDAY_NAMES: [&str; 7] = [
    "Δευτέρα",
    "Τρίτη",
    "Τετάρτη",
    "Πέμπτη",
    "Παρασκευή",
    "Σάββατο",
    "Κυριακή",
];

/// Parse a `YYYY-MM-DD` date string.
///
/// # Errors
/// Returns an error if the text is not a valid calendar date in ISO format.
pub fn parse_iso_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), ISO_DATE_FORMAT)
        .with_context(|| format!("Invalid date '{text}'. Use YYYY-MM-DD format."))
}

/// Format date as `DD/MM/YYYY` for the API.
///
/// ```rust
/// use chrono::NaiveDate;
/// use mydata_tools::date::to_api_date;
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
/// assert_eq!(to_api_date(date), "09/03/2024");
/// ```
#[must_use]
pub fn to_api_date(date: NaiveDate) -> String {
    date.format(API_DATE_FORMAT).to_string()
}

/// Move an ISO date string by the given number of days.
///
/// Returns `None` if the input is not a valid date or the result is out of range.
#[must_use]
pub fn shift_iso_date(date: &str, days: i64) -> Option<String> {
    let parsed = NaiveDate::parse_from_str(date, ISO_DATE_FORMAT).ok()?;
    let shifted = parsed.checked_add_signed(TimeDelta::try_days(days)?)?;
    Some(shifted.format(ISO_DATE_FORMAT).to_string())
}

/// Get the localized weekday name for an ISO date string.
#[must_use]
pub fn weekday_name(date: &str) -> Option<&'static str> {
    let parsed = NaiveDate::parse_from_str(date, ISO_DATE_FORMAT).ok()?;
    Some(WEEKDAY_NAMES[parsed.weekday().num_days_from_monday() as usize])
}
