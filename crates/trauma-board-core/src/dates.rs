//! Date conversions between the board's display form and widget form.
//!
//! Humans read and type `DD/MM/YYYY`; date inputs exchange `YYYY-MM-DD`.
//! Every helper here returns an empty string for malformed input instead of
//! failing.

use chrono::{DateTime, NaiveDate};

/// Display format used on every table.
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y";

/// Format exchanged with date input widgets.
pub const INPUT_FORMAT: &str = "%Y-%m-%d";

/// Parse a `DD/MM/YYYY` calendar date. Unpadded day/month are accepted.
pub fn parse_display_date(value: &str) -> Option<NaiveDate> {
    let mut parts = value.trim().split('/');
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn format_display_date(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

/// `DD/MM/YYYY` to `YYYY-MM-DD` for a date widget.
pub fn display_to_input(value: &str) -> String {
    parse_display_date(value)
        .map(|date| date.format(INPUT_FORMAT).to_string())
        .unwrap_or_default()
}

/// `YYYY-MM-DD` from a date widget to `DD/MM/YYYY`.
pub fn input_to_display(value: &str) -> String {
    NaiveDate::parse_from_str(value.trim(), INPUT_FORMAT)
        .map(format_display_date)
        .unwrap_or_default()
}

/// Render any stored date-ish string as `DD/MM/YYYY`.
///
/// Accepts ISO dates, RFC 3339 timestamps and values already in display form.
pub fn format_date_uk(value: Option<&str>) -> String {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return String::new();
    };

    if let Ok(date) = NaiveDate::parse_from_str(value, INPUT_FORMAT) {
        return format_display_date(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return format_display_date(timestamp.date_naive());
    }
    parse_display_date(value)
        .map(format_display_date)
        .unwrap_or_default()
}
