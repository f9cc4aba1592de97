//! Placeholder formatting and the datetime conventions shown to the user.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::types::errors::FormatError;

/// Placeholder token replaced by [`format_message`].
pub const PLACEHOLDER: &str = "{}";

/// Replaces each `{}` in `template` with the next value, in order.
pub fn format_message(template: &str, values: &[&str]) -> Result<String, FormatError> {
    if template.matches(PLACEHOLDER).count() != values.len() {
        return Err(FormatError::PlaceholderMismatch {
            template: template.to_string(),
            values: values.len(),
        });
    }

    let mut parts = template.split(PLACEHOLDER);
    let mut result = parts.next().unwrap_or_default().to_string();
    for (value, rest) in values.iter().zip(parts) {
        result.push_str(value);
        result.push_str(rest);
    }
    Ok(result)
}

/// Parses a stored datetime into local wall-clock time.
///
/// Accepts RFC 3339 (converted to local time), naive `YYYY-MM-DDTHH:MM[:SS[.fff]]`
/// and plain `YYYY-MM-DD` dates.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// `DD-MM-YYYY`.
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// `DD-MM-YYYY HH:MM`, 24-hour clock.
pub fn format_datetime(datetime: &NaiveDateTime) -> String {
    datetime.format("%d-%m-%Y %H:%M").to_string()
}

/// Today's local date as `DD-MM-YYYY`.
pub fn current_date() -> String {
    format_date(&Local::now().date_naive())
}

/// Timestamp stored with a newly marked page, e.g. `2024-01-01T00:00:00.000Z`.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}
