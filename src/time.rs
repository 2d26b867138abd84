//! Time related utils.

use chrono::SecondsFormat;
use chrono::Utc;

/// The datetime used by this crate, always in UTC.
pub type DateTime = chrono::DateTime<Utc>;

/// Create a [`DateTime`] of now.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format a datetime into date: `20220301`.
pub fn format_date(t: DateTime) -> String {
    t.format("%Y%m%d").to_string()
}

/// Format a datetime into ISO8601: `20220313T072004Z`.
///
/// No punctuation, no milliseconds. This is the form embedded in the
/// credential scope and the `X-Amz-Date` value.
pub fn format_iso8601(t: DateTime) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
        .replace(['-', ':'], "")
}
