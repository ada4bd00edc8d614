use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::RuntimeError;

/// .NET custom date tokens mapped to chrono specifiers, longest first.
const FORMAT_TOKENS: &[(&str, &str)] = &[
    ("yyyy", "%Y"),
    ("yy", "%y"),
    ("MMMM", "%B"),
    ("MMM", "%b"),
    ("MM", "%m"),
    ("M", "%-m"),
    ("dddd", "%A"),
    ("ddd", "%a"),
    ("dd", "%d"),
    ("d", "%-d"),
    ("HH", "%H"),
    ("H", "%-H"),
    ("hh", "%I"),
    ("h", "%-I"),
    ("mm", "%M"),
    ("m", "%-M"),
    ("ss", "%S"),
    ("s", "%-S"),
    ("fff", "%3f"),
    ("tt", "%p"),
];

/// Translate a .NET-style custom format into a chrono format string.
pub fn chrono_format(dotnet: &str) -> String {
    let mut out = String::with_capacity(dotnet.len() * 2);
    let mut rest = dotnet;

    'outer: while let Some(c) = rest.chars().next() {
        for (token, spec) in FORMAT_TOKENS {
            if let Some(after) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = after;
                continue 'outer;
            }
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Seconds since the epoch of `input` read with a .NET-style format, as UTC.
pub fn date_to_unix(input: &str, format: &str) -> Result<i64, RuntimeError> {
    let fmt = chrono_format(format);
    let input = input.trim();
    let parsed = NaiveDateTime::parse_from_str(input, &fmt).or_else(|_| {
        NaiveDate::parse_from_str(input, &fmt).map(|date| date.and_hms_opt(0, 0, 0).unwrap_or_default())
    });
    parsed
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|e| RuntimeError::custom(format!("cannot read '{}' as a date in format '{}': {}", input, format, e)))
}

fn from_unix(input: &str) -> Result<DateTime<Utc>, RuntimeError> {
    let seconds: f64 = input
        .trim()
        .parse()
        .map_err(|_| RuntimeError::InvalidNumber(input.to_string()))?;
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() {
        return Err(RuntimeError::InvalidNumber(input.to_string()));
    }
    DateTime::from_timestamp_millis(millis as i64).ok_or_else(|| RuntimeError::InvalidNumber(input.to_string()))
}

/// Short date, `M/d/yyyy`.
pub fn unix_to_date(input: &str) -> Result<String, RuntimeError> {
    Ok(from_unix(input)?.format("%-m/%-d/%Y").to_string())
}

pub fn unix_to_iso8601(input: &str) -> Result<String, RuntimeError> {
    Ok(from_unix(input)?.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

pub fn current_unix_time() -> i64 {
    Utc::now().timestamp()
}
