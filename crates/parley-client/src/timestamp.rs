//! Timestamp decoding.
//!
//! The server encodes dates several ways (see [`WireDate`]); everything
//! exposed by this crate is a `DateTime<Utc>`.

use chrono::{DateTime, Utc};
use parley_proto::WireDate;
use thiserror::Error;

/// Undecodable wire date.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// Milliseconds outside the representable range.
    #[error("timestamp {0}ms is out of range")]
    OutOfRange(i64),

    /// String is not valid ISO-8601/RFC 3339.
    #[error("invalid ISO-8601 date {value:?}: {reason}")]
    InvalidIso {
        /// Offending string
        value: String,
        /// Parser message
        reason: String,
    },

    /// Typed object is not a date.
    #[error("typed value {0:?} is not a date")]
    NotADate(String),
}

/// Decode a wire date.
pub fn decode_date(date: &WireDate) -> Result<DateTime<Utc>, TimestampError> {
    match date {
        WireDate::Millis(millis) => from_server_time(*millis),
        WireDate::Iso(iso) => parse_iso(iso),
        WireDate::Typed { kind, iso } => {
            if kind != WireDate::DATE_TYPE {
                return Err(TimestampError::NotADate(kind.clone()));
            }
            parse_iso(iso)
        },
    }
}

/// Decode a 64-bit server time in milliseconds since the Unix epoch.
pub fn from_server_time(millis: i64) -> Result<DateTime<Utc>, TimestampError> {
    DateTime::from_timestamp_millis(millis).ok_or(TimestampError::OutOfRange(millis))
}

fn parse_iso(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).map_err(|e| {
        TimestampError::InvalidIso { value: value.to_string(), reason: e.to_string() }
    })
}
