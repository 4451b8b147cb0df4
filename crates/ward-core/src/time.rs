//! Timestamps.
//!
//! One fixed, sortable textual format is used everywhere a timestamp is
//! rendered: revision filenames, lock expiry markers, and payload metadata.
//! Lexicographic order of the textual form equals chronological order, which
//! is what lets revision listings sort by plain string comparison.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The sortable render format: `YYYY-MM-DDTHH:mm:ss.SSSZ`.
const SORTABLE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Errors when parsing a timestamp from its textual form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// The string did not match the sortable format
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// A point in time with millisecond precision.
///
/// Precision is capped at milliseconds so that a value survives the
/// render/parse round trip through its textual form unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current time, truncated to millisecond precision.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Creates a timestamp from a chrono datetime, truncating to milliseconds.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let millis = dt.timestamp_millis();
        Self(
            DateTime::<Utc>::from_timestamp_millis(millis)
                .expect("millisecond timestamp out of datetime range"),
        )
    }

    /// Renders the sortable textual form.
    pub fn to_sortable(&self) -> String {
        self.0.format(SORTABLE_FORMAT).to_string()
    }

    /// Parses the sortable textual form.
    pub fn parse_sortable(s: &str) -> Result<Self, TimeError> {
        let naive = NaiveDateTime::parse_from_str(s, SORTABLE_FORMAT)
            .map_err(|_| TimeError::InvalidTimestamp(s.to_string()))?;
        Ok(Self(naive.and_utc()))
    }

    /// Returns this timestamp advanced by `duration`.
    pub fn add(&self, duration: Duration) -> Self {
        Self::from_datetime(self.0 + chrono::Duration::milliseconds(duration.as_millis() as i64))
    }

    /// Milliseconds since the Unix epoch.
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sortable())
    }
}
