use chrono::{DateTime, Utc};
use thiserror::Error;

use kubemerge_types::LogEntry;

/// Why a raw line could not be turned into a [`LogEntry`]
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("missing space between timestamp and message")]
    MissingSeparator,

    #[error("invalid timestamp '{timestamp}': {source}")]
    InvalidTimestamp {
        timestamp: String,
        source: chrono::ParseError,
    },
}

/// Parser for Kubernetes log lines requested with `timestamps: true`
pub struct LogParser;

impl LogParser {
    /// Parse a raw line of the form `<RFC3339 timestamp> <message>`
    ///
    /// Example: `2024-12-23T15:04:05.999999999Z some log text`
    pub fn parse(raw: &str) -> Result<LogEntry, ParseError> {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        let (ts_str, message) = line.split_once(' ').ok_or(ParseError::MissingSeparator)?;

        let timestamp = DateTime::parse_from_rfc3339(ts_str)
            .map_err(|source| ParseError::InvalidTimestamp {
                timestamp: ts_str.to_string(),
                source,
            })?
            .with_timezone(&Utc);

        Ok(LogEntry::new(timestamp, message))
    }

    /// Best-effort timestamp of a line, used by sources that filter by time
    pub fn timestamp_of(raw: &str) -> Option<DateTime<Utc>> {
        Self::parse(raw).ok().map(|entry| entry.timestamp)
    }
}
