use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use kubemerge_types::LogSince;

use crate::error::AggregateError;

/// What the caller wants aggregated
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateRequest {
    /// Keep streaming after the historical output
    pub follow: bool,

    /// Lower bound for historical output
    pub since: Option<LogSince>,

    /// Restrict to these source ids (empty = all)
    pub sources: Vec<String>,
}

impl AggregateRequest {
    pub fn new(follow: bool) -> Self {
        Self {
            follow,
            ..Default::default()
        }
    }

    pub fn with_since(mut self, since: Option<LogSince>) -> Self {
        self.since = since;
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Build a request from raw `--since` / `--since-time` style options
    pub fn from_flags(
        follow: bool,
        since: Option<&str>,
        since_time: Option<&str>,
        sources: Vec<String>,
    ) -> Result<Self, AggregateError> {
        let since = parse_since(since, since_time)?;
        Ok(Self::new(follow).with_since(since).with_sources(sources))
    }
}

/// Resolve the mutually exclusive relative and absolute lower bounds
pub fn parse_since(since: Option<&str>, since_time: Option<&str>) -> Result<Option<LogSince>, AggregateError> {
    match (since, since_time) {
        (Some(_), Some(_)) => Err(AggregateError::Usage(
            "Cannot use both --since and --since-time; use only one of them".to_string(),
        )),
        (Some(since), None) => {
            let ago = parse_duration(since)?;
            Ok((!ago.is_zero()).then_some(LogSince::Ago(ago)))
        }
        (None, Some(since_time)) => {
            let time = DateTime::parse_from_rfc3339(since_time).map_err(|e| {
                AggregateError::Usage(format!(
                    "Invalid --since-time '{}': {} (use RFC3339, e.g. '2024-12-27T15:04:05Z')",
                    since_time, e
                ))
            })?;
            Ok(Some(LogSince::Time(time.with_timezone(&Utc))))
        }
        (None, None) => Ok(None),
    }
}

/// Parse durations like `30s`, `15m`, `3h`, `1h30m` or `1.5h`
pub fn parse_duration(s: &str) -> Result<Duration, AggregateError> {
    let invalid = || {
        AggregateError::Usage(format!(
            "Invalid duration '{}': use values like 30s, 15m or 3h",
            s
        ))
    };

    let s = s.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let whole = Regex::new(r"^(?:\d+(?:\.\d+)?(?:ns|us|µs|ms|s|m|h))+$").map_err(|_| invalid())?;
    if !whole.is_match(s) {
        return Err(invalid());
    }

    let part = Regex::new(r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h)").map_err(|_| invalid())?;
    let mut total = Duration::ZERO;
    for caps in part.captures_iter(s) {
        let value: f64 = caps[1].parse().map_err(|_| invalid())?;
        let unit_nanos = match &caps[2] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            _ => 3600e9,
        };
        let nanos = (value * unit_nanos).round();
        if nanos >= u64::MAX as f64 {
            return Err(invalid());
        }
        let part = Duration::from_nanos(nanos as u64);
        total = total.checked_add(part).ok_or_else(invalid)?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("3h").unwrap(), Duration::from_secs(10_800));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("3").is_err());
        assert!(parse_duration("3 hours").is_err());
        assert!(parse_duration("-5m").is_err());
    }

    #[test]
    fn test_since_and_since_time_are_exclusive() {
        let err = parse_since(Some("1h"), Some("2024-12-27T15:04:05Z")).unwrap_err();
        assert!(matches!(err, AggregateError::Usage(_)));
    }

    #[test]
    fn test_since_time_parsed() {
        let since = parse_since(None, Some("2024-12-27T15:04:05Z")).unwrap();
        assert_eq!(
            since,
            Some(LogSince::Time(Utc.with_ymd_and_hms(2024, 12, 27, 15, 4, 5).unwrap()))
        );
    }

    #[test]
    fn test_invalid_since_time() {
        let err = parse_since(None, Some("27/12/2024")).unwrap_err();
        assert!(err.to_string().contains("Invalid --since-time"));
    }

    #[test]
    fn test_zero_since_means_all_logs() {
        assert_eq!(parse_since(Some("0s"), None).unwrap(), None);
        assert_eq!(parse_since(None, None).unwrap(), None);
    }

    #[test]
    fn test_request_from_flags() {
        let request =
            AggregateRequest::from_flags(true, Some("10m"), None, vec!["service-0".to_string()]).unwrap();
        assert!(request.follow);
        assert_eq!(request.since, Some(LogSince::Ago(Duration::from_secs(600))));
        assert_eq!(request.sources, vec!["service-0"]);
    }
}
