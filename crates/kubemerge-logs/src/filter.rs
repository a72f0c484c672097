use regex::Regex;

use kubemerge_types::LogEntry;

/// Compiled message filter applied to merged output
#[derive(Clone)]
pub struct CompiledFilter {
    /// Regex pattern (if any)
    regex: Option<Regex>,

    /// Original pattern string
    pattern: String,

    /// Whether to invert match
    invert: bool,

    /// Case sensitivity
    case_insensitive: bool,
}

impl CompiledFilter {
    /// Create a new filter from a pattern string
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, false)
    }

    /// Create a case-insensitive filter
    pub fn new_case_insensitive(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, true)
    }

    fn build(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let regex = if pattern.is_empty() {
            None
        } else if case_insensitive {
            Some(Regex::new(&format!("(?i){}", pattern))?)
        } else {
            Some(Regex::new(pattern)?)
        };

        Ok(Self {
            regex,
            pattern: pattern.to_string(),
            invert: false,
            case_insensitive,
        })
    }

    /// Invert the match
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// Check if a log entry matches this filter
    pub fn matches(&self, entry: &LogEntry) -> bool {
        let text_match = match &self.regex {
            Some(re) => re.is_match(&entry.message),
            None => true,
        };

        if self.invert { !text_match } else { text_match }
    }
}

impl std::fmt::Debug for CompiledFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFilter")
            .field("pattern", &self.pattern)
            .field("invert", &self.invert)
            .field("case_insensitive", &self.case_insensitive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(Utc::now(), message)
    }

    #[test]
    fn test_regex_filter() {
        let filter = CompiledFilter::new("error").unwrap();
        assert!(filter.matches(&entry("an error occurred")));
        assert!(!filter.matches(&entry("everything is fine")));
        assert!(!filter.matches(&entry("an ERROR occurred")));
    }

    #[test]
    fn test_case_insensitive_filter() {
        let filter = CompiledFilter::new_case_insensitive("error").unwrap();
        assert!(filter.matches(&entry("an ERROR occurred")));
        assert!(filter.matches(&entry("an error occurred")));
    }

    #[test]
    fn test_inverted_filter() {
        let filter = CompiledFilter::new("healthz").unwrap().inverted();
        assert!(!filter.matches(&entry("GET /healthz 200")));
        assert!(filter.matches(&entry("player joined")));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = CompiledFilter::new("").unwrap();
        assert!(filter.matches(&entry("anything")));
        assert!(filter.matches(&entry("")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(CompiledFilter::new("(unclosed").is_err());
    }
}
