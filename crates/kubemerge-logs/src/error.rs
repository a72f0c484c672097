use thiserror::Error;

/// Errors surfaced to the caller before or instead of aggregating
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Invalid or conflicting options, rejected before any source is opened
    #[error("{0}")]
    Usage(String),

    #[error("no log sources to aggregate")]
    NoSources,

    #[error("no log sources match {0}")]
    NoMatchingSources(String),
}

/// Failure to open or read one source's line stream
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}
