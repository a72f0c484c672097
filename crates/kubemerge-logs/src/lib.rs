//! Log aggregation for kubemerge
//!
//! This crate parses timestamped log lines, reads many sources concurrently
//! and merges them into one time-ordered stream: strictly ordered for output
//! that already exists, ordered within a bounded delay window for output that
//! is still being produced.

mod aggregator;
mod error;
mod filter;
mod frontier;
mod historical;
mod live;
mod parser;
mod prefix;
mod reader;
mod request;
mod source;
mod stream;

pub use aggregator::{AggregateSummary, Aggregator, AggregatorConfig};
pub use error::{AggregateError, SourceError};
pub use filter::CompiledFilter;
pub use historical::HistoricalMerge;
pub use live::{DEFAULT_DELAY_WINDOW, DEFAULT_TICK, LiveMerge, LiveMergeConfig};
pub use parser::{LogParser, ParseError};
pub use prefix::{aligned_prefixes, right_pad};
pub use reader::{DEFAULT_QUEUE_CAPACITY, Drained, ReadMode, ReaderExit, ReaderReport, SourceReader};
pub use request::{AggregateRequest, parse_duration, parse_since};
pub use source::{LineStream, LogSource, MemorySource};
pub use stream::PodLogSource;

// Re-export types used in our public API
pub use kubemerge_types::{LogEntry, LogSince, SourceInfo};
