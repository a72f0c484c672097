use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use kubemerge_types::{LogEntry, SourceInfo};

use crate::error::AggregateError;
use crate::historical::HistoricalMerge;
use crate::live::{LiveMerge, LiveMergeConfig};
use crate::prefix::aligned_prefixes;
use crate::reader::{DEFAULT_QUEUE_CAPACITY, ReadMode, ReaderReport, SourceReader};
use crate::request::AggregateRequest;
use crate::source::LogSource;

/// Tunables for one aggregation run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Entries buffered per source before its reader waits
    pub queue_capacity: usize,
    pub live: LiveMergeConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            live: LiveMergeConfig::default(),
        }
    }
}

/// What a run emitted and how each reader ended
#[derive(Clone, Debug)]
pub struct AggregateSummary {
    /// Upper bound of the historical phase and start of the live phase
    pub cutover: DateTime<Utc>,
    pub historical_emitted: u64,
    pub live_emitted: u64,
    pub historical_reports: Vec<ReaderReport>,
    pub live_reports: Vec<ReaderReport>,
}

impl AggregateSummary {
    pub fn total_emitted(&self) -> u64 {
        self.historical_emitted + self.live_emitted
    }

    /// Malformed lines skipped across both phases
    pub fn malformed(&self) -> u64 {
        self.historical_reports
            .iter()
            .chain(&self.live_reports)
            .map(|r| r.malformed)
            .sum()
    }
}

/// Merges many log sources into one time-ordered stream
///
/// Output before the cutover instant is strictly ordered; output after it
/// (when following) is ordered within the configured delay window. The
/// cutover is the exclusive end of the historical read and the inclusive
/// start of the live read, so no entry is emitted twice or skipped at the seam.
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Aggregate using the current time as the cutover
    pub async fn run<F>(
        &self,
        sources: Vec<Arc<dyn LogSource>>,
        request: &AggregateRequest,
        on_entry: F,
        cancel: &CancellationToken,
    ) -> Result<AggregateSummary, AggregateError>
    where
        F: FnMut(&str, &LogEntry),
    {
        self.run_at(Utc::now(), sources, request, on_entry, cancel).await
    }

    /// Aggregate with an explicit cutover instant
    pub async fn run_at<F>(
        &self,
        cutover: DateTime<Utc>,
        sources: Vec<Arc<dyn LogSource>>,
        request: &AggregateRequest,
        mut on_entry: F,
        cancel: &CancellationToken,
    ) -> Result<AggregateSummary, AggregateError>
    where
        F: FnMut(&str, &LogEntry),
    {
        let sources = select_sources(sources, &request.sources)?;
        let ids: Vec<&str> = sources.iter().map(|s| s.id()).collect();
        let infos: Vec<SourceInfo> = ids
            .iter()
            .zip(aligned_prefixes(&ids))
            .map(|(id, prefix)| SourceInfo::with_prefix(*id, prefix))
            .collect();

        tracing::debug!("Use cutoff time: {}", cutover);
        tracing::debug!("Aggregating {} sources: {}", ids.len(), ids.join(", "));

        let mut summary = AggregateSummary {
            cutover,
            historical_emitted: 0,
            live_emitted: 0,
            historical_reports: Vec::new(),
            live_reports: Vec::new(),
        };

        let historical_cancel = cancel.child_token();
        let mut readers = self.spawn_readers(
            &sources,
            &infos,
            ReadMode::Historical {
                since: request.since,
                cutoff: cutover,
            },
            &historical_cancel,
        );
        summary.historical_emitted = HistoricalMerge::merge(&mut readers, &mut on_entry).await;
        summary.historical_reports = finish_all(readers).await;

        if !request.follow || cancel.is_cancelled() {
            return Ok(summary);
        }

        tracing::debug!("Switch from historical to realtime logs");

        let live_cancel = cancel.child_token();
        let mut readers = self.spawn_readers(&sources, &infos, ReadMode::Live { from: cutover }, &live_cancel);
        let live = LiveMerge::new(self.config.live);
        summary.live_emitted = live.merge(&mut readers, &mut on_entry, &live_cancel).await;

        // Stop readers still streaming when every other source has ended
        live_cancel.cancel();
        summary.live_reports = finish_all(readers).await;

        Ok(summary)
    }

    fn spawn_readers(
        &self,
        sources: &[Arc<dyn LogSource>],
        infos: &[SourceInfo],
        mode: ReadMode,
        cancel: &CancellationToken,
    ) -> Vec<SourceReader> {
        sources
            .iter()
            .zip(infos)
            .map(|(source, info)| {
                SourceReader::spawn(
                    Arc::clone(source),
                    info.clone(),
                    mode,
                    self.config.queue_capacity,
                    cancel.child_token(),
                )
            })
            .collect()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

/// Apply the caller's source filter
fn select_sources(
    sources: Vec<Arc<dyn LogSource>>,
    only: &[String],
) -> Result<Vec<Arc<dyn LogSource>>, AggregateError> {
    if sources.is_empty() {
        return Err(AggregateError::NoSources);
    }
    if only.is_empty() {
        return Ok(sources);
    }

    let selected: Vec<_> = sources
        .into_iter()
        .filter(|s| only.iter().any(|name| name == s.id()))
        .collect();

    if selected.is_empty() {
        return Err(AggregateError::NoMatchingSources(format!("'{}'", only.join("', '"))));
    }

    Ok(selected)
}

async fn finish_all(readers: Vec<SourceReader>) -> Vec<ReaderReport> {
    futures::future::join_all(readers.into_iter().map(SourceReader::finish)).await
}
