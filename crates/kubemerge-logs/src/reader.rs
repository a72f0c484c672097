use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kubemerge_types::{LogEntry, LogSince, SourceInfo};

use crate::parser::LogParser;
use crate::source::LogSource;

/// Number of entries buffered per source
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Which stream a reader opens and where it stops
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Existing output, stopping before the first entry at or after `cutoff`
    Historical {
        since: Option<LogSince>,
        cutoff: DateTime<Utc>,
    },
    /// Continuous output starting at `from` (inclusive)
    Live { from: DateTime<Utc> },
}

impl ReadMode {
    /// Exclusive upper bound of the entries this reader delivers
    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Historical { cutoff, .. } => Some(*cutoff),
            Self::Live { .. } => None,
        }
    }

    fn start(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Historical { .. } => None,
            Self::Live { from } => Some(*from),
        }
    }
}

/// Why a reader stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderExit {
    Exhausted,
    CutoffReached,
    StreamError,
    OpenFailed,
    Cancelled,
    /// The merge side dropped the queue
    ConsumerGone,
    /// The reader task panicked or was aborted
    Aborted,
}

/// Outcome of one reader task
#[derive(Clone, Debug)]
pub struct ReaderReport {
    pub source_id: String,
    pub enqueued: u64,
    pub malformed: u64,
    /// Live entries older than the start instant (the API only filters by whole seconds)
    pub skipped_before_start: u64,
    pub exit: ReaderExit,
}

impl ReaderReport {
    fn new(source_id: String) -> Self {
        Self {
            source_id,
            enqueued: 0,
            malformed: 0,
            skipped_before_start: 0,
            exit: ReaderExit::Exhausted,
        }
    }
}

/// Result of a non-blocking read from a reader's queue
#[derive(Debug, PartialEq)]
pub enum Drained {
    Entry(LogEntry),
    Empty,
    Closed,
}

/// Background producer for one source plus the receiving end of its queue
///
/// The queue closes exactly once, when the producer task finishes, whatever
/// the reason.
pub struct SourceReader {
    info: SourceInfo,
    queue: mpsc::Receiver<LogEntry>,
    task: JoinHandle<ReaderReport>,
}

impl SourceReader {
    /// Start reading `source` in the background; returns immediately
    pub fn spawn(
        source: Arc<dyn LogSource>,
        info: SourceInfo,
        mode: ReadMode,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, queue) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(read_source(source, info.id.clone(), mode, tx, cancel));

        Self { info, queue, task }
    }

    pub fn prefix(&self) -> &str {
        &self.info.display_prefix
    }

    /// Wait for the next entry; `None` once the queue is closed and empty
    pub async fn next(&mut self) -> Option<LogEntry> {
        self.queue.recv().await
    }

    /// Take the next entry if one is already queued
    pub fn try_next(&mut self) -> Drained {
        match self.queue.try_recv() {
            Ok(entry) => Drained::Entry(entry),
            Err(TryRecvError::Empty) => Drained::Empty,
            Err(TryRecvError::Disconnected) => Drained::Closed,
        }
    }

    /// Release the queue and wait for the producer task to stop
    pub async fn finish(self) -> ReaderReport {
        let Self { info, queue, task } = self;
        // Unblocks a producer waiting on a full queue
        drop(queue);

        match task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Log reader for {} did not finish cleanly: {}", info.id, e);
                let mut report = ReaderReport::new(info.id);
                report.exit = ReaderExit::Aborted;
                report
            }
        }
    }
}

/// Read, parse and enqueue the lines of one source until it ends or is cancelled
async fn read_source(
    source: Arc<dyn LogSource>,
    source_id: String,
    mode: ReadMode,
    tx: mpsc::Sender<LogEntry>,
    cancel: CancellationToken,
) -> ReaderReport {
    let mut report = ReaderReport::new(source_id);

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            report.exit = ReaderExit::Cancelled;
            return report;
        }
        opened = async {
            match mode {
                ReadMode::Historical { since, .. } => source.open_historical(since).await,
                ReadMode::Live { from } => source.open_live(from).await,
            }
        } => opened,
    };

    let mut lines = match opened {
        Ok(lines) => lines,
        Err(e) => {
            tracing::warn!("Failed to open log stream for {}: {}", report.source_id, e);
            report.exit = ReaderExit::OpenFailed;
            return report;
        }
    };

    let cutoff = mode.cutoff();
    let start = mode.start();

    report.exit = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break ReaderExit::Cancelled,
            next = lines.try_next() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break ReaderExit::Exhausted,
            Err(e) => {
                tracing::warn!("Error reading log stream for {}: {}", report.source_id, e);
                break ReaderExit::StreamError;
            }
        };

        let entry = match LogParser::parse(&line) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Malformed line from {}: '{}' ({})", report.source_id, line, e);
                report.malformed += 1;
                continue;
            }
        };

        // The boundary entry belongs to the live phase
        if cutoff.is_some_and(|cutoff| entry.timestamp >= cutoff) {
            break ReaderExit::CutoffReached;
        }

        if start.is_some_and(|start| entry.timestamp < start) {
            report.skipped_before_start += 1;
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break ReaderExit::Cancelled,
            sent = tx.send(entry) => {
                if sent.is_err() {
                    break ReaderExit::ConsumerGone;
                }
            }
        }
        report.enqueued += 1;
    };

    tracing::debug!(
        "Reader for {} stopped: {:?} ({} entries, {} malformed)",
        report.source_id,
        report.exit,
        report.enqueued,
        report.malformed
    );

    report
}
