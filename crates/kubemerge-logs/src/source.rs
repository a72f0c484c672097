use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use kubemerge_types::LogSince;

use crate::error::SourceError;
use crate::parser::LogParser;

/// Raw lines of one source, in the order the source produced them
pub type LineStream = BoxStream<'static, Result<String, SourceError>>;

/// Capability to open the line streams of one log source
///
/// Dropping a returned stream must release the underlying connection.
pub trait LogSource: Send + Sync {
    /// Stable identifier, also used for the display prefix and source filter
    fn id(&self) -> &str;

    /// Lines produced so far, optionally starting at `since`; the stream ends
    /// once the existing output has been delivered
    fn open_historical(&self, since: Option<LogSince>) -> BoxFuture<'_, Result<LineStream, SourceError>>;

    /// Lines with timestamps at or after `from`, continuing as new lines are
    /// produced
    fn open_live(&self, from: DateTime<Utc>) -> BoxFuture<'_, Result<LineStream, SourceError>>;
}

/// In-memory source with scripted lines and an optional live feed
pub struct MemorySource {
    id: String,
    lines: Vec<String>,
    live_feed: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    fail_open: bool,
}

impl MemorySource {
    pub fn new<I, S>(id: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            lines: lines.into_iter().map(Into::into).collect(),
            live_feed: Mutex::new(None),
            fail_open: false,
        }
    }

    /// Source whose streams can never be opened
    pub fn failing(id: impl Into<String>) -> Self {
        let mut source = Self::new(id, Vec::<String>::new());
        source.fail_open = true;
        source
    }

    /// Attach a feed whose lines are appended to the first live stream
    ///
    /// The live stream stays open until the returned sender is dropped.
    pub fn with_live_feed(self) -> (Self, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.live_feed.lock() = Some(rx);
        (self, tx)
    }

    fn check_open(&self) -> Result<(), SourceError> {
        if self.fail_open {
            return Err(SourceError::Unavailable(format!("{} refused the stream", self.id)));
        }
        Ok(())
    }
}

impl LogSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn open_historical(&self, since: Option<LogSince>) -> BoxFuture<'_, Result<LineStream, SourceError>> {
        let result = self.check_open().map(|()| {
            let lower = since.map(|s| s.lower_bound(Utc::now()));
            let lines: Vec<_> = self
                .lines
                .iter()
                .filter(|line| match (lower, LogParser::timestamp_of(line)) {
                    (Some(lower), Some(ts)) => ts >= lower,
                    // Unparsable lines pass through for the reader to reject
                    _ => true,
                })
                .cloned()
                .map(Ok)
                .collect();
            stream::iter(lines).boxed()
        });
        futures::future::ready(result).boxed()
    }

    fn open_live(&self, from: DateTime<Utc>) -> BoxFuture<'_, Result<LineStream, SourceError>> {
        let result = self.check_open().map(|()| {
            let replay: Vec<_> = self
                .lines
                .iter()
                .filter(|line| LogParser::timestamp_of(line).is_some_and(|ts| ts >= from))
                .cloned()
                .map(Ok)
                .collect();
            let replay = stream::iter(replay);

            match self.live_feed.lock().take() {
                Some(rx) => {
                    let feed = stream::unfold(rx, |mut rx| async move {
                        rx.recv().await.map(|line| (Ok(line), rx))
                    });
                    replay.chain(feed).boxed()
                }
                None => replay.boxed(),
            }
        });
        futures::future::ready(result).boxed()
    }
}
