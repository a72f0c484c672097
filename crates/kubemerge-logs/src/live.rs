use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use kubemerge_types::LogEntry;

use crate::frontier::Frontier;
use crate::reader::{Drained, SourceReader};

/// Interval between queue drains
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// How long an entry is held back waiting for earlier entries from other sources
pub const DEFAULT_DELAY_WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveMergeConfig {
    pub tick: Duration,
    pub delay_window: Duration,
}

impl Default for LiveMergeConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            delay_window: DEFAULT_DELAY_WINDOW,
        }
    }
}

/// Best-effort ordered merge over continuous readers
///
/// Every tick, all queued entries are moved into a shared heap without
/// waiting on any reader, and entries older than `now - delay_window` are
/// emitted in timestamp order. Entries that arrive more than `delay_window`
/// after their own timestamp can be emitted out of order. A silent reader
/// never holds back the others.
pub struct LiveMerge {
    config: LiveMergeConfig,
    window: TimeDelta,
}

impl LiveMerge {
    pub fn new(config: LiveMergeConfig) -> Self {
        let window = TimeDelta::from_std(config.delay_window).unwrap_or(TimeDelta::MAX);
        Self { config, window }
    }

    /// Run until `cancel` fires or every reader has closed its queue
    ///
    /// On exit, entries already received are emitted in timestamp order
    /// rather than discarded. Returns the number of emitted entries.
    pub async fn merge<F>(&self, readers: &mut [SourceReader], mut emit: F, cancel: &CancellationToken) -> u64
    where
        F: FnMut(&str, &LogEntry),
    {
        let mut frontier = Frontier::new();
        let mut open = vec![true; readers.len()];
        let mut emitted = 0;

        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            drain_queues(readers, &mut open, &mut frontier);

            if !open.contains(&true) {
                tracing::debug!("All live sources closed");
                break;
            }

            let deadline = Utc::now()
                .checked_sub_signed(self.window)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            emitted += flush(&mut frontier, readers, Some(deadline), &mut emit);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    drain_queues(readers, &mut open, &mut frontier);
                    tracing::debug!("Live merge cancelled with {} entries pending", frontier.len());
                    break;
                }
                _ = ticker.tick() => {}
            }
        }

        emitted + flush(&mut frontier, readers, None, &mut emit)
    }
}

/// Move every already-queued entry into the heap, marking closed readers
fn drain_queues(readers: &mut [SourceReader], open: &mut [bool], frontier: &mut Frontier) {
    for (ndx, reader) in readers.iter_mut().enumerate() {
        if !open[ndx] {
            continue;
        }

        loop {
            match reader.try_next() {
                Drained::Entry(entry) => frontier.push(ndx, entry),
                Drained::Empty => break,
                Drained::Closed => {
                    open[ndx] = false;
                    break;
                }
            }
        }
    }
}

/// Emit heap entries older than `deadline`, or all of them when `None`
fn flush<F>(
    frontier: &mut Frontier,
    readers: &[SourceReader],
    deadline: Option<DateTime<Utc>>,
    emit: &mut F,
) -> u64
where
    F: FnMut(&str, &LogEntry),
{
    let mut emitted = 0;
    while let Some(oldest) = frontier.peek_timestamp() {
        if deadline.is_some_and(|deadline| oldest >= deadline) {
            break;
        }
        if let Some((ndx, entry)) = frontier.pop() {
            emit(readers[ndx].prefix(), &entry);
            emitted += 1;
        }
    }
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{DEFAULT_QUEUE_CAPACITY, ReadMode};
    use crate::source::{LogSource, MemorySource};
    use chrono::SecondsFormat;
    use kubemerge_types::SourceInfo;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    fn line(ts: DateTime<Utc>, msg: &str) -> String {
        format!("{} {}", ts.to_rfc3339_opts(SecondsFormat::Nanos, true), msg)
    }

    /// Live readers fed by channels, plus the feeds
    fn live_readers(
        ids: &[&str],
        from: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> (Vec<SourceReader>, Vec<mpsc::UnboundedSender<String>>) {
        ids.iter()
            .map(|id| {
                let (source, feed) = MemorySource::new(*id, Vec::<String>::new()).with_live_feed();
                let info = SourceInfo::new(source.id().to_string());
                let reader = SourceReader::spawn(
                    Arc::new(source),
                    info,
                    ReadMode::Live { from },
                    DEFAULT_QUEUE_CAPACITY,
                    cancel.child_token(),
                );
                (reader, feed)
            })
            .unzip()
    }

    fn merge_with(tick_ms: u64, window_ms: u64) -> LiveMerge {
        LiveMerge::new(LiveMergeConfig {
            tick: Duration::from_millis(tick_ms),
            delay_window: Duration::from_millis(window_ms),
        })
    }

    #[tokio::test]
    async fn test_flushes_after_delay_window() {
        let cancel = CancellationToken::new();
        let t0 = Utc::now();
        let (mut readers, feeds) = live_readers(&["A", "B"], t0, &cancel);
        let merge = merge_with(50, 1000);
        let start = Instant::now();

        let mut emitted: Vec<(String, Instant)> = Vec::new();
        let run = merge.merge(
            &mut readers,
            |prefix, entry| emitted.push((format!("{}{}", prefix, entry.message), Instant::now())),
            &cancel,
        );

        let feeder = async {
            feeds[0].send(line(t0, "first")).unwrap();
            tokio::time::sleep(Duration::from_millis(1200)).await;
            feeds[1].send(line(Utc::now(), "second")).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        };

        let (count, ()) = tokio::join!(run, feeder);
        assert_eq!(count, 2);

        let (first, flushed_at) = &emitted[0];
        assert_eq!(first, "A:first");
        let latency = flushed_at.duration_since(start);
        // Held back for the window, released within a few ticks after it
        assert!(latency >= Duration::from_millis(900), "flushed too early: {:?}", latency);
        // Window plus two ticks
        assert!(latency <= Duration::from_millis(1100), "flushed too late: {:?}", latency);

        // B's entry was still inside its window and is drained on cancel
        assert_eq!(emitted[1].0, "B:second");
    }

    #[tokio::test]
    async fn test_silent_source_does_not_block_others() {
        let cancel = CancellationToken::new();
        let t0 = Utc::now();
        let (mut readers, feeds) = live_readers(&["quiet", "busy"], t0, &cancel);
        let merge = merge_with(20, 100);
        let start = Instant::now();

        let mut emitted: Vec<Duration> = Vec::new();
        let run = merge.merge(&mut readers, |_, _| emitted.push(start.elapsed()), &cancel);

        let feeder = async {
            // Timestamped at the start instant; due once the 100ms window passes
            feeds[1].send(line(t0, "one")).unwrap();
            feeds[1].send(line(t0, "two")).unwrap();
            tokio::time::sleep(Duration::from_millis(400)).await;
            cancel.cancel();
            // Keep the quiet feed open for the whole run
            drop(feeds);
        };

        tokio::join!(run, feeder);

        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|at| *at < Duration::from_millis(100 + 5 * 20)));
    }

    #[tokio::test]
    async fn test_late_arrival_within_window_is_reordered() {
        let cancel = CancellationToken::new();
        let t0 = Utc::now() - TimeDelta::seconds(1);
        let (mut readers, feeds) = live_readers(&["A", "B"], t0, &cancel);
        let merge = merge_with(10, 200);

        let mut order: Vec<String> = Vec::new();
        let run = merge.merge(&mut readers, |prefix, e| order.push(format!("{}{}", prefix, e.message)), &cancel);

        let feeder = async {
            // B arrives first, A arrives 50ms later carrying an earlier timestamp
            let now = Utc::now();
            feeds[1].send(line(now, "later")).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            feeds[0].send(line(now - TimeDelta::milliseconds(300), "earlier")).unwrap();
            tokio::time::sleep(Duration::from_millis(400)).await;
            cancel.cancel();
        };

        tokio::join!(run, feeder);
        assert_eq!(order, vec!["A:earlier", "B:later"]);
    }

    #[tokio::test]
    async fn test_out_of_order_arrivals_stay_ordered_across_rounds() {
        let cancel = CancellationToken::new();
        let t0 = Utc::now() - TimeDelta::seconds(1);
        let (mut readers, feeds) = live_readers(&["A", "B"], t0, &cancel);
        let merge = merge_with(10, 100);

        let mut order: Vec<String> = Vec::new();
        let run = merge.merge(&mut readers, |_, e| order.push(e.message.clone()), &cancel);

        let feeder = async {
            for i in 0..3 {
                // B's later entry is queued before A's earlier one
                let now = Utc::now();
                feeds[1].send(line(now, &format!("b{}", i))).unwrap();
                feeds[0].send(line(now - TimeDelta::milliseconds(30), &format!("a{}", i))).unwrap();
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
            cancel.cancel();
        };

        tokio::join!(run, feeder);
        assert_eq!(order, vec!["a0", "b0", "a1", "b1", "a2", "b2"]);
    }

    #[tokio::test]
    async fn test_returns_when_all_sources_close() {
        let cancel = CancellationToken::new();
        let t0 = Utc::now();
        let (mut readers, feeds) = live_readers(&["A", "B"], t0, &cancel);
        let merge = merge_with(10, 60_000);

        feeds[0].send(line(t0 + TimeDelta::milliseconds(5), "a")).unwrap();
        feeds[1].send(line(t0, "b")).unwrap();
        drop(feeds);

        let mut order: Vec<String> = Vec::new();
        let count = tokio::time::timeout(
            Duration::from_secs(2),
            merge.merge(&mut readers, |_, e| order.push(e.message.clone()), &cancel),
        )
        .await
        .expect("merge should end once every source closed");

        // Still within the window, but nothing earlier can arrive any more
        assert_eq!(count, 2);
        assert_eq!(order, vec!["b", "a"]);
    }
}
