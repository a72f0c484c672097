use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use kubemerge_types::LogEntry;

/// Entry waiting in the merge heap
#[derive(Debug)]
struct Pending {
    entry: LogEntry,
    source: usize,
    seq: u64,
}

impl Pending {
    fn key(&self) -> (DateTime<Utc>, usize, u64) {
        (self.entry.timestamp, self.source, self.seq)
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Min-heap of not-yet-emitted entries keyed by timestamp
///
/// Equal timestamps pop by source index, then by insertion order, so the
/// merged output is deterministic and entries of one source keep their
/// relative order.
#[derive(Debug, Default)]
pub(crate) struct Frontier {
    heap: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
}

impl Frontier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, source: usize, entry: LogEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Pending { entry, source, seq }));
    }

    /// Timestamp of the earliest pending entry
    pub(crate) fn peek_timestamp(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse(p)| p.entry.timestamp)
    }

    /// Remove the earliest entry and the index of the source it came from
    pub(crate) fn pop(&mut self) -> Option<(usize, LogEntry)> {
        self.heap.pop().map(|Reverse(p)| (p.source, p.entry))
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32, msg: &str) -> LogEntry {
        LogEntry::new(Utc.with_ymd_and_hms(2024, 12, 27, 15, 0, secs).unwrap(), msg)
    }

    #[test]
    fn test_pops_in_timestamp_order() {
        let mut frontier = Frontier::new();
        frontier.push(0, at(5, "c"));
        frontier.push(1, at(1, "a"));
        frontier.push(2, at(3, "b"));

        assert_eq!(frontier.peek_timestamp(), Some(at(1, "").timestamp));
        let order: Vec<_> = std::iter::from_fn(|| frontier.pop())
            .map(|(_, e)| e.message)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(frontier.len(), 0);
    }

    #[test]
    fn test_ties_break_by_source_then_arrival() {
        let mut frontier = Frontier::new();
        frontier.push(2, at(1, "src2"));
        frontier.push(1, at(1, "src1-first"));
        frontier.push(1, at(1, "src1-second"));
        frontier.push(0, at(1, "src0"));
        assert_eq!(frontier.len(), 4);

        let order: Vec<_> = std::iter::from_fn(|| frontier.pop())
            .map(|(src, e)| (src, e.message))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "src0".to_string()),
                (1, "src1-first".to_string()),
                (1, "src1-second".to_string()),
                (2, "src2".to_string()),
            ]
        );
    }
}
