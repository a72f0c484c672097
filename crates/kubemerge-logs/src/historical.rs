use kubemerge_types::LogEntry;

use crate::frontier::Frontier;
use crate::reader::SourceReader;

/// Blocking K-way merge over readers that are bounded by a cutoff
pub struct HistoricalMerge;

impl HistoricalMerge {
    /// Emit every entry of every reader in non-decreasing timestamp order
    ///
    /// Waits on one specific reader at a time, so it relies on each reader
    /// eventually closing its queue (cutoff, exhaustion, error or
    /// cancellation). Equal timestamps are emitted in reader order. Returns the
    /// number of emitted entries.
    pub async fn merge<F>(readers: &mut [SourceReader], mut emit: F) -> u64
    where
        F: FnMut(&str, &LogEntry),
    {
        let mut frontier = Frontier::new();

        for (ndx, reader) in readers.iter_mut().enumerate() {
            if let Some(entry) = reader.next().await {
                frontier.push(ndx, entry);
            }
        }

        let mut emitted = 0;
        while let Some((ndx, entry)) = frontier.pop() {
            let reader = &mut readers[ndx];
            emit(reader.prefix(), &entry);
            emitted += 1;

            if let Some(next) = reader.next().await {
                frontier.push(ndx, next);
            }
        }

        emitted
    }
}
