//! Per-decrypter usage counters.

use dashmap::DashMap;

/// Counters of one decrypter id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecrypterUsage {
    /// Invocations requested
    pub calls: u64,
    /// Invocations that produced a non-null result
    pub non_null_results: u64,
}

/// Usage counters keyed by decrypter id.
///
/// Counters only ever grow; they are diagnostics and never influence rewriting.
#[derive(Debug, Default)]
pub struct UsageStatistics {
    usage: DashMap<i32, DecrypterUsage>,
}

impl UsageStatistics {
    /// Creates empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one batch to decrypter `id`.
    pub fn record(&self, id: i32, calls: u64, non_null_results: u64) {
        let mut entry = self.usage.entry(id).or_default();
        entry.calls += calls;
        entry.non_null_results += non_null_results;
    }

    /// Counters of decrypter `id`; zero if it was never called.
    #[must_use]
    pub fn get(&self, id: i32) -> DecrypterUsage {
        self.usage.get(&id).map(|entry| *entry).unwrap_or_default()
    }

    /// All counters, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(i32, DecrypterUsage)> {
        let mut all: Vec<_> = self
            .usage
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        all.sort_unstable_by_key(|(id, _)| *id);
        all
    }

    /// Ids that were called but never produced a result, logged as warnings.
    ///
    /// Such decrypters are usually misregistered or fail inside the executor.
    pub fn report_unproductive(&self) -> Vec<i32> {
        self.snapshot()
            .into_iter()
            .filter(|(_, usage)| usage.calls > 0 && usage.non_null_results == 0)
            .map(|(id, usage)| {
                log::warn!(
                    "Decrypter {} was called {} times without a single result",
                    id,
                    usage.calls
                );
                id
            })
            .collect()
    }
}
