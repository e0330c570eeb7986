use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Sliding window of request timestamps for a single (api, client_ip) pair.
/// Mirrors the shape used by the fleet's per-IP behavioral tracker: a plain
/// `Vec` of timestamps with an explicit prune step, rather than a ring
/// buffer — windows here are small and short-lived enough that a `Vec`
/// shift is cheaper than the bookkeeping a ring buffer would add.
#[derive(Debug, Clone, Default)]
pub struct Window {
    timestamps: Vec<DateTime<Utc>>,
}

impl Window {
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.timestamps.push(at);
    }

    pub fn prune(&mut self, cutoff: DateTime<Utc>) {
        self.timestamps.retain(|ts| *ts >= cutoff);
    }

    pub fn count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Sharded map of sliding windows keyed by `(api_id, client_ip)`. Backed by
/// `DashMap` so concurrent ingest requests across different keys never
/// contend on a single lock.
#[derive(Clone)]
pub struct WindowStore {
    windows: Arc<DashMap<(i64, IpAddr), Window>>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
        }
    }

    /// Records `at` for the given key and returns the number of events still
    /// inside `window_seconds` after pruning anything older.
    pub fn record_and_count(
        &self,
        api_id: i64,
        client_ip: IpAddr,
        at: DateTime<Utc>,
        window_seconds: i64,
    ) -> usize {
        let cutoff = at - chrono::Duration::seconds(window_seconds);
        let mut entry = self.windows.entry((api_id, client_ip)).or_default();
        entry.record(at);
        entry.prune(cutoff);
        entry.count()
    }

    /// Background sweep: prunes every window against `now` and drops empty
    /// entries, bounding memory for keys that have gone quiet.
    pub fn sweep(&self, now: DateTime<Utc>, window_seconds: i64) {
        let cutoff = now - chrono::Duration::seconds(window_seconds * 2);
        self.windows.retain(|_, window| {
            window.prune(cutoff);
            !window.is_empty()
        });
        debug!(remaining = self.windows.len(), "swept sliding window store");
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ip() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn counts_events_within_window() {
        let store = WindowStore::new();
        let base = Utc::now();
        for i in 0..5 {
            store.record_and_count(1, ip(), base + Duration::milliseconds(i), 60);
        }
        let count = store.record_and_count(1, ip(), base + Duration::seconds(1), 60);
        assert_eq!(count, 6);
    }

    #[test]
    fn prunes_events_outside_window() {
        let store = WindowStore::new();
        let base = Utc::now();
        store.record_and_count(1, ip(), base, 1);
        let count = store.record_and_count(1, ip(), base + Duration::seconds(5), 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn sweep_removes_stale_empty_windows() {
        let store = WindowStore::new();
        let base = Utc::now();
        store.record_and_count(1, ip(), base, 60);
        assert_eq!(store.len(), 1);

        store.sweep(base + Duration::seconds(600), 60);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let store = WindowStore::new();
        let base = Utc::now();
        store.record_and_count(1, ip(), base, 60);
        let count = store.record_and_count(2, ip(), base, 60);
        assert_eq!(count, 1);
    }
}
