use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Concurrent `short_id -> target_url` map in front of the link store.
///
/// Target URLs never change once stored, so entries only go stale when a
/// link is deleted. Every eviction bumps an epoch; a back-fill is accepted
/// only if no eviction happened since the caller read the epoch, which stops
/// a resolve that raced a delete from resurrecting the deleted link.
#[derive(Clone, Debug, Default)]
pub struct ResolveCache {
    inner: Arc<DashMap<String, String>>,
    epoch: Arc<AtomicU64>,
}

impl ResolveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read before fetching from the store; hand it to [`ResolveCache::backfill`].
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Cache `target_url` unless an eviction happened after `seen_epoch`.
    /// Returns whether the entry was stored.
    pub fn backfill(&self, short_id: &str, target_url: &str, seen_epoch: u64) -> bool {
        // The epoch is compared while holding the shard lock for `short_id`,
        // so an evict of the same key either bumps the epoch first or waits
        // for this insert and removes it.
        match self.inner.entry(short_id.to_owned()) {
            Entry::Occupied(_) => true,
            Entry::Vacant(slot) => {
                if self.epoch() != seen_epoch {
                    return false;
                }
                slot.insert(target_url.to_owned());
                true
            }
        }
    }

    pub fn get(&self, short_id: &str) -> Option<String> {
        self.inner.get(short_id).map(|v| v.clone())
    }

    pub fn evict(&self, short_id: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(short_id);
    }
}
