use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::address::Address;
use crate::library::Book;

/// Default entry count above which the cache resets itself.
pub const DEFAULT_THRESHOLD: usize = 10_000;

/// Default number of lock shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Address → Book memo shared by every search worker.
///
/// Read-check-create-store runs under the write lock of the address's shard,
/// so two workers asking for the same address never both synthesize it and
/// never see a half-built book. Workers on addresses in different shards do
/// not contend.
///
/// Once the entry count exceeds the threshold the whole cache is cleared.
/// Callers must treat a miss after a reset as normal: the cache only saves
/// work, it is never the source of truth.
pub struct ContentCache {
    entries:   DashMap<Address, Arc<Book>>,
    threshold: Option<usize>,
    len:       AtomicUsize,
    hits:      AtomicU64,
    misses:    AtomicU64,
    resets:    AtomicU64,
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits:    u64,
    pub misses:  u64,
    pub resets:  u64,
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(Some(DEFAULT_THRESHOLD))
    }
}

impl ContentCache {
    /// `threshold: None` disables the size bound.
    pub fn new(threshold: Option<usize>) -> Self {
        Self::with_shards(threshold, DEFAULT_SHARDS)
    }

    /// `shards` is rounded up to a power of two, minimum 2.
    pub fn with_shards(threshold: Option<usize>, shards: usize) -> Self {
        Self {
            entries: DashMap::with_shard_amount(shards.max(2).next_power_of_two()),
            threshold,
            len:     AtomicUsize::new(0),
            hits:    AtomicU64::new(0),
            misses:  AtomicU64::new(0),
            resets:  AtomicU64::new(0),
        }
    }

    /// Return the book stored at `address`, building it with `factory` on a
    /// miss.
    ///
    /// `factory` runs while the shard lock is held. It must not call back
    /// into this cache.
    pub fn get_or_create<F>(&self, address: Address, factory: F) -> Arc<Book>
    where
        F: FnOnce(Address) -> Book,
    {
        let (book, created) = match self.entries.entry(address) {
            Entry::Occupied(e) => (Arc::clone(e.get()), false),
            Entry::Vacant(e) => {
                let book = Arc::new(factory(address));
                e.insert(Arc::clone(&book));
                (book, true)
            }
        };

        if created {
            self.misses.fetch_add(1, Ordering::Relaxed);
            let len = self.len.fetch_add(1, Ordering::AcqRel) + 1;
            if self.threshold.is_some_and(|t| len > t) {
                self.clear();
            }
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        book
    }

    /// Store `book` at `address` unless one is already there. Returns the
    /// stored book either way.
    pub fn insert(&self, address: Address, book: Book) -> Arc<Book> {
        self.get_or_create(address, |_| book)
    }

    /// Look up without creating.
    pub fn get(&self, address: &Address) -> Option<Arc<Book>> {
        self.entries.get(address).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    /// Approximate entry count. Exact when no insert races a reset.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn threshold(&self) -> Option<usize> {
        self.threshold
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
        let dropped = self.len.swap(0, Ordering::AcqRel);
        self.resets.fetch_add(1, Ordering::Relaxed);
        debug!(dropped, "content cache reset");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits:    self.hits.load(Ordering::Relaxed),
            misses:  self.misses.load(Ordering::Relaxed),
            resets:  self.resets.load(Ordering::Relaxed),
        }
    }
}
