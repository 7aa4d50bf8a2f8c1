use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::BabelError;

/// Position of one book in the library: `(room, shelf, book)`.
///
/// Ordering is lexicographic over the three coordinates, which is also the
/// row-major order the search engine walks a partition in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    pub room:  u64,
    pub shelf: u64,
    pub book:  u64,
}

impl Address {
    pub const ORIGIN: Address = Address { room: 0, shelf: 0, book: 0 };

    pub fn new(room: u64, shelf: u64, book: u64) -> Self {
        Self { room, shelf, book }
    }

    /// Advance by one book, carrying book → shelf → room like an odometer.
    ///
    /// Returns `true` when the outermost coordinate overflowed and the
    /// address wrapped back to [`Address::ORIGIN`].
    pub fn advance(&mut self, bounds: &Bounds) -> bool {
        self.book += 1;
        if self.book < bounds.books {
            return false;
        }
        self.book = 0;
        self.shelf += 1;
        if self.shelf < bounds.shelves {
            return false;
        }
        self.shelf = 0;
        self.room += 1;
        if self.room < bounds.rooms {
            return false;
        }
        self.room = 0;
        true
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room {}, shelf {}, book {}", self.room, self.shelf, self.book)
    }
}

/// Exclusive upper bound of each coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub rooms:   u64,
    pub shelves: u64,
    pub books:   u64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self { rooms: 4, shelves: 8, books: 32 }
    }
}

impl Bounds {
    pub fn new(rooms: u64, shelves: u64, books: u64) -> Self {
        Self { rooms, shelves, books }
    }

    /// Number of addresses in the space, `None` if the product overflows.
    pub fn size(&self) -> Option<u64> {
        self.rooms.checked_mul(self.shelves)?.checked_mul(self.books)
    }

    pub fn contains(&self, address: &Address) -> bool {
        address.room < self.rooms && address.shelf < self.shelves && address.book < self.books
    }
}

// ---------------------------------------------------------------------------
// AddressSpace
// ---------------------------------------------------------------------------

/// The configured coordinate system.
///
/// Every address maps to a linear index `(room * shelves + shelf) * books + book`,
/// so partitions can be expressed as plain index ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    bounds: Bounds,
    len:    u64,
}

impl AddressSpace {
    /// Build a space from its bounds.
    ///
    /// # Errors
    ///
    /// [`BabelError::EmptyAddressSpace`] if any bound is zero,
    /// [`BabelError::InvalidLayout`] if the size does not fit in a `u64`.
    pub fn new(bounds: Bounds) -> Result<Self, BabelError> {
        let len = bounds
            .size()
            .ok_or_else(|| BabelError::InvalidLayout("address space size overflows u64".into()))?;
        if len == 0 {
            return Err(BabelError::EmptyAddressSpace);
        }
        Ok(Self { bounds, len })
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Total number of addresses.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Always `false`: construction rejects empty spaces.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.bounds.contains(address)
    }

    pub fn address_at(&self, index: u64) -> Option<Address> {
        if index >= self.len {
            return None;
        }
        let per_room = self.bounds.shelves * self.bounds.books;
        Some(Address {
            room:  index / per_room,
            shelf: (index % per_room) / self.bounds.books,
            book:  index % self.bounds.books,
        })
    }

    pub fn index_of(&self, address: &Address) -> Option<u64> {
        if !self.contains(address) {
            return None;
        }
        Some((address.room * self.bounds.shelves + address.shelf) * self.bounds.books + address.book)
    }

    /// Split the whole space into `workers` partitions.
    pub fn partition(&self, workers: usize) -> Vec<Partition> {
        self.split(0..self.len, workers)
    }

    /// Split `range` (clamped to the space) into `workers` contiguous,
    /// disjoint partitions whose sizes differ by at most one.
    ///
    /// When `workers` exceeds the number of addresses the trailing
    /// partitions are empty. `workers == 0` yields no partitions.
    pub fn split(&self, range: Range<u64>, workers: usize) -> Vec<Partition> {
        if workers == 0 {
            return Vec::new();
        }
        let start = range.start.min(self.len);
        let end = range.end.clamp(start, self.len);
        let total = end - start;
        let n = workers as u64;
        let (base, extra) = (total / n, total % n);

        let mut cursor = start;
        (0..workers)
            .map(|id| {
                let size = base + u64::from((id as u64) < extra);
                let part = Partition { id, start: cursor, end: cursor + size };
                cursor += size;
                part
            })
            .collect()
    }

    /// Iterate the addresses of `partition` in row-major order.
    pub fn addresses(&self, partition: &Partition) -> Addresses {
        Addresses {
            next:      self.address_at(partition.start).unwrap_or(Address::ORIGIN),
            remaining: partition.end.min(self.len).saturating_sub(partition.start),
            bounds:    self.bounds,
        }
    }
}

// ---------------------------------------------------------------------------
// Partition
// ---------------------------------------------------------------------------

/// A contiguous run of linear indices `[start, end)` owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub id:    usize,
    pub start: u64,
    pub end:   u64,
}

impl Partition {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Row-major walk over one partition, produced by [`AddressSpace::addresses`].
pub struct Addresses {
    next:      Address,
    remaining: u64,
    bounds:    Bounds,
}

impl Iterator for Addresses {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next;
        self.next.advance(&self.bounds);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}
