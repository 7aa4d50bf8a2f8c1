use std::time::Duration;

use crate::address::Address;

/// Where a target was found.
///
/// For a [`Probe`](crate::Probe), `address` is the reporting odometer value
/// at the time of the hit and `page_index` is always `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub address:    Address,
    pub page_index: usize,
    /// Full text of the matching page.
    pub content:    String,
}

/// Outcome of a search. Running out of addresses or budget is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResult {
    Found(Hit),
    NotFound,
}

impl SearchResult {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn hit(&self) -> Option<&Hit> {
        match self {
            Self::Found(hit) => Some(hit),
            Self::NotFound => None,
        }
    }

    pub fn into_hit(self) -> Option<Hit> {
        match self {
            Self::Found(hit) => Some(hit),
            Self::NotFound => None,
        }
    }
}

/// Why a run ended before exhausting its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller's stop flag was raised.
    Cancelled,
    /// The deadline passed.
    Deadline,
    /// A probe used up its iteration budget.
    Budget,
}

/// The output of a completed search or probe.
#[derive(Debug, Clone)]
pub struct Results {
    pub result: SearchResult,
    pub stats:  ScanStats,
}

impl Results {
    pub fn is_found(&self) -> bool {
        self.result.is_found()
    }

    pub fn hit(&self) -> Option<&Hit> {
        self.result.hit()
    }
}

/// Performance statistics for a completed run.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    /// Addresses (search) or candidates (probe) inspected.
    pub inspected: u64,

    /// Pages tested against the matcher.
    pub pages: u64,

    /// Workers that were given a non-empty partition.
    pub workers: usize,

    /// Cache resets during a search, history resets during a probe.
    pub resets: u64,

    /// Set when the run was interrupted rather than finishing its work or
    /// finding a match.
    pub stopped: Option<StopReason>,

    /// Wall-clock time from start to completion.
    pub duration: Duration,

    /// Convenience field: `inspected / duration.as_secs_f64()`, `0` on
    /// zero-duration runs.
    pub per_sec: u64,
}

impl ScanStats {
    pub(crate) fn compute(
        inspected: u64,
        pages: u64,
        workers: usize,
        resets: u64,
        stopped: Option<StopReason>,
        duration: Duration,
    ) -> Self {
        let per_sec = if duration.as_secs_f64() > 0.0 {
            (inspected as f64 / duration.as_secs_f64()) as u64
        } else {
            0
        };
        Self { inspected, pages, workers, resets, stopped, duration, per_sec }
    }
}
