use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::address::Partition;
use crate::error::BabelError;
use crate::library::Library;
use crate::results::{Hit, Results, ScanStats, SearchResult, StopReason};
use crate::traits::Matcher;

/// Progress callback: fraction of the searched range inspected so far.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

// ---------------------------------------------------------------------------
// MatchPolicy
// ---------------------------------------------------------------------------

/// Which recorded hit becomes the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// The first worker to record a hit wins; later hits are discarded.
    ///
    /// Which partition gets there first is a race, so repeated runs may
    /// report different addresses when the target occurs more than once.
    /// With `cancel` set, every worker stops at its next poll point once a
    /// hit is recorded; without it, the others finish their partitions.
    FirstWins { cancel: bool },

    /// The lexicographically smallest matching address wins. Workers stop
    /// once every address left to them is above the best hit so far.
    Lowest,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::FirstWins { cancel: true }
    }
}

// ---------------------------------------------------------------------------
// Engine options
// ---------------------------------------------------------------------------

/// Internal options passed from the builder to `run()`.
pub(crate) struct EngineOptions {
    pub library:    Arc<Library>,
    pub matcher:    Arc<dyn Matcher>,
    pub workers:    usize,
    pub range:      Range<u64>,
    pub policy:     MatchPolicy,
    pub progress:   Option<ProgressFn>,
    pub deadline:   Option<Duration>,
    pub poll_every: u64,
    pub stop:       Option<Arc<AtomicBool>>,
}

/// Result slot and counters shared by every worker of one search.
struct Shared {
    slot:      Mutex<Option<(u64, Hit)>>,
    found:     AtomicBool,
    best:      AtomicU64,
    processed: AtomicU64,
    pages:     AtomicU64,
    stopped:   Mutex<Option<StopReason>>,
    abort:     AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            slot:      Mutex::new(None),
            found:     AtomicBool::new(false),
            best:      AtomicU64::new(u64::MAX),
            processed: AtomicU64::new(0),
            pages:     AtomicU64::new(0),
            stopped:   Mutex::new(None),
            abort:     AtomicBool::new(false),
        }
    }

    /// Offer a hit at linear index `index`. Returns whether it was kept.
    fn record(&self, index: u64, hit: Hit, policy: MatchPolicy) -> bool {
        let mut slot = self.slot.lock();
        let keep = match policy {
            MatchPolicy::FirstWins { .. } => slot.is_none(),
            MatchPolicy::Lowest => slot.as_ref().map_or(true, |(best, _)| index < *best),
        };
        if keep {
            *slot = Some((index, hit));
            self.best.fetch_min(index, Ordering::AcqRel);
            self.found.store(true, Ordering::Release);
        }
        keep
    }

    fn interrupt(&self, reason: StopReason) {
        self.stopped.lock().get_or_insert(reason);
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker<'a> {
    opts:     &'a EngineOptions,
    shared:   &'a Shared,
    total:    u64,
    deadline: Option<Instant>,
}

impl Worker<'_> {
    /// Inspect `partition` in row-major order until it is exhausted, a hit
    /// is found in it, or a poll point says stop.
    fn run(&self, partition: Partition) -> Result<(), BabelError> {
        let library = &self.opts.library;
        let mut inspected = 0u64;

        for (offset, address) in (0u64..).zip(library.space().addresses(&partition)) {
            let index = partition.start + offset;
            if offset % self.opts.poll_every == 0 && self.should_stop(index) {
                break;
            }

            let book = library.get_content(address)?;
            let mut tested = 0u64;
            let hit = book.pages().iter().enumerate().find(|(_, page)| {
                tested += 1;
                self.opts.matcher.is_match(page.text())
            });
            self.shared.pages.fetch_add(tested, Ordering::Relaxed);
            inspected += 1;

            let done = self.shared.processed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(progress) = &self.opts.progress {
                progress(done as f64 / self.total as f64);
            }

            if let Some((page_index, page)) = hit {
                let hit = Hit {
                    address,
                    page_index,
                    content: page.text().to_owned(),
                };
                if self.shared.record(index, hit, self.opts.policy) {
                    debug!(worker = partition.id, %address, page_index, "hit recorded");
                }
                break;
            }
        }

        debug!(worker = partition.id, inspected, "worker finished");
        Ok(())
    }

    fn should_stop(&self, index: u64) -> bool {
        if self.shared.abort.load(Ordering::Acquire) {
            return true;
        }
        if self.opts.stop.as_ref().is_some_and(|s| s.load(Ordering::Acquire)) {
            self.shared.interrupt(StopReason::Cancelled);
            return true;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            self.shared.interrupt(StopReason::Deadline);
            return true;
        }
        match self.opts.policy {
            MatchPolicy::FirstWins { cancel } => cancel && self.shared.found.load(Ordering::Acquire),
            MatchPolicy::Lowest => self.shared.best.load(Ordering::Acquire) < index,
        }
    }
}

// ---------------------------------------------------------------------------
// run()
// ---------------------------------------------------------------------------

/// Split the range, run one worker per non-empty partition and collect the
/// winning hit.
///
/// This is the core engine: all parallelism lives here.
/// Called by `SearchBuilder::run()` after validating inputs.
pub(crate) fn run(opts: EngineOptions) -> Result<Results, BabelError> {
    let library = Arc::clone(&opts.library);
    let partitions: Vec<Partition> = library
        .space()
        .split(opts.range.clone(), opts.workers)
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    let total: u64 = partitions.iter().map(Partition::len).sum();

    let start = Instant::now();
    if total == 0 {
        info!("search range is empty");
        return Ok(Results {
            result: SearchResult::NotFound,
            stats:  ScanStats::default(),
        });
    }

    let resets_before = library.cache().stats().resets;
    info!(
        workers = partitions.len(),
        addresses = total,
        policy = ?opts.policy,
        "search started"
    );

    let shared = Shared::new();
    let worker = Worker {
        opts: &opts,
        shared: &shared,
        total,
        deadline: opts.deadline.map(|d| start + d),
    };

    thread::scope(|scope| -> Result<(), BabelError> {
        let mut handles = Vec::with_capacity(partitions.len());
        for &partition in &partitions {
            debug!(
                worker = partition.id,
                start = partition.start,
                end = partition.end,
                "partition assigned"
            );
            let worker = &worker;
            let spawned = thread::Builder::new()
                .name(format!("babel-worker-{}", partition.id))
                .spawn_scoped(scope, move || worker.run(partition));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.abort.store(true, Ordering::Release);
                    return Err(BabelError::Worker(format!(
                        "failed to spawn worker {}: {e}",
                        partition.id
                    )));
                }
            }
        }

        let mut failure = None;
        for handle in handles {
            let outcome = handle
                .join()
                .unwrap_or_else(|_| Err(BabelError::Worker("worker panicked".into())));
            if let Err(e) = outcome {
                shared.abort.store(true, Ordering::Release);
                failure.get_or_insert(e);
            }
        }
        failure.map_or(Ok(()), Err)
    })?;

    let duration = start.elapsed();
    let result = match shared.slot.into_inner() {
        Some((_, hit)) => SearchResult::Found(hit),
        None => SearchResult::NotFound,
    };
    let stats = ScanStats::compute(
        shared.processed.into_inner(),
        shared.pages.into_inner(),
        partitions.len(),
        library.cache().stats().resets - resets_before,
        shared.stopped.into_inner(),
        duration,
    );

    info!(
        found = result.is_found(),
        inspected = stats.inspected,
        elapsed_ms = duration.as_millis() as u64,
        "search finished"
    );

    Ok(Results { result, stats })
}
