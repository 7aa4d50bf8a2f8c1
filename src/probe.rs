//! Generate-and-test search without stable addressing.
//!
//! A [`Probe`] keeps synthesizing candidate passages until one contains the
//! target. There is no address space to exhaust, so a run ends only on a
//! match, on its [`Budget`], or when its stop flag is raised.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::address::{Address, Bounds};
use crate::builder::SubstringMatcher;
use crate::error::BabelError;
use crate::results::{Hit, Results, ScanStats, SearchResult, StopReason};
use crate::traits::{Matcher, SynthesisRequest, Synthesizer};

/// Candidates remembered before the history is cleared.
pub const DEFAULT_HISTORY_CAP: usize = 10_000;

/// Default candidate length range, in tokens.
pub const DEFAULT_LENGTHS: RangeInclusive<usize> = 5..=20;

/// Carry limits of the reporting odometer. Rooms never wrap in practice.
pub const ODOMETER: Bounds = Bounds { rooms: u64::MAX, shelves: 100, books: 1000 };

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// How long a probe may run. Required by [`Probe::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    candidates: Option<u64>,
    time:       Option<Duration>,
}

impl Budget {
    /// At most `n` candidates.
    pub fn iterations(n: u64) -> Self {
        Self { candidates: Some(n), time: None }
    }

    /// At most `d` of wall-clock time.
    pub fn time(d: Duration) -> Self {
        Self { candidates: None, time: Some(d) }
    }

    pub fn and_iterations(mut self, n: u64) -> Self {
        self.candidates = Some(n);
        self
    }

    pub fn and_time(mut self, d: Duration) -> Self {
        self.time = Some(d);
        self
    }

    /// No bound at all.
    ///
    /// **Potentially non-terminating**: the run ends only on a match or when
    /// the stop flag is raised. Use with [`Probe::spawn`] and
    /// [`ProbeHandle::stop`].
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.candidates.is_none() && self.time.is_none()
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Sequential generate-and-test loop over a [`Synthesizer`], usually a
/// [`ChainSynthesizer`](crate::ChainSynthesizer).
pub struct Probe {
    synthesizer: Arc<dyn Synthesizer>,
    lengths:     RangeInclusive<usize>,
    history_cap: usize,
    stop:        Arc<AtomicBool>,
    seed:        Option<u64>,
}

impl Probe {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            synthesizer,
            lengths:     DEFAULT_LENGTHS,
            history_cap: DEFAULT_HISTORY_CAP,
            stop:        Arc::new(AtomicBool::new(false)),
            seed:        None,
        }
    }

    /// Candidate length in tokens, drawn uniformly per candidate.
    pub fn lengths(mut self, lengths: RangeInclusive<usize>) -> Self {
        self.lengths = lengths;
        self
    }

    /// Number of remembered candidates before the history is cleared.
    pub fn history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }

    /// Share an external stop flag instead of the probe's own.
    pub fn stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = flag;
        self
    }

    /// Seed the candidate RNG for reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The flag that ends a running probe when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run on the calling thread until `target` is found (case-insensitive)
    /// or `budget` runs out.
    ///
    /// # Errors
    ///
    /// [`BabelError::EmptyTarget`] and [`BabelError::InvalidLengthRange`]
    /// before the first candidate is generated.
    pub fn run(&self, target: &str, budget: Budget) -> Result<Results, BabelError> {
        let matcher = SubstringMatcher::new(target)?;
        let (min, max) = (*self.lengths.start(), *self.lengths.end());
        if min == 0 || min > max {
            return Err(BabelError::InvalidLengthRange { min, max });
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let deadline = budget.time.map(|d| Instant::now() + d);
        let start = Instant::now();

        info!(pattern = target, unbounded = budget.is_unbounded(), "probe started");

        let mut odometer = Address::ORIGIN;
        let mut history: HashSet<String> = HashSet::new();
        let mut candidates = 0u64;
        let mut resets = 0u64;
        let mut result = SearchResult::NotFound;

        let stopped = loop {
            if self.stop.load(Ordering::Acquire) {
                break Some(StopReason::Cancelled);
            }
            if budget.candidates.is_some_and(|n| candidates >= n) {
                break Some(StopReason::Budget);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Some(StopReason::Deadline);
            }

            let length = rng.gen_range(min..=max);
            let tokens = self.synthesizer.synthesize(&SynthesisRequest::new(length), &mut rng);
            let candidate = tokens.join(self.synthesizer.separator());
            candidates += 1;
            odometer.advance(&ODOMETER);

            if matcher.is_match(&candidate) {
                result = SearchResult::Found(Hit {
                    address:    odometer,
                    page_index: 0,
                    content:    candidate,
                });
                break None;
            }

            history.insert(candidate);
            if history.len() > self.history_cap {
                history.clear();
                resets += 1;
                debug!(candidates, "probe history cleared");
            }
        };

        let duration = start.elapsed();
        info!(
            found = result.is_found(),
            candidates,
            elapsed_ms = duration.as_millis() as u64,
            "probe finished"
        );

        Ok(Results {
            result,
            stats: ScanStats::compute(candidates, candidates, 1, resets, stopped, duration),
        })
    }

    /// Run on a background thread. Validation errors surface from
    /// [`ProbeHandle::join`].
    pub fn spawn(self, target: impl Into<String>, budget: Budget) -> Result<ProbeHandle, BabelError> {
        let target = target.into();
        let stop = self.stop_handle();
        let handle = thread::Builder::new()
            .name("babel-probe".into())
            .spawn(move || self.run(&target, budget))
            .map_err(|e| BabelError::Worker(format!("failed to spawn probe: {e}")))?;
        Ok(ProbeHandle { stop, handle })
    }
}

/// A probe running on its own thread.
pub struct ProbeHandle {
    stop:   Arc<AtomicBool>,
    handle: JoinHandle<Result<Results, BabelError>>,
}

impl ProbeHandle {
    /// Ask the probe to stop before its next candidate.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the probe to end.
    pub fn join(self) -> Result<Results, BabelError> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(BabelError::Worker("probe panicked".into())))
    }
}
