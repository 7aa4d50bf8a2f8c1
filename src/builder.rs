use std::ops::Range;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{run, EngineOptions, MatchPolicy, ProgressFn};
use crate::error::BabelError;
use crate::library::Library;
use crate::results::Results;
use crate::traits::Matcher;

// ---------------------------------------------------------------------------
// SearchBuilder
// ---------------------------------------------------------------------------

/// Entry point for configuring and executing a partitioned search.
///
/// Created via [`babel::search()`](crate::search). Configure with chained
/// builder methods, then call [`run()`](SearchBuilder::run) to execute.
///
/// # Example
///
/// ```rust,ignore
/// let results = babel::search()
///     .library(library)
///     .matching("hello")
///     .workers(4)
///     .on_progress(|f| eprint!("\r{:.0}%", f * 100.0))
///     .run()?;
/// ```
pub struct SearchBuilder {
    library:         Option<Arc<Library>>,
    target:          Option<String>,
    matcher:         Option<Box<dyn Matcher>>,
    workers:         usize,
    range:           Option<Range<u64>>,
    cancel_on_match: bool,
    deterministic:   bool,
    progress:        Option<ProgressFn>,
    deadline:        Option<Duration>,
    poll_every:      u64,
    stop:            Option<Arc<AtomicBool>>,
}

impl Default for SearchBuilder {
    fn default() -> Self {
        Self {
            library:         None,
            target:          None,
            matcher:         None,
            workers:         num_cpus(),
            range:           None,
            cancel_on_match: true,
            deterministic:   false,
            progress:        None,
            deadline:        None,
            poll_every:      1,
            stop:            None,
        }
    }
}

impl SearchBuilder {
    // ── Library ───────────────────────────────────────────────────────────

    /// The library to search. Its cache is shared with every other search
    /// run against the same `Arc`.
    pub fn library(mut self, library: Arc<Library>) -> Self {
        self.library = Some(library);
        self
    }

    /// Restrict the search to linear indices `range` of the library's
    /// address space. Indices past the end are ignored; an empty range
    /// finishes immediately with nothing found.
    pub fn range(mut self, range: Range<u64>) -> Self {
        self.range = Some(range);
        self
    }

    // ── Matcher ───────────────────────────────────────────────────────────

    /// Set a custom matcher.
    ///
    /// Any type implementing [`Matcher`] is accepted. It takes precedence
    /// over `.matching()`.
    pub fn with_matcher(mut self, m: impl Matcher + 'static) -> Self {
        self.matcher = Some(Box::new(m));
        self
    }

    /// Shorthand for substring matching.
    ///
    /// Matching is case-insensitive. An empty pattern is rejected by
    /// [`run()`](Self::run) with [`BabelError::EmptyTarget`].
    pub fn matching(mut self, pattern: impl Into<String>) -> Self {
        self.target = Some(pattern.into());
        self
    }

    // ── Options ───────────────────────────────────────────────────────────

    /// Number of workers, one per partition.
    ///
    /// Defaults to the number of logical CPU cores. Zero is rejected.
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Stop every worker as soon as any hit is recorded. On by default.
    ///
    /// With `false`, workers that have not matched finish their partitions
    /// and the first recorded hit still wins.
    pub fn cancel_on_match(mut self, yes: bool) -> Self {
        self.cancel_on_match = yes;
        self
    }

    /// Return the lowest matching address instead of the first one recorded.
    ///
    /// Results are then reproducible across runs and worker counts, at the
    /// cost of letting lower partitions finish.
    pub fn deterministic(mut self, yes: bool) -> Self {
        self.deterministic = yes;
        self
    }

    /// Called after every inspected address with the fraction of the range
    /// done so far. Runs on worker threads; keep it cheap.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(f));
        self
    }

    /// Give up after `d`, checked at poll points.
    pub fn deadline(mut self, d: Duration) -> Self {
        self.deadline = Some(d);
        self
    }

    /// Check for cancellation, deadline and stop flag every `n` addresses.
    /// Defaults to every address.
    pub fn poll_every(mut self, n: u64) -> Self {
        self.poll_every = n;
        self
    }

    /// Abort the search when `flag` becomes `true`, checked at poll points.
    pub fn stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    // ── Execute ───────────────────────────────────────────────────────────

    /// Execute the search and return results.
    ///
    /// Blocks until every worker has stopped.
    ///
    /// # Errors
    ///
    /// Returns `Err` for configuration errors (no library, no or empty
    /// target, zero workers, zero poll interval) before any worker starts,
    /// and [`BabelError::Worker`] if a worker could not be spawned or
    /// panicked. Finding nothing is `Ok` with
    /// [`SearchResult::NotFound`](crate::SearchResult::NotFound).
    pub fn run(self) -> Result<Results, BabelError> {
        let library = self.library.ok_or(BabelError::MissingLibrary)?;

        let matcher: Arc<dyn Matcher> = match (self.matcher, self.target) {
            (Some(m), _) => Arc::from(m),
            (None, Some(t)) => Arc::new(SubstringMatcher::new(&t)?),
            (None, None) => return Err(BabelError::EmptyTarget),
        };

        if self.workers == 0 {
            return Err(BabelError::InvalidWorkerCount(0));
        }
        if self.poll_every == 0 {
            return Err(BabelError::Config("poll interval must be at least 1".into()));
        }

        let policy = if self.deterministic {
            MatchPolicy::Lowest
        } else {
            MatchPolicy::FirstWins { cancel: self.cancel_on_match }
        };

        let range = self.range.unwrap_or(0..library.space().len());

        run(EngineOptions {
            library,
            matcher,
            workers: self.workers,
            range,
            policy,
            progress: self.progress,
            deadline: self.deadline,
            poll_every: self.poll_every,
            stop: self.stop,
        })
    }
}

// ---------------------------------------------------------------------------
// Built-in matchers
// ---------------------------------------------------------------------------

/// Matches text containing `pattern`, ignoring case.
pub(crate) struct SubstringMatcher {
    pattern: String,
}

impl SubstringMatcher {
    pub(crate) fn new(pattern: &str) -> Result<Self, BabelError> {
        if pattern.is_empty() {
            return Err(BabelError::EmptyTarget);
        }
        Ok(Self {
            pattern: pattern.to_lowercase(),
        })
    }
}

impl Matcher for SubstringMatcher {
    fn is_match(&self, text: &str) -> bool {
        contains_folded(text, &self.pattern)
    }
}

/// Whether `text` contains `pattern` (already lowercased), comparing
/// lowercased characters in place.
fn contains_folded(text: &str, pattern: &str) -> bool {
    if text.is_ascii() && pattern.is_ascii() {
        let (text, pattern) = (text.as_bytes(), pattern.as_bytes());
        return text.windows(pattern.len()).any(|w| w.eq_ignore_ascii_case(pattern));
    }
    text.char_indices().any(|(i, _)| {
        let mut folded = text[i..].chars().flat_map(char::to_lowercase);
        pattern.chars().all(|c| folded.next() == Some(c))
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Get the logical CPU count, with a safe fallback.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
