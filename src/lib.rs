//! # babel
//!
//! A procedurally generated library: every `(room, shelf, book)` address
//! holds a book synthesized on first visit, cached for later ones, and
//! searchable in parallel for a target string.
//!
//! The crate owns the address space, the cache, the partitioned search
//! engine and two text strategies. It does **not** own presentation: callers
//! get a [`Results`] value and an optional progress callback.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use babel::{Address, AddressSpace, Book, Bounds, Library, PageLayout, UniformSynthesizer};
//!
//! let space = AddressSpace::new(Bounds::new(1, 1, 3)).unwrap();
//! let library = Library::new(space, PageLayout::default(), Arc::new(UniformSynthesizer::new())).unwrap();
//! library.plant(Address::new(0, 0, 2), Book::from_texts(["well hello there"])).unwrap();
//!
//! let results = babel::search()
//!     .library(Arc::new(library))
//!     .matching("hello")
//!     .workers(1)
//!     .run()
//!     .unwrap();
//!
//! let hit = results.hit().unwrap();
//! assert_eq!(hit.address, Address::new(0, 0, 2));
//! assert_eq!(hit.page_index, 0);
//! ```
//!
//! # Strategies
//!
//! [`UniformSynthesizer`] draws characters independently from an alphabet.
//! [`ChainSynthesizer`] walks a [`ContextModel`] learned from a corpus:
//!
//! ```rust
//! use std::sync::Arc;
//! use babel::{ChainSynthesizer, ContextModel, SynthesisRequest, Synthesizer};
//! use rand::SeedableRng;
//!
//! let model = ContextModel::from_phrases(["eu te amo muito", "a beleza do mundo e incrivel"], 1);
//! let synth = ChainSynthesizer::new(Arc::new(model));
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let words = synth.synthesize(&SynthesisRequest::seeded(2, "eu"), &mut rng);
//! assert_eq!(words, ["eu", "te"]);
//! ```
//!
//! Implement [`Synthesizer`] for a custom strategy and [`Matcher`] for custom
//! hit logic.
//!
//! # Unbounded probing
//!
//! When stable addresses do not matter, a [`Probe`] generates and tests
//! candidates until one matches. It always takes a [`Budget`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use babel::{Budget, ChainSynthesizer, ContextModel, Probe};
//!
//! let model = ContextModel::from_phrases(["eu te amo muito"], 1);
//! let probe = Probe::new(Arc::new(ChainSynthesizer::new(Arc::new(model)))).seed(4);
//! let results = probe.run("amo muito", Budget::iterations(1_000)).unwrap();
//! assert!(results.is_found());
//! ```

#![forbid(unsafe_code)]

pub mod engine;
pub mod model;

mod address;
mod builder;
mod cache;
mod config;
mod error;
mod library;
mod probe;
mod results;
mod synth;
mod traits;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use address::{Address, AddressSpace, Addresses, Bounds, Partition};
pub use builder::SearchBuilder;
pub use cache::{CacheStats, ContentCache};
pub use config::LibraryConfig;
pub use engine::MatchPolicy;
pub use error::BabelError;
pub use library::{Book, Library, Page, PageLayout};
pub use model::ContextModel;
pub use probe::{Budget, Probe, ProbeHandle};
pub use results::{Hit, Results, ScanStats, SearchResult, StopReason};
pub use synth::{ChainSynthesizer, UniformSynthesizer};
pub use traits::{Matcher, SynthesisRequest, Synthesizer};

// ── Entry point ───────────────────────────────────────────────────────────────

/// Create a new [`SearchBuilder`] to configure and run a search.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use babel::{AddressSpace, Bounds, Library, PageLayout, UniformSynthesizer};
///
/// let space = AddressSpace::new(Bounds::new(2, 2, 2)).unwrap();
/// let layout = PageLayout { pages_per_book: 1, tokens_per_page: 8 };
/// let library = Library::new(space, layout, Arc::new(UniformSynthesizer::new())).unwrap();
///
/// let results = babel::search()
///     .library(Arc::new(library))
///     .matching("~")
///     .run()
///     .unwrap();
///
/// assert!(!results.is_found());
/// assert_eq!(results.stats.inspected, 8);
/// ```
pub fn search() -> SearchBuilder {
    SearchBuilder::default()
}
