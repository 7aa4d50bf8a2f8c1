use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use babel::{
    search, Address, AddressSpace, BabelError, Book, Bounds, ChainSynthesizer, ContentCache,
    ContextModel, Library, LibraryConfig, Matcher, PageLayout, SearchResult, StopReason,
    UniformSynthesizer,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Uniform-random library over `bounds` with small pages.
///
/// The alphabet has no `~`, so `"~"` is a target guaranteed to be absent.
fn library(bounds: Bounds) -> Library {
    let space = AddressSpace::new(bounds).unwrap();
    let layout = PageLayout { pages_per_book: 2, tokens_per_page: 32 };
    Library::new(space, layout, Arc::new(UniformSynthesizer::new())).unwrap()
}

/// Records every address handed to the matcher, by page text.
struct Recording {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Matcher for Recording {
    fn is_match(&self, text: &str) -> bool {
        self.seen.lock().unwrap().push(text.to_string());
        false
    }
}

/// Substring matcher that takes a little time on every miss, so a worker
/// that hits early is always ahead of the others.
struct SlowSubstring(&'static str);

impl Matcher for SlowSubstring {
    fn is_match(&self, text: &str) -> bool {
        if text.contains(self.0) {
            return true;
        }
        std::thread::sleep(Duration::from_micros(200));
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn finds_planted_target_at_exact_address() {
    let lib = Arc::new(library(Bounds::new(1, 1, 3)));
    lib.plant(Address::new(0, 0, 2), Book::from_texts(["well hello there", "second page"]))
        .unwrap();

    let results = search().library(lib).matching("hello").workers(1).run().unwrap();

    let hit = results.hit().expect("planted target should be found");
    assert_eq!(hit.address, Address::new(0, 0, 2));
    assert_eq!(hit.page_index, 0);
    assert_eq!(hit.content, "well hello there");
}

#[test]
fn planted_target_found_for_several_worker_counts() {
    let target = Address::new(2, 1, 3);
    for workers in [1, 2, 4] {
        let lib = Arc::new(library(Bounds::new(4, 4, 4)));
        lib.plant(target, Book::from_texts(["nothing here", "a NEEDLE in the stack"]))
            .unwrap();

        let results = search()
            .library(lib)
            .matching("needle")
            .workers(workers)
            .run()
            .unwrap();

        let hit = results.hit().unwrap_or_else(|| panic!("not found with {workers} workers"));
        assert_eq!(hit.address, target);
        assert_eq!(hit.page_index, 1);
        assert_eq!(hit.content, "a NEEDLE in the stack");
    }
}

#[test]
fn absent_target_inspects_every_address_once() {
    let lib = Arc::new(library(Bounds::new(2, 2, 2)));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let results = search()
        .library(Arc::clone(&lib))
        .with_matcher(Recording { seen: Arc::clone(&seen) })
        .workers(3)
        .run()
        .unwrap();

    assert_eq!(results.result, SearchResult::NotFound);
    assert_eq!(results.stats.inspected, 8);
    assert_eq!(results.stats.pages, 16);
    assert_eq!(seen.lock().unwrap().len(), 16);
    assert_eq!(lib.cache().stats().misses, 8, "each address synthesized once");
    assert_eq!(lib.cache().stats().hits, 0);
}

#[test]
fn progress_reaches_one_on_exhaustive_search() {
    let lib = Arc::new(library(Bounds::new(2, 3, 4)));
    let calls = Arc::new(AtomicU64::new(0));
    let max_bits = Arc::new(AtomicU64::new(0));

    let (c, m) = (Arc::clone(&calls), Arc::clone(&max_bits));
    let results = search()
        .library(lib)
        .matching("~")
        .workers(4)
        .on_progress(move |fraction| {
            assert!((0.0..=1.0).contains(&fraction));
            c.fetch_add(1, Ordering::SeqCst);
            m.fetch_max(fraction.to_bits(), Ordering::SeqCst);
        })
        .run()
        .unwrap();

    assert!(!results.is_found());
    assert_eq!(calls.load(Ordering::SeqCst), 24);
    assert_eq!(f64::from_bits(max_bits.load(Ordering::SeqCst)), 1.0);
}

#[test]
fn deterministic_mode_returns_lowest_address() {
    let lib = Arc::new(library(Bounds::new(4, 4, 4)));
    let high = Address::new(3, 3, 3);
    let low = Address::new(1, 0, 0);
    lib.plant(high, Book::from_texts(["marker"])).unwrap();
    lib.plant(low, Book::from_texts(["marker"])).unwrap();

    for workers in [1, 2, 4, 7] {
        let results = search()
            .library(Arc::clone(&lib))
            .matching("marker")
            .workers(workers)
            .deterministic(true)
            .run()
            .unwrap();
        assert_eq!(results.hit().unwrap().address, low, "{workers} workers");
    }
}

#[test]
fn first_wins_reports_one_of_the_planted_addresses() {
    let lib = Arc::new(library(Bounds::new(4, 4, 4)));
    let planted: HashSet<Address> = [Address::new(0, 2, 1), Address::new(3, 1, 0)].into();
    for a in &planted {
        lib.plant(*a, Book::from_texts(["marker"])).unwrap();
    }

    for cancel in [true, false] {
        let results = search()
            .library(Arc::clone(&lib))
            .matching("marker")
            .workers(4)
            .cancel_on_match(cancel)
            .run()
            .unwrap();
        assert!(planted.contains(&results.hit().unwrap().address));
    }
}

#[test]
fn cancel_on_match_stops_other_partitions() {
    let bounds = Bounds::new(4, 16, 16);
    let total = AddressSpace::new(bounds).unwrap().len();

    for cancel in [true, false] {
        let lib = Arc::new(library(bounds));
        lib.plant(Address::ORIGIN, Book::from_texts(["marker"])).unwrap();

        let results = search()
            .library(lib)
            .with_matcher(SlowSubstring("marker"))
            .workers(4)
            .cancel_on_match(cancel)
            .run()
            .unwrap();

        assert_eq!(results.hit().unwrap().address, Address::ORIGIN);
        if cancel {
            assert!(results.stats.inspected < total / 4, "inspected {}", results.stats.inspected);
        } else {
            // the winner stops at its first address, the other three walk 256 each
            assert_eq!(results.stats.inspected, 1 + 3 * total / 4);
        }
    }
}

#[test]
fn without_cancellation_other_workers_finish() {
    let lib = Arc::new(library(Bounds::new(2, 4, 4)));
    lib.plant(Address::ORIGIN, Book::from_texts(["marker"])).unwrap();

    let results = search()
        .library(lib)
        .matching("marker")
        .workers(2)
        .cancel_on_match(false)
        .run()
        .unwrap();

    assert_eq!(results.hit().unwrap().address, Address::ORIGIN);
    // worker 0 stops at its first address, worker 1 walks all 16 of its own
    assert_eq!(results.stats.inspected, 17);
}

#[test]
fn raised_stop_flag_interrupts_search() {
    let lib = Arc::new(library(Bounds::new(4, 4, 4)));
    let stop = Arc::new(AtomicBool::new(true));

    let results = search()
        .library(lib)
        .matching("~")
        .workers(2)
        .stop_flag(stop)
        .run()
        .unwrap();

    assert!(!results.is_found());
    assert_eq!(results.stats.inspected, 0);
    assert_eq!(results.stats.stopped, Some(StopReason::Cancelled));
}

#[test]
fn elapsed_deadline_interrupts_search() {
    let lib = Arc::new(library(Bounds::new(4, 4, 4)));
    let results = search()
        .library(lib)
        .matching("~")
        .workers(2)
        .deadline(Duration::ZERO)
        .run()
        .unwrap();

    assert_eq!(results.stats.stopped, Some(StopReason::Deadline));
    assert_eq!(results.stats.inspected, 0);
}

#[test]
fn subset_range_limits_search() {
    let lib = Arc::new(library(Bounds::new(1, 1, 10)));
    lib.plant(Address::new(0, 0, 1), Book::from_texts(["marker"])).unwrap();

    let results = search()
        .library(Arc::clone(&lib))
        .matching("marker")
        .range(2..10)
        .run()
        .unwrap();
    assert!(!results.is_found());
    assert_eq!(results.stats.inspected, 8);

    let empty = search().library(lib).matching("marker").range(5..5).run().unwrap();
    assert!(!empty.is_found());
    assert_eq!(empty.stats.workers, 0);
}

#[test]
fn configuration_errors_are_reported_before_work() {
    let lib = Arc::new(library(Bounds::new(1, 1, 3)));

    let err = search().library(Arc::clone(&lib)).matching("x").workers(0).run().unwrap_err();
    assert!(matches!(err, BabelError::InvalidWorkerCount(0)));

    let err = search().library(Arc::clone(&lib)).matching("").run().unwrap_err();
    assert!(matches!(err, BabelError::EmptyTarget));

    let err = search().library(Arc::clone(&lib)).run().unwrap_err();
    assert!(matches!(err, BabelError::EmptyTarget));

    let err = search().matching("x").run().unwrap_err();
    assert!(matches!(err, BabelError::MissingLibrary));

    let err = search().library(Arc::clone(&lib)).matching("x").poll_every(0).run().unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(lib.cache().stats().misses, 0, "nothing synthesized");
}

#[test]
fn cache_reset_during_search_is_tolerated() {
    let space = AddressSpace::new(Bounds::new(2, 2, 4)).unwrap();
    let layout = PageLayout { pages_per_book: 1, tokens_per_page: 16 };
    let lib = Arc::new(
        Library::new(space, layout, Arc::new(UniformSynthesizer::new()))
            .unwrap()
            .with_cache(ContentCache::new(Some(3))),
    );

    let results = search().library(Arc::clone(&lib)).matching("~").workers(2).run().unwrap();

    assert_eq!(results.stats.inspected, 16);
    assert!(results.stats.resets >= 1);
    assert!(lib.cache().len() <= 3);
}

#[test]
fn chain_library_from_corpus_file_is_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("frases.txt");
    fs::write(&corpus, "eu te amo muito\na beleza do mundo e incrivel\n").unwrap();

    let config = LibraryConfig::from_json(
        r#"{ "bounds": { "rooms": 2, "shelves": 4, "books": 8 },
             "pages_per_book": 4, "tokens_per_page": 12, "context_order": 1 }"#,
    )
    .unwrap();
    let model = ContextModel::from_path(&corpus, config.context_order).unwrap();
    let lib = Arc::new(
        Library::from_config(&config, Arc::new(ChainSynthesizer::new(Arc::new(model)))).unwrap(),
    );

    let results = search()
        .library(Arc::clone(&lib))
        .matching("te amo")
        .deterministic(true)
        .run()
        .unwrap();

    let hit = results.hit().expect("a short chain corpus reaches its own phrases");
    assert!(hit.content.contains("te amo"));
    let again = lib.build_book(hit.address);
    assert_eq!(again.page(hit.page_index).unwrap().text(), hit.content);
}
