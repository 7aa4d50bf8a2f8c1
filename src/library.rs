use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::address::{Address, AddressSpace};
use crate::cache::ContentCache;
use crate::config::LibraryConfig;
use crate::error::BabelError;
use crate::traits::{SynthesisRequest, Synthesizer};

// ---------------------------------------------------------------------------
// Page / Book
// ---------------------------------------------------------------------------

/// One page of rendered text and the number of tokens it was built from.
/// Immutable. Only the count of tokens is kept, not the tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    text: String,
    len:  usize,
}

impl Page {
    pub fn new(tokens: &[String], separator: &str) -> Self {
        Self {
            text: tokens.join(separator),
            len:  tokens.len(),
        }
    }

    /// A page of whitespace-separated words, rendered as given.
    pub fn from_text(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            len:  text.split_whitespace().count(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Token count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The pages stored at one address. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pages: Vec<Page>,
}

impl Book {
    pub fn new(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    /// Convenience for planting known content: one page per text.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(texts.into_iter().map(|t| Page::from_text(t.as_ref())).collect())
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Shape of every generated book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLayout {
    pub pages_per_book:  usize,
    pub tokens_per_page: usize,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self { pages_per_book: 10, tokens_per_page: 400 }
    }
}

impl PageLayout {
    pub fn validate(&self) -> Result<(), BabelError> {
        if self.pages_per_book == 0 {
            return Err(BabelError::InvalidLayout("pages_per_book must be positive".into()));
        }
        if self.tokens_per_page == 0 {
            return Err(BabelError::InvalidLayout("tokens_per_page must be positive".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// How a book's RNG is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seeding {
    /// Derived from the address and a library-wide salt: regenerating an
    /// address always yields the same book.
    Address(u64),
    /// Fresh entropy per build: content is stable only while cached.
    Entropy,
}

/// An address space, a text strategy and the cache that remembers what the
/// strategy produced.
///
/// Share one `Library` between searches with `Arc`; it owns its cache and
/// every method takes `&self`.
pub struct Library {
    space:       AddressSpace,
    layout:      PageLayout,
    synthesizer: Arc<dyn Synthesizer>,
    cache:       ContentCache,
    seeding:     Seeding,
}

impl Library {
    /// Address-seeded library with salt `0` and a default cache.
    ///
    /// # Errors
    ///
    /// [`BabelError::InvalidLayout`] for a zero page count or page length.
    pub fn new(
        space: AddressSpace,
        layout: PageLayout,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Result<Self, BabelError> {
        layout.validate()?;
        Ok(Self {
            space,
            layout,
            synthesizer,
            cache: ContentCache::default(),
            seeding: Seeding::Address(0),
        })
    }

    /// Build everything `config` describes around `synthesizer`.
    pub fn from_config(
        config: &LibraryConfig,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Result<Self, BabelError> {
        config.validate()?;
        let library = Self::new(config.space()?, config.layout(), synthesizer)?
            .with_cache(ContentCache::with_shards(config.cache_threshold, config.cache_shards));
        Ok(if config.address_seeded {
            library.with_seed(config.seed)
        } else {
            library.unseeded()
        })
    }

    pub fn with_cache(mut self, cache: ContentCache) -> Self {
        self.cache = cache;
        self
    }

    /// Derive every book's content from its address and `seed`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seeding = Seeding::Address(seed);
        self
    }

    /// Draw fresh entropy for every book. Content is then only stable
    /// while it stays in the cache.
    pub fn unseeded(mut self) -> Self {
        self.seeding = Seeding::Entropy;
        self
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn synthesizer(&self) -> &dyn Synthesizer {
        self.synthesizer.as_ref()
    }

    pub fn is_address_seeded(&self) -> bool {
        matches!(self.seeding, Seeding::Address(_))
    }

    /// The book at `address`, synthesized and cached on first access.
    ///
    /// # Errors
    ///
    /// [`BabelError::AddressOutOfRange`] if `address` is outside the space.
    pub fn get_content(&self, address: Address) -> Result<Arc<Book>, BabelError> {
        self.check(address)?;
        Ok(self.cache.get_or_create(address, |a| self.build_book(a)))
    }

    /// Synthesize the book for `address` without touching the cache.
    pub fn build_book(&self, address: Address) -> Book {
        let mut rng = match self.seeding {
            Seeding::Address(salt) => StdRng::seed_from_u64(address_seed(salt, address)),
            Seeding::Entropy => StdRng::from_entropy(),
        };
        let request = SynthesisRequest::new(self.layout.tokens_per_page);
        let separator = self.synthesizer.separator();

        Book::new(
            (0..self.layout.pages_per_book)
                .map(|_| Page::new(&self.synthesizer.synthesize(&request, &mut rng), separator))
                .collect(),
        )
    }

    /// Pre-seed the cache with known content at `address`. An address that
    /// is already cached keeps its book.
    pub fn plant(&self, address: Address, book: Book) -> Result<Arc<Book>, BabelError> {
        self.check(address)?;
        Ok(self.cache.insert(address, book))
    }

    fn check(&self, address: Address) -> Result<(), BabelError> {
        if self.space.contains(&address) {
            Ok(())
        } else {
            Err(BabelError::AddressOutOfRange(address))
        }
    }
}

/// SplitMix64 over `(salt, room, shelf, book)`.
fn address_seed(salt: u64, address: Address) -> u64 {
    [address.room, address.shelf, address.book]
        .into_iter()
        .fold(splitmix64(salt), |acc, c| splitmix64(acc ^ c))
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Bounds;
    use crate::model::ContextModel;
    use crate::synth::{ChainSynthesizer, UniformSynthesizer};

    fn uniform_library(layout: PageLayout) -> Library {
        let space = AddressSpace::new(Bounds::new(2, 3, 4)).unwrap();
        Library::new(space, layout, Arc::new(UniformSynthesizer::new())).unwrap()
    }

    #[test]
    fn repeated_access_returns_cached_book() {
        let lib = uniform_library(PageLayout { pages_per_book: 2, tokens_per_page: 16 });
        let a = Address::new(1, 2, 3);
        let first = lib.get_content(a).unwrap();
        let second = lib.get_content(a).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(lib.cache().stats().hits, 1);
    }

    #[test]
    fn uniform_books_have_configured_shape() {
        let layout = PageLayout { pages_per_book: 3, tokens_per_page: 25 };
        let lib = uniform_library(layout);
        for i in 0..lib.space().len() {
            let book = lib.get_content(lib.space().address_at(i).unwrap()).unwrap();
            assert_eq!(book.len(), 3);
            assert!(book.pages().iter().all(|p| p.len() == 25 && p.text().chars().count() == 25));
        }
    }

    #[test]
    fn chain_pages_never_exceed_configured_length() {
        let model = ContextModel::from_phrases(["eu te amo muito", "a beleza do mundo e incrivel"], 1);
        let space = AddressSpace::new(Bounds::new(1, 2, 5)).unwrap();
        let layout = PageLayout { pages_per_book: 4, tokens_per_page: 6 };
        let lib = Library::new(space, layout, Arc::new(ChainSynthesizer::new(Arc::new(model)))).unwrap();
        for i in 0..space.len() {
            let book = lib.get_content(space.address_at(i).unwrap()).unwrap();
            assert_eq!(book.len(), 4);
            assert!(book.pages().iter().all(|p| !p.is_empty() && p.len() <= 6));
        }
    }

    #[test]
    fn address_seeding_survives_cache_reset() {
        let lib = uniform_library(PageLayout { pages_per_book: 1, tokens_per_page: 64 })
            .with_cache(ContentCache::new(Some(1)))
            .with_seed(42);
        let a = Address::new(0, 0, 1);
        let before = lib.get_content(a).unwrap();
        lib.get_content(Address::new(0, 0, 2)).unwrap(); // pushes past threshold
        assert!(lib.cache().get(&a).is_none());
        let after = lib.get_content(a).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(*before, *after);
    }

    #[test]
    fn distinct_addresses_get_distinct_content() {
        let lib = uniform_library(PageLayout { pages_per_book: 1, tokens_per_page: 64 });
        let a = lib.build_book(Address::new(0, 0, 1));
        let b = lib.build_book(Address::new(0, 1, 0));
        assert_ne!(a, b);
        assert_ne!(address_seed(0, Address::new(1, 0, 0)), address_seed(0, Address::new(0, 0, 1)));
    }

    #[test]
    fn planted_book_is_served_and_bounds_checked() {
        let lib = uniform_library(PageLayout::default());
        let a = Address::new(0, 0, 2);
        lib.plant(a, Book::from_texts(["hello there"])).unwrap();
        assert_eq!(lib.get_content(a).unwrap().page(0).unwrap().text(), "hello there");

        let outside = Address::new(2, 0, 0);
        assert!(matches!(lib.get_content(outside), Err(BabelError::AddressOutOfRange(_))));
        assert!(lib.plant(outside, Book::from_texts(["x"])).is_err());
    }

    #[test]
    fn page_keeps_text_and_count_only() {
        assert_eq!(std::mem::size_of::<Page>(), std::mem::size_of::<(String, usize)>());

        let lib = uniform_library(PageLayout::default());
        let book = lib.get_content(Address::new(0, 0, 1)).unwrap();
        let page = book.page(0).unwrap();
        assert_eq!(page.len(), 400);
        assert_eq!(page.text().len(), 400);

        let planted = Page::from_text("well  hello there");
        assert_eq!(planted.len(), 3);
        assert_eq!(planted.text(), "well  hello there");
        assert!(Page::from_text("   ").is_empty());
    }

    #[test]
    fn zero_layout_is_rejected() {
        let space = AddressSpace::new(Bounds::new(1, 1, 1)).unwrap();
        let layout = PageLayout { pages_per_book: 0, tokens_per_page: 10 };
        assert!(Library::new(space, layout, Arc::new(UniformSynthesizer::new())).is_err());
    }
}
