use rand::RngCore;

/// What a [`Synthesizer`] is asked to produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthesisRequest<'a> {
    /// Number of tokens wanted. Strategies may return fewer, never more.
    pub length: usize,

    /// Optional leading text. Strategies that understand context start
    /// their output with it; others ignore it.
    pub seed: Option<&'a str>,
}

impl<'a> SynthesisRequest<'a> {
    pub fn new(length: usize) -> Self {
        Self { length, seed: None }
    }

    pub fn seeded(length: usize, seed: &'a str) -> Self {
        Self { length, seed: Some(seed) }
    }
}

/// A text-generation strategy.
///
/// Implement this to plug a new way of filling pages into a
/// [`Library`](crate::Library) or a [`Probe`](crate::Probe).
///
/// # Object Safety
///
/// `Synthesizer` is object-safe. Libraries store strategies as
/// `Arc<dyn Synthesizer>`, so randomness arrives as `&mut dyn RngCore`
/// rather than a generic parameter. The caller owns the RNG, which is how a
/// library makes content a pure function of the address.
///
/// # Thread Safety
///
/// `Send + Sync` are required: one strategy is shared by every search
/// worker. Implementations must not mutate shared state while synthesizing.
///
/// # Example
///
/// ```rust
/// use babel::{Synthesizer, SynthesisRequest};
/// use rand::RngCore;
///
/// struct Echo;
///
/// impl Synthesizer for Echo {
///     fn synthesize(&self, request: &SynthesisRequest<'_>, _rng: &mut dyn RngCore) -> Vec<String> {
///         vec!["echo".to_string(); request.length]
///     }
///
///     fn separator(&self) -> &str {
///         " "
///     }
/// }
/// ```
pub trait Synthesizer: Send + Sync {
    /// Produce at most `request.length` tokens.
    ///
    /// Must return an empty vector, not panic, when there is nothing to draw
    /// from or the requested length is zero.
    fn synthesize(&self, request: &SynthesisRequest<'_>, rng: &mut dyn RngCore) -> Vec<String>;

    /// String placed between tokens when a page is rendered as text.
    fn separator(&self) -> &str {
        ""
    }
}

/// Decides whether a page's text is a hit.
///
/// # Thread Safety
///
/// `Send + Sync` are required: matchers are shared across workers and called
/// concurrently on different pages.
///
/// # Example
///
/// ```rust
/// use babel::Matcher;
///
/// struct Palindrome;
///
/// impl Matcher for Palindrome {
///     fn is_match(&self, text: &str) -> bool {
///         !text.is_empty() && text.chars().eq(text.chars().rev())
///     }
/// }
/// ```
pub trait Matcher: Send + Sync {
    /// Returns `true` if `text` satisfies the search.
    fn is_match(&self, text: &str) -> bool;
}
