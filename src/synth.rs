use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use tracing::trace;

use crate::error::BabelError;
use crate::model::{tokenize, ContextModel};
use crate::traits::{SynthesisRequest, Synthesizer};

/// Lowercase letters, digits, space and common punctuation.
pub const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789 .,;:!?'-";

// ---------------------------------------------------------------------------
// UniformSynthesizer
// ---------------------------------------------------------------------------

/// Independent, uniform draws from an alphabet. One token per character.
///
/// Always returns exactly `length` tokens.
#[derive(Debug, Clone)]
pub struct UniformSynthesizer {
    alphabet: Vec<char>,
}

impl Default for UniformSynthesizer {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.chars().collect(),
        }
    }
}

impl UniformSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom alphabet. Duplicate characters are kept, which weights
    /// them accordingly.
    pub fn with_alphabet(alphabet: &str) -> Result<Self, BabelError> {
        if alphabet.is_empty() {
            return Err(BabelError::InvalidLayout("alphabet is empty".into()));
        }
        Ok(Self {
            alphabet: alphabet.chars().collect(),
        })
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }
}

impl Synthesizer for UniformSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest<'_>, rng: &mut dyn RngCore) -> Vec<String> {
        if self.alphabet.is_empty() {
            return Vec::new();
        }
        (0..request.length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())].to_string())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ChainSynthesizer
// ---------------------------------------------------------------------------

/// Context-chain generation over a shared, read-only [`ContextModel`].
///
/// Each step looks up the trailing `order` tokens. An unseen context falls
/// back to a uniform draw from the vocabulary; a context observed only at the
/// end of a phrase ends the output early.
#[derive(Debug, Clone)]
pub struct ChainSynthesizer {
    model: Arc<ContextModel>,
}

impl ChainSynthesizer {
    pub fn new(model: Arc<ContextModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &ContextModel {
        &self.model
    }

    /// Grow `tokens` to at most `length`, calling `on_word` for each token
    /// appended. Unseen contexts fall back to the vocabulary when `fallback`
    /// is set and stop the walk otherwise.
    fn extend(
        &self,
        tokens: &mut Vec<String>,
        length: usize,
        fallback: bool,
        rng: &mut dyn RngCore,
        on_word: &mut dyn FnMut(&str, &[String]),
    ) {
        while tokens.len() < length {
            let next = match self.model.successors_of(tokens) {
                Some(successors) => successors.sample(rng),
                None if fallback => self.model.vocabulary().choose(rng).map(String::as_str),
                None => None,
            };
            let Some(next) = next else { break };
            tokens.push(next.to_owned());
            on_word(next, tokens);
        }
    }

    /// Generate a short passage from `input`, the way a story prompt works.
    ///
    /// Starts from a random word of `input`, follows observed successors only
    /// (no vocabulary fallback) for at most `max_words` words, and reports
    /// each chosen word with the running text. The result is capitalised and
    /// ends with a period. Returns `None` when `input` has no words.
    pub fn compose<F>(
        &self,
        input: &str,
        max_words: usize,
        rng: &mut dyn RngCore,
        mut on_word: F,
    ) -> Option<String>
    where
        F: FnMut(&str, &str),
    {
        let words = tokenize(input);
        let first = words.choose(rng)?.clone();
        let mut tokens = vec![first];
        self.extend(&mut tokens, max_words.max(1), false, rng, &mut |word: &str, so_far: &[String]| {
            let running = so_far.join(" ");
            trace!(word, "word chosen");
            on_word(word, &running);
        });
        Some(format_passage(&tokens))
    }
}

impl Synthesizer for ChainSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest<'_>, rng: &mut dyn RngCore) -> Vec<String> {
        if request.length == 0 || self.model.is_empty() {
            return Vec::new();
        }

        let mut tokens = request.seed.map(tokenize).unwrap_or_default();
        tokens.truncate(request.length);
        if tokens.is_empty() {
            if let Some(first) = self.model.vocabulary().choose(rng) {
                tokens.push(first.clone());
            }
        }

        self.extend(&mut tokens, request.length, true, rng, &mut |_: &str, _: &[String]| {});
        tokens
    }

    fn separator(&self) -> &str {
        " "
    }
}

/// Capitalise the first letter and close with a period.
fn format_passage(tokens: &[String]) -> String {
    let text = tokens.join(" ");
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}
