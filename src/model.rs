//! Context model for chain synthesis.
//!
//! Built once from a training corpus, then read-only. Lookups take `&self`
//! and need no locking, so one model can be shared by every worker behind an
//! `Arc`.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use rand::{Rng, RngCore};
use tracing::{info, warn};

use crate::error::BabelError;

/// Default number of trailing tokens that form a context key.
pub const DEFAULT_ORDER: usize = 3;

/// Default number of words returned by [`ContextModel::suggest`].
pub const DEFAULT_SUGGESTIONS: usize = 5;

/// Observed successors of one context, most frequent first.
///
/// An empty list means the context was seen only at the end of a phrase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Successors {
    ranked: Vec<(String, u32)>,
    total:  u32,
}

impl Successors {
    fn from_counts(counts: HashMap<String, u32>) -> Self {
        let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let total = ranked.iter().map(|(_, c)| c).sum();
        Self { ranked, total }
    }

    /// `(token, count)` pairs ordered by descending count, then token.
    pub fn ranked(&self) -> &[(String, u32)] {
        &self.ranked
    }

    /// Sum of all counts: the size of the underlying multiset.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Draw one successor, each observation equally likely.
    pub fn sample(&self, rng: &mut dyn RngCore) -> Option<&str> {
        if self.total == 0 {
            return None;
        }
        let mut r = rng.gen_range(0..self.total);
        for (token, count) in &self.ranked {
            if r < *count {
                return Some(token.as_str());
            }
            r -= count;
        }
        None
    }
}

// ---------------------------------------------------------------------------
// ContextModel
// ---------------------------------------------------------------------------

/// Map from the last `order` tokens to the tokens that followed them in the
/// training corpus.
#[derive(Debug, Clone)]
pub struct ContextModel {
    order:      usize,
    chain:      HashMap<String, Successors>,
    vocabulary: Vec<String>,
}

impl ContextModel {
    /// A model with no contexts and no vocabulary.
    pub fn empty(order: usize) -> Self {
        Self {
            order:      order.max(1),
            chain:      HashMap::new(),
            vocabulary: Vec::new(),
        }
    }

    /// Build from already-split phrases. Phrases are lowercased and tokenized
    /// with [`tokenize`]. An `order` of zero is treated as one.
    pub fn from_phrases<I, S>(phrases: I, order: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let order = order.max(1);
        let mut counts: HashMap<String, HashMap<String, u32>> = HashMap::new();
        let mut vocabulary = BTreeSet::new();

        for phrase in phrases {
            let words = tokenize(phrase.as_ref());
            for i in 0..words.len() {
                let followers = counts.entry(context_key(&words[..=i], order)).or_default();
                if let Some(next) = words.get(i + 1) {
                    *followers.entry(next.clone()).or_insert(0) += 1;
                }
            }
            vocabulary.extend(words);
        }

        let chain = counts
            .into_iter()
            .map(|(key, followers)| (key, Successors::from_counts(followers)))
            .collect();

        Self {
            order,
            chain,
            vocabulary: vocabulary.into_iter().collect(),
        }
    }

    /// Build from raw corpus text: phrases are separated by newlines or commas.
    pub fn from_corpus(text: &str, order: usize) -> Self {
        Self::from_phrases(split_phrases(text), order)
    }

    /// Read and build from a corpus file.
    ///
    /// # Errors
    ///
    /// [`BabelError::CorpusLoad`] if the file cannot be read. The error is
    /// recoverable; see [`ContextModel::load_or_empty`].
    pub fn from_path(path: impl AsRef<Path>, order: usize) -> Result<Self, BabelError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| BabelError::CorpusLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_corpus(&text, order);
        info!(
            path = %path.display(),
            contexts = model.len(),
            vocabulary = model.vocabulary.len(),
            "context model loaded"
        );
        Ok(model)
    }

    /// Like [`from_path`](Self::from_path), but a missing or unreadable file
    /// yields an empty model. Chain synthesis over an empty model produces
    /// empty pages.
    pub fn load_or_empty(path: impl AsRef<Path>, order: usize) -> Self {
        match Self::from_path(path, order) {
            Ok(model) => model,
            Err(err) => {
                warn!(error = %err, "continuing with an empty context model");
                Self::empty(order)
            }
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Distinct tokens seen in training, sorted.
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Number of distinct context keys.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// Successors recorded for an exact context key (tokens joined by one
    /// space). `None` means the context was never observed.
    pub fn successors(&self, key: &str) -> Option<&Successors> {
        self.chain.get(key)
    }

    /// Successors of the trailing window of `tokens`.
    pub fn successors_of(&self, tokens: &[String]) -> Option<&Successors> {
        self.successors(&context_key(tokens, self.order))
    }

    /// The `n` most frequent next words after the tail of `context`.
    pub fn suggest(&self, context: &str, n: usize) -> Vec<(&str, u32)> {
        self.successors_of(&tokenize(context))
            .map(|s| s.ranked.iter().take(n).map(|(w, c)| (w.as_str(), *c)).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lowercase `text` and split it into runs of alphanumeric or `_` characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Split corpus text on newlines and commas, dropping blank phrases.
pub fn split_phrases(text: &str) -> impl Iterator<Item = &str> {
    text.split([',', '\n']).map(str::trim).filter(|p| !p.is_empty())
}

/// Key for the last `order` tokens of `window`.
pub(crate) fn context_key(window: &[String], order: usize) -> String {
    window[window.len().saturating_sub(order)..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CORPUS: [&str; 2] = ["eu te amo muito", "a beleza do mundo e incrivel"];

    #[test]
    fn first_order_chain_records_adjacency() {
        let model = ContextModel::from_phrases(CORPUS, 1);
        let eu = model.successors("eu").unwrap();
        assert_eq!(eu.ranked(), &[("te".to_string(), 1)]);
        assert_eq!(model.vocabulary().len(), 10);
    }

    #[test]
    fn phrase_final_token_has_no_successors() {
        let model = ContextModel::from_phrases(CORPUS, 1);
        assert!(model.successors("muito").unwrap().is_empty());
        assert!(model.successors("zebra").is_none());
    }

    #[test]
    fn higher_order_keys_use_trailing_window() {
        let model = ContextModel::from_phrases(CORPUS, 2);
        assert_eq!(model.successors("te amo").unwrap().ranked()[0].0, "muito");
        // shorter keys exist at phrase starts
        assert_eq!(model.successors("eu").unwrap().ranked()[0].0, "te");
        assert!(model.successors("amo").is_none());
    }

    #[test]
    fn successors_are_frequency_ranked() {
        let model = ContextModel::from_corpus("o gato, o gato\no cão, o rato, o gato", 1);
        let o = model.successors("o").unwrap();
        assert_eq!(o.ranked()[0], ("gato".to_string(), 3));
        assert_eq!(o.total(), 5);
        assert_eq!(model.suggest("veja o", 2), vec![("gato", 3), ("cão", 1)]);
    }

    #[test]
    fn sample_only_returns_observed_successors() {
        let model = ContextModel::from_phrases(["a b", "a c", "a b"], 1);
        let a = model.successors("a").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let s = a.sample(&mut rng).unwrap();
            assert!(s == "b" || s == "c");
        }
    }

    #[test]
    fn tokenize_lowercases_and_strips_punctuation() {
        assert_eq!(tokenize("Eu te AMO, muito!"), vec!["eu", "te", "amo", "muito"]);
        assert!(tokenize(" ,.; ").is_empty());
    }

    #[test]
    fn missing_corpus_is_recoverable() {
        let err = ContextModel::from_path("/definitely/not/here.txt", 3).unwrap_err();
        assert!(err.is_recoverable());
        let model = ContextModel::load_or_empty("/definitely/not/here.txt", 3);
        assert!(model.is_empty());
        assert_eq!(model.order(), 3);
    }

    #[test]
    fn loads_corpus_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frases.txt");
        fs::write(&path, "Eu te amo muito.\nA beleza do mundo é incrível.,,\n").unwrap();
        let model = ContextModel::from_path(&path, 1).unwrap();
        assert_eq!(model.successors("beleza").unwrap().ranked()[0].0, "do");
        assert!(model.vocabulary().iter().any(|w| w == "incrível"));
    }
}
