use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::address::{AddressSpace, Bounds};
use crate::cache::{DEFAULT_SHARDS, DEFAULT_THRESHOLD};
use crate::error::BabelError;
use crate::library::PageLayout;
use crate::model::DEFAULT_ORDER;

/// Everything needed to stand up a [`Library`](crate::Library).
///
/// Every field has a default, so a JSON document only needs the keys it
/// changes:
///
/// ```rust
/// let config = babel::LibraryConfig::from_json(r#"{ "bounds": { "rooms": 1, "shelves": 1, "books": 3 } }"#).unwrap();
/// assert_eq!(config.space().unwrap().len(), 3);
/// assert_eq!(config.pages_per_book, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub bounds:          Bounds,
    pub pages_per_book:  usize,
    pub tokens_per_page: usize,

    /// Entry count that triggers a full cache reset. `null` disables it.
    pub cache_threshold: Option<usize>,
    pub cache_shards:    usize,

    /// Derive each book's content from its address. When `false`, content
    /// is only stable while cached.
    pub address_seeded:  bool,
    pub seed:            u64,

    /// Context length for chain synthesis.
    pub context_order:   usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let layout = PageLayout::default();
        Self {
            bounds:          Bounds::default(),
            pages_per_book:  layout.pages_per_book,
            tokens_per_page: layout.tokens_per_page,
            cache_threshold: Some(DEFAULT_THRESHOLD),
            cache_shards:    DEFAULT_SHARDS,
            address_seeded:  true,
            seed:            0,
            context_order:   DEFAULT_ORDER,
        }
    }
}

impl LibraryConfig {
    pub fn from_json(text: &str) -> Result<Self, BabelError> {
        serde_json::from_str(text).map_err(|e| BabelError::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BabelError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| BabelError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Reject values no library can be built from.
    pub fn validate(&self) -> Result<(), BabelError> {
        self.space()?;
        self.layout().validate()?;
        if self.cache_threshold == Some(0) {
            return Err(BabelError::Config("cache_threshold must be positive".into()));
        }
        if self.context_order == 0 {
            return Err(BabelError::Config("context_order must be positive".into()));
        }
        Ok(())
    }

    pub fn space(&self) -> Result<AddressSpace, BabelError> {
        AddressSpace::new(self.bounds)
    }

    pub fn layout(&self) -> PageLayout {
        PageLayout {
            pages_per_book:  self.pages_per_book,
            tokens_per_page: self.tokens_per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LibraryConfig::default();
        config.validate().unwrap();
        assert_eq!(config.space().unwrap().len(), 4 * 8 * 32);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = LibraryConfig::from_json(
            r#"{ "tokens_per_page": 40, "cache_threshold": null, "address_seeded": false }"#,
        )
        .unwrap();
        assert_eq!(config.tokens_per_page, 40);
        assert_eq!(config.cache_threshold, None);
        assert!(!config.address_seeded);
        assert_eq!(config.bounds, Bounds::default());
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let zero_books = LibraryConfig {
            bounds: Bounds::new(1, 1, 0),
            ..LibraryConfig::default()
        };
        assert!(matches!(zero_books.validate(), Err(BabelError::EmptyAddressSpace)));

        let zero_pages = LibraryConfig { pages_per_book: 0, ..LibraryConfig::default() };
        assert!(matches!(zero_pages.validate(), Err(BabelError::InvalidLayout(_))));

        let zero_cache = LibraryConfig { cache_threshold: Some(0), ..LibraryConfig::default() };
        assert!(zero_cache.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(LibraryConfig::from_json("{ nope"), Err(BabelError::Config(_))));
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        fs::write(&path, r#"{ "bounds": { "rooms": 2, "shelves": 2, "books": 2 }, "seed": 7 }"#).unwrap();
        let config = LibraryConfig::from_path(&path).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.space().unwrap().len(), 8);
    }
}
