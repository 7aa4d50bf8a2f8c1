use std::path::PathBuf;
use thiserror::Error;

use crate::address::Address;

#[derive(Error, Debug)]
pub enum BabelError {
    // Config
    #[error("invalid worker count: {0}")]
    InvalidWorkerCount(usize),

    #[error("address space is empty")]
    EmptyAddressSpace,

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("invalid candidate length range {min}..={max}")]
    InvalidLengthRange { min: usize, max: usize },

    #[error("empty search target")]
    EmptyTarget,

    #[error("no library provided")]
    MissingLibrary,

    #[error("address out of range: {0}")]
    AddressOutOfRange(Address),

    #[error("invalid config: {0}")]
    Config(String),

    // Runtime
    #[error("worker failure: {0}")]
    Worker(String),

    // Load phase
    #[error("failed to load corpus {}", path.display())]
    CorpusLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BabelError {
    /// Whether the caller can continue after this error.
    ///
    /// A corpus that fails to load degrades to an empty context model.
    /// Everything else is a configuration or runtime failure reported
    /// before (or instead of) a search result.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CorpusLoad { .. })
    }

    /// Whether this error was raised while validating inputs, before any
    /// worker started.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Worker(_) | Self::CorpusLoad { .. })
    }
}
