//! Store configuration structures.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{
    DEFAULT_HASH_INITIAL_SIZE, DEFAULT_HASH_LOAD_FACTOR, DEFAULT_PAGE_SIZE, MAX_HASH_LOAD_FACTOR,
    MAX_PAGE_SIZE, MIN_HASH_LOAD_FACTOR, MIN_PAGE_SIZE,
};
use crate::error::{StoreError, StoreResult};

/// Main store configuration.
///
/// # Example
///
/// ```rust
/// use strata_common::config::StoreConfig;
///
/// let config = StoreConfig::default();
/// assert_eq!(config.page_size, 256);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of cells in one page of every paged array.
    /// Must be a power of 2. Default: 256
    pub page_size: usize,

    /// Hash index tuning.
    pub hash: HashIndexConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            hash: HashIndexConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Creates a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with small pages, so tests cross page
    /// boundaries quickly.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            page_size: MIN_PAGE_SIZE,
            hash: HashIndexConfig {
                initial_size: 5,
                ..HashIndexConfig::default()
            },
        }
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the hash index configuration.
    #[must_use]
    pub fn with_hash(mut self, hash: HashIndexConfig) -> Self {
        self.hash = hash;
        self
    }

    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Converts the configuration to a TOML string.
    pub fn to_toml(&self) -> StoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> StoreResult<()> {
        if !self.page_size.is_power_of_two() {
            return Err(StoreError::invalid_config("page_size must be a power of 2"));
        }

        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(StoreError::invalid_config(format!(
                "page_size must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}"
            )));
        }

        self.hash.validate()
    }
}

/// Hash index configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashIndexConfig {
    /// Bucket count of a fresh index. Must be prime.
    /// Default: 37
    pub initial_size: usize,

    /// Occupancy ratio that triggers growth or rehash.
    /// Default: 0.75
    pub load_factor: f64,
}

impl Default for HashIndexConfig {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_HASH_INITIAL_SIZE,
            load_factor: DEFAULT_HASH_LOAD_FACTOR,
        }
    }
}

impl HashIndexConfig {
    /// Validates the hash index configuration.
    pub fn validate(&self) -> StoreResult<()> {
        if self.initial_size < 3 || !is_prime(self.initial_size) {
            return Err(StoreError::invalid_config(
                "hash.initial_size must be a prime of at least 3",
            ));
        }

        if !(MIN_HASH_LOAD_FACTOR..=MAX_HASH_LOAD_FACTOR).contains(&self.load_factor) {
            return Err(StoreError::invalid_config(format!(
                "hash.load_factor must be between {MIN_HASH_LOAD_FACTOR} and {MAX_HASH_LOAD_FACTOR}"
            )));
        }

        Ok(())
    }
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}
