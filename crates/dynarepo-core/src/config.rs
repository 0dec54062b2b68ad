//! Repository and in-memory store configuration.

use std::env;

/// Defaults applied to every request a repository issues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Items requested per page for `query` and `scan`. `None` lets the
    /// store decide.
    pub page_size: Option<u32>,
    /// Ask for strongly consistent reads.
    pub consistent_read: bool,
}

impl RepositoryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `DYNAREPO_PAGE_SIZE`: positive integer
    /// - `DYNAREPO_CONSISTENT_READ`: `1`, `true` or `yes`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            page_size: lookup("DYNAREPO_PAGE_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0),
            consistent_read: lookup("DYNAREPO_CONSISTENT_READ").is_some_and(|v| is_truthy(&v)),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    #[must_use]
    pub fn with_consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }
}

/// Configuration of [`MemoryClient`](crate::memory::MemoryClient).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStoreConfig {
    /// Page cap applied when a query or scan carries no limit.
    pub default_page_size: Option<usize>,
}

impl MemoryStoreConfig {
    /// Create configuration from `DYNAREPO_MEMORY_PAGE_SIZE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            default_page_size: lookup("DYNAREPO_MEMORY_PAGE_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes" | "TRUE" | "YES")
}
