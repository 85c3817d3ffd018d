//! Cache configuration.
//!
//! The enable switch is injected into the executor rather than read from
//! ambient process state, so behavior is testable without mutating globals.
//! There is no per-request override.

use serde::Deserialize;

/// Cache configuration from `brezza.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the compile cache. When disabled the executor neither reads
    /// nor writes the store and every query runs the handler.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_by_default() {
        assert!(CacheConfig::default().enabled);
    }
}
