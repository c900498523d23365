//! Runtime limits and logging settings, read from the environment.

/// Default cap on a single source file.
pub const DEFAULT_MAX_SOURCE_SIZE: u64 = 10 << 20;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1 << 30;
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Source files larger than this many bytes are rejected.
    pub max_source_size: u64,
    /// Nested call frames across all executing modules.
    pub max_call_depth: usize,
    /// Largest buffer `__buffer_new` will allocate, in bytes.
    pub max_buffer_size: usize,
    /// `tracing-subscriber` filter directive for the `gsc` binary.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_source_size: DEFAULT_MAX_SOURCE_SIZE,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by `GSC_MAX_SOURCE_SIZE`, `GSC_MAX_CALL_DEPTH`,
    /// `GSC_MAX_BUFFER_SIZE` and `GSC_LOG`. Unparsable numbers keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(size) = lookup("GSC_MAX_SOURCE_SIZE").and_then(|v| v.trim().parse().ok()) {
            config.max_source_size = size;
        }
        if let Some(depth) = lookup("GSC_MAX_CALL_DEPTH").and_then(|v| v.trim().parse().ok()) {
            config.max_call_depth = depth;
        }
        if let Some(size) = lookup("GSC_MAX_BUFFER_SIZE").and_then(|v| v.trim().parse().ok()) {
            config.max_buffer_size = size;
        }
        if let Some(filter) = lookup("GSC_LOG").filter(|v| !v.trim().is_empty()) {
            config.log_filter = filter;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_env() {
        assert_eq!(config_from(&[]), Config::default());
        assert_eq!(Config::default().max_source_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("GSC_MAX_SOURCE_SIZE", "1024"),
            ("GSC_MAX_CALL_DEPTH", "64"),
            ("GSC_MAX_BUFFER_SIZE", "4096"),
            ("GSC_LOG", "gscript=debug"),
        ]);
        assert_eq!(config.max_buffer_size, 4096);
        assert_eq!(config.max_source_size, 1024);
        assert_eq!(config.max_call_depth, 64);
        assert_eq!(config.log_filter, "gscript=debug");
    }

    #[test]
    fn test_bad_numbers_keep_defaults() {
        let config = config_from(&[("GSC_MAX_CALL_DEPTH", "lots"), ("GSC_LOG", "  ")]);
        assert_eq!(config, Config::default());
    }
}
