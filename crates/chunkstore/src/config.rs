use serde::{Deserialize, Serialize};

/// Default part size: 4 MiB.
pub const DEFAULT_PART_SIZE: usize = 4 * 1024 * 1024;

/// Default in-memory budget for a reassembled object: 2 MiB.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 2 * 1024 * 1024;

/// What to do when the configured pool does not exist yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolPolicy {
    /// Create the pool on first use.
    #[default]
    CreateIfMissing,
    /// Fail with an I/O error.
    RequireExisting,
}

/// Configuration for a chunked object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend pool holding every blob of this store.
    pub pool: String,
    /// Maximum bytes per part.
    pub part_size: usize,
    /// Whether a missing pool is created or treated as an error.
    pub pool_policy: PoolPolicy,
    /// Bytes of a reassembled object held in memory before spilling to a
    /// temporary file.
    pub spool_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pool: "chunkstore".into(),
            part_size: DEFAULT_PART_SIZE,
            pool_policy: PoolPolicy::default(),
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
        }
    }
}

impl StoreConfig {
    /// Config for `pool` with every other field at its default.
    pub fn with_pool(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            ..Self::default()
        }
    }

    /// Reject configurations the store cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        if self.part_size == 0 {
            return Err(ConfigError::ZeroPartSize);
        }
        Ok(())
    }
}

/// Invalid store configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pool name must not be empty")]
    EmptyPool,

    #[error("part size must be greater than zero")]
    ZeroPartSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.pool, "chunkstore");
        assert_eq!(c.part_size, 4_194_304);
        assert_eq!(c.pool_policy, PoolPolicy::CreateIfMissing);
        assert_eq!(c.spool_threshold, 2 * 1024 * 1024);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_part_size_and_empty_pool() {
        let mut c = StoreConfig::with_pool("p");
        c.part_size = 0;
        assert_eq!(c.validate(), Err(ConfigError::ZeroPartSize));
        assert_eq!(StoreConfig::with_pool("").validate(), Err(ConfigError::EmptyPool));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: StoreConfig = toml::from_str(
            r#"
            pool = "owncloud"
            pool_policy = "require_existing"
            "#,
        )
        .unwrap();
        assert_eq!(c.pool, "owncloud");
        assert_eq!(c.pool_policy, PoolPolicy::RequireExisting);
        assert_eq!(c.part_size, DEFAULT_PART_SIZE);
    }
}
