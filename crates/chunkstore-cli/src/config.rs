use std::path::{Path, PathBuf};

use anyhow::Context;
use chunkstore::StoreConfig;
use serde::{Deserialize, Serialize};

/// Default location of the CLI configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "chunkstore.toml";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub store: StoreConfig,
    pub backend: BackendConfig,
}

/// Where the directory backend keeps its pools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub root: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".chunkstore"),
        }
    }
}

impl CliConfig {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        config
            .store
            .validate()
            .with_context(|| format!("invalid [store] in {}", path.display()))?;
        Ok(config)
    }
}
