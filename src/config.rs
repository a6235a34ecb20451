// ⚙️ Loader configuration
// Defaults < environment < CLI flags

use std::env;
use std::path::PathBuf;

pub const ENV_DATA_DIR: &str = "POS_DATA_DIR";
pub const ENV_CACHE_DIR: &str = "POS_CACHE_DIR";
pub const ENV_NO_CACHE: &str = "POS_NO_CACHE";

/// Default location of the columnar cache, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "data/cleaned";

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Directory holding the four raw report exports. `None` means auto-detect.
    pub data_dir: Option<PathBuf>,

    /// Root of the Parquet cache; one subdirectory per content key.
    pub cache_dir: PathBuf,

    pub use_cache: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            data_dir: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            use_cache: true,
        }
    }
}

impl LoaderConfig {
    /// Defaults overridden by `POS_DATA_DIR`, `POS_CACHE_DIR` and `POS_NO_CACHE`.
    pub fn from_env() -> Self {
        let mut config = LoaderConfig::default();

        if let Some(dir) = non_empty_var(ENV_DATA_DIR) {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = non_empty_var(ENV_CACHE_DIR) {
            config.cache_dir = PathBuf::from(dir);
        }
        if non_empty_var(ENV_NO_CACHE).is_some() {
            config.use_cache = false;
        }

        config
    }

    /// Builder pattern: pin the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Builder pattern: move the cache root
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Builder pattern: always re-parse
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
