//! Store configuration via `folio.toml`
//!
//! A config file lives in the store directory. On first open, a default
//! `folio.toml` is created. To change settings, edit the file and reopen
//! the store.

use folio_core::{FolioError, FolioResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "folio.toml";

/// How eagerly saves reach the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// Atomic rename only; an OS crash may lose the last save
    Standard,
    /// fsync the store file on every save
    Always,
}

/// Store configuration loaded from `folio.toml`.
///
/// # Example
///
/// ```toml
/// durability = "standard"
/// cache_dir = "cache"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Durability mode: `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Directory (relative to the store directory) holding layout caches.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

fn default_cache_dir() -> String {
    "cache".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl StoreConfig {
    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"standard"` or `"always"`.
    pub fn durability_mode(&self) -> FolioResult<DurabilityMode> {
        match self.durability.as_str() {
            "standard" => Ok(DurabilityMode::Standard),
            "always" => Ok(DurabilityMode::Always),
            other => Err(FolioError::Config(format!(
                "invalid durability mode '{}' in folio.toml, expected \"standard\" or \"always\"",
                other
            ))),
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Folio store configuration
#
# Durability mode: "standard" (default) or "always"
#   "standard" = atomic rename only, an OS crash may lose the last save
#   "always"   = fsync the store file on every save
durability = "standard"

# Directory (relative to the store directory) holding layout caches.
cache_dir = "cache"
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> FolioResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FolioError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            FolioError::Config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        // Validate the durability value eagerly
        config.durability_mode()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> FolioResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                FolioError::Config(format!(
                    "failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}
