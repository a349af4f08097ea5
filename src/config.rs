//! Filesystem layout and environment-driven defaults.
//!
//! ```text
//! <prefix>/
//!   Cellar/<name>/<version>/   installed kegs
//!   resources/<name>/          verified resource artifacts
//!   bin/ lib/ share/ ...       symlinks into kegs
//! <cache>/
//!   downloads/                 fetched artifacts
//!   build/<name>-<version>/    unpacked sources, removed after install
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-command timeout when `--timeout` is not given
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Manifest directory used when neither `--manifests` nor `SCOBY_FORMULA_PATH` is set
pub const DEFAULT_FORMULA_DIR: &str = "Formula";

/// Detect the install prefix
pub fn detect_prefix() -> PathBuf {
    if let Some(prefix) = std::env::var_os("SCOBY_PREFIX") {
        return PathBuf::from(prefix);
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".scoby"),
        None => PathBuf::from(".scoby"),
    }
}

/// Get the cache directory (~/.cache/scoby/ or equivalent)
pub fn cache_dir() -> PathBuf {
    if let Some(cache) = std::env::var_os("SCOBY_CACHE") {
        PathBuf::from(cache)
    } else if let Some(cache_home) = std::env::var_os("XDG_CACHE_HOME") {
        PathBuf::from(cache_home).join("scoby")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".cache/scoby")
    } else {
        PathBuf::from(".cache/scoby")
    }
}

/// Manifest locations from `SCOBY_FORMULA_PATH` (colon separated), or `./Formula`
pub fn default_manifest_paths() -> Vec<PathBuf> {
    match std::env::var_os("SCOBY_FORMULA_PATH") {
        Some(paths) if !paths.is_empty() => std::env::split_paths(&paths).collect(),
        _ => vec![PathBuf::from(DEFAULT_FORMULA_DIR)],
    }
}

/// Where kegs, links, downloads and build trees live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub prefix: PathBuf,
    pub cache: PathBuf,
}

impl Layout {
    pub fn new(prefix: impl Into<PathBuf>, cache: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            cache: cache.into(),
        }
    }

    /// Layout from the environment, with an optional prefix override
    pub fn from_env(prefix: Option<PathBuf>) -> Self {
        Self::new(prefix.unwrap_or_else(detect_prefix), cache_dir())
    }

    pub fn cellar(&self) -> PathBuf {
        self.prefix.join("Cellar")
    }

    pub fn keg_path(&self, name: &str, version: &str) -> PathBuf {
        self.cellar().join(name).join(version)
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.prefix.join("resources")
    }

    pub fn resource_path(&self, name: &str) -> PathBuf {
        self.resources_dir().join(name)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.cache.join("downloads")
    }

    pub fn build_path(&self, name: &str, version: &str) -> PathBuf {
        self.cache.join("build").join(format!("{}-{}", name, version))
    }

    /// Create the top-level directories
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            self.cellar(),
            self.resources_dir(),
            self.downloads_dir(),
            self.cache.join("build"),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }
}
