//! Install receipts.
//!
//! Every successfully installed keg gets an `INSTALL_RECEIPT.json` recording
//! what was installed, from which artifact, and why:
//!
//! ```text
//! <prefix>/Cellar/dotcat/0.9.6/
//!   INSTALL_RECEIPT.json
//!   bin/
//! ```

use crate::manifest::Package;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    pub source_url: String,
    pub source_sha256: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    pub installed_on_request: bool,
    pub installed_as_dependency: bool,
    /// Unix timestamp of the install
    pub time: i64,
    pub scoby_version: String,
}

impl InstallReceipt {
    pub fn new(package: &Package, on_request: bool) -> Self {
        Self {
            name: package.name.clone(),
            version: package.version.to_string(),
            source_url: package.url.clone(),
            source_sha256: package.sha256.clone(),
            dependencies: package.depends_on.iter().cloned().collect(),
            resources: package.resources.clone(),
            installed_on_request: on_request,
            installed_as_dependency: !on_request,
            time: chrono::Utc::now().timestamp(),
            scoby_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn write(&self, keg: &Path) -> Result<()> {
        let path = keg.join(RECEIPT_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write receipt: {}", path.display()))
    }

    pub fn read(keg: &Path) -> Result<Self> {
        let path = keg.join(RECEIPT_FILE);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read receipt: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse receipt: {}", path.display()))
    }
}
