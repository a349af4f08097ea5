//! Library interface for the scoby formula installer
//!
//! Loading, resolution, execution and verification are exposed here so the
//! binary and the integration tests drive the same code.

pub mod cancel;
pub mod colors;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod fetch;
pub mod link;
pub mod manifest;
pub mod receipt;
pub mod report;
pub mod resolve;
pub mod runner;
pub mod verify;

// Re-export commonly used items
pub use cancel::CancelToken;
pub use config::Layout;
pub use error::{InstallError, LoadError, ResolveError, ScobyError};
pub use executor::{ExecuteOptions, Executor, InstallEnv, InstallOutcome, InstallResults};
pub use link::normalize_path;
pub use manifest::{DependencyGraph, ManifestSource};
pub use resolve::{InstallPlan, resolve};
pub use verify::{TestReports, Verifier};
