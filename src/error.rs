use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading manifests. Fatal: nothing has been installed yet.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("Package '{name}' declared with conflicting checksums in {first} and {second}")]
    DuplicatePackage {
        name: String,
        first: String,
        second: String,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while computing an install plan. Fatal: nothing has been installed yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("{}", unresolved_message(.name, .required_by.as_deref(), .suggestion.as_deref()))]
    Unresolved {
        name: String,
        required_by: Option<String>,
        suggestion: Option<String>,
    },
}

fn unresolved_message(name: &str, required_by: Option<&str>, suggestion: Option<&str>) -> String {
    let mut msg = match required_by {
        Some(parent) => format!("Unresolved dependency '{}' (required by {})", name, parent),
        None => format!("Formula not found: {}", name),
    };
    if let Some(s) = suggestion {
        msg.push_str(&format!(". Did you mean '{}'?", s));
    }
    msg
}

/// Per-package install failure. Recorded in the package's outcome, never aborts the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error("Download failed: {0}")]
    Fetch(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Failed to unpack source: {0}")]
    Unpack(String),

    #[error("`{}` exited with {}{}", .argv.join(" "), exit_status(.status), stderr_suffix(.stderr_tail))]
    StepFailed {
        argv: Vec<String>,
        status: Option<i32>,
        stderr_tail: String,
    },

    #[error("Failed to run {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("`{}` timed out after {}s", .argv.join(" "), .after.as_secs())]
    Timeout { argv: Vec<String>, after: Duration },

    #[error("Failed to link: {0}")]
    Link(String),
}

fn exit_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {}", tail)
    }
}

#[derive(Error, Debug)]
pub enum ScobyError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ScobyError {
    /// Process exit code for errors that end the run before any install.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScobyError::Load(_) | ScobyError::Resolve(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScobyError>;
