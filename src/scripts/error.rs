//! Error types for script loading, dispatch and change scanning.

use std::path::PathBuf;

/// A reload step failed. The instance keeps whatever it had before the attempt.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("syntax error in {script}: {message}")]
    Parse { script: String, message: String },

    #[error("compile error in {script}: {message}")]
    Compile { script: String, message: String },

    #[error("top-level run of {script} failed: {message}")]
    Run { script: String, message: String },
}

impl ReloadError {
    pub fn step(&self) -> &'static str {
        match self {
            ReloadError::Read { .. } => "read",
            ReloadError::Parse { .. } => "parse",
            ReloadError::Compile { .. } => "compile",
            ReloadError::Run { .. } => "run",
        }
    }
}

/// An entry point raised an error while being dispatched.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("{script}: {entry} failed: {message}")]
pub struct DispatchError {
    pub script: String,
    pub entry: &'static str,
    pub message: String,
}

/// The change scan could not read the script directory.
#[derive(Debug, thiserror::Error)]
#[error("failed to scan script directory {}: {source}", path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
