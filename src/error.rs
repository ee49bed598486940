use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a single nmap scan produced no result.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("nmap exited with {code}: {stderr}")]
    Tool { code: String, stderr: String },

    #[error("nmap did not finish within {0:?}")]
    Timeout(Duration),

    #[error("could not decode nmap output: {0}")]
    Decode(String),

    #[error("no data returned for {0}")]
    NoData(String),
}

/// A dispatch that did not run to completion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatch cancelled before all scans finished")]
    Cancelled,
}

/// Failure to persist a result. Never swallowed: a lost log is lost data.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("log file already exists: {0}")]
    Exists(PathBuf),
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }
}
