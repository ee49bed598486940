//! File-based settings, overridden by command-line flags in `main`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::DEFAULT_SCAN_TIMEOUT;
use crate::logger::{Collision, LogFormat, DEFAULT_LOG_DIR};
use crate::options::ScanOptions;
use crate::sink::{Level, Sink};
use crate::types::DEFAULT_PORT_RANGE;

/// File name looked up in the home directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = ".nmap-batch.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path to the nmap binary.
    pub nmap_path: String,
    pub port_range: String,
    pub log_dir: PathBuf,
    pub formats: Vec<LogFormat>,
    /// Write a record for targets that returned nothing.
    pub log_failures: bool,
    /// Cap on simultaneous nmap processes; unset means one per target.
    pub max_concurrency: Option<usize>,
    pub timeout_secs: u64,
    pub collision: Collision,
    pub stealth: ScanOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nmap_path: "nmap".to_string(),
            port_range: DEFAULT_PORT_RANGE.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            formats: vec![LogFormat::Json],
            log_failures: false,
            max_concurrency: None,
            timeout_secs: DEFAULT_SCAN_TIMEOUT.as_secs(),
            collision: Collision::default(),
            stealth: ScanOptions::default(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("failed to parse TOML settings")
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Explicit path if given, else `~/.nmap-batch.toml` when present, else defaults.
    ///
    /// An explicit path that cannot be read is an error; a broken file in the
    /// home directory is reported on `sink` and ignored.
    pub fn load(explicit: Option<&Path>, sink: &dyn Sink) -> Result<Self> {
        if let Some(path) = explicit {
            let s = Self::from_toml_file(path)?;
            sink.emit(Level::Info, &format!("loaded config from {}", path.display()));
            return Ok(s);
        }
        match dirs::home_dir() {
            Some(home) => Ok(Self::load_home(&home.join(DEFAULT_CONFIG_FILE), sink)),
            None => Ok(Self::default()),
        }
    }

    fn load_home(candidate: &Path, sink: &dyn Sink) -> Self {
        if !candidate.exists() {
            return Self::default();
        }
        match Self::from_toml_file(candidate) {
            Ok(s) => {
                sink.emit(
                    Level::Info,
                    &format!("loaded config from {}", candidate.display()),
                );
                s
            }
            Err(e) => {
                sink.emit(
                    Level::Warn,
                    &format!("ignoring {}: {e:#}", candidate.display()),
                );
                Self::default()
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}
