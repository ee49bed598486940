//! Diagnostic sinks handed to each component at construction.
//!
//! Components never configure logging themselves. The binary installs
//! `env_logger` once and passes a [`LogSink`]; tests pass a [`MemorySink`].
use std::sync::{Arc, Mutex};

pub use log::Level;

/// Receiver for human-readable diagnostics.
pub trait Sink: Send + Sync {
    fn emit(&self, level: Level, message: &str);
}

/// Forwards diagnostics to the `log` facade under the `nmap_batch` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn emit(&self, level: Level, message: &str) {
        log::log!(target: "nmap_batch", level, "{message}");
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Messages at `level` containing `needle`.
    pub fn count_matching(&self, level: Level, needle: &str) -> usize {
        self.records()
            .iter()
            .filter(|(l, m)| *l == level && m.contains(needle))
            .count()
    }
}

impl Sink for MemorySink {
    fn emit(&self, level: Level, message: &str) {
        if let Ok(mut r) = self.records.lock() {
            r.push((level, message.to_string()));
        }
    }
}

/// Default sink for components built without an explicit one.
pub fn default_sink() -> Arc<dyn Sink> {
    Arc::new(LogSink)
}
