//! Library crate for nmap-batch-rs exposing reusable modules.
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logger;
pub mod nmapxml;
pub mod options;
pub mod ports;
pub mod sink;
pub mod table;
pub mod targets;
pub mod types;

pub use client::{NmapEngine, ScanClient, ScanEngine};
pub use dispatcher::ScanDispatcher;
pub use error::{DispatchError, LogError, ScanError};
pub use logger::{LogFormat, ResultLogger};
pub use options::{build_arguments, ScanOptions};
pub use types::{ScanBatchResult, ScanRequest, ScanResult};
