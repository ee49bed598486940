use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;

use crate::error::ScanError;
use crate::nmapxml;
use crate::sink::{default_sink, Level, Sink};
use crate::types::{ScanRequest, ScanResult, DEFAULT_PORT_RANGE, DEFAULT_SCAN_MODE};

/// Default upper bound on a single nmap run.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(600);

/// The external scanner. Implementations must be cancel-safe: dropping the
/// returned future abandons the scan.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    async fn run(&self, request: &ScanRequest) -> Result<ScanResult, ScanError>;
}

/// Runs the `nmap` binary and decodes its XML report.
#[derive(Clone)]
pub struct NmapEngine {
    program: String,
    timeout: Duration,
    sink: Arc<dyn Sink>,
}

impl Default for NmapEngine {
    fn default() -> Self {
        Self {
            program: "nmap".to_string(),
            timeout: DEFAULT_SCAN_TIMEOUT,
            sink: default_sink(),
        }
    }
}

impl fmt::Debug for NmapEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NmapEngine")
            .field("program", &self.program)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl NmapEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = sink;
        self
    }

    /// Full argument vector passed to nmap for `request`.
    ///
    /// The argument string is split on whitespace; quoting is not supported.
    pub fn command_args(request: &ScanRequest) -> Vec<String> {
        let mut args = vec![
            "-oX".to_string(),
            "-".to_string(),
            "-p".to_string(),
            request.port_range.clone(),
        ];
        args.extend(request.arguments.split_whitespace().map(str::to_string));
        args.push(request.target.clone());
        args
    }
}

#[async_trait]
impl ScanEngine for NmapEngine {
    async fn run(&self, request: &ScanRequest) -> Result<ScanResult, ScanError> {
        let args = Self::command_args(request);
        self.sink
            .emit(Level::Debug, &format!("executing {} {:?}", self.program, args));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ScanError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // On timeout the child future is dropped, which kills nmap.
        let output = time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ScanError::Timeout(self.timeout))?
            .map_err(|source| ScanError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ScanError::Tool {
                code: output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        nmapxml::parse_report(&stdout, &request.target)
    }
}

/// Scans one target at a time, turning every failure into `None` plus a
/// warning on the sink.
#[derive(Clone)]
pub struct ScanClient {
    engine: Arc<dyn ScanEngine>,
    arguments: String,
    sink: Arc<dyn Sink>,
}

impl ScanClient {
    pub fn new(engine: Arc<dyn ScanEngine>) -> Self {
        Self {
            engine,
            arguments: DEFAULT_SCAN_MODE.to_string(),
            sink: default_sink(),
        }
    }

    /// Client around the real nmap binary.
    pub fn nmap() -> Self {
        Self::new(Arc::new(NmapEngine::default()))
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }

    pub async fn scan(&self, request: &ScanRequest) -> Option<ScanResult> {
        match self.engine.run(request).await {
            Ok(result) => {
                self.sink.emit(
                    Level::Debug,
                    &format!(
                        "scan of {} finished: {} port record(s), {} open",
                        request.target,
                        result.ports.len(),
                        result.open_ports().count()
                    ),
                );
                Some(result)
            }
            Err(e) => {
                self.sink
                    .emit(Level::Warn, &format!("scan error for {}: {e}", request.target));
                None
            }
        }
    }

    /// Scan `target` with this client's argument string.
    pub async fn scan_target(&self, target: &str, port_range: &str) -> Option<ScanResult> {
        let request = ScanRequest::new(target, port_range, self.arguments.clone());
        self.scan(&request).await
    }

    /// Scan `target` over the default port range.
    pub async fn scan_default(&self, target: &str) -> Option<ScanResult> {
        self.scan_target(target, DEFAULT_PORT_RANGE).await
    }

    /// Run one scan and write it as pretty JSON to `path`.
    ///
    /// Returns `Ok(None)` without touching the filesystem when the scan failed.
    pub async fn save_scan(
        &self,
        target: &str,
        path: &Path,
        port_range: &str,
    ) -> anyhow::Result<Option<ScanResult>> {
        let Some(result) = self.scan_target(target, port_range).await else {
            self.sink.emit(Level::Info, "no results to save");
            return Ok(None);
        };
        let json = serde_json::to_string_pretty(&result)?;
        tokio::fs::write(path, json).await?;
        self.sink.emit(
            Level::Info,
            &format!("scan results saved to {}", path.display()),
        );
        Ok(Some(result))
    }
}
