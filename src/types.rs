use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Port range handed to nmap when the caller does not supply one.
pub const DEFAULT_PORT_RANGE: &str = "1-1024";

/// Scan mode used when no stealth option is set.
pub const DEFAULT_SCAN_MODE: &str = "-sS";

/// One nmap invocation: a target, the ports to probe and the extra arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub target: String,
    pub port_range: String,
    pub arguments: String,
}

impl ScanRequest {
    pub fn new(
        target: impl Into<String>,
        port_range: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            port_range: port_range.into(),
            arguments: arguments.into(),
        }
    }
}

/// A single probed port as reported by nmap.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortRecord {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub name: String,
    pub product: String,
    pub version: String,
}

/// An OS fingerprint guess with its accuracy percentage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OsMatch {
    pub name: String,
    pub accuracy: u8,
}

/// Everything nmap told us about one host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanResult {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub ports: Vec<PortRecord>,
    #[serde(default)]
    pub os_matches: Vec<OsMatch>,
}

impl ScanResult {
    pub fn open_ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.ports.iter().filter(|p| p.state == "open")
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "host: {} ({})",
            self.address.as_deref().unwrap_or("unknown"),
            self.status.as_deref().unwrap_or("unknown")
        )?;
        if !self.hostnames.is_empty() {
            writeln!(f, "hostnames: {}", self.hostnames.join(", "))?;
        }
        for p in &self.ports {
            write!(f, "{}/{} {} {}", p.port, p.protocol, p.state, p.name)?;
            let detail = [p.product.as_str(), p.version.as_str()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            if !detail.is_empty() {
                write!(f, " ({detail})")?;
            }
            writeln!(f)?;
        }
        for m in &self.os_matches {
            writeln!(f, "os: {} [{}%]", m.name, m.accuracy)?;
        }
        Ok(())
    }
}

/// Target string to its scan result; `None` marks a target whose scan failed.
pub type ScanBatchResult = BTreeMap<String, Option<ScanResult>>;
