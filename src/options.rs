use serde::Deserialize;

use crate::types::DEFAULT_SCAN_MODE;

/// Stealth preferences translated into nmap flags by [`build_arguments`].
///
/// Values are not validated. An out-of-range timing template is passed to
/// nmap as-is and surfaces later as a failed scan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub decoy: Option<String>,
    pub fragmentation: bool,
    pub idle_zombie: Option<String>,
    pub timing: Option<u8>,
    pub source_port: Option<u16>,
    pub ttl: Option<u8>,
    pub scan_mode: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            decoy: None,
            fragmentation: false,
            idle_zombie: None,
            timing: None,
            source_port: None,
            ttl: None,
            scan_mode: DEFAULT_SCAN_MODE.to_string(),
        }
    }
}

impl ScanOptions {
    /// Random decoys, fragmented packets and the slowest practical timing.
    pub fn paranoid() -> Self {
        Self {
            decoy: Some("RND:10".to_string()),
            fragmentation: true,
            timing: Some(1),
            ..Self::default()
        }
    }

    /// Fragmented packets with polite timing.
    pub fn sneaky() -> Self {
        Self {
            fragmentation: true,
            timing: Some(2),
            ..Self::default()
        }
    }

    /// True when no stealth flag is set and the base scan mode will be used.
    pub fn is_plain(&self) -> bool {
        build_fragments(self).is_empty()
    }
}

/// Build the nmap argument string for `opts`.
///
/// Flags appear in a fixed order: `-D`, `-f`, `-sI`, `-T`, `--source-port`,
/// `--ttl`. With nothing set the base scan mode (`-sS` by default) is returned.
pub fn build_arguments(opts: &ScanOptions) -> String {
    let joined = build_fragments(opts).concat();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        opts.scan_mode.trim().to_string()
    } else {
        trimmed.to_string()
    }
}

fn build_fragments(opts: &ScanOptions) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(decoy) = non_empty(opts.decoy.as_deref()) {
        out.push(format!(" -D {decoy}"));
    }
    if opts.fragmentation {
        out.push(" -f".to_string());
    }
    if let Some(zombie) = non_empty(opts.idle_zombie.as_deref()) {
        out.push(format!(" -sI {zombie}"));
    }
    if let Some(t) = opts.timing {
        out.push(format!(" -T{t}"));
    }
    if let Some(port) = opts.source_port {
        out.push(format!(" --source-port {port}"));
    }
    if let Some(ttl) = opts.ttl {
        out.push(format!(" --ttl {ttl}"));
    }
    out
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
