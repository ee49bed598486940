use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Split target input into individual hosts.
///
/// Targets are separated by commas, whitespace or newlines; everything after
/// `#` on a line is a comment. Order is kept and duplicates are not removed.
pub fn parse_targets_str(s: &str) -> Vec<String> {
    s.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load targets from a file, one or more per line.
pub fn load_targets_from_path(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read targets file: {}", path.as_ref().display()))?;
    Ok(parse_targets_str(&content))
}
