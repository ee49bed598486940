use std::fmt::Write;

use crate::types::{ScanBatchResult, ScanResult};

/// Plain-text table for one target's result.
pub fn render_result(target: &str, result: &ScanResult) -> String {
    let rows: Vec<[String; 4]> = result
        .ports
        .iter()
        .map(|p| {
            let detail = format!("{} {}", p.product, p.version).trim().to_string();
            [
                format!("{}/{}", p.port, p.protocol),
                p.state.clone(),
                p.name.clone(),
                detail,
            ]
        })
        .collect();

    let headers = ["port", "state", "service", "version"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count().min(60));
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "Scan Results for {target}");
    push_row(&mut out, &headers.map(String::from), &widths);
    let rule = widths.map(|w| "-".repeat(w));
    push_row(&mut out, &rule, &widths);
    if rows.is_empty() {
        push_row(
            &mut out,
            &["N/A".into(), "no port info".into(), String::new(), String::new()],
            &widths,
        );
    }
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    for m in &result.os_matches {
        let _ = writeln!(out, "OS guess: {} ({}%)", m.name, m.accuracy);
    }
    out
}

/// Tables for every target in the batch, failed targets included.
pub fn render_batch(batch: &ScanBatchResult) -> String {
    let mut out = String::new();
    for (target, result) in batch {
        match result {
            Some(r) => out.push_str(&render_result(target, r)),
            None => {
                let _ = writeln!(out, "No results returned from scan of {target}.");
            }
        }
        out.push('\n');
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 4], widths: &[usize; 4]) {
    let mut line = String::new();
    for (i, (cell, w)) in cells.iter().zip(widths.iter()).enumerate() {
        let cell: String = cell.chars().take(60).collect();
        if i == 0 {
            let _ = write!(line, "{cell:>w$}", w = *w);
        } else {
            let _ = write!(line, "  {cell:<w$}", w = *w);
        }
    }
    let _ = writeln!(out, "{}", line.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OsMatch, PortRecord};

    fn port(n: u16, state: &str, name: &str) -> PortRecord {
        PortRecord {
            port: n,
            protocol: "tcp".into(),
            state: state.into(),
            name: name.into(),
            product: String::new(),
            version: String::new(),
        }
    }

    #[test]
    fn aligned_rows() {
        let r = ScanResult {
            ports: vec![port(22, "open", "ssh"), port(8080, "filtered", "http-proxy")],
            os_matches: vec![OsMatch {
                name: "Linux 5.X".into(),
                accuracy: 96,
            }],
            ..ScanResult::default()
        };
        let out = render_result("10.0.0.1", &r);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Scan Results for 10.0.0.1");
        assert_eq!(lines[1], "    port  state     service     version");
        assert_eq!(lines[3], "  22/tcp  open      ssh");
        assert_eq!(lines[4], "8080/tcp  filtered  http-proxy");
        assert_eq!(lines[5], "OS guess: Linux 5.X (96%)");
    }

    #[test]
    fn failed_targets_are_listed() {
        let mut batch = ScanBatchResult::new();
        batch.insert("10.0.0.2".into(), None);
        batch.insert("10.0.0.1".into(), Some(ScanResult::default()));
        let out = render_batch(&batch);
        assert!(out.contains("No results returned from scan of 10.0.0.2."));
        assert!(out.contains("no port info"));
        assert!(out.find("10.0.0.1").unwrap() < out.find("10.0.0.2").unwrap());
    }
}
