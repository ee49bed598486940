use anyhow::{bail, Context, Result};

/// Check an nmap `-p` specification and return it with whitespace removed.
///
/// Accepted items, separated by commas:
/// - single port: `80`
/// - inclusive range: `8000-8010`, open ranges `-1024`, `60000-` and `-`
/// - protocol prefixes `T:`, `U:`, `S:` applying to the items that follow
/// - service names such as `http` or `ssh*`, resolved by nmap itself
pub fn normalize_port_range(s: &str) -> Result<String> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        bail!("empty port range");
    }

    for (idx, raw_item) in compact.split(',').enumerate() {
        let item_no = idx + 1;
        let item = strip_protocol(raw_item);
        if item.is_empty() {
            bail!("item {item_no}: empty port specification in {compact:?}");
        }

        if is_service_name(item) {
            continue;
        }

        if let Some((a, b)) = item.split_once('-') {
            let start = parse_bound(a)
                .with_context(|| format!("item {item_no}: invalid start in range: {a}"))?;
            let end = parse_bound(b)
                .with_context(|| format!("item {item_no}: invalid end in range: {b}"))?;
            if let (Some(start), Some(end)) = (start, end) {
                if start > end {
                    bail!("item {item_no}: invalid range {start}-{end} (start > end)");
                }
            }
            continue;
        }

        parse_port_str(item)
            .with_context(|| format!("item {item_no}: invalid port value: {item}"))?;
    }

    Ok(compact)
}

fn strip_protocol(item: &str) -> &str {
    for prefix in ["T:", "U:", "S:", "t:", "u:", "s:"] {
        if let Some(rest) = item.strip_prefix(prefix) {
            return rest;
        }
    }
    item
}

fn is_service_name(item: &str) -> bool {
    item.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && item
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '?' | '_' | '-' | '.'))
}

/// An empty bound is an open end of the range.
fn parse_bound(s: &str) -> Result<Option<u16>> {
    if s.is_empty() {
        return Ok(None);
    }
    parse_port_str(s).map(Some)
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_forms() {
        assert_eq!(normalize_port_range("1-1024").unwrap(), "1-1024");
        assert_eq!(normalize_port_range("22, 80, 443").unwrap(), "22,80,443");
        assert_eq!(normalize_port_range("-").unwrap(), "-");
        assert_eq!(normalize_port_range("60000-").unwrap(), "60000-");
        assert_eq!(normalize_port_range("U:53,T:21-25,80").unwrap(), "U:53,T:21-25,80");
        assert_eq!(normalize_port_range("http,ssh*").unwrap(), "http,ssh*");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(normalize_port_range("").is_err());
        assert!(normalize_port_range("70000").is_err());
        assert!(normalize_port_range("100-20").is_err());
        assert!(normalize_port_range("22,,80").is_err());
        assert!(normalize_port_range("22;80").is_err());
    }

    #[test]
    fn digits_never_pass_as_service_names() {
        assert!(normalize_port_range("80-http").is_err());
        assert!(normalize_port_range("1-1024a").is_err());
        assert!(normalize_port_range("8080x").is_err());
        assert_eq!(normalize_port_range("http-alt").unwrap(), "http-alt");
        assert_eq!(normalize_port_range("x11").unwrap(), "x11");
    }
}
