//! Decoding of `nmap -oX -` reports.
//!
//! Only the parts of the schema that end up in a [`ScanResult`] are modelled;
//! every other element and attribute is ignored.
use serde::Deserialize;

use crate::error::ScanError;
use crate::types::{OsMatch, PortRecord, ScanResult};

#[derive(Debug, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<Host>,
    #[serde(default)]
    runstats: Option<RunStats>,
}

#[derive(Debug, Deserialize)]
struct RunStats {
    #[serde(default)]
    finished: Option<Finished>,
}

#[derive(Debug, Deserialize)]
struct Finished {
    #[serde(rename = "@exit", default)]
    exit: Option<String>,
    #[serde(rename = "@errormsg", default)]
    errormsg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Host {
    #[serde(default)]
    status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    addresses: Vec<Address>,
    #[serde(default)]
    hostnames: Option<Hostnames>,
    #[serde(default)]
    ports: Option<Ports>,
    #[serde(default)]
    os: Option<Os>,
}

#[derive(Debug, Deserialize)]
struct HostStatus {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct Address {
    #[serde(rename = "@addr")]
    addr: String,
    #[serde(rename = "@addrtype", default)]
    addr_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hostnames {
    #[serde(rename = "hostname", default)]
    hostnames: Vec<Hostname>,
}

#[derive(Debug, Deserialize)]
struct Hostname {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Ports {
    #[serde(rename = "port", default)]
    ports: Vec<Port>,
}

#[derive(Debug, Deserialize)]
struct Port {
    #[serde(rename = "@protocol")]
    protocol: String,
    #[serde(rename = "@portid")]
    portid: u16,
    state: PortState,
    #[serde(default)]
    service: Option<Service>,
}

#[derive(Debug, Deserialize)]
struct PortState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct Service {
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@product", default)]
    product: Option<String>,
    #[serde(rename = "@version", default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Os {
    #[serde(rename = "osmatch", default)]
    matches: Vec<OsMatchXml>,
}

#[derive(Debug, Deserialize)]
struct OsMatchXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@accuracy")]
    accuracy: u8,
}

impl Host {
    fn matches(&self, target: &str) -> bool {
        self.addresses.iter().any(|a| a.addr == target)
            || self
                .hostnames
                .iter()
                .flat_map(|h| h.hostnames.iter())
                .any(|h| h.name.eq_ignore_ascii_case(target))
    }

    fn into_result(self) -> ScanResult {
        // Prefer the IP address over a MAC address when both are reported.
        let address = self
            .addresses
            .iter()
            .find(|a| a.addr_type.as_deref() != Some("mac"))
            .or_else(|| self.addresses.first())
            .map(|a| a.addr.clone());
        let hostnames = self
            .hostnames
            .map(|h| h.hostnames.into_iter().map(|n| n.name).collect())
            .unwrap_or_default();
        let ports = self
            .ports
            .map(|p| p.ports)
            .unwrap_or_default()
            .into_iter()
            .map(|p| {
                let service = p.service.unwrap_or(Service {
                    name: None,
                    product: None,
                    version: None,
                });
                PortRecord {
                    port: p.portid,
                    protocol: p.protocol,
                    state: p.state.state,
                    name: service.name.unwrap_or_default(),
                    product: service.product.unwrap_or_default(),
                    version: service.version.unwrap_or_default(),
                }
            })
            .collect();
        let os_matches = self
            .os
            .map(|o| o.matches)
            .unwrap_or_default()
            .into_iter()
            .map(|m| OsMatch {
                name: m.name,
                accuracy: m.accuracy,
            })
            .collect();
        ScanResult {
            address,
            hostnames,
            status: self.status.map(|s| s.state),
            ports,
            os_matches,
        }
    }
}

/// Decode an XML report and pick the host that corresponds to `target`.
///
/// A host matches when one of its addresses or hostnames equals `target`.
/// A report with a single host is accepted as-is, since nmap reports the
/// resolved address rather than the name it was given.
pub fn parse_report(xml: &str, target: &str) -> Result<ScanResult, ScanError> {
    let run: NmapRun =
        quick_xml::de::from_str(xml).map_err(|e| ScanError::Decode(e.to_string()))?;

    if let Some(finished) = run.runstats.as_ref().and_then(|r| r.finished.as_ref()) {
        if finished.exit.as_deref() == Some("error") {
            return Err(ScanError::Tool {
                code: "error".to_string(),
                stderr: finished.errormsg.clone().unwrap_or_default(),
            });
        }
    }

    let mut hosts = run.hosts;
    let host = match hosts.iter().position(|h| h.matches(target)) {
        Some(idx) => hosts.swap_remove(idx),
        None if hosts.len() == 1 => hosts.remove(0),
        None => return Err(ScanError::NoData(target.to_string())),
    };
    Ok(host.into_result())
}
