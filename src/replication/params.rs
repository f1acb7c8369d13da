//! Replication Connection Parameters
//!
//! Every instance gets one `replconninfoN` entry per peer (local peers in
//! IP order, then remote IPs in priority order) and the synchronous
//! standby list `FIRST n ("peer", ...)`. User `db_config` entries are
//! merged in. The set is content-addressed by a SHA-256 digest so that it
//! is only pushed to an instance when it actually changed.
//!
//! `most_available_sync` is deliberately absent: it is owned by the
//! most-available loop and toggled independently.

use super::quorum::required_sync_count;
use crate::model::ClusterSpec;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const SYNC_NAMES_PARAMETER: &str = "synchronous_standby_names";
pub const MOST_AVAILABLE_PARAMETER: &str = "most_available_sync";

/// `FIRST n (a, b, ...)` synchronous standby selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncStandbyNames {
    pub count: usize,
    pub names: Vec<String>,
}

impl SyncStandbyNames {
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.names.is_empty()
    }
}

impl fmt::Display for SyncStandbyNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let quoted: Vec<String> = self.names.iter().map(|n| format!("\"{n}\"")).collect();
        write!(f, "FIRST {} ({})", self.count, quoted.join(","))
    }
}

impl FromStr for SyncStandbyNames {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        let rest = s
            .strip_prefix("FIRST ")
            .ok_or_else(|| format!("unsupported selection {s:?}"))?;
        let (count, list) = rest
            .split_once('(')
            .ok_or_else(|| format!("missing standby list in {s:?}"))?;
        let count = count
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("count in {s:?}: {e}"))?;
        let list = list
            .strip_suffix(')')
            .ok_or_else(|| format!("unterminated standby list in {s:?}"))?;
        let names = list
            .split(',')
            .map(|n| n.trim().trim_matches('"').to_string())
            .filter(|n| !n.is_empty())
            .collect();
        Ok(Self { count, names })
    }
}

/// Parameters pushed to one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationParams {
    entries: BTreeMap<String, String>,
}

impl ReplicationParams {
    /// Build the parameters for the instance at `ip`.
    pub fn for_instance(ip: &str, spec: &ClusterSpec) -> Self {
        let topology = &spec.topology;
        let port = spec.replication_port();
        let mut entries: BTreeMap<String, String> = spec.db_config.clone();

        let local_peers: Vec<String> = topology
            .local_ips()
            .into_iter()
            .filter(|peer| peer != ip)
            .collect();
        let cross_site_host = topology
            .local
            .iter()
            .find(|i| i.ip == ip)
            .and_then(|i| i.extend_ip.clone())
            .unwrap_or_else(|| ip.to_string());

        let mut index = 1;
        for peer in &local_peers {
            entries.insert(format!("replconninfo{index}"), conninfo(ip, peer, port));
            index += 1;
        }
        for remote in &topology.remote_ips {
            entries.insert(format!("replconninfo{index}"), conninfo(&cross_site_host, remote, port));
            index += 1;
        }

        let required = required_sync_count(topology.local.len(), topology.remote_ips.len());
        let names = SyncStandbyNames {
            count: required,
            names: local_peers
                .iter()
                .chain(topology.remote_ips.iter())
                .cloned()
                .collect(),
        };
        entries.insert(SYNC_NAMES_PARAMETER.to_string(), names.to_string());

        Self { entries }
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn into_entries(self) -> BTreeMap<String, String> {
        self.entries
    }

    /// Hex SHA-256 over the sorted `key=value` lines.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.entries {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

fn conninfo(local_host: &str, remote_host: &str, port: u16) -> String {
    format!("localhost={local_host} localport={port} remotehost={remote_host} remoteport={port}")
}
