//! Spec Validation
//!
//! Checks a desired spec against the topology invariants and checks a
//! spec change against the previously reconciled spec. The table of
//! operator-managed database parameters is built once at start-up and
//! injected; nothing here keeps global state.

use super::errors::{ValidationError, ValidationResult};
use super::spec::{ClusterSpec, SiteRole};
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

pub const MIN_CPU_MILLIS: u32 = 500;
pub const MIN_MEMORY_MIB: u32 = 1024;
pub const MIN_STORAGE_GIB: u32 = 1;

const MIN_PORT: u16 = 1024;
// Replication listens on port + 1.
const MAX_PORT: u16 = 65534;

const STANDARD_EXACT: [&str; 11] = [
    "port",
    "listen_addresses",
    "data_directory",
    "hba_file",
    "synchronous_standby_names",
    "most_available_sync",
    "synchronous_commit",
    "replication_type",
    "wal_level",
    "max_wal_senders",
    "hot_standby",
];

const STANDARD_PATTERNS: &[&str] = &[r"^(replconninfo|repl_conn_info)\d+$"];

/// Database parameters users may not set through `db_config`.
#[derive(Debug)]
pub struct ReservedParameters {
    exact: BTreeSet<String>,
    patterns: Vec<Regex>,
}

impl ReservedParameters {
    /// Build a table from exact names and regex patterns.
    pub fn new<I, S>(exact: I, patterns: &[&str]) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            exact: exact.into_iter().map(|s| s.into().to_ascii_lowercase()).collect(),
            patterns,
        })
    }

    /// The parameters the reconciler itself manages.
    pub fn standard() -> Result<Self, regex::Error> {
        Self::new(STANDARD_EXACT, STANDARD_PATTERNS)
    }

    /// `key` is managed by the operator.
    pub fn is_reserved(&self, key: &str) -> bool {
        let key = key.trim().to_ascii_lowercase();
        self.exact.contains(&key) || self.patterns.iter().any(|p| p.is_match(&key))
    }
}

/// Validates specs and spec changes.
#[derive(Debug, Clone)]
pub struct SpecValidator {
    reserved: Arc<ReservedParameters>,
}

impl SpecValidator {
    pub fn new(reserved: Arc<ReservedParameters>) -> Self {
        Self { reserved }
    }

    /// Check every invariant of a single spec.
    pub fn validate(&self, spec: &ClusterSpec) -> ValidationResult<()> {
        let topology = &spec.topology;

        if topology.local.is_empty() {
            return Err(ValidationError::EmptyLocalSet);
        }
        if topology.local_role == SiteRole::StandbySite && topology.remote_ips.is_empty() {
            return Err(ValidationError::MissingRemoteIps);
        }

        let mut seen = HashSet::new();
        let all_ips = topology
            .local
            .iter()
            .map(|i| &i.ip)
            .chain(topology.remote_ips.iter());
        for ip in all_ips {
            check_ip(ip)?;
            if !seen.insert(ip.as_str()) {
                return Err(ValidationError::DuplicateIp { ip: ip.clone() });
            }
        }
        for extend in topology.local.iter().filter_map(|i| i.extend_ip.as_ref()) {
            check_ip(extend)?;
        }

        check_port("port", spec.port)?;
        check_port("service.writePort", spec.service.write_port)?;
        check_port("service.readPort", spec.service.read_port)?;

        check_min("resources.cpuMillis", spec.resources.cpu_millis, MIN_CPU_MILLIS)?;
        check_min("resources.memoryMib", spec.resources.memory_mib, MIN_MEMORY_MIB)?;
        check_min("resources.storageGib", spec.resources.storage_gib, MIN_STORAGE_GIB)?;

        if let Some(key) = spec.db_config.keys().find(|k| self.reserved.is_reserved(k)) {
            return Err(ValidationError::ReservedParameter { key: key.clone() });
        }

        Ok(())
    }

    /// Check a change from the last reconciled spec to a new one.
    pub fn validate_change(&self, previous: &ClusterSpec, next: &ClusterSpec) -> ValidationResult<()> {
        if next.port != previous.port {
            return Err(ValidationError::ImmutableField { field: "port" });
        }
        if next.resources.storage_gib < previous.resources.storage_gib {
            return Err(ValidationError::StorageShrink {
                from: previous.resources.storage_gib,
                to: next.resources.storage_gib,
            });
        }
        Ok(())
    }
}

fn check_ip(ip: &str) -> ValidationResult<()> {
    ip.parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| ValidationError::MalformedIp { ip: ip.to_string() })
}

fn check_port(field: &'static str, value: u16) -> ValidationResult<()> {
    if (MIN_PORT..=MAX_PORT).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::PortOutOfRange {
            field,
            value,
            min: MIN_PORT,
            max: MAX_PORT,
        })
    }
}

fn check_min(field: &'static str, value: u32, min: u32) -> ValidationResult<()> {
    if value >= min {
        Ok(())
    } else {
        Err(ValidationError::BelowMinimum { field, value, min })
    }
}
