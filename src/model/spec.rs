//! Desired Cluster Specification
//!
//! The declarative object consumed by the reconciler. It is read-only to
//! this crate: defaulting happens through serde, validation through
//! [`super::SpecValidator`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Namespace + name identity of a cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterKey {
    pub namespace: String,
    pub name: String,
}

impl ClusterKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Role of the local site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteRole {
    /// The site hosts the cluster primary.
    #[default]
    PrimarySite,
    /// The site replicates from a remote primary site and never elects a
    /// primary of its own.
    StandbySite,
}

impl SiteRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteRole::PrimarySite => "primary-site",
            SiteRole::StandbySite => "standby-site",
        }
    }
}

/// One local instance slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    pub ip: String,
    /// Scheduling hint passed through to the orchestration platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_hint: Option<String>,
    /// Secondary address published for cross-site replication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extend_ip: Option<String>,
}

impl InstanceSpec {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            placement_hint: None,
            extend_ip: None,
        }
    }
}

/// Per-cluster timeouts. All values are seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleConfig {
    /// Budget for pod-level waits (unit running, process ready).
    pub process_timeout_secs: u64,
    /// Grace period granted to a unit on deletion.
    pub grace_period_secs: u64,
    /// How long an unreachable node is tolerated before its units are
    /// rescheduled by the platform.
    pub toleration_secs: u64,
    /// Sustained under-replication needed before most-available turns on.
    pub most_available_timeout_secs: u64,
    /// Interval between polls in pod-level and most-available loops.
    pub poll_interval_secs: u64,
    pub liveness_period_secs: u64,
    pub readiness_period_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            process_timeout_secs: 300,
            grace_period_secs: 30,
            toleration_secs: 300,
            most_available_timeout_secs: 60,
            poll_interval_secs: 10,
            liveness_period_secs: 10,
            readiness_period_secs: 10,
        }
    }
}

impl ScheduleConfig {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn most_available_timeout(&self) -> Duration {
        Duration::from_secs(self.most_available_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Desired placement of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredTopology {
    /// Local instance slots. Order carries no meaning.
    pub local: Vec<InstanceSpec>,
    /// Remote-site IPs in synchronous-target priority order.
    #[serde(default)]
    pub remote_ips: Vec<String>,
    #[serde(default)]
    pub local_role: SiteRole,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl DesiredTopology {
    /// Local IPs as a sorted set.
    pub fn local_ips(&self) -> BTreeSet<String> {
        self.local.iter().map(|i| i.ip.clone()).collect()
    }

    pub fn contains_local(&self, ip: &str) -> bool {
        self.local.iter().any(|i| i.ip == ip)
    }

    pub fn is_standby_site(&self) -> bool {
        self.local_role == SiteRole::StandbySite
    }
}

/// Compute and storage sizing for every instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    pub cpu_millis: u32,
    pub memory_mib: u32,
    pub storage_gib: u32,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            cpu_millis: 1000,
            memory_mib: 2048,
            storage_gib: 10,
        }
    }
}

/// Client-facing service ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    pub write_port: u16,
    pub read_port: u16,
}

impl Default for ServiceSpec {
    fn default() -> Self {
        Self {
            write_port: 30001,
            read_port: 30002,
        }
    }
}

fn default_image() -> String {
    "database:latest".to_string()
}

fn default_port() -> u16 {
    5432
}

/// Complete desired state of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub key: ClusterKey,
    pub topology: DesiredTopology,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default)]
    pub resources: Resources,
    /// Client port; replication listens on `port + 1`.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub service: ServiceSpec,
    /// User database parameters applied to every instance.
    #[serde(default)]
    pub db_config: BTreeMap<String, String>,
    /// Backup file to restore from. Changing it triggers a restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_file: Option<String>,
    #[serde(default)]
    pub maintenance: bool,
}

impl ClusterSpec {
    /// Minimal spec with default sizing.
    pub fn new(key: ClusterKey, local_ips: &[&str]) -> Self {
        Self {
            key,
            topology: DesiredTopology {
                local: local_ips.iter().map(|ip| InstanceSpec::new(*ip)).collect(),
                remote_ips: Vec::new(),
                local_role: SiteRole::PrimarySite,
                schedule: ScheduleConfig::default(),
            },
            image: default_image(),
            resources: Resources::default(),
            port: default_port(),
            service: ServiceSpec::default(),
            db_config: BTreeMap::new(),
            restore_file: None,
            maintenance: false,
        }
    }

    /// Port basebackup sources and replication peers listen on.
    pub fn replication_port(&self) -> u16 {
        self.port.saturating_add(1)
    }
}
