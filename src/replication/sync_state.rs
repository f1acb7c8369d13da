//! Standby Sync States
//!
//! The primary reports one row per connected standby:
//! `client_addr|sync_percent|sync_state|sync_priority`.

use crate::instance::{InstanceError, InstanceResult};
use serde::{Deserialize, Serialize};

/// Replication mode of one standby as seen by the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    Sync,
    Potential,
    Async,
    Other,
}

impl SyncMode {
    fn parse(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "sync" => SyncMode::Sync,
            "potential" => SyncMode::Potential,
            "async" => SyncMode::Async,
            _ => SyncMode::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Sync => "Sync",
            SyncMode::Potential => "Potential",
            SyncMode::Async => "Async",
            SyncMode::Other => "Other",
        }
    }
}

/// Replication state of one standby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub ip: String,
    pub percent_caught: u8,
    pub state: SyncMode,
    pub priority: u32,
}

impl SyncState {
    pub fn is_sync(&self) -> bool {
        self.state == SyncMode::Sync
    }

    /// Render as a query output row.
    pub fn to_row(&self) -> String {
        format!(
            "{}|{}%|{}|{}",
            self.ip,
            self.percent_caught,
            self.state.as_str(),
            self.priority
        )
    }
}

/// Parse query output from `primary` into states ordered by priority.
pub fn parse_sync_states(primary: &str, output: &str) -> InstanceResult<Vec<SyncState>> {
    let mut states = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let columns: Vec<&str> = line.split('|').map(str::trim).collect();
        if columns.len() != 4 {
            return Err(InstanceError::decode(
                primary,
                "sync states",
                format!("expected 4 columns in {line:?}"),
            ));
        }

        let percent = columns[1].trim_end_matches('%');
        let percent_caught = percent
            .parse::<u8>()
            .map_err(|e| InstanceError::decode(primary, "sync states", format!("percent {percent:?}: {e}")))?;
        let priority = columns[3]
            .parse::<u32>()
            .map_err(|e| InstanceError::decode(primary, "sync states", format!("priority {:?}: {e}", columns[3])))?;

        states.push(SyncState {
            ip: columns[0].to_string(),
            percent_caught: percent_caught.min(100),
            state: SyncMode::parse(columns[2]),
            priority,
        });
    }

    states.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.ip.cmp(&b.ip)));
    Ok(states)
}

/// Number of standbys currently synchronous.
pub fn count_sync(states: &[SyncState]) -> usize {
    states.iter().filter(|s| s.is_sync()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows_sorted_by_priority() {
        let output = "10.0.0.3|87%|Potential|2\n10.0.0.2|100%|Sync|1\n\n";
        let states = parse_sync_states("10.0.0.1", output).unwrap();

        assert_eq!(states.len(), 2);
        assert_eq!(states[0].ip, "10.0.0.2");
        assert_eq!(states[0].state, SyncMode::Sync);
        assert_eq!(states[1].percent_caught, 87);
        assert_eq!(count_sync(&states), 1);
    }

    #[test]
    fn test_unknown_mode_is_other() {
        let states = parse_sync_states("10.0.0.1", "10.0.0.2|0%|Quorum|0").unwrap();
        assert_eq!(states[0].state, SyncMode::Other);
    }

    #[test]
    fn test_malformed_rows() {
        assert!(parse_sync_states("10.0.0.1", "10.0.0.2|100%|Sync").is_err());
        assert!(parse_sync_states("10.0.0.1", "10.0.0.2|lots|Sync|1").is_err());
    }

    #[test]
    fn test_empty_output() {
        assert!(parse_sync_states("10.0.0.1", "").unwrap().is_empty());
    }

    #[test]
    fn test_row_rendering_parses_back() {
        let state = SyncState {
            ip: "10.0.0.5".into(),
            percent_caught: 42,
            state: SyncMode::Async,
            priority: 0,
        };
        let parsed = parse_sync_states("10.0.0.1", &state.to_row()).unwrap();
        assert_eq!(parsed, vec![state]);
    }
}
