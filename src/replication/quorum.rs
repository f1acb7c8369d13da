//! Synchronous Quorum
//!
//! With remote sites configured every local standby slot has to be
//! synchronous: the `FIRST n` selection over "local peers, then remote
//! IPs" is then guaranteed to reach at least one cross-site target.
//! Without remote sites a majority-style half of the local set suffices.

/// Number of synchronous standbys the primary must wait for.
pub fn required_sync_count(local_count: usize, remote_count: usize) -> usize {
    if remote_count > 0 {
        local_count
    } else if local_count >= 2 {
        local_count / 2
    } else {
        0
    }
}

/// Whether the most-available trade-off applies at all. A topology with no
/// synchronous requirement has nothing to relax.
pub fn most_available_eligible(local_count: usize, remote_count: usize) -> bool {
    required_sync_count(local_count, remote_count) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_only() {
        assert_eq!(required_sync_count(0, 0), 0);
        assert_eq!(required_sync_count(1, 0), 0);
        assert_eq!(required_sync_count(2, 0), 1);
        assert_eq!(required_sync_count(3, 0), 1);
        assert_eq!(required_sync_count(4, 0), 2);
        assert_eq!(required_sync_count(5, 0), 2);
    }

    #[test]
    fn test_with_remote_sites() {
        assert_eq!(required_sync_count(1, 1), 1);
        assert_eq!(required_sync_count(3, 2), 3);
    }

    #[test]
    fn test_eligibility() {
        assert!(!most_available_eligible(1, 0));
        assert!(most_available_eligible(2, 0));
        assert!(most_available_eligible(1, 1));
    }
}
