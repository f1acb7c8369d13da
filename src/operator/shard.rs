//! Shard Ownership
//!
//! A cluster belongs to exactly one operator replica: the SHA-256 of its
//! `namespace/name`, read as a big-endian integer from the first 8 bytes,
//! modulo the number of replicas.

use crate::model::ClusterKey;
use sha2::{Digest, Sha256};

/// Shard index of `key` among `shard_count` replicas.
pub fn shard_of(key: &ClusterKey, shard_count: u32) -> u32 {
    if shard_count <= 1 {
        return 0;
    }
    let digest = Sha256::digest(key.to_string().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(prefix);
    // The remainder is below shard_count, which fits u32.
    (hash % u64::from(shard_count)) as u32
}

/// This replica owns `key`.
pub fn owns(key: &ClusterKey, shard_index: u32, shard_count: u32) -> bool {
    shard_of(key, shard_count) == shard_index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_shard_owns_everything() {
        assert!(owns(&ClusterKey::new("db", "a"), 0, 1));
        assert!(owns(&ClusterKey::new("other", "b"), 0, 0));
    }

    #[test]
    fn test_exactly_one_owner() {
        for i in 0..50 {
            let key = ClusterKey::new("db", format!("cluster-{i}"));
            let owners = (0..3).filter(|shard| owns(&key, *shard, 3)).count();
            assert_eq!(owners, 1);
        }
    }

    #[test]
    fn test_stable_across_calls() {
        let key = ClusterKey::new("prod", "ledger");
        assert_eq!(shard_of(&key, 7), shard_of(&key, 7));
    }

    #[test]
    fn test_spreads_over_shards() {
        let used: std::collections::BTreeSet<u32> = (0..100)
            .map(|i| shard_of(&ClusterKey::new("db", format!("c{i}")), 4))
            .collect();
        assert_eq!(used.len(), 4);
    }
}
