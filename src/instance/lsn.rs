//! Log Sequence Number
//!
//! Replication positions are reported as `SEGMENT/OFFSET` in hexadecimal.
//! The 32-bit offset is split into two 16-bit page halves so the position
//! is an ordered triple `(segment, page_high, page_low)`.
//!
//! Equal positions on different instances are ordered by the owner's IPv4
//! octets. The tie-break carries no meaning beyond stability: repeated
//! elections over the same observations always pick the same instance.

use super::errors::{InstanceError, InstanceResult};
use std::cmp::Ordering;
use std::fmt;
use std::net::Ipv4Addr;

/// Replication position owned by one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lsn {
    segment: u32,
    page_high: u16,
    page_low: u16,
    owner: Ipv4Addr,
}

impl Lsn {
    /// Build an LSN from its components.
    pub fn new(segment: u32, page_high: u16, page_low: u16, owner: Ipv4Addr) -> Self {
        Self {
            segment,
            page_high,
            page_low,
            owner,
        }
    }

    /// Lowest position, used for instances whose position cannot be read.
    pub fn zero(owner: Ipv4Addr) -> Self {
        Self::new(0, 0, 0, owner)
    }

    /// Parse `SEGMENT/OFFSET` reported by instance `owner`.
    pub fn parse(owner: &str, text: &str) -> InstanceResult<Self> {
        let owner_addr: Ipv4Addr = owner
            .parse()
            .map_err(|_| InstanceError::decode(owner, "lsn owner", format!("not an IPv4 address: {owner}")))?;

        let text = text.trim();
        let (segment, offset) = text
            .split_once('/')
            .ok_or_else(|| InstanceError::decode(owner, "lsn", format!("missing '/' in {text:?}")))?;

        let segment = u32::from_str_radix(segment.trim(), 16)
            .map_err(|e| InstanceError::decode(owner, "lsn", format!("segment {segment:?}: {e}")))?;
        let offset = u32::from_str_radix(offset.trim(), 16)
            .map_err(|e| InstanceError::decode(owner, "lsn", format!("offset {offset:?}: {e}")))?;

        Ok(Self::new(
            segment,
            (offset >> 16) as u16,
            (offset & 0xFFFF) as u16,
            owner_addr,
        ))
    }

    /// IP of the instance this position belongs to.
    pub fn owner(&self) -> Ipv4Addr {
        self.owner
    }

    /// Owner as the textual IP used throughout the reconciler.
    pub fn owner_ip(&self) -> String {
        self.owner.to_string()
    }

    /// Position triple without the owner.
    pub fn position(&self) -> (u32, u16, u16) {
        (self.segment, self.page_high, self.page_low)
    }

    /// Highest LSN in the slice.
    pub fn max_of(lsns: &[Lsn]) -> Option<&Lsn> {
        lsns.iter().max()
    }
}

impl Ord for Lsn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position()
            .cmp(&other.position())
            .then_with(|| self.owner.octets().cmp(&other.owner.octets()))
    }
}

impl PartialOrd for Lsn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let offset = (u32::from(self.page_high) << 16) | u32::from(self.page_low);
        write!(f, "{:X}/{:X}@{}", self.segment, offset, self.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_offset() {
        let lsn = Lsn::parse("10.0.0.1", "0/3000148").unwrap();
        assert_eq!(lsn.position(), (0, 0x0300, 0x0148));
        assert_eq!(lsn.owner_ip(), "10.0.0.1");
        assert_eq!(lsn.to_string(), "0/3000148@10.0.0.1");
    }

    #[test]
    fn test_parse_trims_query_output() {
        let lsn = Lsn::parse("10.0.0.1", " 1A/FF \n").unwrap();
        assert_eq!(lsn.position(), (0x1A, 0, 0xFF));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Lsn::parse("10.0.0.1", "3000148").is_err());
        assert!(Lsn::parse("10.0.0.1", "x/1").is_err());
        assert!(Lsn::parse("not-an-ip", "0/1").is_err());
    }

    #[test]
    fn test_position_dominates_owner() {
        let low = Lsn::parse("10.0.0.9", "0/100").unwrap();
        let high = Lsn::parse("10.0.0.1", "0/200").unwrap();
        assert!(high > low);

        let next_segment = Lsn::parse("10.0.0.1", "1/0").unwrap();
        assert!(next_segment > Lsn::parse("10.0.0.9", "0/FFFFFFFF").unwrap());
    }

    #[test]
    fn test_tie_broken_by_octets() {
        let a = Lsn::parse("10.0.0.2", "0/500").unwrap();
        let b = Lsn::parse("10.0.0.10", "0/500").unwrap();
        // Numeric octet order, not string order.
        assert!(b > a);
        assert_eq!(Lsn::max_of(&[a.clone(), b.clone()]), Some(&b));
        assert_eq!(Lsn::max_of(&[b.clone(), a]), Some(&b));
    }
}
