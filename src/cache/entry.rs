//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

/// Expiration instant for `ttl` measured from `now`.
///
/// A zero ttl means no expiry, matching the wire format. A ttl too large to
/// represent as an `Instant` never expires either.
fn expiry_from(ttl: Option<Duration>, now: Instant) -> Option<Instant> {
    ttl.filter(|ttl| !ttl.is_zero())
        .and_then(|ttl| now.checked_add(ttl))
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// Its recency position is the slot it occupies in the shard's `LruList`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Owning key, kept so eviction can unlink the index
    pub key: Vec<u8>,
    /// The stored value
    pub value: Vec<u8>,
    /// Bytes charged against the shard budget
    pub size_bytes: usize,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
    /// Shard that owns this entry
    pub shard_id: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL measured from `now`.
    pub fn new(
        shard_id: usize,
        key: Vec<u8>,
        value: Vec<u8>,
        ttl: Option<Duration>,
        now: Instant,
    ) -> Self {
        Self {
            size_bytes: value.len(),
            expires_at: expiry_from(ttl, now),
            key,
            value,
            shard_id,
        }
    }

    // == Replace ==
    /// Overwrites value and TTL in place. Returns the previous size.
    pub fn replace(&mut self, value: Vec<u8>, ttl: Option<Duration>, now: Instant) -> usize {
        let expires_at = expiry_from(ttl, now);
        let previous = self.size_bytes;
        self.size_bytes = value.len();
        self.value = value;
        self.expires_at = expires_at;
        previous
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now` reaches its expiration instant.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// Returns remaining TTL, or None if no expiration is set.
    pub fn ttl_remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(now))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ttl: Option<Duration>, now: Instant) -> CacheEntry {
        CacheEntry::new(0, b"key".to_vec(), b"test_value".to_vec(), ttl, now)
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let now = Instant::now();
        let entry = entry(None, now);

        assert_eq!(entry.value, b"test_value");
        assert_eq!(entry.size_bytes, 10);
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired_at(now + Duration::from_secs(3600)));
        assert!(entry.ttl_remaining(now).is_none());
    }

    #[test]
    fn test_entry_expiration() {
        let now = Instant::now();
        let entry = entry(Some(Duration::from_secs(1)), now);

        assert!(!entry.is_expired_at(now));
        assert!(!entry.is_expired_at(now + Duration::from_millis(999)));
        assert!(entry.is_expired_at(now + Duration::from_millis(1100)));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Instant::now();
        let entry = entry(Some(Duration::from_secs(1)), now);

        assert!(
            entry.is_expired_at(now + Duration::from_secs(1)),
            "Entry should be expired at boundary"
        );
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let now = Instant::now();
        let entry = entry(Some(Duration::ZERO), now);

        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired_at(now + Duration::from_secs(3600)));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let now = Instant::now();
        let mut entry = entry(Some(Duration::MAX), now);
        assert!(entry.expires_at.is_none());

        let previous = entry.replace(vec![0u8; 50], Some(Duration::MAX), now);
        assert_eq!(previous, 10);
        assert_eq!(entry.size_bytes, 50);
        assert!(!entry.is_expired_at(now + Duration::from_secs(3600)));
    }

    #[test]
    fn test_ttl_remaining() {
        let now = Instant::now();
        let entry = entry(Some(Duration::from_secs(10)), now);

        assert_eq!(entry.ttl_remaining(now), Some(Duration::from_secs(10)));
        assert_eq!(
            entry.ttl_remaining(now + Duration::from_secs(11)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_replace_updates_size_and_ttl() {
        let now = Instant::now();
        let mut entry = entry(Some(Duration::from_secs(1)), now);

        let previous = entry.replace(b"abc".to_vec(), None, now);
        assert_eq!(previous, 10);
        assert_eq!(entry.size_bytes, 3);
        assert!(entry.expires_at.is_none());
    }
}
