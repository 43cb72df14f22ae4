//! `CacheEntry`: the fixed 40-byte value stored verbatim in the cache's
//! leaf pages, keyed by absolute path (spec.md §3).

use crate::fingerprint::Fingerprint128;

pub const CACHE_ENTRY_SIZE: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub mtime: i64,
    pub ctime: i64,
    pub size: i64,
    pub fingerprint: Fingerprint128,
}

impl CacheEntry {
    pub fn new(mtime: i64, ctime: i64, size: i64, fingerprint: Fingerprint128) -> Self {
        Self { mtime, ctime, size, fingerprint }
    }

    /// Serializes to the exact on-disk layout: `mtime, ctime, size` as
    /// little-endian i64, followed by the 16-byte fingerprint.
    pub fn to_bytes(self) -> [u8; CACHE_ENTRY_SIZE] {
        let mut buf = [0u8; CACHE_ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.mtime.to_le_bytes());
        buf[8..16].copy_from_slice(&self.ctime.to_le_bytes());
        buf[16..24].copy_from_slice(&self.size.to_le_bytes());
        buf[24..40].copy_from_slice(&self.fingerprint);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), CACHE_ENTRY_SIZE);
        let mtime = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let ctime = i64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let size = i64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let mut fingerprint = [0u8; 16];
        fingerprint.copy_from_slice(&bytes[24..40]);
        Self { mtime, ctime, size, fingerprint }
    }

    /// True when `mtime`, `ctime`, and `size` match the current stat of the
    /// file, i.e. the cached fingerprint can be reused (spec.md §4.2).
    pub fn matches_stat(&self, mtime: i64, ctime: i64, size: i64) -> bool {
        self.mtime == mtime && self.ctime == ctime && self.size == size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let entry = CacheEntry::new(111, 222, 333, [9u8; 16]);
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len(), CACHE_ENTRY_SIZE);
        let back = CacheEntry::from_bytes(&bytes);
        assert_eq!(entry, back);
    }

    #[test]
    fn matches_stat_checks_all_three_fields() {
        let entry = CacheEntry::new(1, 2, 3, [0u8; 16]);
        assert!(entry.matches_stat(1, 2, 3));
        assert!(!entry.matches_stat(9, 2, 3));
        assert!(!entry.matches_stat(1, 9, 3));
        assert!(!entry.matches_stat(1, 2, 9));
    }
}
