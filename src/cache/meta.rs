//! Meta pages: the two fixed pages (0 and 1) that ping-pong as the live
//! commit target (spec.md §4.5, "Meta-page ping-pong").

use crate::cache::page::{Pgno, DB_MAGIC, DB_VERSION, PAGE_SIZE};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub magic: u32,
    pub version: u32,
    pub txnid: u64,
    pub root_pgno: Pgno,
    pub last_pgno: Pgno,
}

impl Meta {
    pub fn fresh(txnid: u64) -> Self {
        Self { magic: DB_MAGIC, version: DB_VERSION, txnid, root_pgno: 0, last_pgno: 1 }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == DB_MAGIC && self.version == DB_VERSION
    }

    fn checksum(bytes: &[u8]) -> u32 {
        crc32fast::hash(bytes)
    }

    pub fn to_bytes(self) -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..16].copy_from_slice(&self.txnid.to_le_bytes());
        buf[16..24].copy_from_slice(&self.root_pgno.to_le_bytes());
        buf[24..32].copy_from_slice(&self.last_pgno.to_le_bytes());
        let checksum = Self::checksum(&buf[0..32]);
        buf[32..36].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Parses a meta page. Returns `None` when the magic/version don't match
    /// (an uninitialised or foreign page) rather than erroring: the caller
    /// decides whether that's fatal (both meta pages invalid).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PAGE_SIZE {
            return None;
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let txnid = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let root_pgno = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let last_pgno = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
        let checksum = u32::from_le_bytes(bytes[32..36].try_into().unwrap());

        if magic != DB_MAGIC || version != DB_VERSION {
            return None;
        }
        if Self::checksum(&bytes[0..32]) != checksum {
            return None;
        }
        Some(Self { magic, version, txnid, root_pgno, last_pgno })
    }
}

/// Picks the live meta page out of the two candidates: whichever has the
/// higher valid `txnid`. Both invalid is a hard corruption error.
pub fn select_live(meta0: Option<Meta>, meta1: Option<Meta>) -> Result<(usize, Meta), EngineError> {
    match (meta0, meta1) {
        (Some(m0), Some(m1)) => {
            if m1.txnid > m0.txnid {
                Ok((1, m1))
            } else {
                Ok((0, m0))
            }
        }
        (Some(m0), None) => Ok((0, m0)),
        (None, Some(m1)) => Ok((1, m1)),
        (None, None) => Err(EngineError::CacheCorrupt(
            "both meta pages are invalid (bad magic/version/checksum)".to_string(),
        )),
    }
}
