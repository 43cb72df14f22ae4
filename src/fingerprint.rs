//! Fingerprint engine: per-file 128-bit content digest, adaptive mmap vs
//! chunked strategy, and cache integration (spec.md §4.2).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use memmap2::Mmap;
use xxhash_rust::xxh3::{xxh3_128, Xxh3};

use crate::cache::{Cache, ReadTxn};
use crate::error::EngineResult;

/// Opaque 128-bit content digest. Memcmp-orderable, used both for equality
/// and as a sort key within a bucket (spec.md §3).
pub type Fingerprint128 = [u8; 16];

/// Chunk size for the streaming read path (spec.md §4.2, "HUGE_LEN").
pub const HUGE_LEN: usize = 64 * 1024;

/// Reads `path` in full and hashes it in one pass via mmap. Callers should
/// fall back to `fingerprint_chunked` if this returns an mmap-specific I/O
/// error (spec.md §4.2: "on mmap failure ... fall back to the chunked path").
pub fn fingerprint_mmap(path: &Path) -> EngineResult<Fingerprint128> {
    let file = File::open(path).map_err(|e| crate::error::EngineError::io(path, e))?;
    let map = unsafe { Mmap::map(&file) }.map_err(|e| crate::error::EngineError::io(path, e))?;
    Ok(xxh3_128(&map).to_le_bytes())
}

/// Reads `path` in fixed `HUGE_LEN` chunks through a streaming hash state
/// (spec.md §4.2, "Otherwise: read in fixed chunks").
pub fn fingerprint_chunked(path: &Path) -> EngineResult<Fingerprint128> {
    let mut file = File::open(path).map_err(|e| crate::error::EngineError::io(path, e))?;
    let mut hasher = Xxh3::new();
    let mut buf = vec![0u8; HUGE_LEN];
    loop {
        let n = file.read(&mut buf).map_err(|e| crate::error::EngineError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.digest128().to_le_bytes())
}

/// Fingerprints `path`, choosing the mmap path when `size < excess_threshold`
/// and falling back to the chunked path on mmap failure or for larger files
/// (spec.md §4.2, "Algorithm choice per file").
pub fn fingerprint_file(path: &Path, size: i64, excess_threshold: i64) -> EngineResult<Fingerprint128> {
    if size < excess_threshold {
        match fingerprint_mmap(path) {
            Ok(fp) => return Ok(fp),
            Err(_) => return fingerprint_chunked(path),
        }
    }
    fingerprint_chunked(path)
}

/// A fingerprint together with the stat fields it was computed from, so a
/// cache hit can be validated against the file's current stat.
#[derive(Debug, Clone, Copy)]
pub struct CachedLookup {
    pub fingerprint: Fingerprint128,
    pub from_cache: bool,
}

/// Looks up `cache_key` in `cache`, reusing the cached fingerprint when its
/// stat fields match. Always marks the key visited, per spec.md §4.2,
/// "Cache integration". Returns `None` on a miss or stat mismatch.
pub fn lookup_cached(
    cache: &Cache,
    cache_key: &str,
    mtime: i64,
    ctime: i64,
    size: i64,
) -> Option<CachedLookup> {
    cache.mark_visited(cache_key.as_bytes());
    let txn: ReadTxn = cache.begin_read();
    let entry = cache.lookup(&txn, cache_key.as_bytes())?;
    if entry.matches_stat(mtime, ctime, size) {
        Some(CachedLookup { fingerprint: entry.fingerprint, from_cache: true })
    } else {
        None
    }
}

/// Persists a freshly computed fingerprint for `cache_key` (spec.md §4.2,
/// "On miss or mismatch ... upsert ... committing on success"). A failure
/// here is non-fatal to the caller: it just means this file's result won't
/// be cached next run (spec.md §4.2, "Failure semantics").
pub fn store_fingerprint(
    cache: &Cache,
    cache_key: &str,
    mtime: i64,
    ctime: i64,
    size: i64,
    fingerprint: Fingerprint128,
) -> EngineResult<()> {
    let entry = crate::cache::entry::CacheEntry::new(mtime, ctime, size, fingerprint);
    cache.upsert(cache_key.as_bytes(), &entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn mmap_and_chunked_paths_agree() {
        let mut file = NamedTempFile::new().unwrap();
        let data = vec![b'x'; HUGE_LEN * 3 + 17];
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let a = fingerprint_mmap(file.path()).unwrap();
        let b = fingerprint_chunked(file.path()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn small_file_deterministic_across_calls() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"identical content").unwrap();
        file.flush().unwrap();

        let a = fingerprint_file(file.path(), 17, 1024).unwrap();
        let b = fingerprint_file(file.path(), 17, 1024).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_different_fingerprint() {
        let mut fa = NamedTempFile::new().unwrap();
        fa.write_all(b"identical content").unwrap();
        fa.flush().unwrap();
        let mut fb = NamedTempFile::new().unwrap();
        fb.write_all(b"unique content").unwrap();
        fb.flush().unwrap();

        let a = fingerprint_file(fa.path(), 17, 1024).unwrap();
        let b = fingerprint_file(fb.path(), 14, 1024).unwrap();
        assert_ne!(a, b);
    }
}
