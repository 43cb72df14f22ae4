//! Equality verifier: byte-exact comparison used to confirm fingerprint hits
//! and to short-circuit small buckets (spec.md §4.3).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use memmap2::Mmap;

use crate::archive::{resolve_content, ArchiveExtractor};
use crate::fileref::FileRef;
use crate::fingerprint::HUGE_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Equal,
    NotEqual,
    Error,
}

/// Compares `a` and `b`, both known to be `size` bytes (spec.md §4.3).
/// Size-0 files are declared equal without touching the filesystem; below
/// `excess_threshold` both files are memory-mapped and compared in one
/// pass, falling back to synchronized chunked reads on mmap failure or for
/// larger files.
pub fn verify_equal(a: &Path, b: &Path, size: i64, excess_threshold: i64) -> Verdict {
    if size == 0 {
        return Verdict::Equal;
    }
    if size < excess_threshold {
        if let Some(verdict) = verify_mmap(a, b) {
            return verdict;
        }
    }
    verify_chunked(a, b)
}

/// Same as `verify_equal`, but resolves each `FileRef` through
/// `ArchiveExtractor` first, so archive members are compared by their
/// materialized scratch-file content rather than the archive's own bytes
/// (spec.md §4.2, "Archive members"; used by the reporter to confirm
/// fingerprint matches and to verify 2-file buckets directly).
pub fn verify_equal_files(a: &FileRef, b: &FileRef, size: i64, excess_threshold: i64) -> Verdict {
    if size == 0 {
        return Verdict::Equal;
    }
    let extractor = ArchiveExtractor::new();
    let source_a = match resolve_content(&extractor, a) {
        Ok(s) => s,
        Err(_) => return Verdict::Error,
    };
    let source_b = match resolve_content(&extractor, b) {
        Ok(s) => s,
        Err(_) => return Verdict::Error,
    };
    verify_equal(source_a.path(), source_b.path(), size, excess_threshold)
}

fn verify_mmap(a: &Path, b: &Path) -> Option<Verdict> {
    let fa = File::open(a).ok()?;
    let fb = File::open(b).ok()?;
    let ma = unsafe { Mmap::map(&fa) }.ok()?;
    let mb = unsafe { Mmap::map(&fb) }.ok()?;
    Some(if ma.as_ref() == mb.as_ref() { Verdict::Equal } else { Verdict::NotEqual })
}

fn verify_chunked(a: &Path, b: &Path) -> Verdict {
    let (mut fa, mut fb) = match (File::open(a), File::open(b)) {
        (Ok(fa), Ok(fb)) => (fa, fb),
        _ => return Verdict::Error,
    };

    let mut buf_a = vec![0u8; HUGE_LEN];
    let mut buf_b = vec![0u8; HUGE_LEN];
    loop {
        let na = match fa.read(&mut buf_a) {
            Ok(n) => n,
            Err(_) => return Verdict::Error,
        };
        let nb = match fb.read(&mut buf_b) {
            Ok(n) => n,
            Err(_) => return Verdict::Error,
        };
        if na != nb {
            return Verdict::NotEqual;
        }
        if na == 0 {
            return Verdict::Equal;
        }
        if buf_a[..na] != buf_b[..nb] {
            return Verdict::NotEqual;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn zero_size_is_always_equal() {
        let a = write_file(b"");
        let b = write_file(b"");
        assert_eq!(verify_equal(a.path(), b.path(), 0, 1024), Verdict::Equal);
    }

    #[test]
    fn identical_small_files_are_equal_via_mmap_path() {
        let a = write_file(b"identical content");
        let b = write_file(b"identical content");
        assert_eq!(verify_equal(a.path(), b.path(), 17, 1024), Verdict::Equal);
    }

    #[test]
    fn different_small_files_are_not_equal() {
        let a = write_file(b"identical content");
        let b = write_file(b"unique content!!!");
        assert_eq!(verify_equal(a.path(), b.path(), 17, 1024), Verdict::NotEqual);
    }

    #[test]
    fn large_files_take_the_chunked_path_and_agree_with_mmap_path() {
        let data_a = vec![7u8; HUGE_LEN * 2 + 5];
        let mut data_b = data_a.clone();
        data_b[HUGE_LEN + 1] ^= 0xff;
        let a = write_file(&data_a);
        let b = write_file(&data_a);
        let c = write_file(&data_b);

        let size = data_a.len() as i64;
        assert_eq!(verify_equal(a.path(), b.path(), size, 0), Verdict::Equal);
        assert_eq!(verify_equal(a.path(), c.path(), size, 0), Verdict::NotEqual);
    }
}
