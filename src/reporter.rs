//! Duplicate reporter: drains the size heap in descending order, groups
//! each bucket by confirmed equality, and emits the groups either as plain
//! text or as JSON (spec.md §4.4, §4.7 step 7).

use std::io::Write;

use serde::Serialize;

use crate::bucket::BucketMap;
use crate::error::EngineResult;
use crate::fileref::{FileId, FileRef};
use crate::heap::SizeHeap;
use crate::size::format_human_size;
use crate::verify::{verify_equal_files, Verdict};

/// One confirmed duplicate group: `size` shared by every member, members in
/// emission order (non-prioritised files first, per spec.md §4.4's
/// "priority-path anchoring" convention).
pub struct DuplicateGroup {
    pub size: i64,
    pub members: Vec<FileId>,
}

/// Drains `heap`, consulting `buckets`, and returns every confirmed
/// duplicate group in descending size order (spec.md §4.4 steps 1-3). This
/// is the grouping algorithm shared by both the text and JSON reporters.
pub fn build_groups(
    heap: &mut SizeHeap,
    buckets: &BucketMap,
    arena: &[FileRef],
    excess_threshold: i64,
) -> Vec<DuplicateGroup> {
    let mut groups = Vec::new();
    let mut prev_size: Option<i64> = None;

    while let Some(sized) = heap.pop() {
        if prev_size == Some(sized.size) {
            continue;
        }
        prev_size = Some(sized.size);

        let Some(bucket) = buckets.get(sized.size) else { continue };
        if bucket.count() < 2 {
            continue;
        }

        if sized.size == 0 {
            // All size-0 files are declared equal (spec.md §4.3).
            groups.push(DuplicateGroup { size: 0, members: bucket.files.clone() });
            continue;
        }

        if bucket.count() == 2 {
            let a = &arena[bucket.files[0].0 as usize];
            let b = &arena[bucket.files[1].0 as usize];
            if verify_equal_files(a, b, sized.size, excess_threshold) == Verdict::Equal {
                // Non-prioritised first, matching the same "priority-path
                // anchoring" convention §4.4 applies to 3+-file buckets via
                // the fingerprint sort (spec.md §8 scenario 4).
                let mut members = bucket.files.clone();
                members.sort_by_key(|&id| arena[id.0 as usize].prioritised);
                groups.push(DuplicateGroup { size: sized.size, members });
            }
            continue;
        }

        groups.extend(group_by_fingerprint(bucket, arena, sized.size, excess_threshold));
    }

    groups
}

/// spec.md §4.4 step 2-3: sort the bucket's fingerprinted slots by
/// `(fingerprint ascending, prioritised ascending)`, then for each
/// unconsumed slot confirm equality against later slots with an equal
/// fingerprint, stopping at the first mismatch since the array is sorted.
fn group_by_fingerprint(
    bucket: &crate::bucket::SizeBucket,
    arena: &[FileRef],
    size: i64,
    excess_threshold: i64,
) -> Vec<DuplicateGroup> {
    let mut order: Vec<usize> = (0..bucket.count()).filter(|&i| bucket.fingerprints[i].is_some()).collect();
    order.sort_by(|&a, &b| {
        let fa = bucket.fingerprints[a].unwrap();
        let fb = bucket.fingerprints[b].unwrap();
        fa.cmp(&fb).then_with(|| {
            let pa = arena[bucket.files[a].0 as usize].prioritised;
            let pb = arena[bucket.files[b].0 as usize].prioritised;
            pa.cmp(&pb)
        })
    });

    let mut consumed = vec![false; order.len()];
    let mut groups = Vec::new();

    for oi in 0..order.len() {
        if consumed[oi] {
            continue;
        }
        let i = order[oi];
        let fi = bucket.fingerprints[i].unwrap();
        let mut members = vec![bucket.files[i]];

        for oj in (oi + 1)..order.len() {
            if consumed[oj] {
                continue;
            }
            let j = order[oj];
            let fj = bucket.fingerprints[j].unwrap();
            if fj != fi {
                break;
            }
            let a = &arena[bucket.files[i].0 as usize];
            let b = &arena[bucket.files[j].0 as usize];
            if verify_equal_files(a, b, size, excess_threshold) == Verdict::Equal {
                consumed[oj] = true;
                members.push(bucket.files[j]);
            }
        }

        if members.len() > 1 {
            groups.push(DuplicateGroup { size, members });
        }
    }

    groups
}

/// Text reporter (spec.md §4.4, "Header emission"): prints an optional size
/// header per group, one path per line, a blank-line group terminator, with
/// paths terminated by `record_sep`.
pub fn write_text_report(
    out: &mut impl Write,
    groups: &[DuplicateGroup],
    arena: &[FileRef],
    sized: bool,
    record_sep: char,
) -> EngineResult<()> {
    for group in groups {
        if sized {
            writeln!(out, "{}", format_human_size(group.size)).map_err(io_err)?;
        }
        for &id in &group.members {
            write!(out, "{}{record_sep}", arena[id.0 as usize].display_path(record_sep)).map_err(io_err)?;
        }
        writeln!(out).map_err(io_err)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonGroup {
    size: i64,
    paths: Vec<String>,
}

/// JSON reporter (spec.md §4.7 step 7: "a parallel consumer with identical
/// data flow" to the text reporter).
pub fn write_json_report(
    out: &mut impl Write,
    groups: &[DuplicateGroup],
    arena: &[FileRef],
    record_sep: char,
) -> EngineResult<()> {
    let json_groups: Vec<JsonGroup> = groups
        .iter()
        .map(|g| JsonGroup {
            size: g.size,
            paths: g.members.iter().map(|&id| arena[id.0 as usize].display_path(record_sep)).collect(),
        })
        .collect();
    serde_json::to_writer_pretty(out, &json_groups).map_err(|e| {
        crate::error::EngineError::Io {
            path: std::path::PathBuf::from("<json output>"),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        }
    })
}

fn io_err(e: std::io::Error) -> crate::error::EngineError {
    crate::error::EngineError::Io { path: std::path::PathBuf::from("<report output>"), source: e }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileref::FileKind;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn make_file(contents: &[u8], prioritised: bool) -> (NamedTempFile, FileRef) {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        let path = f.path().to_path_buf();
        let size = contents.len() as i64;
        (f, FileRef::new(path, FileKind::Plain, size, 0, 0, prioritised))
    }

    #[test]
    fn three_identicals_one_unique() {
        let (_fa, fa) = make_file(b"identical content", false);
        let (_fb, fb) = make_file(b"identical content", false);
        let (_fc, fc) = make_file(b"unique content", false);
        let (_fd, fd) = make_file(b"identical content", false);
        let arena = vec![fa, fb, fc, fd];

        let mut buckets = BucketMap::new();
        let mut heap = SizeHeap::new();
        for (i, f) in arena.iter().enumerate() {
            buckets.insert(f.size, FileId(i as u32));
            heap.push(f.size, FileId(i as u32));
        }
        let fp17 = [1u8; 16];
        let b17 = buckets.get_mut(17).unwrap();
        b17.set_fingerprint(0, fp17);
        b17.set_fingerprint(1, fp17);
        b17.set_fingerprint(2, fp17);

        let groups = build_groups(&mut heap, &buckets, &arena, 1024);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 3);
        assert_eq!(groups[0].size, 17);
    }

    #[test]
    fn two_file_bucket_is_verified_directly() {
        let (_fa, fa) = make_file(b"same", false);
        let (_fb, fb) = make_file(b"same", false);
        let arena = vec![fa, fb];
        let mut buckets = BucketMap::new();
        let mut heap = SizeHeap::new();
        for (i, f) in arena.iter().enumerate() {
            buckets.insert(f.size, FileId(i as u32));
            heap.push(f.size, FileId(i as u32));
        }
        let groups = build_groups(&mut heap, &buckets, &arena, 1024);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 2);
    }

    #[test]
    fn priority_path_file_is_listed_last() {
        let (_fa, fa) = make_file(b"same content", true);
        let (_fb, fb) = make_file(b"same content", false);
        let arena = vec![fa, fb];
        let mut buckets = BucketMap::new();
        let mut heap = SizeHeap::new();
        for (i, f) in arena.iter().enumerate() {
            buckets.insert(f.size, FileId(i as u32));
            heap.push(f.size, FileId(i as u32));
        }
        let groups = build_groups(&mut heap, &buckets, &arena, 1024);
        assert_eq!(groups.len(), 1);
        let last = groups[0].members.last().unwrap();
        assert!(arena[last.0 as usize].prioritised);
    }

    #[test]
    fn text_report_emits_group_terminator() {
        let (_fa, fa) = make_file(b"x", false);
        let (_fb, fb) = make_file(b"x", false);
        let arena = vec![fa, fb];
        let groups = vec![DuplicateGroup { size: 1, members: vec![FileId(0), FileId(1)] }];
        let mut out = Vec::new();
        write_text_report(&mut out, &groups, &arena, true, '\n').unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("1B\n"));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn json_report_round_trips_through_serde() {
        let (_fa, fa) = make_file(b"x", false);
        let (_fb, fb) = make_file(b"x", false);
        let arena = vec![fa, fb];
        let groups = vec![DuplicateGroup { size: 1, members: vec![FileId(0), FileId(1)] }];
        let mut out = Vec::new();
        write_json_report(&mut out, &groups, &arena, '\n').unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed[0]["size"], 1);
        assert_eq!(parsed[0]["paths"].as_array().unwrap().len(), 2);
    }
}
