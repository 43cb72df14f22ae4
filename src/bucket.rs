//! `SizeBucket` and the size-indexed bucket map (spec.md §3, §4.4).

use std::collections::HashMap;

use crate::fileref::FileId;
use crate::fingerprint::Fingerprint128;

/// The set of enumerated files sharing one byte size; the unit of
/// fingerprint work. `fingerprints[i]` corresponds to `files[i]`.
pub struct SizeBucket {
    pub size: i64,
    pub files: Vec<FileId>,
    pub fingerprints: Vec<Option<Fingerprint128>>,
    pub fingerprinted_count: usize,
}

impl SizeBucket {
    pub fn new(size: i64) -> Self {
        Self { size, files: Vec::new(), fingerprints: Vec::new(), fingerprinted_count: 0 }
    }

    pub fn push(&mut self, id: FileId) {
        self.files.push(id);
        self.fingerprints.push(None);
    }

    pub fn count(&self) -> usize {
        self.files.len()
    }

    pub fn set_fingerprint(&mut self, index: usize, fp: Fingerprint128) {
        if self.fingerprints[index].is_none() {
            self.fingerprinted_count += 1;
        }
        self.fingerprints[index] = Some(fp);
    }
}

/// Map from file size to the bucket of candidate files sharing that size.
/// Created and populated single-threadedly by the `Enumerator`; read-mostly
/// during the fingerprint stage (see spec.md §5, "Shared-resource policy").
#[derive(Default)]
pub struct BucketMap {
    buckets: HashMap<i64, SizeBucket>,
}

impl BucketMap {
    pub fn new() -> Self {
        Self { buckets: HashMap::new() }
    }

    pub fn insert(&mut self, size: i64, id: FileId) {
        self.buckets.entry(size).or_insert_with(|| SizeBucket::new(size)).push(id);
    }

    pub fn get(&self, size: i64) -> Option<&SizeBucket> {
        self.buckets.get(&size)
    }

    pub fn get_mut(&mut self, size: i64) -> Option<&mut SizeBucket> {
        self.buckets.get_mut(&size)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&i64, &SizeBucket)> {
        self.buckets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_files_len_equals_count() {
        let mut map = BucketMap::new();
        map.insert(10, FileId(0));
        map.insert(10, FileId(1));
        map.insert(20, FileId(2));

        let b = map.get(10).unwrap();
        assert_eq!(b.files.len(), b.count());
        assert_eq!(b.count(), 2);
        assert_eq!(map.get(20).unwrap().count(), 1);
    }

    #[test]
    fn fingerprinted_count_tracks_unique_sets() {
        let mut map = BucketMap::new();
        map.insert(10, FileId(0));
        map.insert(10, FileId(1));
        let b = map.get_mut(10).unwrap();
        b.set_fingerprint(0, [1u8; 16]);
        assert_eq!(b.fingerprinted_count, 1);
        b.set_fingerprint(0, [2u8; 16]);
        assert_eq!(b.fingerprinted_count, 1);
        b.set_fingerprint(1, [3u8; 16]);
        assert_eq!(b.fingerprinted_count, 2);
    }
}
