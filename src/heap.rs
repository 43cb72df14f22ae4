//! A generic binary max-heap with an optional mutex wrapper, used to drive
//! the engine in descending file-size order (spec.md §3, `SizeHeap`).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use crate::fileref::FileId;

/// One entry in the `SizeHeap`: a candidate file keyed by its size. Ties are
/// broken arbitrarily, matching spec.md's "ties broken arbitrarily".
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SizedFile {
    pub size: i64,
    pub id: FileId,
}

impl Ord for SizedFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size.cmp(&other.size)
    }
}

impl PartialOrd for SizedFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap of `SizedFile`, ordered by `size` descending on pop.
#[derive(Default)]
pub struct SizeHeap {
    inner: BinaryHeap<SizedFile>,
}

impl SizeHeap {
    pub fn new() -> Self {
        Self { inner: BinaryHeap::new() }
    }

    pub fn push(&mut self, size: i64, id: FileId) {
        self.inner.push(SizedFile { size, id });
    }

    pub fn pop(&mut self) -> Option<SizedFile> {
        self.inner.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

/// A `SizeHeap` guarded by a mutex, for concurrent population during
/// enumeration (the enumerator itself is single-threaded per spec.md §5, but
/// archive-member expansion and future callers may populate it from more
/// than one place).
#[derive(Default)]
pub struct SharedSizeHeap {
    inner: Mutex<SizeHeap>,
}

impl SharedSizeHeap {
    pub fn new() -> Self {
        Self { inner: Mutex::new(SizeHeap::new()) }
    }

    pub fn push(&self, size: i64, id: FileId) {
        self.inner.lock().unwrap().push(size, id);
    }

    pub fn pop(&self) -> Option<SizedFile> {
        self.inner.lock().unwrap().pop()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn into_inner(self) -> SizeHeap {
        self.inner.into_inner().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_descending_size_order() {
        let mut heap = SizeHeap::new();
        heap.push(10, FileId(0));
        heap.push(100, FileId(1));
        heap.push(50, FileId(2));

        assert_eq!(heap.pop().unwrap().size, 100);
        assert_eq!(heap.pop().unwrap().size, 50);
        assert_eq!(heap.pop().unwrap().size, 10);
        assert!(heap.pop().is_none());
    }

    #[test]
    fn shared_heap_is_thread_safe() {
        use std::sync::Arc;
        use std::thread;

        let heap = Arc::new(SharedSizeHeap::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let heap = Arc::clone(&heap);
            handles.push(thread::spawn(move || heap.push(i, FileId(i as u32))));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(heap.len(), 8);
    }
}
