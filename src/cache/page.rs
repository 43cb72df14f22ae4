//! Slotted-page layout for the `CACHE` B+tree: branch and leaf pages share a
//! small fixed header (kind, num_keys, lower, upper) followed by a slot
//! directory that grows downward from the header and packed key/value data
//! that grows upward from the page tail (spec.md §3, "Page").
//!
//! Invariant maintained by every mutator in this module:
//! `header_end <= lower <= upper <= PAGE_SIZE`.

pub const PAGE_SIZE: usize = 4096;
pub const DB_MAGIC: u32 = 0x4455_5046; // "DUPF"
pub const DB_VERSION: u32 = 1;

pub const HEADER_END: usize = 8;
const SLOT_WIDTH: usize = 2;

pub type Pgno = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Leaf,
    Branch,
}

impl PageKind {
    fn tag(self) -> u8 {
        match self {
            PageKind::Leaf => 0,
            PageKind::Branch => 1,
        }
    }

    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => PageKind::Leaf,
            1 => PageKind::Branch,
            other => panic!("corrupt page: unknown page kind tag {other}"),
        }
    }
}

/// Result of a binary search within a page's slot directory (spec.md §4.5,
/// "Binary search within a page").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found(usize),
    NotFound(usize),
}

/// A read-only borrow into a page buffer (either the memory map, for clean
/// pages, or a dirty-page buffer owned by a write transaction). Distinct
/// from `PageMut` so that the map's read-only pages can never be written
/// through accidentally (spec.md §9, "Manual page buffer aliasing").
pub struct PageView<'a> {
    bytes: &'a [u8],
}

/// An exclusive, writable borrow into a page buffer, returned only from
/// `get_writable` (copy-on-write) or from a freshly allocated page.
pub struct PageViewMut<'a> {
    bytes: &'a mut [u8],
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap())
}

fn write_u16(bytes: &mut [u8], at: usize, value: u16) {
    bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

fn write_u64(bytes: &mut [u8], at: usize, value: u64) {
    bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

impl<'a> PageView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len(), PAGE_SIZE);
        Self { bytes }
    }

    pub fn kind(&self) -> PageKind {
        PageKind::from_tag(self.bytes[0])
    }

    pub fn num_keys(&self) -> usize {
        read_u16(self.bytes, 2) as usize
    }

    pub fn lower(&self) -> usize {
        read_u16(self.bytes, 4) as usize
    }

    pub fn upper(&self) -> usize {
        read_u16(self.bytes, 6) as usize
    }

    pub fn free_space(&self) -> usize {
        self.upper() - self.lower()
    }

    fn slot_offset(&self, index: usize) -> usize {
        read_u16(self.bytes, HEADER_END + index * SLOT_WIDTH) as usize
    }

    /// The key bytes stored at slot `index`, borrowed for the page view's own
    /// `'a` rather than elided to `&self` — callers (notably `tree::lookup`)
    /// need to hand this borrow back out past the `PageView` that produced
    /// it, since the view itself is often a short-lived local over a
    /// longer-lived transaction snapshot.
    pub fn key_at(&self, index: usize) -> &'a [u8] {
        let rec = self.slot_offset(index);
        let key_size = read_u16(self.bytes, rec) as usize;
        match self.kind() {
            PageKind::Leaf => &self.bytes[rec + 4..rec + 4 + key_size],
            PageKind::Branch => &self.bytes[rec + 10..rec + 10 + key_size],
        }
    }

    /// The value bytes stored at leaf slot `index`. Panics on branch pages.
    /// See `key_at` for why this borrows `'a` instead of `&self`.
    pub fn value_at(&self, index: usize) -> &'a [u8] {
        assert_eq!(self.kind(), PageKind::Leaf);
        let rec = self.slot_offset(index);
        let key_size = read_u16(self.bytes, rec) as usize;
        let value_size = read_u16(self.bytes, rec + 2) as usize;
        let start = rec + 4 + key_size;
        &self.bytes[start..start + value_size]
    }

    /// The absolute offset (from the start of the page) of leaf slot
    /// `index`'s value bytes. Used for zero-copy lookups (spec.md §4.5,
    /// "Lookup").
    pub fn value_offset_at(&self, index: usize) -> (usize, usize) {
        assert_eq!(self.kind(), PageKind::Leaf);
        let rec = self.slot_offset(index);
        let key_size = read_u16(self.bytes, rec) as usize;
        let value_size = read_u16(self.bytes, rec + 2) as usize;
        (rec + 4 + key_size, value_size)
    }

    /// The child page number following branch slot `index`.
    pub fn child_at(&self, index: usize) -> Pgno {
        assert_eq!(self.kind(), PageKind::Branch);
        let rec = self.slot_offset(index);
        read_u64(self.bytes, rec + 2)
    }

    /// Binary search for `key` among this page's sorted keys (spec.md §4.5).
    pub fn search(&self, key: &[u8]) -> SearchResult {
        let mut lo = 0usize;
        let mut hi = self.num_keys();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key_at(mid).cmp(key) {
                std::cmp::Ordering::Equal => return SearchResult::Found(mid),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        SearchResult::NotFound(lo)
    }

    /// For a branch page, the child index to follow for `result` (spec.md
    /// §4.5, "Binary search within a page"): on `Found`, the child recorded
    /// with that separator; on `NotFound(0)`, child 0; otherwise
    /// `insertion_point - 1`.
    pub fn branch_child_index(result: SearchResult) -> usize {
        match result {
            SearchResult::Found(i) => i,
            SearchResult::NotFound(0) => 0,
            SearchResult::NotFound(i) => i - 1,
        }
    }

    /// Borrows the whole page buffer for `'a` (see `key_at` for why this
    /// isn't elided to `&self`): `tree::lookup` hands a slice of this back
    /// out past the short-lived `PageView` that produced it.
    pub fn raw(&self) -> &'a [u8] {
        self.bytes
    }
}

impl<'a> PageViewMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        debug_assert_eq!(bytes.len(), PAGE_SIZE);
        Self { bytes }
    }

    pub fn as_view(&self) -> PageView<'_> {
        PageView::new(self.bytes)
    }

    pub fn init_empty(&mut self, kind: PageKind) {
        self.bytes[0] = kind.tag();
        write_u16(self.bytes, 2, 0);
        write_u16(self.bytes, 4, HEADER_END as u16);
        write_u16(self.bytes, 6, PAGE_SIZE as u16);
    }

    pub fn kind(&self) -> PageKind {
        PageKind::from_tag(self.bytes[0])
    }

    pub fn num_keys(&self) -> usize {
        read_u16(self.bytes, 2) as usize
    }

    fn set_num_keys(&mut self, n: usize) {
        write_u16(self.bytes, 2, n as u16);
    }

    pub fn lower(&self) -> usize {
        read_u16(self.bytes, 4) as usize
    }

    fn set_lower(&mut self, v: usize) {
        write_u16(self.bytes, 4, v as u16);
    }

    pub fn upper(&self) -> usize {
        read_u16(self.bytes, 6) as usize
    }

    fn set_upper(&mut self, v: usize) {
        write_u16(self.bytes, 6, v as u16);
    }

    pub fn free_space(&self) -> usize {
        self.upper() - self.lower()
    }

    fn slot_offset(&self, index: usize) -> usize {
        read_u16(self.bytes, HEADER_END + index * SLOT_WIDTH) as usize
    }

    fn set_slot_offset(&mut self, index: usize, offset: usize) {
        write_u16(self.bytes, HEADER_END + index * SLOT_WIDTH, offset as u16);
    }

    /// Space a leaf record of `key`/`value` would take once packed.
    fn leaf_record_len(key: &[u8], value: &[u8]) -> usize {
        4 + key.len() + value.len()
    }

    fn branch_record_len(key: &[u8]) -> usize {
        10 + key.len()
    }

    pub fn fits_leaf_insert(&self, key: &[u8], value: &[u8]) -> bool {
        self.free_space() >= SLOT_WIDTH + Self::leaf_record_len(key, value)
    }

    pub fn fits_branch_insert(&self, key: &[u8]) -> bool {
        self.free_space() >= SLOT_WIDTH + Self::branch_record_len(key)
    }

    /// Inserts a new leaf slot at `index`, shifting later slots right.
    /// Caller must have checked `fits_leaf_insert`.
    pub fn insert_leaf(&mut self, index: usize, key: &[u8], value: &[u8]) {
        let rec_len = Self::leaf_record_len(key, value);
        let rec_off = self.upper() - rec_len;
        write_u16(self.bytes, rec_off, key.len() as u16);
        write_u16(self.bytes, rec_off + 2, value.len() as u16);
        self.bytes[rec_off + 4..rec_off + 4 + key.len()].copy_from_slice(key);
        self.bytes[rec_off + 4 + key.len()..rec_off + rec_len].copy_from_slice(value);
        self.set_upper(rec_off);

        self.shift_slots_right(index);
        self.set_slot_offset(index, rec_off);
        self.set_num_keys(self.num_keys() + 1);
        self.set_lower(self.lower() + SLOT_WIDTH);
    }

    /// Inserts a new branch slot at `index` pointing at `child`.
    pub fn insert_branch(&mut self, index: usize, key: &[u8], child: Pgno) {
        let rec_len = Self::branch_record_len(key);
        let rec_off = self.upper() - rec_len;
        write_u16(self.bytes, rec_off, key.len() as u16);
        write_u64(self.bytes, rec_off + 2, child);
        self.bytes[rec_off + 10..rec_off + rec_len].copy_from_slice(key);
        self.set_upper(rec_off);

        self.shift_slots_right(index);
        self.set_slot_offset(index, rec_off);
        self.set_num_keys(self.num_keys() + 1);
        self.set_lower(self.lower() + SLOT_WIDTH);
    }

    fn shift_slots_right(&mut self, from: usize) {
        let n = self.num_keys();
        for i in (from..n).rev() {
            let off = self.slot_offset(i);
            write_u16(self.bytes, HEADER_END + (i + 1) * SLOT_WIDTH, off as u16);
        }
    }

    fn shift_slots_left(&mut self, from: usize) {
        let n = self.num_keys();
        for i in from + 1..n {
            let off = self.slot_offset(i);
            write_u16(self.bytes, HEADER_END + (i - 1) * SLOT_WIDTH, off as u16);
        }
    }

    /// Overwrites the value of leaf slot `index` in place. Only valid when
    /// the new value is the same fixed size as the old one (true for
    /// `CacheEntry`, per spec.md §4.5 "Upsert").
    pub fn overwrite_leaf_value(&mut self, index: usize, value: &[u8]) {
        let (offset, len) = self.as_view().value_offset_at(index);
        assert_eq!(len, value.len(), "fixed-size value overwrite size mismatch");
        self.bytes[offset..offset + len].copy_from_slice(value);
    }

    /// Overwrites the child pointer of branch slot `index` in place, leaving
    /// its key untouched. Used to propagate a child's new page number up to
    /// its parent after a copy-on-write without needing a split.
    pub fn child_at_mut_set(&mut self, index: usize, child: Pgno) {
        debug_assert_eq!(self.kind(), PageKind::Branch);
        let rec = self.slot_offset(index);
        write_u64(self.bytes, rec + 2, child);
    }

    /// Removes slot `index`, compacting the slot directory. The vacated
    /// node-data bytes are not reclaimed within the page (spec.md §4.5,
    /// "Mark-and-sweep": "no leaf merge is performed in this generation").
    pub fn delete_leaf(&mut self, index: usize) {
        self.shift_slots_left(index);
        self.set_num_keys(self.num_keys() - 1);
        self.set_lower(self.lower() - SLOT_WIDTH);
    }

    pub fn raw(&self) -> &[u8] {
        self.bytes
    }

    pub fn raw_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_leaf() -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        PageViewMut::new(&mut buf).init_empty(PageKind::Leaf);
        buf
    }

    #[test]
    fn header_invariants_hold_after_init() {
        let buf = empty_leaf();
        let view = PageView::new(&buf);
        assert_eq!(view.num_keys(), 0);
        assert_eq!(view.lower(), HEADER_END);
        assert_eq!(view.upper(), PAGE_SIZE);
        assert!(HEADER_END <= view.lower());
        assert!(view.lower() <= view.upper());
        assert!(view.upper() <= PAGE_SIZE);
    }

    #[test]
    fn insert_and_lookup_leaf_entries_sorted() {
        let mut buf = empty_leaf();
        let mut page = PageViewMut::new(&mut buf);

        for (k, v) in [("b", "2"), ("a", "1"), ("d", "4"), ("c", "3")] {
            let result = page.as_view().search(k.as_bytes());
            let idx = match result {
                SearchResult::Found(i) => i,
                SearchResult::NotFound(i) => i,
            };
            assert!(page.fits_leaf_insert(k.as_bytes(), v.as_bytes()));
            page.insert_leaf(idx, k.as_bytes(), v.as_bytes());
        }

        let view = page.as_view();
        assert_eq!(view.num_keys(), 4);
        let keys: Vec<_> = (0..4).map(|i| view.key_at(i).to_vec()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
        assert_eq!(view.value_at(2), b"3");
    }

    #[test]
    fn overwrite_in_place_does_not_move_other_slots() {
        let mut buf = empty_leaf();
        let mut page = PageViewMut::new(&mut buf);
        page.insert_leaf(0, b"k", &[0u8; 40]);
        page.overwrite_leaf_value(0, &[7u8; 40]);
        assert_eq!(page.as_view().value_at(0), &[7u8; 40]);
        assert_eq!(page.as_view().num_keys(), 1);
    }

    #[test]
    fn delete_compacts_slot_directory() {
        let mut buf = empty_leaf();
        let mut page = PageViewMut::new(&mut buf);
        page.insert_leaf(0, b"a", b"1");
        page.insert_leaf(1, b"b", b"2");
        page.insert_leaf(2, b"c", b"3");
        page.delete_leaf(1);

        let view = page.as_view();
        assert_eq!(view.num_keys(), 2);
        assert_eq!(view.key_at(0), b"a");
        assert_eq!(view.key_at(1), b"c");
    }

    #[test]
    fn child_at_mut_set_updates_pointer_only() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut page = PageViewMut::new(&mut buf);
        page.init_empty(PageKind::Branch);
        page.insert_branch(0, b"", 10);
        page.insert_branch(1, b"m", 20);
        page.child_at_mut_set(1, 99);
        let view = page.as_view();
        assert_eq!(view.child_at(0), 10);
        assert_eq!(view.child_at(1), 99);
        assert_eq!(view.key_at(1), b"m");
    }

    #[test]
    fn branch_child_index_follows_spec_rule() {
        assert_eq!(PageView::branch_child_index(SearchResult::NotFound(0)), 0);
        assert_eq!(PageView::branch_child_index(SearchResult::NotFound(3)), 2);
        assert_eq!(PageView::branch_child_index(SearchResult::Found(2)), 2);
    }
}
