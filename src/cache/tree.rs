//! B+tree operations over a `Transaction`'s snapshot: `find_leaf`, `lookup`,
//! `upsert`, and leaf/branch splits (spec.md §4.5).

use crate::cache::page::{PageKind, PageView, PageViewMut, Pgno, SearchResult};
use crate::cache::txn::Transaction;

/// Walks from `txn.root_pgno` to the leaf that would contain `key`. The
/// traversal only ever follows pages reachable from the snapshot's root, so
/// it is monotone: it never observes pages written by a later transaction
/// (spec.md §4.5, "Find leaf").
fn find_leaf(txn: &Transaction, key: &[u8]) -> Pgno {
    let mut pgno = txn.root_pgno;
    loop {
        let view = txn.page_at(pgno);
        match view.kind() {
            PageKind::Leaf => return pgno,
            PageKind::Branch => {
                let idx = PageView::branch_child_index(view.search(key));
                pgno = view.child_at(idx);
            }
        }
    }
}

/// `lookup(key)`: returns the stored `CacheEntry` bytes, borrowed from the
/// transaction's snapshot (zero-copy), or `None` if absent.
pub fn lookup<'t>(txn: &'t Transaction, key: &[u8]) -> Option<&'t [u8]> {
    if txn.root_pgno == 0 {
        return None;
    }
    let leaf_pgno = find_leaf(txn, key);
    let view = txn.page_at(leaf_pgno);
    match view.search(key) {
        SearchResult::Found(i) => {
            let (offset, len) = view.value_offset_at(i);
            let bytes = view.raw();
            Some(&bytes[offset..offset + len])
        }
        SearchResult::NotFound(_) => None,
    }
}

/// Result of a recursive insert: the (possibly new) page number replacing
/// the page that was passed in, and an optional split to propagate upward
/// as `(separator_key, right_pgno)`.
struct InsertResult {
    pgno: Pgno,
    split: Option<(Vec<u8>, Pgno)>,
}

fn insert_leaf(txn: &mut Transaction, pgno: Pgno, key: &[u8], value: &[u8]) -> InsertResult {
    let search = txn.page_at(pgno).search(key);
    let (new_pgno, mut page) = txn.writable_view(pgno);

    match search {
        SearchResult::Found(i) => {
            page.overwrite_leaf_value(i, value);
            InsertResult { pgno: new_pgno, split: None }
        }
        SearchResult::NotFound(i) => {
            if page.fits_leaf_insert(key, value) {
                page.insert_leaf(i, key, value);
                InsertResult { pgno: new_pgno, split: None }
            } else {
                split_leaf_and_insert(txn, new_pgno, i, key, value)
            }
        }
    }
}

/// Splits a leaf at the midpoint slot, inserting `key`/`value` on whichever
/// side it belongs (spec.md §4.5, "Leaf split").
fn split_leaf_and_insert(
    txn: &mut Transaction,
    left_pgno: Pgno,
    insert_at: usize,
    key: &[u8],
    value: &[u8],
) -> InsertResult {
    let (keys, values) = {
        let (_, left) = txn.writable_view(left_pgno);
        let view = left.as_view();
        let n = view.num_keys();
        let mut keys: Vec<Vec<u8>> = (0..n).map(|i| view.key_at(i).to_vec()).collect();
        let mut values: Vec<Vec<u8>> = (0..n).map(|i| view.value_at(i).to_vec()).collect();
        keys.insert(insert_at, key.to_vec());
        values.insert(insert_at, value.to_vec());
        (keys, values)
    };

    let mid = keys.len().div_ceil(2);

    {
        let (_, mut left) = txn.writable_view(left_pgno);
        left.init_empty(PageKind::Leaf);
        for i in 0..mid {
            left.insert_leaf(i, &keys[i], &values[i]);
        }
    }

    let (right_pgno, right_buf) = txn.new_page();
    let mut right = PageViewMut::new(right_buf.as_mut_slice());
    right.init_empty(PageKind::Leaf);
    for (slot, i) in (mid..keys.len()).enumerate() {
        right.insert_leaf(slot, &keys[i], &values[i]);
    }

    let separator = keys[mid].clone();
    InsertResult { pgno: left_pgno, split: Some((separator, right_pgno)) }
}

fn insert_branch(txn: &mut Transaction, pgno: Pgno, key: &[u8], value: &[u8]) -> InsertResult {
    let view = txn.page_at(pgno);
    let search = view.search(key);
    let child_idx = PageView::branch_child_index(search);
    let child_pgno = view.child_at(child_idx);

    let child_result = insert_into(txn, child_pgno, key, value);

    let (new_pgno, mut page) = txn.writable_view(pgno);
    page.child_at_mut_set(child_idx, child_result.pgno);

    let Some((sep, right_pgno)) = child_result.split else {
        return InsertResult { pgno: new_pgno, split: None };
    };

    let insert_at = child_idx + 1;
    if page.fits_branch_insert(&sep) {
        page.insert_branch(insert_at, &sep, right_pgno);
        InsertResult { pgno: new_pgno, split: None }
    } else {
        split_branch_and_insert(txn, new_pgno, insert_at, &sep, right_pgno)
    }
}

fn split_branch_and_insert(
    txn: &mut Transaction,
    left_pgno: Pgno,
    insert_at: usize,
    sep: &[u8],
    right_child: Pgno,
) -> InsertResult {
    // `keys_full[i]` (i >= 1) is the separator preceding `children[i]`;
    // `keys_full[0]` is an unused placeholder, matching the on-page slot
    // layout where slot 0 carries the leftmost child and no real key.
    let (keys_full, children) = {
        let (_, left) = txn.writable_view(left_pgno);
        let view = left.as_view();
        let n = view.num_keys();
        let mut keys_full: Vec<Vec<u8>> = (0..n).map(|i| view.key_at(i).to_vec()).collect();
        let mut children: Vec<Pgno> = (0..n).map(|i| view.child_at(i)).collect();
        keys_full.insert(insert_at, sep.to_vec());
        children.insert(insert_at, right_child);
        (keys_full, children)
    };

    let mid = children.len() / 2;
    let up_separator = keys_full[mid].clone();

    {
        let (_, mut left) = txn.writable_view(left_pgno);
        left.init_empty(PageKind::Branch);
        left.insert_branch(0, b"", children[0]);
        for i in 1..mid {
            left.insert_branch(i, &keys_full[i], children[i]);
        }
    }

    let (right_pgno, right_buf) = txn.new_page();
    let mut right = PageViewMut::new(right_buf.as_mut_slice());
    right.init_empty(PageKind::Branch);
    right.insert_branch(0, b"", children[mid]);
    for (slot, i) in (mid + 1..children.len()).enumerate() {
        right.insert_branch(slot + 1, &keys_full[i], children[i]);
    }

    InsertResult { pgno: left_pgno, split: Some((up_separator, right_pgno)) }
}

fn insert_into(txn: &mut Transaction, pgno: Pgno, key: &[u8], value: &[u8]) -> InsertResult {
    match txn.page_at(pgno).kind() {
        PageKind::Leaf => insert_leaf(txn, pgno, key, value),
        PageKind::Branch => insert_branch(txn, pgno, key, value),
    }
}

/// `upsert(key, value)`: inserts or overwrites, splitting and growing the
/// tree's height as needed (spec.md §4.5, "Upsert", "Leaf split").
pub fn upsert(txn: &mut Transaction, key: &[u8], value: &[u8]) {
    if txn.root_pgno == 0 {
        let (pgno, buf) = txn.new_page();
        let mut page = PageViewMut::new(buf.as_mut_slice());
        page.init_empty(PageKind::Leaf);
        page.insert_leaf(0, key, value);
        txn.root_pgno = pgno;
        return;
    }

    let result = insert_into(txn, txn.root_pgno, key, value);
    match result.split {
        None => txn.root_pgno = result.pgno,
        Some((sep, right_pgno)) => {
            let (root_pgno, buf) = txn.new_page();
            let mut root = PageViewMut::new(buf.as_mut_slice());
            root.init_empty(PageKind::Branch);
            root.insert_branch(0, b"", result.pgno);
            root.insert_branch(1, &sep, right_pgno);
            txn.root_pgno = root_pgno;
        }
    }
}

/// Deletes `key` if present. Leaves that become empty remain allocated (no
/// merge in this generation of the design, spec.md §9 "Open questions").
/// Returns true if a key was removed.
pub fn delete(txn: &mut Transaction, key: &[u8]) -> bool {
    if txn.root_pgno == 0 {
        return false;
    }
    let leaf_pgno = find_leaf(txn, key);
    match txn.page_at(leaf_pgno).search(key) {
        SearchResult::Found(i) => {
            let (new_pgno, mut page) = txn.writable_view(leaf_pgno);
            page.delete_leaf(i);
            // Leaves are addressed only through their parent's child
            // pointer, which was set during the original insert's
            // propagation; since we don't merge/rewrite ancestors on
            // delete, the parent still points at `leaf_pgno`'s *shadow*
            // chain by page number identity only if this is the same
            // write transaction's view, which `get_writable`'s dedup
            // guarantees. Cross-transaction deletes must re-shadow the
            // whole ancestor path; `propagate_child_update` does that.
            propagate_child_update(txn, leaf_pgno, new_pgno, key);
            true
        }
        SearchResult::NotFound(_) => false,
    }
}

/// Re-walks from the root to `key`, replacing the child pointer that led to
/// `old_child` with `new_child` at every branch level, copy-on-write. Used
/// by `delete`, whose single-page mutation still needs the same upward
/// pointer-fixup that `upsert`'s recursive insert performs inline.
fn propagate_child_update(txn: &mut Transaction, old_child: Pgno, new_child: Pgno, key: &[u8]) {
    if old_child == new_child {
        return;
    }
    if txn.root_pgno == old_child {
        txn.root_pgno = new_child;
        return;
    }

    let mut path = Vec::new();
    let mut pgno = txn.root_pgno;
    loop {
        let view = txn.page_at(pgno);
        if view.kind() == PageKind::Leaf {
            break;
        }
        let idx = PageView::branch_child_index(view.search(key));
        let child = view.child_at(idx);
        path.push((pgno, idx));
        if child == old_child {
            break;
        }
        pgno = child;
    }

    let mut replacement = new_child;
    for (pgno, idx) in path.into_iter().rev() {
        let (new_pgno, mut page) = txn.writable_view(pgno);
        page.child_at_mut_set(idx, replacement);
        replacement = new_pgno;
    }
    txn.root_pgno = replacement;
}
