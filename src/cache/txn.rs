//! Read snapshots and write transactions (spec.md §3 "Transaction", §4.5
//! "Transactions").

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::env::{Env, WriterGuard};
use crate::cache::meta::Meta;
use crate::cache::page::{PageView, PageViewMut, Pgno, PAGE_SIZE};

pub enum TxnKind {
    Read,
    Write,
}

/// A snapshot `(txnid, root_pgno)` plus, for write transactions, the
/// copy-on-write dirty-page table.
///
/// Dirty pages are keyed by their *new* page number (allocated the first
/// time the page is touched in this transaction); `shadowed` maps the
/// original on-disk page number to that new number so a page touched twice
/// in the same transaction is only copied once. See DESIGN.md for why this
/// differs from a literal reading of spec.md's "keyed by original pgno,
/// written back to its original offset": that reading would let a
/// read transaction begun before a commit observe post-commit data through
/// an unmodified ancestor pointer, which spec.md §8 ("CACHE SWMR") rules
/// out.
pub struct Transaction<'env> {
    env: &'env Env,
    kind: TxnKind,
    pub txnid: u64,
    pub root_pgno: Pgno,
    new_last_pgno: Pgno,
    dirty: Option<HashMap<Pgno, Box<[u8; PAGE_SIZE]>>>,
    shadowed: HashMap<Pgno, Pgno>,
    _writer_guard: Option<WriterGuard<'env>>,
}

impl<'env> Transaction<'env> {
    pub fn begin_read(env: &'env Env) -> Self {
        let meta = env.live_meta();
        Self {
            env,
            kind: TxnKind::Read,
            txnid: meta.txnid,
            root_pgno: meta.root_pgno,
            new_last_pgno: meta.last_pgno,
            dirty: None,
            shadowed: HashMap::new(),
            _writer_guard: None,
        }
    }

    pub fn begin_write(env: &'env Env) -> Self {
        let guard = env.acquire_writer();
        let meta = env.live_meta();
        Self {
            env,
            kind: TxnKind::Write,
            txnid: meta.txnid + 1,
            root_pgno: meta.root_pgno,
            new_last_pgno: meta.last_pgno,
            dirty: Some(HashMap::new()),
            shadowed: HashMap::new(),
            _writer_guard: Some(guard),
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self.kind, TxnKind::Write)
    }

    /// Reads a page considering this transaction's own uncommitted writes.
    pub fn page_at(&self, pgno: Pgno) -> PageView<'_> {
        if let Some(dirty) = &self.dirty {
            if let Some(buf) = dirty.get(&pgno) {
                return PageView::new(buf.as_slice());
            }
        }
        self.env.page_at(pgno)
    }

    /// Allocates `count` brand-new pages (append-only; spec.md §4.5,
    /// "alloc_pages"), returning the first new page number.
    pub fn alloc_pages(&mut self, count: u64) -> Pgno {
        let first = self.new_last_pgno + 1;
        self.new_last_pgno += count;
        first
    }

    fn alloc_one(&mut self) -> Pgno {
        self.alloc_pages(1)
    }

    /// Copy-on-write: returns a writable buffer for `pgno`, which may be an
    /// original on-disk page number or a page number this transaction
    /// already shadowed (in which case the same buffer is returned again).
    pub fn get_writable(&mut self, pgno: Pgno) -> (Pgno, &mut [u8; PAGE_SIZE]) {
        assert!(self.is_write(), "get_writable called on a read transaction");

        if self.dirty.as_ref().unwrap().contains_key(&pgno) {
            return (pgno, self.dirty.as_mut().unwrap().get_mut(&pgno).unwrap());
        }
        if let Some(&new_pgno) = self.shadowed.get(&pgno) {
            return (new_pgno, self.dirty.as_mut().unwrap().get_mut(&new_pgno).unwrap());
        }

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(self.env.page_at(pgno).raw());
        let new_pgno = self.alloc_one();
        self.shadowed.insert(pgno, new_pgno);
        self.dirty.as_mut().unwrap().insert(new_pgno, buf);
        (new_pgno, self.dirty.as_mut().unwrap().get_mut(&new_pgno).unwrap())
    }

    /// Allocates and zero-initializes a brand-new page that shadows nothing
    /// (used for leaf/branch splits and the very first root page).
    pub fn new_page(&mut self) -> (Pgno, &mut [u8; PAGE_SIZE]) {
        assert!(self.is_write());
        let pgno = self.alloc_one();
        self.dirty.as_mut().unwrap().insert(pgno, Box::new([0u8; PAGE_SIZE]));
        (pgno, self.dirty.as_mut().unwrap().get_mut(&pgno).unwrap())
    }

    pub fn writable_view(&mut self, pgno: Pgno) -> (Pgno, PageViewMut<'_>) {
        let (new_pgno, buf) = self.get_writable(pgno);
        (new_pgno, PageViewMut::new(buf.as_mut_slice()))
    }

    /// Commits the transaction: flushes dirty pages, writes the opposite
    /// meta page, and flips the environment's live meta (spec.md §4.5,
    /// "Commit"). Consumes `self`; on success the writer lock is released.
    pub fn commit(mut self) -> crate::error::EngineResult<()> {
        let dirty = self.dirty.take().expect("commit called on a read transaction");
        let new_meta = Meta {
            magic: crate::cache::page::DB_MAGIC,
            version: crate::cache::page::DB_VERSION,
            txnid: self.txnid,
            root_pgno: self.root_pgno,
            last_pgno: self.new_last_pgno,
        };
        let pages = dirty.into_iter().map(|(pgno, buf)| (pgno, *buf));
        self.env.commit(pages, new_meta)
    }

    /// Aborts the transaction: drops the dirty-page table and releases the
    /// writer lock. No file I/O (spec.md §4.5, "Abort").
    pub fn abort(self) {
        // Drop does all the work: dirty table and writer guard are freed.
    }
}

/// Shared handle wrapping `Env`, for callers (the fingerprint workers) that
/// need `Arc`-style sharing across threads.
pub type SharedEnv = Arc<Env>;
