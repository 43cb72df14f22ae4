//! `CACHE`: the embedded, single-file, memory-mapped, copy-on-write B+tree
//! used to memoise fingerprints keyed by absolute path (spec.md §3, §4.5).
//!
//! This module ties together the page codec, the meta-page ping-pong, the
//! transaction layer, the tree algorithm, and mark-and-sweep into the public
//! surface spec.md §4.5 names: `open/close`, `begin_read/commit/abort`,
//! `lookup`, `upsert`, `mark_visited`, `sweep`.

pub mod entry;
pub mod env;
pub mod meta;
pub mod page;
pub mod tree;
pub mod txn;
pub mod visited;

use std::path::Path;

use crate::error::EngineResult;

pub use entry::CacheEntry;
pub use env::OpenFlags;
pub use txn::Transaction;
pub use visited::VisitedSet;

/// A read snapshot borrowed from a `Cache`. Alias kept for callers (the
/// fingerprint workers) that only ever read.
pub type ReadTxn<'a> = Transaction<'a>;

/// The cache facade: owns the memory-mapped environment and the run's
/// visited-path set.
pub struct Cache {
    env: env::Env,
    visited: VisitedSet,
}

impl Cache {
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> EngineResult<Self> {
        let env = env::Env::open(path, flags)?;
        Ok(Self { env, visited: VisitedSet::new() })
    }

    pub fn path(&self) -> &Path {
        self.env.path()
    }

    /// `begin_read(env)` (spec.md §4.5): captures the live snapshot with no
    /// lock acquired.
    pub fn begin_read(&self) -> ReadTxn<'_> {
        Transaction::begin_read(&self.env)
    }

    pub fn begin_write(&self) -> Transaction<'_> {
        Transaction::begin_write(&self.env)
    }

    /// `lookup(key)`: returns the stored `CacheEntry` if present (spec.md
    /// §4.5, "Lookup").
    pub fn lookup(&self, txn: &Transaction<'_>, key: &[u8]) -> Option<CacheEntry> {
        tree::lookup(txn, key).map(CacheEntry::from_bytes)
    }

    /// `upsert(key, value)` in its own write transaction, committing on
    /// success (spec.md §4.2, "On miss or mismatch").
    pub fn upsert(&self, key: &[u8], value: &CacheEntry) -> EngineResult<()> {
        let mut txn = self.begin_write();
        tree::upsert(&mut txn, key, &value.to_bytes());
        txn.commit()
    }

    /// `mark_visited(path)` (spec.md §4.5): thread-safe insertion into the
    /// run's Visited set.
    pub fn mark_visited(&self, key: &[u8]) {
        self.visited.mark(key);
    }

    /// `sweep()` (spec.md §4.5): deletes every cache entry whose key was not
    /// marked visited since the last sweep, and clears the Visited set.
    pub fn sweep(&self) -> EngineResult<usize> {
        self.visited.sweep(&self.env)
    }

    /// `close`: dropping the `Cache` unmaps the file and releases the
    /// writer-lock resources (spec.md §4.5, "Open/close").
    pub fn close(self) {}
}
