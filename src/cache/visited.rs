//! Mark-and-sweep staleness tracking (spec.md §4.5, "Mark-and-sweep"): every
//! path actually enumerated this run is marked visited; `sweep` then drops
//! cache entries for paths that were not, so entries for files removed or
//! renamed since the last run don't linger forever.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::cache::env::Env;
use crate::cache::page::PageKind;
use crate::cache::txn::Transaction;
use crate::cache::tree;
use crate::error::EngineResult;

/// Thread-safe accumulator of cache keys seen during one run. Workers call
/// `mark` as they fingerprint files; `sweep` consumes the set once, from a
/// single writer transaction, at the end of the run.
#[derive(Default)]
pub struct VisitedSet {
    keys: Mutex<HashSet<Vec<u8>>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self { keys: Mutex::new(HashSet::new()) }
    }

    pub fn mark(&self, key: &[u8]) {
        self.keys.lock().unwrap().insert(key.to_vec());
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deletes every cache entry whose key was not marked, in a single write
    /// transaction, and clears the set (spec.md §4.5, "Sweep"). Returns the
    /// number of entries removed.
    pub fn sweep(&self, env: &Env) -> EngineResult<usize> {
        let visited = self.keys.lock().unwrap();
        let mut stale = Vec::new();
        {
            let txn = Transaction::begin_read(env);
            collect_stale_keys(&txn, &visited, &mut stale);
        }

        let mut txn = Transaction::begin_write(env);
        for key in &stale {
            tree::delete(&mut txn, key);
        }
        txn.commit()?;
        drop(visited);
        self.keys.lock().unwrap().clear();
        Ok(stale.len())
    }
}

/// Walks every leaf page reachable from the snapshot root, collecting keys
/// absent from `visited`. Deletion happens afterward, in a separate write
/// transaction, so this read-only walk never has to cope with a page split
/// out from under it.
fn collect_stale_keys(txn: &Transaction, visited: &HashSet<Vec<u8>>, out: &mut Vec<Vec<u8>>) {
    if txn.root_pgno == 0 {
        return;
    }
    let mut stack = vec![txn.root_pgno];
    while let Some(pgno) = stack.pop() {
        let view = txn.page_at(pgno);
        match view.kind() {
            PageKind::Leaf => {
                for i in 0..view.num_keys() {
                    let key = view.key_at(i);
                    if !visited.contains(key) {
                        out.push(key.to_vec());
                    }
                }
            }
            PageKind::Branch => {
                for i in 0..view.num_keys() {
                    stack.push(view.child_at(i));
                }
            }
        }
    }
}
