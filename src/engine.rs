//! The orchestrator: binds the enumerator, fingerprint engine, worker pool,
//! verifier, `CACHE`, and reporter together (spec.md §4.7). This is the
//! explicit context threaded through every call in place of the teacher's
//! `Database::global()` singleton (spec.md §9, "Global mutable state").

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::archive::{resolve_content, ArchiveExtractor};
use crate::bucket::BucketMap;
use crate::cache::{Cache, OpenFlags};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::filter::PathFilter;
use crate::fileref::{FileId, FileRef};
use crate::fingerprint::{self, Fingerprint128};
use crate::heap::SizeHeap;
use crate::pool::{TaskOutcome, WorkerPool};
use crate::reporter::{build_groups, write_json_report, write_text_report};

/// Progress counters guarded by one mutex (spec.md §5, "Shared-resource
/// policy": "The progress counters ... are guarded by a dedicated mutex").
#[derive(Default)]
pub struct ProgressCounters {
    pub files_processed: usize,
    pub total_files: usize,
}

pub struct EngineStats {
    pub progress: Mutex<ProgressCounters>,
    pub cache_hits: AtomicUsize,
    pub cache_misses: AtomicUsize,
}

impl Default for EngineStats {
    fn default() -> Self {
        Self {
            progress: Mutex::new(ProgressCounters::default()),
            cache_hits: AtomicUsize::new(0),
            cache_misses: AtomicUsize::new(0),
        }
    }
}

/// The engine arena (spec.md §3, "Ownership rules"): exclusively owns
/// `FileRef`, `SizeBucket`, the fingerprint arrays, and the Visited set (the
/// latter living inside `Cache`).
pub struct Engine {
    pub config: EngineConfig,
    pub arena: Vec<FileRef>,
    pub heap: SizeHeap,
    pub buckets: BucketMap,
    pub cache: Option<Arc<Cache>>,
    pub filter: PathFilter,
    pub archive: ArchiveExtractor,
    pub stats: Arc<EngineStats>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let mut filter = PathFilter::new(config.show_hidden);
        for name in &config.ignore_names {
            filter = filter.with_ignore_names(name);
        }
        for pattern in &config.ignore_regex {
            filter = filter.with_blacklist(pattern, config.case_insensitive)?;
        }
        for pattern in &config.whitelist_regex {
            filter = filter.with_whitelist(pattern, config.case_insensitive)?;
        }

        let cache = match &config.cache_path {
            Some(path) => Some(Arc::new(Cache::open(path, OpenFlags::default())?)),
            None => None,
        };

        Ok(Self {
            config,
            arena: Vec::new(),
            heap: SizeHeap::new(),
            buckets: BucketMap::new(),
            cache,
            filter,
            archive: ArchiveExtractor::new(),
            stats: Arc::new(EngineStats::default()),
        })
    }

    /// Allocates a `FileRef` in the arena, pushes it into the size heap and
    /// bucket map, and returns its stable `FileId` (spec.md §3, "FileRef":
    /// "created by Enumerator, immutable thereafter").
    pub fn alloc_file(&mut self, file: FileRef) -> FileId {
        let id = FileId(self.arena.len() as u32);
        let size = file.size;
        self.arena.push(file);
        self.heap.push(size, id);
        self.buckets.insert(size, id);
        id
    }

    /// Runs the full pipeline (spec.md §4.7) and returns the process exit
    /// code: 0 on success, 1 on a runtime error or fewer than two candidates.
    pub fn run(&mut self, out: &mut impl std::io::Write) -> EngineResult<i32> {
        let roots = self.config.roots.clone();
        crate::enumerator::enumerate_roots(self, &roots)?;

        // spec.md §4.7 step 3 ("heap is empty") and §6's exit-code table
        // ("fewer than two candidate files") describe the same gate; fewer
        // than two files enumerated can never yield a duplicate pair.
        if self.heap.len() < 2 {
            eprintln!("submit at least two files");
            return Ok(1);
        }

        // spec.md §4.2: a per-file fingerprint failure only excludes that
        // slot; it must not stop the reporter from running over everything
        // that did succeed. The failure count is folded into the exit code
        // after the report and cache sweep, not bubbled as an `Err`.
        let failures = self.fingerprint_stage();

        let mut report_heap = SizeHeap::new();
        for (&size, bucket) in self.buckets.iter().filter(|(_, b)| b.count() >= 2) {
            for &id in &bucket.files {
                report_heap.push(size, id);
            }
        }

        let groups = build_groups(&mut report_heap, &self.buckets, &self.arena, self.config.excess_threshold);
        if self.config.json {
            write_json_report(out, &groups, &self.arena, self.config.record_separator)?;
        } else {
            write_text_report(out, &groups, &self.arena, self.config.sized_header, self.config.record_separator)?;
        }

        if let Some(cache) = &self.cache {
            if !self.config.dry_run {
                let removed = cache.sweep()?;
                info!("cache sweep removed {removed} stale entries");
            }
        }

        if failures > 0 {
            warn!("{failures} file(s) failed to fingerprint; see warnings above");
            return Ok(1);
        }

        Ok(0)
    }

    /// spec.md §4.7 step 5 (fingerprinting half): dispatches one task per
    /// file in every bucket of 3+ files (0-size and 2-file buckets are
    /// resolved directly by the verifier inside `build_groups`, so no
    /// fingerprinting work is dispatched for them). Each task writes its
    /// result into its own slot of a shared, arena-sized results vector —
    /// since every slot is touched by exactly one task, the per-slot mutex
    /// is never contended, matching spec.md §4.2's "written per-slot without
    /// locking" in everything but name.
    ///
    /// Returns the number of files that failed to fingerprint (spec.md §7,
    /// "the reporter never aborts on individual-file errors"); the caller
    /// folds this into the process exit code once reporting is done.
    fn fingerprint_stage(&mut self) -> usize {
        let pool = WorkerPool::new(self.config.num_threads);
        let excess_threshold = self.config.excess_threshold;
        let dry_run = self.config.dry_run;

        let targets: Vec<(i64, usize, FileId)> = self
            .buckets
            .iter()
            .filter(|(&size, b)| size != 0 && b.count() >= 3)
            .flat_map(|(&size, b)| b.files.iter().enumerate().map(move |(slot, &id)| (size, slot, id)))
            .collect();

        let results: Arc<Vec<Mutex<Option<Fingerprint128>>>> =
            Arc::new((0..self.arena.len()).map(|_| Mutex::new(None)).collect());

        for (_size, _slot, id) in &targets {
            let file = self.arena[id.0 as usize].clone();
            let cache = self.cache.clone();
            let stats = Arc::clone(&self.stats);
            let results = Arc::clone(&results);
            let id = *id;
            pool.add(move || fingerprint_task(file, id, cache, stats, results, excess_threshold, dry_run));
        }
        pool.wait();

        for (size, slot, id) in targets {
            if let Some(fp) = *results[id.0 as usize].lock().unwrap() {
                self.buckets.get_mut(size).unwrap().set_fingerprint(slot, fp);
            }
        }

        let failures = pool.failure_count();
        pool.shutdown();
        failures
    }
}

/// One fingerprint worker task: consult the cache, compute on miss, store
/// back on miss, and record the outcome in `results[id]` (spec.md §4.2).
fn fingerprint_task(
    file: FileRef,
    id: FileId,
    cache: Option<Arc<Cache>>,
    stats: Arc<EngineStats>,
    results: Arc<Vec<Mutex<Option<Fingerprint128>>>>,
    excess_threshold: i64,
    dry_run: bool,
) -> TaskOutcome {
    let key = file.cache_key();

    let fp = if let Some(cache) = &cache {
        match fingerprint::lookup_cached(cache, &key, file.mtime, file.ctime, file.size) {
            Some(hit) => {
                stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                Some(hit.fingerprint)
            }
            None => {
                stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                match compute_fingerprint(&file, excess_threshold) {
                    Ok(fp) => {
                        if !dry_run {
                            let _ = fingerprint::store_fingerprint(
                                cache, &key, file.mtime, file.ctime, file.size, fp,
                            );
                        }
                        Some(fp)
                    }
                    Err(e) => {
                        warn!("fingerprint failed for {}: {e}", file.path.display());
                        None
                    }
                }
            }
        }
    } else {
        match compute_fingerprint(&file, excess_threshold) {
            Ok(fp) => Some(fp),
            Err(e) => {
                warn!("fingerprint failed for {}: {e}", file.path.display());
                None
            }
        }
    };

    let failed = fp.is_none();
    *results[id.0 as usize].lock().unwrap() = fp;
    {
        let mut progress = stats.progress.lock().unwrap();
        progress.files_processed += 1;
    }
    if failed {
        TaskOutcome::Failed
    } else {
        TaskOutcome::Ok
    }
}

/// Resolves `file` to its readable content (materializing archive members to
/// a scratch file) and fingerprints it, dropping the scratch file as soon as
/// fingerprinting is done (spec.md §4.2, "Archive members").
fn compute_fingerprint(file: &FileRef, excess_threshold: i64) -> EngineResult<Fingerprint128> {
    let extractor = ArchiveExtractor::new();
    let source = resolve_content(&extractor, file)?;
    fingerprint::fingerprint_file(source.path(), file.size, excess_threshold)
}
