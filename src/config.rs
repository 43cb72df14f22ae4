//! `EngineConfig`: the plain struct the orchestrator consumes (spec.md §6).
//! No parsing logic lives here — `src/bin/dupfind.rs` builds one from
//! `clap`-parsed CLI arguments, keeping the external-parser boundary spec.md
//! draws around flag parsing.

use std::path::PathBuf;

/// Default online-CPU-bounded worker count (spec.md §4.2, "Concurrency").
pub fn default_num_threads() -> usize {
    num_cpus::get().clamp(1, 256)
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub roots: Vec<PathBuf>,
    pub show_hidden: bool,
    pub case_insensitive: bool,
    pub sized_header: bool,
    pub ignore_regex: Vec<String>,
    pub whitelist_regex: Vec<String>,
    pub follow_symlinks: bool,
    pub ignore_names: Vec<String>,
    pub num_threads: usize,
    pub min_size: i64,
    pub max_size: i64,
    pub dry_run: bool,
    pub priority_path: Option<PathBuf>,
    pub recurse: bool,
    pub record_separator: char,
    pub untar: bool,
    pub verbose: bool,
    pub excess_threshold: i64,
    pub json: bool,
    pub cache_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            show_hidden: false,
            case_insensitive: false,
            sized_header: false,
            ignore_regex: Vec::new(),
            whitelist_regex: Vec::new(),
            follow_symlinks: false,
            ignore_names: Vec::new(),
            num_threads: default_num_threads(),
            min_size: 0,
            max_size: 0,
            dry_run: false,
            priority_path: None,
            recurse: true,
            record_separator: '\n',
            untar: false,
            verbose: false,
            excess_threshold: 1 << 20,
            json: false,
            cache_path: None,
        }
    }
}
