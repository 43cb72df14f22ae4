//! The `dupfind` CLI: parses arguments with `clap` and hands a plain
//! `EngineConfig` to the library crate (spec.md §6, "External interfaces").
//! No engine logic lives here; this binary is purely the external-parser
//! boundary spec.md draws around flag parsing, size parsing, and process
//! exit codes.

use std::path::PathBuf;

use clap::Parser;

use dupfind::config::default_num_threads;
use dupfind::size::parse_human_size;
use dupfind::{Engine, EngineConfig, EngineError, EngineResult};

/// Parallel filesystem duplicate-finder with an embedded fingerprint cache.
#[derive(Parser, Debug)]
#[command(name = "dupfind", version, about)]
struct Cli {
    /// Root paths to scan for duplicates.
    #[arg(required = true)]
    roots: Vec<PathBuf>,

    /// Include hidden entries.
    #[arg(short = 'a')]
    all: bool,

    /// Case-insensitive regex matching.
    #[arg(short = 'c')]
    case_insensitive: bool,

    /// Emit a size header per duplicate group.
    #[arg(short = 'd')]
    sized: bool,

    /// Ignore-regex blacklist; may be repeated.
    #[arg(short = 'e', value_name = "REGEX")]
    ignore_regex: Vec<String>,

    /// Follow symlinks.
    #[arg(short = 'f')]
    follow_symlinks: bool,

    /// Comma-separated names to ignore; may be repeated.
    #[arg(short = 'i', value_name = "LIST")]
    ignore_names: Vec<String>,

    /// Worker pool size, 1-256 (default: online CPU count).
    #[arg(short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// Minimum size gate, human-readable (e.g. "1.5K").
    #[arg(short = 'm', value_name = "SIZE")]
    min_size: Option<String>,

    /// Maximum size gate, human-readable; omit or 0 for none.
    #[arg(short = 'M', value_name = "SIZE")]
    max_size: Option<String>,

    /// Dry run: report duplicates but never persist cache writes.
    #[arg(short = 'n')]
    dry_run: bool,

    /// Memory-conservative mode: always use the chunked read path.
    #[arg(short = 'o')]
    memory_conservative: bool,

    /// Priority path: its files are grouped as the anchor of each set.
    #[arg(short = 'p', value_name = "PATH")]
    priority_path: Option<PathBuf>,

    /// Recurse into subdirectories (default).
    #[arg(short = 'r', conflicts_with = "no_recurse")]
    recurse: bool,

    /// Do not recurse into subdirectories.
    #[arg(short = 'R')]
    no_recurse: bool,

    /// Record separator character terminating each printed path.
    #[arg(short = 's', value_name = "C")]
    separator: Option<char>,

    /// Expand tar archives and treat members as candidates.
    #[arg(short = 't')]
    untar: bool,

    /// Verbose progress output.
    #[arg(short = 'v')]
    verbose: bool,

    /// Whitelist-regex; may be repeated.
    #[arg(short = 'w', value_name = "REGEX")]
    whitelist_regex: Vec<String>,

    /// mmap/chunked threshold, human-readable.
    #[arg(short = 'x', value_name = "SIZE")]
    excess_threshold: Option<String>,

    /// JSON reporter instead of plain text.
    #[arg(short = 'J')]
    json: bool,

    /// Image-similarity mode. Not implemented by this engine.
    #[arg(short = 'I')]
    image_mode: bool,

    /// Image-similarity thread count. Not implemented by this engine.
    #[arg(short = 'T', value_name = "N")]
    image_threads: Option<usize>,

    /// Path to the persistent fingerprint cache file; omit to disable
    /// caching entirely for this run.
    #[arg(long = "cache-file", value_name = "PATH")]
    cache_file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    dupfind::log::init_log(cli.verbose);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("dupfind: {e}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> EngineResult<i32> {
    if cli.image_mode || cli.image_threads.is_some() {
        return Err(EngineError::InvalidArgument(
            "image-similarity mode (-I/-T) is a separate reporter, not implemented here".to_string(),
        ));
    }

    let min_size = cli.min_size.as_deref().map(parse_human_size).transpose()?.unwrap_or(0);
    let max_size = cli.max_size.as_deref().map(parse_human_size).transpose()?.unwrap_or(0);
    let mut excess_threshold =
        cli.excess_threshold.as_deref().map(parse_human_size).transpose()?.unwrap_or(1 << 20);
    if cli.memory_conservative && cli.excess_threshold.is_none() {
        excess_threshold = 0;
    }

    let num_threads = cli.jobs.map(|n| n.clamp(1, 256)).unwrap_or_else(default_num_threads);

    let config = EngineConfig {
        roots: cli.roots,
        show_hidden: cli.all,
        case_insensitive: cli.case_insensitive,
        sized_header: cli.sized,
        ignore_regex: cli.ignore_regex,
        whitelist_regex: cli.whitelist_regex,
        follow_symlinks: cli.follow_symlinks,
        ignore_names: cli.ignore_names,
        num_threads,
        min_size,
        max_size,
        dry_run: cli.dry_run,
        priority_path: cli.priority_path,
        recurse: !cli.no_recurse,
        record_separator: cli.separator.unwrap_or('\n'),
        untar: cli.untar,
        verbose: cli.verbose,
        excess_threshold,
        json: cli.json,
        cache_path: cli.cache_file,
    };

    let mut engine = Engine::new(config)?;
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    engine.run(&mut lock)
}
