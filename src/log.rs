use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Initializes the global logger. `verbose` raises the effective level to
/// `info` (progress output per `-v`) unless `RUST_LOG` already overrides it.
pub fn init_log(verbose: bool) {
    let mut builder = Builder::from_default_env();
    if verbose {
        builder.filter_level(LevelFilter::Info);
    }
    builder
        .format_timestamp_secs()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} - {}] [{}:{}] {}",
                record.level(),
                record.target(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();
}
