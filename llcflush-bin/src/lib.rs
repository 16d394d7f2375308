//! # llcflush
//!
//! llcflush evicts a last-level-cache sized memory region from the whole cache
//! hierarchy, one cache line at a time, and optionally measures how long a read
//! takes right before and right after each line is flushed.
//!
//! ## Quickstart guide
//!
//! Reserve enough huge pages for the region, then build and run:
//!
//! ```sh
//! # 8 x 2 MB huge pages cover the default 15 MB region
//! echo 8 | sudo tee /proc/sys/vm/nr_hugepages
//!
//! cargo build --release
//! cargo run --release --bin=llc-flush -- --verify
//!```
//!
//! In verification mode every visited line produces one line on stdout with the
//! line's address, the cycles of the read before the flush (cache hit) and the
//! cycles of the read after the flush (served from memory). Logs go to stderr
//! and are controlled with `RUST_LOG`.
//!
//! ## Modules
//!
//! - `allocator`: Selects the allocation strategy for the swept region.
pub mod allocator;

#[macro_use]
extern crate log;

use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

/// Sets up `env_logger` (default level `info`) routed through a progress bar container.
///
/// # Errors
///
/// Returns an error if a logger has already been installed.
pub fn init_logging_with_progress() -> anyhow::Result<MultiProgress> {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let level = logger.filter();
    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    log::set_max_level(level);
    Ok(progress)
}
