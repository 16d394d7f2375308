//! # llcflush Core
//!
//! `llcflush-core` contains the building blocks of the llcflush benchmark, which
//! evicts a last-level-cache sized memory region line by line and optionally
//! measures the cost of each eviction.
//!
//! ## Architecture Overview
//!
//! The benchmark is a straight pipeline: allocate a region, sweep it, release it.
//! Each step is backed by a small interface:
//!
//! - [`arch::CycleCounter`] and [`arch::LineFlusher`] - The two hardware primitives
//!   the sweep relies on. Exactly one implementation exists per supported target
//!   ([`arch::Rdtscp`] and [`arch::Clflush`] on x86_64).
//!
//! - [`allocator::RegionAllocator`] - Strategies for obtaining the [`memory::Region`]
//!   that gets swept. The huge page backed allocator lives in `llcflush-hugetlb`.
//!
//! - [`sweep::Sweep`] - The driver that touches, optionally times, and flushes every
//!   cache line of a region, reporting per-line timings to a [`sink::TimingSink`].
//!
//! ## Platform Support
//!
//! x86_64 Linux only. Building for any other architecture fails. Physical layout
//! analysis ([`memory::PageLayout`]) reads `/proc/self/pagemap` and needs root
//! privileges to see real frame numbers.

#![warn(missing_docs)]

pub mod allocator;
pub mod arch;
pub mod memory;
pub mod sink;
pub mod sweep;
pub mod util;

pub use sweep::{LineTiming, Sweep, SweepConfig, SweepReport, VerifyMode};
