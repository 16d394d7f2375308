//! # llcflush
//!
//! Facade over the llcflush workspace: the sweep driver, primitives and region
//! handling from `llcflush-core`, plus the huge page allocator from
//! `llcflush-hugetlb` behind the default `hugetlb` feature.
//!
//! ```no_run
//! use llcflush::allocator::alloc_region;
//! use llcflush::hugetlb::HugetlbAllocator;
//! use llcflush::sink::Discard;
//! use llcflush::util::LLC_SIZE;
//! use llcflush::{Sweep, SweepConfig};
//!
//! let region = alloc_region(&mut HugetlbAllocator::default(), LLC_SIZE)?;
//! let report = Sweep::new(SweepConfig::default()).run(&region, &mut Discard);
//! assert_eq!(report.lines, 245760);
//! # Ok::<(), llcflush::hugetlb::Error>(())
//! ```

pub use llcflush_core::*;

#[cfg(feature = "hugetlb")]
pub use llcflush_hugetlb as hugetlb;
