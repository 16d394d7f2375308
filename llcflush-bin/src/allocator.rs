//! Allocation strategy selection for the swept region.
//!
//! The huge page pool is the default and the only strategy that guarantees a
//! contiguous, TLB friendly region. Regular pages have to be requested explicitly;
//! a failed huge page allocation is never retried with them.

use clap::ValueEnum;
use llcflush_core::allocator::{AnonymousAllocator, alloc_region};
use llcflush_core::memory::Region;
use llcflush_core::util::Size;
use llcflush_hugetlb::{HugepageSize, HugetlbAllocator};
use serde::Serialize;
use thiserror::Error;

/// Where the swept region comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
pub enum AllocStrategy {
    /// Huge pages from the hugetlbfs pool (`MAP_HUGETLB`)
    Hugetlb,
    /// Regular 4 KB pages
    Mmap,
}

/// Huge page size requested from the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
pub enum HugepageSizeArg {
    /// The kernel's default huge page size
    Default,
    /// 2 MB pages
    #[value(name = "2m")]
    TwoMb,
    /// 1 GB pages
    #[value(name = "1g")]
    OneGb,
}

impl From<HugepageSizeArg> for HugepageSize {
    fn from(value: HugepageSizeArg) -> Self {
        match value {
            HugepageSizeArg::Default => HugepageSize::Default,
            HugepageSizeArg::TwoMb => HugepageSize::TwoMb,
            HugepageSizeArg::OneGb => HugepageSize::OneGb,
        }
    }
}

/// The region could not be allocated.
#[derive(Debug, Error)]
pub enum AllocError {
    /// Huge page allocation failed
    #[error(transparent)]
    Hugetlb(#[from] llcflush_hugetlb::Error),
    /// Regular page allocation failed
    #[error("allocation of regular pages failed: {0}")]
    Mmap(#[from] std::io::Error),
}

/// Allocates the region to sweep with the selected strategy.
///
/// # Errors
///
/// Returns an [`AllocError`] if the strategy cannot provide `size` bytes.
pub fn allocate(
    strategy: AllocStrategy,
    hugepage_size: HugepageSizeArg,
    size: Size,
) -> Result<Region, AllocError> {
    match strategy {
        AllocStrategy::Hugetlb => {
            let mut allocator = HugetlbAllocator::new(hugepage_size.into());
            Ok(alloc_region(&mut allocator, size)?)
        }
        AllocStrategy::Mmap => {
            warn!("Using regular pages: the region is neither physically contiguous nor free of TLB misses");
            Ok(alloc_region(&mut AnonymousAllocator::default(), size)?)
        }
    }
}
