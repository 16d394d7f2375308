use crate::HugePagePool;
use lazy_static::lazy_static;
use libc::{MAP_HUGE_1GB, MAP_HUGE_2MB, MAP_HUGETLB, MAP_POPULATE, c_int};
use llcflush_core::allocator::RegionAllocator;
use llcflush_core::memory::Region;
use llcflush_core::util::Size::{self, GB, MB};
use log::{debug, warn};
use thiserror::Error;

lazy_static! {
    static ref DEFAULT_HUGEPAGE_SIZE: Option<usize> = match HugePagePool::read() {
        Ok(pool) => pool.page_size,
        Err(e) => {
            warn!("Failed to read huge page size: {}", e);
            None
        }
    };
}

/// Supported huge page sizes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HugepageSize {
    /// The kernel's default huge page size (`Hugepagesize` in `/proc/meminfo`)
    #[default]
    Default,
    /// 2 Megabyte huge page
    TwoMb,
    /// 1 Gigabyte huge page
    OneGb,
}

impl HugepageSize {
    /// Page size in bytes, `None` if the default size cannot be determined.
    pub fn bytes(&self) -> Option<usize> {
        match self {
            HugepageSize::Default => *DEFAULT_HUGEPAGE_SIZE,
            HugepageSize::TwoMb => Some(MB(2).bytes()),
            HugepageSize::OneGb => Some(GB(1).bytes()),
        }
    }

    fn map_flags(&self) -> c_int {
        match self {
            HugepageSize::Default => 0,
            HugepageSize::TwoMb => MAP_HUGE_2MB,
            HugepageSize::OneGb => MAP_HUGE_1GB,
        }
    }
}

/// Region allocator drawing from the kernel's huge page pool.
///
/// Maps private anonymous memory with `MAP_HUGETLB`, pre-faulted with
/// `MAP_POPULATE`. The mapping is rounded up to whole huge pages and the whole
/// mapping is released when the region is dropped. There is no fallback to
/// regular pages: if the pool cannot satisfy the request, allocation fails.
#[derive(Debug, Default, Copy, Clone)]
pub struct HugetlbAllocator {
    size: HugepageSize,
}

impl HugetlbAllocator {
    /// Creates an allocator for huge pages of the given size.
    pub fn new(size: HugepageSize) -> Self {
        HugetlbAllocator { size }
    }
}

/// Errors that can happen during huge page allocation
#[derive(Debug, Error)]
pub enum Error {
    /// The kernel does not report a huge page size
    #[error("huge pages are not supported on this system (no Hugepagesize in /proc/meminfo)")]
    Unsupported,
    /// The huge page pool could not satisfy the mapping
    #[error(
        "allocation of {size} from the huge page pool failed: {source}. \
         Please verify that hugetlbfs is properly mounted and enough huge pages are reserved ({pool})"
    )]
    MapFailed {
        /// Requested region size
        size: Size,
        /// Pool state after the failure
        pool: HugePagePool,
        /// Error reported by `mmap`
        source: std::io::Error,
    },
}

impl RegionAllocator for HugetlbAllocator {
    type Error = Error;

    fn page_size(&self) -> Option<Size> {
        self.size.bytes().map(Size::B)
    }

    fn alloc_region(&mut self, size: Size) -> Result<Region, Self::Error> {
        let page_size = self.size.bytes().ok_or(Error::Unsupported)?;
        let mapped = size.round_up(page_size);
        if let Ok(pool) = HugePagePool::read() {
            debug!("Huge page pool before allocation: {}", pool);
            if pool.page_size == Some(page_size) && pool.available_bytes() < mapped.bytes() {
                warn!(
                    "Huge page pool holds {} bytes, the region needs {}",
                    pool.available_bytes(),
                    mapped.bytes()
                );
            }
        }
        Region::map_anonymous(
            size.bytes(),
            mapped.bytes(),
            MAP_HUGETLB | MAP_POPULATE | self.size.map_flags(),
        )
        .map_err(|source| Error::MapFailed {
            size,
            pool: HugePagePool::read().unwrap_or_default(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llcflush_core::memory::BytePointer;
    use llcflush_core::util::LLC_SIZE;

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(HugepageSize::TwoMb.bytes(), Some(2 << 20));
        assert_eq!(HugepageSize::OneGb.bytes(), Some(1 << 30));
        assert_eq!(
            HugetlbAllocator::new(HugepageSize::TwoMb).page_size(),
            Some(Size::B(2 << 20))
        );
        assert_eq!(
            HugetlbAllocator::default().page_size().map(|s| s.bytes()),
            HugepageSize::Default.bytes()
        );
    }

    #[test]
    fn test_exhausted_pool() {
        // no system reserves 64 TB of huge pages
        let mut allocator = HugetlbAllocator::default();
        match allocator.alloc_region(Size::GB(64 << 10)) {
            Ok(_) => panic!("64 TB huge page allocation succeeded"),
            Err(Error::Unsupported) => {}
            Err(e @ Error::MapFailed { .. }) => {
                let msg = e.to_string();
                assert!(msg.contains("huge page pool failed"), "{}", msg);
                assert!(msg.contains("HugePages_Free"), "{}", msg);
            }
        }
    }

    #[test]
    #[ignore = "requires a reserved huge page pool"]
    fn test_llc_region() -> anyhow::Result<()> {
        let mut allocator = HugetlbAllocator::new(HugepageSize::TwoMb);
        let region = allocator.alloc_region(LLC_SIZE)?;
        assert_eq!(region.len(), LLC_SIZE.bytes());
        assert_eq!(region.mapped_len(), MB(16).bytes());
        assert_eq!(region.ptr() as usize % MB(2).bytes(), 0);
        unsafe {
            *region.addr(LLC_SIZE.bytes() - 1) = 0xAA;
            assert_eq!(*region.addr(0), 0);
        }
        Ok(())
    }
}
