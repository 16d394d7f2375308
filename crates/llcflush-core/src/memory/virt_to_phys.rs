use std::fmt::{Debug, Formatter};
use std::ops::{Add, Sub};

use crate::util::PAGE_SHIFT;
use itertools::Itertools;
use pagemap2::{PageMapError, VirtualMemoryArea};
use serde::Serialize;
use thiserror::Error;

/// Physical memory address.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysAddr(usize);

impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("PhysAddr(0x{:02x})", self.0))
    }
}

impl PhysAddr {
    /// Creates a new physical address.
    pub fn new(addr: usize) -> Self {
        PhysAddr(addr)
    }

    /// Returns the physical frame number containing this address.
    pub fn pfn(&self) -> u64 {
        (self.0 >> PAGE_SHIFT) as u64
    }
}

/// Trait for resolving virtual address ranges to physical pages.
pub trait VirtToPhysResolver {
    /// Errors that can occur during physical address resolution
    type Error;

    /// Translates every page of a virtual address range to its physical page address.
    ///
    /// # Errors
    ///
    /// Returns an error if address translation fails.
    fn get_phys_range(&mut self, region: VirtualMemoryArea) -> Result<Vec<PhysAddr>, Self::Error>;
}

/// Errors that can happen during PageMap operations
#[derive(Debug, Error)]
#[error(transparent)]
pub struct LinuxPageMapError(#[from] PageMapError);

/// Virtual to physical address translator using Linux pagemap.
///
/// Uses `/proc/self/pagemap`. Without root privileges the kernel reports every
/// frame number as zero.
pub struct LinuxPageMap {
    pagemap_wrapper: pagemap2::PageMap,
}

impl LinuxPageMap {
    /// Opens the pagemap of the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if opening `/proc/self/pagemap` fails.
    pub fn new() -> Result<LinuxPageMap, LinuxPageMapError> {
        Ok(LinuxPageMap {
            pagemap_wrapper: pagemap2::PageMap::new(std::process::id() as u64)?,
        })
    }
}

impl VirtToPhysResolver for LinuxPageMap {
    type Error = LinuxPageMapError;

    fn get_phys_range(
        &mut self,
        memory_region: VirtualMemoryArea,
    ) -> Result<Vec<PhysAddr>, Self::Error> {
        let entries = self.pagemap_wrapper.pagemap_vma(&memory_region)?;
        entries
            .into_iter()
            .map(|e| {
                e.pfn()
                    .map(|pfn| PhysAddr((pfn << PAGE_SHIFT) as usize))
                    .map_err(LinuxPageMapError::from)
            })
            .try_collect()
    }
}

impl std::fmt::Pointer for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:p}", self.0 as *const u8)
    }
}

impl Add<usize> for PhysAddr {
    type Output = PhysAddr;

    fn add(self, rhs: usize) -> Self::Output {
        PhysAddr(self.0 + rhs)
    }
}

impl Sub<PhysAddr> for PhysAddr {
    type Output = usize;

    fn sub(self, rhs: PhysAddr) -> Self::Output {
        assert!(self.0 >= rhs.0);
        self.0 - rhs.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BytePointer, Region};
    use crate::util::PAGE_SIZE;

    #[test]
    fn test_resolve_one_entry_per_page() -> anyhow::Result<()> {
        let region = Region::map_anonymous(4 * PAGE_SIZE, 4 * PAGE_SIZE, libc::MAP_POPULATE)?;
        let start = region.ptr() as u64;
        let pages = LinuxPageMap::new()?
            .get_phys_range(VirtualMemoryArea::from((start, start + region.len() as u64)))?;
        assert_eq!(pages.len(), 4);
        // without root every frame number reads as zero
        assert!(pages.iter().all(|p| p.0 & PAGE_SIZE.wrapping_sub(1) == 0));
        Ok(())
    }

    #[test]
    fn test_phys_addr_arith() {
        let a = PhysAddr::new(0x1234_5000);
        assert_eq!(a.pfn(), 0x12345);
        assert_eq!((a + 0x1000) - a, 0x1000);
        assert_eq!(format!("{:?}", a), "PhysAddr(0x12345000)");
    }
}
