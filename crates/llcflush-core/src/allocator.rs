//! Allocation strategies for the swept region.
//!
//! This module defines the [`RegionAllocator`] trait and the [`alloc_region`] entry point.
//! The benchmark relies on huge page backed regions (see `llcflush-hugetlb`); the
//! [`AnonymousAllocator`] maps ordinary pages and exists for machines without a huge
//! page pool. It is only ever used when explicitly selected.

use crate::memory::{BytePointer, GetConsecPfns, Region};
use crate::util::{PAGE_SIZE, Size};
use libc::MAP_POPULATE;
use log::{info, log_enabled};

/// Trait for strategies that provide the memory region to sweep.
///
/// # Associated Types
///
/// * `Error` - The error type returned by allocation operations. Must implement [`std::error::Error`].
pub trait RegionAllocator {
    /// The error type returned by allocation operations.
    type Error: std::error::Error;

    /// Returns the size of the pages backing allocated regions, `None` if the
    /// system does not report it.
    ///
    /// Regions always occupy whole pages; the mapping is rounded up to this size.
    fn page_size(&self) -> Option<Size>;

    /// Allocates a zero-initialized region of `size` bytes.
    ///
    /// # Errors
    ///
    /// May return an error if:
    /// * The backing page pool is exhausted or unavailable
    /// * The kernel rejects the mapping
    fn alloc_region(&mut self, size: Size) -> Result<Region, Self::Error>;
}

/// Allocate the sweep region using an allocation strategy.
///
/// This is the main entry point for users who simply want a region to sweep.
/// The returned [`Region`] is released when dropped.
///
/// # Panics
///
/// Panics if `size` is zero.
///
/// # Errors
///
/// Returns the allocator's error if the allocation fails. No fallback strategy
/// is attempted.
pub fn alloc_region<E: std::error::Error>(
    allocator: &mut dyn RegionAllocator<Error = E>,
    size: Size,
) -> Result<Region, E> {
    assert!(size.bytes() > 0, "Size must be greater than 0");
    match allocator.page_size() {
        Some(page_size) => info!("Allocating {} region on {} pages", size, page_size),
        None => info!("Allocating {} region on pages of unknown size", size),
    }
    let region = allocator.alloc_region(size)?;
    info!(
        "Allocated region at {:p} ({} bytes mapped)",
        region.ptr(),
        region.mapped_len()
    );
    if log_enabled!(log::Level::Debug) {
        region.log_pfns(log::Level::Debug);
    }
    Ok(region)
}

/// Allocator mapping ordinary, pre-faulted 4 KB pages.
///
/// Such regions are neither guaranteed physically contiguous nor free of TLB
/// pressure during the sweep.
#[derive(Debug, Default, Copy, Clone)]
pub struct AnonymousAllocator {}

impl RegionAllocator for AnonymousAllocator {
    type Error = std::io::Error;

    fn page_size(&self) -> Option<Size> {
        Some(Size::B(PAGE_SIZE))
    }

    fn alloc_region(&mut self, size: Size) -> Result<Region, Self::Error> {
        let mapped = size.round_up(PAGE_SIZE);
        Region::map_anonymous(size.bytes(), mapped.bytes(), MAP_POPULATE)
    }
}
