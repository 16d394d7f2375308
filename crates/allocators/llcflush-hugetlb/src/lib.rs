//! Huge page backed region allocator.
//!
//! This crate provides [`HugetlbAllocator`], which maps the sweep region from the
//! kernel's huge page pool with `MAP_HUGETLB`. A huge page backed region is
//! physically contiguous within each huge page and is swept without TLB misses or
//! page faults.
//!
//! Implements the [`llcflush_core::allocator::RegionAllocator`] trait.
//!
//! # Platform Requirements
//!
//! - x86_64 Linux with hugetlbfs support
//! - Huge pages reserved before the run, e.g. `echo 8 > /proc/sys/vm/nr_hugepages`
//!   for a 15 MB region on 2 MB pages

#![warn(missing_docs)]

mod hugetlb;
mod meminfo;

pub use hugetlb::*;
pub use meminfo::HugePagePool;
