//! The `memory` module provides the swept [`Region`] and tools for inspecting where it lives
//! in physical memory.
//!
//! - `Region`: An owned memory mapping that is unmapped when dropped.
//! - `BytePointer`: A trait for accessing memory as a byte pointer.
//! - `LinuxPageMap`: Translation of virtual to physical addresses via `/proc/self/pagemap`.
//! - `GetConsecPfns`: Physically consecutive ranges backing a memory area.
//! - `PageLayout`: Page color and LLC slice distribution of a memory area.
mod layout;
mod pfns;
mod region;
mod virt_to_phys;

pub use self::layout::{COLOR_MASK, PageLayout, llc_slice, page_color};
pub use self::pfns::{ConsecPfns, Error as ConsecPfnsError, FormatPfns, GetConsecPfns};
pub use self::region::Region;
pub use self::virt_to_phys::{LinuxPageMap, LinuxPageMapError, PhysAddr, VirtToPhysResolver};

/// Trait for accessing memory as a byte pointer.
///
/// Provides low-level access to memory regions with byte-level addressing.
#[allow(clippy::len_without_is_empty)]
pub trait BytePointer {
    /// Returns a mutable pointer to the byte at the given offset.
    ///
    /// The returned pointer is valid only while the memory region exists.
    fn addr(&self, offset: usize) -> *mut u8;

    /// Returns a mutable pointer to the start of the memory region.
    fn ptr(&self) -> *mut u8;

    /// Returns the total length of the memory region in bytes.
    fn len(&self) -> usize;
}
