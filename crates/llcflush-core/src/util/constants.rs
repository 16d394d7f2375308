use super::Size;

/// Page shift value (12 bits) for 4KB pages
pub const PAGE_SHIFT: usize = 12;
/// Standard page size (4096 bytes)
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
/// Mask for extracting page offset
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Cache line size (64 bytes) for x86_64
pub const CL_SIZE: usize = 64;
/// Cache line shift value (6 bits)
pub const CL_SHIFT: usize = 6;

/// Default last-level cache capacity, the size of the swept region
pub const LLC_SIZE: Size = Size::MB(15);
