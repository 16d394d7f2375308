use serde::Serialize;

/// Memory size with a unit.
///
/// All units are binary (1 KB = 1024 bytes), so `Size::MB(15)` is the 15 MiB
/// last-level cache the benchmark is sized after.
///
/// # Examples
///
/// ```
/// use llcflush_core::util::Size;
///
/// let llc = Size::MB(15);
/// assert_eq!(llc.bytes(), 15 * 1024 * 1024);
/// assert_eq!(llc.to_string(), "15 MB");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Size {
    /// Size in bytes
    B(usize),
    /// Size in kilobytes (1 KB = 1024 bytes)
    KB(usize),
    /// Size in megabytes (1 MB = 1024 KB)
    MB(usize),
    /// Size in gigabytes (1 GB = 1024 MB)
    GB(usize),
}

impl Size {
    /// Converts this size to bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use llcflush_core::util::Size;
    ///
    /// assert_eq!(Size::B(100).bytes(), 100);
    /// assert_eq!(Size::KB(1).bytes(), 1024);
    /// assert_eq!(Size::MB(1).bytes(), 1048576);
    /// assert_eq!(Size::GB(1).bytes(), 1073741824);
    /// ```
    pub const fn bytes(&self) -> usize {
        match self {
            Size::B(bytes) => *bytes,
            Size::KB(kb) => *kb * (1 << 10),
            Size::MB(mb) => *mb * (1 << 20),
            Size::GB(gb) => *gb * (1 << 30),
        }
    }

    /// Rounds this size up to the next multiple of `align` bytes.
    ///
    /// Mappings backed by huge pages always cover whole pages, so a 15 MB
    /// request on 2 MB pages occupies 16 MB.
    ///
    /// # Panics
    ///
    /// Panics if `align` is zero.
    pub const fn round_up(&self, align: usize) -> Size {
        Size::B(self.bytes().div_ceil(align) * align)
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Size::B(bytes) => write!(f, "{} B", bytes),
            Size::KB(kb) => write!(f, "{} KB", kb),
            Size::MB(mb) => write!(f, "{} MB", mb),
            Size::GB(gb) => write!(f, "{} GB", gb),
        }
    }
}
