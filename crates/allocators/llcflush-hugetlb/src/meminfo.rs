use std::fmt;

// https://www.kernel.org/doc/Documentation/vm/hugetlbpage.txt
//
// The output of "cat /proc/meminfo" will include lines like:
// ...
// HugePages_Total: uuu
// HugePages_Free:  vvv
// HugePages_Rsvd:  www
// HugePages_Surp:  xxx
// Hugepagesize:    yyy kB
// Hugetlb:         zzz kB

const MEMINFO_PATH: &str = "/proc/meminfo";

/// State of the default huge page pool as reported by `/proc/meminfo`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HugePagePool {
    /// Default huge page size in bytes, `None` if the kernel lacks hugetlb support
    pub page_size: Option<usize>,
    /// Pages in the pool
    pub total: usize,
    /// Pages not yet allocated, including reserved ones
    pub free: usize,
    /// Pages reserved for mappings but not yet faulted in
    pub reserved: usize,
}

impl HugePagePool {
    /// Reads the pool state from `/proc/meminfo`.
    ///
    /// # Errors
    ///
    /// Returns an error if `/proc/meminfo` cannot be read.
    pub fn read() -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(MEMINFO_PATH)?))
    }

    /// Parses the contents of `/proc/meminfo`. Missing counters read as zero.
    pub fn parse(meminfo: &str) -> Self {
        HugePagePool {
            page_size: parse_field(meminfo, "Hugepagesize:"),
            total: parse_field(meminfo, "HugePages_Total:").unwrap_or(0),
            free: parse_field(meminfo, "HugePages_Free:").unwrap_or(0),
            reserved: parse_field(meminfo, "HugePages_Rsvd:").unwrap_or(0),
        }
    }

    /// Bytes that a new mapping can still obtain from the pool.
    pub fn available_bytes(&self) -> usize {
        self.free.saturating_sub(self.reserved) * self.page_size.unwrap_or(0)
    }
}

impl fmt::Display for HugePagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page_size {
            Some(size) => write!(f, "Hugepagesize: {} kB, ", size / 1024)?,
            None => write!(f, "Hugepagesize: unknown, ")?,
        }
        write!(
            f,
            "HugePages_Total: {}, HugePages_Free: {}, HugePages_Rsvd: {}, available: {} kB",
            self.total,
            self.free,
            self.reserved,
            self.available_bytes() / 1024
        )
    }
}

/// Value of the first line starting with `token`, scaled to bytes if it carries a `kB` unit.
fn parse_field(s: &str, token: &str) -> Option<usize> {
    let line = s.lines().find_map(|line| line.strip_prefix(token))?;
    let mut parts = line.split_whitespace();
    let value = parts.next()?.parse::<usize>().ok()?;
    match parts.next() {
        None => Some(value),
        Some("kB") => Some(value * 1024),
        Some(_) => None,
    }
}
