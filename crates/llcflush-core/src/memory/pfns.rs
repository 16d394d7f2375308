use std::ops::Range;

use super::{BytePointer, LinuxPageMap, LinuxPageMapError, PhysAddr, VirtToPhysResolver};
use crate::util::PAGE_SIZE;
use log::{log, trace, warn};
use pagemap2::VirtualMemoryArea;

/// Errors that can occur while resolving physical frame numbers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error resolving virtual to physical address
    #[error(transparent)]
    LinuxPageMapError(#[from] LinuxPageMapError),
    /// Memory region has no physical pages mapped
    #[error("Empty PFN range")]
    EmptyPfnRange,
}

/// Physically consecutive address ranges.
pub type ConsecPfns = Vec<Range<PhysAddr>>;

/// Trait for types that can report which physically consecutive ranges back them.
pub trait GetConsecPfns {
    /// Returns the consecutive physical ranges for this memory area, in virtual order.
    ///
    /// # Errors
    ///
    /// Returns an error if PFN resolution fails.
    fn consec_pfns(&self) -> Result<ConsecPfns, Error>;

    /// Logs the PFN ranges at the specified log level.
    fn log_pfns(&self, level: log::Level) {
        let pfns = match self.consec_pfns() {
            Ok(pfns) => pfns,
            Err(e) => {
                warn!("Failed to get PFNs: {:?}", e);
                return;
            }
        };
        log!(level, "PFNs:\n{}", pfns.format_pfns());
    }
}

impl<T: BytePointer> GetConsecPfns for T {
    fn consec_pfns(&self) -> Result<ConsecPfns, Error> {
        let start = self.ptr() as u64;
        trace!("Get consecutive PFNs for vaddr 0x{:x}", start);
        let mut resolver = LinuxPageMap::new()?;
        let pfns = resolver.get_phys_range(VirtualMemoryArea::from((
            start,
            start + self.len() as u64,
        )))?;
        if pfns.is_empty() {
            return Err(Error::EmptyPfnRange);
        }
        Ok(merge_consecutive(&pfns))
    }
}

fn merge_consecutive(pages: &[PhysAddr]) -> ConsecPfns {
    let mut consecs = vec![];
    let Some((&first, rest)) = pages.split_first() else {
        return consecs;
    };
    let mut range_start = first;
    let mut phys_prev = first;
    for &phys in rest {
        if phys != phys_prev + PAGE_SIZE {
            consecs.push(range_start..phys_prev + PAGE_SIZE);
            range_start = phys;
        }
        phys_prev = phys;
    }
    consecs.push(range_start..phys_prev + PAGE_SIZE);
    consecs
}

/// Formats physical frame number ranges for display.
pub trait FormatPfns {
    /// Formats PFN ranges as a human-readable string, one range per line.
    fn format_pfns(&self) -> String;
}

impl FormatPfns for ConsecPfns {
    fn format_pfns(&self) -> String {
        let mut pfns = String::from("");
        for range in self {
            pfns += &format!(
                "{:p}..[{:04} KB]..{:p}\n",
                range.start,
                (range.end - range.start) / 1024,
                range.end
            );
        }
        pfns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(addrs: &[usize]) -> Vec<PhysAddr> {
        addrs.iter().map(|&a| PhysAddr::new(a)).collect()
    }

    #[test]
    fn test_merge_contiguous() {
        let merged = merge_consecutive(&pages(&[0x10000, 0x11000, 0x12000]));
        assert_eq!(merged, vec![PhysAddr::new(0x10000)..PhysAddr::new(0x13000)]);
    }

    #[test]
    fn test_merge_split() {
        let merged = merge_consecutive(&pages(&[0x10000, 0x11000, 0x40000, 0x41000, 0x20000]));
        assert_eq!(
            merged,
            vec![
                PhysAddr::new(0x10000)..PhysAddr::new(0x12000),
                PhysAddr::new(0x40000)..PhysAddr::new(0x42000),
                PhysAddr::new(0x20000)..PhysAddr::new(0x21000),
            ]
        );
        assert_eq!(
            merged.format_pfns().lines().next(),
            Some("0x10000..[0008 KB]..0x12000")
        );
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_consecutive(&[]).is_empty());
    }
}
