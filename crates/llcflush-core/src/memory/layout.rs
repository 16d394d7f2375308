use std::collections::BTreeMap;

use super::{BytePointer, LinuxPageMap, LinuxPageMapError, PhysAddr, VirtToPhysResolver};
use crate::util::{CL_SHIFT, PAGE_SHIFT, PAGE_SIZE};
use log::{debug, log};
use pagemap2::VirtualMemoryArea;
use serde::Serialize;

/// Frame number bits that select the page color.
pub const COLOR_MASK: u64 = 0x18000;

const LINES_PER_PAGE: u64 = 1 << (PAGE_SHIFT - CL_SHIFT);

// Address bits (most significant first) folded into each hash output bit.
const SLICE_HASH: [&[u32]; 7] = [
    &[0, 6, 11, 12, 16, 18, 21, 23, 24, 26],
    &[1, 6, 7, 11, 13, 16, 17, 18, 19, 21, 22, 25, 26, 27],
    &[2, 7, 8, 12, 14, 17, 18, 19, 20, 22, 26, 27, 28],
    &[3, 8, 9, 13, 15, 18, 19, 20, 21, 23, 27, 28],
    &[4, 9, 10, 14, 16, 19, 20, 21, 22, 24, 28],
    &[5, 10, 11, 15, 17, 20, 21, 22, 23, 25],
    &[6, 7, 8, 9, 10, 12, 13, 14, 15, 18, 19, 20, 22, 24, 25],
];

/// Returns the color of a physical frame.
///
/// The frame number bits selected by `mask` are compacted, lowest bit first,
/// into the color index, so a mask with `n` bits set yields `2^n` colors.
///
/// ```
/// use llcflush_core::memory::{COLOR_MASK, page_color};
///
/// assert_eq!(page_color(0x0, COLOR_MASK), 0);
/// assert_eq!(page_color(0x8000, COLOR_MASK), 1);
/// assert_eq!(page_color(0x10000, COLOR_MASK), 2);
/// assert_eq!(page_color(0x1_8abc, COLOR_MASK), 3);
/// ```
pub fn page_color(pfn: u64, mask: u64) -> usize {
    let mut color = 0;
    let mut remaining = mask;
    let mut index = 0;
    while remaining != 0 {
        let bit = remaining & remaining.wrapping_neg();
        if pfn & bit != 0 {
            color |= 1 << index;
        }
        remaining ^= bit;
        index += 1;
    }
    color
}

/// Returns the last-level cache slice of a cache line.
///
/// `line` is the physical address shifted right by the line size. The hash is
/// the six-slice Intel complex addressing function: a first stage of seven XOR
/// reductions over the line address (bit 30 forced to one, bits indexed from the
/// most significant end), combined into a three bit slice number.
pub fn llc_slice(line: u64) -> u8 {
    let x = line | (1 << 30);
    let width = u64::BITS - x.leading_zeros();
    let bit = |i: u32| ((x >> (width - 1 - i)) & 1) as u8;
    let h: Vec<u8> = SLICE_HASH
        .iter()
        .map(|bits| bits.iter().fold(0, |acc, &i| acc ^ bit(i)))
        .collect();

    let s2 = (h[0] ^ h[5]) & (h[2] | (h[3] & (h[4] | h[5])));
    let s1 = h[1] & (s2 ^ 1);
    let s0 = h[0] ^ h[1] ^ h[2] ^ h[3] ^ h[4] ^ h[6];
    (s2 << 2) | (s1 << 1) | s0
}

/// Distribution of a memory area's pages over page colors and LLC slices.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct PageLayout {
    /// Number of 4 KB pages analyzed
    pub pages: usize,
    /// Pages per color
    pub colors: BTreeMap<usize, usize>,
    /// Pages per slice, by the slice of each page's first line
    pub page_slices: BTreeMap<u8, usize>,
    /// Cache lines per slice
    pub line_slices: BTreeMap<u8, usize>,
}

impl PageLayout {
    /// Builds the layout from physical frame numbers.
    pub fn from_pfns(pfns: &[u64], color_mask: u64) -> Self {
        let mut layout = PageLayout {
            pages: pfns.len(),
            ..Default::default()
        };
        for i in 0..(1 << color_mask.count_ones()) {
            layout.colors.insert(i, 0);
        }
        for &pfn in pfns {
            *layout.colors.entry(page_color(pfn, color_mask)).or_default() += 1;
            let first_line = pfn << (PAGE_SHIFT - CL_SHIFT);
            *layout.page_slices.entry(llc_slice(first_line)).or_default() += 1;
            for line in first_line..first_line + LINES_PER_PAGE {
                *layout.line_slices.entry(llc_slice(line)).or_default() += 1;
            }
        }
        layout
    }

    /// Resolves the physical pages backing `memory` and builds their layout.
    ///
    /// # Errors
    ///
    /// Returns an error if `/proc/self/pagemap` cannot be read.
    pub fn of<M: BytePointer + ?Sized>(
        memory: &M,
        color_mask: u64,
    ) -> Result<Self, LinuxPageMapError> {
        let start = memory.ptr() as u64;
        let mut resolver = LinuxPageMap::new()?;
        let pages = resolver.get_phys_range(VirtualMemoryArea::from((
            start,
            start + memory.len() as u64,
        )))?;
        debug!("Resolved {} pages", pages.len());
        let pfns: Vec<u64> = pages.iter().map(PhysAddr::pfn).collect();
        Ok(Self::from_pfns(&pfns, color_mask))
    }

    /// Size of the analyzed pages in MB.
    pub fn working_set_mb(&self) -> f64 {
        (self.pages * PAGE_SIZE) as f64 / (1 << 20) as f64
    }

    /// Logs the color and slice tables at the given level.
    pub fn log(&self, level: log::Level) {
        log!(level, "Working set size: {:.3} MB", self.working_set_mb());
        log!(level, "Color\t:\tPages\t:\tSize (MB)\t:\tUtilization");
        for (color, &pages) in &self.colors {
            log!(
                level,
                "{}\t:\t{}\t:\t{:.3}\t:\t{:.3} %",
                color,
                pages,
                (pages * PAGE_SIZE) as f64 / (1 << 20) as f64,
                percentage(pages, self.pages)
            );
        }
        let lines: usize = self.line_slices.values().sum();
        log!(level, "Slice\t:\tPages\t:\tLines\t:\tUtilization");
        for (slice, &lines_in_slice) in &self.line_slices {
            log!(
                level,
                "{}\t:\t{}\t:\t{}\t:\t{:.3} %",
                slice,
                self.page_slices.get(slice).copied().unwrap_or_default(),
                lines_in_slice,
                percentage(lines_in_slice, lines)
            );
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}
