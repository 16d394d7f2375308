//! Hardware primitives used by the sweep.
//!
//! The sweep needs two things from the processor: a cycle counter to bracket
//! memory accesses and an instruction that evicts a cache line from every cache
//! level. Both are expressed as traits so the driver can be exercised with
//! scripted implementations; on real hardware exactly one implementation per
//! target architecture exists.

#[cfg(not(target_arch = "x86_64"))]
compile_error!("llcflush-core requires x86_64 (rdtscp and clflush)");

use std::arch::x86_64::{__rdtscp, _mm_clflush};

/// Source of monotonically non-decreasing cycle timestamps.
pub trait CycleCounter {
    /// Returns the current value of the cycle counter.
    ///
    /// Successive calls on the same logical core never go backwards.
    fn now(&self) -> u64;
}

/// Evicts cache lines from the whole cache hierarchy.
pub trait LineFlusher {
    /// Evicts the cache line containing `p` from all cache levels, writing back
    /// modified data first.
    ///
    /// # Safety
    ///
    /// `p` must point into memory that is mapped for the duration of the call.
    unsafe fn evict(&self, p: *const u8);
}

/// Time stamp counter read with `rdtscp`.
///
/// `rdtscp` waits until all previous instructions have executed and all previous
/// loads are globally visible before reading the counter, so a load placed
/// between two reads is fully accounted for.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rdtscp;

impl CycleCounter for Rdtscp {
    #[inline(always)]
    fn now(&self) -> u64 {
        let mut aux = 0;
        // EDX:EAX combined by the intrinsic
        unsafe { __rdtscp(&mut aux) }
    }
}

/// Cache line eviction with `clflush`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Clflush;

impl LineFlusher for Clflush {
    #[inline(always)]
    unsafe fn evict(&self, p: *const u8) {
        unsafe { _mm_clflush(p) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdtscp_monotonic() {
        let counter = Rdtscp;
        let mut last = counter.now();
        for _ in 0..1000 {
            let now = counter.now();
            assert!(now >= last, "{} < {}", now, last);
            last = now;
        }
    }

    #[test]
    fn test_clflush_keeps_data() {
        let value = Box::new(0xdead_beef_u64);
        let p = &*value as *const u64 as *const u8;
        unsafe { Clflush.evict(p) };
        assert_eq!(*value, 0xdead_beef);
    }
}
