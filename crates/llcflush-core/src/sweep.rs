//! The eviction sweep.
//!
//! A [`Sweep`] walks a memory area one cache line at a time. For every line it
//!
//! 1. writes the line index to the line, pulling it into the cache,
//! 2. in [`VerifyMode::On`], times a read of the line (cache hit),
//! 3. evicts the line with the [`LineFlusher`],
//! 4. in [`VerifyMode::On`], times a second read (served from memory).
//!
//! Lines are visited exactly once, in increasing address order. When the area
//! length is not a multiple of the line size the trailing short chunk is
//! processed as a line of its own.

use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use log::{debug, info};
use serde::Serialize;
use thiserror::Error;

use crate::arch::{Clflush, CycleCounter, LineFlusher, Rdtscp};
use crate::memory::BytePointer;
use crate::sink::TimingSink;
use crate::util::CL_SIZE;

/// The progress bar is advanced once per this many lines.
const PROGRESS_STRIDE: usize = 4096;

/// Whether the sweep measures access latencies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum VerifyMode {
    /// Touch and flush only, no timing and no records
    #[default]
    Off,
    /// Time a read before and after each flush and emit one record per line
    On,
}

impl From<bool> for VerifyMode {
    fn from(verify: bool) -> Self {
        if verify { VerifyMode::On } else { VerifyMode::Off }
    }
}

/// Invalid sweep parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The line size must be a power of two
    #[error("line size {0} is not a power of two")]
    NotPowerOfTwo(usize),
    /// Every line must hold the 8 byte line tag
    #[error("line size {0} is smaller than {min} bytes", min = size_of::<u64>())]
    TooSmall(usize),
}

/// Parameters of a sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SweepConfig {
    line_size: usize,
    verify: VerifyMode,
}

impl SweepConfig {
    /// Creates a sweep configuration.
    ///
    /// # Errors
    ///
    /// Returns an error unless `line_size` is a power of two of at least 8 bytes.
    pub fn new(line_size: usize, verify: VerifyMode) -> Result<Self, ConfigError> {
        if !line_size.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo(line_size));
        }
        if line_size < size_of::<u64>() {
            return Err(ConfigError::TooSmall(line_size));
        }
        Ok(SweepConfig { line_size, verify })
    }

    /// Stride between visited lines in bytes.
    pub fn line_size(&self) -> usize {
        self.line_size
    }

    /// Whether latencies are measured.
    pub fn verify(&self) -> VerifyMode {
        self.verify
    }

    /// Number of lines a sweep over `len` bytes visits, counting a trailing short chunk.
    pub fn lines(&self, len: usize) -> usize {
        len.div_ceil(self.line_size)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            line_size: CL_SIZE,
            verify: VerifyMode::Off,
        }
    }
}

/// Latencies measured around the flush of one cache line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LineTiming {
    /// Virtual address of the line
    pub addr: usize,
    /// Cycles for the read before the flush
    pub hit_cycles: u64,
    /// Cycles for the read after the flush
    pub miss_cycles: u64,
}

impl fmt::Display for LineTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Address\t: {:#x}\t|\tFirst Attempt : {}\t|\tSecond Attempt : {}",
            self.addr, self.hit_cycles, self.miss_cycles
        )
    }
}

/// Summary of a completed sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Number of lines visited
    pub lines: usize,
    /// Number of bytes covered
    pub bytes: usize,
    /// Wall clock duration of the sweep
    pub elapsed: Duration,
}

/// Returns the line offsets a sweep over `len` bytes visits, in order.
///
/// ```
/// use llcflush_core::sweep::line_offsets;
///
/// let offsets: Vec<usize> = line_offsets(200, 64).collect();
/// assert_eq!(offsets, vec![0, 64, 128, 192]);
/// ```
pub fn line_offsets(len: usize, line_size: usize) -> impl Iterator<Item = usize> {
    (0..len).step_by(line_size)
}

/// Sweep driver, generic over the hardware primitives.
pub struct Sweep<C: CycleCounter = Rdtscp, F: LineFlusher = Clflush> {
    config: SweepConfig,
    counter: C,
    flusher: F,
    progress: Option<ProgressBar>,
}

impl Sweep {
    /// Creates a sweep using the native primitives of the target.
    pub fn new(config: SweepConfig) -> Self {
        Sweep::with_primitives(config, Rdtscp, Clflush)
    }
}

impl<C: CycleCounter, F: LineFlusher> Sweep<C, F> {
    /// Creates a sweep using the given primitives.
    pub fn with_primitives(config: SweepConfig, counter: C, flusher: F) -> Self {
        Sweep {
            config,
            counter,
            flusher,
            progress: None,
        }
    }

    /// Reports progress on `bar` while sweeping.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Sweeps `memory` once, from the first to the last line.
    ///
    /// In [`VerifyMode::On`] one [`LineTiming`] per visited line is passed to `sink`;
    /// in [`VerifyMode::Off`] the sink and the cycle counter are never used.
    ///
    /// # Panics
    ///
    /// Panics if the start of `memory` is not 8 byte aligned.
    pub fn run<M, S>(&self, memory: &M, sink: &mut S) -> SweepReport
    where
        M: BytePointer + ?Sized,
        S: TimingSink + ?Sized,
    {
        let len = memory.len();
        let line_size = self.config.line_size;
        assert_eq!(
            memory.ptr() as usize % align_of::<u64>(),
            0,
            "sweep base {:p} is not 8 byte aligned",
            memory.ptr()
        );
        info!(
            "Sweeping {} lines of {} bytes at {:p} (verify: {:?})",
            self.config.lines(len),
            line_size,
            memory.ptr(),
            self.config.verify
        );
        if let Some(bar) = &self.progress {
            bar.set_length(self.config.lines(len) as u64);
        }

        let start = Instant::now();
        let mut lines = 0;
        for (index, offset) in line_offsets(len, line_size).enumerate() {
            let chunk = line_size.min(len - offset);
            let p = memory.addr(offset);
            unsafe { touch(p, chunk, index as u64) };
            match self.config.verify {
                VerifyMode::Off => unsafe { self.flusher.evict(p) },
                VerifyMode::On => {
                    let hit_cycles = unsafe { self.timed_load(p, chunk) };
                    unsafe { self.flusher.evict(p) };
                    let miss_cycles = unsafe { self.timed_load(p, chunk) };
                    sink.record(LineTiming {
                        addr: p as usize,
                        hit_cycles,
                        miss_cycles,
                    });
                }
            }
            lines += 1;
            if let Some(bar) = &self.progress
                && lines % PROGRESS_STRIDE == 0
            {
                bar.inc(PROGRESS_STRIDE as u64);
            }
        }
        let elapsed = start.elapsed();
        if let Some(bar) = &self.progress {
            bar.finish();
        }
        debug!("Sweep of {} lines took {:?}", lines, elapsed);
        SweepReport {
            lines,
            bytes: len,
            elapsed,
        }
    }

    /// Cycles spent reading the chunk at `p`.
    #[inline(always)]
    unsafe fn timed_load(&self, p: *const u8, chunk: usize) -> u64 {
        let start = self.counter.now();
        unsafe { load(p, chunk) };
        let end = self.counter.now();
        end.wrapping_sub(start)
    }
}

/// Writes the line tag to the chunk at `p`, truncated to `chunk` bytes.
#[inline(always)]
unsafe fn touch(p: *mut u8, chunk: usize, tag: u64) {
    if chunk >= size_of::<u64>() {
        unsafe { ptr::write_volatile(p as *mut u64, tag) };
    } else {
        for (i, byte) in tag.to_ne_bytes().into_iter().take(chunk).enumerate() {
            unsafe { ptr::write_volatile(p.add(i), byte) };
        }
    }
}

#[inline(always)]
unsafe fn load(p: *const u8, chunk: usize) {
    if chunk >= size_of::<u64>() {
        unsafe { ptr::read_volatile(p as *const u64) };
    } else {
        unsafe { ptr::read_volatile(p) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Region;
    use crate::sink::Discard;
    use crate::util::{PAGE_SIZE, Size};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct RecordingFlusher {
        evicted: RefCell<Vec<usize>>,
    }

    impl LineFlusher for RecordingFlusher {
        unsafe fn evict(&self, p: *const u8) {
            self.evicted.borrow_mut().push(p as usize);
        }
    }

    struct ScriptedCounter {
        ticks: RefCell<VecDeque<u64>>,
    }

    impl ScriptedCounter {
        fn new(ticks: &[u64]) -> Self {
            ScriptedCounter {
                ticks: RefCell::new(ticks.iter().copied().collect()),
            }
        }
    }

    impl CycleCounter for ScriptedCounter {
        fn now(&self) -> u64 {
            self.ticks
                .borrow_mut()
                .pop_front()
                .expect("cycle counter read more often than scripted")
        }
    }

    struct PanicCounter;

    impl CycleCounter for PanicCounter {
        fn now(&self) -> u64 {
            panic!("cycle counter must not be read when not verifying");
        }
    }

    struct CountingCounter(Cell<u64>);

    impl CycleCounter for CountingCounter {
        fn now(&self) -> u64 {
            self.0.set(self.0.get() + 1);
            self.0.get()
        }
    }

    fn region(len: usize) -> Region {
        Region::map_anonymous(len, len.next_multiple_of(PAGE_SIZE), 0).expect("mmap")
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            SweepConfig::new(48, VerifyMode::Off),
            Err(ConfigError::NotPowerOfTwo(48))
        );
        assert_eq!(
            SweepConfig::new(0, VerifyMode::Off),
            Err(ConfigError::NotPowerOfTwo(0))
        );
        assert_eq!(
            SweepConfig::new(4, VerifyMode::On),
            Err(ConfigError::TooSmall(4))
        );
        let config = SweepConfig::new(64, VerifyMode::On).expect("valid config");
        assert_eq!(config.lines(Size::MB(15).bytes()), 245760);
        assert_eq!(config.lines(65), 2);
        assert_eq!(SweepConfig::default().line_size(), CL_SIZE);
    }

    #[test]
    fn test_visits_every_line_once_in_order() {
        let len = Size::KB(256).bytes();
        let memory = region(len);
        let flusher = RecordingFlusher::default();
        let sweep = Sweep::with_primitives(SweepConfig::default(), PanicCounter, flusher);
        let report = sweep.run(&memory, &mut Discard);

        let evicted = sweep.flusher.evicted.borrow();
        assert_eq!(report.lines, len / CL_SIZE);
        assert_eq!(report.bytes, len);
        assert_eq!(evicted.len(), len / CL_SIZE);
        let base = memory.ptr() as usize;
        for (i, &addr) in evicted.iter().enumerate() {
            assert_eq!(addr, base + i * CL_SIZE);
        }
    }

    #[test]
    fn test_lines_tagged_with_index() {
        let len = Size::KB(64).bytes();
        let memory = region(len);
        Sweep::new(SweepConfig::default()).run(&memory, &mut Discard);
        for (index, offset) in line_offsets(len, CL_SIZE).enumerate() {
            let tag = unsafe { ptr::read_volatile(memory.addr(offset) as *const u64) };
            assert_eq!(tag, index as u64);
        }
    }

    #[test]
    fn test_verify_records_deltas() {
        let memory = region(2 * CL_SIZE);
        // per line: hit start, hit end, miss start, miss end
        let counter = ScriptedCounter::new(&[100, 130, 200, 500, 1000, 1042, 2000, 2250]);
        let sweep = Sweep::with_primitives(
            SweepConfig::new(CL_SIZE, VerifyMode::On).expect("valid config"),
            counter,
            RecordingFlusher::default(),
        );
        let mut timings = Vec::new();
        let report = sweep.run(&memory, &mut timings);

        assert_eq!(report.lines, 2);
        let base = memory.ptr() as usize;
        assert_eq!(
            timings,
            vec![
                LineTiming {
                    addr: base,
                    hit_cycles: 30,
                    miss_cycles: 300,
                },
                LineTiming {
                    addr: base + CL_SIZE,
                    hit_cycles: 42,
                    miss_cycles: 250,
                },
            ]
        );
        assert!(sweep.counter.ticks.borrow().is_empty());
    }

    #[test]
    fn test_verify_off_emits_nothing() {
        let memory = region(Size::KB(4).bytes());
        let mut timings = Vec::new();
        let sweep = Sweep::with_primitives(SweepConfig::default(), PanicCounter, Clflush);
        let report = sweep.run(&memory, &mut timings);
        assert_eq!(report.lines, Size::KB(4).bytes() / CL_SIZE);
        assert!(timings.is_empty());
    }

    #[test]
    fn test_short_final_chunk() {
        let len = 3 * CL_SIZE + 5;
        let memory = region(len);
        let sweep = Sweep::with_primitives(
            SweepConfig::new(CL_SIZE, VerifyMode::On).expect("valid config"),
            CountingCounter(Cell::new(0)),
            RecordingFlusher::default(),
        );
        let mut timings = Vec::new();
        let report = sweep.run(&memory, &mut timings);

        assert_eq!(report.lines, 4);
        assert_eq!(timings.len(), 4);
        assert_eq!(timings[3].addr, memory.ptr() as usize + 3 * CL_SIZE);
        let tail: Vec<u8> = (0..5)
            .map(|i| unsafe { *memory.addr(3 * CL_SIZE + i) })
            .collect();
        assert_eq!(tail, 3u64.to_ne_bytes()[..5].to_vec());
    }

    #[test]
    fn test_real_primitives_record_every_line() {
        let len = Size::KB(128).bytes();
        let memory = region(len);
        let sweep = Sweep::new(SweepConfig::new(CL_SIZE, VerifyMode::On).expect("valid config"));
        let mut timings = Vec::new();
        sweep.run(&memory, &mut timings);
        assert_eq!(timings.len(), len / CL_SIZE);
        assert!(timings.windows(2).all(|w| w[0].addr + CL_SIZE == w[1].addr));
    }
}
