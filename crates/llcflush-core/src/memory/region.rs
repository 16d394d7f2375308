use super::BytePointer;
use crate::util::PAGE_MASK;
use libc::{MAP_ANONYMOUS, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_int, c_void};
use log::{debug, warn};
use std::ptr::{NonNull, null_mut};

/// An owned, page aligned memory mapping.
///
/// A region exposes `len` usable bytes at the start of a mapping that may be
/// larger (`mapped_len`), e.g. because huge page mappings always cover whole
/// pages. The region is the only owner of the mapping: dropping it unmaps the
/// full mapping exactly once, on every exit path.
#[derive(Debug)]
pub struct Region {
    ptr: NonNull<u8>,
    len: usize,
    mapped_len: usize,
}

unsafe impl Send for Region {}

impl Region {
    /// Maps `mapped_len` bytes of private anonymous memory and exposes the first `len`.
    ///
    /// `flags` are OR-ed into `MAP_PRIVATE | MAP_ANONYMOUS`, e.g. `MAP_HUGETLB` or
    /// `MAP_POPULATE`. Anonymous mappings are zero-initialized by the kernel.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero or larger than `mapped_len`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if `mmap` fails.
    pub fn map_anonymous(len: usize, mapped_len: usize, flags: c_int) -> std::io::Result<Self> {
        assert!(
            len > 0 && len <= mapped_len,
            "Invalid region length {} for a mapping of {} bytes",
            len,
            mapped_len
        );
        let p = unsafe {
            libc::mmap(
                null_mut(),
                mapped_len,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS | flags,
                -1,
                0,
            )
        };
        if p == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error());
        }
        Ok(unsafe { Region::from_raw_parts(p as *mut u8, len, mapped_len) })
    }

    /// Takes ownership of an existing mapping.
    ///
    /// # Safety
    ///
    /// * `ptr` must be the non-null, page aligned start of a live `mmap` mapping of
    ///   `mapped_len` bytes
    /// * nothing else may unmap or hand out the mapping afterwards
    /// * `len` must not exceed `mapped_len`
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize, mapped_len: usize) -> Self {
        debug_assert_eq!(ptr as usize & PAGE_MASK, 0, "region must be page aligned");
        debug_assert!(len <= mapped_len);
        Region {
            ptr: unsafe { NonNull::new_unchecked(ptr) },
            len,
            mapped_len,
        }
    }

    /// Returns the length of the underlying mapping, which is what gets unmapped.
    pub fn mapped_len(&self) -> usize {
        self.mapped_len
    }
}

impl BytePointer for Region {
    fn addr(&self, offset: usize) -> *mut u8 {
        assert!(
            offset < self.len,
            "Region::addr failed. Offset {} >= {}",
            offset,
            self.len
        );
        unsafe { self.ptr.as_ptr().byte_add(offset) }
    }

    fn ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        let r = unsafe { libc::munmap(self.ptr.as_ptr() as *mut c_void, self.mapped_len) };
        if r != 0 {
            warn!(
                "munmap({:p}, {}): {}",
                self.ptr,
                self.mapped_len,
                std::io::Error::last_os_error()
            );
        } else {
            debug!("Released region {:p} ({} bytes)", self.ptr, self.mapped_len);
        }
    }
}
