use log::debug;
use std::mem;

/// Restricts the calling thread to a single logical core.
///
/// The cycle counter is only guaranteed to be monotonic on one core, so timed
/// sweeps should not migrate between cores.
///
/// # Errors
///
/// Returns the OS error if `sched_setaffinity` fails, e.g. because `core` does
/// not exist or is not in the allowed CPU set.
pub fn pin_to_core(core: usize) -> std::io::Result<()> {
    if core >= libc::CPU_SETSIZE as usize {
        return Err(std::io::Error::from(std::io::ErrorKind::InvalidInput));
    }
    let r = unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if r != 0 {
        return Err(std::io::Error::last_os_error());
    }
    debug!("Pinned to core {}", core);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::pin_to_core;

    #[test]
    fn test_pin_out_of_range() {
        let err = pin_to_core(usize::MAX).expect_err("pinning to a nonexistent core");
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
