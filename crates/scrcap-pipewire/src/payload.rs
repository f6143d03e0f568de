//! Per-backend frame payload for Linux (§3 "Per-backend frame payload —
//! Linux"): a CPU variant owning a host copy, and a GPU variant owning a
//! duplicated DMABUF file descriptor. The original producer-owned
//! descriptor is never closed by us; only the duplicate is.

use std::os::fd::OwnedFd;

use scrcap_core::FramePayload;

#[derive(Debug)]
pub enum LinuxFramePayload {
    Cpu { data: Vec<u8> },
    Gpu { dup_fd: OwnedFd },
}

impl FramePayload for LinuxFramePayload {
    fn release(self: Box<Self>) {
        match *self {
            // Dropping `data` frees the host copy; dropping `dup_fd` closes
            // the duplicated descriptor. Both are the entirety of release
            // for this payload kind.
            Self::Cpu { .. } | Self::Gpu { .. } => {}
        }
    }
}

/// Duplicate `fd` with close-on-exec set (§4.3 step 3, DmaBuf+GPU path:
/// "duplicate the file descriptor with close-on-exec").
pub fn duplicate_fd_cloexec(fd: std::os::fd::RawFd) -> std::io::Result<OwnedFd> {
    use std::os::fd::FromRawFd;

    // SAFETY: `fd` is a valid, open descriptor owned by the PipeWire core
    // for the lifetime of this call; `fcntl(F_DUPFD_CLOEXEC)` duplicates it
    // into a new descriptor we then take ownership of via `from_raw_fd`.
    // The duplicate's lifetime is independent of the original.
    unsafe {
        let new_fd = libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0);
        if new_fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(OwnedFd::from_raw_fd(new_fd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_fd_cloexec_of_a_real_fd_succeeds() {
        use std::os::fd::AsRawFd;
        let file = std::fs::File::open("/dev/null").unwrap();
        let dup = duplicate_fd_cloexec(file.as_raw_fd()).unwrap();
        assert_ne!(dup.as_raw_fd(), file.as_raw_fd());
    }
}
