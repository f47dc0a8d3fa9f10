//! Low-level file descriptor helpers: close-on-exec pipes, cloexec flag
//! manipulation, and the process-wide null-device descriptor.

use crate::flog::{flog, perror};
use cfg_if::cfg_if;
use libc::{c_int, EINTR, F_GETFD, F_SETFD, FD_CLOEXEC};
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use once_cell::sync::OnceCell;
use std::ffi::CStr;
use std::os::fd::{IntoRawFd, OwnedFd, RawFd};

/// Helper type returned from make_cloexec_pipes.
pub struct PipePair {
    /// Read end of the pipe.
    pub read: OwnedFd,

    /// Write end of the pipe.
    pub write: OwnedFd,
}

/// Construct a pair of connected pipes, set to close-on-exec.
pub fn make_cloexec_pipes() -> nix::Result<PipePair> {
    cfg_if!(
        if #[cfg(any(
            target_os = "linux",
            target_os = "android",
            target_os = "freebsd",
            target_os = "netbsd",
            target_os = "openbsd",
        ))] {
            let pipes = match nix::unistd::pipe2(OFlag::O_CLOEXEC) {
                Ok(pipes) => pipes,
                Err(err) => {
                    flog!(warning, "could not create pipe");
                    perror("pipe2");
                    return Err(err);
                }
            };
        } else {
            // No atomic pipe2 here; set the flag after the fact.
            use std::os::fd::AsRawFd;
            let pipes = match nix::unistd::pipe() {
                Ok(pipes) => pipes,
                Err(err) => {
                    flog!(warning, "could not create pipe");
                    perror("pipe");
                    return Err(err);
                }
            };
            set_cloexec(pipes.0.as_raw_fd(), true);
            set_cloexec(pipes.1.as_raw_fd(), true);
        }
    );

    Ok(PipePair {
        read: pipes.0,
        write: pipes.1,
    })
}

/// Sets or clears FD_CLOEXEC on a given fd according to the value of `should_set`.
pub fn set_cloexec(fd: RawFd, should_set: bool) -> c_int {
    // Fetch the existing flags and modify them, rather than blindly storing:
    // the fd may carry other flags we must not drop.
    let flags = unsafe { libc::fcntl(fd, F_GETFD, 0) };
    if flags < 0 {
        return -1;
    }
    let new_flags = if should_set {
        flags | FD_CLOEXEC
    } else {
        flags & !FD_CLOEXEC
    };
    if flags == new_flags {
        0
    } else {
        unsafe { libc::fcntl(fd, F_SETFD, new_flags) }
    }
}

/// Open a path with the close-on-exec flag set, retrying on EINTR.
pub fn open_cloexec(path: &CStr, flags: OFlag, mode: Mode) -> nix::Result<OwnedFd> {
    loop {
        match nix::fcntl::open(path, flags | OFlag::O_CLOEXEC, mode) {
            Err(nix::Error::EINTR) => continue,
            other => return other,
        }
    }
}

/// Close a file descriptor `fd`, retrying on EINTR.
pub fn exec_close(fd: RawFd) {
    assert!(fd >= 0, "Invalid fd");
    while unsafe { libc::close(fd) } == -1 {
        if errno::errno().0 != EINTR {
            perror("close");
            break;
        }
    }
}

/// Return the read/write descriptor for the null device, opened on first use
/// and then shared for the life of the process. It is never closed.
pub fn dev_null() -> nix::Result<RawFd> {
    static DEV_NULL: OnceCell<RawFd> = OnceCell::new();
    DEV_NULL
        .get_or_try_init(|| {
            let fd = open_cloexec(c"/dev/null", OFlag::O_RDWR, Mode::empty())?;
            Ok(fd.into_raw_fd())
        })
        .copied()
}
