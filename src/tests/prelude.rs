use crate::proc::Process;
use crate::redirection::Redirect;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{OwnedFd, RawFd};

pub use serial_test::serial;

/// Read an owned fd to EOF, consuming and closing it.
pub fn read_all(fd: OwnedFd) -> String {
    let mut buf = String::new();
    File::from(fd)
        .read_to_string(&mut buf)
        .expect("read from pipe failed");
    buf
}

/// Write bytes to an owned fd, then close it (delivering EOF to a reader).
pub fn write_all(fd: OwnedFd, bytes: &[u8]) {
    File::from(fd)
        .write_all(bytes)
        .expect("write to pipe failed");
}

/// Spawn `sh -c <script>` with the given redirections.
pub fn spawn_sh(script: &str, stdin: Redirect, stdout: Redirect, stderr: Redirect) -> Process {
    Process::spawn(&["sh", "-c", script], stdin, stdout, stderr).expect("spawn failed")
}

/// A script that writes "A" to stdout and "B" to stderr, in that order.
pub const AB_SCRIPT: &str = "printf A; printf B >&2";

/// Splices `replacement` over one of the parent's standard descriptors and
/// restores the original on drop. Tests using this must be #[serial]: the
/// parent's standard streams are process-global.
pub struct SpliceStdFd {
    target: RawFd,
    saved: RawFd,
}

impl SpliceStdFd {
    pub fn new(target: RawFd, replacement: RawFd) -> SpliceStdFd {
        let saved = unsafe { libc::dup(target) };
        assert!(saved >= 0, "dup of standard fd failed");
        assert!(
            unsafe { libc::dup2(replacement, target) } >= 0,
            "dup2 over standard fd failed"
        );
        SpliceStdFd { target, saved }
    }
}

impl Drop for SpliceStdFd {
    fn drop(&mut self) {
        unsafe {
            libc::dup2(self.saved, self.target);
            libc::close(self.saved);
        }
    }
}
