// The fork/exec side of spawning. Code that runs between fork and exec lives
// in postfork and must be async-signal safe: no locking, no allocation.

pub mod flog_safe;
pub mod postfork;

use crate::flog::flog;
use libc::pid_t;
use nix::errno::Errno;
use std::time::Duration;

/// The number of times to try to call fork() before giving up.
const FORK_LAPS: usize = 5;

/// The time to sleep between attempts to call fork().
const FORK_SLEEP_TIME: Duration = Duration::from_nanos(1000000);

/// A wrapper around fork. If fork fails with EAGAIN, it is retried
/// FORK_LAPS times with a slight delay between laps before the error is
/// surfaced to the caller.
pub(crate) fn execute_fork() -> nix::Result<pid_t> {
    let mut err = 0;
    for lap in 0..FORK_LAPS {
        let pid = unsafe { libc::fork() };
        if pid >= 0 {
            return Ok(pid);
        }
        err = errno::errno().0;
        if err != libc::EAGAIN {
            break;
        }
        // Don't sleep on the final lap.
        if lap != FORK_LAPS - 1 {
            std::thread::sleep(FORK_SLEEP_TIME);
        }
    }

    match err {
        libc::EAGAIN => {
            flog!(fork, "fork: Out of resources. Check RLIMIT_NPROC and pid_max.");
        }
        libc::ENOMEM => {
            flog!(fork, "fork: Out of memory.");
        }
        _ => {
            flog!(fork, "fork: Unknown error number {err}");
        }
    }
    Err(Errno::from_raw(err))
}

/// Terminate the calling process immediately, running no destructors or
/// atexit handlers. This is the only legal exit from a forked child that
/// failed to exec: it still holds the parent's process image, and parent
/// cleanup must not run twice.
pub(crate) fn exit_without_destructors(code: libc::c_int) -> ! {
    unsafe { libc::_exit(code) };
}
