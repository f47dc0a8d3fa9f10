// The stuff that happens in the child, after fork and before exec.
// Everything in this module must be async-signal safe: no locking, no
// allocating, no panicking.

use super::exit_without_destructors;
use super::flog_safe::FLOG_SAFE;
use crate::null_terminated_array::OwningNullTerminatedArray;
use crate::proc::Process;
use crate::redirection::Endpoint;
use std::ffi::CStr;

/// Execute the redirection plan for the three streams, close what must not
/// survive into the program, and exec it. Never returns: on any failure the
/// child exits immediately, bypassing destructors (it still holds the
/// parent's process image).
///
/// The output links must not clobber a stream the other one still needs:
/// when stderr is headed for the current stdout, that source has to be read
/// before stdout is overwritten, so the diagnostic link runs first. When the
/// two streams are a pure swap, stdout's source is additionally moved onto a
/// fresh descriptor so the stderr link cannot destroy it.
pub(crate) fn child_exec(
    stdin_ep: &Endpoint,
    stdout_ep: &mut Endpoint,
    stderr_ep: &Endpoint,
    argv: &OwningNullTerminatedArray,
) -> ! {
    let mut ok = stdin_ep.link_to(libc::STDIN_FILENO).is_ok();

    if ok {
        if stderr_ep.near() == libc::STDOUT_FILENO {
            if stdout_ep.near() == libc::STDERR_FILENO {
                ok = stdout_ep.rebind_near().is_ok();
            }
            ok = ok
                && stderr_ep.link_to(libc::STDERR_FILENO).is_ok()
                && stdout_ep.link_to(libc::STDOUT_FILENO).is_ok();
        } else {
            ok = stdout_ep.link_to(libc::STDOUT_FILENO).is_ok()
                && stderr_ep.link_to(libc::STDERR_FILENO).is_ok();
        }
    }

    if !ok {
        FLOG_SAFE!(error, "failed to set up file descriptors in child");
        exit_without_destructors(1);
    }

    // Close everything but the standard streams. Our pipe ends carry
    // close-on-exec and would vanish anyway; borrowed fds may not.
    stdin_ep.close_child_side();
    stdout_ep.close_child_side();
    stderr_ep.close_child_side();

    unsafe { libc::execvp(argv.head(), argv.get()) };

    // Only reached when exec failed.
    let cmd = unsafe { CStr::from_ptr(argv.head()) };
    FLOG_SAFE!(exec, "Failed to execute process '", cmd, "'");
    exit_without_destructors(Process::COMMAND_NOT_FOUND)
}
