//! This file supports specifying stream redirections and realizing them as
//! descriptor endpoints that span the fork boundary.

use crate::fds;
use nix::errno::Errno;
use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd, RawFd};

/// A request for where one standard stream of the child should go.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Redirect {
    /// Connect the stream to the null device.
    Null,
    /// Create a fresh pipe; the parent end is exposed on the handle.
    Pipe,
    /// Connect the stream to an externally-owned descriptor, which is
    /// borrowed and never closed by us. Passing one of the standard
    /// descriptors inherits (or cross-wires) the parent's stream.
    Fd(RawFd),
    /// Route stderr to wherever stdout was routed, sharing its child-side
    /// descriptor. Only valid for the stderr slot.
    Merge,
}

impl Redirect {
    pub const INHERIT_STDIN: Redirect = Redirect::Fd(libc::STDIN_FILENO);
    pub const INHERIT_STDOUT: Redirect = Redirect::Fd(libc::STDOUT_FILENO);
    pub const INHERIT_STDERR: Redirect = Redirect::Fd(libc::STDERR_FILENO);
}

/// Which way bytes flow through a stream, selecting which end of a fresh
/// pipe faces the child.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Direction {
    /// The child reads the stream (stdin): the read end faces the child.
    IntoChild,
    /// The child writes the stream (stdout/stderr): the write end faces the child.
    FromChild,
}

/// One side of the parent/child descriptor wiring for a single stream.
///
/// `near` is the descriptor the child's standard stream will be duplicated
/// from; `far` (when a pipe was created) is the parent's end of that pipe.
/// The near/far split lets spawn treat all three streams uniformly, whether
/// a stream was wired via pipe, inheritance, or a caller-supplied fd.
///
/// If we created the pair ourselves (`owned`), both ends carry close-on-exec
/// and are closed on drop; a borrowed `near` is never closed by us.
pub(crate) struct Endpoint {
    near: RawFd,
    far: RawFd, // -1 when no pipe was created
    owned: bool,
}

impl Endpoint {
    /// Wrap an externally-owned descriptor.
    pub fn borrowed(fd: RawFd) -> Endpoint {
        assert!(fd >= 0, "Invalid redirection fd");
        Endpoint {
            near: fd,
            far: -1,
            owned: false,
        }
    }

    /// Create a fresh pipe endpoint for the given flow direction.
    pub fn pipe(direction: Direction) -> nix::Result<Endpoint> {
        let pipes = fds::make_cloexec_pipes()?;
        let (near, far) = match direction {
            Direction::IntoChild => (pipes.read, pipes.write),
            Direction::FromChild => (pipes.write, pipes.read),
        };
        Ok(Endpoint {
            near: near.into_raw_fd(),
            far: far.into_raw_fd(),
            owned: true,
        })
    }

    /// Realize a redirection request. `Merge` must have been resolved against
    /// the primary output's endpoint by the caller.
    pub fn for_redirect(redirect: Redirect, direction: Direction) -> nix::Result<Endpoint> {
        match redirect {
            Redirect::Pipe => Endpoint::pipe(direction),
            Redirect::Null => Ok(Endpoint::borrowed(fds::dev_null()?)),
            Redirect::Fd(fd) => Ok(Endpoint::borrowed(fd)),
            Redirect::Merge => panic!("Merge must be resolved against the primary output"),
        }
    }

    pub fn near(&self) -> RawFd {
        self.near
    }

    #[cfg(test)]
    pub fn far(&self) -> RawFd {
        self.far
    }

    /// Duplicate `near` onto `target`, replacing whatever descriptor `target`
    /// held. Only used in the forked child; must stay async-signal-safe.
    pub fn link_to(&self, target: RawFd) -> Result<(), Errno> {
        if self.near == target {
            // dup2 with equal fds is a no-op and would leave close-on-exec
            // set; clear the flag instead so the fd survives exec.
            if fds::set_cloexec(self.near, false) < 0 {
                return Err(Errno::last());
            }
            return Ok(());
        }
        if unsafe { libc::dup2(self.near, target) } < 0 {
            return Err(Errno::last());
        }
        Ok(())
    }

    /// Move `near` onto a freshly allocated descriptor referring to the same
    /// open file. Only used in the forked child, and only while `near` sits
    /// on a standard stream slot that a later link will overwrite (otherwise
    /// the old `near` would leak).
    pub fn rebind_near(&mut self) -> Result<(), Errno> {
        let new_fd = unsafe { libc::dup(self.near) };
        if new_fd < 0 {
            return Err(Errno::last());
        }
        self.near = new_fd;
        Ok(())
    }

    /// Close both ends above the standard stream range. Only used in the
    /// forked child, between the redirection links and exec. Our own fds
    /// carry close-on-exec anyway, but borrowed ones may not; EBADF from a
    /// near shared between two endpoints is harmless.
    pub fn close_child_side(&self) {
        if self.near > libc::STDERR_FILENO {
            let _ = unsafe { libc::close(self.near) };
        }
        if self.far > libc::STDERR_FILENO {
            let _ = unsafe { libc::close(self.far) };
        }
    }

    /// Move out the parent's pipe end, if any, leaving the endpoint without
    /// a far side.
    pub fn take_far(&mut self) -> Option<OwnedFd> {
        if self.far < 0 {
            return None;
        }
        let fd = self.far;
        self.far = -1;
        Some(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Close the parent's copy of the child-facing pipe end; it belongs to
    /// the child now. Borrowed descriptors are left alone.
    pub fn close_near_parent(&mut self) {
        if self.owned && self.near >= 0 {
            fds::exec_close(self.near);
            self.near = -1;
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        if self.near >= 0 {
            fds::exec_close(self.near);
        }
        if self.far >= 0 {
            fds::exec_close(self.far);
        }
    }
}
