//! The process handle: spawning a child with redirections, and the
//! thread-safe lifecycle operations (wait, bounded wait, poll, kill) over it.

use crate::flog::flog;
use crate::fork_exec::{execute_fork, postfork};
use crate::null_terminated_array::OwningNullTerminatedArray;
use crate::redirection::{Direction, Endpoint, Redirect};
use crate::signal::Signal;
use libc::{pid_t, WEXITSTATUS, WIFEXITED, WIFSIGNALED, WNOHANG, WTERMSIG};
use nix::errno::Errno;
use std::ffi::CString;
use std::fmt;
use std::num::NonZeroI32;
use std::os::fd::OwnedFd;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A process identifier. Always positive: a handle always refers to a real
/// child, so there is no "no process" value to represent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pid(NonZeroI32);

impl Pid {
    pub fn new(pid: pid_t) -> Option<Pid> {
        if pid > 0 {
            NonZeroI32::new(pid).map(Pid)
        } else {
            None
        }
    }

    pub fn get(self) -> pid_t {
        self.0.get()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value type wrapping the raw status word reported by waitpid, with the
/// exited-vs-signaled decoding logic in one place.
#[derive(Clone, Copy)]
pub(crate) struct WaitStatus(libc::c_int);

impl WaitStatus {
    pub fn normal_exited(self) -> bool {
        WIFEXITED(self.0)
    }

    pub fn signal_exited(self) -> bool {
        WIFSIGNALED(self.0)
    }

    /// Collapse the status into the handle's exit-code encoding: a normal
    /// exit status n as n, termination by signal s as -s. Stop/continue
    /// reports (which we never request) yield None.
    pub fn encode(self) -> Option<i32> {
        if self.normal_exited() {
            Some(WEXITSTATUS(self.0))
        } else if self.signal_exited() {
            Some(-WTERMSIG(self.0))
        } else {
            None
        }
    }
}

/// Whether the child is still to be collected, and who is doing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    /// Child has been reaped and the exit code recorded. Terminal.
    Done,
    /// Child running (or a zombie), and no thread is in the reap syscall.
    Unwaited,
    /// Exactly one thread is in the reap syscall on our behalf.
    Awaited,
}

struct RunningState {
    run: RunState,
    exit_code: i32,
}

/// The lifecycle gate. The mutex protects the state and exit code and, by
/// being held across waitpid, guarantees the kernel sees exactly one reap
/// for this child. The condvar signals departures from Awaited.
struct Lifecycle {
    running: Mutex<RunningState>,
    not_awaited: Condvar,
}

/// Longest single nap in the bounded wait's polling loop.
const MAX_REAP_NAP: Duration = Duration::from_millis(64);

/// The result of one non-blocking reap attempt.
enum Reap {
    Exited(WaitStatus),
    Running,
    Failed(Errno),
}

/// waitpid with WNOHANG, retrying on EINTR.
fn waitpid_nohang(pid: Pid) -> Reap {
    loop {
        let mut status = 0;
        let ret = unsafe { libc::waitpid(pid.get(), &mut status, WNOHANG) };
        if ret == 0 {
            return Reap::Running;
        }
        if ret > 0 {
            return Reap::Exited(WaitStatus(status));
        }
        let err = Errno::last();
        if err != Errno::EINTR {
            return Reap::Failed(err);
        }
    }
}

/// Blocking waitpid, retrying on EINTR.
fn waitpid_blocking(pid: Pid) -> Result<WaitStatus, Errno> {
    loop {
        let mut status = 0;
        let ret = unsafe { libc::waitpid(pid.get(), &mut status, 0) };
        if ret > 0 {
            return Ok(WaitStatus(status));
        }
        let err = Errno::last();
        if err != Errno::EINTR {
            return Err(err);
        }
    }
}

/// A handle to a spawned child process.
///
/// All lifecycle operations are safe to call from any thread. Dropping the
/// handle closes its pipe descriptors but does not kill or wait for the
/// child; an unwaited child is deliberately left behind so that temporary
/// handles can be chained into pipelines. Call [`Process::wait`] (or
/// [`Process::kill`] then wait) to avoid leaving a zombie around for the
/// rest of the parent's life.
pub struct Process {
    pid: Pid,

    /// Parent ends of the child's standard streams; Some only where the
    /// corresponding request was [`Redirect::Pipe`]. Take one to close it
    /// early, e.g. to deliver EOF on the child's stdin.
    pub stdin: Option<OwnedFd>,
    pub stdout: Option<OwnedFd>,
    pub stderr: Option<OwnedFd>,

    lifecycle: Lifecycle,
}

impl Process {
    /// The exit code before termination has been observed, and after a
    /// failed reap (e.g. when the process ignores SIGCHLD).
    pub const UNKNOWN_EXIT: i32 = -127;

    /// The exit code reported when the program could not be executed, as
    /// most shells do.
    pub const COMMAND_NOT_FOUND: i32 = 127;

    /// Spawn `argv[0]` (subject to PATH search) with the given argument list
    /// and one redirection request per standard stream.
    ///
    /// Panics if `argv` is empty or if [`Redirect::Merge`] is requested for
    /// a stream other than stderr. Fails with the originating errno if a
    /// pipe cannot be created or fork fails. A program that cannot be
    /// executed is not a spawn failure: the child exists by the time that is
    /// known, so it surfaces as exit code [`Process::COMMAND_NOT_FOUND`].
    pub fn spawn(
        argv: &[&str],
        stdin: Redirect,
        stdout: Redirect,
        stderr: Redirect,
    ) -> nix::Result<Process> {
        assert!(!argv.is_empty(), "spawn requires a program name");
        assert!(stdin != Redirect::Merge, "Merge is only valid for stderr");
        assert!(stdout != Redirect::Merge, "Merge is only valid for stderr");

        let mut cstrs = Vec::with_capacity(argv.len());
        for arg in argv {
            cstrs.push(CString::new(*arg).map_err(|_| Errno::EINVAL)?);
        }
        let argv_array = OwningNullTerminatedArray::new(cstrs);

        // Resolve the requests in stream order. A merged stderr borrows the
        // primary output's child-side fd, so both streams land on the same
        // destination, including when that destination is a pipe.
        let mut pipe_in = Endpoint::for_redirect(stdin, Direction::IntoChild)?;
        let mut pipe_out = Endpoint::for_redirect(stdout, Direction::FromChild)?;
        let mut pipe_err = match stderr {
            Redirect::Merge => Endpoint::borrowed(pipe_out.near()),
            other => Endpoint::for_redirect(other, Direction::FromChild)?,
        };

        let pid = execute_fork()?;
        if pid == 0 {
            // Child. Never returns.
            postfork::child_exec(&pipe_in, &mut pipe_out, &pipe_err, &argv_array);
        }

        let pid = Pid::new(pid).expect("fork returned an invalid pid");
        flog!(fork, "spawned child {pid}");

        // Harvest the parent-side pipe ends and drop our copies of the
        // child-side ones, which belong to the child now.
        let stdin_fd = pipe_in.take_far();
        let stdout_fd = pipe_out.take_far();
        let stderr_fd = pipe_err.take_far();
        pipe_in.close_near_parent();
        pipe_out.close_near_parent();
        pipe_err.close_near_parent();

        Ok(Process {
            pid,
            stdin: stdin_fd,
            stdout: stdout_fd,
            stderr: stderr_fd,
            lifecycle: Lifecycle {
                running: Mutex::new(RunningState {
                    run: RunState::Unwaited,
                    exit_code: Process::UNKNOWN_EXIT,
                }),
                not_awaited: Condvar::new(),
            },
        })
    }

    /// The child's process id. Once the child has been collected the OS may
    /// recycle the number, so treat it as opaque after [`Process::poll`]
    /// reports completion.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The recorded exit code: [`Process::UNKNOWN_EXIT`] until termination
    /// has been observed, then the terminal value forever.
    pub fn exit_code(&self) -> i32 {
        self.lifecycle.running.lock().unwrap().exit_code
    }

    /// Block until the child has terminated and been collected, and return
    /// its exit code. Safe to call from many threads; all of them return the
    /// same terminal value.
    pub fn wait(&self) -> i32 {
        let guard = self.lifecycle.running.lock().unwrap();
        let mut state = self
            .lifecycle
            .not_awaited
            .wait_while(guard, |s| s.run == RunState::Awaited)
            .unwrap();
        if state.run == RunState::Done {
            return state.exit_code;
        }

        // Nobody waits for Awaited, so no notify for this transition.
        state.run = RunState::Awaited;

        // The mutex is held across the blocking reap on purpose: a second
        // concurrent waitpid on the same pid would fail with ECHILD and the
        // status would be lost.
        match waitpid_blocking(self.pid) {
            Ok(status) => {
                if let Some(code) = status.encode() {
                    state.exit_code = code;
                }
            }
            // Possibly SIGCHLD is explicitly ignored process-wide; the exit
            // code then stays unknown.
            Err(err) => flog!(reap, "waitpid({}): {err}", self.pid),
        }

        state.run = RunState::Done;
        self.lifecycle.not_awaited.notify_all();
        state.exit_code
    }

    /// Wait for the child for at most `timeout`. Returns the exit code if
    /// the child terminated within the bound, None otherwise.
    ///
    /// Concurrent bounded waiters cooperate rather than race: one of them
    /// polls the kernel while the others sleep on the condvar, and a poller
    /// whose time is up hands the role to the next waiter in line. The set
    /// of waiters collectively observes termination even when no single
    /// waiter's timeout outlives the child.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now() + timeout;

        let guard = self.lifecycle.running.lock().unwrap();
        let (mut state, timeout_result) = self
            .lifecycle
            .not_awaited
            .wait_timeout_while(guard, timeout, |s| s.run == RunState::Awaited)
            .unwrap();
        if timeout_result.timed_out() {
            // Someone else is still in the reap syscall.
            return None;
        }
        if state.run == RunState::Done {
            return Some(state.exit_code);
        }

        state.run = RunState::Awaited;

        // Poll with exponential backoff, holding the mutex throughout (see
        // wait()). waitpid must run at least once no matter how short the
        // timeout was.
        let mut nap = Duration::from_millis(1);
        let status = loop {
            match waitpid_nohang(self.pid) {
                Reap::Exited(status) => break Some(status),
                Reap::Failed(err) => {
                    flog!(reap, "waitpid({}): {err}", self.pid);
                    break None;
                }
                Reap::Running => {}
            }

            let now = Instant::now();
            if now >= deadline {
                // Out of time; hand the reaper role to the next in line.
                // One waiter is enough, since whoever wakes is willing.
                state.run = RunState::Unwaited;
                self.lifecycle.not_awaited.notify_one();
                return None;
            }
            std::thread::sleep(nap.min(deadline - now));
            if nap < MAX_REAP_NAP {
                nap *= 2;
            }
        };

        if let Some(code) = status.and_then(WaitStatus::encode) {
            state.exit_code = code;
        }
        state.run = RunState::Done;
        self.lifecycle.not_awaited.notify_all();
        Some(state.exit_code)
    }

    /// Check whether the child has terminated, without blocking (beyond
    /// mutex acquisition). Collects the child if it is collectable.
    ///
    /// This is the way to ask "is it done": the recorded state only reflects
    /// the most recent wait or poll, so a merely-terminated child is not
    /// Done until some operation observes it.
    pub fn poll(&self) -> bool {
        let mut state = self.lifecycle.running.lock().unwrap();
        if state.run == RunState::Unwaited {
            match waitpid_nohang(self.pid) {
                Reap::Running => return false,
                Reap::Exited(status) => {
                    if let Some(code) = status.encode() {
                        state.exit_code = code;
                    }
                }
                Reap::Failed(err) => {
                    flog!(reap, "waitpid({}): {err}", self.pid);
                }
            }
            state.run = RunState::Done;
            self.lifecycle.not_awaited.notify_all();
        }
        state.run == RunState::Done
    }

    /// Send the given signal to the child. A no-op if the child is Done.
    ///
    /// poll() runs first because a terminated-but-uncollected child is a
    /// zombie, which signals cannot reach; the way to retire it is to reap
    /// it, which poll() just did.
    pub fn kill(&self, signal: Signal) -> nix::Result<()> {
        if self.poll() {
            return Ok(());
        }
        if unsafe { libc::kill(self.pid.get(), signal.code()) } == -1 {
            return Err(Errno::last());
        }
        Ok(())
    }

    /// Ask the child to terminate with SIGTERM.
    pub fn terminate(&self) -> nix::Result<()> {
        self.kill(Signal::TERM)
    }
}
