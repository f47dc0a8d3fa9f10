//! Endpoint mechanics and end-to-end coverage of the output wiring cases:
//! distinct targets, inherited streams, diagnostics merged onto the primary
//! output, and the stdout/stderr swap.

use super::prelude::*;
use crate::fds::make_cloexec_pipes;
use crate::proc::Process;
use crate::redirection::{Direction, Endpoint, Redirect};
use std::os::fd::AsRawFd;

#[test]
fn test_pipe_endpoint_orientation() {
    // A stream into the child has the read end near (child-facing): what the
    // parent writes to far must come out of near.
    let mut ep = Endpoint::pipe(Direction::IntoChild).unwrap();
    assert!(ep.near() >= 0);
    assert!(ep.far() >= 0);
    assert_ne!(ep.near(), ep.far());

    let far = ep.take_far().unwrap();
    write_all(far, b"ping");

    let mut buf = [0u8; 8];
    let n = unsafe { libc::read(ep.near(), buf.as_mut_ptr().cast(), buf.len()) };
    assert_eq!(n, 4);
    assert_eq!(&buf[..4], b"ping");

    // The far end can only be taken once.
    assert!(ep.take_far().is_none());
}

#[test]
fn test_owned_endpoint_closes_on_drop() {
    let (near, far);
    {
        let ep = Endpoint::pipe(Direction::FromChild).unwrap();
        near = ep.near();
        far = ep.far();
    }
    assert_eq!(unsafe { libc::fcntl(near, libc::F_GETFD, 0) }, -1);
    assert_eq!(unsafe { libc::fcntl(far, libc::F_GETFD, 0) }, -1);
}

#[test]
fn test_borrowed_endpoint_never_closes() {
    let pipes = make_cloexec_pipes().unwrap();
    let fd = pipes.read.as_raw_fd();
    {
        let mut ep = Endpoint::borrowed(fd);
        assert!(ep.take_far().is_none());
        ep.close_near_parent();
    }
    // Still open: the endpoint neither owned nor closed it.
    assert!(unsafe { libc::fcntl(fd, libc::F_GETFD, 0) } >= 0);
}

#[test]
fn test_borrowed_stdin_descriptor() {
    // Feed the child through a descriptor we own, and verify the handle
    // leaves it open afterwards.
    let pipes = make_cloexec_pipes().unwrap();
    let read_fd = pipes.read.as_raw_fd();

    let mut p = Process::spawn(
        &["cat"],
        Redirect::Fd(read_fd),
        Redirect::Pipe,
        Redirect::Null,
    )
    .unwrap();
    write_all(pipes.write, b"hello\n");

    assert_eq!(read_all(p.stdout.take().unwrap()), "hello\n");
    assert_eq!(p.wait(), 0);
    assert!(unsafe { libc::fcntl(read_fd, libc::F_GETFD, 0) } >= 0);
}

#[test]
fn test_outputs_to_distinct_pipes() {
    let mut p = spawn_sh(AB_SCRIPT, Redirect::Null, Redirect::Pipe, Redirect::Pipe);
    assert!(p.stdin.is_none());
    let out = read_all(p.stdout.take().unwrap());
    let err = read_all(p.stderr.take().unwrap());
    assert_eq!(p.wait(), 0);
    assert_eq!(out, "A");
    assert_eq!(err, "B");
}

#[test]
#[serial]
fn test_inherited_stdout_with_stderr_pipe() {
    let pipes = make_cloexec_pipes().unwrap();
    let splice = SpliceStdFd::new(libc::STDOUT_FILENO, pipes.write.as_raw_fd());

    let mut p = spawn_sh(
        AB_SCRIPT,
        Redirect::Null,
        Redirect::INHERIT_STDOUT,
        Redirect::Pipe,
    );
    let err = read_all(p.stderr.take().unwrap());
    assert_eq!(p.wait(), 0);

    drop(splice);
    drop(pipes.write);
    assert_eq!(read_all(pipes.read), "A");
    assert_eq!(err, "B");
}

#[test]
#[serial]
fn test_inherited_stderr_with_stdout_pipe() {
    let pipes = make_cloexec_pipes().unwrap();
    let splice = SpliceStdFd::new(libc::STDERR_FILENO, pipes.write.as_raw_fd());

    let mut p = spawn_sh(
        AB_SCRIPT,
        Redirect::Null,
        Redirect::Pipe,
        Redirect::INHERIT_STDERR,
    );
    let out = read_all(p.stdout.take().unwrap());
    assert_eq!(p.wait(), 0);

    drop(splice);
    drop(pipes.write);
    assert_eq!(read_all(pipes.read), "B");
    assert_eq!(out, "A");
}

#[test]
#[serial]
fn test_merge_onto_inherited_stdout() {
    // Diagnostics follow the primary output onto the parent's stdout.
    let pipes = make_cloexec_pipes().unwrap();
    let splice = SpliceStdFd::new(libc::STDOUT_FILENO, pipes.write.as_raw_fd());

    let p = spawn_sh(
        AB_SCRIPT,
        Redirect::Null,
        Redirect::INHERIT_STDOUT,
        Redirect::Merge,
    );
    assert_eq!(p.wait(), 0);

    drop(splice);
    drop(pipes.write);
    assert_eq!(read_all(pipes.read), "AB");
}

#[test]
fn test_merge_onto_pipe() {
    // Both streams come out of the one stdout pipe, in program order.
    let mut p = spawn_sh(AB_SCRIPT, Redirect::Null, Redirect::Pipe, Redirect::Merge);
    assert!(p.stderr.is_none());
    let out = read_all(p.stdout.take().unwrap());
    assert_eq!(p.wait(), 0);
    assert_eq!(out, "AB");
}

#[test]
#[serial]
fn test_diagnostics_to_original_stdout() {
    // stdout goes to a pipe while stderr lands where stdout pointed before
    // the pipe took over.
    let pipes = make_cloexec_pipes().unwrap();
    let splice = SpliceStdFd::new(libc::STDOUT_FILENO, pipes.write.as_raw_fd());

    let mut p = spawn_sh(
        AB_SCRIPT,
        Redirect::Null,
        Redirect::Pipe,
        Redirect::INHERIT_STDOUT,
    );
    let out = read_all(p.stdout.take().unwrap());
    assert_eq!(p.wait(), 0);

    drop(splice);
    drop(pipes.write);
    assert_eq!(read_all(pipes.read), "B");
    assert_eq!(out, "A");
}

#[test]
#[serial]
fn test_swap_stdout_and_stderr() {
    let out_pipes = make_cloexec_pipes().unwrap();
    let err_pipes = make_cloexec_pipes().unwrap();
    let out_splice = SpliceStdFd::new(libc::STDOUT_FILENO, out_pipes.write.as_raw_fd());
    let err_splice = SpliceStdFd::new(libc::STDERR_FILENO, err_pipes.write.as_raw_fd());

    let p = spawn_sh(
        AB_SCRIPT,
        Redirect::Null,
        Redirect::INHERIT_STDERR,
        Redirect::INHERIT_STDOUT,
    );
    assert_eq!(p.wait(), 0);

    drop(err_splice);
    drop(out_splice);
    drop(out_pipes.write);
    drop(err_pipes.write);

    // The child's stdout surfaced on the parent's stderr and vice versa.
    assert_eq!(read_all(out_pipes.read), "B");
    assert_eq!(read_all(err_pipes.read), "A");
}

#[test]
#[cfg(any(target_os = "linux", target_os = "android"))]
fn test_no_internal_fds_leak_into_child() {
    // The child enumerates its own open descriptors. Only the standard
    // streams plus the directory fd ls itself opens may appear; any pipe
    // end of ours surviving exec would show up here.
    let mut p = Process::spawn(
        &["ls", "/proc/self/fd"],
        Redirect::Null,
        Redirect::Pipe,
        Redirect::Merge,
    )
    .unwrap();
    let listing = read_all(p.stdout.take().unwrap());
    assert_eq!(p.wait(), 0);
    let fds: Vec<i32> = listing
        .split_whitespace()
        .map(|s| s.parse().unwrap())
        .collect();
    assert!(fds.len() <= 4, "leaked fds in child: {listing}");
    assert!(fds.contains(&0) && fds.contains(&1) && fds.contains(&2));
}

#[test]
fn test_null_input_is_immediate_eof() {
    let mut p = Process::spawn(&["cat"], Redirect::Null, Redirect::Pipe, Redirect::Null).unwrap();
    assert_eq!(read_all(p.stdout.take().unwrap()), "");
    assert_eq!(p.wait(), 0);
}
