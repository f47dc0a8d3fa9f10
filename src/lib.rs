//! Thread-safe subprocess spawning for POSIX systems.
//!
//! A [`Process`] is started with an argv and three per-stream [`Redirect`]
//! requests. Each standard stream of the child may independently be inherited,
//! sent to the null device, wired to a caller-supplied descriptor, cross-wired
//! onto another standard stream, or connected to a fresh pipe whose parent end
//! is exposed on the handle. Once spawned, any number of threads may wait for,
//! poll, or signal the child; the handle serializes the reap syscall so the
//! child is collected exactly once.
//!
//! Dropping a handle closes its pipe ends but neither kills nor waits for the
//! child, so temporaries can be chained into pipelines.

#![allow(non_upper_case_globals)]

pub mod fds;
pub mod flog;
pub mod fork_exec;
pub mod null_terminated_array;
pub mod proc;
pub mod redirection;
pub mod signal;

#[cfg(test)]
mod tests;

pub use proc::{Pid, Process};
pub use redirection::Redirect;
pub use signal::Signal;
