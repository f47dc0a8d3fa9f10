//! Category-gated logging to a process-wide file descriptor.
//!
//! Messages go to stderr unless redirected with [`set_flog_file_fd`]. Each
//! category can be toggled at runtime; the noisy ones default to off.

use libc::c_int;
use std::sync::atomic::{AtomicI32, Ordering};

pub mod categories {
    use std::sync::atomic::AtomicBool;

    pub struct Category {
        pub name: &'static str,
        pub description: &'static str,
        pub enabled: AtomicBool,
    }

    macro_rules! declare_category {
        (($var:ident, $name:literal, $description:literal, $enabled:expr)) => {
            pub static $var: Category = Category {
                name: $name,
                description: $description,
                enabled: AtomicBool::new($enabled),
            };
        };
        (($var:ident, $name:literal, $description:literal)) => {
            declare_category!(($var, $name, $description, false));
        };
    }

    macro_rules! categories {
        ($($cats:tt);* $(;)?) => {
            $(declare_category!($cats);)*
        };
    }

    categories!(
        (error, "error", "Serious unexpected errors (on by default)", true);

        (warning, "warning", "Warnings (on by default)", true);

        (exec, "exec", "Errors reported by exec (on by default)", true);

        (fork, "fork", "Calls to fork()");

        (reap, "reap", "Collecting child exit statuses");
    );
}

/// The fd which flog writes to, defaulting to stderr.
static FLOG_FD: AtomicI32 = AtomicI32::new(libc::STDERR_FILENO);

/// Direct logging to the given fd. Pass a negative value to silence logging.
/// The fd is borrowed, not owned; it is never closed by this module.
pub fn set_flog_file_fd(fd: c_int) {
    FLOG_FD.store(fd, Ordering::Relaxed);
}

pub fn get_flog_file_fd() -> c_int {
    FLOG_FD.load(Ordering::Relaxed)
}

/// Write one line for the given category. Prefer the `flog!` macro.
pub fn flog_impl(category: &str, msg: &str) {
    let fd = get_flog_file_fd();
    if fd < 0 {
        return;
    }
    // A single write so concurrent loggers do not interleave mid-line.
    let line = format!("{category}: {msg}\n");
    let _ = unsafe { libc::write(fd, line.as_ptr().cast(), line.len()) };
}

/// Report the errno-described failure of `context` (a syscall name), like
/// perror(3) but to the flog fd.
pub fn perror(context: &str) {
    let err = errno::errno();
    flog_impl("error", &format!("{context}: {err}"));
}

macro_rules! flog {
    ($category:ident, $($arg:tt)*) => {
        if $crate::flog::categories::$category
            .enabled
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            $crate::flog::flog_impl(
                $crate::flog::categories::$category.name,
                &format!($($arg)*),
            );
        }
    };
}

pub(crate) use flog;
