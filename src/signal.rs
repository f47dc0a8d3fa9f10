use std::fmt;
use std::num::NonZeroI32;

/// A wrapper around a system signal code. Zero is not a valid signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signal(NonZeroI32);

struct LookupEntry {
    code: i32,
    name: &'static str,
}

macro_rules! entry {
    ($name:ident) => {
        LookupEntry {
            code: libc::$name,
            name: stringify!($name),
        }
    };
}

/// The signals we can name. Unlisted codes are still valid signals.
static SIGNAL_TABLE: &[LookupEntry] = &[
    entry!(SIGHUP),
    entry!(SIGINT),
    entry!(SIGQUIT),
    entry!(SIGILL),
    entry!(SIGABRT),
    entry!(SIGFPE),
    entry!(SIGKILL),
    entry!(SIGSEGV),
    entry!(SIGPIPE),
    entry!(SIGALRM),
    entry!(SIGTERM),
    entry!(SIGUSR1),
    entry!(SIGUSR2),
    entry!(SIGCHLD),
    entry!(SIGCONT),
    entry!(SIGSTOP),
    entry!(SIGTSTP),
];

impl Signal {
    pub const KILL: Signal = Signal::new(libc::SIGKILL);
    pub const TERM: Signal = Signal::new(libc::SIGTERM);

    /// Creates a new `Signal` to represent the passed system signal code `sig`.
    /// Panics if `sig` is zero.
    pub const fn new(sig: i32) -> Self {
        match NonZeroI32::new(sig) {
            None => panic!("Invalid zero signal value!"),
            Some(result) => Signal(result),
        }
    }

    pub fn code(self) -> i32 {
        self.0.into()
    }

    /// Get the string representation of a signal, or None if unknown.
    pub fn name(self) -> Option<&'static str> {
        SIGNAL_TABLE
            .iter()
            .find(|entry| entry.code == self.code())
            .map(|entry| entry.name)
    }
}

impl From<i32> for Signal {
    fn from(code: i32) -> Self {
        Signal::new(code)
    }
}

impl From<Signal> for i32 {
    fn from(sig: Signal) -> Self {
        sig.code()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "signal {}", self.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Signal;

    #[test]
    fn test_signal_names() {
        assert_eq!(Signal::KILL.name(), Some("SIGKILL"));
        assert_eq!(Signal::new(libc::SIGTERM).to_string(), "SIGTERM");
        assert_eq!(Signal::new(250).name(), None);
        assert_eq!(Signal::new(250).to_string(), "signal 250");
    }

    #[test]
    fn test_signal_codes() {
        assert_eq!(Signal::KILL.code(), libc::SIGKILL);
        assert_eq!(i32::from(Signal::TERM), libc::SIGTERM);
        assert_eq!(Signal::from(libc::SIGINT).code(), libc::SIGINT);
    }

    #[test]
    #[should_panic]
    fn test_zero_signal_panics() {
        let _ = Signal::new(0);
    }
}
