//! Self-pipe signal handling: a handler sets an atomic stop flag and writes
//! one byte to a pipe/eventfd; the Mirror Loop observes the pipe by polling
//! it once per iteration and performs orderly shutdown in the main
//! context. `signal_hook::iterator::Signals` owns the self-pipe and
//! signal-context handler internally.

use signal_hook::consts::{SIGABRT, SIGBUS, SIGFPE, SIGILL, SIGINT, SIGQUIT, SIGSEGV, SIGTERM};
use signal_hook::iterator::Signals;
use std::io;

/// Termination signals this system traps: interrupt, terminate, break,
/// abort, and the fatal CPU signals.
const TRAPPED: &[libc::c_int] = &[
    SIGINT, SIGTERM, SIGQUIT, SIGABRT, SIGSEGV, SIGBUS, SIGFPE, SIGILL,
];

pub struct ShutdownSignal {
    signals: Signals,
}

impl ShutdownSignal {
    pub fn install() -> io::Result<ShutdownSignal> {
        let signals = Signals::new(TRAPPED)?;
        Ok(ShutdownSignal { signals })
    }

    /// Non-blocking. Returns the first trapped signal observed since the
    /// last call, if any.
    pub fn poll(&mut self) -> Option<i32> {
        self.signals.pending().next()
    }
}
