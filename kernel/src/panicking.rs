//! Kernel panic.
//!
//! By default a panic only unwinds the panicking thread, and the
//! [`JoinHandle`] of that thread reports an exit code of `-1`. Graders rely on
//! this to check that a violation is caught. A kernel run has no such
//! observer: once a thread breaks an invariant of a shared object, every other
//! thread that touches the object is suspect. [`abort_on_panic`] turns any
//! panic into the end of the process.
//!
//! [`JoinHandle`]: crate::thread::JoinHandle

use std::io::Write;

/// Installs a panic hook that reports the panic and aborts the process.
pub fn abort_on_panic() {
    std::panic::set_hook(Box::new(|info| {
        let (tid, name) = crate::thread::with_current(|th| (th.tid, th.name.clone()));
        let mut err = std::io::stderr().lock();
        let _ = writeln!(
            err,
            "\n\x1b[31mKernel panic\x1b[0m in thread '{name}' (tid {tid}): {info}"
        );
        let _ = err.flush();
        std::process::abort();
    }));
}
