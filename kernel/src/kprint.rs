//! Kernel print utilities.

use crate::sync::SpinLock;
use std::io::Write;

/// The console device. Writes go straight to the standard output.
pub struct Console {
    _p: (),
}

impl core::fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let mut out = std::io::stdout().lock();
        out.write_all(s.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|_| core::fmt::Error)
    }
}

static CONSOLE: SpinLock<Console> = SpinLock::new(Console { _p: () });

#[doc(hidden)]
pub fn _print(fmt: core::fmt::Arguments<'_>) {
    use core::fmt::Write;

    let mut guard = CONSOLE.lock();
    let _ = write!(&mut *guard, "{fmt}");
    guard.unlock();
}

/// Prints out the message.
///
/// Use the format! syntax to write data to the standard output.
/// This first holds the lock for console device.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::kprint::_print(format_args!($($arg)*)));
}

/// Prints out the message with a newline.
///
/// Use the format! syntax to write data to the standard output.
/// This first holds the lock for console device.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Display an information message.
#[macro_export]
macro_rules! info {
    () => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[INFO]\n") });
    ($($arg:tt)*) => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[INFO] {}\n", format_args!($($arg)*)) });
}

/// Display a warning message.
#[macro_export]
macro_rules! warning {
    () => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[WARN]\n") });
    ($($arg:tt)*) => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[WARN] {}\n", format_args!($($arg)*)) });
}

/// Display a debug message.
#[macro_export]
macro_rules! debug {
    () => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[DEBUG]\n") });
    ($($arg:tt)*) => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[DEBUG] {}\n", format_args!($($arg)*))} );
}
