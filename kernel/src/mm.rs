//! Memory management of kernel objects.
//!
//! Every kernel object allocates its name when it is created, and that
//! allocation may fail. Creation reports the failure as
//! [`KernelError::NoMemory`] instead of aborting, so a caller that builds
//! several objects can release the ones it already owns and propagate the
//! error.
//!
//! ## Fault injection
//!
//! Out-of-memory conditions are hard to reach on a host. [`fail_after`] arms
//! a per-thread budget: after `n` more successful allocations, every
//! allocation made through this module by the calling thread fails until
//! [`clear_fault`] is called.

use crate::KernelError;
use std::cell::Cell;

thread_local! {
    static BUDGET: Cell<Option<usize>> = const { Cell::new(None) };
}

fn charge() -> Result<(), KernelError> {
    BUDGET.with(|budget| match budget.get() {
        None => Ok(()),
        Some(0) => Err(KernelError::NoMemory),
        Some(n) => {
            budget.set(Some(n - 1));
            Ok(())
        }
    })
}

/// Allocates a copy of `name` for a kernel object.
pub fn alloc_name(name: &str) -> Result<Box<str>, KernelError> {
    charge()?;
    let mut buf = String::new();
    buf.try_reserve_exact(name.len())
        .map_err(|_| KernelError::NoMemory)?;
    buf.push_str(name);
    Ok(buf.into_boxed_str())
}

/// Make the calling thread's allocations fail after `n` more successes.
pub fn fail_after(n: usize) {
    BUDGET.with(|budget| budget.set(Some(n)));
}

/// Disarm the fault armed by [`fail_after`].
pub fn clear_fault() {
    BUDGET.with(|budget| budget.set(None));
}
