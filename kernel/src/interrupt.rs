//! Atomic sections.
//!
//! A kernel makes a check-then-block sequence indivisible by disabling
//! preemption on the current core while it runs. Threads of this kernel are
//! scheduled by the host, which cannot be told to stop preempting them, so
//! an atomic section is always entered together with a [`SpinLock`]: the
//! spinlock provides the mutual exclusion, and the [`InterruptGuard`] records
//! that the current thread is inside a section that must never be suspended.
//!
//! Guards nest. The thread leaves the atomic section when the outermost guard
//! is dropped.
//!
//! [`SpinLock`]: crate::sync::SpinLock

use core::{cell::Cell, marker::PhantomData};

thread_local! {
    static DEPTH: Cell<isize> = const { Cell::new(0) };
}

/// A RAII marker of an atomic section.
///
/// When the last [`InterruptGuard`] of a thread is dropped, the thread is
/// allowed to park again.
pub struct InterruptGuard {
    _not_send: PhantomData<*const ()>,
}

impl InterruptGuard {
    /// Enters an atomic section on the current thread.
    pub fn new() -> Self {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }

    /// Returns whether the current thread is inside an atomic section.
    pub fn is_guarded() -> bool {
        DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| {
            let prev = depth.get();
            assert!(prev > 0, "Mismatched InterruptGuard drop calls: {prev}");
            depth.set(prev - 1);
        });
    }
}
