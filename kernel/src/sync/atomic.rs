//! A wrapper around the core::sync::atomic.
//!
//! Atomic types provide primitive shared-memory communication between
//! threads, and are the building blocks of other concurrent types.
//!
//! The wrappers in this module always use [`Ordering::SeqCst`], so callers
//! never pick a memory ordering. This is what tests and statistics counters
//! want; the primitives themselves are built on [`SpinLock`].
//!
//! [`SpinLock`]: crate::sync::SpinLock

use core::sync::atomic::Ordering;

/// A boolean type which can be safely shared between threads.
#[derive(Default, Debug)]
pub struct AtomicBool(core::sync::atomic::AtomicBool);

impl AtomicBool {
    /// Creates a new `AtomicBool`.
    #[inline]
    #[must_use]
    pub const fn new(v: bool) -> AtomicBool {
        Self(core::sync::atomic::AtomicBool::new(v))
    }

    /// Loads a value from the bool.
    #[inline]
    pub fn load(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Stores a value into the bool.
    #[inline]
    pub fn store(&self, val: bool) {
        self.0.store(val, Ordering::SeqCst)
    }
}

/// An integer type which can be safely shared between threads.
#[derive(Default, Debug)]
pub struct AtomicUsize(core::sync::atomic::AtomicUsize);

impl AtomicUsize {
    /// Creates a new atomic integer.
    #[inline]
    #[must_use]
    pub const fn new(v: usize) -> AtomicUsize {
        Self(core::sync::atomic::AtomicUsize::new(v))
    }

    /// Loads a value from the atomic integer.
    #[inline]
    pub fn load(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Adds to the current value, returning the previous value.
    ///
    /// This operation wraps around on overflow.
    #[inline]
    pub fn fetch_add(&self, val: usize) -> usize {
        self.0.fetch_add(val, Ordering::SeqCst)
    }
}
