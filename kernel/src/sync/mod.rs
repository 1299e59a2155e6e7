//! Low-level synchronization of the kernel.
//!
//! The blocking primitives (locks, condition variables, semaphores) are not
//! part of the kernel; they are built on top of the [`SpinLock`] and the
//! parking facility of [`thread`].
//!
//! [`thread`]: crate::thread

pub mod atomic;
pub mod spinlock;

pub use spinlock::{SpinLock, SpinLockGuard, WouldBlock};
