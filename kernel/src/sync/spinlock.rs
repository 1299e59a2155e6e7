//! SMP-supported spinlock.
//!
//! On a single core, a spinlock only has to keep the lock-holding thread from
//! being preempted. With several cores running threads at the same time that
//! is not enough: a core 1) polls a variable that tells whether the lock is
//! taken, 2) sets it when it takes the lock, and 3) clears it on `unlock`.
//!
//! Steps 1 and 2 must be executed ATOMICALLY with an atomic read-modify-write
//! instruction.
//!
//! Holding a [`SpinLock`] also places the thread in an atomic section (see
//! [`InterruptGuard`]). Every blocking primitive of the kernel keeps its own
//! state behind a spinlock, and that is what makes "check the condition,
//! decide to sleep" indivisible.

use crate::interrupt::InterruptGuard;
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    panic::Location,
    sync::atomic::{AtomicBool, Ordering},
};
use crossbeam_utils::{Backoff, CachePadded};

/// The lock could not be acquired at this time because the operation would
/// otherwise block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WouldBlock;

/// A mutual exclusion primitive useful for protecting shared data
///
/// This spinlock will block threads waiting for the lock to become available.
/// The spinlock can be created via a [`new`] constructor. Each spinlock has a
/// type parameter which represents the data that it is protecting. The data can
/// only be accessed through the guard returned from [`lock`], which guarantees
/// that the data is only ever accessed when the spinlock is locked.
///
/// [`new`]: Self::new
/// [`lock`]: Self::lock
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use kernel::sync::SpinLock;
/// use kernel::thread::ThreadBuilder;
///
/// let data = Arc::new(SpinLock::new(0));
///
/// for _ in 0..10 {
///     let data = Arc::clone(&data);
///     ThreadBuilder::new("work").spawn(move || {
///         let mut guard = data.lock();
///         *guard += 1;
///         // the lock must be "explicitly" unlocked before `guard` goes out of scope.
///         guard.unlock();
///     });
/// }
/// ```
pub struct SpinLock<T: ?Sized> {
    locked: CachePadded<AtomicBool>,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new spinlock in an unlocked state ready for use.
    #[inline]
    pub const fn new(t: T) -> SpinLock<T> {
        SpinLock {
            locked: CachePadded::new(AtomicBool::new(false)),
            data: UnsafeCell::new(t),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquires a spinlock, blocking the current thread until it is able to do
    /// so.
    ///
    /// Upon returning, the thread is the only thread with the lock held, and
    /// it is inside an atomic section until the guard is unlocked. When the
    /// guard goes out of scope without [`SpinLockGuard::unlock`], panic
    /// occurs.
    ///
    /// Locking a spinlock in the thread which already holds the lock never
    /// returns.
    #[track_caller]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let backoff = Backoff::new();
        let guard = loop {
            let guard = InterruptGuard::new();
            if !self.locked.swap(true, Ordering::Acquire) {
                break guard;
            }
            drop(guard);

            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        };

        SpinLockGuard {
            caller: Location::caller(),
            lock: self,
            guard: Some(guard),
        }
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// No locking is needed: the mutable borrow guarantees that no guard is
    /// alive.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for SpinLock<T> {
    /// Creates a `SpinLock<T>`, with the `Default` value for T.
    fn default() -> SpinLock<T> {
        SpinLock::new(Default::default())
    }
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

/// An implementation of a "scoped lock" of a spinlock. When this structure
/// is dropped (falls out of scope) without unlock, panic occurs.
///
/// The lock must be explicitly unlocked by [`unlock`] method.
///
/// This structure is created by the [`lock`] method on [`SpinLock`].
///
/// [`lock`]: SpinLock::lock
/// [`unlock`]: Self::unlock
pub struct SpinLockGuard<'a, T: ?Sized + 'a> {
    caller: &'static Location<'static>,
    lock: &'a SpinLock<T>,
    guard: Option<InterruptGuard>,
}

unsafe impl<T: ?Sized + Sync> Sync for SpinLockGuard<'_, T> {}

impl<T: ?Sized> SpinLockGuard<'_, T> {
    /// Releases the underlying [`SpinLock`].
    ///
    /// As the guard does **not** automatically release the lock on drop,
    /// the caller must explicitly invoke [`unlock`] to mark the lock
    /// as available again.
    ///
    /// [`unlock`]: Self::unlock
    pub fn unlock(mut self) {
        self.lock.locked.store(false, Ordering::Release);
        self.guard.take();
        core::mem::forget(self);
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // The lock stays taken; the thread is already going down.
        if std::thread::panicking() {
            return;
        }
        panic!(
            "`.unlock()` must be explicitly called before dropping SpinLockGuard.
The lock is held at {:?}.",
            self.caller
        );
    }
}
