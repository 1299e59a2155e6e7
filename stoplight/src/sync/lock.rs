//! # Lock.
//!
//! A lock allows **only one thread at a time** to run a critical section.
//! Unlike the [`SpinLock`], it **parks** the threads trying to acquire it while
//! another thread holds it.
//!
//! The [`Lock`] keeps the identity of its holder and the list of threads parked
//! on it, both behind a spinlock. Acquiring reads the holder and, if the lock is
//! held, registers the caller as a waiter and parks it; the spinlock is
//! released only inside [`Current::park_with`], so a release that happens in
//! between cannot be missed. On release, **every** waiter is woken and they
//! race for the lock again. The lock is therefore not FIFO.
//!
//! A [`Lock`] carries the data it protects. The data can only be reached
//! through the [`LockGuard`] returned by [`Lock::acquire`] or
//! [`Lock::try_acquire`], and the guard must be given back with
//! [`LockGuard::release`]:
//!
//! ```rust
//! let counter = Lock::new("counter", 0usize)?;
//!
//! let mut guard = counter.acquire();
//! *guard += 1;
//! guard.release();
//! ```
//!
//! [`SpinLock`]: kernel::sync::SpinLock
//! [`Current::park_with`]: kernel::thread::Current::park_with

use alloc::collections::vec_deque::VecDeque;
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};
use kernel::{
    KernelError,
    interrupt::InterruptGuard,
    mm::alloc_name,
    sync::{SpinLock, WouldBlock},
    thread::{Current, ParkHandle},
};

struct LockState {
    holder: Option<u64>,
    waiters: VecDeque<ParkHandle>,
}

/// A named, sleeping mutual exclusion lock protecting a `T`.
pub struct Lock<T = ()> {
    name: Box<str>,
    state: SpinLock<LockState>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Lock<T> {}
unsafe impl<T: Send> Sync for Lock<T> {}

impl<T> Lock<T> {
    /// Creates a new lock named `name` in the free state.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NoMemory`] if the lock cannot be allocated.
    pub fn new(name: &str, data: T) -> Result<Self, KernelError> {
        Ok(Self {
            name: alloc_name(name)?,
            state: SpinLock::new(LockState {
                holder: None,
                waiters: VecDeque::new(),
            }),
            data: UnsafeCell::new(data),
        })
    }

    /// The name of this lock.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the lock, parking the current thread until it is able to do
    /// so.
    ///
    /// Upon returning, the thread is the only thread with the lock held.
    ///
    /// # Panics
    ///
    /// Panics if the current thread already holds the lock, or if it is
    /// inside an atomic section.
    #[track_caller]
    pub fn acquire(&self) -> LockGuard<'_, T> {
        assert!(
            !InterruptGuard::is_guarded(),
            "Lock `{}`: acquired in an atomic section.",
            self.name
        );
        let tid = Current::get_tid();
        let mut state = self.state.lock();
        if state.holder == Some(tid) {
            state.unlock();
            panic!("Lock `{}`: acquired twice by thread {tid}.", self.name);
        }
        while state.holder.is_some() {
            Current::park_with(move |handle| {
                state.waiters.push_back(handle);
                state.unlock();
            });
            state = self.state.lock();
        }
        state.holder = Some(tid);
        state.unlock();

        LockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Attempts to acquire this lock.
    ///
    /// This function does not block.
    ///
    /// # Errors
    ///
    /// If the lock is held, then this call will return the [`WouldBlock`]
    /// error.
    pub fn try_acquire(&self) -> Result<LockGuard<'_, T>, WouldBlock> {
        let mut state = self.state.lock();
        if state.holder.is_some() {
            state.unlock();
            return Err(WouldBlock);
        }
        state.holder = Some(Current::get_tid());
        state.unlock();

        Ok(LockGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// Returns whether the current thread holds this lock.
    pub fn held_by_caller(&self) -> bool {
        let tid = Current::get_tid();
        let state = self.state.lock();
        let held = state.holder == Some(tid);
        state.unlock();
        held
    }

    /// Number of threads parked on this lock.
    pub fn waiters(&self) -> usize {
        let state = self.state.lock();
        let n = state.waiters.len();
        state.unlock();
        n
    }

    /// Destroys the lock, returning the protected data.
    ///
    /// # Panics
    ///
    /// Panics if the lock is held or a thread is parked on it.
    pub fn destroy(self) -> T {
        let mut this = core::mem::ManuallyDrop::new(self);
        this.check_idle();
        unsafe {
            core::ptr::drop_in_place(&mut this.name);
            core::ptr::drop_in_place(&mut this.state);
            core::ptr::read(this.data.get())
        }
    }

    fn check_idle(&mut self) {
        let state = self.state.get_mut();
        assert!(
            state.holder.is_none(),
            "Lock `{}`: destroyed while held by thread {:?}.",
            self.name,
            state.holder
        );
        assert!(
            state.waiters.is_empty(),
            "Lock `{}`: destroyed with {} waiters.",
            self.name,
            state.waiters.len()
        );
    }

    /// Hands the lock back if `tid` holds it, returning the actual holder
    /// otherwise.
    fn release_by(&self, tid: u64) -> Result<(), Option<u64>> {
        let mut state = self.state.lock();
        if state.holder != Some(tid) {
            let holder = state.holder;
            state.unlock();
            return Err(holder);
        }
        state.holder = None;
        let waiters = core::mem::take(&mut state.waiters);
        state.unlock();

        for waiter in waiters {
            waiter.unpark();
        }
        Ok(())
    }
}

impl<T> Drop for Lock<T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.check_idle();
        }
    }
}

/// An implementation of a "scoped lock" of a [`Lock`]. When this structure
/// is dropped (falls out of scope) without release, panic occurs.
///
/// The lock must be explicitly released by [`release`] method.
///
/// The data protected by the lock can be accessed through this guard.
///
/// [`release`]: LockGuard::release
pub struct LockGuard<'a, T: 'a> {
    lock: &'a Lock<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: Sync> Sync for LockGuard<'_, T> {}

impl<'a, T> LockGuard<'a, T> {
    /// Releases the underlying [`Lock`] and wakes every thread parked on it.
    ///
    /// # Panics
    ///
    /// Panics if the current thread is not the holder of the lock.
    pub fn release(self) {
        let lock = self.lock;
        core::mem::forget(self);

        let tid = Current::get_tid();
        if let Err(holder) = lock.release_by(tid) {
            panic!(
                "Lock `{}`: released by thread {tid}, but held by {holder:?}.",
                lock.name
            );
        }
    }

    /// The lock this guard holds.
    pub fn lock(&self) -> &'a Lock<T> {
        self.lock
    }
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        // Unwinding: hand the lock to the waiters so they observe the panic.
        if std::thread::panicking() {
            let _ = self.lock.release_by(Current::get_tid());
            return;
        }
        panic!(
            "`.release()` must be explicitly called for LockGuard of `{}`.",
            self.lock.name
        );
    }
}
