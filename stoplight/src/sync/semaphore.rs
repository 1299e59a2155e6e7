//! # Semaphore.
//!
//! A **semaphore** regulates concurrent access to a finite set of resources.
//! It maintains an internal count representing the number of available
//! "permits". Each permit grants a thread the right to access a shared
//! resource.
//!
//! A semaphore initialized with zero permits serves as an event signal: one
//! thread waits for the event with [`Semaphore::wait`], another one announces
//! it with [`Semaphore::signal`].
//!
//! ## `Semaphore` in this crate
//!
//! [`Semaphore`] is combined with a resource to protect. Threads acquire a
//! permit by calling [`Semaphore::wait`] (the classic P), and release it either
//! explicitly via [`Semaphore::signal`] (V) or implicitly using the
//! [`SemaphorePermits`] RAII guard.
//!
//! ```rust
//! let sema = Semaphore::new("pool", 3, state)?; // Up to 3 threads use the state
//!
//! // Acquire a permit (blocks if unavailable)
//! let permit = sema.wait();
//! permit.work(); // Call a method defined on the `state`.
//!
//! // The permit is released when `permit` goes out of scope.
//! ```
//!
//! The count and the waiter list live behind a spinlock. A waiter re-checks the
//! count every time it is woken, so a permit taken by a third thread in the
//! meantime only sends it back to sleep.

use alloc::collections::vec_deque::VecDeque;
use core::ops::Deref;
use kernel::{
    KernelError,
    interrupt::InterruptGuard,
    mm::alloc_name,
    sync::SpinLock,
    thread::{Current, ParkHandle},
};

struct SemaState {
    permits: usize,
    waiters: VecDeque<ParkHandle>,
}

/// Counting semaphore.
///
/// A semaphore maintains a set of permits and resource. Permits are used to
/// synchronize access to a shared resource. A semaphore differs from a lock in
/// that it can allow more than one concurrent caller to access the shared
/// resource at a time.
pub struct Semaphore<T = ()> {
    name: Box<str>,
    state: SpinLock<SemaState>,
    resource: T,
}

impl<T> Semaphore<T> {
    /// Creates a new semaphore initialized with a specified number of permits.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the semaphore.
    /// * `permits` - The initial number of available permits.
    /// * `resource` - A resource combined with this semaphore.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NoMemory`] if the semaphore cannot be allocated.
    pub fn new(name: &str, permits: usize, resource: T) -> Result<Self, KernelError> {
        Ok(Self {
            name: alloc_name(name)?,
            state: SpinLock::new(SemaState {
                permits,
                waiters: VecDeque::new(),
            }),
            resource,
        })
    }

    /// The name of this semaphore.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits until a permit becomes available and then acquires it.
    ///
    /// This method returns a [`SemaphorePermits`] RAII guard. When the guard is
    /// dropped, it will automatically release the acquired permit.
    ///
    /// # Panics
    ///
    /// Panics if the current thread is inside an atomic section.
    pub fn wait(&self) -> SemaphorePermits<'_, T> {
        assert!(
            !InterruptGuard::is_guarded(),
            "Semaphore `{}`: wait in an atomic section.",
            self.name
        );
        let mut state = self.state.lock();
        while state.permits == 0 {
            Current::park_with(move |handle| {
                state.waiters.push_back(handle);
                state.unlock();
            });
            state = self.state.lock();
        }
        state.permits -= 1;
        state.unlock();

        SemaphorePermits { sema: self }
    }

    /// Releases a permit back to the semaphore.
    ///
    /// This method increases the number of available permits by one, and if any
    /// threads are blocked in `wait()`, one will be woken up to acquire the
    /// newly released permit.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        let waiter = state.waiters.pop_front();
        state.unlock();

        if let Some(waiter) = waiter {
            waiter.unpark();
        }
    }

    /// Number of available permits.
    pub fn permits(&self) -> usize {
        let state = self.state.lock();
        let permits = state.permits;
        state.unlock();
        permits
    }

    /// Destroys the semaphore, returning the resource.
    ///
    /// # Panics
    ///
    /// Panics if a thread is waiting on it.
    pub fn destroy(self) -> T {
        let mut this = core::mem::ManuallyDrop::new(self);
        this.check_idle();
        unsafe {
            core::ptr::drop_in_place(&mut this.name);
            core::ptr::drop_in_place(&mut this.state);
            core::ptr::read(&this.resource)
        }
    }

    fn check_idle(&mut self) {
        let waiters = self.state.get_mut().waiters.len();
        assert!(
            waiters == 0,
            "Semaphore `{}`: destroyed with {} waiters.",
            self.name,
            waiters
        );
    }
}

impl<T> Drop for Semaphore<T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.check_idle();
        }
    }
}

/// An RAII implementation of a "scoped semaphore". When this structure
/// is dropped (falls out of scope), the semaphore will be signaled.
///
/// The data protected by the semaphore can be accessed through this guard via
/// its [`Deref`] implementations.
///
/// This structure is created by the [`wait`] method on [`Semaphore`].
///
/// [`wait`]: Semaphore::wait
pub struct SemaphorePermits<'a, T> {
    sema: &'a Semaphore<T>,
}

impl<T> SemaphorePermits<'_, T> {
    /// Keeps the permit: dropping the guard no longer signals the semaphore.
    pub fn forget(self) {
        core::mem::forget(self)
    }
}

impl<T> Deref for SemaphorePermits<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.sema.resource
    }
}

impl<T> Drop for SemaphorePermits<'_, T> {
    fn drop(&mut self) {
        self.sema.signal()
    }
}
