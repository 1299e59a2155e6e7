//! # Condition Variable.
//!
//! A **Condition Variable** allows a thread to efficiently block until a
//! certain condition is met, without consuming CPU cycles. It is always used
//! in conjunction with a [`Lock`] that guards access to shared data.
//!
//! ## `ConditionVariable` in this crate
//! Every operation takes the [`LockGuard`] of the caller, so a thread can only
//! wait on or signal a condition variable while it holds a lock. The lock is
//! bound on each call: all threads waiting at the same time must use the same
//! lock, which is checked at runtime.
//!
//! [`ConditionVariable::wait`] puts the caller on the waiter list and releases
//! the lock inside one atomic section, then parks. A thread that acquires the
//! lock after that point and signals the condition variable always finds the
//! waiter on the list. The waiter reacquires the lock before `wait` returns.
//!
//! The [`ConditionVariable::wait_while`] method checks the predicate, blocks
//! the current thread if the condition is true, and re-checks it upon wakeup:
//!
//! ```rust
//! let guard = condvar.wait_while(&lock, |pending| *pending > 0);
//! ```
//!
//! There are two signaling methods that take the [`LockGuard`]:
//! - [`ConditionVariable::signal`] wakes **one** waiting thread and
//! - [`ConditionVariable::broadcast`] wakes **all** waiting threads.

use super::lock::{Lock, LockGuard};
use alloc::collections::vec_deque::VecDeque;
use kernel::{
    KernelError,
    interrupt::InterruptGuard,
    mm::alloc_name,
    sync::{SpinLock, SpinLockGuard},
    thread::{Current, ParkHandle},
};

#[derive(Default)]
struct CvState {
    waiters: VecDeque<ParkHandle>,
    // Address of the lock the current waiters released.
    bound: Option<usize>,
}

/// A Condition Variable
///
/// Condition variables represent the ability to block a thread such that it
/// consumes no CPU time while waiting for an event to occur. Condition
/// variables are typically associated with a boolean predicate (a condition)
/// and a lock. The predicate is always verified inside of the lock before
/// determining that a thread must block.
pub struct ConditionVariable {
    name: Box<str>,
    state: SpinLock<CvState>,
}

impl ConditionVariable {
    /// Creates a new condition variable which is ready to be waited on and
    /// signaled.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NoMemory`] if the condition variable cannot be
    /// allocated.
    pub fn new(name: &str) -> Result<Self, KernelError> {
        Ok(Self {
            name: alloc_name(name)?,
            state: SpinLock::new(CvState::default()),
        })
    }

    /// The name of this condition variable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Releases the lock of `guard`, parks until signaled, and reacquires the
    /// lock.
    ///
    /// Releasing the lock and joining the waiter list is a single atomic step.
    /// Wakeups carry no guarantee about the condition; callers re-check it.
    ///
    /// # Panics
    ///
    /// Panics if other threads are waiting with a different lock, or if the
    /// current thread is inside an atomic section.
    pub fn wait<'a, T>(&self, guard: LockGuard<'a, T>) -> LockGuard<'a, T> {
        assert!(
            !InterruptGuard::is_guarded(),
            "ConditionVariable `{}`: wait in an atomic section.",
            self.name
        );
        let lock = guard.lock();
        let mut state = self.state.lock();
        let addr = lock as *const Lock<T> as usize;
        match state.bound {
            Some(bound) if bound != addr => {
                state.unlock();
                panic!(
                    "ConditionVariable `{}`: waited with lock `{}` while bound to another lock.",
                    self.name,
                    lock.name()
                );
            }
            _ => state.bound = Some(addr),
        }

        Current::park_with(move |handle| {
            state.waiters.push_back(handle);
            guard.release();
            state.unlock();
        });
        lock.acquire()
    }

    /// Blocks the current thread while `predicate` returns `true`.
    ///
    /// This function acquires `lock` and checks the predicate. If it returns
    /// `true`, the thread waits on this condition variable. When the thread
    /// wakes up, it reacquires the lock and re-evaluates the predicate. The
    /// guard is returned once the predicate returns `false`.
    pub fn wait_while<'a, T>(
        &self,
        lock: &'a Lock<T>,
        mut predicate: impl FnMut(&mut T) -> bool,
    ) -> LockGuard<'a, T> {
        let mut guard = lock.acquire();
        while predicate(&mut *guard) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Wakes up one blocked thread on this condvar.
    ///
    /// Returns whether a thread was woken. Calls to `signal` are not buffered
    /// in any way.
    pub fn signal<T>(&self, guard: &LockGuard<'_, T>) -> bool {
        let mut state = self.locked_for(guard.lock());
        let waiter = state.waiters.pop_front();
        if state.waiters.is_empty() {
            state.bound = None;
        }
        state.unlock();

        waiter.map(ParkHandle::unpark).is_some()
    }

    /// Wakes up all blocked threads on this condvar.
    ///
    /// Returns the number of threads woken.
    pub fn broadcast<T>(&self, guard: &LockGuard<'_, T>) -> usize {
        let mut state = self.locked_for(guard.lock());
        let waiters = core::mem::take(&mut state.waiters);
        state.bound = None;
        state.unlock();

        let n = waiters.len();
        waiters.into_iter().for_each(ParkHandle::unpark);
        n
    }

    /// Number of threads waiting on this condition variable.
    pub fn waiters(&self) -> usize {
        let state = self.state.lock();
        let n = state.waiters.len();
        state.unlock();
        n
    }

    /// Destroys the condition variable.
    ///
    /// # Panics
    ///
    /// Panics if a thread is waiting on it.
    pub fn destroy(self) {
        drop(self)
    }

    /// Enters the atomic section of this condition variable on behalf of a
    /// thread holding `lock`.
    fn locked_for<T>(&self, lock: &Lock<T>) -> SpinLockGuard<'_, CvState> {
        let addr = lock as *const Lock<T> as usize;
        let state = self.state.lock();
        if state.bound.is_some_and(|bound| bound != addr) {
            state.unlock();
            panic!(
                "ConditionVariable `{}`: signaled with lock `{}`, but waiters use another lock.",
                self.name,
                lock.name()
            );
        }
        state
    }
}

impl Drop for ConditionVariable {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let waiters = self.state.get_mut().waiters.len();
        assert!(
            waiters == 0,
            "ConditionVariable `{}`: destroyed with {} waiters.",
            self.name,
            waiters
        );
    }
}
