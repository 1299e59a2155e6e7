//! Thread abstraction, an abstraction of a cpu core.
//!
//! ## The threading model
//!
//! An executing kernel consists of a collection of threads, each with their
//! own stack and local state. Threads are created with [`ThreadBuilder`] and
//! scheduled preemptively by the host.
//!
//! ## Parking
//!
//! A blocking primitive suspends the running thread with
//! [`Current::park_with`]. The closure given to `park_with` receives the
//! [`ParkHandle`] of the current thread and runs *before* the thread falls
//! asleep. This is where a primitive puts the handle into its waiter queue and
//! leaves its atomic section:
//!
//! ```
//! let mut state = self.state.lock();
//! while state.is_busy() {
//!     Current::park_with(move |handle| {
//!         state.waiters.push_back(handle);
//!         state.unlock();
//!     });
//!     state = self.state.lock();
//! }
//! ```
//!
//! Another thread wakes the parked thread by consuming its handle with
//! [`ParkHandle::unpark`]. An unpark that happens before the parked thread
//! actually sleeps is not lost, so registering the handle and releasing the
//! spinlock inside the closure is enough to rule out lost wakeups.
use crate::{KernelError, interrupt::InterruptGuard, sync::SpinLock};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

/// A possible state of the thread.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ThreadState {
    /// Thread is runnable.
    Runnable,
    /// Thread is running.
    Running,
    /// Thread is exited with exitcode.
    Exited(i32),
    /// Thread is parked.
    Parked,
}

const EXITED: u64 = 0x8000_0000_0000_0000;

static THREAD_STATE_TABLE: SpinLock<BTreeMap<u64, Arc<SpinLock<ThreadState>>>> =
    SpinLock::new(BTreeMap::new());

thread_local! {
    static CURRENT: RefCell<Option<Arc<Thread>>> = const { RefCell::new(None) };
}

fn next_tid() -> u64 {
    static TID: AtomicU64 = AtomicU64::new(0);
    TID.fetch_add(1, Ordering::SeqCst)
}

/// Get specified thread's [`ThreadState`] by TID (Thread ID).
pub fn get_state_by_tid(tid: u64) -> Result<ThreadState, KernelError> {
    let tst = THREAD_STATE_TABLE.lock();

    let Some(state) = tst.get(&tid) else {
        tst.unlock();
        return Err(KernelError::InvalidArgument);
    };

    let ts_lock = state.lock();
    let result = *ts_lock;

    ts_lock.unlock();
    tst.unlock();

    Ok(result)
}

/// An thread abstraction.
pub struct Thread {
    /// Thread id
    pub tid: u64,
    /// Thread name
    pub name: String,
    /// State of the thread.
    pub state: Arc<SpinLock<ThreadState>>,
    unparked: AtomicBool,
    host: std::thread::Thread,
}

impl Thread {
    /// Wraps a host thread that was not created by [`ThreadBuilder`], such
    /// as the main thread.
    fn adopt() -> Self {
        let host = std::thread::current();
        Self {
            tid: next_tid(),
            name: host.name().unwrap_or("main").to_string(),
            state: Arc::new(SpinLock::new(ThreadState::Running)),
            unparked: AtomicBool::new(false),
            host,
        }
    }

    fn set_state(&self, state: ThreadState) {
        let mut guard = self.state.lock();
        *guard = state;
        guard.unlock();
    }
}

fn current() -> Arc<Thread> {
    CURRENT.with(|current| {
        current
            .borrow_mut()
            .get_or_insert_with(|| Arc::new(Thread::adopt()))
            .clone()
    })
}

/// Run a function `f` with current thread as an argument.
#[inline]
pub fn with_current<R>(f: impl FnOnce(&Thread) -> R) -> R {
    f(&current())
}

/// A handle to join thread.
pub struct JoinHandle {
    /// Thread id of this handle.
    pub tid: u64,
    exit_status: Arc<AtomicU64>,
    host: std::thread::JoinHandle<()>,
}

impl JoinHandle {
    /// Join this handle and returns exit code.
    ///
    /// A thread that panicked exits with `-1`.
    pub fn join(self) -> i32 {
        // The body runs under `catch_unwind`; the host join cannot fail.
        let _ = self.host.join();
        self.exit_status.load(Ordering::SeqCst) as u32 as i32
    }

    /// Whether the underlying thread has exited.
    pub fn is_finished(&self) -> bool {
        self.exit_status.load(Ordering::SeqCst) & EXITED != 0
    }

    /// Join this handle if the thread exits within `timeout`.
    ///
    /// On timeout, the handle is handed back to the caller.
    pub fn join_timeout(self, timeout: Duration) -> Result<i32, JoinHandle> {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return Err(self);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(self.join())
    }
}

/// A handle that represent the parked thread.
pub struct ParkHandle {
    th: Arc<Thread>,
}

impl ParkHandle {
    /// Thread id of the parked thread.
    pub fn tid(&self) -> u64 {
        self.th.tid
    }

    /// Consume the handle and unpark the underlying thread.
    pub fn unpark(self) {
        self.th.set_state(ThreadState::Runnable);
        self.th.unparked.store(true, Ordering::SeqCst);
        self.th.host.unpark();
    }
}

/// The opaque structure indicating the running thread on the current cpu.
pub struct Current {
    _p: (),
}

impl Current {
    /// Run a function `f` with [`ParkHandle`] for current thread, and then park
    /// the current thread.
    ///
    /// The thread stays parked until the handle is unparked. Wakeups that the
    /// host delivers for any other reason are absorbed.
    pub fn park_with(f: impl FnOnce(ParkHandle)) {
        let th = current();
        th.set_state(ThreadState::Parked);
        f(ParkHandle { th: th.clone() });
        assert!(
            !InterruptGuard::is_guarded(),
            "Try to park a thread while holding a lock."
        );
        while !th.unparked.swap(false, Ordering::SeqCst) {
            std::thread::park();
        }
        th.set_state(ThreadState::Running);
    }

    /// Get the current thread's id.
    pub fn get_tid() -> u64 {
        with_current(|th| th.tid)
    }

    /// Give up the cpu to another runnable thread.
    pub fn yield_now() {
        std::thread::yield_now()
    }
}

/// A struct to build a new thread.
pub struct ThreadBuilder {
    name: String,
}

impl ThreadBuilder {
    /// Create a new thread builder for thread `name`.
    pub fn new<I>(name: I) -> Self
    where
        String: From<I>,
    {
        Self {
            name: String::from(name),
        }
    }

    /// Spawn the thread.
    ///
    /// # Panics
    ///
    /// Panics if the host refuses to create another thread.
    pub fn spawn<F: FnOnce() + Send + 'static>(self, thread_fn: F) -> JoinHandle {
        let Self { name } = self;
        let tid = next_tid();
        let state = Arc::new(SpinLock::new(ThreadState::Runnable));
        let exit_status = Arc::new(AtomicU64::new(0));

        let mut tst = THREAD_STATE_TABLE.lock();
        tst.insert(tid, state.clone());
        tst.unlock();

        let host = {
            let (thread_name, exit_status) = (name.clone(), exit_status.clone());
            std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    let th = Arc::new(Thread {
                        tid,
                        name: thread_name,
                        state,
                        unparked: AtomicBool::new(false),
                        host: std::thread::current(),
                    });
                    CURRENT.with(|current| *current.borrow_mut() = Some(th.clone()));
                    th.set_state(ThreadState::Running);

                    let exit_code = match panic::catch_unwind(AssertUnwindSafe(thread_fn)) {
                        Ok(()) => 0,
                        Err(_) => -1,
                    };

                    th.set_state(ThreadState::Exited(exit_code));
                    let mut tst = THREAD_STATE_TABLE.lock();
                    tst.remove(&tid);
                    tst.unlock();
                    exit_status.store(EXITED | exit_code as u32 as u64, Ordering::SeqCst);
                })
                .unwrap_or_else(|e| panic!("ThreadBuilder: failed to spawn `{name}`: {e}"))
        };

        JoinHandle {
            tid,
            exit_status,
            host,
        }
    }
}
