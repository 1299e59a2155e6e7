use core::time::Duration;

/// Long enough for any correct test to finish on a loaded machine.
const TIMEOUT: Duration = Duration::from_secs(30);

pub mod lock {
    use alloc::{sync::Arc, vec::Vec};
    use grading::*;
    use kernel::{
        KernelError,
        sync::{SpinLock, WouldBlock, atomic::{AtomicBool, AtomicUsize}},
        thread::{ThreadBuilder, ThreadState},
    };
    use stoplight::sync::{ConditionVariable, Lock, Semaphore};

    pub fn smoke() {
        const LENGTH: usize = 64;
        let output = Arc::new(Lock::new("output", Vec::new()).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));

        let handles = (0..LENGTH)
            .map(|i| {
                let counter = counter.clone();
                let output = output.clone();
                ThreadBuilder::new("smoker").spawn(move || {
                    counter.fetch_add(1);
                    let mut d = output.acquire();
                    while counter.load() != LENGTH {
                        kernel::thread::Current::yield_now();
                    }
                    d.push(i);
                    d.release();
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            assert_eq!(handle.join_timeout(super::TIMEOUT).ok(), Some(0));
        }

        let mut output = output.acquire();
        output.sort();
        assert_eq!(&*output, &(0..LENGTH).collect::<Vec<_>>());
        output.release();
    }

    #[repeat(20)]
    pub fn smoke_many() {
        smoke()
    }

    pub fn parking() {
        let lock = Arc::new(Lock::new("parking", ()).unwrap());
        let guard = lock.acquire();
        let thread_spawned = Arc::new(AtomicBool::new(false));

        let be_parked = {
            let (thread_spawned, lock) = (thread_spawned.clone(), lock.clone());
            ThreadBuilder::new("blockee").spawn(move || {
                thread_spawned.store(true);
                let guard = lock.acquire();
                guard.release();
            })
        };

        wait_until!(thread_spawned.load(), "the blockee to start");
        wait_until!(lock.waiters() == 1, "the blockee to wait");

        assert_eq!(
            kernel::thread::get_state_by_tid(be_parked.tid),
            Ok(ThreadState::Parked),
            "Blocked thread by Lock should be in Parked state"
        );

        guard.release();
        assert_eq!(be_parked.join(), 0);
        assert_eq!(lock.waiters(), 0);
    }

    pub fn try_acquire() {
        let lock = Arc::new(Lock::new("try", 0usize).unwrap());
        let guard = lock.try_acquire().unwrap();

        let contender = {
            let lock = lock.clone();
            ThreadBuilder::new("contender").spawn(move || {
                assert!(matches!(lock.try_acquire(), Err(WouldBlock)));
            })
        };
        assert_eq!(contender.join(), 0);
        guard.release();

        let contender = {
            let lock = lock.clone();
            ThreadBuilder::new("contender").spawn(move || {
                let mut guard = lock.try_acquire().unwrap();
                *guard += 1;
                guard.release();
            })
        };
        assert_eq!(contender.join(), 0);
        assert_eq!(Arc::try_unwrap(lock).ok().unwrap().destroy(), 1);
    }

    pub fn held_by_caller() {
        let lock = Arc::new(Lock::new("held", ()).unwrap());
        assert!(!lock.held_by_caller());

        let guard = lock.acquire();
        assert!(lock.held_by_caller());

        let other = {
            let lock = lock.clone();
            ThreadBuilder::new("other").spawn(move || assert!(!lock.held_by_caller()))
        };
        assert_eq!(other.join(), 0);

        guard.release();
        assert!(!lock.held_by_caller());
    }

    pub fn wake_all_on_release() {
        const WAITERS: usize = 4;
        let lock = Arc::new(Lock::new("crowd", 0usize).unwrap());
        let guard = lock.acquire();

        let handles = (0..WAITERS)
            .map(|_| {
                let lock = lock.clone();
                ThreadBuilder::new("waiter").spawn(move || {
                    let mut guard = lock.acquire();
                    *guard += 1;
                    guard.release();
                })
            })
            .collect::<Vec<_>>();

        wait_until!(lock.waiters() == WAITERS, "every waiter to park");
        assert!(handles.iter().all(|h| is_parked(h.tid)));
        guard.release();

        for handle in handles {
            assert_eq!(handle.join_timeout(super::TIMEOUT).ok(), Some(0));
        }
        assert_eq!(Arc::try_unwrap(lock).ok().unwrap().destroy(), WAITERS);
    }

    #[assert_exit_code(-1)]
    pub fn acquire_twice() {
        let lock = Lock::new("twice", ()).unwrap();
        let _first = lock.acquire();
        let _second = lock.acquire();
    }

    #[assert_exit_code(-1)]
    pub fn destroy_held() {
        let lock = Lock::new("held", ()).unwrap();
        core::mem::forget(lock.acquire());
        lock.destroy();
    }

    #[assert_exit_code(-1)]
    pub fn guard_not_released() {
        let lock = Lock::new("leaky", ()).unwrap();
        let guard = lock.acquire();
        drop(guard);
    }

    pub fn acquire_in_atomic_section() {
        let lock = Arc::new(Lock::new("atomic", ()).unwrap());
        let guard = lock.acquire();

        let violator = {
            let lock = lock.clone();
            ThreadBuilder::new("violator").spawn(move || {
                let spinlock = SpinLock::new(());
                let _section = spinlock.lock();
                lock.acquire().release();
            })
        };
        assert_eq!(violator.join(), -1);
        // The violator never queued itself.
        assert_eq!(lock.waiters(), 0);
        guard.release();
    }

    #[inject_oom(0)]
    pub fn out_of_memory() {
        assert!(matches!(Lock::new("lock", ()), Err(KernelError::NoMemory)));
        assert!(matches!(
            ConditionVariable::new("cv"),
            Err(KernelError::NoMemory)
        ));
        assert!(matches!(
            Semaphore::new("sema", 1, ()),
            Err(KernelError::NoMemory)
        ));
    }
}

pub mod condition_variable {
    use alloc::{sync::Arc, vec::Vec};
    use grading::*;
    use kernel::{sync::atomic::AtomicUsize, thread::ThreadBuilder};
    use stoplight::sync::{ConditionVariable, Lock};

    const MAX: usize = 2;
    const THREADS: usize = 8;

    struct BufferInner {
        item: [usize; MAX],
        front: usize,
        tail: usize,
    }
    impl BufferInner {
        fn is_full(&self) -> bool {
            self.tail.overflowing_sub(self.front).0 % MAX == MAX - 1
        }
        fn is_empty(&self) -> bool {
            self.front == self.tail
        }
    }
    struct Buffer {
        inner: Lock<BufferInner>,
        full: ConditionVariable,
        empty: ConditionVariable,
    }

    impl Buffer {
        fn new() -> Self {
            Self {
                inner: Lock::new(
                    "buffer",
                    BufferInner {
                        item: [0; MAX],
                        front: 0,
                        tail: 0,
                    },
                )
                .unwrap(),
                full: ConditionVariable::new("full").unwrap(),
                empty: ConditionVariable::new("empty").unwrap(),
            }
        }

        fn put(&self, val: usize) {
            let mut guard = self.full.wait_while(&self.inner, |b| b.is_full());
            let tail = (guard.tail + 1) % MAX;
            guard.tail = tail;
            guard.item[tail] = val;
            self.empty.signal(&guard);
            guard.release();
        }

        fn put_many(&self, val: &[usize]) {
            let mut idx = 0;
            while idx < val.len() {
                let mut guard = self.full.wait_while(&self.inner, |b| b.is_full());
                while !guard.is_full() && idx < val.len() {
                    let tail = (guard.tail + 1) % MAX;
                    guard.tail = tail;
                    guard.item[tail] = val[idx];
                    idx += 1;
                }
                self.empty.broadcast(&guard);
                guard.release();
            }
        }

        fn get(&self) -> usize {
            let mut guard = self.empty.wait_while(&self.inner, |b| b.is_empty());
            let front = (guard.front + 1) % MAX;
            let item = guard.item[front];
            guard.front = front;
            self.full.signal(&guard);
            guard.release();
            item
        }
    }

    fn bounded_buffer(produce: impl FnOnce(&Buffer) + Send + 'static) {
        const ITEMS: usize = THREADS * 2 + 2;
        let (buffer, waiters, output) = (
            Arc::new(Buffer::new()),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(Lock::new("output", Vec::new()).unwrap()),
        );

        let consumers = [0; ITEMS].map(|_| {
            let (buffer, waiters, output) = (buffer.clone(), waiters.clone(), output.clone());
            ThreadBuilder::new("consumer").spawn(move || {
                waiters.fetch_add(1);
                let d = buffer.get();
                let mut guard = output.acquire();
                guard.push(d);
                guard.release();
            })
        });
        wait_until!(waiters.load() == ITEMS, "every consumer to start");

        let producer = {
            let buffer = buffer.clone();
            ThreadBuilder::new("producer").spawn(move || produce(&*buffer))
        };

        for consumer in consumers {
            assert_eq!(consumer.join_timeout(super::TIMEOUT).ok(), Some(0));
        }
        assert_eq!(producer.join(), 0);

        let mut output = output.acquire();
        output.sort();
        assert_eq!(&*output, &(0..ITEMS).collect::<Vec<_>>());
        output.release();
    }

    pub fn bounded_buffer_1() {
        bounded_buffer(|buffer| {
            for i in 0..THREADS * 2 + 2 {
                buffer.put(i);
            }
        })
    }

    pub fn bounded_buffer_2() {
        bounded_buffer(|buffer| {
            let items = (0..THREADS * 2 + 2).collect::<Vec<_>>();
            for chunk in items.chunks(THREADS / 2) {
                buffer.put_many(chunk);
            }
        })
    }

    pub fn wait_releases_lock() {
        let (lock, cv) = (
            Arc::new(Lock::new("bound", false).unwrap()),
            Arc::new(ConditionVariable::new("ready").unwrap()),
        );

        let waiter = {
            let (lock, cv) = (lock.clone(), cv.clone());
            ThreadBuilder::new("waiter").spawn(move || {
                let guard = cv.wait_while(&lock, |ready| !*ready);
                assert!(lock.held_by_caller());
                guard.release();
            })
        };

        wait_until!(cv.waiters() == 1, "the waiter to wait");
        // The waiter sleeps without the lock.
        let mut guard = lock.try_acquire().unwrap();
        *guard = true;
        assert!(cv.signal(&guard));
        guard.release();

        assert_eq!(waiter.join_timeout(super::TIMEOUT).ok(), Some(0));
    }

    pub fn signal_wakes_one() {
        const WAITERS: usize = 3;
        let (lock, cv, woken) = (
            Arc::new(Lock::new("bound", ()).unwrap()),
            Arc::new(ConditionVariable::new("one").unwrap()),
            Arc::new(AtomicUsize::new(0)),
        );

        let handles = (0..WAITERS)
            .map(|_| {
                let (lock, cv, woken) = (lock.clone(), cv.clone(), woken.clone());
                ThreadBuilder::new("waiter").spawn(move || {
                    let guard = cv.wait(lock.acquire());
                    woken.fetch_add(1);
                    guard.release();
                })
            })
            .collect::<Vec<_>>();
        wait_until!(cv.waiters() == WAITERS, "every waiter to wait");

        let guard = lock.acquire();
        assert!(cv.signal(&guard));
        assert_eq!(cv.waiters(), WAITERS - 1);
        guard.release();
        wait_until!(woken.load() == 1, "the signaled waiter to run");
        assert_eq!(cv.waiters(), WAITERS - 1);

        let guard = lock.acquire();
        assert_eq!(cv.broadcast(&guard), WAITERS - 1);
        guard.release();
        for handle in handles {
            assert_eq!(handle.join_timeout(super::TIMEOUT).ok(), Some(0));
        }
        assert_eq!(woken.load(), WAITERS);
    }

    pub fn broadcast_wakes_all() {
        const WAITERS: usize = 5;
        let (lock, cv) = (
            Arc::new(Lock::new("bound", false).unwrap()),
            Arc::new(ConditionVariable::new("all").unwrap()),
        );

        let handles = (0..WAITERS)
            .map(|_| {
                let (lock, cv) = (lock.clone(), cv.clone());
                ThreadBuilder::new("waiter").spawn(move || {
                    cv.wait_while(&lock, |go| !*go).release();
                })
            })
            .collect::<Vec<_>>();
        wait_until!(cv.waiters() == WAITERS, "every waiter to wait");

        let mut guard = lock.acquire();
        *guard = true;
        assert_eq!(cv.broadcast(&guard), WAITERS);
        guard.release();

        for handle in handles {
            assert_eq!(handle.join_timeout(super::TIMEOUT).ok(), Some(0));
        }
        assert_eq!(cv.waiters(), 0);
    }

    pub fn signal_without_waiters() {
        let (lock, cv) = (
            Arc::new(Lock::new("bound", ()).unwrap()),
            Arc::new(ConditionVariable::new("empty").unwrap()),
        );

        let guard = lock.acquire();
        assert!(!cv.signal(&guard));
        assert_eq!(cv.broadcast(&guard), 0);
        guard.release();

        // Signals are not buffered: a later waiter still sleeps.
        let waiter = {
            let (lock, cv) = (lock.clone(), cv.clone());
            ThreadBuilder::new("late").spawn(move || cv.wait(lock.acquire()).release())
        };
        wait_until!(cv.waiters() == 1, "the late waiter to wait");
        wait_until!(is_parked(waiter.tid), "the late waiter to park");

        let guard = lock.acquire();
        assert!(cv.signal(&guard));
        guard.release();
        assert_eq!(waiter.join_timeout(super::TIMEOUT).ok(), Some(0));
    }

    pub fn wait_in_atomic_section() {
        let (lock, cv) = (
            Arc::new(Lock::new("bound", ()).unwrap()),
            Arc::new(ConditionVariable::new("atomic").unwrap()),
        );

        let violator = {
            let (lock, cv) = (lock.clone(), cv.clone());
            ThreadBuilder::new("violator").spawn(move || {
                let guard = lock.acquire();
                let spinlock = kernel::sync::SpinLock::new(());
                let _section = spinlock.lock();
                cv.wait(guard).release();
            })
        };
        assert_eq!(violator.join(), -1);
        assert_eq!(cv.waiters(), 0);
        // The lock was handed back while the violator unwound.
        lock.try_acquire().unwrap().release();
    }

    pub fn bound_to_one_lock() {
        let (first, second, cv) = (
            Arc::new(Lock::new("first", ()).unwrap()),
            Arc::new(Lock::new("second", ()).unwrap()),
            Arc::new(ConditionVariable::new("bound").unwrap()),
        );

        let waiter = {
            let (first, cv) = (first.clone(), cv.clone());
            ThreadBuilder::new("waiter").spawn(move || cv.wait(first.acquire()).release())
        };
        wait_until!(cv.waiters() == 1, "the waiter to wait");

        let intruder = {
            let (second, cv) = (second.clone(), cv.clone());
            ThreadBuilder::new("intruder").spawn(move || {
                let guard = second.acquire();
                cv.signal(&guard);
                guard.release();
            })
        };
        assert_eq!(intruder.join(), -1);
        second.try_acquire().unwrap().release();
        assert_eq!(cv.waiters(), 1);

        let guard = first.acquire();
        assert!(cv.signal(&guard));
        guard.release();
        assert_eq!(waiter.join_timeout(super::TIMEOUT).ok(), Some(0));
    }
}

pub mod semaphore {
    use alloc::{sync::Arc, vec, vec::Vec};
    use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use grading::*;
    use kernel::{sync::SpinLock, thread::ThreadBuilder};
    use stoplight::sync::{Lock, Semaphore};

    pub fn sema_0() {
        let sema = Arc::new(Semaphore::new("sema_0", 0, ()).unwrap());
        let is_thread_active = Arc::new(AtomicBool::new(false));
        let is_woken_up = Arc::new(AtomicBool::new(false));

        let thread = {
            let (sema, is_thread_active, is_woken_up) =
                (sema.clone(), is_thread_active.clone(), is_woken_up.clone());

            ThreadBuilder::new("worker").spawn(move || {
                is_thread_active.store(true, Ordering::SeqCst);
                sema.wait().forget();
                is_woken_up.store(true, Ordering::SeqCst);
            })
        };

        wait_until!(
            is_thread_active.load(Ordering::SeqCst) && is_parked(thread.tid),
            "the worker to wait"
        );
        assert!(!is_woken_up.load(Ordering::SeqCst));

        sema.signal();
        assert_eq!(thread.join(), 0);

        assert!(is_woken_up.load(Ordering::SeqCst));
        assert_eq!(sema.permits(), 0);
    }

    fn sema_n(permits: u32) {
        const COUNT: u32 = 16;
        let sema = Arc::new(Semaphore::new("sema_n", permits as usize, ()).unwrap());
        let ready_counter = Arc::new(AtomicU32::new(0));
        let counter = Arc::new(AtomicU32::new(0));

        let handles = (0..COUNT)
            .map(|i| {
                let (sema, ready_counter, counter) =
                    (sema.clone(), ready_counter.clone(), counter.clone());

                ThreadBuilder::new(alloc::format!("t{i}")).spawn(move || {
                    ready_counter.fetch_add(1, Ordering::SeqCst);

                    let sema_permit = sema.wait();
                    counter.fetch_add(1, Ordering::SeqCst);
                    sema_permit.forget();
                })
            })
            .collect::<Vec<_>>();

        wait_until!(
            ready_counter.load(Ordering::SeqCst) == COUNT,
            "every thread to start"
        );

        let mut expected_cnt = permits;
        while expected_cnt < COUNT {
            wait_until!(
                counter.load(Ordering::SeqCst) == expected_cnt,
                "the permits to be taken"
            );
            assert_eq!(sema.permits(), 0);

            expected_cnt += permits;
            for _ in 0..permits {
                sema.signal();
            }
        }

        for handle in handles {
            assert_eq!(handle.join_timeout(super::TIMEOUT).ok(), Some(0));
        }
        assert_eq!(counter.load(Ordering::SeqCst), COUNT);
    }

    pub fn sema_1() {
        sema_n(1)
    }

    pub fn sema_2() {
        sema_n(2)
    }

    pub fn exec_order() {
        const COUNT: usize = 3;

        let counter = Arc::new(AtomicUsize::new(0));
        let sema = Arc::new(Semaphore::new("exec_order", 0, 0).unwrap());

        let handles = (0..COUNT)
            .map(|i| {
                let counter = counter.clone();
                let sema = sema.clone();
                ThreadBuilder::new(alloc::format!("support_{}", i)).spawn(move || {
                    let _guard = sema.wait();
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect::<Vec<_>>();

        wait_until!(
            handles.iter().all(|h| is_parked(h.tid)),
            "every thread to wait"
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // Each permit is handed on when its holder finishes.
        sema.signal();
        for handle in handles {
            assert_eq!(handle.join_timeout(super::TIMEOUT).ok(), Some(0));
        }
        assert_eq!(counter.load(Ordering::SeqCst), COUNT);
        assert_eq!(sema.permits(), 1);
    }

    pub fn n_permits() {
        const COUNT: usize = 5;
        const PERMITS: usize = 3;

        let counter = Arc::new(AtomicUsize::new(0));
        let sema = Arc::new(Semaphore::new("n_permits", PERMITS, 0).unwrap());
        let lock = Arc::new(Lock::new("n_permits", ()).unwrap());

        let guard = lock.acquire();

        let handles = (0..COUNT)
            .map(|i| {
                let counter = counter.clone();
                let sema = sema.clone();
                let lock = lock.clone();
                ThreadBuilder::new(alloc::format!("support_{}", i)).spawn(move || {
                    let _guard = sema.wait();
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _lock = lock.acquire();
                    _lock.release();
                })
            })
            .collect::<Vec<_>>();

        wait_until!(
            handles.iter().all(|h| is_parked(h.tid)),
            "every thread to park"
        );
        assert_eq!(counter.load(Ordering::SeqCst), PERMITS);
        assert_eq!(lock.waiters(), PERMITS);
        guard.release();

        for handle in handles {
            assert_eq!(handle.join_timeout(super::TIMEOUT).ok(), Some(0));
        }
        assert_eq!(counter.load(Ordering::SeqCst), COUNT);
        assert_eq!(sema.permits(), PERMITS);
    }

    pub fn no_lost_wakeup() {
        const PAIRS: usize = 4;
        const ROUNDS: usize = 2000;
        let sema = Arc::new(Semaphore::new("stress", 0, ()).unwrap());

        let handles = (0..PAIRS)
            .flat_map(|i| {
                let (p, v) = (sema.clone(), sema.clone());
                [
                    ThreadBuilder::new(alloc::format!("P{i}")).spawn(move || {
                        for _ in 0..ROUNDS {
                            p.wait().forget();
                        }
                    }),
                    ThreadBuilder::new(alloc::format!("V{i}")).spawn(move || {
                        for _ in 0..ROUNDS {
                            v.signal();
                        }
                    }),
                ]
            })
            .collect::<Vec<_>>();

        for handle in handles {
            assert_eq!(
                handle.join_timeout(super::TIMEOUT).ok(),
                Some(0),
                "A wakeup was lost."
            );
        }
        assert_eq!(sema.permits(), 0);
    }

    #[assert_exit_code(-1)]
    pub fn wait_in_atomic_section() {
        let sema = Semaphore::new("atomic", 1, ()).unwrap();
        let spinlock = SpinLock::new(());
        let _guard = spinlock.lock();
        sema.wait().forget();
    }

    pub fn destroy_returns_resource() {
        let sema = Semaphore::new("pool", 2, vec![1, 2, 3]).unwrap();
        {
            let first = sema.wait();
            let second = sema.wait();
            assert_eq!(first.len() + second.len(), 6);
            assert_eq!(sema.permits(), 0);
        }
        assert_eq!(sema.permits(), 2);
        assert_eq!(sema.destroy(), vec![1, 2, 3]);
    }
}
