//! # The kernel substrate
//!
//! This crate is the small kernel that the synchronization primitives and the
//! intersection run on. It provides exactly what a blocking primitive needs
//! from a kernel, and nothing more:
//!
//! - [`thread`]: kernel threads, their states and the parking facility
//!   ([`Current::park_with`] and [`ParkHandle`]).
//! - [`sync`]: the [`SpinLock`] that forms the atomic section of every
//!   blocking primitive, and sequentially consistent atomics.
//! - [`interrupt`]: the marker of an atomic section. A thread inside one must
//!   never be parked.
//! - [`mm`]: the fallible allocation every kernel object performs when it is
//!   created.
//! - [`random`]: the randomness source.
//! - [`print!`], [`println!`], [`info!`], [`warning!`], [`debug!`]: kernel
//!   printing.
//!
//! Kernel threads are backed by host threads, so the scheduler is the host
//! scheduler: threads are preempted at any point, and several of them run at
//! the same time.
//!
//! ## Selectively run tests
//!
//! Graders are built on [`TestDriver`]. You can run one or more specific test
//! cases by passing their names as arguments to the grader. For example:
//!
//! ```bash
//! $ cargo run -- sync::lock::smoke sync::semaphore::sema_0
//! ```
//!
//! This command runs exactly the listed test cases.
//!
//! [`Current::park_with`]: thread::Current::park_with
//! [`ParkHandle`]: thread::ParkHandle
//! [`SpinLock`]: sync::SpinLock

#[macro_use]
pub mod kprint;

pub mod interrupt;
pub mod mm;
pub mod panicking;
pub mod random;
pub mod sync;
pub mod thread;

use std::sync::atomic::AtomicBool;

/// Mutes [`info!`], [`warning!`] and [`debug!`] when set.
pub static QUITE: AtomicBool = AtomicBool::new(false);

/// Enum representing errors that can occur during a kernel operation.
///
/// Each variant corresponds to a specific type of error that might occur while
/// creating or operating a kernel object.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum KernelError {
    /// Out of memory. (ENOMEM)
    NoMemory,
    /// Invalid arguement. (EINVAL)
    InvalidArgument,
}

impl KernelError {
    /// Converts the [`KernelError`] enum into a corresponding `usize` error
    /// code.
    pub fn into_usize(self) -> usize {
        (match self {
            KernelError::NoMemory => -12isize,
            KernelError::InvalidArgument => -22,
        }) as usize
    }

    /// The process exit status that reports this error.
    pub fn exit_code(self) -> i32 {
        -(self.into_usize() as isize) as i32
    }
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::NoMemory => write!(f, "Out of memory"),
            KernelError::InvalidArgument => write!(f, "Invalid argument"),
        }
    }
}

impl std::error::Error for KernelError {}

// Test utilities
#[doc(hidden)]
pub trait TestCase
where
    Self: Sync + Send,
{
    fn name(&'static self) -> &'static str;
    fn run(&'static self) -> bool;
}

impl<T> TestCase for T
where
    T: Fn() + Send + Sync + 'static,
{
    fn name(&'static self) -> &'static str {
        core::any::type_name::<T>()
    }
    fn run(&'static self) -> bool {
        print!("test {} ... ", core::any::type_name::<T>());
        if crate::thread::ThreadBuilder::new(core::any::type_name::<T>())
            .spawn(self)
            .join()
            == 0
        {
            println!("ok");
            true
        } else {
            println!("FAILED");
            false
        }
    }
}

/// A driver for running tests.
pub struct TestDriver {
    _p: (),
}

impl TestDriver {
    /// Run the given tests, then exit the process.
    ///
    /// Command line arguments that do not start with `-` select the tests to
    /// run by name. The process exits with 0 only if every selected test
    /// passed.
    pub fn start<const TC: usize>(tests: [&'static dyn TestCase; TC]) -> ! {
        let filter = std::env::args()
            .skip(1)
            .filter(|arg| !arg.starts_with('-'))
            .collect::<std::collections::BTreeSet<_>>();

        let all_passed = crate::thread::ThreadBuilder::new("test_main")
            .spawn(move || {
                let tests = tests
                    .iter()
                    .filter(|test| {
                        if filter.is_empty() {
                            return true;
                        }
                        let name = test.name();
                        let r = name.split("::").next().map(|n| n.len() + 2).unwrap_or(0);
                        filter.contains(&name[r.min(name.len())..])
                    })
                    .collect::<Vec<_>>();
                let (total, mut succ) = (tests.len(), 0);
                println!(
                    "Running {} test{}",
                    total,
                    if total == 1 { "" } else { "s" }
                );

                for test in tests {
                    if test.run() {
                        succ += 1;
                    }
                }
                println!(
                    "test result: {}. {} passed; {} failed",
                    if total == succ { "ok" } else { "FAILED" },
                    succ,
                    total - succ
                );
                assert_eq!(total, succ);
            })
            .join()
            == 0;

        std::process::exit(if all_passed { 0 } else { 1 })
    }
}
