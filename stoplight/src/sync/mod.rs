//! # Blocking synchronization primitives.
//!
//! The [`SpinLock`] of the kernel provides mutual exclusion by spinning. It is
//! the right tool for the few instructions that inspect or update the state of
//! a primitive, and nothing longer. The primitives of this module put the
//! waiting thread to sleep instead:
//!
//! - [`Lock`]: only one thread at a time holds it. Waiters sleep.
//! - [`ConditionVariable`]: threads sleep until a condition over the data of a
//!   [`Lock`] becomes true.
//! - [`Semaphore`]: a count of permits; threads sleep while none is left.
//!
//! | Primitive             | Blocks Thread? | Fair? | Typical Use Case                                  |
//! |-----------------------|----------------|-------|---------------------------------------------------|
//! | [`SpinLock`]          | No (busy wait) | No    | The state of a primitive                          |
//! | [`Lock`]              | Yes            | No    | Exclusive access to shared data                   |
//! | [`ConditionVariable`] | Yes            | No    | Waiting for a condition to become true            |
//! | [`Semaphore`]         | Yes            | No    | Limiting access to a bounded resource, signaling  |
//!
//! Every primitive has a name and allocates it on creation; creation fails
//! with [`KernelError::NoMemory`] when the allocation does. Destroying a
//! primitive that is held or waited on is a fatal error.
//!
//! [`SpinLock`]: kernel::sync::SpinLock
//! [`KernelError::NoMemory`]: kernel::KernelError::NoMemory

pub mod condition_variable;
pub mod lock;
pub mod semaphore;

pub use condition_variable::*;
pub use lock::*;
pub use semaphore::*;
