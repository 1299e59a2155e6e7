//! # Stoplight
//!
//! Vehicles cross a three-way intersection that has no traffic signal. Every
//! vehicle is a kernel thread; the only means of coordination are the blocking
//! primitives of [`sync`], built on the parking facility of the kernel.
//!
//! - [`sync`]: [`Lock`], [`ConditionVariable`] and [`Semaphore`].
//! - [`intersection`]: the quadrants, the admission rules for left turns and
//!   trucks, and the progress events of the vehicles.
//! - [`coordinator`]: sets a run up, spawns the vehicles, waits for the last
//!   one and tears the run down.
//!
//! [`Lock`]: sync::Lock
//! [`ConditionVariable`]: sync::ConditionVariable
//! [`Semaphore`]: sync::Semaphore

extern crate alloc;

pub mod coordinator;
pub mod intersection;
pub mod sync;

pub use coordinator::{RunConfiguration, RunConfigurationBuilder, RunReport, run};
