//! Source of randomness.
//!
//! Kernel code draws random numbers from an [`Rng`]. A generator is either
//! [`seeded`] so that a run can be replayed, or seeded [`from_entropy`].

use rand::SeedableRng;

pub use rand::Rng;

/// The generator used by the kernel.
pub type KernelRng = rand::rngs::StdRng;

/// Creates a generator whose sequence is fully determined by `seed`.
pub fn seeded(seed: u64) -> KernelRng {
    KernelRng::seed_from_u64(seed)
}

/// Creates a generator seeded by the operating system.
pub fn from_entropy() -> KernelRng {
    KernelRng::from_entropy()
}
