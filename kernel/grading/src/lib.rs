extern crate grading_derive;

pub use grading_derive::*;

/// Wait until `cond` holds, yielding the cpu between polls.
///
/// Panics with `what` if `cond` does not hold within ten seconds.
#[macro_export]
macro_rules! wait_until {
    ($cond:expr_2021, $what:expr_2021) => {{
        let _deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while !$cond {
            assert!(
                std::time::Instant::now() < _deadline,
                "Timed out waiting for {}",
                $what
            );
            kernel::thread::Current::yield_now();
        }
    }};
}

/// Returns whether the thread `tid` is parked.
pub fn is_parked(tid: u64) -> bool {
    matches!(
        kernel::thread::get_state_by_tid(tid),
        Ok(kernel::thread::ThreadState::Parked)
    )
}
