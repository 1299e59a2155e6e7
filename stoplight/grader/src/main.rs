// This is test & bootstrap implementation.

extern crate alloc;
extern crate kernel;
extern crate stoplight;
#[macro_use]
extern crate grading;

mod intersection;
mod sync;

fn main() {
    kernel::info!("Stoplight grader: kernel threads are host threads.");
    kernel::TestDriver::start([
        // Lock.
        &sync::lock::smoke,
        &sync::lock::parking,
        &sync::lock::smoke_many,
        &sync::lock::try_acquire,
        &sync::lock::held_by_caller,
        &sync::lock::wake_all_on_release,
        &sync::lock::acquire_twice,
        &sync::lock::destroy_held,
        &sync::lock::guard_not_released,
        &sync::lock::acquire_in_atomic_section,
        &sync::lock::out_of_memory,
        // Condition variable.
        &sync::condition_variable::bounded_buffer_1,
        &sync::condition_variable::bounded_buffer_2,
        &sync::condition_variable::wait_releases_lock,
        &sync::condition_variable::signal_wakes_one,
        &sync::condition_variable::broadcast_wakes_all,
        &sync::condition_variable::signal_without_waiters,
        &sync::condition_variable::wait_in_atomic_section,
        &sync::condition_variable::bound_to_one_lock,
        // Semaphore.
        &sync::semaphore::sema_0,
        &sync::semaphore::sema_1,
        &sync::semaphore::sema_2,
        &sync::semaphore::exec_order,
        &sync::semaphore::n_permits,
        &sync::semaphore::no_lost_wakeup,
        &sync::semaphore::wait_in_atomic_section,
        &sync::semaphore::destroy_returns_resource,
        // Intersection.
        &intersection::routes,
        &intersection::routes_replay,
        &intersection::event_format,
        &intersection::setup_no_vehicle,
        &intersection::exit_codes,
        &intersection::run_out_of_memory,
        &intersection::setup_out_of_memory,
        &intersection::setup_out_of_memory_late,
        &intersection::teardown_held_quadrant,
        &intersection::single_vehicle,
        &intersection::scenario_4,
        &intersection::truck_yields_to_cars,
        &intersection::truck_order,
        &intersection::mutual_exclusion,
        &intersection::left_turn_window,
        &intersection::all_left_cycle,
        &intersection::completion_once,
        &intersection::random_runs,
    ]);
}
