//! Runs of the intersection.
//!
//! A run allocates an [`Intersection`], spawns one thread per vehicle, sleeps
//! until the last vehicle departed, then joins every vehicle thread and tears
//! the intersection down. The last vehicle still releases its quadrant after
//! waking the coordinator, so teardown waits for the joins.

use crate::intersection::{Console, EventSink, Intersection, RandomRoutes, RouteSource};
use alloc::sync::Arc;
use kernel::{KernelError, info, thread::ThreadBuilder};

/// Number of vehicles of a run unless configured otherwise.
pub const DEFAULT_VEHICLES: usize = 20;

/// The settings of a run.
pub struct RunConfiguration {
    vehicles: usize,
    sink: Arc<dyn EventSink>,
    routes: Arc<dyn RouteSource>,
}

/// A builder for [`RunConfiguration`].
///
/// Unless configured otherwise, a run has [`DEFAULT_VEHICLES`] vehicles with
/// routes drawn from an entropy-seeded generator, and prints every event on
/// the console.
pub struct RunConfigurationBuilder {
    vehicles: usize,
    sink: Option<Arc<dyn EventSink>>,
    routes: Option<Arc<dyn RouteSource>>,
}

impl Default for RunConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunConfigurationBuilder {
    /// Creates a builder with the default settings.
    pub fn new() -> Self {
        Self {
            vehicles: DEFAULT_VEHICLES,
            sink: None,
            routes: None,
        }
    }

    /// Sets the number of vehicles.
    pub fn set_vehicles(mut self, vehicles: usize) -> Self {
        self.vehicles = vehicles;
        self
    }

    /// Draws routes from a generator seeded with `seed`.
    pub fn set_seed(self, seed: u64) -> Self {
        self.set_routes(Arc::new(RandomRoutes::seeded(seed)))
    }

    /// Sets where the progress of the vehicles goes.
    pub fn set_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets where the routes of the vehicles come from.
    pub fn set_routes(mut self, routes: Arc<dyn RouteSource>) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> RunConfiguration {
        RunConfiguration {
            vehicles: self.vehicles,
            sink: self.sink.unwrap_or_else(|| Arc::new(Console::default())),
            routes: self
                .routes
                .unwrap_or_else(|| Arc::new(RandomRoutes::from_entropy())),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Number of vehicles that crossed.
    pub vehicles: usize,
    /// How many times a vehicle signaled the coordinator.
    pub completion_signals: usize,
    /// How many times the coordinator was woken.
    pub coordinator_wakeups: usize,
}

/// Runs the intersection with `config`.
///
/// # Errors
///
/// Returns the error of [`Intersection::setup`].
///
/// # Panics
///
/// Panics if a vehicle thread panicked.
pub fn run(config: RunConfiguration) -> Result<RunReport, KernelError> {
    let RunConfiguration {
        vehicles,
        sink,
        routes,
    } = config;
    let intersection = Arc::new(Intersection::setup(vehicles, sink, routes)?);

    let handles = (0..vehicles)
        .map(|id| {
            let intersection = intersection.clone();
            ThreadBuilder::new(format!("vehicle {id}")).spawn(move || intersection.run_vehicle(id))
        })
        .collect::<Vec<_>>();

    let coordinator_wakeups = intersection.await_completion();
    for (id, handle) in handles.into_iter().enumerate() {
        let code = handle.join();
        assert_eq!(code, 0, "Vehicle {id} exited with {code}.");
    }

    let Ok(intersection) = Arc::try_unwrap(intersection) else {
        panic!("Intersection is still shared after every vehicle exited.");
    };
    let report = RunReport {
        vehicles,
        completion_signals: intersection.completion_signals(),
        coordinator_wakeups,
    };
    intersection.teardown();
    info!("Stoplight: {report:?}");
    Ok(report)
}
