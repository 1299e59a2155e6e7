//! # The intersection.
//!
//! A three-way intersection without a traffic signal. Each vehicle is a
//! thread that crosses the intersection using only the blocking primitives of
//! [`sync`]. The [`Intersection`] owns every primitive used by the vehicles:
//!
//! - one [`Lock`] per [`Quadrant`]. A vehicle is inside a quadrant only while
//!   it holds the lock of the quadrant.
//! - the left-turn admission lock. A vehicle holds it whenever it holds, or is
//!   about to hold, two quadrant locks.
//! - one truck admission lock per [`Lane`]. The trucks of a lane go through
//!   it one by one.
//! - the count of pending cars per lane, with one condition variable per lane
//!   that trucks sleep on.
//! - the count of vehicles still on their way, with the condition variable
//!   the coordinator sleeps on.
//!
//! ## Crossing
//!
//! A right turn takes the lock of one quadrant. A left turn takes the
//! admission lock, then the first quadrant, then the second one, and only then
//! releases the admission lock and the first quadrant. As a single crossing
//! holds one quadrant lock and at most one thread at a time waits for a second
//! quadrant while holding a first one, the threads waiting for quadrant locks
//! never form a cycle.
//!
//! ## Cars and trucks
//!
//! A car registers itself as pending in its lane before crossing, and
//! unregisters after. A truck first takes the admission lock of its lane, then
//! sleeps as long as cars of its lane are pending. The last car to unregister
//! wakes every sleeping truck of its lane. The admission lock is released once
//! the truck decided to cross, so the next truck of the lane cannot decide
//! before it. The order in which cleared trucks then enter a quadrant is not
//! fixed.
//!
//! [`sync`]: crate::sync
//! [`Lock`]: crate::sync::Lock

pub mod event;
pub mod route;

pub use event::*;
pub use route::*;

use crate::sync::{ConditionVariable, Lock};
use alloc::sync::Arc;
use kernel::{KernelError, info, sync::atomic::AtomicUsize, warning};

/// What a thread of the intersection sleeps on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitKey {
    /// No car of the lane is pending.
    WaitingCars(Lane),
    /// Every vehicle departed.
    Completion,
}

/// The shared state of a run.
pub struct Intersection {
    quadrants: [Lock; 3],
    left_turn: Lock,
    truck_admission: [Lock; 3],
    waiting_cars: Lock<[usize; 3]>,
    cars_cleared: [ConditionVariable; 3],
    remaining: Lock<usize>,
    completion: ConditionVariable,
    vehicles: usize,
    completion_signals: AtomicUsize,
    sink: Arc<dyn EventSink>,
    routes: Arc<dyn RouteSource>,
}

impl Intersection {
    /// Creates every primitive of a run of `vehicles` vehicles.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidArgument`] if `vehicles` is zero, and
    /// [`KernelError::NoMemory`] if a primitive cannot be allocated. The
    /// primitives created before the failure are destroyed.
    pub fn setup(
        vehicles: usize,
        sink: Arc<dyn EventSink>,
        routes: Arc<dyn RouteSource>,
    ) -> Result<Self, KernelError> {
        if vehicles == 0 {
            warning!("Intersection: a run needs at least one vehicle.");
            return Err(KernelError::InvalidArgument);
        }
        let intersection = Self::build(vehicles, sink, routes)
            .inspect_err(|e| warning!("Intersection: setup failed ({e})."))?;
        info!("Intersection: ready for {vehicles} vehicles.");
        Ok(intersection)
    }

    fn build(
        vehicles: usize,
        sink: Arc<dyn EventSink>,
        routes: Arc<dyn RouteSource>,
    ) -> Result<Self, KernelError> {
        Ok(Self {
            quadrants: [
                Lock::new(Quadrant::AB.name(), ())?,
                Lock::new(Quadrant::BC.name(), ())?,
                Lock::new(Quadrant::CA.name(), ())?,
            ],
            left_turn: Lock::new("Left lock", ())?,
            truck_admission: [
                Lock::new("Lane A truck", ())?,
                Lock::new("Lane B truck", ())?,
                Lock::new("Lane C truck", ())?,
            ],
            waiting_cars: Lock::new("Waiting cars", [0; 3])?,
            cars_cleared: [
                ConditionVariable::new("Lane A cleared")?,
                ConditionVariable::new("Lane B cleared")?,
                ConditionVariable::new("Lane C cleared")?,
            ],
            remaining: Lock::new("Remaining vehicles", vehicles)?,
            completion: ConditionVariable::new("Completion")?,
            vehicles,
            completion_signals: AtomicUsize::new(0),
            sink,
            routes,
        })
    }

    /// Number of vehicles of the run.
    pub fn vehicles(&self) -> usize {
        self.vehicles
    }

    /// The lock of quadrant `q`.
    pub fn quadrant(&self, q: Quadrant) -> &Lock {
        &self.quadrants[usize::from(q)]
    }

    /// The condition variable behind `key`.
    pub fn wait_queue(&self, key: WaitKey) -> &ConditionVariable {
        match key {
            WaitKey::WaitingCars(lane) => &self.cars_cleared[usize::from(lane)],
            WaitKey::Completion => &self.completion,
        }
    }

    /// Number of cars of `lane` that have not finished crossing.
    pub fn waiting_cars(&self, lane: Lane) -> usize {
        let waiting = self.waiting_cars.acquire();
        let n = waiting[usize::from(lane)];
        waiting.release();
        n
    }

    /// Number of vehicles that have not departed.
    pub fn remaining(&self) -> usize {
        let remaining = self.remaining.acquire();
        let n = *remaining;
        remaining.release();
        n
    }

    /// How many times the coordinator was signaled.
    pub fn completion_signals(&self) -> usize {
        self.completion_signals.load()
    }

    /// Drives vehicle `id` through the intersection.
    pub fn run_vehicle(&self, id: usize) {
        let route = self.routes.route(id);
        self.sink.emit(&Event::approach(id, route));

        match route.kind {
            VehicleKind::Car => {
                self.car_arrives(route.lane);
                self.cross(id, route);
                self.car_leaves(route.lane);
            }
            VehicleKind::Truck => {
                self.truck_yields(id, route.lane);
                self.cross(id, route);
            }
        }
    }

    fn car_arrives(&self, lane: Lane) {
        let mut waiting = self.waiting_cars.acquire();
        waiting[usize::from(lane)] += 1;
        waiting.release();
    }

    fn car_leaves(&self, lane: Lane) {
        let mut waiting = self.waiting_cars.acquire();
        let count = &mut waiting[usize::from(lane)];
        assert!(*count > 0, "Intersection: no car of {lane} is pending.");
        *count -= 1;
        if *count == 0 {
            self.wait_queue(WaitKey::WaitingCars(lane))
                .broadcast(&waiting);
        }
        waiting.release();
    }

    /// Waits until no car of `lane` is pending, behind the trucks of `lane`
    /// that arrived first.
    ///
    /// The trucks of a lane are cleared one at a time, in the order they got
    /// the admission lock. Once cleared, a truck races for its quadrants like
    /// any other vehicle, so two cleared trucks of a lane may enter the
    /// quadrant in either order.
    fn truck_yields(&self, id: usize, lane: Lane) {
        let admission = self.truck_admission[usize::from(lane)].acquire();
        self.sink.observe(&Milestone::TruckAdmitted { id, lane });

        let queue = self.wait_queue(WaitKey::WaitingCars(lane));
        let mut waiting = self.waiting_cars.acquire();
        while waiting[usize::from(lane)] > 0 {
            self.sink.observe(&Milestone::TruckYielding {
                id,
                lane,
                waiting_cars: waiting[usize::from(lane)],
            });
            waiting = queue.wait(waiting);
        }
        let waiting_cars = waiting[usize::from(lane)];
        waiting.release();

        self.sink.observe(&Milestone::TruckCleared {
            id,
            lane,
            waiting_cars,
        });
        admission.release();
    }

    fn cross(&self, id: usize, route: Route) {
        match route.quadrants() {
            (q, None) => self.cross_single(id, route, q),
            (q1, Some(q2)) => self.cross_double(id, route, q1, q2),
        }
    }

    fn cross_single(&self, id: usize, route: Route, q: Quadrant) {
        let quadrant = self.quadrant(q).acquire();
        self.sink.emit(&Event::enter(id, route, q));
        self.sink.emit(&Event::exit(id, route, q));
        self.depart(id);
        quadrant.release();
    }

    fn cross_double(&self, id: usize, route: Route, q1: Quadrant, q2: Quadrant) {
        let admission = self.left_turn.acquire();
        let first = self.quadrant(q1).acquire();
        self.sink.emit(&Event::enter(id, route, q1));

        let second = self.quadrant(q2).acquire();
        self.sink
            .observe(&Milestone::LeftTurnWindow { id, open: true });
        self.sink.emit(&Event::exit(id, route, q1));
        self.sink
            .observe(&Milestone::LeftTurnWindow { id, open: false });
        admission.release();
        first.release();

        self.sink.emit(&Event::enter(id, route, q2));
        self.sink.emit(&Event::exit(id, route, q2));
        self.depart(id);
        second.release();
    }

    /// Counts vehicle `id` out, waking the coordinator if it is the last one.
    fn depart(&self, id: usize) {
        let mut remaining = self.remaining.acquire();
        assert!(
            *remaining > 0,
            "Intersection: vehicle {id} departs, but every vehicle already did."
        );
        *remaining -= 1;
        if *remaining == 0 {
            self.completion_signals.fetch_add(1);
            self.sink.observe(&Milestone::CompletionSignaled { id });
            self.completion.signal(&remaining);
        }
        remaining.release();
    }

    /// Sleeps until every vehicle departed.
    ///
    /// Returns how many times the caller was woken.
    pub fn await_completion(&self) -> usize {
        let mut wakeups = 0;
        let mut remaining = self.remaining.acquire();
        while *remaining > 0 {
            remaining = self.completion.wait(remaining);
            wakeups += 1;
        }
        remaining.release();
        wakeups
    }

    /// Destroys every primitive of the run.
    ///
    /// # Panics
    ///
    /// Panics if a primitive is still held or waited on.
    pub fn teardown(self) {
        let Self {
            quadrants,
            left_turn,
            truck_admission,
            waiting_cars,
            cars_cleared,
            remaining,
            completion,
            vehicles,
            ..
        } = self;

        quadrants.into_iter().for_each(|q| q.destroy());
        left_turn.destroy();
        truck_admission.into_iter().for_each(|l| l.destroy());
        let waiting = waiting_cars.destroy();
        cars_cleared.into_iter().for_each(ConditionVariable::destroy);
        let remaining = remaining.destroy();
        completion.destroy();

        info!(
            "Intersection: torn down, {} of {vehicles} vehicles departed, {:?} cars pending.",
            vehicles - remaining,
            waiting
        );
    }
}
