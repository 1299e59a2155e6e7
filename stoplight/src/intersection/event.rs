//! Progress of the vehicles.
//!
//! Each vehicle reports three kinds of [`Event`]: it approaches the
//! intersection, it enters a quadrant, and it leaves a quadrant. Enter and
//! exit events for a quadrant are emitted while the vehicle holds the lock of
//! that quadrant, so the order in which a sink receives them is the order in
//! which the quadrant was used.
//!
//! Besides events, the intersection reports protocol [`Milestone`]s through
//! [`EventSink::observe`]. They are not part of the progress output, but tell
//! an observer when a truck yields, when a left turn holds two quadrants, and
//! when the last vehicle signals completion.

use super::route::{Lane, Quadrant, Route};
use bitflags::bitflags;
use core::fmt;
use kernel::sync::SpinLock;

/// A phase of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The vehicle arrived at the intersection.
    Approach,
    /// The vehicle entered a quadrant.
    Enter,
    /// The vehicle left a quadrant.
    Exit,
}

bitflags! {
    /// A set of [`Phase`]s.
    pub struct Phases: u8 {
        /// [`Phase::Approach`].
        const APPROACH = 0b001;
        /// [`Phase::Enter`].
        const ENTER = 0b010;
        /// [`Phase::Exit`].
        const EXIT = 0b100;
    }
}

impl Phase {
    /// The flag of this phase.
    pub fn flag(self) -> Phases {
        match self {
            Phase::Approach => Phases::APPROACH,
            Phase::Enter => Phases::ENTER,
            Phase::Exit => Phases::EXIT,
        }
    }
}

/// A phase transition of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    /// Id of the vehicle.
    pub id: usize,
    /// Route of the vehicle.
    pub route: Route,
    /// The quadrant entered or left. `None` when approaching.
    pub section: Option<Quadrant>,
    /// What happened.
    pub phase: Phase,
}

impl Event {
    /// Vehicle `id` approaches the intersection.
    pub fn approach(id: usize, route: Route) -> Self {
        Self {
            id,
            route,
            section: None,
            phase: Phase::Approach,
        }
    }

    /// Vehicle `id` enters `section`.
    pub fn enter(id: usize, route: Route, section: Quadrant) -> Self {
        Self {
            id,
            route,
            section: Some(section),
            phase: Phase::Enter,
        }
    }

    /// Vehicle `id` leaves `section`.
    pub fn exit(id: usize, route: Route, section: Quadrant) -> Self {
        Self {
            id,
            route,
            section: Some(section),
            phase: Phase::Exit,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} from {} to turn {} to {} ",
            self.route.kind,
            self.id,
            self.route.lane,
            self.route.turn,
            self.route.destination()
        )?;
        match (self.phase, self.section) {
            (Phase::Approach, _) => write!(f, "APPROACHES the intersection"),
            (Phase::Enter, Some(section)) => write!(f, "ENTERED {section}"),
            (Phase::Exit, Some(section)) => write!(f, "LEFT {section}"),
            (_, None) => write!(f, "is nowhere"),
        }
    }
}

/// A step of the crossing protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Milestone {
    /// A truck holds the admission lock of its lane.
    TruckAdmitted { id: usize, lane: Lane },
    /// A truck found cars of its lane pending and sleeps until they are gone.
    TruckYielding {
        id: usize,
        lane: Lane,
        waiting_cars: usize,
    },
    /// A truck decided to cross. Still under the admission lock of its lane.
    TruckCleared {
        id: usize,
        lane: Lane,
        waiting_cars: usize,
    },
    /// A left-turning vehicle holds (`open`) or is about to give up
    /// (`!open`) both of its quadrants.
    LeftTurnWindow { id: usize, open: bool },
    /// The last vehicle woke the coordinator.
    CompletionSignaled { id: usize },
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Milestone::TruckAdmitted { id, lane } => {
                write!(f, "Truck {id} is the next truck of {lane}")
            }
            Milestone::TruckYielding {
                id,
                lane,
                waiting_cars,
            } => write!(f, "Truck {id} yields to {waiting_cars} cars of {lane}"),
            Milestone::TruckCleared { id, lane, .. } => {
                write!(f, "Truck {id} has no car of {lane} ahead")
            }
            Milestone::LeftTurnWindow { id, open: true } => {
                write!(f, "Vehicle {id} holds two quadrants")
            }
            Milestone::LeftTurnWindow { id, open: false } => {
                write!(f, "Vehicle {id} gives up its first quadrant")
            }
            Milestone::CompletionSignaled { id } => {
                write!(f, "Vehicle {id} is the last one out")
            }
        }
    }
}

/// Receives the progress of the vehicles.
pub trait EventSink: Send + Sync {
    /// Called on each phase transition.
    fn emit(&self, event: &Event);

    /// Called on each protocol milestone.
    fn observe(&self, _milestone: &Milestone) {}
}

/// Prints the progress of the vehicles on the console.
pub struct Console {
    phases: Phases,
    verbose: bool,
}

impl Console {
    /// Prints the events of `phases`. Milestones are printed as debug
    /// messages if `verbose` is set.
    pub fn new(phases: Phases, verbose: bool) -> Self {
        Self { phases, verbose }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new(Phases::all(), false)
    }
}

impl EventSink for Console {
    fn emit(&self, event: &Event) {
        if self.phases.contains(event.phase.flag()) {
            kernel::println!("{event}");
        }
    }

    fn observe(&self, milestone: &Milestone) {
        if self.verbose {
            kernel::debug!("{milestone}");
        }
    }
}

/// An entry of a [`Recorder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Record {
    /// An [`Event`].
    Event(Event),
    /// A [`Milestone`].
    Milestone(Milestone),
}

/// Keeps everything it receives, in order.
#[derive(Default)]
pub struct Recorder {
    records: SpinLock<Vec<Record>>,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub fn records(&self) -> Vec<Record> {
        let records = self.records.lock();
        let copy = records.clone();
        records.unlock();
        copy
    }

    /// The events received so far.
    pub fn events(&self) -> Vec<Event> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Record::Event(event) => Some(event),
                Record::Milestone(_) => None,
            })
            .collect()
    }

    /// The milestones received so far.
    pub fn milestones(&self) -> Vec<Milestone> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Record::Milestone(milestone) => Some(milestone),
                Record::Event(_) => None,
            })
            .collect()
    }

    /// Whether `milestone` was received.
    pub fn saw(&self, milestone: &Milestone) -> bool {
        let records = self.records.lock();
        let saw = records.contains(&Record::Milestone(*milestone));
        records.unlock();
        saw
    }

    /// Whether `event` was received.
    pub fn saw_event(&self, event: &Event) -> bool {
        let records = self.records.lock();
        let saw = records.contains(&Record::Event(*event));
        records.unlock();
        saw
    }

    fn push(&self, record: Record) {
        let mut records = self.records.lock();
        records.push(record);
        records.unlock();
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: &Event) {
        self.push(Record::Event(*event))
    }

    fn observe(&self, milestone: &Milestone) {
        self.push(Record::Milestone(*milestone))
    }
}
