//! Lanes, quadrants and the route of a vehicle.
//!
//! The intersection joins three routes, A, B and C, and is split into three
//! quadrants. A vehicle turning right from a lane crosses the quadrant of its
//! lane only. A vehicle turning left crosses the quadrant of its lane, then the
//! next quadrant around the cycle:
//!
//! ```text
//!   lane A : quadrant AB, then BC when turning left
//!   lane B : quadrant BC, then CA when turning left
//!   lane C : quadrant CA, then AB when turning left
//! ```

use core::fmt;
use kernel::{KernelError, random::Rng};
use num_enum::IntoPrimitive;

/// A route entering the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive)]
#[repr(usize)]
pub enum Lane {
    /// Route A.
    A = 0,
    /// Route B.
    B = 1,
    /// Route C.
    C = 2,
}

impl Lane {
    /// Every lane, in index order.
    pub const ALL: [Lane; 3] = [Lane::A, Lane::B, Lane::C];

    /// The quadrant a vehicle from this lane enters first.
    pub fn quadrant(self) -> Quadrant {
        match self {
            Lane::A => Quadrant::AB,
            Lane::B => Quadrant::BC,
            Lane::C => Quadrant::CA,
        }
    }

    /// The lane a vehicle from this lane leaves by after `turn`.
    pub fn destination(self, turn: Turn) -> Lane {
        Lane::ALL[(usize::from(self) + usize::from(turn) + 1) % 3]
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::A => write!(f, "Route A"),
            Lane::B => write!(f, "Route B"),
            Lane::C => write!(f, "Route C"),
        }
    }
}

/// A turn through the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive)]
#[repr(usize)]
pub enum Turn {
    /// Crosses one quadrant.
    Right = 0,
    /// Crosses two quadrants.
    Left = 1,
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Turn::Right => write!(f, "RIGHT"),
            Turn::Left => write!(f, "LEFT"),
        }
    }
}

/// The class of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive)]
#[repr(usize)]
pub enum VehicleKind {
    /// Cars have right-of-way over the trucks of their lane.
    Car = 0,
    /// Trucks cross only when no car of their lane is pending.
    Truck = 1,
}

impl fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleKind::Car => write!(f, "Car"),
            VehicleKind::Truck => write!(f, "Truck"),
        }
    }
}

/// A section of the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive)]
#[repr(usize)]
pub enum Quadrant {
    /// Between route A and route B.
    AB = 0,
    /// Between route B and route C.
    BC = 1,
    /// Between route C and route A.
    CA = 2,
}

impl Quadrant {
    /// Every quadrant, in index order.
    pub const ALL: [Quadrant; 3] = [Quadrant::AB, Quadrant::BC, Quadrant::CA];

    /// The next quadrant around the cycle.
    pub fn next(self) -> Quadrant {
        Quadrant::ALL[(usize::from(self) + 1) % 3]
    }

    /// The name of the quadrant, also the name of its lock.
    pub fn name(self) -> &'static str {
        match self {
            Quadrant::AB => "AB",
            Quadrant::BC => "BC",
            Quadrant::CA => "CA",
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a vehicle comes from, where it turns, and what it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    /// The lane the vehicle approaches from.
    pub lane: Lane,
    /// The turn it takes.
    pub turn: Turn,
    /// The class of the vehicle.
    pub kind: VehicleKind,
}

impl Route {
    /// Creates a route.
    pub const fn new(kind: VehicleKind, lane: Lane, turn: Turn) -> Self {
        Self { lane, turn, kind }
    }

    /// The lane the vehicle leaves by.
    pub fn destination(&self) -> Lane {
        self.lane.destination(self.turn)
    }

    /// The quadrants the vehicle crosses, in order.
    pub fn quadrants(&self) -> (Quadrant, Option<Quadrant>) {
        let first = self.lane.quadrant();
        match self.turn {
            Turn::Right => (first, None),
            Turn::Left => (first, Some(first.next())),
        }
    }
}

/// Supplies the route of each vehicle.
pub trait RouteSource: Send + Sync {
    /// The route of vehicle `id`.
    fn route(&self, id: usize) -> Route;
}

/// Routes drawn uniformly at random.
///
/// The route of a vehicle depends only on the seed and on the id of the
/// vehicle, so a seeded run gives every vehicle the same route whatever order
/// the vehicle threads ask in.
pub struct RandomRoutes {
    seed: u64,
}

impl RandomRoutes {
    /// Draws routes from generators derived from `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self { seed }
    }

    /// Draws routes from a seed chosen by the operating system.
    pub fn from_entropy() -> Self {
        Self::seeded(kernel::random::from_entropy().gen_range(0..=u64::MAX))
    }
}

impl RouteSource for RandomRoutes {
    fn route(&self, id: usize) -> Route {
        let mut rng = kernel::random::seeded(
            self.seed ^ (id as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15),
        );
        let lane = Lane::ALL[rng.gen_range(0..3)];
        let turn = [Turn::Right, Turn::Left][rng.gen_range(0..2)];
        let kind = [VehicleKind::Car, VehicleKind::Truck][rng.gen_range(0..2)];
        Route::new(kind, lane, turn)
    }
}

/// A fixed list of routes: vehicle `id` takes the `id`-th one, wrapping
/// around at the end.
pub struct Scripted {
    routes: Vec<Route>,
}

impl Scripted {
    /// Creates a source replaying `routes`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidArgument`] if `routes` is empty.
    pub fn new(routes: Vec<Route>) -> Result<Self, KernelError> {
        if routes.is_empty() {
            return Err(KernelError::InvalidArgument);
        }
        Ok(Self { routes })
    }
}

impl RouteSource for Scripted {
    fn route(&self, id: usize) -> Route {
        self.routes[id % self.routes.len()]
    }
}
