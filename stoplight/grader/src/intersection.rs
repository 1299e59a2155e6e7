use alloc::{sync::Arc, vec, vec::Vec};
use core::time::Duration;
use grading::*;
use kernel::{
    KernelError,
    random::Rng,
    sync::SpinLock,
    thread::{JoinHandle, ThreadBuilder},
};
use stoplight::{RunConfigurationBuilder, RunReport, intersection::*, run};

const TIMEOUT: Duration = Duration::from_secs(30);

const CAR_A_LEFT: Route = Route::new(VehicleKind::Car, Lane::A, Turn::Left);
const CAR_A_RIGHT: Route = Route::new(VehicleKind::Car, Lane::A, Turn::Right);
const CAR_B_RIGHT: Route = Route::new(VehicleKind::Car, Lane::B, Turn::Right);
const TRUCK_A_RIGHT: Route = Route::new(VehicleKind::Truck, Lane::A, Turn::Right);
const TRUCK_B_LEFT: Route = Route::new(VehicleKind::Truck, Lane::B, Turn::Left);

fn setup(routes: Vec<Route>) -> (Arc<Intersection>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::new());
    let intersection = Intersection::setup(
        routes.len(),
        recorder.clone(),
        Arc::new(Scripted::new(routes).unwrap()),
    )
    .unwrap();
    (Arc::new(intersection), recorder)
}

fn spawn_vehicle(intersection: &Arc<Intersection>, id: usize) -> JoinHandle {
    let intersection = intersection.clone();
    ThreadBuilder::new(alloc::format!("vehicle {id}"))
        .spawn(move || intersection.run_vehicle(id))
}

fn finish(intersection: Arc<Intersection>) {
    assert_eq!(intersection.await_completion(), 0);
    assert_eq!(intersection.remaining(), 0);
    assert_eq!(intersection.completion_signals(), 1);
    let Ok(intersection) = Arc::try_unwrap(intersection) else {
        panic!("A vehicle still holds the intersection.");
    };
    intersection.teardown();
}

/// Runs `vehicles` vehicles on a coordinator thread, failing if the run does
/// not finish in time.
fn run_recorded(vehicles: usize, routes: Arc<dyn RouteSource>) -> (Arc<Recorder>, RunReport) {
    let recorder = Arc::new(Recorder::new());
    let report = Arc::new(SpinLock::new(None));

    let coordinator = {
        let (recorder, report) = (recorder.clone(), report.clone());
        ThreadBuilder::new("coordinator").spawn(move || {
            let config = RunConfigurationBuilder::new()
                .set_vehicles(vehicles)
                .set_sink(recorder)
                .set_routes(routes)
                .build();
            let result = run(config).unwrap();
            let mut report = report.lock();
            *report = Some(result);
            report.unlock();
        })
    };
    assert!(
        matches!(coordinator.join_timeout(TIMEOUT), Ok(0)),
        "The run did not finish."
    );

    let mut report = report.lock();
    let result = report.take();
    report.unlock();
    (recorder, result.unwrap())
}

/// The events of vehicle `id`, in the only order it may emit them.
fn expected_events(id: usize, route: Route) -> Vec<Event> {
    match route.quadrants() {
        (q, None) => vec![
            Event::approach(id, route),
            Event::enter(id, route, q),
            Event::exit(id, route, q),
        ],
        (q1, Some(q2)) => vec![
            Event::approach(id, route),
            Event::enter(id, route, q1),
            Event::exit(id, route, q1),
            Event::enter(id, route, q2),
            Event::exit(id, route, q2),
        ],
    }
}

fn check_vehicles(events: &[Event], vehicles: usize) {
    for id in 0..vehicles {
        let own = events.iter().filter(|e| e.id == id).copied().collect::<Vec<_>>();
        assert!(!own.is_empty(), "Vehicle {id} never showed up.");
        assert_eq!(own, expected_events(id, own[0].route));
    }
}

fn check_exclusion(events: &[Event]) {
    let mut inside: [Option<usize>; 3] = [None; 3];
    for event in events {
        let Some(q) = event.section else { continue };
        let slot = &mut inside[usize::from(q)];
        match event.phase {
            Phase::Enter => {
                assert_eq!(*slot, None, "{event} while another vehicle is in {q}.");
                *slot = Some(event.id);
            }
            Phase::Exit => {
                assert_eq!(*slot, Some(event.id), "{event} without entering.");
                *slot = None;
            }
            Phase::Approach => unreachable!(),
        }
    }
    assert_eq!(inside, [None; 3]);
}

fn check_left_turns(milestones: &[Milestone]) {
    let mut open = None;
    for milestone in milestones {
        if let Milestone::LeftTurnWindow { id, open: opens } = *milestone {
            if opens {
                assert_eq!(open, None, "Two vehicles hold two quadrants.");
                open = Some(id);
            } else {
                assert_eq!(open, Some(id));
                open = None;
            }
        }
    }
    assert_eq!(open, None);
}

fn check_trucks(milestones: &[Milestone]) {
    let mut admitted: [Option<usize>; 3] = [None; 3];
    for milestone in milestones {
        match *milestone {
            Milestone::TruckAdmitted { id, lane } => {
                let slot = &mut admitted[usize::from(lane)];
                assert_eq!(*slot, None, "Two trucks of {lane} admitted at once.");
                *slot = Some(id);
            }
            Milestone::TruckYielding { id, lane, waiting_cars } => {
                assert_eq!(admitted[usize::from(lane)], Some(id));
                assert!(waiting_cars > 0);
            }
            Milestone::TruckCleared { id, lane, waiting_cars } => {
                let slot = &mut admitted[usize::from(lane)];
                assert_eq!(*slot, Some(id));
                assert_eq!(waiting_cars, 0, "Truck {id} crosses ahead of a car.");
                *slot = None;
            }
            _ => (),
        }
    }
    assert_eq!(admitted, [None; 3]);
}

pub fn routes() {
    assert_eq!(CAR_A_RIGHT.destination(), Lane::B);
    assert_eq!(CAR_A_LEFT.destination(), Lane::C);
    assert_eq!(CAR_B_RIGHT.destination(), Lane::C);
    assert_eq!(TRUCK_B_LEFT.destination(), Lane::A);

    assert_eq!(CAR_A_RIGHT.quadrants(), (Quadrant::AB, None));
    assert_eq!(CAR_A_LEFT.quadrants(), (Quadrant::AB, Some(Quadrant::BC)));
    assert_eq!(TRUCK_B_LEFT.quadrants(), (Quadrant::BC, Some(Quadrant::CA)));
    assert_eq!(
        Route::new(VehicleKind::Car, Lane::C, Turn::Left).quadrants(),
        (Quadrant::CA, Some(Quadrant::AB))
    );

    assert!(matches!(
        Scripted::new(Vec::new()),
        Err(KernelError::InvalidArgument)
    ));
    let scripted = Scripted::new(vec![CAR_A_LEFT, TRUCK_A_RIGHT]).unwrap();
    assert_eq!(scripted.route(0), CAR_A_LEFT);
    assert_eq!(scripted.route(3), TRUCK_A_RIGHT);

    let (first, second) = (RandomRoutes::seeded(42), RandomRoutes::seeded(42));
    for id in 0..32 {
        assert_eq!(first.route(id), second.route(id));
    }
}

pub fn routes_replay() {
    const VEHICLES: usize = 16;
    let (forward, backward) = (RandomRoutes::seeded(7), RandomRoutes::seeded(7));
    let drawn = (0..VEHICLES).map(|id| forward.route(id)).collect::<Vec<_>>();
    let mut replayed = (0..VEHICLES)
        .rev()
        .map(|id| backward.route(id))
        .collect::<Vec<_>>();
    replayed.reverse();
    assert_eq!(drawn, replayed);

    // A run gives every vehicle the route its id draws.
    let (recorder, _) = run_recorded(VEHICLES, Arc::new(RandomRoutes::seeded(7)));
    for event in recorder.events() {
        assert_eq!(event.route, drawn[event.id]);
    }
}

pub fn event_format() {
    let route = Route::new(VehicleKind::Car, Lane::A, Turn::Left);
    assert_eq!(
        alloc::format!("{}", Event::approach(3, route)),
        "Car 3 from Route A to turn LEFT to Route C APPROACHES the intersection"
    );
    assert_eq!(
        alloc::format!("{}", Event::enter(3, route, Quadrant::BC)),
        "Car 3 from Route A to turn LEFT to Route C ENTERED BC"
    );
    assert_eq!(
        alloc::format!("{}", Event::exit(7, TRUCK_A_RIGHT, Quadrant::AB)),
        "Truck 7 from Route A to turn RIGHT to Route B LEFT AB"
    );
}

pub fn setup_no_vehicle() {
    assert!(matches!(
        Intersection::setup(
            0,
            Arc::new(Recorder::new()),
            Arc::new(RandomRoutes::seeded(0))
        ),
        Err(KernelError::InvalidArgument)
    ));
    assert_eq!(
        run(RunConfigurationBuilder::new()
            .set_vehicles(0)
            .set_sink(Arc::new(Recorder::new()))
            .build()),
        Err(KernelError::InvalidArgument)
    );
}

pub fn exit_codes() {
    assert_eq!(KernelError::NoMemory.exit_code(), 12);
    assert_eq!(KernelError::InvalidArgument.exit_code(), 22);

    let result = run(RunConfigurationBuilder::new()
        .set_vehicles(0)
        .set_sink(Arc::new(Recorder::new()))
        .build());
    assert_eq!(result.map_err(KernelError::exit_code), Err(22));
}

#[inject_oom(4)]
pub fn run_out_of_memory() {
    let recorder = Arc::new(Recorder::new());
    let result = run(RunConfigurationBuilder::new()
        .set_vehicles(4)
        .set_sink(recorder.clone())
        .set_seed(4)
        .build());
    assert_eq!(result, Err(KernelError::NoMemory));
    assert_eq!(result.map_err(KernelError::exit_code), Err(12));
    assert!(recorder.records().is_empty());
}

#[inject_oom(4)]
pub fn setup_out_of_memory() {
    assert!(matches!(
        Intersection::setup(
            4,
            Arc::new(Recorder::new()),
            Arc::new(RandomRoutes::seeded(0))
        ),
        Err(KernelError::NoMemory)
    ));
}

pub fn setup_out_of_memory_late() {
    // Setup names thirteen primitives.
    kernel::mm::fail_after(12);
    assert!(matches!(
        Intersection::setup(
            4,
            Arc::new(Recorder::new()),
            Arc::new(RandomRoutes::seeded(0))
        ),
        Err(KernelError::NoMemory)
    ));

    kernel::mm::fail_after(13);
    let intersection = Intersection::setup(
        4,
        Arc::new(Recorder::new()),
        Arc::new(RandomRoutes::seeded(0)),
    );
    kernel::mm::clear_fault();
    let intersection = intersection.unwrap();
    assert_eq!(intersection.vehicles(), 4);
    assert_eq!(intersection.remaining(), 4);
    intersection.teardown();
}

#[assert_exit_code(-1)]
pub fn teardown_held_quadrant() {
    let intersection = Intersection::setup(
        1,
        Arc::new(Recorder::new()),
        Arc::new(RandomRoutes::seeded(0)),
    )
    .unwrap();
    core::mem::forget(intersection.quadrant(Quadrant::AB).acquire());
    intersection.teardown();
}

pub fn single_vehicle() {
    let (recorder, report) = run_recorded(1, Arc::new(Scripted::new(vec![CAR_A_RIGHT]).unwrap()));
    assert_eq!(recorder.events(), expected_events(0, CAR_A_RIGHT));
    assert_eq!(report.vehicles, 1);
    assert_eq!(report.completion_signals, 1);
    assert!(report.coordinator_wakeups <= 1);
    assert!(recorder.saw(&Milestone::CompletionSignaled { id: 0 }));
}

pub fn scenario_4() {
    let routes = [CAR_A_LEFT, TRUCK_A_RIGHT, CAR_B_RIGHT, TRUCK_B_LEFT];
    let (intersection, recorder) = setup(routes.to_vec());

    // A car and a truck of lane A while BC is taken.
    let bc = intersection.quadrant(Quadrant::BC).acquire();
    let v0 = spawn_vehicle(&intersection, 0);
    wait_until!(
        recorder.saw_event(&Event::enter(0, CAR_A_LEFT, Quadrant::AB))
            && intersection.quadrant(Quadrant::BC).waiters() == 1,
        "vehicle 0 to wait for BC"
    );
    let v1 = spawn_vehicle(&intersection, 1);
    wait_until!(
        recorder.saw(&Milestone::TruckYielding {
            id: 1,
            lane: Lane::A,
            waiting_cars: 1
        }) && intersection
            .wait_queue(WaitKey::WaitingCars(Lane::A))
            .waiters()
            == 1,
        "vehicle 1 to yield"
    );
    bc.release();
    assert_eq!(v0.join_timeout(TIMEOUT).ok(), Some(0));
    assert_eq!(v1.join_timeout(TIMEOUT).ok(), Some(0));

    // A car and a truck of lane B while BC is taken.
    let bc = intersection.quadrant(Quadrant::BC).acquire();
    let v2 = spawn_vehicle(&intersection, 2);
    wait_until!(
        recorder.saw_event(&Event::approach(2, CAR_B_RIGHT))
            && intersection.quadrant(Quadrant::BC).waiters() == 1,
        "vehicle 2 to wait for BC"
    );
    let v3 = spawn_vehicle(&intersection, 3);
    wait_until!(
        recorder.saw(&Milestone::TruckYielding {
            id: 3,
            lane: Lane::B,
            waiting_cars: 1
        }) && intersection
            .wait_queue(WaitKey::WaitingCars(Lane::B))
            .waiters()
            == 1,
        "vehicle 3 to yield"
    );
    bc.release();
    assert_eq!(v2.join_timeout(TIMEOUT).ok(), Some(0));
    assert_eq!(v3.join_timeout(TIMEOUT).ok(), Some(0));

    assert_eq!(
        recorder.events(),
        [
            Event::approach(0, CAR_A_LEFT),
            Event::enter(0, CAR_A_LEFT, Quadrant::AB),
            Event::approach(1, TRUCK_A_RIGHT),
            Event::exit(0, CAR_A_LEFT, Quadrant::AB),
            Event::enter(0, CAR_A_LEFT, Quadrant::BC),
            Event::exit(0, CAR_A_LEFT, Quadrant::BC),
            Event::enter(1, TRUCK_A_RIGHT, Quadrant::AB),
            Event::exit(1, TRUCK_A_RIGHT, Quadrant::AB),
            Event::approach(2, CAR_B_RIGHT),
            Event::approach(3, TRUCK_B_LEFT),
            Event::enter(2, CAR_B_RIGHT, Quadrant::BC),
            Event::exit(2, CAR_B_RIGHT, Quadrant::BC),
            Event::enter(3, TRUCK_B_LEFT, Quadrant::BC),
            Event::exit(3, TRUCK_B_LEFT, Quadrant::BC),
            Event::enter(3, TRUCK_B_LEFT, Quadrant::CA),
            Event::exit(3, TRUCK_B_LEFT, Quadrant::CA),
        ]
    );
    check_trucks(&recorder.milestones());
    check_left_turns(&recorder.milestones());
    finish(intersection);
}

pub fn truck_yields_to_cars() {
    let (intersection, recorder) = setup(vec![CAR_A_RIGHT, TRUCK_A_RIGHT, CAR_A_LEFT]);

    let ab = intersection.quadrant(Quadrant::AB).acquire();
    let v0 = spawn_vehicle(&intersection, 0);
    wait_until!(
        intersection.quadrant(Quadrant::AB).waiters() == 1,
        "vehicle 0 to wait for AB"
    );
    let v1 = spawn_vehicle(&intersection, 1);
    wait_until!(
        intersection
            .wait_queue(WaitKey::WaitingCars(Lane::A))
            .waiters()
            == 1,
        "vehicle 1 to yield"
    );
    // A car arriving behind a yielding truck still goes first.
    let v2 = spawn_vehicle(&intersection, 2);
    wait_until!(
        intersection.quadrant(Quadrant::AB).waiters() == 2,
        "vehicle 2 to wait for AB"
    );
    assert_eq!(intersection.waiting_cars(Lane::A), 2);
    assert!(!recorder.saw_event(&Event::enter(1, TRUCK_A_RIGHT, Quadrant::AB)));
    ab.release();

    for handle in [v0, v1, v2] {
        assert_eq!(handle.join_timeout(TIMEOUT).ok(), Some(0));
    }
    assert_eq!(intersection.waiting_cars(Lane::A), 0);

    let events = recorder.events();
    let position = |event: Event| events.iter().position(|e| *e == event).unwrap();
    let truck_enters = position(Event::enter(1, TRUCK_A_RIGHT, Quadrant::AB));
    assert!(position(Event::exit(0, CAR_A_RIGHT, Quadrant::AB)) < truck_enters);
    assert!(position(Event::exit(2, CAR_A_LEFT, Quadrant::BC)) < truck_enters);
    assert!(recorder.saw(&Milestone::TruckCleared {
        id: 1,
        lane: Lane::A,
        waiting_cars: 0
    }));
    check_vehicles(&events, 3);
    finish(intersection);
}

pub fn truck_order() {
    const VEHICLES: usize = 36;
    let routes = vec![
        TRUCK_A_RIGHT,
        CAR_A_LEFT,
        Route::new(VehicleKind::Truck, Lane::A, Turn::Left),
        CAR_A_RIGHT,
        Route::new(VehicleKind::Truck, Lane::B, Turn::Right),
        CAR_B_RIGHT,
    ];
    let (recorder, report) = run_recorded(VEHICLES, Arc::new(Scripted::new(routes).unwrap()));
    assert_eq!(report.vehicles, VEHICLES);

    let milestones = recorder.milestones();
    check_trucks(&milestones);
    let admitted = milestones
        .iter()
        .filter(|m| matches!(m, Milestone::TruckAdmitted { .. }))
        .count();
    assert_eq!(admitted, VEHICLES / 2);
    check_vehicles(&recorder.events(), VEHICLES);
}

pub fn mutual_exclusion() {
    const VEHICLES: usize = 40;
    let (recorder, _) = run_recorded(VEHICLES, Arc::new(RandomRoutes::seeded(0x5709)));
    let events = recorder.events();
    check_exclusion(&events);
    check_vehicles(&events, VEHICLES);
}

pub fn left_turn_window() {
    const VEHICLES: usize = 30;
    let (recorder, _) = run_recorded(VEHICLES, Arc::new(RandomRoutes::seeded(0x1eff)));
    let milestones = recorder.milestones();
    check_left_turns(&milestones);

    let lefts = recorder
        .events()
        .iter()
        .filter(|e| e.phase == Phase::Approach && e.route.turn == Turn::Left)
        .count();
    let windows = milestones
        .iter()
        .filter(|m| matches!(m, Milestone::LeftTurnWindow { open: true, .. }))
        .count();
    assert_eq!(lefts, windows);
}

pub fn all_left_cycle() {
    const VEHICLES: usize = 30;
    let routes = Lane::ALL
        .iter()
        .map(|lane| Route::new(VehicleKind::Car, *lane, Turn::Left))
        .collect::<Vec<_>>();
    let (recorder, report) = run_recorded(VEHICLES, Arc::new(Scripted::new(routes).unwrap()));
    assert_eq!(report.vehicles, VEHICLES);

    let events = recorder.events();
    assert_eq!(events.len(), VEHICLES * 5);
    check_exclusion(&events);
    check_vehicles(&events, VEHICLES);
    check_left_turns(&recorder.milestones());
}

pub fn completion_once() {
    const VEHICLES: usize = 20;
    let (recorder, report) = run_recorded(VEHICLES, Arc::new(RandomRoutes::seeded(20)));
    assert_eq!(report.vehicles, VEHICLES);
    assert_eq!(report.completion_signals, 1);
    assert!(report.coordinator_wakeups <= 1);

    let milestones = recorder.milestones();
    let signals = milestones
        .iter()
        .filter(|m| matches!(m, Milestone::CompletionSignaled { .. }))
        .collect::<Vec<_>>();
    assert_eq!(signals.len(), 1);
    // Nothing happens after the last vehicle departed.
    assert_eq!(
        recorder.records().last(),
        Some(&Record::Milestone(*signals[0]))
    );
}

#[repeat(10)]
pub fn random_runs() {
    const VEHICLES: usize = 12;
    let seed = kernel::random::from_entropy().gen_range(0..u64::MAX);
    kernel::debug!("Seed: {seed}");

    let (recorder, report) = run_recorded(VEHICLES, Arc::new(RandomRoutes::seeded(seed)));
    assert_eq!(report.vehicles, VEHICLES);
    assert_eq!(report.completion_signals, 1);

    let events = recorder.events();
    let milestones = recorder.milestones();
    check_exclusion(&events);
    check_vehicles(&events, VEHICLES);
    check_left_turns(&milestones);
    check_trucks(&milestones);
}
