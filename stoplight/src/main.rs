use clap::{App, Arg};
use kernel::{KernelError, QUITE, panicking::abort_on_panic, warning};
use std::sync::{Arc, atomic::Ordering};
use stoplight::{
    RunConfigurationBuilder,
    intersection::{Console, Phase, Phases},
};

fn parse_phases<'a>(names: impl Iterator<Item = &'a str>) -> Phases {
    names
        .map(|name| match name {
            "approach" => Phase::Approach.flag(),
            "enter" => Phase::Enter.flag(),
            _ => Phase::Exit.flag(),
        })
        .fold(Phases::empty(), |acc, flag| acc | flag)
}

fn stoplight() -> Result<(), KernelError> {
    let matches = App::new("stoplight")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Vehicles crossing a three-way intersection without a traffic signal")
        .arg(
            Arg::with_name("vehicles")
                .short("n")
                .long("vehicles")
                .takes_value(true)
                .help("Number of vehicles (default: 20)"),
        )
        .arg(
            Arg::with_name("seed")
                .short("s")
                .long("seed")
                .takes_value(true)
                .help("Seed of the routes; random if omitted"),
        )
        .arg(
            Arg::with_name("phases")
                .short("p")
                .long("phases")
                .takes_value(true)
                .use_delimiter(true)
                .possible_values(&["approach", "enter", "exit"])
                .help("Phases to print"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("Suppress kernel messages"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .conflicts_with("quiet")
                .help("Print protocol milestones"),
        )
        .get_matches();

    if matches.is_present("quiet") {
        QUITE.store(true, Ordering::SeqCst);
    }

    let mut builder = RunConfigurationBuilder::new();
    if let Some(vehicles) = matches.value_of("vehicles") {
        let vehicles = vehicles.parse::<usize>().map_err(|e| {
            warning!("--vehicles {vehicles}: {e}");
            KernelError::InvalidArgument
        })?;
        builder = builder.set_vehicles(vehicles);
    }
    if let Some(seed) = matches.value_of("seed") {
        let seed = seed.parse::<u64>().map_err(|e| {
            warning!("--seed {seed}: {e}");
            KernelError::InvalidArgument
        })?;
        builder = builder.set_seed(seed);
    }
    let phases = matches
        .values_of("phases")
        .map(parse_phases)
        .unwrap_or_else(Phases::all);
    let sink = Console::new(phases, matches.is_present("verbose"));

    stoplight::run(builder.set_sink(Arc::new(sink)).build()).map(|_| ())
}

fn main() {
    abort_on_panic();
    if let Err(e) = stoplight() {
        std::process::exit(e.exit_code());
    }
}
