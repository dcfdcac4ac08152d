use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use netsim_core::trace::{AsciiTrace, NoopTrace};
use netsim_core::{Scenario, Simulation};
use netsim_scenarios::{report, BuiltIn, Cells, First, Second, Third, WifiFixed};

#[derive(Parser, Debug)]
#[command(name = "netsim", about = "Runs small discrete-event network scenarios")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log application and mobility events
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write a per-hop ASCII trace to this file
    #[arg(long, global = true)]
    trace: Option<PathBuf>,

    /// Seed for the random number generator
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Override the scenario's stop time, in seconds
    #[arg(long, global = true)]
    stop: Option<f64>,

    /// Save the expanded scenario (.json or .msgpack) instead of running it
    #[arg(long, global = true)]
    save: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Three point-to-point spokes around a router
    First,
    /// A point-to-point chain with a CSMA bus
    Second {
        /// Extra CSMA nodes
        #[arg(long, default_value_t = 2)]
        n_csma: usize,
    },
    /// A Wi-Fi cell, a point-to-point link and a CSMA bus
    Third {
        /// Extra CSMA nodes
        #[arg(long, default_value_t = 3)]
        n_csma: usize,
        /// Wi-Fi stations
        #[arg(long, default_value_t = 3)]
        n_wifi: usize,
    },
    /// Three Wi-Fi cells joined by a CSMA bus
    Cells,
    /// Four fixed stations around an access point
    WifiFixed {
        /// Distance of each station from the access point, in meters
        #[arg(long, default_value_t = 115.0)]
        x_distance: f64,
        /// Radio range, in meters
        #[arg(long)]
        range: Option<f64>,
    },
    /// A scenario file (.json, .dhall or .msgpack)
    Run { path: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut scenario = match &args.command {
        Command::First => First.scenario()?,
        Command::Second { n_csma } => Second::builder().n_csma(*n_csma).build().scenario()?,
        Command::Third { n_csma, n_wifi } => Third::builder()
            .n_csma(*n_csma)
            .n_wifi(*n_wifi)
            .build()
            .scenario()?,
        Command::Cells => Cells.scenario()?,
        Command::WifiFixed { x_distance, range } => WifiFixed {
            distance: *x_distance,
            radio_range: *range,
        }
        .scenario()?,
        Command::Run { path } => netsim_utils::read_scenario(path)?,
    };
    if let Some(seed) = args.seed {
        scenario.opts.seed = seed;
    }
    if let Some(stop) = args.stop {
        scenario.stop = stop;
    }
    if let Some(path) = &args.save {
        netsim_utils::write_scenario(&scenario, path)?;
        log::info!("saved scenario `{}` to {}", scenario.name, path.display());
        return Ok(());
    }

    let mut sim = match &args.trace {
        Some(path) => {
            let out = File::create(path)
                .with_context(|| format!("cannot create trace file {}", path.display()))?;
            let out = BufWriter::new(out);
            scenario.build_with_trace(AsciiTrace::new(out))?
        }
        None => scenario.build_with_trace(NoopTrace)?,
    };
    run(&scenario, &mut sim)
}

fn run(scenario: &Scenario, sim: &mut Simulation) -> anyhow::Result<()> {
    println!("Scenario {}", scenario.name);
    print!("{}", report::addresses(sim.topology()));
    print!("{}", report::locations(sim));
    if !scenario.watch.is_empty() {
        let watch = scenario.watch.clone();
        sim.on_course_change(move |change| {
            if watch.contains(&change.node) {
                println!("{}", report::course_change(change));
            }
        })?;
    }
    let summary = sim.run(scenario.stop_time()?)?;
    print!("{}", report::locations(sim));
    println!("{summary}");
    sim.destroy()?;
    Ok(())
}
