//! Simulation kernel CLI
//!
//! Runs a model saved as a JSON model record, or a built-in demo model.
//!
//! # Example
//!
//! ```bash
//! # Write the demo model, then run it with three replications
//! simkernel demo --save shop.json
//! simkernel run shop.json --replications 3 --seed 42
//!
//! # Trace every event to stderr
//! RUST_LOG=simkernel_core=debug simkernel run shop.json --trace --trace-level event
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use simkernel_core::{
    Component, Create, Delay, Dispose, Model, ModelRecord, Process, Record, SeizableItem, Seize, Simulation,
    TimeUnit, TraceLevel, TracingSink,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Discrete-event simulation kernel
#[derive(Parser, Debug)]
#[command(name = "simkernel")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a model record
    Run {
        /// Model record (JSON)
        model: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Run the built-in single-machine shop
    Demo {
        /// Write the demo model record here instead of running it
        #[arg(long)]
        save: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Settings that replace the model record's own configuration
#[derive(clap::Args, Debug)]
struct Overrides {
    /// Number of replications
    #[arg(short = 'r', long)]
    replications: Option<u32>,

    /// Replication length, in the model's time unit
    #[arg(short = 'l', long)]
    length: Option<f64>,

    /// Warm-up period, in the model's time unit
    #[arg(short = 'w', long)]
    warm_up: Option<f64>,

    /// Base random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Most verbose trace level forwarded to the log
    #[arg(long, value_enum)]
    trace_level: Option<Level>,

    /// Forward trace records to the log
    #[arg(long)]
    trace: bool,

    /// Print the dispatch-sequence digest of the run
    #[arg(long)]
    digest: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Level {
    Fatal,
    Results,
    Recover,
    Warning,
    Event,
    Arrival,
    Internal,
    Detailed,
}

impl From<Level> for TraceLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Fatal => TraceLevel::ErrorFatal,
            Level::Results => TraceLevel::Results,
            Level::Recover => TraceLevel::ErrorRecover,
            Level::Warning => TraceLevel::Warning,
            Level::Event => TraceLevel::Event,
            Level::Arrival => TraceLevel::Arrival,
            Level::Internal => TraceLevel::Internal,
            Level::Detailed => TraceLevel::Detailed,
        }
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,simkernel_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Run { model, overrides } => {
            let json = std::fs::read_to_string(&model).with_context(|| format!("reading {}", model.display()))?;
            let record = ModelRecord::from_json(&json).with_context(|| format!("parsing {}", model.display()))?;
            let model = Model::load(&record).context("loading model")?;
            run(model, &overrides)
        }
        Command::Demo { save, overrides } => {
            let model = demo_model().context("building demo model")?;
            match save {
                Some(path) => {
                    let json = model.save(false).to_json()?;
                    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "demo model saved");
                    Ok(())
                }
                None => run(model, &overrides),
            }
        }
    }
}

fn run(mut model: Model, overrides: &Overrides) -> Result<()> {
    let config = &mut model.config;
    if let Some(replications) = overrides.replications {
        config.number_of_replications = replications;
    }
    if let Some(length) = overrides.length {
        config.replication_length = length;
    }
    if let Some(warm_up) = overrides.warm_up {
        config.warm_up_period = warm_up;
    }
    if let Some(seed) = overrides.seed {
        config.rng_seed = seed;
    }
    if let Some(level) = overrides.trace_level {
        config.trace_level = level.into();
    }

    let mut simulation = Simulation::new(model)?;
    if overrides.trace {
        simulation.add_trace_sink(Box::new(TracingSink));
    }
    if overrides.digest {
        simulation.enable_event_log();
    }
    simulation.start()?;

    println!("{}", simulation.report());
    if overrides.digest {
        let Some(log) = simulation.event_log() else {
            bail!("event log was not kept");
        };
        println!("dispatch digest: {}", log.digest());
    }
    Ok(())
}

/// One machine, exponential arrivals, departure times recorded
fn demo_model() -> simkernel_core::SimResult<Model> {
    let mut model = Model::new("single machine shop");
    model.config.replication_length = 480.0;
    model.config.warm_up_period = 60.0;
    model.config.time_unit = TimeUnit::Minute;
    model.config.number_of_replications = 5;

    let machine = model.new_resource("Machine", 1)?;
    let departures = model.new_statistics("Part.DepartureTime")?;

    let arrivals = model.insert_component(
        "Arrivals",
        Component::Create(Create::new("Part", "expo(5)", TimeUnit::Minute)),
    )?;
    let machining = model.insert_component(
        "Machining",
        Component::Process(Process::new(
            Seize::new(vec![SeizableItem::resource(machine)]),
            Delay::new("tria(2,4,6)", TimeUnit::Minute),
        )),
    )?;
    let record = model.insert_component("Record Departure", Component::Record(Record::new("tnow", departures)))?;
    let exit = model.insert_component("Exit", Component::Dispose(Dispose))?;

    model.connect(arrivals, machining)?;
    model.connect(machining, record)?;
    model.connect(record, exit)?;
    Ok(model)
}
