//! powsimd: run a proof-of-work network simulation from a configuration
//! file and an optional workload schedule.

use std::path::PathBuf;

use gumdrop::Options;
use tracing::info;
use tracing_subscriber::EnvFilter;

use powsimd::{Config, Simulation};

#[derive(Debug, Options)]
struct Args {
    /// print this help message
    help: bool,

    /// path to the simulation configuration file (TOML)
    #[options(meta = "FILE")]
    config: Option<PathBuf>,

    /// override the simulation time limit, in seconds
    #[options(meta = "SECONDS")]
    limit: Option<u64>,
}

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse_args_default_or_exit();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(limit) = args.limit {
        config.sim_time_limit = limit;
    }

    info!(
        nodes = config.num_nodes,
        limit = config.sim_time_limit,
        "starting simulation"
    );
    let mut simulation = Simulation::new(config);
    simulation.run()?;
    info!(now = simulation.now(), "simulation complete");
    Ok(())
}
