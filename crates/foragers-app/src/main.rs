//! Command-line entry point: runs a full simulation with the stock
//! configuration and logs one line per cycle.

use anyhow::Context;
use foragers_core::{CycleReport, SimulationConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = SimulationConfig::default();
    info!(
        width = config.grid_width,
        height = config.grid_height,
        owners = config.owners,
        cycles = config.total_cycles,
        agents = config.initial_agents,
        seed = config.rng_seed,
        "starting simulation"
    );

    let reports = foragers_core::run(config, log_cycle).context("simulation run failed")?;

    if let Some(last) = reports.last() {
        info!(
            cycles = reports.len(),
            population = last.population,
            migrated_total = last.migrated_total,
            total_resource = last.total_resource,
            "simulation complete"
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_cycle(report: &CycleReport) {
    info!(
        cycle = report.cycle,
        season = %report.season,
        population = report.population,
        births = report.births,
        deaths = report.deaths,
        migrated = report.migrated,
        total_resource = report.total_resource,
        mean_resource = report.mean_resource,
        sustainable = report.sustainable,
        "cycle complete"
    );
}
