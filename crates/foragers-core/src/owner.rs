//! One owner: a strip of the territory, its agent population, and the
//! cycle orchestrator that drives both through a synchronized cycle.

use crate::agent::{self, Agent};
use crate::link::{ExchangeError, NeighborLink, exchange_halos, migrate};
use crate::metrics::CycleMetrics;
use crate::territory::{RowPlacement, Territory};
use crate::{IdAllocator, Season, SimulationConfig};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use std::sync::Arc;

/// Thread-local result of processing a slice of the population.
///
/// Rayon folds one of these per worker and merges them once per worker,
/// so the merge and the cell consumption accumulator are the only
/// synchronization points in agent processing.
#[derive(Debug, Default)]
struct CycleOutcome {
    stayed: Vec<Agent>,
    migrate_up: Vec<Agent>,
    migrate_down: Vec<Agent>,
    births: usize,
    deaths: usize,
}

impl CycleOutcome {
    fn merge(mut self, other: Self) -> Self {
        self.stayed.extend(other.stayed);
        self.migrate_up.extend(other.migrate_up);
        self.migrate_down.extend(other.migrate_down);
        self.births += other.births;
        self.deaths += other.deaths;
        self
    }
}

/// One rank in the 1-D owner chain.
#[derive(Debug)]
pub struct Owner {
    rank: usize,
    config: Arc<SimulationConfig>,
    territory: Territory,
    population: Vec<Agent>,
    season: Season,
    ids: IdAllocator,
    up: Option<NeighborLink>,
    down: Option<NeighborLink>,
}

impl Owner {
    /// Builds an owner for `rank`: initializes its strip for the starting
    /// season and seeds its share of the starting population at random
    /// in-strip positions.
    #[must_use]
    pub fn new(
        rank: usize,
        config: Arc<SimulationConfig>,
        up: Option<NeighborLink>,
        down: Option<NeighborLink>,
    ) -> Self {
        let width = config.grid_width as usize;
        let strip_height = config.strip_height() as usize;
        let offset_y = config.strip_offset(rank);
        let mut territory = Territory::new(width, strip_height, 0, offset_y);
        let season = Season::default();
        territory.initialize(&config, season);

        let ids = IdAllocator::new(rank, config.owners);
        let mut rng = SmallRng::seed_from_u64(config.rng_seed.wrapping_add(rank as u64));
        let base = config.initial_agents / config.owners;
        let extra = usize::from(rank < config.initial_agents % config.owners);
        let mut population = Vec::with_capacity(base + extra);
        for _ in 0..base + extra {
            let x = rng.random_range(0..config.grid_width) as i32;
            let y = offset_y + rng.random_range(0..strip_height as u32) as i32;
            population.push(Agent::new(ids.allocate(), x, y, config.initial_energy));
        }

        Self {
            rank,
            config,
            territory,
            population,
            season,
            ids,
            up,
            down,
        }
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[must_use]
    pub fn season(&self) -> Season {
        self.season
    }

    #[must_use]
    pub fn territory(&self) -> &Territory {
        &self.territory
    }

    #[must_use]
    pub fn territory_mut(&mut self) -> &mut Territory {
        &mut self.territory
    }

    #[must_use]
    pub fn population(&self) -> &[Agent] {
        &self.population
    }

    /// Replaces the population, used to stage scenarios.
    pub fn set_population(&mut self, population: Vec<Agent>) {
        self.population = population;
    }

    /// Runs one synchronized simulation cycle and returns this owner's
    /// local metrics, measured before the resource update.
    ///
    /// The caller provides the global cycle counter; all owners must call
    /// this in lockstep (the run loop's barrier guarantees it), otherwise
    /// the independently computed season transitions would diverge.
    pub fn run_cycle(&mut self, cycle: u32) -> Result<CycleMetrics, ExchangeError> {
        if cycle > 0 && cycle.is_multiple_of(self.config.seasonal_period) {
            self.season = self.season.toggled();
            self.territory.update_accessibility(self.season);
        }

        // Halos must be this cycle's before any agent looks across the edge.
        exchange_halos(&mut self.territory, self.up.as_ref(), self.down.as_ref())?;

        let outcome = self.process_agents();
        let births = outcome.births;
        let deaths = outcome.deaths;
        let migrated = outcome.migrate_up.len() + outcome.migrate_down.len();

        self.population = outcome.stayed;
        let (from_up, from_down) = migrate(
            self.up.as_ref(),
            self.down.as_ref(),
            &outcome.migrate_up,
            &outcome.migrate_down,
        )?;
        self.population.extend(from_up);
        self.population.extend(from_down);

        let cells = (self.territory.width() * self.territory.height()) as f64;
        let metrics = CycleMetrics {
            population: self.population.len(),
            total_resource: self.territory.total_resource(),
            pending_consumption: self.territory.total_pending_consumption(),
            regeneration: f64::from(self.config.regeneration(self.season)) * cells,
            migrated,
            births,
            deaths,
        };

        self.territory.update_resources(&self.config, self.season);
        Ok(metrics)
    }

    /// Processes every agent in parallel, order-independently.
    ///
    /// Per agent: synthetic load, death check, movement decision, then
    /// classification. Only agents staying local consume and reproduce; an
    /// agent bound for a neighbor keeps its energy untouched until the
    /// destination owner processes it next cycle.
    fn process_agents(&mut self) -> CycleOutcome {
        let territory = &self.territory;
        let config = &*self.config;
        let ids = &self.ids;
        std::mem::take(&mut self.population)
            .into_par_iter()
            .fold(CycleOutcome::default, |mut acc, mut agent| {
                let (lx, ly) = territory.to_local(agent.x, agent.y);
                let local_resource = territory.resource_at(lx, ly).unwrap_or(0.0);
                agent::execute_load(&mut agent, local_resource, config);
                if agent.energy <= 0.0 {
                    acc.deaths += 1;
                    return acc;
                }

                let (dx, dy) = agent::decide(&agent, territory);
                agent.x = dx;
                agent.y = dy;
                match territory.classify_row(agent.y) {
                    RowPlacement::Above => acc.migrate_up.push(agent),
                    RowPlacement::Below => acc.migrate_down.push(agent),
                    RowPlacement::Inside => {
                        agent::consume(&mut agent, territory, config);
                        if let Some(child) = agent::reproduce(&mut agent, territory, config, ids) {
                            acc.births += 1;
                            acc.stayed.push(child);
                        }
                        acc.stayed.push(agent);
                    }
                }
                acc
            })
            .reduce(CycleOutcome::default, CycleOutcome::merge)
    }
}
