//! Core library for the seasonal foragers simulation.
//!
//! A global `W x H` territory grid is partitioned into horizontal strips,
//! one per owner. Owners run in lockstep cycles and communicate only by
//! message passing: boundary (halo) rows are exchanged once per cycle, and
//! agents whose movement decision crosses a strip boundary are migrated to
//! the neighboring owner through a two-phase count-then-payload protocol.
//! Within an owner, grid updates and agent processing are data-parallel.

pub mod agent;
pub mod link;
pub mod metrics;
pub mod owner;
pub mod sim;
pub mod territory;
pub mod wire;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub use agent::Agent;
pub use link::{ExchangeError, NeighborLink};
pub use metrics::{CycleMetrics, CycleReport};
pub use owner::Owner;
pub use sim::run;
pub use territory::{CellRecord, Terrain, Territory};

/// Global season, toggled every fixed number of cycles.
///
/// Every owner computes the season transition independently from the shared
/// cycle counter; the per-cycle barrier keeps the counters in lockstep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    #[default]
    Dry,
    Flood,
}

impl Season {
    /// Returns the opposite season.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Dry => Self::Flood,
            Self::Flood => Self::Dry,
        }
    }

    /// Season in effect at `cycle` for a given seasonal period length.
    ///
    /// Runs always start dry; the season flips at every multiple of `period`.
    #[must_use]
    pub const fn at_cycle(cycle: u32, period: u32) -> Self {
        if period == 0 {
            return Self::Dry;
        }
        if (cycle / period) % 2 == 0 {
            Self::Dry
        } else {
            Self::Flood
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dry => f.write_str("dry"),
            Self::Flood => f.write_str("flood"),
        }
    }
}

/// Errors raised while constructing or running a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Rejected before any state is allocated.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// An owner aborted mid-protocol; the whole run is torn down.
    #[error("owner {rank} failed during cycle {cycle}: {source}")]
    OwnerFailed {
        rank: usize,
        cycle: u32,
        #[source]
        source: ExchangeError,
    },
    /// An owner thread panicked.
    #[error("owner {rank} panicked")]
    OwnerPanicked { rank: usize },
}

/// Hands out agent ids that are unique across every owner.
///
/// Each owner starts at its own rank and strides by the owner count, so no
/// coordination is needed when children are spawned concurrently.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
    stride: u64,
}

impl IdAllocator {
    #[must_use]
    pub fn new(rank: usize, owners: usize) -> Self {
        Self {
            next: AtomicU64::new(rank as u64),
            stride: owners.max(1) as u64,
        }
    }

    /// Returns a fresh globally unique id.
    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(self.stride, Ordering::Relaxed)
    }
}

/// Static configuration for one run.
///
/// Constructed once, validated before any state is allocated, and passed
/// explicitly into every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Width of the global grid in cells.
    pub grid_width: u32,
    /// Height of the global grid in cells; must be divisible by `owners`.
    pub grid_height: u32,
    /// Number of strip owners arranged in a 1-D chain.
    pub owners: usize,
    /// Total simulation cycles to run.
    pub total_cycles: u32,
    /// Cycles between season toggles.
    pub seasonal_period: u32,
    /// Agents created at start-up, split across owners.
    pub initial_agents: usize,
    /// Energy assigned to each starting agent.
    pub initial_energy: f32,
    /// Fixed amount one agent requests from its cell per cycle.
    pub consumption_request: f32,
    /// Fraction of consumed resource converted to agent energy.
    pub consumption_efficiency: f32,
    /// Scale from local resource to synthetic workload iterations.
    pub workload_factor: f32,
    /// Upper bound on synthetic workload iterations.
    pub workload_cap: u32,
    /// Fixed metabolic energy cost per cycle.
    pub metabolic_cost: f32,
    /// Energy cost per workload iteration.
    pub effort_rate: f32,
    /// Energy an agent must exceed before it may reproduce.
    pub reproduction_threshold: f32,
    /// Fraction of the parent's energy transferred to a child.
    pub reproduction_fraction: f32,
    /// Village cells sit where both global coordinates divide this modulus.
    pub village_modulus: u32,
    /// Fishing cells run along columns divisible by this modulus.
    pub fishing_modulus: u32,
    /// Fallow cells run along rows divisible by this modulus.
    pub fallow_modulus: u32,
    /// Resource capacity of village cells.
    pub capacity_village: f32,
    /// Resource capacity of fishing cells.
    pub capacity_fishing: f32,
    /// Resource capacity of gathering cells.
    pub capacity_gathering: f32,
    /// Resource capacity of fallow cells.
    pub capacity_fallow: f32,
    /// Per-cell regeneration rate in the flood season.
    pub regeneration_flood: f32,
    /// Per-cell regeneration rate in the dry season; may be negative.
    pub regeneration_dry: f32,
    /// Seed for the deterministic placement of starting agents.
    pub rng_seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid_width: 1_000,
            grid_height: 1_000,
            owners: 4,
            total_cycles: 20,
            seasonal_period: 4,
            initial_agents: 10_000,
            initial_energy: 20.0,
            consumption_request: 5.0,
            consumption_efficiency: 0.4,
            workload_factor: 100.0,
            workload_cap: 10_000,
            metabolic_cost: 2.0,
            effort_rate: 0.002,
            reproduction_threshold: 25.0,
            reproduction_fraction: 0.3,
            village_modulus: 10,
            fishing_modulus: 5,
            fallow_modulus: 4,
            capacity_village: 25.0,
            capacity_fishing: 15.0,
            capacity_gathering: 10.0,
            capacity_fallow: 20.0,
            regeneration_flood: 0.1,
            regeneration_dry: 0.05,
            rng_seed: 42,
        }
    }
}

impl SimulationConfig {
    /// Validates the configuration before any state is allocated.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(SimulationError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        if self.owners == 0 {
            return Err(SimulationError::InvalidConfig(
                "owner count must be non-zero",
            ));
        }
        if !(self.grid_height as usize).is_multiple_of(self.owners) {
            return Err(SimulationError::InvalidConfig(
                "owner count must evenly divide grid height",
            ));
        }
        if self.total_cycles == 0 {
            return Err(SimulationError::InvalidConfig(
                "total_cycles must be non-zero",
            ));
        }
        if self.seasonal_period == 0 {
            return Err(SimulationError::InvalidConfig(
                "seasonal_period must be non-zero",
            ));
        }
        if self.village_modulus == 0 || self.fishing_modulus == 0 || self.fallow_modulus == 0 {
            return Err(SimulationError::InvalidConfig(
                "terrain moduli must be non-zero",
            ));
        }
        if self.initial_energy <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "initial_energy must be positive",
            ));
        }
        if self.consumption_request < 0.0
            || self.consumption_efficiency < 0.0
            || self.workload_factor < 0.0
            || self.metabolic_cost < 0.0
            || self.effort_rate < 0.0
            || self.reproduction_threshold < 0.0
        {
            return Err(SimulationError::InvalidConfig(
                "energy and consumption constants must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.reproduction_fraction) {
            return Err(SimulationError::InvalidConfig(
                "reproduction_fraction must be between 0.0 and 1.0",
            ));
        }
        if self.capacity_village < 0.0
            || self.capacity_fishing < 0.0
            || self.capacity_gathering < 0.0
            || self.capacity_fallow < 0.0
        {
            return Err(SimulationError::InvalidConfig(
                "terrain capacities must be non-negative",
            ));
        }
        Ok(())
    }

    /// Rows held by each owner.
    #[must_use]
    pub fn strip_height(&self) -> u32 {
        self.grid_height / self.owners as u32
    }

    /// First global row of owner `rank`'s strip.
    #[must_use]
    pub fn strip_offset(&self, rank: usize) -> i32 {
        (rank as u32 * self.strip_height()) as i32
    }

    /// Terrain type as a deterministic pure function of global coordinates.
    ///
    /// Every owner computes the same terrain independently, so terrain is
    /// never transmitted.
    #[must_use]
    pub fn terrain_at(&self, gx: i32, gy: i32) -> Terrain {
        let village = self.village_modulus as i32;
        let fishing = self.fishing_modulus as i32;
        let fallow = self.fallow_modulus as i32;
        if gx.rem_euclid(village) == 0 && gy.rem_euclid(village) == 0 {
            Terrain::Village
        } else if gx.rem_euclid(fishing) == 0 {
            Terrain::Fishing
        } else if gy.rem_euclid(fallow) == 0 {
            Terrain::Fallow
        } else {
            Terrain::Gathering
        }
    }

    /// Maximum resource a cell of the given terrain can hold.
    #[must_use]
    pub fn capacity(&self, terrain: Terrain) -> f32 {
        match terrain {
            Terrain::Village => self.capacity_village,
            Terrain::Fishing => self.capacity_fishing,
            Terrain::Gathering => self.capacity_gathering,
            Terrain::Fallow => self.capacity_fallow,
            Terrain::Forbidden => 0.0,
        }
    }

    /// Per-cell regeneration rate for the given season.
    #[must_use]
    pub fn regeneration(&self, season: Season) -> f32 {
        match season {
            Season::Flood => self.regeneration_flood,
            Season::Dry => self.regeneration_dry,
        }
    }
}
