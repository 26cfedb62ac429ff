//! Per-owner cycle metrics and their reduction at the coordinating owner.

use crate::Season;
use serde::{Deserialize, Serialize};

/// Scalars one owner measures at the end of a cycle, before the resource
/// update invalidates them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleMetrics {
    /// Agents owned after migration consolidated.
    pub population: usize,
    /// Sum of all cell resources in the strip.
    pub total_resource: f64,
    /// Consumption accumulated this cycle, not yet applied.
    pub pending_consumption: f64,
    /// Regeneration that will be applied this cycle (rate x cell count).
    pub regeneration: f64,
    /// Agents this owner sent to neighbors this cycle.
    pub migrated: usize,
    /// Children born this cycle.
    pub births: usize,
    /// Agents that ran out of energy this cycle.
    pub deaths: usize,
}

/// Globally reduced view of one cycle, assembled by the coordinating owner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u32,
    pub season: Season,
    /// Total population across all owners.
    pub population: usize,
    /// Smallest single-owner population.
    pub min_population: usize,
    /// Largest single-owner population.
    pub max_population: usize,
    pub births: usize,
    pub deaths: usize,
    /// Agents that crossed a strip boundary this cycle.
    pub migrated: usize,
    /// Boundary crossings since the start of the run.
    pub migrated_total: u64,
    pub total_resource: f64,
    /// Mean resource per cell over the whole grid.
    pub mean_resource: f64,
    /// Whether regeneration covered consumption this cycle.
    pub sustainable: bool,
}

/// Combined reduction over every owner's metrics: sums for the summable
/// scalars plus separate max/min population extremes.
#[must_use]
pub fn reduce(
    cycle: u32,
    season: Season,
    per_owner: &[CycleMetrics],
    total_cells: u64,
    migrated_before: u64,
) -> CycleReport {
    let mut population = 0usize;
    let mut min_population = usize::MAX;
    let mut max_population = 0usize;
    let mut births = 0usize;
    let mut deaths = 0usize;
    let mut migrated = 0usize;
    let mut total_resource = 0.0f64;
    let mut consumption = 0.0f64;
    let mut regeneration = 0.0f64;

    for metrics in per_owner {
        population += metrics.population;
        min_population = min_population.min(metrics.population);
        max_population = max_population.max(metrics.population);
        births += metrics.births;
        deaths += metrics.deaths;
        migrated += metrics.migrated;
        total_resource += metrics.total_resource;
        consumption += metrics.pending_consumption;
        regeneration += metrics.regeneration;
    }
    if per_owner.is_empty() {
        min_population = 0;
    }

    CycleReport {
        cycle,
        season,
        population,
        min_population,
        max_population,
        births,
        deaths,
        migrated,
        migrated_total: migrated_before + migrated as u64,
        total_resource,
        mean_resource: if total_cells == 0 {
            0.0
        } else {
            total_resource / total_cells as f64
        },
        sustainable: regeneration >= consumption,
    }
}
