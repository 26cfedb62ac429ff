//! Agents and their per-cycle behavior.
//!
//! An agent is a plain record; behavior lives in free functions that take an
//! explicit territory view, so the same code runs identically on any owner.

use crate::territory::Territory;
use crate::{IdAllocator, SimulationConfig};

/// One mobile entity. Position is global; exactly one owner holds the agent
/// at any instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Agent {
    pub id: u64,
    pub x: i32,
    pub y: i32,
    pub energy: f32,
}

impl Agent {
    #[must_use]
    pub const fn new(id: u64, x: i32, y: i32, energy: f32) -> Self {
        Self { id, x, y, energy }
    }
}

/// Fixed Moore-neighborhood scan order. Ties keep the earlier candidate, so
/// this order is part of the model's observable behavior.
const MOORE: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Sentinel that loses to any real cell during neighbor scans.
const NO_RESOURCE: f32 = -1.0;

/// Runs the synthetic decision workload and charges its energy cost.
///
/// The iteration count scales with the local resource up to a hard cap; the
/// arithmetic goes through `black_box` so the load is not optimized away.
pub fn execute_load(agent: &mut Agent, local_resource: f32, config: &SimulationConfig) {
    let iterations = ((local_resource * config.workload_factor) as u32).min(config.workload_cap);
    let mut scratch = 0.0_f64;
    for i in 0..iterations {
        let x = f64::from(i);
        scratch += std::hint::black_box(x.sin() * x.cos());
    }
    std::hint::black_box(scratch);
    agent.energy -= config.metabolic_cost + iterations as f32 * config.effort_rate;
}

/// Picks the agent's destination for this cycle.
///
/// The default is the current position. Each Moore neighbor replaces the
/// best candidate only when it is accessible and holds strictly more
/// resource. Neighbors one row outside the strip resolve against the halo
/// rows when present; anything else outside the visible area is skipped.
#[must_use]
pub fn decide(agent: &Agent, territory: &Territory) -> (i32, i32) {
    let (lx, ly) = territory.to_local(agent.x, agent.y);
    let mut best = territory.resource_at(lx, ly).unwrap_or(NO_RESOURCE);
    let mut dest = (agent.x, agent.y);
    for (dx, dy) in MOORE {
        let Some(cell) = territory.visible_cell(lx + dx, ly + dy) else {
            continue;
        };
        if cell.accessible && cell.resource > best {
            best = cell.resource;
            dest = (agent.x + dx, agent.y + dy);
        }
    }
    dest
}

/// Draws resource from the agent's cell and converts it to energy.
///
/// Returns the amount actually consumed. Agents positioned outside the
/// owning strip (already classified for migration) consume nothing.
pub fn consume(agent: &mut Agent, territory: &Territory, config: &SimulationConfig) -> f32 {
    let (lx, ly) = territory.to_local(agent.x, agent.y);
    let Some(available) = territory.resource_at(lx, ly) else {
        return 0.0;
    };
    let drawn = config.consumption_request.min(available);
    territory.register_consumption(lx, ly, drawn);
    agent.energy += drawn * config.consumption_efficiency;
    drawn
}

/// Attempts to spawn a child next to the parent.
///
/// Requires `energy > reproduction_threshold` and an accessible neighbor
/// cell inside the strip (halo rows are deliberately not consulted: newborn
/// cross-strip placement is undefined in this protocol). The child receives
/// `energy * reproduction_fraction`, deducted exactly from the parent.
pub fn reproduce(
    agent: &mut Agent,
    territory: &Territory,
    config: &SimulationConfig,
    ids: &IdAllocator,
) -> Option<Agent> {
    if agent.energy <= config.reproduction_threshold {
        return None;
    }
    let (lx, ly) = territory.to_local(agent.x, agent.y);
    let mut best = NO_RESOURCE;
    let mut cradle = None;
    for (dx, dy) in MOORE {
        let Some(cell) = territory.strip_cell(lx + dx, ly + dy) else {
            continue;
        };
        if cell.accessible && cell.resource > best {
            best = cell.resource;
            cradle = Some((agent.x + dx, agent.y + dy));
        }
    }
    let (cx, cy) = cradle?;
    let transferred = agent.energy * config.reproduction_fraction;
    agent.energy -= transferred;
    Some(Agent::new(ids.allocate(), cx, cy, transferred))
}
