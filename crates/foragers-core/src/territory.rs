//! Strip-local territory grid: terrain, resources, accessibility, and the
//! per-cycle consumption accumulators.
//!
//! Each owner holds one contiguous strip of the global grid in row-major
//! structure-of-arrays layout, plus at most one received halo row above and
//! one below. Halo rows are private copies of a neighbor's boundary row,
//! never references into another owner's memory.

use crate::{Season, SimulationConfig};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Terrain type of one cell, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terrain {
    Village,
    Fishing,
    Gathering,
    Fallow,
    Forbidden,
}

impl Terrain {
    /// Whether cells of this terrain can be entered during `season`.
    ///
    /// Forbidden cells are never accessible; gathering cells flood over.
    #[must_use]
    pub const fn accessible(self, season: Season) -> bool {
        match self {
            Self::Forbidden => false,
            Self::Gathering => !matches!(season, Season::Flood),
            _ => true,
        }
    }

    /// Wire tag used by the halo serialization.
    #[must_use]
    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::Village => 0,
            Self::Fishing => 1,
            Self::Gathering => 2,
            Self::Fallow => 3,
            Self::Forbidden => 4,
        }
    }

    #[must_use]
    pub(crate) const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Village),
            1 => Some(Self::Fishing),
            2 => Some(Self::Gathering),
            3 => Some(Self::Fallow),
            4 => Some(Self::Forbidden),
            _ => None,
        }
    }
}

/// Flat copy of one cell, the unit of halo transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRecord {
    pub terrain: Terrain,
    pub resource: f32,
    pub consumed: f32,
    pub accessible: bool,
}

/// What an agent sees when it evaluates a cell as a movement candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellView {
    pub resource: f32,
    pub accessible: bool,
}

/// Where a global row falls relative to an owner's strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowPlacement {
    /// Inside the strip; the agent stays local.
    Inside,
    /// Above the strip; the agent migrates to the previous rank.
    Above,
    /// Below the strip; the agent migrates to the next rank.
    Below,
}

/// One owner's strip of the global grid.
///
/// Columns are dense row-major vectors indexed `y * width + x` in local
/// coordinates (`local = global - offset`). The consumption accumulator is
/// an atomic so concurrently processed agents can add to the same cell
/// without lost updates.
#[derive(Debug)]
pub struct Territory {
    width: usize,
    height: usize,
    offset_x: i32,
    offset_y: i32,
    terrain: Vec<Terrain>,
    resource: Vec<f32>,
    consumed: Vec<AtomicU32>,
    accessible: Vec<bool>,
    halo_above: Option<Vec<CellRecord>>,
    halo_below: Option<Vec<CellRecord>>,
}

impl Territory {
    /// Allocates an uninitialized strip at the given global offset.
    #[must_use]
    pub fn new(width: usize, height: usize, offset_x: i32, offset_y: i32) -> Self {
        let cells = width * height;
        let mut consumed = Vec::with_capacity(cells);
        consumed.resize_with(cells, || AtomicU32::new(0));
        Self {
            width,
            height,
            offset_x,
            offset_y,
            terrain: vec![Terrain::Gathering; cells],
            resource: vec![0.0; cells],
            consumed,
            accessible: vec![false; cells],
            halo_above: None,
            halo_below: None,
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Global coordinates of the strip's first cell.
    #[must_use]
    pub const fn offset(&self) -> (i32, i32) {
        (self.offset_x, self.offset_y)
    }

    /// Maps global coordinates into the strip's local frame.
    #[must_use]
    pub const fn to_local(&self, gx: i32, gy: i32) -> (i32, i32) {
        (gx - self.offset_x, gy - self.offset_y)
    }

    /// Classifies a global row against the strip bounds.
    #[must_use]
    pub fn classify_row(&self, gy: i32) -> RowPlacement {
        if gy < self.offset_y {
            RowPlacement::Above
        } else if gy >= self.offset_y + self.height as i32 {
            RowPlacement::Below
        } else {
            RowPlacement::Inside
        }
    }

    fn index_of(&self, lx: i32, ly: i32) -> Option<usize> {
        if lx >= 0 && (lx as usize) < self.width && ly >= 0 && (ly as usize) < self.height {
            Some(ly as usize * self.width + lx as usize)
        } else {
            None
        }
    }

    /// Initializes every cell from its global coordinates.
    ///
    /// Fully data-parallel; each cell's terrain, starting resource, and
    /// accessibility depend only on its own position and the season.
    pub fn initialize(&mut self, config: &SimulationConfig, season: Season) {
        let width = self.width;
        let (ox, oy) = (self.offset_x, self.offset_y);
        (
            self.terrain.par_iter_mut(),
            self.resource.par_iter_mut(),
            self.accessible.par_iter_mut(),
            self.consumed.par_iter_mut(),
        )
            .into_par_iter()
            .enumerate()
            .for_each(|(idx, (terrain, resource, accessible, consumed))| {
                let gx = ox + (idx % width) as i32;
                let gy = oy + (idx / width) as i32;
                let kind = config.terrain_at(gx, gy);
                *terrain = kind;
                *resource = config.capacity(kind);
                *accessible = kind.accessible(season);
                *consumed.get_mut() = 0;
            });
    }

    /// Recomputes every accessible flag for a new season.
    pub fn update_accessibility(&mut self, season: Season) {
        (self.terrain.par_iter(), self.accessible.par_iter_mut())
            .into_par_iter()
            .for_each(|(terrain, accessible)| {
                *accessible = terrain.accessible(season);
            });
    }

    /// Applies regeneration and the accumulated consumption to every cell,
    /// clamping to `[0, capacity]`, then resets the accumulators.
    pub fn update_resources(&mut self, config: &SimulationConfig, season: Season) {
        let regeneration = config.regeneration(season);
        (
            self.terrain.par_iter(),
            self.resource.par_iter_mut(),
            self.consumed.par_iter_mut(),
        )
            .into_par_iter()
            .for_each(|(terrain, resource, consumed)| {
                let spent = f32::from_bits(std::mem::take(consumed.get_mut()));
                let capacity = config.capacity(*terrain);
                *resource = (*resource + regeneration - spent).clamp(0.0, capacity);
            });
    }

    /// Thread-safe add to a cell's consumption accumulator.
    ///
    /// Concurrent callers targeting the same cell must all land; the sum is
    /// built with a compare-exchange loop over the f32 bit pattern so no
    /// update is lost. Out-of-strip positions are ignored.
    pub fn register_consumption(&self, lx: i32, ly: i32, amount: f32) {
        let Some(idx) = self.index_of(lx, ly) else {
            return;
        };
        let cell = &self.consumed[idx];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + amount).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Cell view inside the strip only; `None` for anything outside.
    #[must_use]
    pub fn strip_cell(&self, lx: i32, ly: i32) -> Option<CellView> {
        let idx = self.index_of(lx, ly)?;
        Some(CellView {
            resource: self.resource[idx],
            accessible: self.accessible[idx],
        })
    }

    /// Cell view inside the strip or one of the present halo rows.
    ///
    /// Halo rows cover local row `-1` (above) and `height` (below) and are
    /// read using only the local x index; everything further out is simply
    /// not visible.
    #[must_use]
    pub fn visible_cell(&self, lx: i32, ly: i32) -> Option<CellView> {
        if lx < 0 || lx as usize >= self.width {
            return None;
        }
        if let Some(view) = self.strip_cell(lx, ly) {
            return Some(view);
        }
        let halo = if ly == -1 {
            self.halo_above.as_ref()
        } else if ly == self.height as i32 {
            self.halo_below.as_ref()
        } else {
            None
        };
        halo.map(|row| {
            let cell = &row[lx as usize];
            CellView {
                resource: cell.resource,
                accessible: cell.accessible,
            }
        })
    }

    /// Resource of a strip cell, if inside the strip.
    #[must_use]
    pub fn resource_at(&self, lx: i32, ly: i32) -> Option<f32> {
        self.strip_cell(lx, ly).map(|cell| cell.resource)
    }

    /// Mutable resource access, used to stage test and demo scenarios.
    #[must_use]
    pub fn resource_mut(&mut self, lx: i32, ly: i32) -> Option<&mut f32> {
        let idx = self.index_of(lx, ly)?;
        Some(&mut self.resource[idx])
    }

    /// Flat copy of local row `ly`, the unit sent during halo exchange.
    #[must_use]
    pub fn snapshot_row(&self, ly: usize) -> Vec<CellRecord> {
        debug_assert!(ly < self.height);
        let start = ly * self.width;
        (start..start + self.width)
            .map(|idx| CellRecord {
                terrain: self.terrain[idx],
                resource: self.resource[idx],
                consumed: f32::from_bits(self.consumed[idx].load(Ordering::Relaxed)),
                accessible: self.accessible[idx],
            })
            .collect()
    }

    /// Installs the boundary row received from the previous rank.
    pub fn install_halo_above(&mut self, row: Vec<CellRecord>) {
        debug_assert_eq!(row.len(), self.width);
        self.halo_above = Some(row);
    }

    /// Installs the boundary row received from the next rank.
    pub fn install_halo_below(&mut self, row: Vec<CellRecord>) {
        debug_assert_eq!(row.len(), self.width);
        self.halo_below = Some(row);
    }

    #[must_use]
    pub fn has_halo_above(&self) -> bool {
        self.halo_above.is_some()
    }

    #[must_use]
    pub fn has_halo_below(&self) -> bool {
        self.halo_below.is_some()
    }

    /// Sum of all cell resources in the strip.
    #[must_use]
    pub fn total_resource(&self) -> f64 {
        self.resource.par_iter().map(|&r| f64::from(r)).sum()
    }

    /// Sum of the not-yet-applied consumption accumulators.
    #[must_use]
    pub fn total_pending_consumption(&self) -> f64 {
        self.consumed
            .par_iter()
            .map(|cell| f64::from(f32::from_bits(cell.load(Ordering::Relaxed))))
            .sum()
    }

    /// Checks `0 <= resource <= capacity(terrain)` for every cell.
    #[must_use]
    pub fn resources_within_bounds(&self, config: &SimulationConfig) -> bool {
        self.terrain
            .iter()
            .zip(&self.resource)
            .all(|(terrain, &resource)| resource >= 0.0 && resource <= config.capacity(*terrain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            grid_width: 8,
            grid_height: 8,
            owners: 1,
            initial_agents: 0,
            ..SimulationConfig::default()
        }
    }

    fn initialized(config: &SimulationConfig, season: Season) -> Territory {
        let mut territory = Territory::new(
            config.grid_width as usize,
            config.grid_height as usize,
            0,
            0,
        );
        territory.initialize(config, season);
        territory
    }

    #[test]
    fn initialize_sets_capacity_and_accessibility() {
        let config = small_config();
        let territory = initialized(&config, Season::Dry);
        // (0, 0) is a village cell: full capacity, accessible in any season.
        assert_eq!(territory.resource_at(0, 0), Some(config.capacity_village));
        // (1, 1) is gathering: accessible while dry.
        let gathering = territory.strip_cell(1, 1).unwrap();
        assert_eq!(gathering.resource, config.capacity_gathering);
        assert!(gathering.accessible);
        assert!(territory.resources_within_bounds(&config));
    }

    #[test]
    fn flood_season_closes_gathering_cells() {
        let config = small_config();
        let mut territory = initialized(&config, Season::Dry);
        assert!(territory.strip_cell(1, 1).unwrap().accessible);
        territory.update_accessibility(Season::Flood);
        assert!(!territory.strip_cell(1, 1).unwrap().accessible);
        // Fishing column stays open.
        assert!(territory.strip_cell(5, 1).unwrap().accessible);
        territory.update_accessibility(Season::Dry);
        assert!(territory.strip_cell(1, 1).unwrap().accessible);
    }

    #[test]
    fn forbidden_terrain_is_never_accessible() {
        assert!(!Terrain::Forbidden.accessible(Season::Dry));
        assert!(!Terrain::Forbidden.accessible(Season::Flood));
    }

    #[test]
    fn update_resources_clamps_to_capacity_and_zero() {
        let config = small_config();
        let mut territory = initialized(&config, Season::Dry);

        // Full cell plus positive regeneration must clamp at capacity.
        territory.update_resources(&config, Season::Flood);
        assert!(territory.resources_within_bounds(&config));
        assert_eq!(territory.resource_at(0, 0), Some(config.capacity_village));

        // Consumption far beyond the stored resource must clamp at zero.
        territory.register_consumption(1, 1, 1_000.0);
        territory.update_resources(&config, Season::Dry);
        assert_eq!(territory.resource_at(1, 1), Some(0.0));
        assert!(territory.resources_within_bounds(&config));

        // The accumulator was reset, so the next update only regenerates.
        territory.update_resources(&config, Season::Dry);
        assert_eq!(territory.resource_at(1, 1), Some(config.regeneration_dry));
    }

    #[test]
    fn negative_dry_regeneration_depletes() {
        let config = SimulationConfig {
            regeneration_dry: -0.5,
            ..small_config()
        };
        let mut territory = initialized(&config, Season::Dry);
        let before = territory.resource_at(1, 1).unwrap();
        territory.update_resources(&config, Season::Dry);
        let after = territory.resource_at(1, 1).unwrap();
        assert!((after - (before - 0.5)).abs() < 1e-6);
    }

    #[test]
    fn register_consumption_is_exact_under_contention() {
        let config = small_config();
        let territory = initialized(&config, Season::Dry);
        const THREADS: usize = 8;
        const ADDS: usize = 250;
        const AMOUNT: f32 = 0.25;

        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    for _ in 0..ADDS {
                        territory.register_consumption(3, 3, AMOUNT);
                    }
                });
            }
        });

        let expected = f64::from(AMOUNT) * (THREADS * ADDS) as f64;
        assert_eq!(territory.total_pending_consumption(), expected);
    }

    #[test]
    fn out_of_strip_queries_are_noops() {
        let config = small_config();
        let territory = initialized(&config, Season::Dry);
        assert!(territory.strip_cell(-1, 0).is_none());
        assert!(territory.strip_cell(0, 8).is_none());
        assert!(territory.visible_cell(0, -1).is_none(), "no halo installed");
        // Registering outside the strip must not panic or corrupt anything.
        territory.register_consumption(-1, -1, 5.0);
        assert_eq!(territory.total_pending_consumption(), 0.0);
    }

    #[test]
    fn halo_rows_resolve_adjacent_neighbors_only() {
        let config = small_config();
        let mut territory = initialized(&config, Season::Dry);
        let row = vec![
            CellRecord {
                terrain: Terrain::Gathering,
                resource: 7.5,
                consumed: 0.0,
                accessible: true,
            };
            8
        ];
        territory.install_halo_above(row);
        let above = territory.visible_cell(2, -1).unwrap();
        assert_eq!(above.resource, 7.5);
        assert!(above.accessible);
        // Below halo absent, and x outside the strip is never resolved.
        assert!(territory.visible_cell(2, 8).is_none());
        assert!(territory.visible_cell(-1, -1).is_none());
    }

    #[test]
    fn classify_row_matches_strip_bounds() {
        let territory = Territory::new(4, 4, 0, 4);
        assert_eq!(territory.classify_row(3), RowPlacement::Above);
        assert_eq!(territory.classify_row(4), RowPlacement::Inside);
        assert_eq!(territory.classify_row(7), RowPlacement::Inside);
        assert_eq!(territory.classify_row(8), RowPlacement::Below);
    }
}
