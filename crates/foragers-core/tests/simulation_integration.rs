//! End-to-end checks of the two-owner protocols: halo-driven decisions,
//! boundary migration, and whole-run bookkeeping through the public API.

use foragers_core::{Agent, NeighborLink, Owner, SimulationConfig, run};
use std::sync::Arc;

fn two_owner_config() -> SimulationConfig {
    SimulationConfig {
        grid_width: 4,
        grid_height: 8,
        owners: 2,
        total_cycles: 4,
        seasonal_period: 4,
        initial_agents: 0,
        ..SimulationConfig::default()
    }
}

/// Builds the linked owner pair for an 8-row grid split into two strips.
fn linked_pair(config: &Arc<SimulationConfig>) -> (Owner, Owner) {
    let (top_end, bottom_end) = NeighborLink::pair();
    let top = Owner::new(0, Arc::clone(config), None, Some(top_end));
    let bottom = Owner::new(1, Arc::clone(config), Some(bottom_end), None);
    (top, bottom)
}

/// Levels every cell in the strip to the same resource value so a staged
/// maximum is the unique attractor.
fn level_resources(owner: &mut Owner, value: f32) {
    let (width, height) = (owner.territory().width(), owner.territory().height());
    for ly in 0..height as i32 {
        for lx in 0..width as i32 {
            *owner.territory_mut().resource_mut(lx, ly).unwrap() = value;
        }
    }
}

#[test]
fn agent_follows_a_halo_gradient_across_the_strip_boundary() {
    let config = Arc::new(two_owner_config());
    let (mut top, mut bottom) = linked_pair(&config);
    level_resources(&mut top, 1.0);
    level_resources(&mut bottom, 1.0);
    // The richest cell sits just across the boundary from the agent.
    *top.territory_mut().resource_mut(1, 3).unwrap() = 9.0;
    bottom.set_population(vec![Agent::new(7, 1, 4, 30.0)]);

    let (top_metrics, bottom_metrics) = std::thread::scope(|scope| {
        let t = scope.spawn(|| top.run_cycle(0).unwrap());
        let b = scope.spawn(|| bottom.run_cycle(0).unwrap());
        (t.join().unwrap(), b.join().unwrap())
    });

    assert_eq!(bottom_metrics.migrated, 1);
    assert_eq!(bottom_metrics.population, 0);
    assert!(bottom.population().is_empty());
    assert_eq!(top_metrics.migrated, 0);
    assert_eq!(top_metrics.population, 1);

    // The migrant arrives intact: same id, the position it chose, and the
    // energy left after this cycle's load (2.0 metabolic plus 100
    // iterations at 0.002 each), untouched by any consumption.
    let migrant = &top.population()[0];
    assert_eq!(migrant.id, 7);
    assert_eq!((migrant.x, migrant.y), (1, 3));
    assert!((migrant.energy - 27.8).abs() < 1e-4, "{}", migrant.energy);
}

#[test]
fn simultaneous_migration_in_both_directions_swaps_the_agents() {
    let config = Arc::new(two_owner_config());
    let (mut top, mut bottom) = linked_pair(&config);
    level_resources(&mut top, 1.0);
    level_resources(&mut bottom, 1.0);
    // One attractor per direction, in separate columns so the gradients
    // cannot interfere.
    *top.territory_mut().resource_mut(0, 3).unwrap() = 9.0;
    *bottom.territory_mut().resource_mut(3, 0).unwrap() = 9.0;
    top.set_population(vec![Agent::new(2, 3, 3, 30.0)]);
    bottom.set_population(vec![Agent::new(3, 0, 4, 30.0)]);

    let (top_metrics, bottom_metrics) = std::thread::scope(|scope| {
        let t = scope.spawn(|| top.run_cycle(0).unwrap());
        let b = scope.spawn(|| bottom.run_cycle(0).unwrap());
        (t.join().unwrap(), b.join().unwrap())
    });

    assert_eq!(top_metrics.migrated, 1);
    assert_eq!(bottom_metrics.migrated, 1);
    assert_eq!(top.population().len(), 1);
    assert_eq!(bottom.population().len(), 1);
    assert_eq!(top.population()[0].id, 3);
    assert_eq!(bottom.population()[0].id, 2);
    assert_eq!((top.population()[0].x, top.population()[0].y), (0, 3));
    assert_eq!((bottom.population()[0].x, bottom.population()[0].y), (3, 4));
}

#[test]
fn agents_without_a_cross_boundary_gradient_stay_home() {
    let config = Arc::new(two_owner_config());
    let (mut top, mut bottom) = linked_pair(&config);
    level_resources(&mut top, 1.0);
    level_resources(&mut bottom, 1.0);
    top.set_population(vec![Agent::new(0, 2, 3, 30.0)]);
    bottom.set_population(vec![Agent::new(1, 2, 4, 30.0)]);

    let (top_metrics, bottom_metrics) = std::thread::scope(|scope| {
        let t = scope.spawn(|| top.run_cycle(0).unwrap());
        let b = scope.spawn(|| bottom.run_cycle(0).unwrap());
        (t.join().unwrap(), b.join().unwrap())
    });

    // A flat field offers no strictly better cell, so nobody moves.
    assert_eq!(top_metrics.migrated + bottom_metrics.migrated, 0);
    assert_eq!(top.population()[0].id, 0);
    assert_eq!(bottom.population()[0].id, 1);
    assert_eq!((top.population()[0].x, top.population()[0].y), (2, 3));
}

#[test]
fn full_runs_are_deterministic_in_their_integer_dynamics() {
    let config = SimulationConfig {
        grid_width: 10,
        grid_height: 8,
        owners: 2,
        total_cycles: 8,
        seasonal_period: 3,
        initial_agents: 20,
        workload_factor: 0.0,
        ..SimulationConfig::default()
    };
    let first = run(config.clone(), |_| {}).unwrap();
    let second = run(config, |_| {}).unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.population, b.population, "cycle {}", a.cycle);
        assert_eq!(a.births, b.births, "cycle {}", a.cycle);
        assert_eq!(a.deaths, b.deaths, "cycle {}", a.cycle);
        assert_eq!(a.migrated, b.migrated, "cycle {}", a.cycle);
        assert_eq!(a.season, b.season, "cycle {}", a.cycle);
    }
}

#[test]
fn whole_run_population_matches_the_birth_and_death_ledger() {
    let config = SimulationConfig {
        grid_width: 10,
        grid_height: 10,
        owners: 2,
        total_cycles: 10,
        seasonal_period: 4,
        initial_agents: 30,
        workload_factor: 0.0,
        ..SimulationConfig::default()
    };
    let initial = config.initial_agents;
    let reports = run(config, |_| {}).unwrap();
    let mut expected = initial;
    for report in &reports {
        expected = expected + report.births - report.deaths;
        assert_eq!(report.population, expected, "cycle {}", report.cycle);
    }
}
