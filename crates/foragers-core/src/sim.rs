//! Top-level run loop: spawns one thread per owner, wires the neighbor
//! links, and drives the per-cycle barrier from the calling thread.
//!
//! The barrier is coordinator-released rather than a free-running
//! `std::sync::Barrier`: each owner posts its cycle result to the
//! coordinator and waits for a proceed message. An owner that fails or
//! panics therefore stalls the run for at most one cycle; the coordinator
//! notices the error (or the closed result channel), aborts the survivors,
//! and returns. Dropped links make any owner still blocked on a neighbor
//! receive fail over to the same exit path, so teardown never deadlocks.

use crate::link::{ExchangeError, NeighborLink};
use crate::metrics::{self, CycleMetrics, CycleReport};
use crate::owner::Owner;
use crate::{Season, SimulationConfig, SimulationError};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;

enum Control {
    Proceed,
    Abort,
}

/// Runs a full simulation and returns one report per cycle.
///
/// `on_cycle` is invoked on the calling thread, in cycle order, as soon as
/// every owner has posted its metrics for that cycle.
pub fn run(
    config: SimulationConfig,
    mut on_cycle: impl FnMut(&CycleReport),
) -> Result<Vec<CycleReport>, SimulationError> {
    config.validate()?;
    let config = Arc::new(config);
    let owners = config.owners;

    let mut up_links: Vec<Option<NeighborLink>> = (0..owners).map(|_| None).collect();
    let mut down_links: Vec<Option<NeighborLink>> = (0..owners).map(|_| None).collect();
    for rank in 0..owners.saturating_sub(1) {
        let (upper_end, lower_end) = NeighborLink::pair();
        down_links[rank] = Some(upper_end);
        up_links[rank + 1] = Some(lower_end);
    }

    let mut result_rxs = Vec::with_capacity(owners);
    let mut control_txs = Vec::with_capacity(owners);
    let mut endpoints = Vec::with_capacity(owners);
    for (up, down) in up_links.into_iter().zip(down_links) {
        let (result_tx, result_rx) = unbounded();
        let (control_tx, control_rx) = unbounded();
        result_rxs.push(result_rx);
        control_txs.push(control_tx);
        endpoints.push((up, down, result_tx, control_rx));
    }

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(owners);
        for (rank, (up, down, result_tx, control_rx)) in endpoints.into_iter().enumerate() {
            let config = Arc::clone(&config);
            handles.push(scope.spawn(move || {
                let mut owner = Owner::new(rank, config.clone(), up, down);
                owner_loop(&mut owner, config.total_cycles, &result_tx, &control_rx);
            }));
        }

        let outcome = coordinate(&config, &result_rxs, &control_txs, &mut on_cycle);
        drop(control_txs);

        for (rank, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() && outcome.is_ok() {
                return Err(SimulationError::OwnerPanicked { rank });
            }
        }
        outcome
    })
}

/// Per-owner thread body. Exits on its own error, on a closed result
/// channel, or on anything other than a proceed message.
fn owner_loop(
    owner: &mut Owner,
    total_cycles: u32,
    results: &Sender<Result<CycleMetrics, ExchangeError>>,
    control: &Receiver<Control>,
) {
    for cycle in 0..total_cycles {
        let outcome = owner.run_cycle(cycle);
        let failed = outcome.is_err();
        if results.send(outcome).is_err() || failed {
            return;
        }
        if cycle + 1 < total_cycles && !matches!(control.recv(), Ok(Control::Proceed)) {
            return;
        }
    }
}

/// Gathers every owner's result once per cycle, reduces, reports, and
/// releases the barrier. A closed result channel means the owner exited
/// without posting, which only a panic can cause.
fn coordinate(
    config: &SimulationConfig,
    result_rxs: &[Receiver<Result<CycleMetrics, ExchangeError>>],
    control_txs: &[Sender<Control>],
    on_cycle: &mut impl FnMut(&CycleReport),
) -> Result<Vec<CycleReport>, SimulationError> {
    let total_cells = u64::from(config.grid_width) * u64::from(config.grid_height);
    let mut gathered = vec![CycleMetrics::default(); result_rxs.len()];
    let mut reports = Vec::with_capacity(config.total_cycles as usize);
    let mut migrated_total = 0u64;

    for cycle in 0..config.total_cycles {
        for (rank, rx) in result_rxs.iter().enumerate() {
            match rx.recv() {
                Ok(Ok(owner_metrics)) => gathered[rank] = owner_metrics,
                Ok(Err(source)) => {
                    abort(control_txs);
                    return Err(SimulationError::OwnerFailed {
                        rank,
                        cycle,
                        source,
                    });
                }
                Err(_) => {
                    abort(control_txs);
                    return Err(SimulationError::OwnerPanicked { rank });
                }
            }
        }

        let season = Season::at_cycle(cycle, config.seasonal_period);
        let report = metrics::reduce(cycle, season, &gathered, total_cells, migrated_total);
        migrated_total = report.migrated_total;
        on_cycle(&report);
        reports.push(report);

        if cycle + 1 < config.total_cycles {
            for tx in control_txs {
                // A send failure means that owner already exited; the
                // gather above will surface it next cycle.
                let _ = tx.send(Control::Proceed);
            }
        }
    }
    Ok(reports)
}

fn abort(control_txs: &[Sender<Control>]) {
    for tx in control_txs {
        let _ = tx.send(Control::Abort);
    }
}
