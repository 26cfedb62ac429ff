//! Point-to-point links between rank-adjacent owners and the two wire
//! protocols that run over them: the per-cycle halo exchange and the
//! two-phase agent migration.
//!
//! A link carries opaque byte frames over a pair of unbounded channels, one
//! per direction. Sends never block, so both sides can post all of their
//! sends before either starts receiving; that is the full-duplex pattern
//! that keeps the exchange deadlock-free.

use crate::agent::Agent;
use crate::territory::Territory;
use crate::wire::{
    WireError, decode_agents, decode_cell_row, decode_count, encode_agents, encode_cell_row,
    encode_count,
};
use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;

/// Errors raised while exchanging frames with a neighbor.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The peer hung up mid-protocol; the run cannot continue.
    #[error("neighbor disconnected mid-exchange")]
    Disconnected,
    /// A received frame failed to decode.
    #[error("malformed frame: {0}")]
    Malformed(#[from] WireError),
}

/// One endpoint of a full-duplex byte-frame connection to a neighbor rank.
#[derive(Debug)]
pub struct NeighborLink {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl NeighborLink {
    /// Creates the two endpoints of a connection between adjacent ranks.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }

    fn send(&self, frame: Vec<u8>) -> Result<(), ExchangeError> {
        self.tx.send(frame).map_err(|_| ExchangeError::Disconnected)
    }

    fn recv(&self) -> Result<Vec<u8>, ExchangeError> {
        self.rx.recv().map_err(|_| ExchangeError::Disconnected)
    }
}

/// Refreshes the territory's halo rows from its neighbors.
///
/// Posts the owner's own boundary rows to both present neighbors, then
/// blocks until the corresponding rows arrive and installs them. Must
/// complete before any agent evaluates neighbor cells this cycle.
pub fn exchange_halos(
    territory: &mut Territory,
    up: Option<&NeighborLink>,
    down: Option<&NeighborLink>,
) -> Result<(), ExchangeError> {
    let width = territory.width();
    if let Some(link) = up {
        link.send(encode_cell_row(&territory.snapshot_row(0)))?;
    }
    if let Some(link) = down {
        link.send(encode_cell_row(&territory.snapshot_row(territory.height() - 1)))?;
    }
    if let Some(link) = up {
        let row = decode_cell_row(&link.recv()?, width)?;
        territory.install_halo_above(row);
    }
    if let Some(link) = down {
        let row = decode_cell_row(&link.recv()?, width)?;
        territory.install_halo_below(row);
    }
    Ok(())
}

/// Runs the two-phase migration protocol for one owner.
///
/// Phase 1 exchanges scalar counts per direction; phase 2 exchanges the
/// payloads, skipping zero-length transfers entirely. Returns the agents
/// received from the previous and next rank. Agents are moved, never
/// copied: callers hand over the outgoing sets by value and the peers
/// insert the decoded records into their own populations.
pub fn migrate(
    up: Option<&NeighborLink>,
    down: Option<&NeighborLink>,
    outgoing_up: &[Agent],
    outgoing_down: &[Agent],
) -> Result<(Vec<Agent>, Vec<Agent>), ExchangeError> {
    debug_assert!(up.is_some() || outgoing_up.is_empty());
    debug_assert!(down.is_some() || outgoing_down.is_empty());

    // Phase 1: counts.
    if let Some(link) = up {
        link.send(encode_count(outgoing_up.len() as u32).to_vec())?;
    }
    if let Some(link) = down {
        link.send(encode_count(outgoing_down.len() as u32).to_vec())?;
    }
    let expected_from_up = match up {
        Some(link) => decode_count(&link.recv()?)? as usize,
        None => 0,
    };
    let expected_from_down = match down {
        Some(link) => decode_count(&link.recv()?)? as usize,
        None => 0,
    };

    // Phase 2: payloads, only where the count said there is one.
    if let Some(link) = up
        && !outgoing_up.is_empty()
    {
        link.send(encode_agents(outgoing_up))?;
    }
    if let Some(link) = down
        && !outgoing_down.is_empty()
    {
        link.send(encode_agents(outgoing_down))?;
    }
    let from_up = match up {
        Some(link) if expected_from_up > 0 => decode_agents(&link.recv()?, expected_from_up)?,
        _ => Vec::new(),
    };
    let from_down = match down {
        Some(link) if expected_from_down > 0 => decode_agents(&link.recv()?, expected_from_down)?,
        _ => Vec::new(),
    };
    Ok((from_up, from_down))
}
