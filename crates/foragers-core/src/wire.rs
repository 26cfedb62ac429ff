//! Fixed-layout serialization for everything that crosses an owner boundary.
//!
//! All transfers are flat little-endian blocks with no internal references:
//! a halo frame is `width` cell blocks, a migration payload is `count`
//! agent blocks, and a migration count is a single `u32`.

use crate::agent::Agent;
use crate::territory::{CellRecord, Terrain};
use thiserror::Error;

/// Serialized size of one cell: terrain tag, resource, consumption, access flag.
pub const CELL_BLOCK_LEN: usize = 1 + 4 + 4 + 1;
/// Serialized size of one agent: id, x, y, energy.
pub const AGENT_BLOCK_LEN: usize = 8 + 4 + 4 + 4;
/// Serialized size of a migration count.
pub const COUNT_LEN: usize = 4;

/// Errors raised while decoding a received frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("frame is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("unknown terrain tag {0}")]
    UnknownTerrain(u8),
}

/// Encodes one boundary row of cells.
#[must_use]
pub fn encode_cell_row(row: &[CellRecord]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(row.len() * CELL_BLOCK_LEN);
    for cell in row {
        frame.push(cell.terrain.tag());
        frame.extend_from_slice(&cell.resource.to_le_bytes());
        frame.extend_from_slice(&cell.consumed.to_le_bytes());
        frame.push(u8::from(cell.accessible));
    }
    frame
}

/// Decodes a halo frame that must contain exactly `width` cell blocks.
pub fn decode_cell_row(frame: &[u8], width: usize) -> Result<Vec<CellRecord>, WireError> {
    let expected = width * CELL_BLOCK_LEN;
    if frame.len() != expected {
        return Err(WireError::LengthMismatch {
            expected,
            actual: frame.len(),
        });
    }
    frame
        .chunks_exact(CELL_BLOCK_LEN)
        .map(|block| {
            let terrain =
                Terrain::from_tag(block[0]).ok_or(WireError::UnknownTerrain(block[0]))?;
            Ok(CellRecord {
                terrain,
                resource: f32::from_le_bytes(block[1..5].try_into().expect("4-byte slice")),
                consumed: f32::from_le_bytes(block[5..9].try_into().expect("4-byte slice")),
                accessible: block[9] != 0,
            })
        })
        .collect()
}

/// Encodes a migration count.
#[must_use]
pub fn encode_count(count: u32) -> [u8; COUNT_LEN] {
    count.to_le_bytes()
}

/// Decodes a migration count frame.
pub fn decode_count(frame: &[u8]) -> Result<u32, WireError> {
    let bytes: [u8; COUNT_LEN] = frame
        .try_into()
        .map_err(|_| WireError::LengthMismatch {
            expected: COUNT_LEN,
            actual: frame.len(),
        })?;
    Ok(u32::from_le_bytes(bytes))
}

/// Encodes a migration payload.
#[must_use]
pub fn encode_agents(agents: &[Agent]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(agents.len() * AGENT_BLOCK_LEN);
    for agent in agents {
        frame.extend_from_slice(&agent.id.to_le_bytes());
        frame.extend_from_slice(&agent.x.to_le_bytes());
        frame.extend_from_slice(&agent.y.to_le_bytes());
        frame.extend_from_slice(&agent.energy.to_le_bytes());
    }
    frame
}

/// Decodes a migration payload announced to hold `count` agents.
pub fn decode_agents(frame: &[u8], count: usize) -> Result<Vec<Agent>, WireError> {
    let expected = count * AGENT_BLOCK_LEN;
    if frame.len() != expected {
        return Err(WireError::LengthMismatch {
            expected,
            actual: frame.len(),
        });
    }
    Ok(frame
        .chunks_exact(AGENT_BLOCK_LEN)
        .map(|block| Agent {
            id: u64::from_le_bytes(block[0..8].try_into().expect("8-byte slice")),
            x: i32::from_le_bytes(block[8..12].try_into().expect("4-byte slice")),
            y: i32::from_le_bytes(block[12..16].try_into().expect("4-byte slice")),
            energy: f32::from_le_bytes(block[16..20].try_into().expect("4-byte slice")),
        })
        .collect())
}
