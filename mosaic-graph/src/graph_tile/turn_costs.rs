//! Turn-cost table storage.
//!
//! Each vertex can carry any number of N×N cost matrices, one per turn-cost
//! type, over an ordered list of incident edges. Tables are chained per
//! vertex in the same intrusive style as edge records:
//!
//! ```text
//! [previous-table pointer (nullable varint)]
//! [turn-cost type id (varint)]
//! [edge count N (varint)]
//! [N edge ids (varint, full encoding)]
//! [N×N costs (varint), row-major: costs[from * N + to]]
//! ```

use crate::EdgeId;
use crate::codec;

/// One turn-cost matrix over the edges incident to a vertex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnCostTable {
    /// The id of the turn-cost classification this table belongs to.
    pub turn_cost_type: u32,
    /// The edges the matrix is defined over, in matrix order.
    pub edges: Vec<EdgeId>,
    /// Row-major costs; `costs[from_index * n + to_index]`.
    pub costs: Vec<u32>,
}

impl TurnCostTable {
    /// The cost of turning from one edge onto another, if both participate
    /// in this table.
    pub fn cost_between(&self, from: EdgeId, to: EdgeId) -> Option<u32> {
        let n = self.edges.len();
        let from_index = self.edges.iter().position(|edge| *edge == from)?;
        let to_index = self.edges.iter().position(|edge| *edge == to)?;
        self.costs.get(from_index * n + to_index).copied()
    }
}

/// Writes a table at `pos`, returning its encoded size.
pub(crate) fn write_table(
    buf: &mut Vec<u8>,
    pos: usize,
    previous: Option<u32>,
    turn_cost_type: u32,
    edges: &[EdgeId],
    costs: &[u32],
) -> usize {
    debug_assert_eq!(costs.len(), edges.len() * edges.len());

    let mut p = pos;
    p += codec::write_varuint_nullable(buf, p, previous.map(u64::from));
    p += codec::write_varuint(buf, p, u64::from(turn_cost_type));
    p += codec::write_varuint(buf, p, edges.len() as u64);
    for edge in edges {
        p += codec::write_varuint(buf, p, edge.encode());
    }
    for cost in costs {
        p += codec::write_varuint(buf, p, u64::from(*cost));
    }
    p - pos
}

/// Decodes the table at the given byte offset, returning it together with
/// the previous-table pointer of the chain.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn read_table(buf: &[u8], offset: u32) -> (TurnCostTable, Option<u32>) {
    let mut p = offset as usize;

    let (previous, size) = codec::read_varuint_nullable(buf, p);
    p += size;
    let (turn_cost_type, size) = codec::read_varuint(buf, p);
    p += size;
    let (count, size) = codec::read_varuint(buf, p);
    p += size;

    let count = count as usize;
    let mut edges = Vec::with_capacity(count);
    for _ in 0..count {
        let (raw, size) = codec::read_varuint(buf, p);
        p += size;
        edges.push(EdgeId::decode(raw));
    }

    let mut costs = Vec::with_capacity(count * count);
    for _ in 0..count * count {
        let (raw, size) = codec::read_varuint(buf, p);
        p += size;
        costs.push(raw as u32);
    }

    (
        TurnCostTable {
            turn_cost_type: turn_cost_type as u32,
            edges,
            costs,
        },
        previous.map(|v| v as u32),
    )
}
