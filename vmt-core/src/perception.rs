//! Perception phase: per-agent snapshot of the local world.
//!
//! Runs first each tick, ascending by id. The snapshot (visible neighbors
//! with cooldowns already filtered out, visible non-empty resource cells)
//! is written into the agent's scratch and is immutable downstream — the
//! decision passes read it, nothing rewrites it.

use crate::agent::{Neighbor, Scratch, VisibleCell};
use crate::scenario::Params;
use crate::types::Tick;
use crate::world::World;

pub fn run(world: &World, scratch: &mut [Scratch], tick: Tick, params: &Params) {
    debug_assert_eq!(world.len(), scratch.len());
    for (i, agent) in world.agents().iter().enumerate() {
        let slot = &mut scratch[i];
        slot.clear();

        for id in world.spatial.query_within(agent.pos, params.vision_radius) {
            if id == agent.id || !agent.cooldown_expired(id, tick) {
                continue;
            }
            let pos = world.agent(id).pos;
            slot.neighbors.push(Neighbor {
                id,
                pos,
                dist: agent.pos.manhattan(pos),
            });
        }

        for cell in world.grid.cells_within(agent.pos, params.vision_radius) {
            slot.visible_cells.push(VisibleCell {
                pos: cell.pos,
                good: cell.good,
                amount: cell.amount,
                claimant: cell.claimant,
                dist: agent.pos.manhattan(cell.pos),
            });
        }
    }
}
