//! Movement phase: one-step greedy Manhattan pursuit.
//!
//! Ascending id; each agent moves relative to the world as it stands at its
//! moment of processing, so a partner that already moved this tick is
//! chased at its new position. Step tiebreak: reduce `|dx|` before `|dy|`;
//! with a budget above one the single-step rule is applied iteratively.

use crate::scenario::Params;
use crate::types::{AgentId, Position};
use crate::world::World;

/// The single-step rule. Returns `pos` unchanged when already at `target`.
pub fn step_toward(pos: Position, target: Position) -> Position {
    let dx = target.x - pos.x;
    let dy = target.y - pos.y;
    if dx != 0 {
        Position::new(pos.x + dx.signum(), pos.y)
    } else if dy != 0 {
        Position::new(pos.x, pos.y + dy.signum())
    } else {
        pos
    }
}

pub fn run(world: &mut World, params: &Params) {
    let ids: Vec<AgentId> = world.agents().iter().map(|a| a.id).collect();
    for id in ids {
        let agent = world.agent(id);
        // Agent targets are chased at their *current* position; cell targets
        // are fixed. Within interaction range of an agent target there is
        // nothing left to gain by closing further.
        let (target, stop_within) = match (agent.target_agent, agent.target_pos) {
            (Some(partner), _) => (world.agent(partner).pos, params.interaction_radius),
            (None, Some(pos)) => (pos, 0),
            (None, None) => continue,
        };
        let mut pos = agent.pos;
        for _ in 0..params.move_budget_per_tick {
            if pos.manhattan(target) <= stop_within {
                break;
            }
            pos = step_toward(pos, target);
        }
        if pos != agent.pos {
            world.move_agent(id, pos);
        }
    }
}
