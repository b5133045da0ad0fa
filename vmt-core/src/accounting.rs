//! Stock-flow accounting across tick boundaries.
//!
//! Goods enter the agent side only through harvests and enter the world
//! only through regeneration; trades shuffle stock between agents without
//! changing totals, and money never enters or leaves at all. Capturing a
//! snapshot at each boundary and decomposing the deltas against the tick's
//! harvest and regeneration totals turns those sentences into checkable
//! arithmetic — the scheduler asserts the residuals are zero every tick.

use crate::types::Good;
use crate::world::World;

/// World-wide stock snapshot captured at a tick boundary.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FlowSnapshot {
    pub agents_a: u64,
    pub agents_b: u64,
    pub agents_m: u64,
    pub cells_a: u64,
    pub cells_b: u64,
}

/// Units harvested during one forage phase, by good.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HarvestTotals {
    pub a: u64,
    pub b: u64,
}

impl HarvestTotals {
    pub fn add(&mut self, good: Good, amount: u64) {
        match good {
            Good::A => self.a += amount,
            Good::B => self.b += amount,
            Good::Money => unreachable!("cells never hold money"),
        }
    }
}

/// One good's flow decomposition for a single tick.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GoodFlow {
    pub agents_delta: i64,
    pub cells_delta: i64,
    pub total_delta: i64,
    pub harvested: u64,
    pub regenerated: u64,
    /// `total_delta - regenerated`; zero when the books balance.
    pub residual: i64,
    /// `agents_delta - harvested`; zero because trades only move stock
    /// between agents.
    pub agent_residual: i64,
}

/// Per-tick stock-flow decomposition output.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TickFlow {
    pub tick: u64,
    pub a: GoodFlow,
    pub b: GoodFlow,
    /// Money has no source or sink of any kind.
    pub money_delta: i64,
}

impl TickFlow {
    pub fn is_balanced(&self) -> bool {
        self.a.residual == 0
            && self.b.residual == 0
            && self.a.agent_residual == 0
            && self.b.agent_residual == 0
            && self.money_delta == 0
    }
}

/// Capture the current world-level stock totals.
pub fn capture_flow_snapshot(world: &World) -> FlowSnapshot {
    let mut snapshot = FlowSnapshot::default();
    for agent in world.agents() {
        snapshot.agents_a += agent.inventory.a;
        snapshot.agents_b += agent.inventory.b;
        snapshot.agents_m += agent.inventory.m;
    }
    snapshot.cells_a = world.grid.total_amount(Good::A);
    snapshot.cells_b = world.grid.total_amount(Good::B);
    snapshot
}

/// Decompose one tick's stock changes using boundary snapshots and the
/// tick's harvest/regeneration totals.
pub fn decompose_tick_flow(
    tick: u64,
    before: &FlowSnapshot,
    after: &FlowSnapshot,
    harvested: HarvestTotals,
    regenerated: crate::grid::RegenDelta,
) -> TickFlow {
    let flow_for = |agents_before: u64,
                    agents_after: u64,
                    cells_before: u64,
                    cells_after: u64,
                    harvested: u64,
                    regenerated: u64| {
        let agents_delta = agents_after as i64 - agents_before as i64;
        let cells_delta = cells_after as i64 - cells_before as i64;
        let total_delta = agents_delta + cells_delta;
        GoodFlow {
            agents_delta,
            cells_delta,
            total_delta,
            harvested,
            regenerated,
            residual: total_delta - regenerated as i64,
            agent_residual: agents_delta - harvested as i64,
        }
    };
    TickFlow {
        tick,
        a: flow_for(
            before.agents_a,
            after.agents_a,
            before.cells_a,
            after.cells_a,
            harvested.a,
            regenerated.a,
        ),
        b: flow_for(
            before.agents_b,
            after.agents_b,
            before.cells_b,
            after.cells_b,
            harvested.b,
            regenerated.b,
        ),
        money_delta: after.agents_m as i64 - before.agents_m as i64,
    }
}
