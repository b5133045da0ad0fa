//! Agent state.
//!
//! Agents reference each other only by id; the world owns them all in one
//! id-ordered container. Everything transient about a tick (perception
//! snapshot, ranked preferences, the decision record) lives in a `Scratch`
//! that housekeeping clears — nothing in it may leak across ticks.

use std::collections::BTreeMap;

use crate::events::TargetType;
use crate::types::{AgentId, Good, Inventory, Position, Tick};
use crate::utility::Utility;
use crate::utility::quote::Quote;

// === TARGET ===

/// What an agent is moving toward.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Target {
    Agent(AgentId),
    Cell(Position),
}

// === AGENT ===

#[derive(Clone, Debug)]
pub struct Agent {
    pub id: AgentId,
    pub pos: Position,
    pub inventory: Inventory,
    pub utility: Utility,
    pub quote: Quote,
    /// Marginal utility of money under the quasilinear model.
    pub lambda: f64,
    pub paired_with: Option<AgentId>,
    pub target_agent: Option<AgentId>,
    pub target_pos: Option<Position>,
    /// Partner id -> expiry tick. A partner is untouchable while
    /// `expiry > tick`; housekeeping decays expired entries.
    pub trade_cooldowns: BTreeMap<AgentId, Tick>,
    pub claimed_cell: Option<Position>,
}

impl Agent {
    pub fn new(id: AgentId, pos: Position, utility: Utility) -> Self {
        Self {
            id,
            pos,
            inventory: Inventory::default(),
            utility,
            quote: Quote::default(),
            lambda: 1.0,
            paired_with: None,
            target_agent: None,
            target_pos: None,
            trade_cooldowns: BTreeMap::new(),
            claimed_cell: None,
        }
    }

    pub fn with_inventory(mut self, inventory: Inventory) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn is_paired(&self) -> bool {
        self.paired_with.is_some()
    }

    /// Cooldown gate: may this agent target `other` at `tick`?
    pub fn cooldown_expired(&self, other: AgentId, tick: Tick) -> bool {
        match self.trade_cooldowns.get(&other) {
            Some(&expiry) => expiry <= tick,
            None => true,
        }
    }

    pub fn set_target(&mut self, target: Option<Target>, partner_pos: Option<Position>) {
        match target {
            Some(Target::Agent(id)) => {
                self.target_agent = Some(id);
                self.target_pos = partner_pos;
            }
            Some(Target::Cell(pos)) => {
                self.target_agent = None;
                self.target_pos = Some(pos);
            }
            None => {
                self.target_agent = None;
                self.target_pos = None;
            }
        }
    }

    pub fn u_total(&self) -> f64 {
        self.utility.u_total(&self.inventory, self.lambda)
    }
}

// === PER-TICK SCRATCH ===

/// A neighbor visible this tick, cooldown already filtered.
#[derive(Clone, Copy, Debug)]
pub struct Neighbor {
    pub id: AgentId,
    pub pos: Position,
    pub dist: u32,
}

/// A resource cell visible this tick.
#[derive(Clone, Copy, Debug)]
pub struct VisibleCell {
    pub pos: Position,
    pub good: Good,
    pub amount: u64,
    pub claimant: Option<AgentId>,
    pub dist: u32,
}

/// One row of the ranked preference list built in the matching pass.
#[derive(Clone, Copy, Debug)]
pub struct PreferenceEntry {
    pub partner: AgentId,
    pub surplus: f64,
    pub discounted: f64,
    pub dist: u32,
}

/// What the decision phase concluded for one agent, kept for the decision
/// telemetry row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecisionOutcome {
    pub target_type: TargetType,
    pub partner: Option<AgentId>,
    pub expected_surplus: Option<f64>,
    pub target_pos: Option<Position>,
}

#[derive(Clone, Debug, Default)]
pub struct Scratch {
    pub neighbors: Vec<Neighbor>,
    pub visible_cells: Vec<VisibleCell>,
    pub preferences: Vec<PreferenceEntry>,
    pub decision: Option<DecisionOutcome>,
}

impl Scratch {
    pub fn clear(&mut self) {
        self.neighbors.clear();
        self.visible_cells.clear();
        self.preferences.clear();
        self.decision = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_expires_at_its_tick() {
        let mut agent = Agent::new(
            AgentId(0),
            Position::new(0, 0),
            Utility::Linear { v_a: 1.0, v_b: 1.0 },
        );
        agent.trade_cooldowns.insert(AgentId(1), 7);
        assert!(!agent.cooldown_expired(AgentId(1), 5));
        assert!(!agent.cooldown_expired(AgentId(1), 6));
        assert!(agent.cooldown_expired(AgentId(1), 7));
        assert!(agent.cooldown_expired(AgentId(2), 0));
    }

    #[test]
    fn set_target_keeps_agent_and_cell_exclusive() {
        let mut agent = Agent::new(
            AgentId(0),
            Position::new(0, 0),
            Utility::Linear { v_a: 1.0, v_b: 1.0 },
        );
        agent.set_target(Some(Target::Cell(Position::new(3, 3))), None);
        assert_eq!(agent.target_pos, Some(Position::new(3, 3)));
        assert_eq!(agent.target_agent, None);
        agent.set_target(Some(Target::Agent(AgentId(4))), Some(Position::new(1, 1)));
        assert_eq!(agent.target_agent, Some(AgentId(4)));
        assert_eq!(agent.target_pos, Some(Position::new(1, 1)));
        agent.set_target(None, None);
        assert_eq!(agent.target_agent, None);
        assert_eq!(agent.target_pos, None);
    }
}
