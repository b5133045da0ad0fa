//! World state container.
//!
//! One `World` exclusively owns every agent, the resource grid, and the
//! spatial index. Agents live in an id-ascending vector; all phase loops
//! iterate it front to back, which *is* the ascending-id ordering guarantee.

use std::collections::HashMap;

use crate::agent::Agent;
use crate::grid::Grid;
use crate::spatial::SpatialIndex;
use crate::types::{AgentId, Good, Position};

pub struct World {
    pub grid: Grid,
    agents: Vec<Agent>,
    index: HashMap<AgentId, usize>,
    pub spatial: SpatialIndex,
}

impl World {
    /// Assemble a world from validated parts. Agents must arrive ascending
    /// by id with no duplicates.
    pub fn new(grid: Grid, agents: Vec<Agent>, bucket_size: u32) -> Self {
        let mut spatial = SpatialIndex::new(bucket_size);
        let mut index = HashMap::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            if i > 0 {
                assert!(
                    agents[i - 1].id < agent.id,
                    "agent roster must be ascending by id"
                );
            }
            index.insert(agent.id, i);
            spatial.insert(agent.id, agent.pos);
        }
        Self {
            grid,
            agents,
            index,
            spatial,
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn index_of(&self, id: AgentId) -> usize {
        *self
            .index
            .get(&id)
            .unwrap_or_else(|| panic!("unknown agent id {id}"))
    }

    pub fn agent(&self, id: AgentId) -> &Agent {
        &self.agents[self.index_of(id)]
    }

    pub fn agent_mut(&mut self, id: AgentId) -> &mut Agent {
        let i = self.index_of(id);
        &mut self.agents[i]
    }

    /// Disjoint mutable access to two agents, e.g. both sides of a trade.
    pub fn two_mut(&mut self, a: AgentId, b: AgentId) -> (&mut Agent, &mut Agent) {
        let (i, j) = (self.index_of(a), self.index_of(b));
        assert_ne!(i, j, "two_mut needs distinct agents, got {a} twice");
        if i < j {
            let (lo, hi) = self.agents.split_at_mut(j);
            (&mut lo[i], &mut hi[0])
        } else {
            let (lo, hi) = self.agents.split_at_mut(i);
            (&mut hi[0], &mut lo[j])
        }
    }

    /// Move an agent and keep the spatial index in step.
    pub fn move_agent(&mut self, id: AgentId, new_pos: Position) {
        let i = self.index_of(id);
        self.agents[i].pos = new_pos;
        self.spatial.update(id, new_pos);
    }

    /// Paired pairs `(a, b)` with `a < b`, ascending. Pairing symmetry is
    /// asserted as a side effect.
    pub fn paired_pairs(&self) -> Vec<(AgentId, AgentId)> {
        let mut pairs = Vec::new();
        for agent in &self.agents {
            if let Some(partner) = agent.paired_with {
                let other = self.agent(partner);
                assert_eq!(
                    other.paired_with,
                    Some(agent.id),
                    "pairing asymmetry: {} -> {partner} but {partner} -> {:?}",
                    agent.id,
                    other.paired_with
                );
                if agent.id < partner {
                    pairs.push((agent.id, partner));
                }
            }
        }
        pairs
    }

    /// Agents whose partner does not reciprocate. Should always be empty;
    /// the housekeeping sweep uses this defensively.
    pub fn asymmetric_pairings(&self) -> Vec<(AgentId, AgentId)> {
        let mut broken = Vec::new();
        for agent in &self.agents {
            if let Some(partner) = agent.paired_with {
                if self.agent(partner).paired_with != Some(agent.id) {
                    broken.push((agent.id, partner));
                }
            }
        }
        broken
    }

    /// Total stock of a good held by agents and cells together.
    pub fn total_amount(&self, good: Good) -> u64 {
        let held: u64 = self.agents.iter().map(|a| a.inventory.get(good)).sum();
        held + self.grid.total_amount(good)
    }
}
