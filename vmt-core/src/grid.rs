//! Resource grid: integer cells carrying a regenerating stock of one good.
//!
//! Cells are created at tick 0 and never added or removed; `original_amount`
//! is frozen at creation. The harvested set is the only thing regeneration
//! sweeps, and it is ordered so the sweep is deterministic.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Good, Position, Tick};

// === CELL ===

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cell {
    pub pos: Position,
    pub good: Good,
    pub amount: u64,
    pub original_amount: u64,
    pub last_harvested_tick: Option<Tick>,
    pub claimant: Option<AgentId>,
}

impl Cell {
    pub fn new(pos: Position, good: Good, amount: u64) -> Self {
        Self {
            pos,
            good,
            amount,
            original_amount: amount,
            last_harvested_tick: None,
            claimant: None,
        }
    }

    /// Claimable by `agent`: unclaimed, or already theirs.
    pub fn claimable_by(&self, agent: AgentId) -> bool {
        self.claimant.is_none() || self.claimant == Some(agent)
    }
}

// === GRID ===

#[derive(Clone, Debug, Default)]
pub struct Grid {
    n: i32,
    cells: HashMap<Position, Cell>,
    /// Cells with `amount < original_amount`, in canonical position order.
    harvested: BTreeSet<Position>,
}

/// Goods created by one regeneration sweep, for conservation accounting.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RegenDelta {
    pub a: u64,
    pub b: u64,
}

impl Grid {
    pub fn new(n: i32) -> Self {
        Self {
            n,
            cells: HashMap::new(),
            harvested: BTreeSet::new(),
        }
    }

    pub fn size(&self) -> i32 {
        self.n
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.x < self.n && pos.y >= 0 && pos.y < self.n
    }

    /// Insert a cell at world construction. Panics outside the grid or on a
    /// duplicate position: scenarios are validated before cells are built.
    pub fn insert_cell(&mut self, cell: Cell) {
        assert!(
            self.in_bounds(cell.pos),
            "cell at {} outside {}x{} grid",
            cell.pos,
            self.n,
            self.n
        );
        let prev = self.cells.insert(cell.pos, cell);
        assert!(prev.is_none(), "duplicate cell");
    }

    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        self.cells.get(&pos)
    }

    pub fn cell_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        self.cells.get_mut(&pos)
    }

    /// All cells in canonical position order. Used for snapshots and
    /// conservation sums; the order is part of the determinism contract.
    pub fn cells_ordered(&self) -> Vec<&Cell> {
        let mut cells: Vec<&Cell> = self.cells.values().collect();
        cells.sort_by_key(|c| c.pos);
        cells
    }

    /// Cells within Manhattan `radius` of `pos` that still hold stock,
    /// in canonical position order.
    pub fn cells_within(&self, pos: Position, radius: u32) -> Vec<&Cell> {
        let r = radius as i32;
        let mut found = Vec::new();
        for dx in -r..=r {
            let budget = r - dx.abs();
            for dy in -budget..=budget {
                let probe = Position::new(pos.x + dx, pos.y + dy);
                if let Some(cell) = self.cells.get(&probe) {
                    if cell.amount > 0 {
                        found.push(cell);
                    }
                }
            }
        }
        found.sort_by_key(|c| c.pos);
        found
    }

    pub fn total_amount(&self, good: Good) -> u64 {
        self.cells
            .values()
            .filter(|c| c.good == good)
            .map(|c| c.amount)
            .sum()
    }

    // === HARVEST ===

    /// Harvest up to `rate` units at `pos`. Returns the good and quantity
    /// taken (zero if the cell is absent or empty). Marks the cell harvested
    /// and restarts its regeneration cooldown.
    pub fn harvest(&mut self, pos: Position, rate: u64, tick: Tick) -> Option<(Good, u64)> {
        let cell = self.cells.get_mut(&pos)?;
        if cell.amount == 0 {
            return None;
        }
        let taken = cell.amount.min(rate);
        cell.amount -= taken;
        cell.last_harvested_tick = Some(tick);
        self.harvested.insert(pos);
        Some((cell.good, taken))
    }

    // === REGENERATION ===

    /// Active-set sweep: every harvested cell past its cooldown grows by
    /// `growth_rate`, capped at `original_amount`. Fully restored cells
    /// leave the set. Returns the goods created.
    pub fn regenerate(&mut self, tick: Tick, growth_rate: u64, cooldown: Tick) -> RegenDelta {
        let mut delta = RegenDelta::default();
        if growth_rate == 0 {
            return delta;
        }
        let mut restored = Vec::new();
        for &pos in &self.harvested {
            let cell = self
                .cells
                .get_mut(&pos)
                .unwrap_or_else(|| panic!("harvested set references missing cell {pos}"));
            let since = cell
                .last_harvested_tick
                .expect("harvested cell without harvest tick");
            if tick.saturating_sub(since) < cooldown {
                continue;
            }
            let grown = growth_rate.min(cell.original_amount - cell.amount);
            cell.amount += grown;
            match cell.good {
                Good::A => delta.a += grown,
                Good::B => delta.b += grown,
                Good::Money => unreachable!("cells never hold money"),
            }
            if cell.amount == cell.original_amount {
                restored.push(pos);
            }
        }
        for pos in restored {
            self.harvested.remove(&pos);
        }
        delta
    }

    // === CLAIMS ===

    /// Claim `pos` for `agent`. Panics if another agent holds the claim:
    /// the decision pass filters out foreign-claimed cells, so a collision
    /// here is a protocol bug.
    pub fn claim(&mut self, pos: Position, agent: AgentId, tick: Tick) {
        let cell = self
            .cells
            .get_mut(&pos)
            .unwrap_or_else(|| panic!("tick {tick}: agent {agent} claiming missing cell {pos}"));
        assert!(
            cell.claimable_by(agent),
            "tick {tick}: agent {agent} claiming {pos} already held by {:?}",
            cell.claimant
        );
        cell.claimant = Some(agent);
    }

    pub fn release_claim(&mut self, pos: Position, agent: AgentId) {
        if let Some(cell) = self.cells.get_mut(&pos) {
            if cell.claimant == Some(agent) {
                cell.claimant = None;
            }
        }
    }

    #[cfg(test)]
    pub fn harvested_len(&self) -> usize {
        self.harvested.len()
    }
}
