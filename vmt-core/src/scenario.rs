//! Scenario configuration: the only input contract of the core.
//!
//! A `ScenarioConfig` arrives already deserialized (the driver owns file
//! formats) and is validated here before tick 0. Seeded construction of
//! agents and resource cells draws from the simulation RNG in a documented
//! order: per generated agent `x, y, utility roll, a, b, m`; then per grid
//! position (canonical x-then-y order) `density roll, good roll, amount`.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::ScenarioError;
use crate::grid::{Cell, Grid};
use crate::types::{AgentId, ExchangeRegime, Good, Inventory, Mode, Position, Tick};
use crate::utility::Utility;

// === PARAMETERS ===

/// The exhaustive recognized-options block, with its documented defaults.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub spread: f64,
    pub vision_radius: u32,
    pub interaction_radius: u32,
    pub move_budget_per_tick: u32,
    pub delta_a_max: u64,
    pub forage_rate: u64,
    /// Zero-inventory ε-shift and strict-improvement slack.
    pub epsilon: f64,
    /// Distance discount shared by trade ranking and forage scoring.
    pub beta: f64,
    pub trade_cooldown_ticks: Tick,
    pub resource_growth_rate: u64,
    /// Cap on seeded cell endowments; regeneration is always capped by each
    /// cell's frozen `original_amount`.
    pub resource_max_amount: Option<u64>,
    pub resource_regen_cooldown: Tick,
    pub enable_resource_claiming: bool,
    pub log_full_preferences: bool,
    /// 0 disables agent snapshots.
    pub agent_snapshot_frequency: Tick,
    /// 0 disables resource snapshots.
    pub resource_snapshot_frequency: Tick,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            spread: 0.0,
            vision_radius: 5,
            interaction_radius: 1,
            move_budget_per_tick: 1,
            delta_a_max: 5,
            forage_rate: 1,
            epsilon: 1e-12,
            beta: 0.95,
            trade_cooldown_ticks: 5,
            resource_growth_rate: 0,
            resource_max_amount: None,
            resource_regen_cooldown: 5,
            enable_resource_claiming: true,
            log_full_preferences: false,
            agent_snapshot_frequency: 0,
            resource_snapshot_frequency: 0,
        }
    }
}

// === MODE SCHEDULE ===

/// Global cycle between forage and trade windows. Without a schedule every
/// tick runs in `Both`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ModeSchedule {
    pub forage_ticks: Tick,
    pub trade_ticks: Tick,
    pub start_mode: Mode,
}

impl ModeSchedule {
    pub fn mode_at(&self, tick: Tick) -> Mode {
        let cycle = self.forage_ticks + self.trade_ticks;
        let offset = tick % cycle;
        match self.start_mode {
            Mode::Forage => {
                if offset < self.forage_ticks {
                    Mode::Forage
                } else {
                    Mode::Trade
                }
            }
            Mode::Trade => {
                if offset < self.trade_ticks {
                    Mode::Trade
                } else {
                    Mode::Forage
                }
            }
            Mode::Both => Mode::Both,
        }
    }
}

// === AGENTS ===

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: u32,
    pub pos: Position,
    pub inventory: Inventory,
    pub utility: Utility,
}

/// Mix weight for one utility family in seeded generation. Weights must sum
/// to 1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UtilityMix {
    pub weight: f64,
    pub utility: Utility,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndowmentRange {
    pub a_min: u64,
    pub a_max: u64,
    pub b_min: u64,
    pub b_max: u64,
    pub m_min: u64,
    pub m_max: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentGenerator {
    pub count: u32,
    pub mix: Vec<UtilityMix>,
    pub endowment: EndowmentRange,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub explicit: Vec<AgentSpec>,
    pub generate: Option<AgentGenerator>,
}

// === RESOURCES ===

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CellSpec {
    pub pos: Position,
    pub good: Good,
    pub amount: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountSpec {
    Fixed(u64),
    Uniform { min: u64, max: u64 },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ResourceSeed {
    /// Fraction of grid cells that carry a resource.
    pub density: f64,
    pub amount: AmountSpec,
    /// Probability a seeded cell holds good A rather than B.
    #[serde(default = "default_a_fraction")]
    pub a_fraction: f64,
}

fn default_a_fraction() -> f64 {
    0.5
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub cells: Vec<CellSpec>,
    pub seed: Option<ResourceSeed>,
}

// === PROTOCOLS & LOGGING ===

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolRef {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolNames {
    pub search: ProtocolRef,
    pub matching: ProtocolRef,
    pub bargaining: ProtocolRef,
}

impl Default for ProtocolNames {
    fn default() -> Self {
        Self {
            search: ProtocolRef {
                name: "distance_discounted_search".to_string(),
                version: default_version(),
            },
            matching: ProtocolRef {
                name: "three_pass_matching".to_string(),
                version: default_version(),
            },
            bargaining: ProtocolRef {
                name: "compensating_block".to_string(),
                version: default_version(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Emit debug `trade_attempt` rows for failed bargaining calls.
    pub trade_attempts: bool,
    /// Preference rows logged per agent per tick (ignored when
    /// `log_full_preferences` is set).
    pub preference_top_k: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            trade_attempts: false,
            preference_top_k: 3,
        }
    }
}

// === SCENARIO ===

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default)]
    pub seed: u64,
    pub grid_size: i32,
    pub agents: AgentConfig,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub mode_schedule: Option<ModeSchedule>,
    #[serde(default)]
    pub resources: Option<ResourceConfig>,
    #[serde(default)]
    pub exchange_regime: ExchangeRegime,
    #[serde(default = "default_lambda")]
    pub lambda_money: f64,
    #[serde(default)]
    pub protocols: ProtocolNames,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_lambda() -> f64 {
    1.0
}

impl ScenarioConfig {
    /// Minimal explicit-agent scenario, the shape most tests start from.
    pub fn minimal(name: &str, grid_size: i32, agents: Vec<AgentSpec>) -> Self {
        Self {
            name: name.to_string(),
            seed: 0,
            grid_size,
            agents: AgentConfig {
                explicit: agents,
                generate: None,
            },
            params: Params::default(),
            mode_schedule: None,
            resources: None,
            exchange_regime: ExchangeRegime::BarterOnly,
            lambda_money: default_lambda(),
            protocols: ProtocolNames::default(),
            log: LogConfig::default(),
        }
    }

    pub fn mode_at(&self, tick: Tick) -> Mode {
        match &self.mode_schedule {
            Some(schedule) => schedule.mode_at(tick),
            None => Mode::Both,
        }
    }

    // === VALIDATION ===

    /// Full pre-tick-0 validation. Everything here is fatal; nothing in the
    /// tick engine re-checks it.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.grid_size < 1 {
            return Err(ScenarioError::GridSize(self.grid_size));
        }
        self.validate_params()?;

        let mut seen = std::collections::HashSet::new();
        for spec in &self.agents.explicit {
            let id = AgentId(spec.id);
            if !seen.insert(spec.id) {
                return Err(ScenarioError::DuplicateAgentId(id));
            }
            let n = self.grid_size;
            if spec.pos.x < 0 || spec.pos.x >= n || spec.pos.y < 0 || spec.pos.y >= n {
                return Err(ScenarioError::AgentOutOfBounds {
                    id,
                    x: spec.pos.x,
                    y: spec.pos.y,
                    n,
                });
            }
            validate_utility(&spec.utility)?;
            if let Utility::StoneGeary {
                gamma_a, gamma_b, ..
            } = spec.utility
            {
                if (spec.inventory.a as f64) < gamma_a || (spec.inventory.b as f64) < gamma_b {
                    return Err(ScenarioError::BelowSubsistence {
                        id,
                        a: spec.inventory.a,
                        b: spec.inventory.b,
                        gamma_a,
                        gamma_b,
                    });
                }
            }
            if spec.inventory.m > 0 && !self.exchange_regime.money_enabled() {
                return Err(ScenarioError::MoneyWithoutRegime);
            }
        }

        if let Some(generator) = &self.agents.generate {
            if generator.count == 0 {
                return Err(ScenarioError::Param {
                    param: "agents.generate.count",
                    value: 0.0,
                    why: "must generate at least one agent",
                });
            }
            let total: f64 = generator.mix.iter().map(|m| m.weight).sum();
            if (total - 1.0).abs() > 1e-9 {
                return Err(ScenarioError::MixWeights(total));
            }
            for mix in &generator.mix {
                if mix.weight < 0.0 {
                    return Err(ScenarioError::MixWeights(total));
                }
                validate_utility(&mix.utility)?;
                if let Utility::StoneGeary {
                    gamma_a, gamma_b, ..
                } = mix.utility
                {
                    let e = &generator.endowment;
                    if (e.a_min as f64) < gamma_a || (e.b_min as f64) < gamma_b {
                        return Err(ScenarioError::BelowSubsistence {
                            id: AgentId(u32::MAX),
                            a: e.a_min,
                            b: e.b_min,
                            gamma_a,
                            gamma_b,
                        });
                    }
                }
            }
            let e = &generator.endowment;
            if e.a_min > e.a_max || e.b_min > e.b_max || e.m_min > e.m_max {
                return Err(ScenarioError::Param {
                    param: "agents.generate.endowment",
                    value: 0.0,
                    why: "min exceeds max",
                });
            }
            if e.m_max > 0 && !self.exchange_regime.money_enabled() {
                return Err(ScenarioError::MoneyWithoutRegime);
            }
        } else if self.agents.explicit.is_empty() {
            return Err(ScenarioError::Param {
                param: "agents",
                value: 0.0,
                why: "scenario has no agents",
            });
        }

        if let Some(schedule) = &self.mode_schedule {
            if schedule.forage_ticks == 0 || schedule.trade_ticks == 0 {
                return Err(ScenarioError::ModeSchedule("window lengths must be >= 1"));
            }
            if schedule.start_mode == Mode::Both {
                return Err(ScenarioError::ModeSchedule(
                    "start_mode must be forage or trade",
                ));
            }
        }

        if let Some(resources) = &self.resources {
            for cell in &resources.cells {
                if cell.good == Good::Money {
                    return Err(ScenarioError::ResourceSeed("cells cannot hold money"));
                }
                let n = self.grid_size;
                if cell.pos.x < 0 || cell.pos.x >= n || cell.pos.y < 0 || cell.pos.y >= n {
                    return Err(ScenarioError::ResourceSeed("cell outside the grid"));
                }
            }
            if let Some(seed) = &resources.seed {
                if !(0.0..=1.0).contains(&seed.density) {
                    return Err(ScenarioError::ResourceSeed("density must be in [0, 1]"));
                }
                if !(0.0..=1.0).contains(&seed.a_fraction) {
                    return Err(ScenarioError::ResourceSeed("a_fraction must be in [0, 1]"));
                }
                if let AmountSpec::Uniform { min, max } = seed.amount {
                    if min > max {
                        return Err(ScenarioError::ResourceSeed("amount min exceeds max"));
                    }
                }
            }
        }

        if self.exchange_regime.money_enabled() && self.lambda_money <= 0.0 {
            return Err(ScenarioError::Param {
                param: "lambda_money",
                value: self.lambda_money,
                why: "must be > 0 under a money regime",
            });
        }
        Ok(())
    }

    fn validate_params(&self) -> Result<(), ScenarioError> {
        let p = &self.params;
        if !(0.0..=1.0).contains(&p.spread) {
            return Err(ScenarioError::Param {
                param: "spread",
                value: p.spread,
                why: "must be in [0, 1]",
            });
        }
        if p.epsilon <= 0.0 {
            return Err(ScenarioError::Param {
                param: "epsilon",
                value: p.epsilon,
                why: "must be > 0",
            });
        }
        if !(p.beta > 0.0 && p.beta <= 1.0) {
            return Err(ScenarioError::Param {
                param: "beta",
                value: p.beta,
                why: "must be in (0, 1]",
            });
        }
        if p.move_budget_per_tick < 1 {
            return Err(ScenarioError::Param {
                param: "move_budget_per_tick",
                value: p.move_budget_per_tick as f64,
                why: "must be >= 1",
            });
        }
        if p.delta_a_max < 1 {
            return Err(ScenarioError::Param {
                param: "delta_a_max",
                value: p.delta_a_max as f64,
                why: "must be >= 1",
            });
        }
        Ok(())
    }

    // === CONSTRUCTION ===

    /// Build the agent roster: explicit specs first, then generated agents
    /// with ids continuing past the highest explicit id. Returned ascending
    /// by id. Assumes `validate()` passed.
    pub fn build_agents(&self, rng: &mut impl Rng) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self
            .agents
            .explicit
            .iter()
            .map(|spec| {
                Agent::new(AgentId(spec.id), spec.pos, spec.utility)
                    .with_inventory(spec.inventory)
                    .with_lambda(self.lambda_money)
            })
            .collect();

        if let Some(generator) = &self.agents.generate {
            let mut next_id = self
                .agents
                .explicit
                .iter()
                .map(|s| s.id + 1)
                .max()
                .unwrap_or(0);
            let n = self.grid_size;
            for _ in 0..generator.count {
                let x = rng.random_range(0..n);
                let y = rng.random_range(0..n);
                let utility = pick_utility(&generator.mix, rng.random::<f64>());
                let e = &generator.endowment;
                let inventory = Inventory {
                    a: rng.random_range(e.a_min..=e.a_max),
                    b: rng.random_range(e.b_min..=e.b_max),
                    m: rng.random_range(e.m_min..=e.m_max),
                };
                agents.push(
                    Agent::new(AgentId(next_id), Position::new(x, y), utility)
                        .with_inventory(inventory)
                        .with_lambda(self.lambda_money),
                );
                next_id += 1;
            }
        }

        agents.sort_by_key(|a| a.id);
        agents
    }

    /// Build the resource grid: explicit cells first, then density seeding
    /// over the remaining positions in canonical x-then-y order.
    pub fn build_grid(&self, rng: &mut impl Rng) -> Grid {
        let mut grid = Grid::new(self.grid_size);
        let Some(resources) = &self.resources else {
            return grid;
        };
        for spec in &resources.cells {
            grid.insert_cell(Cell::new(spec.pos, spec.good, spec.amount));
        }
        if let Some(seed) = &resources.seed {
            let cap = self.params.resource_max_amount.unwrap_or(u64::MAX);
            for x in 0..self.grid_size {
                for y in 0..self.grid_size {
                    let pos = Position::new(x, y);
                    if grid.cell(pos).is_some() {
                        continue;
                    }
                    if rng.random::<f64>() >= seed.density {
                        continue;
                    }
                    let good = if rng.random::<f64>() < seed.a_fraction {
                        Good::A
                    } else {
                        Good::B
                    };
                    let amount = match seed.amount {
                        AmountSpec::Fixed(v) => v,
                        AmountSpec::Uniform { min, max } => rng.random_range(min..=max),
                    };
                    let amount = amount.min(cap);
                    if amount > 0 {
                        grid.insert_cell(Cell::new(pos, good, amount));
                    }
                }
            }
        }
        grid
    }
}

fn pick_utility(mix: &[UtilityMix], roll: f64) -> Utility {
    let mut acc = 0.0;
    for entry in mix {
        acc += entry.weight;
        if roll < acc {
            return entry.utility;
        }
    }
    // Weight rounding can leave the final sliver uncovered.
    mix.last().expect("validated mix is non-empty").utility
}

fn validate_utility(utility: &Utility) -> Result<(), ScenarioError> {
    match *utility {
        Utility::Ces { rho, w_a, w_b } => {
            if (rho - 1.0).abs() < 1e-12 {
                return Err(ScenarioError::UtilityParam {
                    family: "ces",
                    param: "rho",
                    value: rho,
                    why: "rho = 1 (perfect substitutes) is excluded",
                });
            }
            for (param, value) in [("w_a", w_a), ("w_b", w_b)] {
                if value <= 0.0 {
                    return Err(ScenarioError::UtilityParam {
                        family: "ces",
                        param,
                        value,
                        why: "weights must be > 0",
                    });
                }
            }
        }
        Utility::Linear { v_a, v_b } => {
            for (param, value) in [("v_a", v_a), ("v_b", v_b)] {
                if value <= 0.0 {
                    return Err(ScenarioError::UtilityParam {
                        family: "linear",
                        param,
                        value,
                        why: "unit values must be > 0",
                    });
                }
            }
        }
        Utility::Quadratic {
            sigma_a, sigma_b, ..
        } => {
            for (param, value) in [("sigma_a", sigma_a), ("sigma_b", sigma_b)] {
                if value <= 0.0 {
                    return Err(ScenarioError::UtilityParam {
                        family: "quadratic",
                        param,
                        value,
                        why: "curvatures must be > 0",
                    });
                }
            }
        }
        Utility::Translog { .. } => {}
        Utility::StoneGeary {
            gamma_a,
            gamma_b,
            alpha_a,
            alpha_b,
        } => {
            for (param, value) in [("gamma_a", gamma_a), ("gamma_b", gamma_b)] {
                if value < 0.0 {
                    return Err(ScenarioError::UtilityParam {
                        family: "stone_geary",
                        param,
                        value,
                        why: "subsistence levels must be >= 0",
                    });
                }
            }
            for (param, value) in [("alpha_a", alpha_a), ("alpha_b", alpha_b)] {
                if value <= 0.0 {
                    return Err(ScenarioError::UtilityParam {
                        family: "stone_geary",
                        param,
                        value,
                        why: "shares must be > 0",
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cobb_douglas() -> Utility {
        Utility::Ces {
            rho: 0.0,
            w_a: 0.5,
            w_b: 0.5,
        }
    }

    fn two_agent_config() -> ScenarioConfig {
        ScenarioConfig::minimal(
            "two_agents",
            5,
            vec![
                AgentSpec {
                    id: 0,
                    pos: Position::new(1, 1),
                    inventory: Inventory::new(8, 2),
                    utility: cobb_douglas(),
                },
                AgentSpec {
                    id: 1,
                    pos: Position::new(2, 2),
                    inventory: Inventory::new(2, 8),
                    utility: cobb_douglas(),
                },
            ],
        )
    }

    #[test]
    fn valid_minimal_scenario_passes() {
        two_agent_config().validate().expect("scenario should validate");
    }

    #[test]
    fn duplicate_ids_and_bad_positions_fail() {
        let mut config = two_agent_config();
        config.agents.explicit[1].id = 0;
        assert!(matches!(
            config.validate(),
            Err(ScenarioError::DuplicateAgentId(AgentId(0)))
        ));

        let mut config = two_agent_config();
        config.agents.explicit[0].pos = Position::new(5, 0);
        assert!(matches!(
            config.validate(),
            Err(ScenarioError::AgentOutOfBounds { .. })
        ));
    }

    #[test]
    fn ces_rho_one_is_rejected() {
        let mut config = two_agent_config();
        config.agents.explicit[0].utility = Utility::Ces {
            rho: 1.0,
            w_a: 0.5,
            w_b: 0.5,
        };
        assert!(matches!(
            config.validate(),
            Err(ScenarioError::UtilityParam { param: "rho", .. })
        ));
    }

    #[test]
    fn stone_geary_endowment_below_subsistence_is_rejected() {
        let mut config = two_agent_config();
        config.agents.explicit[0].utility = Utility::StoneGeary {
            gamma_a: 10.0,
            gamma_b: 0.0,
            alpha_a: 0.5,
            alpha_b: 0.5,
        };
        assert!(matches!(
            config.validate(),
            Err(ScenarioError::BelowSubsistence { .. })
        ));
    }

    #[test]
    fn money_inventory_requires_money_regime() {
        let mut config = two_agent_config();
        config.agents.explicit[0].inventory.m = 5;
        assert!(matches!(
            config.validate(),
            Err(ScenarioError::MoneyWithoutRegime)
        ));
        config.exchange_regime = ExchangeRegime::Mixed;
        config.validate().expect("mixed regime allows money");
    }

    #[test]
    fn mode_schedule_cycles_from_start_mode() {
        let schedule = ModeSchedule {
            forage_ticks: 15,
            trade_ticks: 10,
            start_mode: Mode::Forage,
        };
        assert_eq!(schedule.mode_at(0), Mode::Forage);
        assert_eq!(schedule.mode_at(14), Mode::Forage);
        assert_eq!(schedule.mode_at(15), Mode::Trade);
        assert_eq!(schedule.mode_at(24), Mode::Trade);
        assert_eq!(schedule.mode_at(25), Mode::Forage);
        assert_eq!(schedule.mode_at(40), Mode::Trade);
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let mut config = two_agent_config();
        config.agents.generate = Some(AgentGenerator {
            count: 10,
            mix: vec![
                UtilityMix {
                    weight: 0.7,
                    utility: cobb_douglas(),
                },
                UtilityMix {
                    weight: 0.3,
                    utility: Utility::Linear { v_a: 2.0, v_b: 1.0 },
                },
            ],
            endowment: EndowmentRange {
                a_min: 1,
                a_max: 10,
                b_min: 1,
                b_max: 10,
                m_min: 0,
                m_max: 0,
            },
        });
        config.validate().expect("generator config should validate");

        let roster_a = config.build_agents(&mut StdRng::seed_from_u64(42));
        let roster_b = config.build_agents(&mut StdRng::seed_from_u64(42));
        assert_eq!(roster_a.len(), 12);
        for (a, b) in roster_a.iter().zip(&roster_b) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.pos, b.pos);
            assert_eq!(a.inventory, b.inventory);
        }
        // Generated ids continue past the explicit roster.
        assert_eq!(roster_a[2].id, AgentId(2));
        assert!(roster_a.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn seeded_grid_respects_density_bounds_and_cap() {
        let mut config = two_agent_config();
        config.grid_size = 20;
        config.params.resource_max_amount = Some(3);
        config.resources = Some(ResourceConfig {
            cells: vec![],
            seed: Some(ResourceSeed {
                density: 0.5,
                amount: AmountSpec::Uniform { min: 1, max: 9 },
                a_fraction: 1.0,
            }),
        });
        config.validate().expect("seed config should validate");
        let grid = config.build_grid(&mut StdRng::seed_from_u64(7));
        let cells = grid.cells_ordered();
        assert!(!cells.is_empty());
        for cell in cells {
            assert!(cell.amount <= 3, "cap violated at {}", cell.pos);
            assert_eq!(cell.good, Good::A);
        }
    }
}
