//! The simulation scheduler.
//!
//! One `Simulation` owns the world, the per-tick scratch arena, the seeded
//! RNG, the protocol objects, and the telemetry sink. `step()` executes the
//! seven phases in fixed order:
//!
//! 1. Perception   2. Decision   3. Movement   4. Trade
//! 5. Forage       6. Regenerate 7. Housekeeping
//!
//! Protocols mutate nothing directly; their effect lists are applied here,
//! atomically after each protocol call. Conservation and index consistency
//! are asserted at every tick boundary — a violation is a bug, not a
//! recoverable error.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::accounting::{self, HarvestTotals};
use crate::agent::{DecisionOutcome, Scratch, Target};
use crate::error::{ScenarioError, SinkError};
use crate::events::{
    self, Event, PairReason, PairingAction, TargetType, TelemetrySink,
};
use crate::protocols::{Effect, ProtocolContext, Protocols, WorldView};
use crate::scenario::{LogConfig, ModeSchedule, Params, ScenarioConfig};
use crate::types::{AgentId, ExchangeRegime, InventoryDelta, Mode, Tick, TradePair};
use crate::utility::quote::Quote;
use crate::world::World;
use crate::{movement, perception};

pub struct Simulation<S: TelemetrySink> {
    world: World,
    scratch: Vec<Scratch>,
    params: Params,
    regime: ExchangeRegime,
    lambda: f64,
    log: LogConfig,
    schedule: Option<ModeSchedule>,
    protocols: Protocols,
    sink: S,
    rng: StdRng,
    tick: Tick,
    scenario_name: String,
    seed: u64,
    /// Wall-clock stamp for the run header; empty by default so telemetry
    /// streams stay byte-identical across runs.
    started_at: String,
    header_emitted: bool,
}

impl<S: TelemetrySink> Simulation<S> {
    pub fn new(config: ScenarioConfig, sink: S) -> Result<Self, ScenarioError> {
        let protocols = Protocols::resolve(&config.protocols)?;
        Self::with_protocols(config, sink, protocols)
    }

    /// Construct with pre-built protocol objects (the registry lives outside
    /// the core).
    pub fn with_protocols(
        config: ScenarioConfig,
        sink: S,
        protocols: Protocols,
    ) -> Result<Self, ScenarioError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let agents = config.build_agents(&mut rng);
        let grid = config.build_grid(&mut rng);
        let bucket = config
            .params
            .vision_radius
            .max(config.params.interaction_radius)
            .max(1);
        let mut world = World::new(grid, agents, bucket);

        // Initial quotes so tick 0's decision pass sees real prices.
        let (regime, lambda) = (config.exchange_regime, config.lambda_money);
        let params = config.params;
        for agent in world.agents_mut() {
            agent.quote = Quote::compute(
                &agent.utility,
                &agent.inventory,
                regime,
                lambda,
                params.spread,
                params.epsilon,
            );
        }

        let scratch = vec![Scratch::default(); world.len()];
        Ok(Self {
            world,
            scratch,
            params,
            regime,
            lambda,
            log: config.log,
            schedule: config.mode_schedule,
            protocols,
            sink,
            rng,
            tick: 0,
            scenario_name: config.name,
            seed: config.seed,
            started_at: String::new(),
            header_emitted: false,
        })
    }

    pub fn set_started_at(&mut self, stamp: String) {
        self.started_at = stamp;
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn mode_at(&self, tick: Tick) -> Mode {
        match &self.schedule {
            Some(schedule) => schedule.mode_at(tick),
            None => Mode::Both,
        }
    }

    /// Advance exactly one tick.
    pub fn step(&mut self) -> Result<(), SinkError> {
        let tick = self.tick;
        let mode = self.mode_at(tick);

        if !self.header_emitted {
            self.header_emitted = true;
            let header = events::RunInfo {
                run_id: format!("{}-{}", self.scenario_name, self.seed),
                scenario_name: self.scenario_name.clone(),
                seed: self.seed,
                n_agents: self.world.len() as u32,
                grid_size: self.world.grid.size(),
                started_at: self.started_at.clone(),
            };
            self.sink.record(&Event::SimulationRun(header))?;
        }

        // Mode rollover: stale pairs and claims from the previous window are
        // swept before anyone perceives or decides. No cooldowns.
        if tick > 0 && mode != self.mode_at(tick - 1) {
            self.sweep_mode_transition(tick)?;
        }

        let flow_before = accounting::capture_flow_snapshot(&self.world);

        // === 1. PERCEPTION ===
        perception::run(&self.world, &mut self.scratch, tick, &self.params);

        // === 2. DECISION ===
        for agent in self.world.agents_mut() {
            agent.set_target(None, None);
        }
        let effects = {
            let view = WorldView {
                world: &self.world,
                tick,
                mode,
            };
            let mut ctx = ProtocolContext {
                params: &self.params,
                regime: self.regime,
                lambda: self.lambda,
                log: &self.log,
                rng: &mut self.rng,
                scratch: &mut self.scratch,
            };
            self.protocols.matching.run(&view, &mut ctx)
        };
        self.apply_effects(effects, tick)?;
        let effects = {
            let view = WorldView {
                world: &self.world,
                tick,
                mode,
            };
            let mut ctx = ProtocolContext {
                params: &self.params,
                regime: self.regime,
                lambda: self.lambda,
                log: &self.log,
                rng: &mut self.rng,
                scratch: &mut self.scratch,
            };
            self.protocols.search.run(&view, &mut ctx)
        };
        self.apply_effects(effects, tick)?;
        self.emit_decisions(tick, mode)?;

        // === 3. MOVEMENT ===
        movement::run(&mut self.world, &self.params);

        // === 4. TRADE ===
        if mode.allows_trade() {
            self.run_trade_phase(tick, mode)?;
        }

        // === 5. FORAGE ===
        let harvested = if mode.allows_forage() {
            self.run_forage_phase(tick)?
        } else {
            HarvestTotals::default()
        };

        // === 6. REGENERATION ===
        let regen = self.world.grid.regenerate(
            tick,
            self.params.resource_growth_rate,
            self.params.resource_regen_cooldown,
        );

        // === 7. HOUSEKEEPING ===
        self.run_housekeeping(tick)?;

        // Conservation: goods enter agents only via harvest and the world
        // only via regeneration; money has no source at all. Any residual
        // in the decomposition is a bug.
        let flow_after = accounting::capture_flow_snapshot(&self.world);
        let flow =
            accounting::decompose_tick_flow(tick, &flow_before, &flow_after, harvested, regen);
        assert!(flow.is_balanced(), "tick {tick}: conservation broken: {flow:?}");
        self.world.spatial.assert_consistent();

        self.sink.flush_tick(tick)?;
        self.tick += 1;
        Ok(())
    }

    /// Drive the simulation for `ticks` steps (or fewer if the driver stops
    /// between calls — there is no cancellation inside a tick).
    pub fn run(&mut self, ticks: Tick) -> Result<(), SinkError> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    // === PHASE HELPERS ===

    fn sweep_mode_transition(&mut self, tick: Tick) -> Result<(), SinkError> {
        for (a, b) in self.world.paired_pairs() {
            self.world.agent_mut(a).paired_with = None;
            self.world.agent_mut(b).paired_with = None;
            self.sink.record(&Event::Pairing(events::Pairing {
                tick,
                agent_i: a,
                agent_j: b,
                event: PairingAction::Unpair,
                reason: PairReason::ModeSwitch,
                surplus_i: None,
                surplus_j: None,
            }))?;
        }
        let claims: Vec<(AgentId, crate::types::Position)> = self
            .world
            .agents()
            .iter()
            .filter_map(|a| a.claimed_cell.map(|c| (a.id, c)))
            .collect();
        for (id, cell) in claims {
            self.world.grid.release_claim(cell, id);
            self.world.agent_mut(id).claimed_cell = None;
        }
        for agent in self.world.agents_mut() {
            agent.set_target(None, None);
        }
        Ok(())
    }

    fn run_trade_phase(&mut self, tick: Tick, mode: Mode) -> Result<(), SinkError> {
        for (a, b) in self.world.paired_pairs() {
            let dist = self.world.agent(a).pos.manhattan(self.world.agent(b).pos);
            if dist > self.params.interaction_radius {
                // Stale perception: partner out of reach, pair persists.
                continue;
            }
            let effects = {
                let view = WorldView {
                    world: &self.world,
                    tick,
                    mode,
                };
                let mut ctx = ProtocolContext {
                    params: &self.params,
                    regime: self.regime,
                    lambda: self.lambda,
                    log: &self.log,
                    rng: &mut self.rng,
                    scratch: &mut self.scratch,
                };
                self.protocols.bargaining.bargain(&view, a, b, &mut ctx)
            };
            if self.log.trade_attempts
                && effects
                    .iter()
                    .any(|e| matches!(e, Effect::Unpair { .. }))
            {
                self.sink.record(&Event::TradeAttempt(events::TradeAttempt {
                    tick,
                    agent_i: a.min(b),
                    agent_j: a.max(b),
                    outcome: "trade_failed".to_string(),
                }))?;
            }
            self.apply_effects(effects, tick)?;
        }
        Ok(())
    }

    fn run_forage_phase(&mut self, tick: Tick) -> Result<HarvestTotals, SinkError> {
        let mut totals = HarvestTotals::default();
        if self.params.forage_rate == 0 {
            return Ok(totals);
        }
        let ids: Vec<AgentId> = self.world.agents().iter().map(|a| a.id).collect();
        for id in ids {
            let agent = self.world.agent(id);
            if agent.is_paired() {
                // Paired agents never forage, even standing on stock.
                continue;
            }
            let pos = agent.pos;
            let claimed = agent.claimed_cell;
            let Some((good, taken)) = self.world.grid.harvest(pos, self.params.forage_rate, tick)
            else {
                continue;
            };
            totals.add(good, taken);
            let agent = self.world.agent_mut(id);
            agent.inventory.apply(InventoryDelta::gain(good, taken));
            if claimed == Some(pos) {
                agent.claimed_cell = None;
                self.world.grid.release_claim(pos, id);
            }
            self.sink.record(&Event::Harvest(events::Harvest {
                tick,
                agent_id: id,
                x: pos.x,
                y: pos.y,
                good,
                amount: taken,
            }))?;
        }
        Ok(totals)
    }

    fn run_housekeeping(&mut self, tick: Tick) -> Result<(), SinkError> {
        // Defensive pairing sweep. Should never fire; logged loudly if it
        // does.
        for (a, b) in self.world.asymmetric_pairings() {
            tracing::warn!(
                tick,
                agent = a.0,
                partner = b.0,
                "housekeeping: clearing asymmetric pairing"
            );
            self.world.agent_mut(a).paired_with = None;
            self.sink.record(&Event::Pairing(events::Pairing {
                tick,
                agent_i: a.min(b),
                agent_j: a.max(b),
                event: PairingAction::Unpair,
                reason: PairReason::Integrity,
                surplus_i: None,
                surplus_j: None,
            }))?;
        }

        // Quote refresh: unconditional, idempotent for unchanged inventories.
        let (regime, lambda) = (self.regime, self.lambda);
        let (spread, eps) = (self.params.spread, self.params.epsilon);
        for agent in self.world.agents_mut() {
            agent.quote = Quote::compute(
                &agent.utility,
                &agent.inventory,
                regime,
                lambda,
                spread,
                eps,
            );
        }

        // Cooldown decay: entries at or past expiry vanish.
        for agent in self.world.agents_mut() {
            agent.trade_cooldowns.retain(|_, &mut expiry| expiry > tick);
        }

        self.emit_snapshots(tick)?;

        for slot in &mut self.scratch {
            slot.clear();
        }
        Ok(())
    }

    // === EFFECT APPLICATION ===

    fn apply_effects(&mut self, effects: Vec<Effect>, tick: Tick) -> Result<(), SinkError> {
        for effect in effects {
            match effect {
                Effect::Pair {
                    a,
                    b,
                    reason,
                    surplus,
                } => {
                    {
                        let (x, y) = self.world.two_mut(a, b);
                        assert!(
                            x.paired_with.is_none() && y.paired_with.is_none(),
                            "tick {tick}: pairing {a} with {b} but one side is already paired"
                        );
                        x.paired_with = Some(b);
                        y.paired_with = Some(a);
                        x.trade_cooldowns.remove(&b);
                        y.trade_cooldowns.remove(&a);
                    }
                    self.sink.record(&Event::Pairing(events::Pairing {
                        tick,
                        agent_i: a.min(b),
                        agent_j: a.max(b),
                        event: PairingAction::Pair,
                        reason,
                        surplus_i: surplus,
                        surplus_j: surplus,
                    }))?;
                }
                Effect::Unpair {
                    a,
                    b,
                    reason,
                    cooldown,
                } => {
                    let expiry = tick + self.params.trade_cooldown_ticks;
                    {
                        let (x, y) = self.world.two_mut(a, b);
                        if x.paired_with == Some(b) {
                            x.paired_with = None;
                        }
                        if y.paired_with == Some(a) {
                            y.paired_with = None;
                        }
                        if cooldown {
                            x.trade_cooldowns.insert(b, expiry);
                            y.trade_cooldowns.insert(a, expiry);
                        }
                    }
                    self.sink.record(&Event::Pairing(events::Pairing {
                        tick,
                        agent_i: a.min(b),
                        agent_j: a.max(b),
                        event: PairingAction::Unpair,
                        reason,
                        surplus_i: None,
                        surplus_j: None,
                    }))?;
                }
                Effect::SetTarget { agent, target } => {
                    let partner_pos = match target {
                        Some(Target::Agent(partner)) => Some(self.world.agent(partner).pos),
                        _ => None,
                    };
                    self.world.agent_mut(agent).set_target(target, partner_pos);
                }
                Effect::ClaimResource { agent, cell } => {
                    self.world.grid.claim(cell, agent, tick);
                    self.world.agent_mut(agent).claimed_cell = Some(cell);
                }
                Effect::ReleaseClaim { agent, cell } => {
                    self.world.grid.release_claim(cell, agent);
                    let agent = self.world.agent_mut(agent);
                    if agent.claimed_cell == Some(cell) {
                        agent.claimed_cell = None;
                    }
                }
                Effect::Trade(tuple) => {
                    let seller_delta =
                        InventoryDelta::seller_side(tuple.pair, tuple.qty, tuple.pay);
                    let seller_pos;
                    {
                        let (buyer, seller) = self.world.two_mut(tuple.buyer, tuple.seller);
                        seller.inventory.apply(seller_delta);
                        buyer.inventory.apply(seller_delta.negated());
                        seller_pos = seller.pos;
                        // Quotes are now stale; housekeeping refreshes them.
                    }
                    let (da, db, dm) = match tuple.pair {
                        TradePair::AInB => (tuple.qty, tuple.pay, None),
                        TradePair::AInM => (tuple.qty, 0, Some(tuple.pay)),
                        TradePair::BInM => (0, tuple.qty, Some(tuple.pay)),
                    };
                    self.sink.record(&Event::Trade(events::Trade {
                        tick,
                        buyer_id: tuple.buyer,
                        seller_id: tuple.seller,
                        pair: tuple.pair,
                        da,
                        db,
                        dm,
                        price: tuple.price,
                        surplus_buyer: tuple.surplus_buyer,
                        surplus_seller: tuple.surplus_seller,
                        x: seller_pos.x,
                        y: seller_pos.y,
                    }))?;
                }
            }
        }
        Ok(())
    }

    // === TELEMETRY ===

    fn emit_decisions(&mut self, tick: Tick, mode: Mode) -> Result<(), SinkError> {
        let idle = DecisionOutcome {
            target_type: TargetType::Idle,
            partner: None,
            expected_surplus: None,
            target_pos: None,
        };
        for i in 0..self.world.len() {
            let agent = &self.world.agents()[i];
            let outcome = self.scratch[i].decision.unwrap_or(idle);
            self.sink.record(&Event::Decision(events::Decision {
                tick,
                agent_id: agent.id,
                partner_id: outcome.partner,
                expected_surplus: outcome.expected_surplus,
                target_type: outcome.target_type,
                target_x: outcome.target_pos.map(|p| p.x),
                target_y: outcome.target_pos.map(|p| p.y),
                num_neighbors: self.scratch[i].neighbors.len() as u32,
                mode,
                is_paired: agent.is_paired(),
            }))?;
            let top_k = if self.params.log_full_preferences {
                usize::MAX
            } else {
                self.log.preference_top_k as usize
            };
            for (rank, pref) in self.scratch[i].preferences.iter().take(top_k).enumerate() {
                self.sink.record(&Event::Preference(events::Preference {
                    tick,
                    agent_id: agent.id,
                    partner_id: pref.partner,
                    rank: rank as u32 + 1,
                    surplus: pref.surplus,
                    discounted_surplus: pref.discounted,
                    distance: pref.dist,
                }))?;
            }
        }
        Ok(())
    }

    fn emit_snapshots(&mut self, tick: Tick) -> Result<(), SinkError> {
        let freq = self.params.agent_snapshot_frequency;
        if freq != 0 && tick % freq == 0 {
            for agent in self.world.agents() {
                let band = |b: Option<&crate::utility::quote::PriceBand>| {
                    (b.map(|x| x.ask), b.map(|x| x.bid))
                };
                let (ask_ab, bid_ab) = band(agent.quote.a_in_b.as_ref());
                let (ask_am, bid_am) = band(agent.quote.a_in_m.as_ref());
                let (ask_bm, bid_bm) = band(agent.quote.b_in_m.as_ref());
                self.sink
                    .record(&Event::AgentSnapshot(events::AgentSnapshot {
                        tick,
                        agent_id: agent.id,
                        x: agent.pos.x,
                        y: agent.pos.y,
                        a: agent.inventory.a,
                        b: agent.inventory.b,
                        m: self.regime.money_enabled().then_some(agent.inventory.m),
                        utility: agent.u_total(),
                        paired_with: agent.paired_with,
                        target_agent: agent.target_agent,
                        target_x: agent.target_pos.map(|p| p.x),
                        target_y: agent.target_pos.map(|p| p.y),
                        ask_a_in_b: ask_ab,
                        bid_a_in_b: bid_ab,
                        ask_a_in_m: ask_am,
                        bid_a_in_m: bid_am,
                        ask_b_in_m: ask_bm,
                        bid_b_in_m: bid_bm,
                    }))?;
            }
        }
        let freq = self.params.resource_snapshot_frequency;
        if freq != 0 && tick % freq == 0 {
            for cell in self.world.grid.cells_ordered() {
                self.sink
                    .record(&Event::ResourceSnapshot(events::ResourceSnapshot {
                        tick,
                        x: cell.pos.x,
                        y: cell.pos.y,
                        amount: cell.amount,
                    }))?;
            }
        }
        Ok(())
    }
}
