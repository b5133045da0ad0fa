//! Property-style tests for quoting, matching, and the protocol seam.
//!
//! These pin behaviors that hold regardless of the specific scenario:
//! degenerate quotes produce no trades, the discount chain uses Manhattan
//! distance, swapped-in protocols go through the effect seam, and telemetry
//! cadence knobs do what they say.

use vmt_core::events::{Event, PairingAction};
use vmt_core::protocols::{Effect, MatchingProtocol, ProtocolContext, WorldView};
use vmt_core::{
    AgentId, AgentSpec, Inventory, MemorySink, Position, Protocols, ScenarioConfig, Simulation,
    Utility,
};

fn cobb_douglas() -> Utility {
    Utility::Ces {
        rho: 0.0,
        w_a: 0.5,
        w_b: 0.5,
    }
}

fn agent(id: u32, pos: (i32, i32), inv: (u64, u64)) -> AgentSpec {
    AgentSpec {
        id,
        pos: Position::new(pos.0, pos.1),
        inventory: Inventory::new(inv.0, inv.1),
        utility: cobb_douglas(),
    }
}

fn barter_config(name: &str, agents: Vec<AgentSpec>) -> ScenarioConfig {
    let mut config = ScenarioConfig::minimal(name, 10, agents);
    config.params.forage_rate = 0;
    config
}

// === QUOTE DEGENERACY ===

#[test]
fn identical_agents_with_zero_spread_never_trade() {
    // Quotes cross exactly (ask == bid); surplus is never strictly
    // positive, so no pair ever forms.
    let config = barter_config(
        "mirror",
        vec![agent(0, (1, 1), (5, 5)), agent(1, (1, 2), (5, 5))],
    );
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid");
    sim.run(15).expect("run");
    assert!(sim.sink().pairings().is_empty());
    assert!(sim.sink().trades().is_empty());
}

#[test]
fn concave_agents_with_different_holdings_find_a_block() {
    let config = barter_config(
        "concave",
        vec![agent(0, (1, 1), (6, 4)), agent(1, (1, 2), (4, 6))],
    );
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid");
    sim.run(10).expect("run");
    assert!(
        !sim.sink().trades().is_empty(),
        "strictly concave utilities with unequal holdings must trade at spread 0"
    );
}

// === DISCOUNT CHAIN ===

#[test]
fn preference_discount_uses_manhattan_distance() {
    // Distance 3 between the agents: (1,1) -> (2,3).
    let config = barter_config(
        "discounted",
        vec![agent(0, (1, 1), (8, 2)), agent(1, (2, 3), (2, 8))],
    );
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid");
    sim.step().expect("tick 0");
    let events = &sim.sink().events;
    let pref = events
        .iter()
        .find_map(|e| match e {
            Event::Preference(p) if p.agent_id == AgentId(0) => Some(p),
            _ => None,
        })
        .expect("agent 0 must rank agent 1");
    assert_eq!(pref.distance, 3);
    let expected = pref.surplus * 0.95f64.powi(3);
    assert!(
        (pref.discounted_surplus - expected).abs() < 1e-12,
        "discount must be beta^manhattan: {} vs {expected}",
        pref.discounted_surplus
    );
}

// === PROTOCOL SEAM ===

/// A matcher that pairs nobody. Everything still goes through Effects, so a
/// run with it must leave the pairing telemetry empty while the rest of the
/// tick machinery keeps running.
struct NoMatching;

impl MatchingProtocol for NoMatching {
    fn name(&self) -> &'static str {
        "no_matching"
    }

    fn run(&self, _view: &WorldView<'_>, _ctx: &mut ProtocolContext<'_>) -> Vec<Effect> {
        Vec::new()
    }
}

#[test]
fn swapped_matching_protocol_disables_pairing_only() {
    let config = barter_config(
        "no_match",
        vec![agent(0, (1, 1), (8, 2)), agent(1, (1, 2), (2, 8))],
    );
    let mut protocols = Protocols::defaults();
    protocols.matching = Box::new(NoMatching);
    let mut sim =
        Simulation::with_protocols(config, MemorySink::new(), protocols).expect("valid");
    sim.run(10).expect("run");

    assert!(sim.sink().pairings().is_empty());
    assert!(sim.sink().trades().is_empty());
    // Decisions still logged every tick for both agents (as idle).
    assert_eq!(sim.sink().decisions().len(), 20);
    // And an empty effect stream left the world untouched.
    let world = sim.world();
    assert_eq!(world.agent(AgentId(0)).inventory, Inventory::new(8, 2));
    assert_eq!(world.agent(AgentId(0)).pos, Position::new(1, 1));
    assert_eq!(world.agent(AgentId(1)).pos, Position::new(1, 2));
}

// === QUOTE REFRESH ===

#[test]
fn quotes_are_stable_while_inventories_are() {
    let config = barter_config(
        "stable_quotes",
        vec![agent(0, (1, 1), (5, 5)), agent(1, (8, 8), (5, 5))],
    );
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid");
    sim.step().expect("tick 0");
    let before = *sim.world().agent(AgentId(0)).quote.a_in_b.as_ref().unwrap();
    sim.step().expect("tick 1");
    let after = *sim.world().agent(AgentId(0)).quote.a_in_b.as_ref().unwrap();
    assert_eq!(before, after, "housekeeping refresh must be idempotent");
}

// === TELEMETRY CADENCE ===

#[test]
fn snapshot_frequency_gates_agent_snapshots() {
    let mut config = barter_config(
        "cadence",
        vec![agent(0, (1, 1), (5, 5)), agent(1, (8, 8), (5, 5))],
    );
    config.params.agent_snapshot_frequency = 2;
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid");
    sim.run(5).expect("run");
    let ticks: Vec<u64> = sim
        .sink()
        .agent_snapshots()
        .iter()
        .map(|s| s.tick)
        .collect();
    // Two agents, snapshots at ticks 0, 2, 4.
    assert_eq!(ticks, vec![0, 0, 2, 2, 4, 4]);
    // Barter regime: the money column is absent, not zero.
    assert!(sim.sink().agent_snapshots().iter().all(|s| s.m.is_none()));
}

#[test]
fn preference_logging_respects_top_k_and_full_switch() {
    // Four B-rich partners in range: the A-rich agent ranks all four.
    let agents = vec![
        agent(0, (5, 5), (12, 1)),
        agent(1, (5, 6), (1, 12)),
        agent(2, (5, 4), (2, 12)),
        agent(3, (4, 5), (3, 12)),
        agent(4, (6, 5), (4, 12)),
    ];

    let config = barter_config("top_k", agents.clone());
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid");
    sim.step().expect("tick 0");
    let for_agent_0 = sim
        .sink()
        .events
        .iter()
        .filter(|e| matches!(e, Event::Preference(p) if p.agent_id == AgentId(0)))
        .count();
    assert_eq!(for_agent_0, 3, "default logs the top 3 rows");

    let mut config = barter_config("full_prefs", agents);
    config.params.log_full_preferences = true;
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid");
    sim.step().expect("tick 0");
    let for_agent_0 = sim
        .sink()
        .events
        .iter()
        .filter(|e| matches!(e, Event::Preference(p) if p.agent_id == AgentId(0)))
        .count();
    assert_eq!(for_agent_0, 4, "full logging keeps every ranked row");
}

#[test]
fn trade_attempt_rows_only_when_enabled() {
    // The (10,9)/(9,10) pair overlaps in quotes but has no feasible integer
    // block: every attempt fails.
    let agents = vec![agent(0, (1, 1), (10, 9)), agent(1, (1, 2), (9, 10))];

    let config = barter_config("attempts_off", agents.clone());
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid");
    sim.step().expect("tick 0");
    assert!(
        !sim.sink()
            .events
            .iter()
            .any(|e| matches!(e, Event::TradeAttempt(_))),
        "attempt rows are debug-only"
    );

    let mut config = barter_config("attempts_on", agents);
    config.log.trade_attempts = true;
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid");
    sim.step().expect("tick 0");
    let attempts: Vec<_> = sim
        .sink()
        .events
        .iter()
        .filter_map(|e| match e {
            Event::TradeAttempt(t) => Some((t.tick, t.agent_i, t.agent_j)),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![(0, AgentId(0), AgentId(1))]);
}

// === PAIR PERSISTENCE ===

#[test]
fn pairs_persist_across_out_of_range_ticks() {
    // Pair forms at distance 4; partners need two ticks of walking before
    // they can bargain. The pair must survive the interim ticks untouched.
    let config = barter_config(
        "stale_perception",
        vec![agent(0, (1, 1), (8, 2)), agent(1, (5, 1), (2, 8))],
    );
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid");
    sim.step().expect("tick 0");
    // Paired but still out of interaction range: no trade, no unpair.
    assert_eq!(
        sim.sink()
            .pairings()
            .iter()
            .filter(|p| p.event == PairingAction::Pair)
            .count(),
        1
    );
    assert!(sim.sink().trades().is_empty());
    assert!(sim.world().agent(AgentId(0)).is_paired());

    sim.step().expect("tick 1");
    assert!(
        !sim.sink().trades().is_empty(),
        "once adjacent, the pair trades"
    );
}
