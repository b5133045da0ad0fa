//! Typed telemetry event stream.
//!
//! The core appends events to an abstract [`TelemetrySink`] during the
//! decision, trade, forage, and housekeeping phases; physical encoding is
//! the sink's concern. Sinks may batch internally but must flush in
//! tick-monotonic order — `flush_tick` marks the boundary.
//!
//! Determinism contract: for a fixed `(scenario, seed)` the event sequence
//! is bit-identical across runs, after normalizing the run header.

use serde::Serialize;

use crate::error::SinkError;
use crate::types::{AgentId, Good, Mode, Position, Price, Tick, TradePair};

// === EVENT KINDS ===

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    TradePaired,
    TradeNewPair,
    Trade,
    Forage,
    Idle,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::TradePaired => "trade_paired",
            TargetType::TradeNewPair => "trade_new_pair",
            TargetType::Trade => "trade",
            TargetType::Forage => "forage",
            TargetType::Idle => "idle",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingAction {
    Pair,
    Unpair,
}

impl PairingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairingAction::Pair => "pair",
            PairingAction::Unpair => "unpair",
        }
    }
}

/// Why a pair formed or dissolved.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairReason {
    /// Pass 2: both agents ranked each other first.
    MutualConsent,
    /// Pass 3: surplus-greedy fallback.
    GreedyFallback,
    /// Bargaining exhausted every direction without a feasible block.
    TradeFailed,
    /// The mode schedule rolled over.
    ModeSwitch,
    /// Housekeeping integrity sweep found an asymmetric pairing.
    Integrity,
}

impl PairReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairReason::MutualConsent => "mutual_consent",
            PairReason::GreedyFallback => "greedy_fallback",
            PairReason::TradeFailed => "trade_failed",
            PairReason::ModeSwitch => "mode_switch",
            PairReason::Integrity => "integrity",
        }
    }
}

// === EVENT PAYLOADS ===

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunInfo {
    pub run_id: String,
    pub scenario_name: String,
    pub seed: u64,
    pub n_agents: u32,
    pub grid_size: i32,
    /// Wall-clock stamp supplied by the driver; empty when the driver wants
    /// byte-identical streams across runs.
    pub started_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub tick: Tick,
    pub agent_id: AgentId,
    pub x: i32,
    pub y: i32,
    pub a: u64,
    pub b: u64,
    pub m: Option<u64>,
    pub utility: f64,
    pub paired_with: Option<AgentId>,
    pub target_agent: Option<AgentId>,
    pub target_x: Option<i32>,
    pub target_y: Option<i32>,
    pub ask_a_in_b: Option<Price>,
    pub bid_a_in_b: Option<Price>,
    pub ask_a_in_m: Option<Price>,
    pub bid_a_in_m: Option<Price>,
    pub ask_b_in_m: Option<Price>,
    pub bid_b_in_m: Option<Price>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    pub tick: Tick,
    pub x: i32,
    pub y: i32,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Decision {
    pub tick: Tick,
    pub agent_id: AgentId,
    pub partner_id: Option<AgentId>,
    pub expected_surplus: Option<f64>,
    pub target_type: TargetType,
    pub target_x: Option<i32>,
    pub target_y: Option<i32>,
    pub num_neighbors: u32,
    pub mode: Mode,
    pub is_paired: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Preference {
    pub tick: Tick,
    pub agent_id: AgentId,
    pub partner_id: AgentId,
    pub rank: u32,
    pub surplus: f64,
    pub discounted_surplus: f64,
    pub distance: u32,
}

/// `agent_i < agent_j` always.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pairing {
    pub tick: Tick,
    pub agent_i: AgentId,
    pub agent_j: AgentId,
    pub event: PairingAction,
    pub reason: PairReason,
    pub surplus_i: Option<f64>,
    pub surplus_j: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trade {
    pub tick: Tick,
    pub buyer_id: AgentId,
    pub seller_id: AgentId,
    #[serde(rename = "pair_type")]
    pub pair: TradePair,
    pub da: u64,
    pub db: u64,
    pub dm: Option<u64>,
    pub price: Price,
    pub surplus_buyer: f64,
    pub surplus_seller: f64,
    pub x: i32,
    pub y: i32,
}

/// Debug-only record of a bargaining call that did not execute a trade.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TradeAttempt {
    pub tick: Tick,
    pub agent_i: AgentId,
    pub agent_j: AgentId,
    pub outcome: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Harvest {
    pub tick: Tick,
    pub agent_id: AgentId,
    pub x: i32,
    pub y: i32,
    pub good: Good,
    pub amount: u64,
}

// === EVENT ===

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    SimulationRun(RunInfo),
    AgentSnapshot(AgentSnapshot),
    ResourceSnapshot(ResourceSnapshot),
    Decision(Decision),
    Preference(Preference),
    Pairing(Pairing),
    Trade(Trade),
    TradeAttempt(TradeAttempt),
    Harvest(Harvest),
}

// === SINK ===

/// Abstract telemetry consumer. Append-only; implementations must preserve
/// insertion order and may not fail mid-tick (buffer and surface errors at
/// `flush_tick`).
pub trait TelemetrySink {
    fn record(&mut self, event: &Event) -> Result<(), SinkError>;

    /// Tick boundary: everything recorded up to and including `tick` must be
    /// durable (or buffered durably) when this returns.
    fn flush_tick(&mut self, _tick: Tick) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Discards everything.
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&mut self, _event: &Event) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Vec-backed sink for tests and analysis.
#[derive(Default)]
pub struct MemorySink {
    pub events: Vec<Event>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> Vec<&Trade> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Trade(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn pairings(&self) -> Vec<&Pairing> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Pairing(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn decisions(&self) -> Vec<&Decision> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Decision(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn harvests(&self) -> Vec<&Harvest> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Harvest(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    pub fn agent_snapshots(&self) -> Vec<&AgentSnapshot> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::AgentSnapshot(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl TelemetrySink for MemorySink {
    fn record(&mut self, event: &Event) -> Result<(), SinkError> {
        self.events.push(event.clone());
        Ok(())
    }
}

// === COLUMNAR RECORDER SINK ===

#[cfg(feature = "instrument")]
mod recorder_sink {
    use instrument::{Recorder, Value};

    use super::*;

    /// Sink that lays events out as columnar tables (one per event kind)
    /// via the `instrument` crate, ready for dataframe analysis or on-disk
    /// persistence by the driver.
    #[derive(Default)]
    pub struct RecorderSink {
        pub recorder: Recorder,
    }

    impl RecorderSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn into_recorder(self) -> Recorder {
            self.recorder
        }
    }

    fn opt_id(id: Option<AgentId>) -> Value {
        Value::from(id.map(|a| u64::from(a.0)))
    }

    impl TelemetrySink for RecorderSink {
        fn record(&mut self, event: &Event) -> Result<(), SinkError> {
            let rec = &mut self.recorder;
            match event {
                Event::SimulationRun(r) => rec.push_row(
                    "simulation_run",
                    &[
                        ("run_id", Value::from(r.run_id.as_str())),
                        ("scenario_name", Value::from(r.scenario_name.as_str())),
                        ("seed", Value::from(r.seed)),
                        ("n_agents", Value::from(u64::from(r.n_agents))),
                        ("grid_size", Value::from(i64::from(r.grid_size))),
                        ("started_at", Value::from(r.started_at.as_str())),
                    ],
                ),
                Event::AgentSnapshot(s) => rec.push_row(
                    "agent_snapshot",
                    &[
                        ("tick", Value::from(s.tick)),
                        ("agent_id", Value::from(u64::from(s.agent_id.0))),
                        ("x", Value::from(i64::from(s.x))),
                        ("y", Value::from(i64::from(s.y))),
                        ("a", Value::from(s.a)),
                        ("b", Value::from(s.b)),
                        ("m", Value::from(s.m)),
                        ("utility", Value::from(s.utility)),
                        ("paired_with", opt_id(s.paired_with)),
                        ("target_agent", opt_id(s.target_agent)),
                        ("target_x", Value::from(s.target_x.map(i64::from))),
                        ("target_y", Value::from(s.target_y.map(i64::from))),
                        ("ask_a_in_b", Value::from(s.ask_a_in_b)),
                        ("bid_a_in_b", Value::from(s.bid_a_in_b)),
                        ("ask_a_in_m", Value::from(s.ask_a_in_m)),
                        ("bid_a_in_m", Value::from(s.bid_a_in_m)),
                        ("ask_b_in_m", Value::from(s.ask_b_in_m)),
                        ("bid_b_in_m", Value::from(s.bid_b_in_m)),
                    ],
                ),
                Event::ResourceSnapshot(s) => rec.push_row(
                    "resource_snapshot",
                    &[
                        ("tick", Value::from(s.tick)),
                        ("x", Value::from(i64::from(s.x))),
                        ("y", Value::from(i64::from(s.y))),
                        ("amount", Value::from(s.amount)),
                    ],
                ),
                Event::Decision(d) => rec.push_row(
                    "decision",
                    &[
                        ("tick", Value::from(d.tick)),
                        ("agent_id", Value::from(u64::from(d.agent_id.0))),
                        ("partner_id", opt_id(d.partner_id)),
                        ("expected_surplus", Value::from(d.expected_surplus)),
                        ("target_type", Value::from(d.target_type.as_str())),
                        ("target_x", Value::from(d.target_x.map(i64::from))),
                        ("target_y", Value::from(d.target_y.map(i64::from))),
                        ("num_neighbors", Value::from(u64::from(d.num_neighbors))),
                        ("mode", Value::from(d.mode.to_string())),
                        ("is_paired", Value::from(d.is_paired)),
                    ],
                ),
                Event::Preference(p) => rec.push_row(
                    "preference",
                    &[
                        ("tick", Value::from(p.tick)),
                        ("agent_id", Value::from(u64::from(p.agent_id.0))),
                        ("partner_id", Value::from(u64::from(p.partner_id.0))),
                        ("rank", Value::from(u64::from(p.rank))),
                        ("surplus", Value::from(p.surplus)),
                        ("discounted_surplus", Value::from(p.discounted_surplus)),
                        ("distance", Value::from(u64::from(p.distance))),
                    ],
                ),
                Event::Pairing(p) => rec.push_row(
                    "pairing",
                    &[
                        ("tick", Value::from(p.tick)),
                        ("agent_i", Value::from(u64::from(p.agent_i.0))),
                        ("agent_j", Value::from(u64::from(p.agent_j.0))),
                        ("event", Value::from(p.event.as_str())),
                        ("reason", Value::from(p.reason.as_str())),
                        ("surplus_i", Value::from(p.surplus_i)),
                        ("surplus_j", Value::from(p.surplus_j)),
                    ],
                ),
                Event::Trade(t) => rec.push_row(
                    "trade",
                    &[
                        ("tick", Value::from(t.tick)),
                        ("buyer_id", Value::from(u64::from(t.buyer_id.0))),
                        ("seller_id", Value::from(u64::from(t.seller_id.0))),
                        ("pair_type", Value::from(t.pair.to_string())),
                        ("da", Value::from(t.da)),
                        ("db", Value::from(t.db)),
                        ("dm", Value::from(t.dm)),
                        ("price", Value::from(t.price)),
                        ("surplus_buyer", Value::from(t.surplus_buyer)),
                        ("surplus_seller", Value::from(t.surplus_seller)),
                        ("x", Value::from(i64::from(t.x))),
                        ("y", Value::from(i64::from(t.y))),
                    ],
                ),
                Event::TradeAttempt(t) => rec.push_row(
                    "trade_attempt",
                    &[
                        ("tick", Value::from(t.tick)),
                        ("agent_i", Value::from(u64::from(t.agent_i.0))),
                        ("agent_j", Value::from(u64::from(t.agent_j.0))),
                        ("outcome", Value::from(t.outcome.as_str())),
                    ],
                ),
                Event::Harvest(h) => rec.push_row(
                    "harvest",
                    &[
                        ("tick", Value::from(h.tick)),
                        ("agent_id", Value::from(u64::from(h.agent_id.0))),
                        ("x", Value::from(i64::from(h.x))),
                        ("y", Value::from(i64::from(h.y))),
                        ("good", Value::from(h.good.to_string())),
                        ("amount", Value::from(h.amount)),
                    ],
                ),
            }
            Ok(())
        }
    }
}

#[cfg(feature = "instrument")]
pub use recorder_sink::RecorderSink;
