//! Deterministic agent-based microeconomic simulation.
//!
//! Heterogeneous agents occupy integer cells of a finite grid, carry integer
//! inventories of goods A and B (and optionally money), and over discrete
//! ticks perceive neighbors, form bilateral trading pairs, move, trade,
//! forage, and regenerate resources. The output is a reproducible telemetry
//! stream suitable for economic analysis and teaching.
//!
//! ## The tick
//!
//! One `step()` runs exactly seven phases, in order:
//! perception, decision, movement, trade, forage, regeneration,
//! housekeeping. Agents are always processed in ascending id; unordered
//! pairs in ascending `(min_id, max_id)`. For a fixed `(scenario, seed)` the
//! emitted telemetry stream is bit-identical across runs.
//!
//! ## Hard rules
//!
//! - Every executed trade strictly improves both sides' total utility,
//!   evaluated on raw integer inventories.
//! - Goods are conserved except for harvest-triggered regeneration; money is
//!   conserved unconditionally.
//! - Protocols mutate nothing: they return [`protocols::Effect`] lists which
//!   the scheduler applies.
//!
//! ## Module structure
//!
//! - `types`       Ids, positions, goods, inventories
//! - `accounting`  Stock-flow snapshots and per-tick conservation checks
//! - `utility`     The closed set of utility families + quoting
//! - `grid`        Resource cells, harvest, regeneration
//! - `spatial`     Bucketed spatial index over agent positions
//! - `agent`       Agent state and per-tick scratch
//! - `perception`  Per-agent neighbor/resource snapshots
//! - `decision`    Three-pass matching and forage target search
//! - `movement`    Greedy Manhattan pursuit
//! - `bargaining`  Compensating-block trade search
//! - `protocols`   The effect/view seam between protocols and scheduler
//! - `scenario`    Input configuration and validation
//! - `events`      Typed telemetry events and sinks
//! - `world`       World state container
//! - `sim`         The seven-phase scheduler

pub mod accounting;
pub mod agent;
pub mod bargaining;
pub mod decision;
pub mod error;
pub mod events;
pub mod grid;
#[cfg(feature = "instrument")]
pub use instrument;
pub mod movement;
pub mod perception;
pub mod protocols;
pub mod scenario;
pub mod sim;
pub mod spatial;
pub mod types;
pub mod utility;
pub mod world;

// Re-export commonly used types at the crate root

// Core types
pub use types::{
    AgentId, ExchangeRegime, Good, Inventory, InventoryDelta, Mode, Position, Price, Tick,
    TradePair,
};

// Agents & utility
pub use agent::{Agent, Scratch, Target};
pub use utility::Utility;
pub use utility::quote::{PriceBand, Quote};

// World
pub use grid::{Cell, Grid};
pub use spatial::SpatialIndex;
pub use world::World;

// Scenario
pub use scenario::{
    AgentConfig, AgentGenerator, AgentSpec, AmountSpec, CellSpec, EndowmentRange, LogConfig,
    ModeSchedule, Params, ProtocolNames, ProtocolRef, ResourceConfig, ResourceSeed,
    ScenarioConfig, UtilityMix,
};

// Protocols
pub use bargaining::CompensatingBlock;
pub use decision::{DistanceDiscountedSearch, ThreePassMatching, compute_surplus};
pub use protocols::{
    BargainingProtocol, Effect, MatchingProtocol, ProtocolContext, Protocols, SearchProtocol,
    TradeTuple, WorldView,
};

// Telemetry
#[cfg(feature = "instrument")]
pub use events::RecorderSink;
pub use events::{Event, MemorySink, NullSink, PairReason, PairingAction, TargetType, TelemetrySink};

// Accounting
pub use accounting::{FlowSnapshot, TickFlow, capture_flow_snapshot, decompose_tick_flow};

// Errors & simulation
pub use error::{ScenarioError, SinkError};
pub use sim::Simulation;
