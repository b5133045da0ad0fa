//! Protocol seam: immutable views in, effect lists out.
//!
//! A protocol never touches world state. It reads a [`WorldView`], may use
//! the per-tick scratch arena and the simulation RNG through
//! [`ProtocolContext`], and returns [`Effect`]s which the scheduler applies
//! in insertion order. This is the only legal mutation channel, and it is
//! what makes protocols swappable without touching the tick engine.
//!
//! None of the built-in protocols draw from the RNG; a replacement that does
//! must document its order of draws, since the RNG stream is part of the
//! determinism contract.

use rand::rngs::StdRng;

use crate::agent::{Scratch, Target};
use crate::error::ScenarioError;
use crate::events::PairReason;
use crate::scenario::{LogConfig, Params, ProtocolNames};
use crate::types::{AgentId, ExchangeRegime, Mode, Position, Price, Tick, TradePair};
use crate::world::World;

// === EFFECTS ===

/// A compensating-block trade ready to execute.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TradeTuple {
    pub buyer: AgentId,
    pub seller: AgentId,
    pub pair: TradePair,
    /// Units of the traded good, seller -> buyer.
    pub qty: u64,
    /// Units of the payment good, buyer -> seller.
    pub pay: u64,
    pub price: Price,
    pub surplus_buyer: f64,
    pub surplus_seller: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Pair {
        a: AgentId,
        b: AgentId,
        reason: PairReason,
        surplus: Option<f64>,
    },
    Unpair {
        a: AgentId,
        b: AgentId,
        reason: PairReason,
        /// Whether the split starts a mutual trade cooldown (trade failure
        /// does, a mode switch does not).
        cooldown: bool,
    },
    SetTarget {
        agent: AgentId,
        target: Option<Target>,
    },
    ClaimResource {
        agent: AgentId,
        cell: Position,
    },
    ReleaseClaim {
        agent: AgentId,
        cell: Position,
    },
    Trade(TradeTuple),
}

// === VIEWS ===

/// Read-only view of the world a protocol runs against.
pub struct WorldView<'a> {
    pub world: &'a World,
    pub tick: Tick,
    pub mode: Mode,
}

/// Mutable context lent to a protocol for the duration of one call.
pub struct ProtocolContext<'a> {
    pub params: &'a Params,
    pub regime: ExchangeRegime,
    pub lambda: f64,
    pub log: &'a LogConfig,
    pub rng: &'a mut StdRng,
    /// Per-agent scratch, index-aligned with `world.agents()`.
    pub scratch: &'a mut [Scratch],
}

// === PROTOCOL TRAITS ===

/// Builds trading pairs and trade targets (the three-pass matcher by
/// default).
pub trait MatchingProtocol {
    fn name(&self) -> &'static str;
    fn version(&self) -> &'static str {
        "1"
    }
    fn run(&self, view: &WorldView<'_>, ctx: &mut ProtocolContext<'_>) -> Vec<Effect>;
}

/// Picks forage targets and claims for agents the matcher left undecided.
pub trait SearchProtocol {
    fn name(&self) -> &'static str;
    fn version(&self) -> &'static str {
        "1"
    }
    fn run(&self, view: &WorldView<'_>, ctx: &mut ProtocolContext<'_>) -> Vec<Effect>;
}

/// Negotiates one pair's trade attempt for the tick.
pub trait BargainingProtocol {
    fn name(&self) -> &'static str;
    fn version(&self) -> &'static str {
        "1"
    }
    fn bargain(
        &self,
        view: &WorldView<'_>,
        a: AgentId,
        b: AgentId,
        ctx: &mut ProtocolContext<'_>,
    ) -> Vec<Effect>;
}

// === PROTOCOL SET ===

/// The three pre-constructed protocol objects a simulation consumes.
pub struct Protocols {
    pub search: Box<dyn SearchProtocol>,
    pub matching: Box<dyn MatchingProtocol>,
    pub bargaining: Box<dyn BargainingProtocol>,
}

impl Protocols {
    pub fn defaults() -> Self {
        Self {
            search: Box::new(crate::decision::DistanceDiscountedSearch),
            matching: Box::new(crate::decision::ThreePassMatching),
            bargaining: Box::new(crate::bargaining::CompensatingBlock),
        }
    }

    /// Map scenario protocol names onto the built-in objects. A richer
    /// registry lives outside the core; unknown names are a configuration
    /// error.
    pub fn resolve(names: &ProtocolNames) -> Result<Self, ScenarioError> {
        let defaults = Self::defaults();
        for (kind, reference, name, version) in [
            (
                "search",
                &names.search,
                defaults.search.name(),
                defaults.search.version(),
            ),
            (
                "matching",
                &names.matching,
                defaults.matching.name(),
                defaults.matching.version(),
            ),
            (
                "bargaining",
                &names.bargaining,
                defaults.bargaining.name(),
                defaults.bargaining.version(),
            ),
        ] {
            if reference.name != name || reference.version != version {
                return Err(ScenarioError::UnknownProtocol {
                    kind,
                    name: reference.name.clone(),
                    version: reference.version.clone(),
                });
            }
        }
        Ok(defaults)
    }
}
