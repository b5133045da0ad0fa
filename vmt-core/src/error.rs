//! Error types for the core.
//!
//! Only two kinds of failure are recoverable enough to surface as `Result`:
//! bad scenario configuration (fatal before tick 0) and telemetry sink
//! failures (fatal at the tick boundary). Invariant violations inside the
//! tick engine are programmer errors and panic with a diagnostic naming the
//! tick, agents, and phase involved.

use crate::types::AgentId;

/// A scenario failed validation or could not be constructed.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("grid size must be >= 1, got {0}")]
    GridSize(i32),

    #[error("agent {id} placed at ({x}, {y}), outside the {n}x{n} grid")]
    AgentOutOfBounds { id: AgentId, x: i32, y: i32, n: i32 },

    #[error("duplicate agent id {0}")]
    DuplicateAgentId(AgentId),

    #[error("utility mix weights sum to {0}, expected 1.0")]
    MixWeights(f64),

    #[error("{family} utility parameter {param} = {value} is invalid: {why}")]
    UtilityParam {
        family: &'static str,
        param: &'static str,
        value: f64,
        why: &'static str,
    },

    #[error("agent {id}: Stone-Geary endowment ({a}, {b}) below subsistence ({gamma_a}, {gamma_b})")]
    BelowSubsistence {
        id: AgentId,
        a: u64,
        b: u64,
        gamma_a: f64,
        gamma_b: f64,
    },

    #[error("parameter {param} = {value} out of range: {why}")]
    Param {
        param: &'static str,
        value: f64,
        why: &'static str,
    },

    #[error("mode schedule: {0}")]
    ModeSchedule(&'static str),

    #[error("resource seed: {0}")]
    ResourceSeed(&'static str),

    #[error("unknown {kind} protocol {name:?} (version {version:?})")]
    UnknownProtocol {
        kind: &'static str,
        name: String,
        version: String,
    },

    #[error("money inventory present but exchange regime is barter_only")]
    MoneyWithoutRegime,
}

/// The telemetry sink rejected an event or failed to flush.
///
/// Sinks buffer to tick boundaries, so a failure aborts the run between
/// ticks, never mid-tick.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("telemetry sink I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("telemetry sink: {0}")]
    Other(String),
}
