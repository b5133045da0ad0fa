//! Simulation driver: load a YAML scenario, run it, persist telemetry.
//!
//! The core is deliberately I/O-free; everything filesystem-shaped (scenario
//! files, output directories, log formatting) lives here.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use vmt_core::{RecorderSink, ScenarioConfig, Simulation};

#[derive(Parser)]
#[command(name = "vmt", version, about = "Deterministic microeconomic simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scenario and write telemetry tables.
    Run {
        scenario: PathBuf,
        /// Override the scenario's seed.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = 1000)]
        max_ticks: u64,
        /// Parent directory for the run's telemetry tables.
        #[arg(long, default_value = "data")]
        out: PathBuf,
        #[arg(long, value_enum, default_value = "csv")]
        format: Format,
    },
    /// Validate a scenario file and exit.
    Validate { scenario: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Parquet,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match Cli::parse().command {
        Command::Run {
            scenario,
            seed,
            max_ticks,
            out,
            format,
        } => run(&scenario, seed, max_ticks, &out, format),
        Command::Validate { scenario } => {
            let config = load_scenario(&scenario)?;
            config
                .validate()
                .with_context(|| format!("{} is invalid", scenario.display()))?;
            tracing::info!(scenario = %config.name, "scenario is valid");
            Ok(())
        }
    }
}

fn load_scenario(path: &Path) -> Result<ScenarioConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn run(
    scenario_path: &Path,
    seed: Option<u64>,
    max_ticks: u64,
    out: &Path,
    format: Format,
) -> Result<()> {
    let mut config = load_scenario(scenario_path)?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    let run_name = format!("{}_{}", config.name, config.seed);
    tracing::info!(
        scenario = %config.name,
        seed = config.seed,
        max_ticks,
        "starting run"
    );

    let mut sim = Simulation::new(config, RecorderSink::new())
        .context("scenario failed validation")?;
    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default();
    sim.set_started_at(started);

    sim.run(max_ticks).context("telemetry sink failure")?;

    let recorder = sim.into_sink().into_recorder();
    let trades = recorder.row_count("trade");
    let harvests = recorder.row_count("harvest");
    let pairings = recorder.row_count("pairing");
    let out_format = match format {
        Format::Csv => instrument::OutputFormat::Csv,
        Format::Parquet => instrument::OutputFormat::Parquet,
    };
    let mut scoped = instrument::ScopedRecorder::new(out.join(run_name), out_format);
    scoped.set_recorder(recorder);
    let run_dir = scoped
        .finish()
        .map_err(|e| anyhow::anyhow!("writing telemetry: {e}"))?;

    tracing::info!(
        ticks = max_ticks,
        trades,
        harvests,
        pairings,
        out = %run_dir.display(),
        "run complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_scenario_parses_and_validates() {
        let yaml = r#"
name: smoke
grid_size: 5
seed: 7
agents:
  explicit:
    - id: 0
      pos: { x: 1, y: 1 }
      inventory: { a: 8, b: 2 }
      utility: { family: ces, rho: 0.0, w_a: 0.5, w_b: 0.5 }
    - id: 1
      pos: { x: 2, y: 2 }
      inventory: { a: 2, b: 8 }
      utility: { family: ces, rho: 0.0, w_a: 0.5, w_b: 0.5 }
params:
  spread: 0.0
  vision_radius: 5
"#;
        let config: ScenarioConfig = serde_yaml::from_str(yaml).expect("yaml should parse");
        config.validate().expect("scenario should validate");
        assert_eq!(config.seed, 7);
        assert_eq!(config.agents.explicit.len(), 2);
    }

    #[test]
    fn run_writes_tables_and_sentinel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scenario = dir.path().join("two.yaml");
        std::fs::write(
            &scenario,
            r#"
name: two
grid_size: 5
agents:
  explicit:
    - id: 0
      pos: { x: 1, y: 1 }
      inventory: { a: 8, b: 2 }
      utility: { family: ces, rho: 0.0, w_a: 0.5, w_b: 0.5 }
    - id: 1
      pos: { x: 2, y: 2 }
      inventory: { a: 2, b: 8 }
      utility: { family: ces, rho: 0.0, w_a: 0.5, w_b: 0.5 }
"#,
        )
        .expect("write scenario");
        run(&scenario, Some(3), 10, dir.path(), Format::Csv).expect("run should succeed");
        let run_dir = dir.path().join("two_3");
        assert!(run_dir.join("_ready").exists(), "sentinel missing");
        assert!(run_dir.join("trade.csv").exists(), "trade table missing");
        assert!(run_dir.join("decision.csv").exists(), "decision table missing");
    }
}
