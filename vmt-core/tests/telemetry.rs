//! Telemetry plumbing: the columnar recorder sink must carry the same rows
//! as the in-memory sink, and its tables must convert cleanly to dataframes
//! for analysis.

#![cfg(feature = "instrument")]

use polars::prelude::*;

use vmt_core::events::Event;
use vmt_core::{
    AgentSpec, Inventory, MemorySink, Position, RecorderSink, ScenarioConfig, Simulation, Utility,
};

fn cobb_douglas() -> Utility {
    Utility::Ces {
        rho: 0.0,
        w_a: 0.5,
        w_b: 0.5,
    }
}

fn two_agent_config() -> ScenarioConfig {
    let mut config = ScenarioConfig::minimal(
        "telemetry",
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
    );
    config.params.forage_rate = 0;
    config.params.agent_snapshot_frequency = 1;
    config
}

#[test]
fn recorder_tables_match_the_event_stream() {
    let mut mem = Simulation::new(two_agent_config(), MemorySink::new()).expect("valid");
    mem.run(10).expect("run");
    let events = &mem.sink().events;

    let mut rec = Simulation::new(two_agent_config(), RecorderSink::new()).expect("valid");
    rec.run(10).expect("run");
    let recorder = rec.into_sink().into_recorder();

    let count = |f: fn(&Event) -> bool| events.iter().filter(|e| f(e)).count();
    assert_eq!(
        recorder.row_count("trade"),
        count(|e| matches!(e, Event::Trade(_)))
    );
    assert_eq!(
        recorder.row_count("decision"),
        count(|e| matches!(e, Event::Decision(_)))
    );
    assert_eq!(
        recorder.row_count("pairing"),
        count(|e| matches!(e, Event::Pairing(_)))
    );
    assert_eq!(
        recorder.row_count("agent_snapshot"),
        count(|e| matches!(e, Event::AgentSnapshot(_)))
    );
    assert_eq!(recorder.row_count("simulation_run"), 1);
}

#[test]
fn trade_table_converts_to_an_analyzable_dataframe() {
    let mut sim = Simulation::new(two_agent_config(), RecorderSink::new()).expect("valid");
    sim.run(10).expect("run");
    let frames = sim.into_sink().into_recorder().to_dataframes();

    let trades = frames.get("trade").expect("trade table");
    assert!(trades.height() >= 1);
    for column in ["tick", "buyer_id", "seller_id", "price", "da", "db", "dm"] {
        assert!(
            trades.column(column).is_ok(),
            "trade frame missing column {column}"
        );
    }
    // Barter run: the money leg is entirely null, but present.
    let dm = trades.column("dm").unwrap();
    assert_eq!(dm.null_count(), trades.height());

    // Surpluses are analyzable straight off the frame.
    let surplus = trades
        .column("surplus_buyer")
        .unwrap()
        .f64()
        .expect("surplus is f64");
    assert!(surplus.into_no_null_iter().all(|s| s > 0.0));
}
