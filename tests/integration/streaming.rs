use std::time::Duration;

use trickle_core::LogGate;
use trickle_services::sim::run_scenario;
use trickle_services::{ClientState, ServerState};

use crate::*;

#[test]
fn test_text_file_arrives_intact() -> Result<()> {
    let dir = scratch_dir("text")?;
    let payload = write_payload(&dir.join("payload.txt"), 2500)?;

    let outcome = run_scenario(&scenario_config(&dir), &LogGate::default(), &LogGate::default())?;

    assert_eq!(outcome.chunks_received, 3);
    assert_eq!(outcome.bytes_received, 2500);
    assert_eq!(outcome.server_state, ServerState::Exhausted);
    assert_eq!(outcome.client_state, ClientState::Receiving);
    assert_eq!(std::fs::read(&outcome.output)?, payload);
    assert_eq!(outcome.report.datagrams_dropped, 0);

    let report = serde_json::to_value(&outcome.report)?;
    assert_eq!(report["datagrams_sent"], 4);
    assert_eq!(report["bytes_delivered"], 2500);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_stream_timing_follows_cadence() -> Result<()> {
    let dir = scratch_dir("timing")?;
    write_payload(&dir.join("payload.txt"), 10_000)?;

    let outcome = run_scenario(&scenario_config(&dir), &LogGate::default(), &LogGate::default())?;

    // Request at 1 s, ten chunks 60 ms apart starting one tick after the
    // request lands, then one more tick that finds the source empty.
    assert_eq!(outcome.chunks_received, 10);
    let last_tick = 1.0 + 11.0 * 0.06;
    assert!(outcome.report.elapsed_secs > last_tick);
    assert!(outcome.report.elapsed_secs < last_tick + 0.005);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_empty_payload_sends_nothing_back() -> Result<()> {
    let dir = scratch_dir("empty")?;
    write_payload(&dir.join("payload.txt"), 0)?;

    let outcome = run_scenario(&scenario_config(&dir), &LogGate::default(), &LogGate::default())?;

    assert_eq!(outcome.report.datagrams_sent, 1);
    assert_eq!(outcome.bytes_received, 0);
    assert_eq!(outcome.client_state, ClientState::Waiting);
    assert_eq!(std::fs::read(&outcome.output)?.len(), 0);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_stop_time_cuts_stream_short() -> Result<()> {
    let dir = scratch_dir("stop")?;
    write_payload(&dir.join("payload.txt"), 20_000)?;

    let mut config = scenario_config(&dir);
    config.simulation.stop_ms = 1_200;
    let outcome = run_scenario(&config, &LogGate::default(), &LogGate::default())?;

    assert_eq!(outcome.server_state, ServerState::Streaming);
    assert!(outcome.chunks_received > 0);
    assert!(outcome.chunks_received < 20);
    assert_eq!(outcome.report.elapsed_secs, Duration::from_millis(1_200).as_secs_f64());
    assert_eq!(std::fs::read(&outcome.output)?.len() as u64, outcome.bytes_received);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_missing_payload_is_reported() -> Result<()> {
    let dir = scratch_dir("missing")?;

    let err = run_scenario(&scenario_config(&dir), &LogGate::default(), &LogGate::default())
        .unwrap_err();
    assert!(err.to_string().contains("payload.txt"));
    assert!(!dir.join("text_out.txt").exists());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
