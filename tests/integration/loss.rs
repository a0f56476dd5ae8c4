use trickle_core::LogGate;
use trickle_services::sim::run_scenario;
use trickle_services::{ClientState, ServerState};

use crate::*;

#[test]
fn test_lossy_link_shortens_output() -> Result<()> {
    let dir = scratch_dir("lossy")?;
    let payload = write_payload(&dir.join("payload.txt"), 50_000)?;

    let mut config = scenario_config(&dir);
    config.simulation.error_rate = 0.0005;
    let outcome = run_scenario(&config, &LogGate::default(), &LogGate::default())?;
    let report = &outcome.report;

    // No retransmission: every lost chunk is simply missing.
    assert_eq!(report.datagrams_unreachable, 0);
    assert_eq!(report.datagrams_delivered, report.datagrams_sent - report.datagrams_dropped);
    let request_delivered = report.datagrams_sent > 1;
    assert_eq!(
        outcome.chunks_received as u64,
        report.datagrams_delivered - u64::from(request_delivered)
    );
    assert_eq!(outcome.bytes_received, outcome.chunks_received as u64 * 1000);
    assert!(report.datagrams_dropped > 0);
    assert!(outcome.bytes_received < payload.len() as u64);

    let written = std::fs::read(&outcome.output)?;
    assert_eq!(written.len() as u64, outcome.bytes_received);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_same_seed_same_losses() -> Result<()> {
    let dir = scratch_dir("seeded")?;
    write_payload(&dir.join("payload.txt"), 30_000)?;

    let mut config = scenario_config(&dir);
    config.simulation.error_rate = 0.0003;
    config.simulation.seed = 7;

    let first = run_scenario(&config, &LogGate::default(), &LogGate::default())?;
    let first_output = std::fs::read(&first.output)?;
    let second = run_scenario(&config, &LogGate::default(), &LogGate::default())?;
    let second_output = std::fs::read(&second.output)?;

    assert_eq!(first.report, second.report);
    assert_eq!(first_output, second_output);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_lost_request_means_no_stream() -> Result<()> {
    let dir = scratch_dir("lost-request")?;
    write_payload(&dir.join("payload.txt"), 5_000)?;

    let mut config = scenario_config(&dir);
    config.simulation.error_rate = 1.0;
    let outcome = run_scenario(&config, &LogGate::default(), &LogGate::default())?;

    assert_eq!(outcome.report.datagrams_sent, 1);
    assert_eq!(outcome.report.datagrams_dropped, 1);
    assert_eq!(outcome.server_state, ServerState::Idle);
    assert_eq!(outcome.client_state, ClientState::Waiting);
    assert_eq!(outcome.bytes_received, 0);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
