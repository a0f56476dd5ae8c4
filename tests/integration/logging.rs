use std::time::Duration;

use trickle_core::LogGate;
use trickle_services::sim::run_scenario;

use crate::*;

#[test]
fn test_short_run_stays_inside_cutoff() -> Result<()> {
    let dir = scratch_dir("log-short")?;
    write_payload(&dir.join("payload.txt"), 3_000)?;

    let server_log = LogGate::default();
    let client_log = LogGate::default();
    run_scenario(&scenario_config(&dir), &server_log, &client_log)?;

    assert!(server_log.is_open());
    assert!(client_log.is_open());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_long_run_closes_gates_and_next_run_reopens() -> Result<()> {
    let dir = scratch_dir("log-long")?;
    // 80 chunks at 60 ms run well past the 5 s cutoff.
    write_payload(&dir.join("payload.txt"), 80_000)?;

    let server_log = LogGate::default();
    let client_log = LogGate::default();
    let config = scenario_config(&dir);

    let outcome = run_scenario(&config, &server_log, &client_log)?;
    assert_eq!(outcome.bytes_received, 80_000);
    assert!(!server_log.is_open());
    assert!(!client_log.is_open());

    // Each run starts with its gates open again.
    write_payload(&dir.join("payload.txt"), 1_000)?;
    run_scenario(&config, &server_log, &client_log)?;
    assert!(server_log.is_open());
    assert!(client_log.is_open());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_cutoff_is_configurable() -> Result<()> {
    let dir = scratch_dir("log-cutoff")?;
    write_payload(&dir.join("payload.txt"), 2_000)?;

    // The request goes out at 1 s, already past a 500 ms cutoff.
    let server_log = LogGate::new(Duration::from_millis(500));
    let client_log = LogGate::new(Duration::from_millis(500));
    run_scenario(&scenario_config(&dir), &server_log, &client_log)?;

    assert!(!server_log.is_open());
    assert!(!client_log.is_open());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
