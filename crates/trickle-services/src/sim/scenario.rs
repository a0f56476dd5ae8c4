//! Two-node streaming scenario.
//!
//! Builds a point-to-point topology, starts a server on the first node and
//! a client on the second, runs the simulation to completion (or to the
//! configured stop time), then tears both sessions down.

use std::path::PathBuf;
use std::time::Duration;

use trickle_core::config::TrickleConfig;
use trickle_core::{LogGate, SessionError};

use crate::client::{ClientOptions, ClientRegistry, ClientState, StreamingClient};
use crate::server::{ServerOptions, ServerRegistry, ServerState, StreamingServer};

use super::{LinkConfig, SimError, SimReport, Simulator};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// What a finished scenario left behind.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub report: SimReport,
    pub server_state: ServerState,
    pub client_state: ClientState,
    pub chunks_received: usize,
    pub bytes_received: u64,
    pub output: PathBuf,
}

/// Run one scenario. Both log gates are reopened first so each run logs
/// its own first seconds.
pub fn run_scenario(
    config: &TrickleConfig,
    server_log: &LogGate,
    client_log: &LogGate,
) -> Result<ScenarioOutcome, ScenarioError> {
    server_log.reset();
    client_log.reset();

    let sim = Simulator::with_seed(config.simulation.seed);
    let (server_node, client_node) = sim.point_to_point(LinkConfig::from(&config.simulation));
    let env = sim.environment();

    let servers = ServerRegistry::new();
    let clients = ClientRegistry::new();

    let server = StreamingServer::start(
        &server_node,
        ServerOptions::from(&config.server),
        env.clone(),
        servers,
        server_log.clone(),
    )?;
    let client = match StreamingClient::start(
        &client_node,
        ClientOptions::from_settings(server_node.addr(), config.server.port, &config.client),
        env,
        clients,
        client_log.clone(),
    ) {
        Ok(client) => client,
        Err(e) => {
            server.close();
            return Err(e.into());
        }
    };

    let run = match config.simulation.stop_ms {
        0 => sim.run(),
        ms => sim.run_until(Duration::from_millis(ms)),
    };

    let server_state = server.state();
    let client_state = client.state();
    let closed = client.close();
    server.close();
    sim.destroy();

    let report = run?;
    closed?;

    tracing::info!(
        elapsed = report.elapsed_secs,
        sent = report.datagrams_sent,
        delivered = report.datagrams_delivered,
        dropped = report.datagrams_dropped,
        "simulation finished"
    );

    Ok(ScenarioOutcome {
        report,
        server_state,
        client_state,
        chunks_received: client.chunks_received(),
        bytes_received: client.bytes_received(),
        output: client.output_path().to_path_buf(),
    })
}
