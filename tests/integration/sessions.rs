use std::net::Ipv4Addr;
use std::time::Duration;

use trickle_core::{LogGate, SessionError};
use trickle_services::sim::SimError;
use trickle_services::{
    ClientOptions, ClientRegistry, LinkConfig, ServerOptions, ServerRegistry, Simulator,
    StreamingClient, StreamingServer,
};

use crate::*;

#[test]
fn test_two_clients_drain_one_source() -> Result<()> {
    let dir = scratch_dir("two-clients")?;
    let payload = write_payload(&dir.join("payload.txt"), 4_000)?;

    let sim = Simulator::new();
    let server_node = sim.add_node(Ipv4Addr::new(10, 0, 0, 1));
    let a_node = sim.add_node(Ipv4Addr::new(10, 0, 0, 2));
    let b_node = sim.add_node(Ipv4Addr::new(10, 0, 0, 3));
    sim.connect(&server_node, &a_node, LinkConfig::default());
    sim.connect(&server_node, &b_node, LinkConfig::default());
    let env = sim.environment();

    let log = LogGate::default();
    let server = StreamingServer::start(
        &server_node,
        ServerOptions {
            payload: Some(dir.join("payload.txt")),
            ..ServerOptions::default()
        },
        env.clone(),
        ServerRegistry::new(),
        log.clone(),
    )?;

    let clients = ClientRegistry::new();
    let a = StreamingClient::start(
        &a_node,
        ClientOptions::new(server_node.addr(), dir.join("a.txt")),
        env.clone(),
        clients.clone(),
        log.clone(),
    )?;
    let b = StreamingClient::start(
        &b_node,
        ClientOptions::new(server_node.addr(), dir.join("b.txt")),
        env,
        clients.clone(),
        log,
    )?;
    assert_eq!(clients.len(), 2);

    sim.run()?;

    // Both requests start a send loop; the loops take turns on one source.
    assert_eq!(a.bytes_received() + b.bytes_received(), payload.len() as u64);
    assert_eq!(a.chunks_received(), 2);
    assert_eq!(b.chunks_received(), 2);
    let stats = server.stream_stats(a.local_endpoint()).context("no stream for a")?;
    assert_eq!(stats.chunks_sent, 2);

    a.close()?;
    b.close()?;
    server.close();
    assert!(clients.is_empty());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_servers_on_separate_ports_stream_independently() -> Result<()> {
    let dir = scratch_dir("two-servers")?;
    let text = write_payload(&dir.join("payload.txt"), 2_000)?;
    let media: Vec<u8> = (0..5_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(dir.join("media.bin"), &media)?;

    let sim = Simulator::new();
    let (server_node, client_node) = sim.point_to_point(LinkConfig::default());
    let env = sim.environment();
    let servers = ServerRegistry::new();
    let clients = ClientRegistry::new();

    let text_server = StreamingServer::start(
        &server_node,
        ServerOptions {
            payload: Some(dir.join("payload.txt")),
            ..ServerOptions::default()
        },
        env.clone(),
        servers.clone(),
        LogGate::default(),
    )?;
    let media_server = StreamingServer::start(
        &server_node,
        ServerOptions {
            port: 2346,
            payload: Some(dir.join("media.bin")),
            chunk_size: trickle_core::chunk::MEDIA_CHUNK_SIZE,
            cadence: Duration::from_millis(20),
        },
        env.clone(),
        servers.clone(),
        LogGate::default(),
    )?;
    assert_eq!(servers.len(), 2);

    let text_client = StreamingClient::start(
        &client_node,
        ClientOptions::new(server_node.addr(), dir.join("text_out.txt")),
        env.clone(),
        clients.clone(),
        LogGate::default(),
    )?;
    let mut media_options = ClientOptions::new(server_node.addr(), dir.join("media_out.bin"));
    media_options.port = 2346;
    let media_client = StreamingClient::start(
        &client_node,
        media_options,
        env,
        clients.clone(),
        LogGate::default(),
    )?;

    sim.run()?;

    assert_eq!(text_client.chunks_received(), 2);
    assert_eq!(media_client.chunks_received(), 4);

    text_client.close()?;
    media_client.close()?;
    text_server.close();
    media_server.close();

    assert_eq!(std::fs::read(dir.join("text_out.txt"))?, text);
    assert_eq!(std::fs::read(dir.join("media_out.bin"))?, media);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_server_closed_mid_stream_aborts_run() -> Result<()> {
    let dir = scratch_dir("closed-mid-stream")?;
    write_payload(&dir.join("payload.txt"), 10_000)?;

    let sim = Simulator::new();
    let (server_node, client_node) = sim.point_to_point(LinkConfig::default());
    let env = sim.environment();
    let servers = ServerRegistry::new();

    let server = StreamingServer::start(
        &server_node,
        ServerOptions {
            payload: Some(dir.join("payload.txt")),
            ..ServerOptions::default()
        },
        env.clone(),
        servers.clone(),
        LogGate::default(),
    )?;
    let client = StreamingClient::start(
        &client_node,
        ClientOptions::new(server_node.addr(), dir.join("text_out.txt")),
        env,
        ClientRegistry::new(),
        LogGate::default(),
    )?;

    sim.run_until(Duration::from_millis(1_200))?;
    server.close();
    assert!(servers.is_empty());

    // The next queued send finds no server behind its handle.
    let err = sim.run().unwrap_err();
    let SimError::Callback { source, .. } = err;
    assert!(matches!(source, SessionError::UnknownHandle(h) if h == server.handle()));

    client.close()?;
    assert!(client.bytes_received() < 10_000);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
