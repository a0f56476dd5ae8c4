//! trickled — paced chunk streaming over UDP.
//!
//! `serve` streams a file to anyone who asks, `fetch` asks a server and
//! writes what arrives, `simulate` runs both ends over a simulated
//! point-to-point link and prints the run report.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::runtime::Handle;

use trickle_core::config::TrickleConfig;
use trickle_core::{LogGate, Node};
use trickle_services::sim::run_scenario;
use trickle_services::{
    ClientOptions, ClientRegistry, ServerOptions, ServerRegistry, StreamingClient, StreamingServer,
};

mod runtime;

use runtime::UdpRuntime;

const STATUS_INTERVAL: Duration = Duration::from_secs(5);
const IDLE_POLL: Duration = Duration::from_millis(250);

// ── Command line ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Overrides {
    port: Option<u16>,
    payload: Option<PathBuf>,
    output: Option<PathBuf>,
    chunk_size: Option<usize>,
    error_rate: Option<f64>,
}

impl Overrides {
    fn apply(self, config: &mut TrickleConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(payload) = self.payload {
            config.server.payload = Some(payload);
        }
        if let Some(output) = self.output {
            config.client.output = output;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.server.chunk_size = chunk_size;
        }
        if let Some(rate) = self.error_rate {
            config.simulation.error_rate = rate;
        }
    }
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .with_context(|| format!("{flag} requires a value"))
}

fn print_usage() {
    println!("trickled — paced chunk streaming over UDP");
    println!();
    println!("Usage: trickled [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  serve                 Stream the payload file to every requester");
    println!("  fetch <server-ip>     Request a stream and append it to the output file");
    println!("  simulate              Run server and client over a simulated link");
    println!("  help                  Show this message");
    println!();
    println!("Options:");
    println!("  --port <n>            Server port (default 2345)");
    println!("  --payload <path>      File to stream");
    println!("  --output <path>       Where fetched bytes are written (default text_out.txt)");
    println!("  --chunk-size <n>      Bytes per datagram (1000 text, 1400 media)");
    println!("  --error-rate <r>      Simulated byte error rate");
    println!();
    println!("Config: $TRICKLE_CONFIG or ~/.config/trickle/config.toml");
    println!("Logging: RUST_LOG=info");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut overrides = Overrides::default();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                overrides.port = Some(value(&args, i, "--port")?.parse().context("--port must be a number")?);
            }
            "--payload" => {
                i += 1;
                overrides.payload = Some(PathBuf::from(value(&args, i, "--payload")?));
            }
            "--output" => {
                i += 1;
                overrides.output = Some(PathBuf::from(value(&args, i, "--output")?));
            }
            "--chunk-size" => {
                i += 1;
                overrides.chunk_size = Some(
                    value(&args, i, "--chunk-size")?
                        .parse()
                        .context("--chunk-size must be a number")?,
                );
            }
            "--error-rate" => {
                i += 1;
                overrides.error_rate = Some(
                    value(&args, i, "--error-rate")?
                        .parse()
                        .context("--error-rate must be a number")?,
                );
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    if matches!(remaining.as_slice(), ["help"] | ["--help"] | ["-h"] | []) {
        print_usage();
        return Ok(());
    }

    // Load config
    if let Err(e) = TrickleConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = TrickleConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        TrickleConfig::default()
    });
    overrides.apply(&mut config);

    match remaining.as_slice() {
        ["serve"] => block_on(serve(config)),
        ["fetch", server] => {
            let server: IpAddr = server
                .parse()
                .with_context(|| format!("invalid server address {server}"))?;
            block_on(fetch(config, server))
        }
        ["simulate"] => simulate(&config),
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

/// Sessions expect one event thread, so everything runs on a
/// current-thread runtime.
fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(future)
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn serve(config: TrickleConfig) -> Result<()> {
    let (rt, mut fatal) = UdpRuntime::new(Handle::current());
    let log = LogGate::new(config.logging.cutoff());

    let server = StreamingServer::start(
        &Node::local(),
        ServerOptions::from(&config.server),
        rt.environment(),
        ServerRegistry::new(),
        log,
    )
    .context("failed to start streaming server")?;
    tracing::info!(
        local = %server.local_endpoint(),
        chunks = server.chunks_remaining(),
        "trickled serving"
    );

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break Ok(());
            }
            Some(e) = fatal.recv() => {
                break Err(anyhow::Error::new(e).context("streaming server failed"));
            }
            _ = status.tick() => {
                tracing::info!(
                    state = ?server.state(),
                    chunks_remaining = server.chunks_remaining(),
                    sockets = rt.socket_count(),
                    "server status"
                );
            }
        }
    };

    server.close();
    result
}

async fn fetch(config: TrickleConfig, server: IpAddr) -> Result<()> {
    let (rt, mut fatal) = UdpRuntime::new(Handle::current());
    let log = LogGate::new(config.logging.cutoff());
    let options = ClientOptions::from_settings(server, config.server.port, &config.client);
    let request_delay = options.request_delay;

    let client = StreamingClient::start(
        &Node::local(),
        options,
        rt.environment(),
        ClientRegistry::new(),
        log,
    )
    .context("failed to start streaming client")?;

    let idle_exit = match config.client.idle_exit_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    let mut last_bytes = 0;
    let mut last_progress = Instant::now() + request_delay;
    let mut poll = tokio::time::interval(IDLE_POLL);

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break Ok(());
            }
            Some(e) = fatal.recv() => {
                break Err(anyhow::Error::new(e).context("streaming client failed"));
            }
            _ = poll.tick() => {
                let bytes = client.bytes_received();
                if bytes != last_bytes {
                    last_bytes = bytes;
                    last_progress = Instant::now();
                } else if idle_exit.is_some_and(|idle| last_progress.elapsed() >= idle) {
                    tracing::info!(bytes, "stream idle, stopping");
                    break Ok(());
                }
            }
        }
    };

    client.close().context("failed to flush output")?;
    println!(
        "{} bytes in {} chunks written to {}",
        client.bytes_received(),
        client.chunks_received(),
        client.output_path().display()
    );
    result
}

fn simulate(config: &TrickleConfig) -> Result<()> {
    let server_log = LogGate::new(config.logging.cutoff());
    let client_log = LogGate::new(config.logging.cutoff());

    let outcome = run_scenario(config, &server_log, &client_log).context("simulation failed")?;

    println!("{}", outcome.report.to_json()?);
    println!(
        "{} bytes in {} chunks written to {}",
        outcome.bytes_received,
        outcome.chunks_received,
        outcome.output.display()
    );
    Ok(())
}
