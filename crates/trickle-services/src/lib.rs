//! trickle-services — streaming sessions and the environments they run in.

pub mod client;
pub mod registry;
pub mod server;
pub mod sim;

#[cfg(test)]
mod testing;

pub use client::{ClientOptions, ClientRegistry, ClientState, StreamingClient};
pub use registry::{Receivable, SessionRegistry};
pub use server::{ServerOptions, ServerRegistry, ServerState, StreamStats, StreamingServer};
pub use sim::{LinkConfig, RateErrorModel, SimError, SimReport, Simulator};
