//! Discrete-event network simulator.
//!
//! Implements both [`Transport`] and [`Scheduler`] over a virtual clock so
//! sessions run exactly as they would on a real network, minus the wall
//! time. Events fire in timestamp order; events at the same instant fire
//! in the order they were queued. Callbacks run one at a time on the
//! thread that called [`Simulator::run`], with no internal lock held, so
//! they may freely send, receive, and schedule.

mod link;
mod scenario;

pub use link::{ErrorUnit, LinkConfig, RateErrorModel, FRAME_OVERHEAD};
pub use scenario::{run_scenario, ScenarioError, ScenarioOutcome};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use trickle_core::{
    Endpoint, Node, ReceiveCallback, Scheduler, SessionError, SocketHandle, Task, Transport,
    TransportError, MAX_DATAGRAM_PAYLOAD,
};

use link::Link;

/// First port handed out for binds to port 0.
const EPHEMERAL_PORT_START: u16 = 49153;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("callback failed at {:.6}s: {source}", at.as_secs_f64())]
    Callback {
        at: Duration,
        #[source]
        source: SessionError,
    },
}

/// Totals for one simulated run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimReport {
    pub elapsed_secs: f64,
    pub events_processed: u64,
    pub datagrams_sent: u64,
    pub datagrams_delivered: u64,
    pub datagrams_dropped: u64,
    pub datagrams_unreachable: u64,
    pub bytes_delivered: u64,
}

impl SimReport {
    /// Pretty-printed JSON, as `trickled simulate` prints it.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// One datagram as it left its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramRecord {
    pub sent_at: Duration,
    pub from: Endpoint,
    pub to: Endpoint,
    pub bytes: usize,
    /// Lost to the link's error model.
    pub dropped: bool,
}

enum Event {
    Task(Task),
    Deliver {
        to: Endpoint,
        from: Endpoint,
        payload: Bytes,
    },
}

struct SimSocket {
    node: Node,
    local: Option<Endpoint>,
    pending: VecDeque<(Bytes, Endpoint)>,
    callback: Option<ReceiveCallback>,
}

struct SimState {
    now: Duration,
    next_seq: u64,
    events: BTreeMap<(Duration, u64), Event>,
    nodes: Vec<Node>,
    links: Vec<Link>,
    sockets: HashMap<SocketHandle, SimSocket>,
    bound: HashMap<Endpoint, SocketHandle>,
    next_handle: u64,
    next_ephemeral: u16,
    rng: StdRng,
    datagrams: Vec<DatagramRecord>,
    report: SimReport,
}

impl SimState {
    fn push(&mut self, at: Duration, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.insert((at, seq), event);
    }

    fn allocate_port(&mut self, ip: IpAddr) -> Result<u16, TransportError> {
        for _ in 0..=(u16::MAX - EPHEMERAL_PORT_START) {
            let port = self.next_ephemeral;
            self.next_ephemeral = if port == u16::MAX {
                EPHEMERAL_PORT_START
            } else {
                port + 1
            };
            if !self.bound.contains_key(&Endpoint::new(ip, port)) {
                return Ok(port);
            }
        }
        Err(TransportError::PortInUse(0))
    }
}

/// Handle to a simulation. Clones share the same world.
#[derive(Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimState>>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self::with_seed(1)
    }

    /// A simulator whose error models draw from a generator seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                now: Duration::ZERO,
                next_seq: 0,
                events: BTreeMap::new(),
                nodes: Vec::new(),
                links: Vec::new(),
                sockets: HashMap::new(),
                bound: HashMap::new(),
                next_handle: 1,
                next_ephemeral: EPHEMERAL_PORT_START,
                rng: StdRng::seed_from_u64(seed),
                datagrams: Vec::new(),
                report: SimReport::default(),
            })),
        }
    }

    // ── Topology ─────────────────────────────────────────────────────────────

    pub fn add_node(&self, addr: Ipv4Addr) -> Node {
        let mut state = self.state();
        let node = Node::new(state.nodes.len() as u32, IpAddr::V4(addr));
        state.nodes.push(node);
        node
    }

    pub fn connect(&self, a: &Node, b: &Node, config: LinkConfig) {
        self.state().links.push(Link::new(a.id(), b.id(), config));
    }

    /// Two nodes on 10.1.1.0/24 (.1 and .2) joined by one link.
    pub fn point_to_point(&self, config: LinkConfig) -> (Node, Node) {
        let a = self.add_node(Ipv4Addr::new(10, 1, 1, 1));
        let b = self.add_node(Ipv4Addr::new(10, 1, 1, 2));
        self.connect(&a, &b, config);
        (a, b)
    }

    /// A session environment backed by this simulator.
    pub fn environment(&self) -> trickle_core::Environment {
        trickle_core::Environment::new(Arc::new(self.clone()), Arc::new(self.clone()))
    }

    // ── Run lifecycle ────────────────────────────────────────────────────────

    /// Run until no events remain.
    pub fn run(&self) -> Result<SimReport, SimError> {
        self.run_inner(None)
    }

    /// Run until no events remain or the clock would pass `limit`.
    pub fn run_until(&self, limit: Duration) -> Result<SimReport, SimError> {
        self.run_inner(Some(limit))
    }

    fn run_inner(&self, limit: Option<Duration>) -> Result<SimReport, SimError> {
        loop {
            let (at, event) = {
                let mut state = self.state();
                let Some((&(at, _), _)) = state.events.first_key_value() else {
                    break;
                };
                if let Some(limit) = limit.filter(|limit| at > *limit) {
                    state.now = state.now.max(limit);
                    break;
                }
                let Some(((at, _), event)) = state.events.pop_first() else {
                    break;
                };
                state.now = at;
                state.report.events_processed += 1;
                (at, event)
            };

            let result = match event {
                Event::Task(task) => task(),
                Event::Deliver { to, from, payload } => self.deliver(to, from, payload),
            };
            if let Err(source) = result {
                tracing::error!(at = at.as_secs_f64(), error = %source, "simulation callback failed");
                return Err(SimError::Callback { at, source });
            }
        }
        Ok(self.report())
    }

    fn deliver(&self, to: Endpoint, from: Endpoint, payload: Bytes) -> Result<(), SessionError> {
        let (handle, callback) = {
            let mut state = self.state();
            let Some(&handle) = state.bound.get(&to) else {
                state.report.datagrams_unreachable += 1;
                tracing::trace!(%to, %from, "no socket bound, datagram discarded");
                return Ok(());
            };
            let len = payload.len() as u64;
            let Some(socket) = state.sockets.get_mut(&handle) else {
                return Ok(());
            };
            socket.pending.push_back((payload, from));
            let callback = socket.callback.clone();
            state.report.datagrams_delivered += 1;
            state.report.bytes_delivered += len;
            (handle, callback)
        };
        match callback {
            Some(callback) => callback(handle),
            None => Ok(()),
        }
    }

    /// Drop all pending events and sockets.
    pub fn destroy(&self) {
        let mut state = self.state();
        state.events.clear();
        state.sockets.clear();
        state.bound.clear();
    }

    pub fn report(&self) -> SimReport {
        let state = self.state();
        SimReport {
            elapsed_secs: state.now.as_secs_f64(),
            ..state.report.clone()
        }
    }

    /// Every datagram sent so far, in send order.
    pub fn datagrams(&self) -> Vec<DatagramRecord> {
        self.state().datagrams.clone()
    }

    pub fn pending_events(&self) -> usize {
        self.state().events.len()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

impl Scheduler for Simulator {
    fn schedule_after(&self, delay: Duration, task: Task) {
        let mut state = self.state();
        let at = state.now + delay;
        state.push(at, Event::Task(task));
    }

    fn now(&self) -> Duration {
        self.state().now
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

impl Transport for Simulator {
    fn create_endpoint(&self, node: &Node) -> Result<SocketHandle, TransportError> {
        let mut state = self.state();
        let handle = SocketHandle::new(state.next_handle);
        state.next_handle += 1;
        state.sockets.insert(
            handle,
            SimSocket {
                node: *node,
                local: None,
                pending: VecDeque::new(),
                callback: None,
            },
        );
        Ok(handle)
    }

    fn bind(&self, handle: SocketHandle, port: u16) -> Result<Endpoint, TransportError> {
        let mut state = self.state();
        let ip = state
            .sockets
            .get(&handle)
            .ok_or(TransportError::UnknownSocket(handle))?
            .node
            .addr();
        let port = if port == 0 {
            state.allocate_port(ip)?
        } else {
            port
        };
        let local = Endpoint::new(ip, port);
        if state.bound.contains_key(&local) {
            return Err(TransportError::PortInUse(port));
        }
        let previous = state
            .sockets
            .get_mut(&handle)
            .and_then(|socket| socket.local.replace(local));
        if let Some(previous) = previous {
            state.bound.remove(&previous);
        }
        state.bound.insert(local, handle);
        Ok(local)
    }

    fn send_to(
        &self,
        handle: SocketHandle,
        payload: Bytes,
        dest: Endpoint,
    ) -> Result<usize, TransportError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let socket = state
            .sockets
            .get(&handle)
            .ok_or(TransportError::UnknownSocket(handle))?;
        let from = socket.local.ok_or(TransportError::NotBound(handle))?;
        if payload.len() > MAX_DATAGRAM_PAYLOAD {
            return Err(TransportError::Oversized(payload.len()));
        }
        let src = socket.node.id();
        let dst = state
            .nodes
            .iter()
            .find(|n| n.addr() == dest.ip())
            .map(|n| n.id())
            .ok_or(TransportError::NoRoute(dest))?;

        let len = payload.len();
        let frame = len + FRAME_OVERHEAD;
        let now = state.now;
        let (arrival, dropped) = if src == dst {
            (now, false)
        } else {
            let link = state
                .links
                .iter_mut()
                .find(|l| l.connects(src, dst))
                .ok_or(TransportError::NoRoute(dest))?;
            let arrival = link.transmit(src, frame, now);
            let dropped = link
                .config
                .error_model
                .is_some_and(|model| model.drops(frame, &mut state.rng));
            (arrival, dropped)
        };

        state.report.datagrams_sent += 1;
        state.datagrams.push(DatagramRecord {
            sent_at: now,
            from,
            to: dest,
            bytes: len,
            dropped,
        });

        if dropped {
            state.report.datagrams_dropped += 1;
            tracing::trace!(%from, to = %dest, bytes = len, "datagram lost on link");
        } else {
            state.push(
                arrival,
                Event::Deliver {
                    to: dest,
                    from,
                    payload,
                },
            );
        }
        Ok(len)
    }

    fn receive_from(
        &self,
        handle: SocketHandle,
    ) -> Result<Option<(Bytes, Endpoint)>, TransportError> {
        let mut state = self.state();
        let socket = state
            .sockets
            .get_mut(&handle)
            .ok_or(TransportError::UnknownSocket(handle))?;
        Ok(socket.pending.pop_front())
    }

    fn set_receive_callback(
        &self,
        handle: SocketHandle,
        callback: ReceiveCallback,
    ) -> Result<(), TransportError> {
        let mut state = self.state();
        let socket = state
            .sockets
            .get_mut(&handle)
            .ok_or(TransportError::UnknownSocket(handle))?;
        socket.callback = Some(callback);
        Ok(())
    }

    fn close(&self, handle: SocketHandle) {
        let mut state = self.state();
        if let Some(socket) = state.sockets.remove(&handle) {
            if let Some(local) = socket.local {
                state.bound.remove(&local);
            }
        }
    }
}
