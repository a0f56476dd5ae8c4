//! Test helpers shared by the session tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use trickle_core::{
    Endpoint, Environment, Node, ReceiveCallback, Scheduler, SocketHandle, Task, Transport,
    TransportError,
};

/// An environment that fails the test if a session touches it.
pub(crate) struct Untouchable;

impl Transport for Untouchable {
    fn create_endpoint(&self, _node: &Node) -> Result<SocketHandle, TransportError> {
        panic!("transport touched: create_endpoint")
    }
    fn bind(&self, _handle: SocketHandle, _port: u16) -> Result<Endpoint, TransportError> {
        panic!("transport touched: bind")
    }
    fn send_to(&self, _: SocketHandle, _: Bytes, _: Endpoint) -> Result<usize, TransportError> {
        panic!("transport touched: send_to")
    }
    fn receive_from(
        &self,
        _handle: SocketHandle,
    ) -> Result<Option<(Bytes, Endpoint)>, TransportError> {
        panic!("transport touched: receive_from")
    }
    fn set_receive_callback(
        &self,
        _handle: SocketHandle,
        _callback: ReceiveCallback,
    ) -> Result<(), TransportError> {
        panic!("transport touched: set_receive_callback")
    }
    fn close(&self, _handle: SocketHandle) {
        panic!("transport touched: close")
    }
}

impl Scheduler for Untouchable {
    fn schedule_after(&self, _delay: Duration, _task: Task) {
        panic!("scheduler touched")
    }
    fn now(&self) -> Duration {
        panic!("scheduler touched")
    }
}

pub(crate) fn untouchable_env() -> Environment {
    Environment::new(Arc::new(Untouchable), Arc::new(Untouchable))
}

/// A fresh scratch directory unique to this test process.
pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("trickle-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Deterministic non-repeating-ish payload.
pub(crate) fn payload(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i * 7 % 256) as u8).collect()
}

/// In-memory sink for a `tracing_subscriber::fmt` subscriber.
#[derive(Clone, Default)]
pub(crate) struct LogCapture(Arc<std::sync::Mutex<Vec<u8>>>);

impl LogCapture {
    /// A plain-text INFO subscriber writing into this capture.
    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish()
    }

    /// Captured lines containing `message`.
    pub(crate) fn lines_with(&self, message: &str) -> Vec<String> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| line.contains(message))
            .map(str::to_owned)
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
