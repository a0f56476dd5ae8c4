//! trickle integration test harness.
//!
//! Every test here runs whole sessions over the discrete-event simulator,
//! so nothing needs a real network and runs are reproducible. Each test
//! owns a scratch directory under the system temp dir and removes it when
//! it finishes.

use std::path::{Path, PathBuf};

pub use anyhow::{Context, Result};
use trickle_core::config::TrickleConfig;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Fresh, empty scratch directory unique to this test and process.
pub fn scratch_dir(name: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("trickle-it-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

/// Write `len` bytes of printable text and return them.
pub fn write_payload(path: &Path, len: usize) -> Result<Vec<u8>> {
    let data: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
    std::fs::write(path, &data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(data)
}

/// Default config with payload and output inside `dir`.
pub fn scenario_config(dir: &Path) -> TrickleConfig {
    let mut config = TrickleConfig::default();
    config.server.payload = Some(dir.join("payload.txt"));
    config.client.output = dir.join("text_out.txt");
    config
}

mod logging;
mod loss;
mod sessions;
mod streaming;
