//! Snapshot Reporter: on every SIGHUP, prints a
//! lexicographically sorted dump of inventory and neighbours.
//!
//! Printing straight from a signal handler is unsafe in an async runtime
//! (signal handlers can't run arbitrary async I/O), so a dedicated task
//! awaits the signal through `tokio::signal::unix` and calls
//! `Registry::snapshot` in ordinary task context instead.

use std::io::Write;

use tokio::signal::unix::{signal, SignalKind};

use crate::registry::{Registry, Snapshot};

/// Runs forever, printing one snapshot per delivered SIGHUP. A burst of
/// signals arriving before a snapshot finishes printing is coalesced by the
/// underlying signal mechanism into a single pending wakeup — each delivered
/// trigger produces exactly one snapshot, but bursts need not produce one
/// snapshot each.
pub async fn run(registry: Registry) -> std::io::Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        hangup.recv().await;
        tracing::debug!("snapshot triggered");
        let snap = registry.snapshot().await;
        print_snapshot(&snap)?;
    }
}

/// Renders a [`Snapshot`] to stdout in the exact §4.E format and flushes.
/// Split out from the signal loop so it can be exercised directly in tests
/// without needing to raise a real signal.
fn print_snapshot(snap: &Snapshot) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "Goods:")?;
    for (good, qty) in &snap.goods {
        writeln!(out, "{good} {qty}")?;
    }
    writeln!(out, "Neighbours:")?;
    for name in &snap.neighbours {
        writeln!(out, "{name}")?;
    }
    out.flush()
}
