//! Inventory & neighbour registry: the one piece of state shared by every
//! peer session.
//!
//! Wraps its state in a single-field tuple struct around `Arc<Mutex<Shared>>`
//! so the registry can be cheaply cloned into every session task while all
//! of them see the same underlying state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// Outbound line sender for a neighbour's session — the "send-channel" half
/// of a neighbour entry. The writer half of that neighbour's session owns
/// the receiver and drains it onto the wire.
pub type NeighbourSender = mpsc::UnboundedSender<String>;

struct NeighbourEntry {
    name: String,
    port: u32,
    tx: NeighbourSender,
}

struct Shared {
    inventory: HashMap<String, i64>,
    neighbours: Vec<NeighbourEntry>,
}

/// A consistent, sorted copy of the registry's state, produced by
/// [`Registry::snapshot`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Non-zero inventory entries, sorted ascending by good name.
    pub goods: Vec<(String, i64)>,
    /// Neighbour names, sorted ascending.
    pub neighbours: Vec<String>,
}

/// Result of [`Registry::add_neighbour`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddNeighbour {
    /// The neighbour was new and has been recorded.
    Added,
    /// Name or port (or both) already belonged to an existing neighbour; no
    /// mutation happened.
    Duplicate,
}

/// Process-wide shared registry of inventory and known neighbours.
///
/// Cloning a `Registry` is cheap (an `Arc` bump) and gives an independent
/// handle to the same underlying state — every session task holds one.
#[derive(Clone)]
pub struct Registry(Arc<Mutex<Shared>>);

impl Registry {
    /// Creates an empty registry seeded with the depot's starting inventory
    /// (parsed from argv by `cli.rs`). Zero-quantity entries are kept here —
    /// `snapshot` is what filters them out.
    pub fn new(initial_inventory: HashMap<String, i64>) -> Self {
        Self(Arc::new(Mutex::new(Shared {
            inventory: initial_inventory,
            neighbours: Vec::new(),
        })))
    }

    /// Adds `qty` to `good`'s balance, inserting a new entry if none exists.
    pub async fn deliver(&self, good: &str, qty: i64) {
        let mut shared = self.0.lock().await;
        *shared.inventory.entry(good.to_string()).or_insert(0) += qty;
    }

    /// Subtracts `qty` from `good`'s balance, inserting a negative entry if
    /// none exists. Negative balances are legal and persist.
    pub async fn withdraw(&self, good: &str, qty: i64) {
        let mut shared = self.0.lock().await;
        *shared.inventory.entry(good.to_string()).or_insert(0) -= qty;
    }

    /// Records a neighbour iff neither its name nor its port is already
    /// present. Once added, a neighbour is never removed.
    pub async fn add_neighbour(&self, name: &str, port: u32, tx: NeighbourSender) -> AddNeighbour {
        let mut shared = self.0.lock().await;
        let collides = shared
            .neighbours
            .iter()
            .any(|n| n.name == name || n.port == port);
        if collides {
            return AddNeighbour::Duplicate;
        }
        shared.neighbours.push(NeighbourEntry {
            name: name.to_string(),
            port,
            tx,
        });
        AddNeighbour::Added
    }

    /// Returns a clone of the named neighbour's send-channel, if known.
    /// Used by `Transfer` to forward a `Deliver` line to the target.
    pub async fn neighbour_sender(&self, name: &str) -> Option<NeighbourSender> {
        let shared = self.0.lock().await;
        shared
            .neighbours
            .iter()
            .find(|n| n.name == name)
            .map(|n| n.tx.clone())
    }

    /// Produces a stable, sorted copy of non-zero inventory entries and all
    /// neighbour names. The copy is taken while the lock is held; sorting
    /// happens afterwards, outside the lock.
    pub async fn snapshot(&self) -> Snapshot {
        let (mut goods, mut neighbours) = {
            let shared = self.0.lock().await;
            let goods: Vec<(String, i64)> = shared
                .inventory
                .iter()
                .filter(|&(_, &qty)| qty != 0)
                .map(|(good, &qty)| (good.clone(), qty))
                .collect();
            let neighbours: Vec<String> = shared.neighbours.iter().map(|n| n.name.clone()).collect();
            (goods, neighbours)
        };
        goods.sort_by(|a, b| a.0.cmp(&b.0));
        neighbours.sort();
        Snapshot { goods, neighbours }
    }
}
