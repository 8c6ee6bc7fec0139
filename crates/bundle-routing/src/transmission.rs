//! Transmission bookkeeping
//!
//! Every window carries one transmit cursor and a running byte count shared
//! by both directions. Admissions advance the cursor and never exceed the
//! window capacity.

use crate::BundleId;
use contact_graph::graph::WindowUsage;
use contact_graph::ContactWindow;
use orbital_mechanics::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TransmissionEvent {
    pub window: usize,
    pub from: NodeId,
    pub to: NodeId,
    pub bundle: BundleId,
    pub bytes: u64,
    pub start: f64,
    pub finish: f64,
}

/// A bundle on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct InTransit {
    pub bundle: BundleId,
    pub window: usize,
    pub from: NodeId,
    pub to: NodeId,
    pub finish: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
struct WindowUse {
    cursor: f64,
    transmitted_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowLedger {
    entries: Vec<WindowUse>,
}

impl WindowLedger {
    pub fn new(windows: &[ContactWindow]) -> Self {
        Self {
            entries: windows
                .iter()
                .map(|w| WindowUse {
                    cursor: w.start,
                    transmitted_bytes: 0,
                })
                .collect(),
        }
    }

    pub fn transmitted_bytes(&self, window: usize) -> u64 {
        self.entries.get(window).map_or(0, |e| e.transmitted_bytes)
    }

    /// Transmission slot for `size` bytes starting no earlier than `now`,
    /// `None` if it would overrun the window in time or bytes.
    pub fn slot(&self, window: &ContactWindow, now: f64, size: u64) -> Option<(f64, f64)> {
        let start = now.max(self.cursor(window));
        let finish = start + size as f64 / window.rate;
        let fits_time = start >= window.start && finish <= window.end;
        let fits_bytes = (self.transmitted_bytes(window.index) + size) as f64 <= window.capacity();
        (fits_time && fits_bytes).then_some((start, finish))
    }

    /// Whether a bundle of `size` bytes could still go out on `window` at or after `now`
    pub fn usable(&self, window: &ContactWindow, now: f64, size: u64) -> bool {
        window.end > now && self.slot(window, now.max(window.start), size).is_some()
    }

    pub fn record(&mut self, window: usize, finish: f64, bytes: u64) {
        if let Some(entry) = self.entries.get_mut(window) {
            entry.cursor = entry.cursor.max(finish);
            entry.transmitted_bytes += bytes;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WindowUsage for WindowLedger {
    fn cursor(&self, window: &ContactWindow) -> f64 {
        self.entries
            .get(window.index)
            .map_or(window.start, |e| e.cursor.max(window.start))
    }

    fn residual(&self, window: &ContactWindow) -> f64 {
        window.capacity() - self.transmitted_bytes(window.index) as f64
    }
}
