//! Run statistics

use crate::transmission::{TransmissionEvent, WindowLedger};
use crate::{BundleRecord, BundleState, DropReason};
use contact_graph::ContactWindow;
use orbital_mechanics::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct LatencyStats {
    pub count: usize,
    pub mean: Option<f64>,
    /// Population standard deviation
    pub stddev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl LatencyStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        Self {
            count: samples.len(),
            mean: Some(mean),
            stddev: Some(variance.sqrt()),
            min: samples.iter().copied().reduce(f64::min),
            max: samples.iter().copied().reduce(f64::max),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DropCounts {
    pub no_route: usize,
    pub storage_overflow: usize,
    pub horizon_end: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.no_route + self.storage_overflow + self.horizon_end
    }

    fn add(&mut self, reason: DropReason) {
        match reason {
            DropReason::NoRoute => self.no_route += 1,
            DropReason::StorageOverflow => self.storage_overflow += 1,
            DropReason::HorizonEnd => self.horizon_end += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WindowUtilisation {
    pub window: usize,
    pub node_a: NodeId,
    pub node_b: NodeId,
    pub transmitted_bytes: u64,
    pub capacity_bytes: f64,
    pub utilisation: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PairUtilisation {
    pub node_a: NodeId,
    pub node_b: NodeId,
    pub windows: usize,
    pub transmitted_bytes: u64,
    pub capacity_bytes: f64,
    pub utilisation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationStats {
    pub generated: usize,
    pub delivered: usize,
    pub expired: usize,
    pub dropped: usize,
    pub drops: DropCounts,
    /// Completed hop transmissions
    pub forwarded: usize,
    /// Route re-plans after a planned hop became unusable
    pub rerouted: u64,
    pub generated_bytes: u64,
    pub delivered_bytes: u64,
    pub delivery_ratio: f64,
    pub latency: LatencyStats,
    pub windows: Vec<WindowUtilisation>,
    pub pairs: Vec<PairUtilisation>,
}

impl SimulationStats {
    pub fn collect(
        records: &[BundleRecord],
        events: &[TransmissionEvent],
        ledger: &WindowLedger,
        windows: &[ContactWindow],
    ) -> Self {
        let mut generated = 0;
        let mut delivered = 0;
        let mut expired = 0;
        let mut drops = DropCounts::default();
        let mut generated_bytes = 0;
        let mut delivered_bytes = 0;
        let mut latencies = Vec::new();
        let mut rerouted = 0u64;

        for record in records {
            if record.state == BundleState::Pending {
                continue;
            }
            generated += 1;
            rerouted += u64::from(record.replans);
            generated_bytes += record.bundle.size_bytes;
            match record.state {
                BundleState::Delivered { latency, .. } => {
                    delivered += 1;
                    delivered_bytes += record.bundle.size_bytes;
                    latencies.push(latency);
                }
                BundleState::Expired { .. } => expired += 1,
                BundleState::Dropped { reason, .. } => drops.add(reason),
                _ => {}
            }
        }

        let window_stats: Vec<WindowUtilisation> = windows
            .iter()
            .map(|w| {
                let transmitted = ledger.transmitted_bytes(w.index);
                WindowUtilisation {
                    window: w.index,
                    node_a: w.node_a,
                    node_b: w.node_b,
                    transmitted_bytes: transmitted,
                    capacity_bytes: w.capacity(),
                    utilisation: ratio(transmitted as f64, w.capacity()),
                }
            })
            .collect();

        let mut by_pair: BTreeMap<(NodeId, NodeId), (usize, u64, f64)> = BTreeMap::new();
        for w in &window_stats {
            let entry = by_pair.entry((w.node_a, w.node_b)).or_default();
            entry.0 += 1;
            entry.1 += w.transmitted_bytes;
            entry.2 += w.capacity_bytes;
        }
        let pairs = by_pair
            .into_iter()
            .map(|((a, b), (count, bytes, capacity))| PairUtilisation {
                node_a: a,
                node_b: b,
                windows: count,
                transmitted_bytes: bytes,
                capacity_bytes: capacity,
                utilisation: ratio(bytes as f64, capacity),
            })
            .collect();

        Self {
            generated,
            delivered,
            expired,
            dropped: drops.total(),
            drops,
            forwarded: events.len(),
            rerouted,
            generated_bytes,
            delivered_bytes,
            delivery_ratio: ratio(delivered as f64, generated as f64),
            latency: LatencyStats::from_samples(&latencies),
            windows: window_stats,
            pairs,
        }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}
