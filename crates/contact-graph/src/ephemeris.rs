//! Sampled node positions
//!
//! Every node is propagated once per clock sample; pair visibility reads
//! from this table instead of re-propagating.

use crate::{NetworkNode, Result, SimulationClock};
use nalgebra::Vector3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct Ephemeris {
    epoch_jd: f64,
    times: Vec<f64>,
    /// `positions[node][step]`, nodes in input order
    positions: Vec<Vec<Vector3<f64>>>,
}

impl Ephemeris {
    pub fn compute(nodes: &[NetworkNode], clock: &SimulationClock, epoch_jd: f64) -> Result<Self> {
        let times: Vec<f64> = clock.sample_times().collect();

        #[cfg(feature = "parallel")]
        let positions = nodes
            .par_iter()
            .map(|node| sample_node(node, &times, epoch_jd))
            .collect::<Result<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let positions = nodes
            .iter()
            .map(|node| sample_node(node, &times, epoch_jd))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            epoch_jd,
            times,
            positions,
        })
    }

    pub fn epoch_jd(&self) -> f64 {
        self.epoch_jd
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Samples for the node at `node_slot` (its index in the input slice)
    pub fn track(&self, node_slot: usize) -> &[Vector3<f64>] {
        &self.positions[node_slot]
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }
}

fn sample_node(node: &NetworkNode, times: &[f64], epoch_jd: f64) -> Result<Vec<Vector3<f64>>> {
    times
        .iter()
        .map(|&t| node.position_eci(epoch_jd, t))
        .collect()
}
