//! Contact plan construction
//!
//! Samples every satellite-involving node pair at each clock step and
//! compresses consecutive visible samples into contact windows.

use crate::ephemeris::Ephemeris;
use crate::visibility;
use crate::{ContactError, ContactWindow, LinkKind, NetworkNode, Result, SimulationClock};
use orbital_mechanics::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// All contact windows of a run, ordered by (start, node_a, node_b).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactPlan {
    windows: Vec<ContactWindow>,
}

impl ContactPlan {
    /// Wrap windows, re-sorting and re-indexing them
    pub fn from_windows(mut windows: Vec<ContactWindow>) -> Self {
        windows.sort_by(|x, y| {
            x.start
                .total_cmp(&y.start)
                .then(x.node_a.cmp(&y.node_a))
                .then(x.node_b.cmp(&y.node_b))
        });
        for (index, window) in windows.iter_mut().enumerate() {
            window.index = index;
        }
        Self { windows }
    }

    pub fn windows(&self) -> &[ContactWindow] {
        &self.windows
    }

    pub fn get(&self, index: usize) -> Result<&ContactWindow> {
        self.windows
            .get(index)
            .ok_or(ContactError::WindowNotFound(index))
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Windows of one unordered pair, in time order
    pub fn between(&self, a: NodeId, b: NodeId) -> impl Iterator<Item = &ContactWindow> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.windows
            .iter()
            .filter(move |w| w.node_a == lo && w.node_b == hi)
    }

    pub fn involving(&self, node: NodeId) -> impl Iterator<Item = &ContactWindow> {
        self.windows.iter().filter(move |w| w.involves(node))
    }

    pub fn active_at(&self, t: f64) -> impl Iterator<Item = &ContactWindow> {
        self.windows.iter().filter(move |w| w.is_active(t))
    }

    pub fn into_windows(self) -> Vec<ContactWindow> {
        self.windows
    }
}

pub struct ContactPlanBuilder {
    epoch_jd: f64,
}

impl ContactPlanBuilder {
    pub fn new(epoch_jd: f64) -> Self {
        Self { epoch_jd }
    }

    pub fn build(&self, nodes: &[NetworkNode], clock: &SimulationClock) -> Result<ContactPlan> {
        let mut seen = HashSet::new();
        if let Some(dup) = nodes.iter().map(NetworkNode::id).find(|id| !seen.insert(*id)) {
            return Err(ContactError::DuplicateNode(dup));
        }

        let ephemeris = Ephemeris::compute(nodes, clock, self.epoch_jd)?;
        debug!(
            nodes = nodes.len(),
            samples = ephemeris.times().len(),
            "Ephemeris sampled"
        );

        let pairs = candidate_pairs(nodes);

        #[cfg(feature = "parallel")]
        let windows: Vec<ContactWindow> = pairs
            .par_iter()
            .flat_map_iter(|&(i, j)| self.pair_windows(nodes, &ephemeris, clock, i, j))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let windows: Vec<ContactWindow> = pairs
            .iter()
            .flat_map(|&(i, j)| self.pair_windows(nodes, &ephemeris, clock, i, j))
            .collect();

        let plan = ContactPlan::from_windows(windows);

        let isl = plan
            .windows()
            .iter()
            .filter(|w| w.kind == LinkKind::InterSatellite)
            .count();
        info!(
            windows = plan.len(),
            isl_windows = isl,
            ground_windows = plan.len() - isl,
            pairs = pairs.len(),
            "Contact plan built"
        );

        Ok(plan)
    }

    /// Compress the visibility samples of one pair into windows
    fn pair_windows(
        &self,
        nodes: &[NetworkNode],
        ephemeris: &Ephemeris,
        clock: &SimulationClock,
        i: usize,
        j: usize,
    ) -> Vec<ContactWindow> {
        let (a, b) = (&nodes[i], &nodes[j]);
        let (Some(kind), Some(rate)) = (LinkKind::between(a, b), link_rate(a, b)) else {
            return Vec::new();
        };

        let track_a = ephemeris.track(i);
        let track_b = ephemeris.track(j);

        let mut windows = Vec::new();
        let mut open: Option<f64> = None;

        for (k, &t) in ephemeris.times().iter().enumerate() {
            let visible =
                visibility::visible_at(a, &track_a[k], b, &track_b[k], self.epoch_jd, t);

            match (visible, open) {
                (true, None) => open = Some(t),
                (false, Some(start)) => {
                    windows.push(window(a.id(), b.id(), start, t, rate, kind));
                    open = None;
                }
                _ => {}
            }
        }

        // Contact still in progress at the end of the horizon
        if let Some(start) = open {
            windows.push(window(a.id(), b.id(), start, clock.duration(), rate, kind));
        }

        windows
    }
}

fn window(a: NodeId, b: NodeId, start: f64, end: f64, rate: f64, kind: LinkKind) -> ContactWindow {
    ContactWindow {
        index: 0,
        node_a: a,
        node_b: b,
        start,
        end,
        rate,
        kind,
    }
}

/// Slot pairs `(i, j)` with `nodes[i].id < nodes[j].id`, ground-ground excluded
fn candidate_pairs(nodes: &[NetworkNode]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..nodes.len() {
        for j in 0..nodes.len() {
            if nodes[i].id() < nodes[j].id() && LinkKind::between(&nodes[i], &nodes[j]).is_some() {
                pairs.push((i, j));
            }
        }
    }
    pairs.sort_by_key(|&(i, j)| (nodes[i].id(), nodes[j].id()));
    pairs
}

/// Data rate (bytes/s) of a link between two nodes
pub fn link_rate(a: &NetworkNode, b: &NetworkNode) -> Option<f64> {
    match (a, b) {
        (NetworkNode::Satellite(sa), NetworkNode::Satellite(sb)) => {
            Some(sa.comms.isl_rate.min(sb.comms.isl_rate))
        }
        (NetworkNode::Satellite(sat), NetworkNode::Ground(_))
        | (NetworkNode::Ground(_), NetworkNode::Satellite(sat)) => Some(sat.comms.s2g_rate),
        (NetworkNode::Ground(_), NetworkNode::Ground(_)) => None,
    }
}
