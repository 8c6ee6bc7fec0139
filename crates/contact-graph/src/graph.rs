//! Time-varying contact graph
//!
//! A directed multigraph with one edge per contact window per permitted
//! direction. Targets only transmit, gateways only receive, satellites do
//! both. Route search is a label-setting earliest-arrival pass that
//! respects window timing, remaining capacity and bundle expiry.

use crate::{ContactError, ContactPlan, ContactWindow, NetworkNode, NodeKind, Result};
use orbital_mechanics::NodeId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::trace;

/// Live usage of a window: where its transmit cursor sits and how many
/// bytes it can still carry.
pub trait WindowUsage {
    fn cursor(&self, window: &ContactWindow) -> f64;
    fn residual(&self, window: &ContactWindow) -> f64;
}

/// Usage view for a plan nobody has transmitted on yet
#[derive(Debug, Clone, Copy, Default)]
pub struct Unused;

impl WindowUsage for Unused {
    fn cursor(&self, window: &ContactWindow) -> f64 {
        window.start
    }

    fn residual(&self, window: &ContactWindow) -> f64 {
        window.capacity()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContactEdge {
    /// Index into the contact plan
    pub window: usize,
}

/// What has to be routed, and from when
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest {
    pub source: NodeId,
    /// Earliest departure (s)
    pub not_before: f64,
    pub size_bytes: u64,
    /// Absolute expiry time (s)
    pub expires_at: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RouteHop {
    pub window: usize,
    pub from: NodeId,
    pub to: NodeId,
    pub departure: f64,
    pub arrival: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub source: NodeId,
    pub destination: NodeId,
    pub hops: Vec<RouteHop>,
}

impl Route {
    pub fn first_hop(&self) -> Option<&RouteHop> {
        self.hops.first()
    }

    pub fn arrival(&self) -> f64 {
        self.hops.last().map(|h| h.arrival).unwrap_or(f64::INFINITY)
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }
}

/// Search label, ordered so the best label is the heap maximum
#[derive(Debug, Clone, Copy)]
struct Label {
    arrival: f64,
    hops: usize,
    window: Option<usize>,
    node: NodeIndex,
}

impl Label {
    fn key(&self) -> (f64, usize, usize) {
        (self.arrival, self.hops, self.window.map_or(0, |w| w + 1))
    }

    fn better_than(&self, other: &Label) -> bool {
        self.cmp_key(other) == Ordering::Less
    }

    fn cmp_key(&self, other: &Label) -> Ordering {
        let (a1, h1, w1) = self.key();
        let (a2, h2, w2) = other.key();
        a1.total_cmp(&a2).then(h1.cmp(&h2)).then(w1.cmp(&w2))
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cmp_key(self)
            .then_with(|| other.node.index().cmp(&self.node.index()))
    }
}

pub struct ContactGraph {
    graph: DiGraph<GraphNode, ContactEdge>,
    node_index: HashMap<NodeId, NodeIndex>,
    windows: Vec<ContactWindow>,
}

impl ContactGraph {
    pub fn new(nodes: &[NetworkNode], plan: &ContactPlan) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(nodes.len(), plan.len() * 2);
        let mut node_index = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let idx = graph.add_node(GraphNode {
                id: node.id(),
                kind: node.kind(),
            });
            if node_index.insert(node.id(), idx).is_some() {
                return Err(ContactError::DuplicateNode(node.id()));
            }
        }

        for window in plan.windows() {
            let a = *node_index
                .get(&window.node_a)
                .ok_or(ContactError::NodeNotFound(window.node_a))?;
            let b = *node_index
                .get(&window.node_b)
                .ok_or(ContactError::NodeNotFound(window.node_b))?;

            for (from, to) in [(a, b), (b, a)] {
                if can_send(graph[from].kind, graph[to].kind) {
                    graph.add_edge(
                        from,
                        to,
                        ContactEdge {
                            window: window.index,
                        },
                    );
                }
            }
        }

        Ok(Self {
            graph,
            node_index,
            windows: plan.windows().to_vec(),
        })
    }

    pub fn window(&self, index: usize) -> Result<&ContactWindow> {
        self.windows
            .get(index)
            .ok_or(ContactError::WindowNotFound(index))
    }

    pub fn windows(&self) -> &[ContactWindow] {
        &self.windows
    }

    pub fn node_kind(&self, id: NodeId) -> Result<NodeKind> {
        self.node_index
            .get(&id)
            .map(|idx| self.graph[*idx].kind)
            .ok_or(ContactError::NodeNotFound(id))
    }

    /// Earliest-arrival route from `request.source` to any gateway.
    ///
    /// Returns `Ok(None)` when no gateway is reachable before expiry.
    pub fn earliest_arrival<U: WindowUsage>(
        &self,
        request: &RouteRequest,
        usage: &U,
    ) -> Result<Option<Route>> {
        let source = *self
            .node_index
            .get(&request.source)
            .ok_or(ContactError::NodeNotFound(request.source))?;

        let size = request.size_bytes as f64;
        let mut best: HashMap<NodeIndex, Label> = HashMap::new();
        let mut via: HashMap<NodeIndex, RouteHop> = HashMap::new();
        let mut settled = vec![false; self.graph.node_count()];
        let mut heap = BinaryHeap::new();

        let start = Label {
            arrival: request.not_before,
            hops: 0,
            window: None,
            node: source,
        };
        best.insert(source, start);
        heap.push(start);

        while let Some(label) = heap.pop() {
            let u = label.node;
            if settled[u.index()] {
                continue;
            }
            settled[u.index()] = true;

            if self.graph[u].kind == NodeKind::Gateway {
                return Ok(Some(self.reconstruct(request.source, u, &via)));
            }

            for edge in self.graph.edges(u) {
                let v = edge.target();
                if settled[v.index()] {
                    continue;
                }
                let window = &self.windows[edge.weight().window];
                if window.end <= label.arrival {
                    continue;
                }

                let departure = label.arrival.max(window.start).max(usage.cursor(window));
                let arrival = departure + size / window.rate;
                if arrival > window.end
                    || arrival > request.expires_at
                    || usage.residual(window) < size
                {
                    continue;
                }

                let candidate = Label {
                    arrival,
                    hops: label.hops + 1,
                    window: Some(window.index),
                    node: v,
                };
                let improves = best.get(&v).map_or(true, |cur| candidate.better_than(cur));
                if improves {
                    best.insert(v, candidate);
                    via.insert(
                        v,
                        RouteHop {
                            window: window.index,
                            from: self.graph[u].id,
                            to: self.graph[v].id,
                            departure,
                            arrival,
                        },
                    );
                    heap.push(candidate);
                }
            }
        }

        trace!(source = %request.source, "No gateway reachable");
        Ok(None)
    }

    fn reconstruct(
        &self,
        source: NodeId,
        destination: NodeIndex,
        via: &HashMap<NodeIndex, RouteHop>,
    ) -> Route {
        let mut hops = Vec::new();
        let mut cursor = destination;
        while let Some(hop) = via.get(&cursor) {
            hops.push(*hop);
            match self.node_index.get(&hop.from) {
                Some(prev) if hop.from != source => cursor = *prev,
                _ => break,
            }
        }
        hops.reverse();

        Route {
            source,
            destination: self.graph[destination].id,
            hops,
        }
    }

    pub fn stats(&self) -> GraphStats {
        let count = |kind| {
            self.graph
                .node_weights()
                .filter(|n| n.kind == kind)
                .count()
        };
        let isl_windows = self
            .windows
            .iter()
            .filter(|w| w.kind == crate::LinkKind::InterSatellite)
            .count();
        let downlink_capacity_bytes = self
            .windows
            .iter()
            .filter(|w| {
                [w.node_a, w.node_b]
                    .iter()
                    .any(|id| matches!(self.node_kind(*id), Ok(NodeKind::Gateway)))
            })
            .map(ContactWindow::capacity)
            .sum();

        GraphStats {
            total_nodes: self.graph.node_count(),
            satellites: count(NodeKind::Satellite),
            gateways: count(NodeKind::Gateway),
            targets: count(NodeKind::Target),
            windows: self.windows.len(),
            isl_windows,
            ground_windows: self.windows.len() - isl_windows,
            directed_edges: self.graph.edge_count(),
            total_capacity_bytes: self.windows.iter().map(ContactWindow::capacity).sum(),
            downlink_capacity_bytes,
        }
    }
}

/// Permitted transmission direction between node kinds
pub fn can_send(from: NodeKind, to: NodeKind) -> bool {
    matches!(
        (from, to),
        (NodeKind::Target, NodeKind::Satellite)
            | (NodeKind::Satellite, NodeKind::Satellite)
            | (NodeKind::Satellite, NodeKind::Gateway)
    )
}

/// Graph statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub satellites: usize,
    pub gateways: usize,
    pub targets: usize,
    pub windows: usize,
    pub isl_windows: usize,
    pub ground_windows: usize,
    pub directed_edges: usize,
    pub total_capacity_bytes: f64,
    /// Bytes all satellite-to-gateway windows can carry
    pub downlink_capacity_bytes: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinkKind;
    use ground_stations::{GeoLocation, GroundNode, GroundRole};
    use orbital_mechanics::{OrbitalElement, Satellite, SatelliteComms};

    fn satellite(id: u32) -> NetworkNode {
        NetworkNode::Satellite(Satellite {
            id: NodeId(id),
            name: format!("SAT-{id}"),
            elements: OrbitalElement::from_degrees(7000.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0).unwrap(),
            comms: SatelliteComms {
                isl_range_km: 5000.0,
                isl_rate: 100.0,
                s2g_rate: 100.0,
            },
            storage_bytes: 10_000,
        })
    }

    fn ground(id: u32, role: GroundRole) -> NetworkNode {
        NetworkNode::Ground(GroundNode {
            id: NodeId(id),
            name: format!("G-{id}"),
            location: GeoLocation::new(0.0, 0.0, 0.0).unwrap(),
            min_elevation_deg: 0.0,
            role,
        })
    }

    fn gateway(id: u32) -> NetworkNode {
        ground(
            id,
            GroundRole::Gateway {
                rate: 100.0,
                power_tx: 1.0,
                power_rx: 1.0,
            },
        )
    }

    fn w(a: u32, b: u32, start: f64, end: f64, rate: f64) -> ContactWindow {
        let kind = if a >= 2000 && a < 3000 && b >= 2000 && b < 3000 {
            LinkKind::InterSatellite
        } else {
            LinkKind::SatelliteToGround
        };
        ContactWindow {
            index: 0,
            node_a: NodeId(a.min(b)),
            node_b: NodeId(a.max(b)),
            start,
            end,
            rate,
            kind,
        }
    }

    /// T(3000) -> S1(2000) -> S2(2001) -> GW(1000), plus a slow direct S1 -> GW
    fn create_test_graph() -> ContactGraph {
        let nodes = vec![
            gateway(1000),
            satellite(2000),
            satellite(2001),
            ground(3000, GroundRole::Target),
        ];
        let plan = ContactPlan::from_windows(vec![
            w(3000, 2000, 0.0, 100.0, 100.0),
            w(2000, 2001, 50.0, 200.0, 100.0),
            w(2001, 1000, 150.0, 300.0, 100.0),
            w(2000, 1000, 500.0, 600.0, 100.0),
        ]);
        ContactGraph::new(&nodes, &plan).unwrap()
    }

    fn request(size: u64, expires_at: f64) -> RouteRequest {
        RouteRequest {
            source: NodeId(3000),
            not_before: 0.0,
            size_bytes: size,
            expires_at,
        }
    }

    #[test]
    fn test_edges_respect_roles() {
        let graph = create_test_graph();
        let stats = graph.stats();
        assert_eq!(stats.total_nodes, 4);
        assert_eq!(stats.windows, 4);
        assert_eq!(stats.isl_windows, 1);
        // target->sat, sat<->sat, sat->gw twice
        assert_eq!(stats.directed_edges, 5);
        assert_eq!(stats.downlink_capacity_bytes, 25_000.0);
        assert!(!can_send(NodeKind::Gateway, NodeKind::Satellite));
        assert!(!can_send(NodeKind::Satellite, NodeKind::Target));
    }

    #[test]
    fn test_earliest_arrival_multi_hop() {
        let graph = create_test_graph();
        let route = graph
            .earliest_arrival(&request(1000, 10_000.0), &Unused)
            .unwrap()
            .unwrap();

        assert_eq!(route.destination, NodeId(1000));
        assert_eq!(route.hop_count(), 3);
        let hops: Vec<(NodeId, NodeId)> = route.hops.iter().map(|h| (h.from, h.to)).collect();
        assert_eq!(
            hops,
            vec![
                (NodeId(3000), NodeId(2000)),
                (NodeId(2000), NodeId(2001)),
                (NodeId(2001), NodeId(1000)),
            ]
        );
        assert_eq!(route.hops[0].arrival, 10.0);
        assert_eq!(route.hops[1].departure, 50.0);
        assert_eq!(route.hops[2].departure, 150.0);
        assert_eq!(route.arrival(), 160.0);
    }

    #[test]
    fn test_expiry_prunes_route() {
        let graph = create_test_graph();
        assert!(graph
            .earliest_arrival(&request(1000, 100.0), &Unused)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_route_falls_back_when_relay_exhausted() {
        struct RelayFull;
        impl WindowUsage for RelayFull {
            fn cursor(&self, window: &ContactWindow) -> f64 {
                window.start
            }
            fn residual(&self, window: &ContactWindow) -> f64 {
                if window.kind == LinkKind::InterSatellite {
                    0.0
                } else {
                    window.capacity()
                }
            }
        }

        let graph = create_test_graph();
        let route = graph
            .earliest_arrival(&request(1000, 10_000.0), &RelayFull)
            .unwrap()
            .unwrap();
        assert_eq!(route.hop_count(), 2);
        assert_eq!(route.hops[1].window, 3);
        assert_eq!(route.arrival(), 510.0);
    }

    #[test]
    fn test_bundle_too_large_for_window() {
        let graph = create_test_graph();
        // 100 s window at 100 B/s cannot carry 20 kB
        assert!(graph
            .earliest_arrival(&request(20_000, 10_000.0), &Unused)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unknown_source() {
        let graph = create_test_graph();
        let mut req = request(10, 100.0);
        req.source = NodeId(9);
        assert_eq!(
            graph.earliest_arrival(&req, &Unused).unwrap_err(),
            ContactError::NodeNotFound(NodeId(9))
        );
    }

    #[test]
    fn test_ties_prefer_fewer_hops() {
        let nodes = vec![
            gateway(1000),
            satellite(2000),
            satellite(2001),
            ground(3000, GroundRole::Target),
        ];
        // The relay path lands just after the direct downlink
        let plan = ContactPlan::from_windows(vec![
            w(3000, 2000, 0.0, 100.0, 100.0),
            w(2000, 2001, 0.0, 100.0, 1e9),
            w(2001, 1000, 10.0, 100.0, 100.0),
            w(2000, 1000, 10.0, 100.0, 100.0),
        ]);
        let graph = ContactGraph::new(&nodes, &plan).unwrap();
        let route = graph
            .earliest_arrival(&request(1000, 1000.0), &Unused)
            .unwrap()
            .unwrap();
        assert_eq!(route.hop_count(), 2);
    }
}
