//! Run results and their JSON output

use crate::Result;
use bundle_routing::{BundleRecord, SimulationStats, TransmissionEvent};
use chrono::{DateTime, Utc};
use contact_graph::{ContactWindow, GraphStats, NetworkNode, NodeKind};
use orbital_mechanics::transforms::julian_to_datetime;
use orbital_mechanics::NodeId;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSummary {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
}

impl From<&NetworkNode> for NodeSummary {
    fn from(node: &NetworkNode) -> Self {
        Self {
            id: node.id(),
            name: node.name().to_string(),
            kind: node.kind(),
        }
    }
}

/// Scenario timing shared by both report kinds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunInfo {
    /// Simulation epoch, `None` if the Julian date is out of calendar range
    pub epoch_utc: Option<DateTime<Utc>>,
    pub epoch_jd: f64,
    pub duration: f64,
    pub step_size: f64,
    pub seed: u64,
}

impl RunInfo {
    pub fn new(epoch_jd: f64, duration: f64, step_size: f64, seed: u64) -> Self {
        Self {
            epoch_utc: julian_to_datetime(epoch_jd),
            epoch_jd,
            duration,
            step_size,
            seed,
        }
    }
}

/// Contact plan of a scenario without any bundle traffic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactReport {
    pub run: RunInfo,
    pub nodes: Vec<NodeSummary>,
    pub graph: GraphStats,
    pub contacts: Vec<ContactWindow>,
}

/// Full outcome of a simulation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationResult {
    pub run: RunInfo,
    pub nodes: Vec<NodeSummary>,
    pub graph: GraphStats,
    pub contacts: Vec<ContactWindow>,
    pub bundles: Vec<BundleRecord>,
    pub transmissions: Vec<TransmissionEvent>,
    pub stats: SimulationStats,
}

impl ContactReport {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(self, path.as_ref())
    }
}

impl SimulationResult {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(self, path.as_ref())
    }
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)?;
    info!("Results written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn test_run_info_epoch() {
        let info = RunInfo::new(2_451_545.0, 60.0, 10.0, 0);
        let epoch = info.epoch_utc.unwrap();
        assert_eq!(epoch.to_rfc3339(), "2000-01-01T12:00:00+00:00");
    }

    #[test]
    fn test_write_contact_report() {
        let report = ContactReport {
            run: RunInfo::new(2_451_545.0, 60.0, 10.0, 0),
            nodes: vec![NodeSummary {
                id: NodeId(1000),
                name: "GW-0".to_string(),
                kind: NodeKind::Gateway,
            }],
            graph: GraphStats {
                total_nodes: 1,
                satellites: 0,
                gateways: 1,
                targets: 0,
                windows: 0,
                isl_windows: 0,
                ground_windows: 0,
                directed_edges: 0,
                total_capacity_bytes: 0.0,
                downlink_capacity_bytes: 0.0,
            },
            contacts: Vec::new(),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        report.write_json(&path).unwrap();

        let reader = BufReader::new(File::open(&path).unwrap());
        let back: ContactReport = serde_json::from_reader(reader).unwrap();
        assert_eq!(back, report);
    }
}
