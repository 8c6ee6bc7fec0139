//! Network construction and the per-run simulation context

use crate::config::{LocationSpec, NodeSource, Scenario, SourceKind};
use crate::{Result, SimError, GATEWAY_ID_BASE, SATELLITE_ID_BASE, TARGET_ID_BASE};
use bundle_routing::{NetworkState, Scheduler};
use contact_graph::{NetworkNode, NodeKind, SimulationClock};
use ground_stations::generated::fibonacci_sphere;
use ground_stations::{GeoLocation, GroundNode, GroundRole, StationError, StationRegistry};
use orbital_mechanics::walker::WalkerDelta;
use orbital_mechanics::{NodeId, OrbitalElement, Satellite, SatelliteComms};
use tracing::{debug, info};

/// Every node of a scenario, gateways first, then satellites, then targets
#[derive(Debug, Clone)]
pub struct Network {
    epoch_jd: f64,
    nodes: Vec<NetworkNode>,
}

impl Network {
    pub fn from_scenario(scenario: &Scenario) -> Result<Self> {
        let epoch_jd = scenario.simulation.date_start;
        let mut stations = StationRegistry::new();

        let gateway = GroundRole::Gateway {
            rate: scenario.gateways.rate,
            power_tx: scenario.gateways.power_tx,
            power_rx: scenario.gateways.power_rx,
        };
        let gateway_source = scenario
            .gateways
            .source
            .resolve()
            .ok_or_else(|| missing_source("gateways"))?;
        for node in ground_nodes(
            gateway_source,
            GATEWAY_ID_BASE,
            "GW",
            scenario.gateways.min_el,
            gateway,
        )? {
            stations.add(node)?;
        }

        let target_source = scenario
            .targets
            .source
            .resolve()
            .ok_or_else(|| missing_source("targets"))?;
        for node in ground_nodes(
            target_source,
            TARGET_ID_BASE,
            "T",
            scenario.targets.min_el,
            GroundRole::Target,
        )? {
            stations.add(node)?;
        }

        let satellites = satellites(scenario, epoch_jd)?;

        let mut nodes: Vec<NetworkNode> = stations
            .gateways()
            .cloned()
            .map(NetworkNode::Ground)
            .collect();
        nodes.extend(satellites.into_iter().map(NetworkNode::Satellite));
        nodes.extend(stations.targets().cloned().map(NetworkNode::Ground));

        info!(
            gateways = stations.gateways().count(),
            targets = stations.targets().count(),
            satellites = nodes.len() - stations.len(),
            "Network assembled"
        );
        Ok(Self { epoch_jd, nodes })
    }

    pub fn epoch_jd(&self) -> f64 {
        self.epoch_jd
    }

    pub fn nodes(&self) -> &[NetworkNode] {
        &self.nodes
    }

    pub fn ids_of(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.kind() == kind)
            .map(NetworkNode::id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn missing_source(section: &str) -> SimError {
    SimError::Station(StationError::InvalidLocation(format!(
        "{section} has no node list for its type"
    )))
}

fn ground_nodes(
    source: NodeSource<'_>,
    id_base: u32,
    prefix: &str,
    min_el: f64,
    role: GroundRole,
) -> Result<Vec<GroundNode>> {
    let placed: Vec<(GeoLocation, Option<String>)> = match source {
        NodeSource::Bespoke(list) => list
            .iter()
            .map(
                |LocationSpec { lat, lon, alt, name }| -> ground_stations::Result<_> {
                    Ok((GeoLocation::new(*lat, *lon, *alt)?, name.clone()))
                },
            )
            .collect::<std::result::Result<_, StationError>>()?,
        NodeSource::Generated(count) => fibonacci_sphere(count)
            .into_iter()
            .map(|loc| (loc, None))
            .collect(),
    };

    Ok(placed
        .into_iter()
        .enumerate()
        .map(|(i, (location, name))| GroundNode {
            id: NodeId(id_base + i as u32),
            name: name.unwrap_or_else(|| format!("{prefix}-{i}")),
            location,
            min_elevation_deg: min_el,
            role,
        })
        .collect())
}

fn satellites(scenario: &Scenario, epoch_jd: f64) -> Result<Vec<Satellite>> {
    let section = &scenario.satellites;
    let comms = SatelliteComms {
        isl_range_km: section.dist_isl,
        isl_rate: section.rate_isl,
        s2g_rate: section.rate_s2g,
    };

    let named: Vec<(OrbitalElement, Option<String>)> = match section.kind {
        SourceKind::Bespoke => section
            .orbits
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|o| -> Result<_> {
                let elements = OrbitalElement::from_degrees(
                    o.sma,
                    o.ecc,
                    o.inc,
                    o.raan,
                    o.aop,
                    o.ta,
                    o.epoch.unwrap_or(epoch_jd),
                )?;
                Ok((elements, o.name.clone()))
            })
            .collect::<Result<_>>()?,
        SourceKind::Generated => match &section.walker {
            Some(w) => {
                let pattern = WalkerDelta {
                    total_satellites: w.total,
                    planes: w.planes,
                    phasing: w.phasing,
                    semi_major_axis_km: w.sma,
                    inclination_deg: w.inc,
                    raan_offset_deg: w.raan_offset,
                    true_anomaly_offset_deg: w.ta_offset,
                };
                debug!(
                    total = w.total,
                    planes = w.planes,
                    phasing = w.phasing,
                    "Generating Walker Delta constellation"
                );
                pattern
                    .elements(epoch_jd)?
                    .into_iter()
                    .map(|el| (el, None))
                    .collect()
            }
            None => Vec::new(),
        },
    };

    Ok(named
        .into_iter()
        .enumerate()
        .map(|(i, (elements, name))| Satellite {
            id: NodeId(SATELLITE_ID_BASE + i as u32),
            name: name.unwrap_or_else(|| format!("SAT-{i}")),
            elements,
            comms,
            storage_bytes: section.storage,
        })
        .collect())
}

/// Clock and mutable network state of one run
pub struct SimulationContext {
    clock: SimulationClock,
    state: NetworkState,
}

impl SimulationContext {
    pub fn new(clock: SimulationClock, state: NetworkState) -> Self {
        Self { clock, state }
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn state(&self) -> &NetworkState {
        &self.state
    }

    /// Step through every sample instant, then close the run at the horizon.
    /// The bundle ledger is checked after each step.
    pub fn run(&mut self, scheduler: &Scheduler<'_>) -> Result<()> {
        while !self.clock.is_finished() {
            let now = self.clock.now();
            scheduler.step(&mut self.state, now)?;
            self.check(now)?;
            self.clock.advance();
        }

        let horizon = self.clock.duration();
        scheduler.finish(&mut self.state, horizon)?;
        self.check(horizon)?;

        let counts = self.state.counts();
        debug!(
            steps = self.clock.step_index(),
            delivered = counts.delivered,
            expired = counts.expired,
            dropped = counts.dropped,
            "Run complete"
        );
        Ok(())
    }

    fn check(&self, now: f64) -> Result<()> {
        if !self.state.counts().is_balanced() {
            return Err(SimError::Ledger(now));
        }
        #[cfg(debug_assertions)]
        self.state.check_ownership()?;
        Ok(())
    }

    pub fn into_state(self) -> NetworkState {
        self.state
    }
}
