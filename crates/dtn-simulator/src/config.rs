//! Scenario description and validation
//!
//! Validation never stops at the first problem; every violation found is
//! reported together.

use bundle_routing::{
    ArrivalProcess, BundleProfile, PriorityOrder, SchedulerConfig, StoragePolicy, ValueSpec,
};
use orbital_mechanics::EARTH_MEAN_RADIUS_KM;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Upper bound on gateways and satellites so id ranges never overlap
pub const MAX_NODES_PER_KIND: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid scenario ({} violations): {}", violations.len(), summary(violations))]
pub struct ConfigurationError {
    pub violations: Vec<Violation>,
}

fn summary(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub simulation: SimulationSection,
    pub bundles: BundleSection,
    pub targets: TargetSection,
    pub gateways: GatewaySection,
    pub satellites: SatelliteSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationSection {
    /// Horizon (s)
    pub duration: f64,
    /// Simulation epoch (Julian date)
    pub date_start: f64,
    /// Sampling step (s)
    pub step_size: f64,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleSection {
    /// Bytes
    pub size: ValueSpec<u64>,
    /// Seconds
    pub lifetime: ValueSpec<f64>,
    pub priority: ValueSpec<i32>,
    #[serde(default)]
    pub arrival: ArrivalProcess,
    #[serde(default)]
    pub priority_order: PriorityOrder,
}

impl BundleSection {
    pub fn profile(&self) -> BundleProfile {
        BundleProfile {
            size: self.size,
            lifetime: self.lifetime,
            priority: self.priority,
            arrival: self.arrival,
        }
    }
}

/// How a node list is supplied
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Explicit list
    #[default]
    Bespoke,
    /// Generated pattern
    Generated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationSpec {
    pub lat: f64,
    pub lon: f64,
    /// Metres above the ellipsoid
    #[serde(default)]
    pub alt: f64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Resolved ground node source
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSource<'a> {
    Bespoke(&'a [LocationSpec]),
    Generated(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroundSource {
    #[serde(rename = "type", default)]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<LocationSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl GroundSource {
    pub fn resolve(&self) -> Option<NodeSource<'_>> {
        match self.kind {
            SourceKind::Bespoke => self.locations.as_deref().map(NodeSource::Bespoke),
            SourceKind::Generated => self.count.map(NodeSource::Generated),
        }
    }

    fn len(&self) -> usize {
        match self.resolve() {
            Some(NodeSource::Bespoke(list)) => list.len(),
            Some(NodeSource::Generated(n)) => n,
            None => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetSection {
    /// Minimum elevation (deg)
    pub min_el: f64,
    #[serde(flatten)]
    pub source: GroundSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySection {
    /// Minimum elevation (deg)
    pub min_el: f64,
    /// Bytes per second
    pub rate: f64,
    pub power_tx: f64,
    pub power_rx: f64,
    #[serde(flatten)]
    pub source: GroundSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrbitSpec {
    /// Semi-major axis (km)
    pub sma: f64,
    /// Inclination (deg)
    pub inc: f64,
    pub ecc: f64,
    pub raan: f64,
    pub aop: f64,
    /// True anomaly at the element epoch (deg)
    pub ta: f64,
    #[serde(default)]
    pub name: Option<String>,
    /// Element epoch (JD); the simulation epoch when absent
    #[serde(default)]
    pub epoch: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalkerSpec {
    pub total: u32,
    pub planes: u32,
    pub phasing: u32,
    pub sma: f64,
    pub inc: f64,
    #[serde(default)]
    pub raan_offset: f64,
    #[serde(default)]
    pub ta_offset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SatelliteSection {
    /// Maximum ISL range (km)
    pub dist_isl: f64,
    /// ISL rate (bytes/s)
    pub rate_isl: f64,
    /// Satellite-to-ground rate (bytes/s)
    pub rate_s2g: f64,
    /// Onboard storage (bytes)
    pub storage: u64,
    #[serde(default)]
    pub storage_policy: StoragePolicy,
    #[serde(rename = "type", default)]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orbits: Option<Vec<OrbitSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walker: Option<WalkerSpec>,
}

impl Scenario {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            priority_order: self.bundles.priority_order,
            storage_policy: self.satellites.storage_policy,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut v = Validator::default();
        self.validate_simulation(&mut v);
        self.validate_bundles(&mut v);
        validate_ground(&mut v, "targets", self.targets.min_el, &self.targets.source);
        validate_ground(&mut v, "gateways", self.gateways.min_el, &self.gateways.source);
        v.positive("gateways.rate", self.gateways.rate);
        v.finite("gateways.power_tx", self.gateways.power_tx);
        v.finite("gateways.power_rx", self.gateways.power_rx);
        if self.gateways.source.len() > MAX_NODES_PER_KIND {
            v.push("gateways", format!("at most {MAX_NODES_PER_KIND} gateways supported"));
        }
        self.validate_satellites(&mut v);
        v.finish()
    }

    fn validate_simulation(&self, v: &mut Validator) {
        let sim = &self.simulation;
        v.positive("simulation.duration", sim.duration);
        v.positive("simulation.step_size", sim.step_size);
        v.positive("simulation.date_start", sim.date_start);
        if sim.duration > 0.0 && sim.step_size > 0.0 {
            let steps = sim.duration / sim.step_size;
            if (steps - steps.round()).abs() > 1e-9 * steps.max(1.0) {
                v.push(
                    "simulation.duration",
                    format!(
                        "{} is not a multiple of step_size {}",
                        sim.duration, sim.step_size
                    ),
                );
            }
        }
    }

    fn validate_bundles(&self, v: &mut Validator) {
        let b = &self.bundles;
        let (size_min, size_max) = b.size.bounds();
        if size_min == 0 {
            v.push("bundles.size", "must be positive");
        }
        if size_min > size_max {
            v.push("bundles.size", "range min exceeds max");
        }
        let (life_min, life_max) = b.lifetime.bounds();
        v.positive("bundles.lifetime", life_min);
        v.finite("bundles.lifetime", life_max);
        if life_min > life_max {
            v.push("bundles.lifetime", "range min exceeds max");
        }
        let (prio_min, prio_max) = b.priority.bounds();
        if prio_min > prio_max {
            v.push("bundles.priority", "range min exceeds max");
        }
        match b.arrival {
            ArrivalProcess::Periodic {
                interval: Some(interval),
            } => v.positive("bundles.arrival.interval", interval),
            ArrivalProcess::Periodic { interval: None } => {}
            ArrivalProcess::Poisson { mean_interval } => {
                v.positive("bundles.arrival.mean_interval", mean_interval)
            }
            ArrivalProcess::Congestion { level } => v.positive("bundles.arrival.level", level),
        }
    }

    fn validate_satellites(&self, v: &mut Validator) {
        let s = &self.satellites;
        v.positive("satellites.dist_isl", s.dist_isl);
        v.positive("satellites.rate_isl", s.rate_isl);
        v.positive("satellites.rate_s2g", s.rate_s2g);
        if s.storage == 0 {
            v.push("satellites.storage", "must be positive");
        }

        match s.kind {
            SourceKind::Bespoke => match &s.orbits {
                None => v.push("satellites.orbits", "missing field for bespoke satellites"),
                Some(orbits) if orbits.is_empty() => v.push("satellites.orbits", "must not be empty"),
                Some(orbits) => {
                    if orbits.len() > MAX_NODES_PER_KIND {
                        v.push(
                            "satellites.orbits",
                            format!("at most {MAX_NODES_PER_KIND} satellites supported"),
                        );
                    }
                    for (i, orbit) in orbits.iter().enumerate() {
                        let field = |name: &str| format!("satellites.orbits[{i}].{name}");
                        v.above_earth(&field("sma"), orbit.sma);
                        if !(0.0..1.0).contains(&orbit.ecc) {
                            v.push(&field("ecc"), format!("{} outside [0, 1)", orbit.ecc));
                        } else if orbit.sma * (1.0 - orbit.ecc) <= EARTH_MEAN_RADIUS_KM {
                            v.push(&field("ecc"), "perigee below the Earth's surface");
                        }
                        v.finite(&field("inc"), orbit.inc);
                        v.finite(&field("raan"), orbit.raan);
                        v.finite(&field("aop"), orbit.aop);
                        v.finite(&field("ta"), orbit.ta);
                        if let Some(epoch) = orbit.epoch {
                            v.positive(&field("epoch"), epoch);
                        }
                    }
                }
            },
            SourceKind::Generated => match &s.walker {
                None => v.push("satellites.walker", "missing field for generated satellites"),
                Some(walker) => {
                    if walker.total == 0 {
                        v.push("satellites.walker.total", "must be positive");
                    }
                    if walker.planes == 0 {
                        v.push("satellites.walker.planes", "must be positive");
                    } else {
                        if walker.total % walker.planes != 0 {
                            v.push(
                                "satellites.walker.planes",
                                format!("{} satellites do not split over {} planes", walker.total, walker.planes),
                            );
                        }
                        if walker.phasing >= walker.planes {
                            v.push("satellites.walker.phasing", "must be below the plane count");
                        }
                    }
                    if walker.total as usize > MAX_NODES_PER_KIND {
                        v.push(
                            "satellites.walker.total",
                            format!("at most {MAX_NODES_PER_KIND} satellites supported"),
                        );
                    }
                    v.above_earth("satellites.walker.sma", walker.sma);
                    v.finite("satellites.walker.inc", walker.inc);
                    v.finite("satellites.walker.raan_offset", walker.raan_offset);
                    v.finite("satellites.walker.ta_offset", walker.ta_offset);
                }
            },
        }
    }
}

fn validate_ground(v: &mut Validator, section: &str, min_el: f64, source: &GroundSource) {
    if !(0.0..=90.0).contains(&min_el) {
        v.push(&format!("{section}.min_el"), format!("{min_el} outside [0, 90]"));
    }

    match source.kind {
        SourceKind::Bespoke => match &source.locations {
            None => v.push(
                &format!("{section}.locations"),
                "missing field for bespoke nodes",
            ),
            Some(list) if list.is_empty() => {
                v.push(&format!("{section}.locations"), "must not be empty")
            }
            Some(list) => {
                for (i, loc) in list.iter().enumerate() {
                    if !(-90.0..=90.0).contains(&loc.lat) {
                        v.push(
                            &format!("{section}.locations[{i}].lat"),
                            format!("{} outside [-90, 90]", loc.lat),
                        );
                    }
                    if !(-180.0..=180.0).contains(&loc.lon) {
                        v.push(
                            &format!("{section}.locations[{i}].lon"),
                            format!("{} outside [-180, 180]", loc.lon),
                        );
                    }
                    v.finite(&format!("{section}.locations[{i}].alt"), loc.alt);
                }
            }
        },
        SourceKind::Generated => match source.count {
            None => v.push(&format!("{section}.count"), "missing field for generated nodes"),
            Some(0) => v.push(&format!("{section}.count"), "must be positive"),
            Some(_) => {}
        },
    }
}

#[derive(Default)]
struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.violations.push(Violation {
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn positive(&mut self, field: &str, value: f64) {
        if !(value.is_finite() && value > 0.0) {
            self.push(field, format!("must be positive, got {value}"));
        }
    }

    fn finite(&mut self, field: &str, value: f64) {
        if !value.is_finite() {
            self.push(field, "must be finite");
        }
    }

    fn above_earth(&mut self, field: &str, sma: f64) {
        if !(sma.is_finite() && sma > EARTH_MEAN_RADIUS_KM) {
            self.push(
                field,
                format!("must exceed the Earth radius ({EARTH_MEAN_RADIUS_KM} km), got {sma}"),
            );
        }
    }

    fn finish(self) -> Result<(), ConfigurationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError {
                violations: self.violations,
            })
        }
    }
}
