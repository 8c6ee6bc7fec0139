//! Ground Stations Library
//!
//! Gateways (bundle sinks) and targets (bundle sources) fixed on the
//! rotating Earth, with topocentric look angles towards satellites.

use nalgebra::Vector3;
use orbital_mechanics::transforms::{self, LookAngles};
use orbital_mechanics::{NodeId, SECONDS_PER_DAY};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StationError {
    #[error("Station not found: {0}")]
    NotFound(NodeId),
    #[error("Duplicate station id: {0}")]
    Duplicate(NodeId),
    #[error("Invalid location: {0}")]
    InvalidLocation(String),
}

pub type Result<T> = std::result::Result<T, StationError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64, altitude_m: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(StationError::InvalidLocation(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(StationError::InvalidLocation(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        if !altitude_m.is_finite() {
            return Err(StationError::InvalidLocation(
                "altitude must be finite".to_string(),
            ));
        }
        Ok(Self {
            latitude,
            longitude,
            altitude_m,
        })
    }

    /// Earth-fixed position (km)
    pub fn ecef(&self) -> Vector3<f64> {
        transforms::geodetic_to_ecef(self.latitude, self.longitude, self.altitude_m / 1000.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum GroundRole {
    /// Bundle sink, downlink rate in bytes/s
    Gateway {
        rate: f64,
        power_tx: f64,
        power_rx: f64,
    },
    /// Bundle source
    Target,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundNode {
    pub id: NodeId,
    pub name: String,
    pub location: GeoLocation,
    pub min_elevation_deg: f64,
    pub role: GroundRole,
}

impl GroundNode {
    pub fn is_gateway(&self) -> bool {
        matches!(self.role, GroundRole::Gateway { .. })
    }

    pub fn is_target(&self) -> bool {
        matches!(self.role, GroundRole::Target)
    }

    /// Inertial position (km) at `t` seconds after `epoch_jd`
    pub fn position_eci(&self, epoch_jd: f64, t: f64) -> Vector3<f64> {
        let gmst = transforms::gmst_from_julian(epoch_jd + t / SECONDS_PER_DAY);
        transforms::ecef_to_eci(&self.location.ecef(), gmst)
    }

    /// Look angles towards an inertial position at `t` seconds after `epoch_jd`
    pub fn look_angles(&self, target_eci: &Vector3<f64>, epoch_jd: f64, t: f64) -> LookAngles {
        let gmst = transforms::gmst_from_julian(epoch_jd + t / SECONDS_PER_DAY);
        let target_ecef = transforms::eci_to_ecef(target_eci, gmst);
        transforms::look_angles(
            self.location.latitude,
            self.location.longitude,
            &self.location.ecef(),
            &target_ecef,
        )
    }

    pub fn elevation_deg(&self, target_eci: &Vector3<f64>, epoch_jd: f64, t: f64) -> f64 {
        self.look_angles(target_eci, epoch_jd, t).elevation_deg
    }
}

/// Ordered collection of ground nodes, configuration order preserved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationRegistry {
    nodes: Vec<GroundNode>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn add(&mut self, node: GroundNode) -> Result<()> {
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(StationError::Duplicate(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> Result<&GroundNode> {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .ok_or(StationError::NotFound(id))
    }

    pub fn gateways(&self) -> impl Iterator<Item = &GroundNode> {
        self.nodes.iter().filter(|n| n.is_gateway())
    }

    pub fn targets(&self) -> impl Iterator<Item = &GroundNode> {
        self.nodes.iter().filter(|n| n.is_target())
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroundNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub mod generated {
    use super::*;

    /// Evenly spread surface points on a Fibonacci spiral, north to south.
    pub fn fibonacci_sphere(samples: usize) -> Vec<GeoLocation> {
        let golden_angle = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());

        (0..samples)
            .map(|i| {
                let z = if samples > 1 {
                    1.0 - 2.0 * i as f64 / (samples - 1) as f64
                } else {
                    1.0
                };
                let radius = (1.0 - z * z).max(0.0).sqrt();
                let theta = golden_angle * i as f64;
                let (x, y) = (theta.cos() * radius, theta.sin() * radius);

                GeoLocation {
                    latitude: z.clamp(-1.0, 1.0).asin().to_degrees(),
                    longitude: y.atan2(x).to_degrees(),
                    altitude_m: 0.0,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gateway(id: u32, lat: f64, lon: f64) -> GroundNode {
        GroundNode {
            id: NodeId(id),
            name: format!("GW-{id}"),
            location: GeoLocation::new(lat, lon, 0.0).unwrap(),
            min_elevation_deg: 10.0,
            role: GroundRole::Gateway {
                rate: 1e6,
                power_tx: 10.0,
                power_rx: 10.0,
            },
        }
    }

    #[test]
    fn test_location_validation() {
        assert!(GeoLocation::new(91.0, 0.0, 0.0).is_err());
        assert!(GeoLocation::new(0.0, -181.0, 0.0).is_err());
        assert!(GeoLocation::new(-90.0, 180.0, 1200.0).is_ok());
    }

    #[test]
    fn test_position_eci_on_surface() {
        let node = gateway(1000, 0.0, 20.0);
        for t in [0.0, 3600.0, 43_200.0] {
            let r = node.position_eci(2_451_545.0, t).norm();
            assert!((r - 6378.137).abs() < 1e-6);
        }
    }

    #[test]
    fn test_earth_rotation_moves_station() {
        let node = gateway(1000, 0.0, 0.0);
        let a = node.position_eci(2_451_545.0, 0.0);
        let b = node.position_eci(2_451_545.0, 6.0 * 3600.0);
        // Roughly a quarter turn in six hours
        let angle = a.angle(&b).to_degrees();
        assert!((angle - 90.2).abs() < 0.5);
    }

    #[test]
    fn test_overhead_satellite_elevation() {
        let node = gateway(1000, -45.0, 70.0);
        let epoch = 2_451_545.0;
        let t = 1800.0;
        let gmst = transforms::gmst_from_julian(epoch + t / SECONDS_PER_DAY);
        let above = transforms::geodetic_to_ecef(-45.0, 70.0, 800.0);
        let sat_eci = transforms::ecef_to_eci(&above, gmst);
        let elevation = node.elevation_deg(&sat_eci, epoch, t);
        assert!((elevation - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = StationRegistry::new();
        registry.add(gateway(1000, 0.0, 0.0)).unwrap();
        registry
            .add(GroundNode {
                id: NodeId(3000),
                name: "T-0".to_string(),
                location: GeoLocation::new(0.0, 20.0, 0.0).unwrap(),
                min_elevation_deg: 60.0,
                role: GroundRole::Target,
            })
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.gateways().count(), 1);
        assert_eq!(registry.targets().next().unwrap().id, NodeId(3000));
        assert_eq!(
            registry.get(NodeId(42)).unwrap_err(),
            StationError::NotFound(NodeId(42))
        );
        assert_eq!(
            registry.add(gateway(1000, 1.0, 1.0)).unwrap_err(),
            StationError::Duplicate(NodeId(1000))
        );
    }

    #[test]
    fn test_fibonacci_sphere_points() {
        let points = generated::fibonacci_sphere(50);
        assert_eq!(points.len(), 50);
        assert!((points[0].latitude - 90.0).abs() < 1e-9);
        assert!((points[49].latitude + 90.0).abs() < 1e-9);
        for p in &points {
            assert!(GeoLocation::new(p.latitude, p.longitude, p.altitude_m).is_ok());
        }

        let north = points.iter().filter(|p| p.latitude > 0.0).count();
        assert_eq!(north, 25);

        assert_eq!(generated::fibonacci_sphere(1)[0].latitude, 90.0);
        assert!(generated::fibonacci_sphere(0).is_empty());
    }

    proptest! {
        #[test]
        fn test_station_stays_on_ellipsoid(
            lat in -90.0f64..=90.0,
            lon in -180.0f64..=180.0,
            t in 0.0f64..86_400.0,
        ) {
            let node = gateway(1000, lat, lon);
            let r = node.position_eci(2_451_545.0, t).norm();
            prop_assert!(r >= 6356.75 && r <= 6378.14);
        }
    }
}
