//! Orbital Mechanics Library
//!
//! Two-body Keplerian propagation, coordinate transforms, and Walker Delta
//! constellation modeling for the DTN constellation simulator.
//!
//! All distances are kilometres, all times are seconds unless a name says
//! otherwise. Epochs are Julian dates.

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrbitalError {
    #[error("Kepler solver did not converge after {iterations} iterations (e = {eccentricity}, M = {mean_anomaly} rad)")]
    NonConvergence {
        iterations: u32,
        eccentricity: f64,
        mean_anomaly: f64,
    },
    #[error("Invalid orbital elements: {0}")]
    InvalidElements(String),
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// Earth gravitational parameter (km^3/s^2)
pub const MU_EARTH_KM3_S2: f64 = 398_600.5;

/// Mean Earth radius used for line-of-sight occlusion (km)
pub const EARTH_MEAN_RADIUS_KM: f64 = 6371.0;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Network-wide node identity shared by satellites and ground nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Classical orbital elements. Angles are held in radians.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrbitalElement {
    pub semi_major_axis_km: f64,
    pub eccentricity: f64,
    pub inclination_rad: f64,
    pub raan_rad: f64,
    pub arg_perigee_rad: f64,
    pub true_anomaly_rad: f64,
    /// Epoch at which `true_anomaly_rad` holds (Julian date)
    pub epoch_jd: f64,
}

impl OrbitalElement {
    /// Build elements from degree-valued angles, rejecting unbound or degenerate orbits.
    pub fn from_degrees(
        semi_major_axis_km: f64,
        eccentricity: f64,
        inclination_deg: f64,
        raan_deg: f64,
        arg_perigee_deg: f64,
        true_anomaly_deg: f64,
        epoch_jd: f64,
    ) -> Result<Self> {
        if !(semi_major_axis_km.is_finite() && semi_major_axis_km > 0.0) {
            return Err(OrbitalError::InvalidElements(format!(
                "semi-major axis must be positive, got {semi_major_axis_km}"
            )));
        }
        if !(0.0..1.0).contains(&eccentricity) {
            return Err(OrbitalError::InvalidElements(format!(
                "eccentricity must be in [0, 1), got {eccentricity}"
            )));
        }
        let angles = [inclination_deg, raan_deg, arg_perigee_deg, true_anomaly_deg];
        if angles.iter().any(|a| !a.is_finite()) || !epoch_jd.is_finite() {
            return Err(OrbitalError::InvalidElements(
                "angles and epoch must be finite".to_string(),
            ));
        }

        Ok(Self {
            semi_major_axis_km,
            eccentricity,
            inclination_rad: inclination_deg.to_radians(),
            raan_rad: raan_deg.to_radians(),
            arg_perigee_rad: arg_perigee_deg.to_radians(),
            true_anomaly_rad: true_anomaly_deg.to_radians(),
            epoch_jd,
        })
    }

    /// Mean motion (rad/s)
    pub fn mean_motion(&self) -> f64 {
        (MU_EARTH_KM3_S2 / self.semi_major_axis_km.powi(3)).sqrt()
    }

    /// Orbital period (s)
    pub fn period_s(&self) -> f64 {
        std::f64::consts::TAU / self.mean_motion()
    }

    /// Mean anomaly at the element epoch
    pub fn initial_mean_anomaly(&self) -> f64 {
        let e = self.eccentricity;
        let half = self.true_anomaly_rad / 2.0;
        let eccentric = 2.0 * (((1.0 - e) / (1.0 + e)).sqrt() * half.sin()).atan2(half.cos());
        eccentric - e * eccentric.sin()
    }
}

/// Link and storage parameters carried by every satellite
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SatelliteComms {
    /// Maximum inter-satellite link range (km)
    pub isl_range_km: f64,
    /// ISL data rate (bytes/s)
    pub isl_rate: f64,
    /// Satellite-to-ground data rate (bytes/s)
    pub s2g_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Satellite {
    pub id: NodeId,
    pub name: String,
    pub elements: OrbitalElement,
    pub comms: SatelliteComms,
    /// Onboard bundle storage (bytes)
    pub storage_bytes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StateVector {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Seconds since the element epoch
    pub elapsed_s: f64,
}

impl Satellite {
    /// Full state at `t` seconds after the simulation epoch `sim_epoch_jd`.
    pub fn propagate(&self, sim_epoch_jd: f64, t: f64) -> Result<StateVector> {
        let elapsed = (sim_epoch_jd - self.elements.epoch_jd) * SECONDS_PER_DAY + t;
        propagation::state_at(&self.elements, elapsed)
    }

    /// ECI position (km) at `t` seconds after the simulation epoch.
    pub fn position_at(&self, sim_epoch_jd: f64, t: f64) -> Result<Vector3<f64>> {
        Ok(self.propagate(sim_epoch_jd, t)?.position)
    }
}

pub mod propagation {
    use super::*;
    use nalgebra::Rotation3;
    use std::f64::consts::{PI, TAU};

    pub const KEPLER_TOLERANCE: f64 = 1e-12;
    pub const KEPLER_MAX_ITERATIONS: u32 = 50;

    /// Solve M = E - e sin E for the eccentric anomaly.
    pub fn solve_kepler(mean_anomaly: f64, eccentricity: f64) -> Result<f64> {
        solve_kepler_bounded(mean_anomaly, eccentricity, KEPLER_MAX_ITERATIONS)
    }

    pub fn solve_kepler_bounded(
        mean_anomaly: f64,
        eccentricity: f64,
        max_iterations: u32,
    ) -> Result<f64> {
        let m = mean_anomaly.rem_euclid(TAU);
        let mut eccentric = if eccentricity < 0.8 { m } else { PI };

        for _ in 0..max_iterations {
            let residual = eccentric - eccentricity * eccentric.sin() - m;
            let slope = 1.0 - eccentricity * eccentric.cos();
            let step = residual / slope;
            eccentric -= step;
            if step.abs() < KEPLER_TOLERANCE {
                return Ok(eccentric);
            }
        }

        Err(OrbitalError::NonConvergence {
            iterations: max_iterations,
            eccentricity,
            mean_anomaly: m,
        })
    }

    /// Two-body state `elapsed_s` seconds after the element epoch (ECI, km and km/s).
    pub fn state_at(elements: &OrbitalElement, elapsed_s: f64) -> Result<StateVector> {
        let e = elements.eccentricity;
        let a = elements.semi_major_axis_km;

        let mean_anomaly = elements.initial_mean_anomaly() + elements.mean_motion() * elapsed_s;
        let eccentric = solve_kepler(mean_anomaly, e)?;

        let half = eccentric / 2.0;
        let true_anomaly =
            2.0 * ((1.0 + e).sqrt() * half.sin()).atan2((1.0 - e).sqrt() * half.cos());
        let radius = a * (1.0 - e * eccentric.cos());
        let semi_latus = a * (1.0 - e * e);
        let speed_scale = (MU_EARTH_KM3_S2 / semi_latus).sqrt();

        let position_pf = Vector3::new(
            radius * true_anomaly.cos(),
            radius * true_anomaly.sin(),
            0.0,
        );
        let velocity_pf = Vector3::new(
            -speed_scale * true_anomaly.sin(),
            speed_scale * (e + true_anomaly.cos()),
            0.0,
        );

        let to_inertial = perifocal_to_eci(elements);

        Ok(StateVector {
            position: to_inertial * position_pf,
            velocity: to_inertial * velocity_pf,
            elapsed_s,
        })
    }

    /// ECI position only
    pub fn position_at(elements: &OrbitalElement, elapsed_s: f64) -> Result<Vector3<f64>> {
        Ok(state_at(elements, elapsed_s)?.position)
    }

    /// Rotation R3(-RAAN) R1(-i) R3(-AOP) from the perifocal frame to ECI
    pub fn perifocal_to_eci(elements: &OrbitalElement) -> Rotation3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), elements.raan_rad)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), elements.inclination_rad)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), elements.arg_perigee_rad)
    }
}

pub mod transforms {
    use super::*;
    use std::f64::consts::TAU;

    const WGS84_EQUATORIAL_RADIUS_KM: f64 = 6378.137;
    const WGS84_FLATTENING: f64 = 1.0 / 298.257223563;
    const UNIX_EPOCH_JD: f64 = 2_440_587.5;
    const J2000_JD: f64 = 2_451_545.0;

    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
    pub struct LookAngles {
        /// Degrees clockwise from north
        pub azimuth_deg: f64,
        /// Degrees above the local horizon
        pub elevation_deg: f64,
        pub range_km: f64,
    }

    /// Greenwich mean sidereal time (rad, in [0, 2π)) for a Julian date
    pub fn gmst_from_julian(jd: f64) -> f64 {
        let t = (jd - J2000_JD) / 36525.0;

        let gmst_sec = 67310.54841
            + (876600.0 * 3600.0 + 8640184.812866) * t
            + 0.093104 * t * t
            - 6.2e-6 * t * t * t;

        (gmst_sec / 240.0).to_radians().rem_euclid(TAU)
    }

    /// WGS-84 geodetic coordinates to Earth-fixed cartesian (km)
    pub fn geodetic_to_ecef(latitude_deg: f64, longitude_deg: f64, altitude_km: f64) -> Vector3<f64> {
        let lat = latitude_deg.to_radians();
        let lon = longitude_deg.to_radians();
        let e2 = 2.0 * WGS84_FLATTENING - WGS84_FLATTENING * WGS84_FLATTENING;

        let n = WGS84_EQUATORIAL_RADIUS_KM / (1.0 - e2 * lat.sin().powi(2)).sqrt();

        Vector3::new(
            (n + altitude_km) * lat.cos() * lon.cos(),
            (n + altitude_km) * lat.cos() * lon.sin(),
            (n * (1.0 - e2) + altitude_km) * lat.sin(),
        )
    }

    /// Rotate an Earth-fixed vector into the inertial frame
    pub fn ecef_to_eci(ecef: &Vector3<f64>, gmst_rad: f64) -> Vector3<f64> {
        let (sin_g, cos_g) = gmst_rad.sin_cos();
        Vector3::new(
            cos_g * ecef.x - sin_g * ecef.y,
            sin_g * ecef.x + cos_g * ecef.y,
            ecef.z,
        )
    }

    pub fn eci_to_ecef(eci: &Vector3<f64>, gmst_rad: f64) -> Vector3<f64> {
        ecef_to_eci(eci, -gmst_rad)
    }

    /// Topocentric look angles from a station to a target, both Earth-fixed.
    ///
    /// Coincident positions report an elevation of 90° with zero range.
    pub fn look_angles(
        latitude_deg: f64,
        longitude_deg: f64,
        station_ecef: &Vector3<f64>,
        target_ecef: &Vector3<f64>,
    ) -> LookAngles {
        let rho = target_ecef - station_ecef;
        let range = rho.norm();
        if range == 0.0 {
            return LookAngles {
                azimuth_deg: 0.0,
                elevation_deg: 90.0,
                range_km: 0.0,
            };
        }

        let (sin_lat, cos_lat) = latitude_deg.to_radians().sin_cos();
        let (sin_lon, cos_lon) = longitude_deg.to_radians().sin_cos();

        // South-East-Zenith
        let s = sin_lat * cos_lon * rho.x + sin_lat * sin_lon * rho.y - cos_lat * rho.z;
        let e = -sin_lon * rho.x + cos_lon * rho.y;
        let z = cos_lat * cos_lon * rho.x + cos_lat * sin_lon * rho.y + sin_lat * rho.z;

        let azimuth = e.atan2(-s).rem_euclid(TAU);
        let elevation = (z / range).clamp(-1.0, 1.0).asin();

        LookAngles {
            azimuth_deg: azimuth.to_degrees(),
            elevation_deg: elevation.to_degrees(),
            range_km: range,
        }
    }

    /// Julian date to UTC, `None` when outside chrono's representable range
    pub fn julian_to_datetime(jd: f64) -> Option<DateTime<Utc>> {
        let unix = (jd - UNIX_EPOCH_JD) * SECONDS_PER_DAY;
        if !unix.is_finite() {
            return None;
        }
        let secs = unix.floor();
        let nanos = ((unix - secs) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::<Utc>::from_timestamp(secs as i64, nanos)
    }
}

pub mod walker {
    use super::*;

    /// Walker Delta pattern `i: t/p/f`
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct WalkerDelta {
        pub total_satellites: u32,
        pub planes: u32,
        pub phasing: u32,
        pub semi_major_axis_km: f64,
        pub inclination_deg: f64,
        #[serde(default)]
        pub raan_offset_deg: f64,
        #[serde(default)]
        pub true_anomaly_offset_deg: f64,
    }

    impl WalkerDelta {
        pub fn satellites_per_plane(&self) -> u32 {
            self.total_satellites / self.planes
        }

        pub fn plane_spacing_deg(&self) -> f64 {
            360.0 / self.planes as f64
        }

        pub fn in_plane_spacing_deg(&self) -> f64 {
            360.0 / self.satellites_per_plane() as f64
        }

        /// Phase offset between equivalent satellites in adjacent planes
        pub fn phase_offset_deg(&self) -> f64 {
            self.phasing as f64 * 360.0 / self.total_satellites as f64
        }

        /// Circular element sets, plane-major order
        pub fn elements(&self, epoch_jd: f64) -> Result<Vec<OrbitalElement>> {
            if self.planes == 0 || self.total_satellites == 0 {
                return Err(OrbitalError::InvalidElements(
                    "walker pattern needs at least one plane and one satellite".to_string(),
                ));
            }
            if self.total_satellites % self.planes != 0 {
                return Err(OrbitalError::InvalidElements(format!(
                    "{} satellites cannot be split evenly over {} planes",
                    self.total_satellites, self.planes
                )));
            }

            let per_plane = self.satellites_per_plane();
            let mut out = Vec::with_capacity(self.total_satellites as usize);
            for plane in 0..self.planes {
                let raan = (self.raan_offset_deg + self.plane_spacing_deg() * plane as f64)
                    .rem_euclid(360.0);
                for slot in 0..per_plane {
                    let ta = (self.true_anomaly_offset_deg
                        + self.in_plane_spacing_deg() * slot as f64
                        + self.phase_offset_deg() * plane as f64)
                        .rem_euclid(360.0);
                    out.push(OrbitalElement::from_degrees(
                        self.semi_major_axis_km,
                        0.0,
                        self.inclination_deg,
                        raan,
                        0.0,
                        ta,
                        epoch_jd,
                    )?);
                }
            }
            Ok(out)
        }
    }
}
