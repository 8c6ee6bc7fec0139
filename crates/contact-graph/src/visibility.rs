//! Line-of-sight visibility
//!
//! Satellite-ground links require the satellite above the node's minimum
//! elevation and a clear path past the Earth. Satellite-satellite links
//! require range within both terminals' ISL limit and a clear path.
//! Ground-ground pairs are never visible.

use crate::{NetworkNode, Result};
use ground_stations::GroundNode;
use nalgebra::Vector3;
use orbital_mechanics::{Satellite, EARTH_MEAN_RADIUS_KM};

/// Clearance subtracted from the occlusion sphere for ground links (km)
pub const GROUND_OCCLUSION_MARGIN_KM: f64 = 1.0;

/// True if the open segment `p`-`q` passes strictly inside a sphere of
/// `radius` km centred on the Earth's centre.
pub fn segment_occluded(p: &Vector3<f64>, q: &Vector3<f64>, radius: f64) -> bool {
    let d = q - p;
    let len2 = d.norm_squared();
    if len2 == 0.0 {
        return false;
    }

    let s = -p.dot(&d) / len2;
    if s <= 0.0 || s >= 1.0 {
        return false;
    }

    (p + d * s).norm() < radius
}

pub fn satellite_ground_visible(
    ground: &GroundNode,
    ground_eci: &Vector3<f64>,
    sat_eci: &Vector3<f64>,
    epoch_jd: f64,
    t: f64,
) -> bool {
    if ground_eci == sat_eci {
        return true;
    }
    if ground.elevation_deg(sat_eci, epoch_jd, t) < ground.min_elevation_deg {
        return false;
    }
    let radius = EARTH_MEAN_RADIUS_KM.min(ground_eci.norm()) - GROUND_OCCLUSION_MARGIN_KM;
    !segment_occluded(ground_eci, sat_eci, radius)
}

pub fn inter_satellite_visible(
    a: &Satellite,
    a_eci: &Vector3<f64>,
    b: &Satellite,
    b_eci: &Vector3<f64>,
) -> bool {
    let max_range = a.comms.isl_range_km.min(b.comms.isl_range_km);
    if (b_eci - a_eci).norm() > max_range {
        return false;
    }
    !segment_occluded(a_eci, b_eci, EARTH_MEAN_RADIUS_KM)
}

/// Visibility from precomputed inertial positions.
///
/// The pair is evaluated in id order so swapping arguments cannot change
/// the result.
pub fn visible_at(
    a: &NetworkNode,
    a_eci: &Vector3<f64>,
    b: &NetworkNode,
    b_eci: &Vector3<f64>,
    epoch_jd: f64,
    t: f64,
) -> bool {
    let ((a, a_eci), (b, b_eci)) = if a.id() <= b.id() {
        ((a, a_eci), (b, b_eci))
    } else {
        ((b, b_eci), (a, a_eci))
    };

    match (a, b) {
        (NetworkNode::Satellite(sa), NetworkNode::Satellite(sb)) => {
            inter_satellite_visible(sa, a_eci, sb, b_eci)
        }
        (NetworkNode::Ground(g), NetworkNode::Satellite(_)) => {
            satellite_ground_visible(g, a_eci, b_eci, epoch_jd, t)
        }
        (NetworkNode::Satellite(_), NetworkNode::Ground(g)) => {
            satellite_ground_visible(g, b_eci, a_eci, epoch_jd, t)
        }
        (NetworkNode::Ground(_), NetworkNode::Ground(_)) => false,
    }
}

/// Whether `a` and `b` can see each other `t` seconds after `epoch_jd`
pub fn is_visible(a: &NetworkNode, b: &NetworkNode, epoch_jd: f64, t: f64) -> Result<bool> {
    let a_eci = a.position_eci(epoch_jd, t)?;
    let b_eci = b.position_eci(epoch_jd, t)?;
    Ok(visible_at(a, &a_eci, b, &b_eci, epoch_jd, t))
}
