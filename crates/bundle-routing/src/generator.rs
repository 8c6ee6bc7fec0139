//! Bundle generation at targets
//!
//! Each target runs its own seeded stream so adding a target never shifts
//! another target's bundles. Streams are merged by (time, target, sequence)
//! and ids are handed out in merged order.

use crate::{Bundle, BundleId, Result, RoutingError};
use orbital_mechanics::NodeId;
use rand::distributions::uniform::SampleUniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A fixed value or an inclusive `[min, max]` range drawn per bundle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ValueSpec<T> {
    Fixed(T),
    Range([T; 2]),
}

impl<T: SampleUniform + PartialOrd + Copy> ValueSpec<T> {
    pub fn sample<R: Rng>(&self, rng: &mut R) -> T {
        match *self {
            ValueSpec::Fixed(v) => v,
            ValueSpec::Range([min, max]) => rng.gen_range(min..=max),
        }
    }

    pub fn bounds(&self) -> (T, T) {
        match *self {
            ValueSpec::Fixed(v) => (v, v),
            ValueSpec::Range([min, max]) => (min, max),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArrivalProcess {
    /// One bundle every `interval` seconds from t = 0; the step size when unset
    Periodic {
        #[serde(default)]
        interval: Option<f64>,
    },
    /// Exponential inter-arrival times
    Poisson { mean_interval: f64 },
    /// Exponential inter-arrival times whose network-wide rate offers `level`
    /// times the total satellite-to-gateway capacity
    Congestion { level: f64 },
}

impl Default for ArrivalProcess {
    fn default() -> Self {
        ArrivalProcess::Periodic { interval: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleProfile {
    pub size: ValueSpec<u64>,
    pub lifetime: ValueSpec<f64>,
    pub priority: ValueSpec<i32>,
    #[serde(default)]
    pub arrival: ArrivalProcess,
}

impl BundleProfile {
    pub fn validate(&self) -> Result<()> {
        let (size_min, size_max) = self.size.bounds();
        let (life_min, life_max) = self.lifetime.bounds();
        let (prio_min, prio_max) = self.priority.bounds();
        if size_min == 0 || size_min > size_max {
            return Err(RoutingError::InvalidParameters(format!(
                "size must be positive with min <= max, got [{size_min}, {size_max}]"
            )));
        }
        if !(life_min > 0.0 && life_min <= life_max && life_max.is_finite()) {
            return Err(RoutingError::InvalidParameters(format!(
                "lifetime must be positive with min <= max, got [{life_min}, {life_max}]"
            )));
        }
        if prio_min > prio_max {
            return Err(RoutingError::InvalidParameters(format!(
                "priority range inverted: [{prio_min}, {prio_max}]"
            )));
        }
        match self.arrival {
            ArrivalProcess::Periodic {
                interval: Some(interval),
            } if !(interval.is_finite() && interval > 0.0) => Err(RoutingError::InvalidParameters(
                format!("periodic interval must be positive, got {interval}"),
            )),
            ArrivalProcess::Poisson { mean_interval }
                if !(mean_interval.is_finite() && mean_interval > 0.0) =>
            {
                Err(RoutingError::InvalidParameters(format!(
                    "poisson mean interval must be positive, got {mean_interval}"
                )))
            }
            ArrivalProcess::Congestion { level } if !(level.is_finite() && level > 0.0) => {
                Err(RoutingError::InvalidParameters(format!(
                    "congestion level must be positive, got {level}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Mean time between bundles that offers `level` times `downlink_bytes`
/// over `duration`
pub fn congestion_interval(
    duration: f64,
    size_bytes: f64,
    downlink_bytes: f64,
    level: f64,
) -> f64 {
    (duration * size_bytes) / (downlink_bytes * level)
}

pub struct BundleGenerator {
    profile: BundleProfile,
    seed: u64,
    downlink_bytes: f64,
}

/// Arrival process of one target with every parameter resolved
#[derive(Debug, Clone, Copy)]
enum Stream {
    Periodic { interval: f64 },
    Poisson { mean_interval: f64 },
}

/// One draw from a target stream, before ids are assigned
struct Draw {
    time: f64,
    target: NodeId,
    seq: u64,
    size_bytes: u64,
    lifetime_s: f64,
    priority: i32,
}

impl BundleGenerator {
    pub fn new(profile: BundleProfile, seed: u64) -> Result<Self> {
        profile.validate()?;
        Ok(Self {
            profile,
            seed,
            downlink_bytes: 0.0,
        })
    }

    /// Total satellite-to-gateway capacity, used by congestion-driven arrivals
    pub fn with_downlink_capacity(mut self, bytes: f64) -> Self {
        self.downlink_bytes = bytes;
        self
    }

    fn stream(&self, targets: usize, duration: f64, step_size: f64) -> Option<Stream> {
        match self.profile.arrival {
            ArrivalProcess::Periodic { interval } => Some(Stream::Periodic {
                interval: interval.unwrap_or(step_size),
            }),
            ArrivalProcess::Poisson { mean_interval } => Some(Stream::Poisson { mean_interval }),
            ArrivalProcess::Congestion { level } => {
                let (min, max) = self.profile.size.bounds();
                let mean_size = (min as f64 + max as f64) / 2.0;
                // Each target carries an equal share of the network-wide rate
                let mean_interval =
                    congestion_interval(duration, mean_size, self.downlink_bytes, level)
                        * targets as f64;
                if !(mean_interval.is_finite() && mean_interval > 0.0) {
                    warn!(
                        downlink_bytes = self.downlink_bytes,
                        "No downlink capacity, congestion-driven traffic disabled"
                    );
                    return None;
                }
                debug!(mean_interval, level, "Congestion arrival rate resolved");
                Some(Stream::Poisson { mean_interval })
            }
        }
    }

    /// All bundles created in `[0, duration)`, ordered by creation time
    pub fn generate(&self, targets: &[NodeId], duration: f64, step_size: f64) -> Vec<Bundle> {
        if targets.is_empty() {
            return Vec::new();
        }
        let Some(stream) = self.stream(targets.len(), duration, step_size) else {
            return Vec::new();
        };

        #[cfg(feature = "parallel")]
        let streams: Vec<Vec<Draw>> = targets
            .par_iter()
            .map(|&target| self.target_stream(target, stream, duration))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let streams: Vec<Vec<Draw>> = targets
            .iter()
            .map(|&target| self.target_stream(target, stream, duration))
            .collect();

        let mut draws: Vec<Draw> = streams.into_iter().flatten().collect();
        draws.sort_by(|a, b| {
            a.time
                .total_cmp(&b.time)
                .then(a.target.cmp(&b.target))
                .then(a.seq.cmp(&b.seq))
        });

        let bundles: Vec<Bundle> = draws
            .into_iter()
            .enumerate()
            .map(|(i, d)| Bundle {
                id: BundleId(i as u64),
                source: d.target,
                created_at: d.time,
                size_bytes: d.size_bytes,
                lifetime_s: d.lifetime_s,
                priority: d.priority,
            })
            .collect();

        debug!(
            bundles = bundles.len(),
            targets = targets.len(),
            "Bundles generated"
        );
        bundles
    }

    fn target_stream(&self, target: NodeId, stream: Stream, duration: f64) -> Vec<Draw> {
        let mut rng = StdRng::seed_from_u64(stream_seed(self.seed, target));
        let mut draws = Vec::new();
        let mut seq = 0u64;

        let mut emit = |time: f64, rng: &mut StdRng, draws: &mut Vec<Draw>| {
            draws.push(Draw {
                time,
                target,
                seq,
                size_bytes: self.profile.size.sample(rng),
                lifetime_s: self.profile.lifetime.sample(rng),
                priority: self.profile.priority.sample(rng),
            });
            seq += 1;
        };

        match stream {
            Stream::Periodic { interval } => {
                let mut k = 0u64;
                loop {
                    let time = k as f64 * interval;
                    if time >= duration {
                        break;
                    }
                    emit(time, &mut rng, &mut draws);
                    k += 1;
                }
            }
            Stream::Poisson { mean_interval } => {
                let mut time = 0.0;
                loop {
                    let u: f64 = rng.gen();
                    time += -mean_interval * (1.0 - u).ln();
                    if time >= duration {
                        break;
                    }
                    emit(time, &mut rng, &mut draws);
                }
            }
        }

        draws
    }
}

/// Per-target seed, so streams stay independent of each other
fn stream_seed(seed: u64, target: NodeId) -> u64 {
    seed ^ (target.0 as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
