//! Fixed-step simulation clock
//!
//! Time is derived from the step index so repeated runs land on identical
//! sample instants with no accumulated rounding.

use crate::{ContactError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationClock {
    step_size: f64,
    duration: f64,
    step_index: u64,
}

impl SimulationClock {
    pub fn new(step_size: f64, duration: f64) -> Result<Self> {
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(ContactError::InvalidClock(format!(
                "step size must be positive, got {step_size}"
            )));
        }
        if !(duration.is_finite() && duration > 0.0) {
            return Err(ContactError::InvalidClock(format!(
                "duration must be positive, got {duration}"
            )));
        }
        Ok(Self {
            step_size,
            duration,
            step_index: 0,
        })
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    /// Number of samples in `[0, duration)`
    pub fn step_count(&self) -> u64 {
        // Tolerate float noise when duration is an exact multiple of the step
        ((self.duration / self.step_size) - 1e-9).ceil().max(0.0) as u64
    }

    /// Current simulated time (s)
    pub fn now(&self) -> f64 {
        self.time_at(self.step_index)
    }

    pub fn time_at(&self, step_index: u64) -> f64 {
        step_index as f64 * self.step_size
    }

    /// True once every sample in the horizon has been visited
    pub fn is_finished(&self) -> bool {
        self.step_index >= self.step_count()
    }

    pub fn advance(&mut self) {
        self.step_index += 1;
    }

    pub fn reset(&mut self) {
        self.step_index = 0;
    }

    /// All sample instants in `[0, duration)`
    pub fn sample_times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.step_count()).map(move |k| self.time_at(k))
    }
}
