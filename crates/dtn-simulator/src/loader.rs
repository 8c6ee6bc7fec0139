//! Scenario loading from JSON files

use crate::config::Scenario;
use crate::Result;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Load and validate a scenario
pub fn load_scenario(path: impl AsRef<Path>) -> Result<Scenario> {
    let path = path.as_ref();
    info!("Loading scenario from {:?}", path);

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let scenario: Scenario = serde_json::from_reader(reader)?;

    if let Err(err) = scenario.validate() {
        for violation in &err.violations {
            warn!("Scenario violation: {}", violation);
        }
        return Err(err.into());
    }

    info!(
        "Loaded scenario: {} s horizon, {} s step, seed {}",
        scenario.simulation.duration, scenario.simulation.step_size, scenario.simulation.seed
    );
    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SCENARIO: &str = r#"{
        "simulation": {"duration": 600, "date_start": 2451545.0, "step_size": 10, "seed": 7},
        "bundles": {"size": 500, "lifetime": 300, "priority": 0},
        "targets": {"min_el": 30, "locations": [{"lat": 10, "lon": 10}]},
        "gateways": {"min_el": 10, "rate": 1000, "power_tx": 1, "power_rx": 1,
                     "locations": [{"lat": 45, "lon": 0}]},
        "satellites": {"dist_isl": 4000, "rate_isl": 1000, "rate_s2g": 1000, "storage": 10000,
                       "orbits": [{"sma": 7000, "inc": 45, "ecc": 0, "raan": 0, "aop": 0, "ta": 0}]}
    }"#;

    fn write(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_scenario() {
        let file = write(SCENARIO);
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.simulation.seed, 7);
        assert_eq!(scenario.satellites.orbits.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_load_rejects_invalid_scenario() {
        let file = write(&SCENARIO.replace("\"min_el\": 30", "\"min_el\": -5"));
        match load_scenario(file.path()) {
            Err(SimError::Configuration(err)) => {
                assert_eq!(err.violations.len(), 1);
                assert_eq!(err.violations[0].field, "targets.min_el");
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_malformed_json() {
        let file = write("{ \"simulation\": ");
        assert!(matches!(load_scenario(file.path()), Err(SimError::Json(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(load_scenario(&missing), Err(SimError::Io(_))));
    }
}
