use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::detector::DetectorKind;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Detector configuration, loaded from a JSON file
// ---------------------------------------------------------------------------

/// Affine channel-to-energy calibration: `energy = intercept + slope * channel`.
#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationConfig {
    pub intercept: f64,
    pub slope: f64,
}

/// Per-detector settings supplied by the external configuration boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    pub background_path: PathBuf,
    pub background_seconds: f64,
    pub calibration: CalibrationConfig,
}

/// The whole configuration file: one entry per detector tag.
///
/// ```json
/// {
///   "BigDet": {
///     "background_path": "backgrounds/BigDet-Background.Spe",
///     "background_seconds": 62372,
///     "calibration": { "intercept": -0.34, "slope": 0.3704 }
///   }
/// }
/// ```
pub type RegistryConfig = BTreeMap<DetectorKind, DetectorConfig>;

/// Read and parse a detector configuration file.
pub fn load_config(path: &Path) -> Result<RegistryConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&text)
        .map_err(|e| Error::format(path, format!("invalid detector configuration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_configuration_document() {
        let text = r#"{
            "BigDet": {
                "background_path": "backgrounds/BigDet-Background.Spe",
                "background_seconds": 62372,
                "calibration": { "intercept": -0.34, "slope": 0.3704 }
            },
            "SmallDet": {
                "background_path": "backgrounds/SmallDet-Background.Spe",
                "background_seconds": 62366,
                "calibration": { "intercept": 0.0, "slope": 0.662 }
            }
        }"#;
        let config: RegistryConfig = serde_json::from_str(text).unwrap();

        assert_eq!(config.len(), 2);
        let big = &config[&DetectorKind::Big];
        assert_eq!(big.background_seconds, 62372.0);
        assert_eq!(big.calibration.slope, 0.3704);
    }
}
