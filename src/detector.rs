use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{DetectorConfig, RegistryConfig};
use crate::error::{Error, Result};

/// Channel count of the structured-report acquisition hardware. Shorter
/// formats truncate the derived energy table, never extrapolate past it.
pub const CHANNELS: usize = 8191;

// ---------------------------------------------------------------------------
// DetectorKind – closed set of physical detectors
// ---------------------------------------------------------------------------

/// The two physical detectors, identified in filenames by their tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetectorKind {
    #[serde(rename = "BigDet")]
    Big,
    #[serde(rename = "SmallDet")]
    Small,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 2] = [DetectorKind::Big, DetectorKind::Small];

    /// The identifying substring used in data filenames.
    pub fn tag(self) -> &'static str {
        match self {
            DetectorKind::Big => "BigDet",
            DetectorKind::Small => "SmallDet",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Pluggable filename-to-detector resolver. The registry never guesses:
/// a `None` from the resolver is surfaced as
/// [`Error::UnresolvedDetector`] for the caller to disambiguate.
pub type DetectorResolver = fn(&str) -> Option<DetectorKind>;

/// Default resolver: case-sensitive substring scan for any registered tag.
pub fn detector_from_name(name: &str) -> Option<DetectorKind> {
    DetectorKind::ALL
        .into_iter()
        .find(|kind| name.contains(kind.tag()))
}

// ---------------------------------------------------------------------------
// DetectorProfile – per-detector calibration and background reference
// ---------------------------------------------------------------------------

/// Immutable per-detector configuration with the energy lookup table
/// pre-computed at construction. Shared by reference across any number of
/// spectra.
#[derive(Debug)]
pub struct DetectorProfile {
    pub kind: DetectorKind,
    /// Reference background acquisition (`.Spe`).
    pub background_path: PathBuf,
    /// Real-time duration of the background acquisition, seconds.
    pub background_seconds: f64,
    pub intercept: f64,
    pub slope: f64,
    energy_table: Vec<f64>,
}

impl DetectorProfile {
    pub fn new(kind: DetectorKind, config: &DetectorConfig) -> Self {
        let intercept = config.calibration.intercept;
        let slope = config.calibration.slope;
        let energy_table = (0..CHANNELS)
            .map(|c| intercept + slope * c as f64)
            .collect();
        DetectorProfile {
            kind,
            background_path: config.background_path.clone(),
            background_seconds: config.background_seconds,
            intercept,
            slope,
            energy_table,
        }
    }

    /// The calibrated energy axis truncated to `len` channels, or `None`
    /// when `len` exceeds the table — the table is never extrapolated, and
    /// a partial axis would break the counts/energies length invariant.
    pub fn energy_scale(&self, len: usize) -> Option<Vec<f64>> {
        (len <= self.energy_table.len()).then(|| self.energy_table[..len].to_vec())
    }
}

// ---------------------------------------------------------------------------
// DetectorRegistry – immutable kind → profile mapping
// ---------------------------------------------------------------------------

/// Read-only registry built once from configuration, handed around by
/// reference. No global state.
#[derive(Debug)]
pub struct DetectorRegistry {
    profiles: BTreeMap<DetectorKind, Arc<DetectorProfile>>,
}

impl DetectorRegistry {
    pub fn from_config(config: &RegistryConfig) -> Self {
        let profiles = config
            .iter()
            .map(|(&kind, cfg)| (kind, Arc::new(DetectorProfile::new(kind, cfg))))
            .collect();
        DetectorRegistry { profiles }
    }

    /// Profile for a known detector kind.
    pub fn profile(&self, kind: DetectorKind) -> Result<Arc<DetectorProfile>> {
        self.profiles
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::UnknownDetector(kind.tag().to_string()))
    }

    /// Resolve a filename through `resolver` and look the profile up.
    pub fn resolve(&self, filename: &str, resolver: DetectorResolver) -> Result<Arc<DetectorProfile>> {
        let kind = resolver(filename)
            .ok_or_else(|| Error::UnresolvedDetector(filename.to_string()))?;
        self.profile(kind)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::CalibrationConfig;

    pub(crate) fn test_config() -> RegistryConfig {
        let mut config = RegistryConfig::new();
        config.insert(
            DetectorKind::Big,
            DetectorConfig {
                background_path: "BigDet-Background.Spe".into(),
                background_seconds: 62372.0,
                calibration: CalibrationConfig {
                    intercept: -0.34,
                    slope: 0.3704,
                },
            },
        );
        config.insert(
            DetectorKind::Small,
            DetectorConfig {
                background_path: "SmallDet-Background.Spe".into(),
                background_seconds: 62366.0,
                calibration: CalibrationConfig {
                    intercept: 0.0,
                    slope: 0.662,
                },
            },
        );
        config
    }

    #[test]
    fn energy_table_is_affine_in_channel() {
        let registry = DetectorRegistry::from_config(&test_config());
        let profile = registry.profile(DetectorKind::Small).unwrap();

        let scale = profile.energy_scale(100).unwrap();
        assert_eq!(scale.len(), 100);
        for (c, &e) in scale.iter().enumerate() {
            assert_eq!(e, profile.intercept + profile.slope * c as f64);
        }
    }

    #[test]
    fn energy_scale_never_extrapolates_past_the_table() {
        let registry = DetectorRegistry::from_config(&test_config());
        let profile = registry.profile(DetectorKind::Big).unwrap();
        assert_eq!(profile.energy_scale(CHANNELS).unwrap().len(), CHANNELS);
        assert!(profile.energy_scale(CHANNELS + 500).is_none());
    }

    #[test]
    fn filename_resolution_is_substring_based() {
        assert_eq!(
            detector_from_name("SumSpectraSmallDetShot_21-000_to_174.Spe"),
            Some(DetectorKind::Small)
        );
        assert_eq!(
            detector_from_name("BigDet-Background.Spe"),
            Some(DetectorKind::Big)
        );
        // Case-sensitive by convention; "bigdet" is not a tag.
        assert_eq!(detector_from_name("bigdet shot 001.Spe"), None);
    }

    #[test]
    fn unresolved_detector_is_an_error_not_a_default() {
        let registry = DetectorRegistry::from_config(&test_config());
        let err = registry
            .resolve("Calibration 003.Spe", detector_from_name)
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedDetector(_)));
    }
}
