//! Pure spectrum transforms: summation, background handling, smoothing.
//!
//! Every function returns a fresh [`Spectrum`]; inputs are never mutated.
//! Detector profiles travel along by shared reference.

use std::sync::Arc;

use log::{debug, info};

use crate::detector::{DetectorProfile, DetectorRegistry};
use crate::error::{Error, Result};
use crate::loader;
use crate::spectrum::{Provenance, Spectrum};

// ---------------------------------------------------------------------------
// Summation
// ---------------------------------------------------------------------------

/// Element-wise sum of counts and acquisition times over a non-empty,
/// equal-length list of spectra.
///
/// Header, footer and detector association are inherited from the first
/// input so structured-report metadata survives the combination; the
/// acquisition-time line inside the inherited header is rewritten to the
/// summed times. Channels are regenerated as `0..N-1`; the energy axis is
/// left to the caller.
pub fn sum_spectra(spectra: &[Spectrum], name_modifier: &str) -> Result<Spectrum> {
    let first = spectra.first().ok_or(Error::EmptyBatch)?;
    let n = first.len();

    let mut counts = first.counts.clone();
    let mut times = first.times;
    for spectrum in &spectra[1..] {
        if spectrum.len() != n {
            return Err(Error::ShapeMismatch {
                expected: n,
                found: spectrum.len(),
                name: spectrum.name.clone(),
            });
        }
        for (acc, c) in counts.iter_mut().zip(&spectrum.counts) {
            *acc += c;
        }
        // Times add component-wise; a single input without them would
        // silently corrupt the total, so any mix is an error.
        times = match (times, spectrum.times) {
            (Some((r, l)), Some((sr, sl))) => Some((r + sr, l + sl)),
            (Some(_), None) => return Err(Error::MissingTimes(spectrum.name.clone())),
            (None, Some(_)) => return Err(Error::MissingTimes(first.name.clone())),
            (None, None) => None,
        };
    }

    let last = spectra.last().unwrap_or(first);
    let mut result = Spectrum {
        name: sum_name(first, last, name_modifier),
        detector: first.detector.clone(),
        counts,
        channels: Spectrum::default_channels(n),
        energies: None,
        times,
        provenance: first.provenance.clone(),
    };
    result.sync_header_times();
    Ok(result)
}

/// Result name: `SumSpectra{detector}{modifier}-{first}_to_{last}`, where
/// first/last are the first embedded run of 3+ digits in the boundary
/// input names. Falls back to the modifier alone when the names carry no
/// such sequence.
fn sum_name(first: &Spectrum, last: &Spectrum, modifier: &str) -> String {
    let detector = first
        .detector
        .as_ref()
        .map(|p| p.kind.tag())
        .unwrap_or_default();
    match (file_number(&first.name), file_number(&last.name)) {
        (Some(a), Some(b)) => format!("SumSpectra{detector}{modifier}-{a}_to_{b}"),
        _ => modifier.to_string(),
    }
}

/// First run of three or more consecutive ASCII digits in `name`.
fn file_number(name: &str) -> Option<&str> {
    let bytes = name.as_bytes();
    let mut start = None;
    for (i, b) in bytes.iter().enumerate() {
        match (b.is_ascii_digit(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= 3 {
                    return Some(&name[s..i]);
                }
                start = None;
            }
            _ => {}
        }
    }
    start.filter(|s| bytes.len() - s >= 3).map(|s| &name[s..])
}

// ---------------------------------------------------------------------------
// Background normalization and subtraction
// ---------------------------------------------------------------------------

/// The detector's reference background scaled to a `target_time` second
/// acquisition. Pure scaling, no subtraction.
pub fn normalized_background(
    profile: &Arc<DetectorProfile>,
    target_time: f64,
    registry: &DetectorRegistry,
) -> Result<Spectrum> {
    let background = loader::load_file(&profile.background_path, registry)?;
    let factor = target_time / profile.background_seconds;

    let counts: Vec<f64> = background.counts.iter().map(|c| c * factor).collect();
    let channels = Spectrum::default_channels(counts.len());
    let mut result = Spectrum {
        name: format!("{}-Background_{}s", profile.kind, target_time),
        detector: Some(Arc::clone(profile)),
        counts,
        channels,
        energies: None,
        // The loaded times describe the reference acquisition, not the
        // scaled one, so they do not carry over.
        times: None,
        provenance: Provenance::Columnar,
    };
    result.rederive_energy_scale();
    Ok(result)
}

/// Subtract the detector's reference background, scaled by the ratio of
/// the spectrum's real-time to the reference acquisition time.
///
/// With `significance == 0` each channel is clamped at
/// `max(0, signal - scaled_background)`. With `significance > 0` a
/// one-sided Poisson gate is applied instead: the net count survives only
/// when it exceeds `sqrt(bg) + bg` for the scaled background `bg` (with
/// the minimum strictly-positive scaled background substituted at
/// zero-count channels to avoid a zero-variance floor); gated channels
/// are zeroed.
//
// TODO: the gate threshold is a fixed one-sigma band; `significance` acts
// only as an on/off switch. Confirm whether the sqrt term should scale by
// the significance multiplier before changing the formula.
pub fn subtract_background(
    spectrum: &Spectrum,
    significance: f64,
    registry: &DetectorRegistry,
) -> Result<Spectrum> {
    let profile = spectrum
        .detector
        .clone()
        .ok_or_else(|| Error::UnresolvedDetector(spectrum.name.clone()))?;
    let (real_time, _) = spectrum
        .times
        .ok_or_else(|| Error::MissingTimes(spectrum.name.clone()))?;

    let background = loader::load_file(&profile.background_path, registry)?;
    let factor = real_time / profile.background_seconds;

    let counts: Vec<f64> = if significance > 0.0 {
        // Zero-count background channels take the smallest positive
        // background as their variance floor.
        let floor = background
            .counts
            .iter()
            .copied()
            .filter(|&bg| bg > 0.0)
            .fold(f64::INFINITY, f64::min);
        let floor = if floor.is_finite() { floor * factor } else { 0.0 };

        spectrum
            .counts
            .iter()
            .zip(&background.counts)
            .map(|(&signal, &bg)| {
                let bg_scaled = if bg > 0.0 { bg * factor } else { floor };
                let net = signal - bg_scaled;
                if net > bg_scaled.sqrt() + bg_scaled {
                    net
                } else {
                    0.0
                }
            })
            .collect()
    } else {
        spectrum
            .counts
            .iter()
            .zip(&background.counts)
            .map(|(&signal, &bg)| (signal - bg * factor).max(0.0))
            .collect()
    };

    let channels = Spectrum::default_channels(counts.len());
    let mut result = Spectrum {
        name: format!("{}_BG_SUBTRACTED", spectrum.name),
        detector: Some(profile),
        counts,
        channels,
        energies: None,
        times: spectrum.times,
        // The result is a derived array, not a structured report.
        provenance: Provenance::Columnar,
    };
    result.rederive_energy_scale();
    Ok(result)
}

// ---------------------------------------------------------------------------
// Noise smoothing
// ---------------------------------------------------------------------------

/// Gaussian kernel width in channels.
const SMOOTH_SIGMA: f64 = 1.0;
/// Kernel support, in multiples of sigma.
const KERNEL_REACH: usize = 4;

/// Smooth the counts with a fixed-width Gaussian kernel (sigma = 1
/// channel). The robust noise level is logged before and after as a
/// diagnostic; it does not adapt the kernel.
pub fn smooth(spectrum: &Spectrum) -> Spectrum {
    let before = noise_level(&spectrum.counts);

    let radius = (SMOOTH_SIGMA * KERNEL_REACH as f64).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|k| (-(k as f64).powi(2) / (2.0 * SMOOTH_SIGMA * SMOOTH_SIGMA)).exp())
        .collect();

    let n = spectrum.counts.len() as isize;
    let counts: Vec<f64> = (0..n)
        .map(|i| {
            // Renormalize over the in-range part of the kernel so edges
            // are not pulled toward zero.
            let mut acc = 0.0;
            let mut weight = 0.0;
            for (w, j) in kernel.iter().zip(i - radius..=i + radius) {
                if (0..n).contains(&j) {
                    acc += w * spectrum.counts[j as usize];
                    weight += w;
                }
            }
            acc / weight
        })
        .collect();

    let after = noise_level(&counts);
    info!(
        "smoothed '{}': noise level {before:.3} -> {after:.3}",
        spectrum.name
    );

    let mut result = spectrum.clone();
    result.counts = counts;
    result
}

/// Robust noise estimate: `median(|successive differences|) / 0.6745`,
/// the median absolute deviation of first differences expressed as an
/// equivalent Gaussian standard deviation.
pub fn noise_level(counts: &[f64]) -> f64 {
    if counts.len() < 2 {
        return 0.0;
    }
    let mut diffs: Vec<f64> = counts.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    diffs.sort_by(f64::total_cmp);

    let mid = diffs.len() / 2;
    let median = if diffs.len() % 2 == 0 {
        (diffs[mid - 1] + diffs[mid]) / 2.0
    } else {
        diffs[mid]
    };
    debug!("noise estimate over {} channels: {median:.4} MAD", counts.len());
    median / 0.6745
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CalibrationConfig, DetectorConfig, RegistryConfig};
    use crate::detector::DetectorKind;
    use crate::loader::tests::report_fixture;
    use crate::spectrum::{ReportLayout, TIME_LINE};
    use std::path::PathBuf;

    fn report(name: &str, counts: Vec<f64>, times: (f64, f64)) -> Spectrum {
        let n = counts.len();
        Spectrum {
            name: name.into(),
            detector: None,
            counts,
            channels: Spectrum::default_channels(n),
            energies: None,
            times: Some(times),
            provenance: Provenance::StructuredReport {
                header: (0..12).map(|i| format!("line {i}")).collect(),
                footer: vec!["$ROI:".into(), "0".into()],
                layout: ReportLayout::default(),
            },
        }
    }

    /// Registry whose background reference is a real file written under a
    /// per-test temp directory.
    fn registry_with_background(
        test: &str,
        bg_counts: &[i64],
        bg_seconds: f64,
    ) -> (DetectorRegistry, PathBuf) {
        let dir = std::env::temp_dir().join(format!("spectre-gamma-{test}"));
        std::fs::create_dir_all(&dir).unwrap();
        let bg_path = dir.join("SmallDet-Background.Spe");
        std::fs::write(&bg_path, report_fixture(bg_counts, bg_seconds as i64, bg_seconds as i64))
            .unwrap();

        let mut config = RegistryConfig::new();
        config.insert(
            DetectorKind::Small,
            DetectorConfig {
                background_path: bg_path,
                background_seconds: bg_seconds,
                calibration: CalibrationConfig {
                    intercept: 0.0,
                    slope: 0.662,
                },
            },
        );
        (DetectorRegistry::from_config(&config), dir)
    }

    #[test]
    fn summation_adds_counts_and_times_elementwise() {
        let spectra = vec![
            report("Shot_21 000", vec![1.0, 2.0, 3.0], (100.0, 100.0)),
            report("Shot_21 001", vec![1.0, 2.0, 3.0], (100.0, 100.0)),
            report("Shot_21 002", vec![1.0, 2.0, 3.0], (100.0, 100.0)),
        ];
        let sum = sum_spectra(&spectra, "Shot_21").unwrap();

        assert_eq!(sum.counts, vec![3.0, 6.0, 9.0]);
        assert_eq!(sum.times, Some((300.0, 300.0)));
        assert_eq!(sum.channels, vec![0.0, 1.0, 2.0]);

        // Inherited header carries the summed times.
        let Provenance::StructuredReport { header, .. } = &sum.provenance else {
            panic!("structured provenance lost");
        };
        assert_eq!(header[TIME_LINE], "300 300");
    }

    #[test]
    fn summation_name_combines_boundary_file_numbers() {
        let spectra = vec![
            report("Shot_21 000", vec![0.0], (1.0, 1.0)),
            report("Shot_21 017", vec![0.0], (1.0, 1.0)),
        ];
        let sum = sum_spectra(&spectra, "Shot_21").unwrap();
        assert_eq!(sum.name, "SumSpectraShot_21-000_to_017");
    }

    #[test]
    fn summation_name_falls_back_to_the_modifier() {
        let spectra = vec![report("run_a", vec![0.0], (1.0, 1.0))];
        let sum = sum_spectra(&spectra, "combined").unwrap();
        assert_eq!(sum.name, "combined");
    }

    #[test]
    fn summation_rejects_unequal_lengths() {
        let spectra = vec![
            report("a 001", vec![1.0, 2.0], (1.0, 1.0)),
            report("b 002", vec![1.0], (1.0, 1.0)),
        ];
        let err = sum_spectra(&spectra, "x").unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn summation_rejects_an_empty_list() {
        assert!(matches!(sum_spectra(&[], "x"), Err(Error::EmptyBatch)));
    }

    #[test]
    fn summation_rejects_missing_times_in_either_position() {
        // Later input lacks times.
        let a = report("a 001", vec![1.0], (1.0, 1.0));
        let mut b = report("b 002", vec![1.0], (1.0, 1.0));
        b.times = None;
        let err = sum_spectra(&[a, b], "x").unwrap_err();
        assert!(matches!(err, Error::MissingTimes(name) if name == "b 002"));

        // First input lacks times while a later one has them.
        let mut a = report("a 001", vec![1.0], (1.0, 1.0));
        a.times = None;
        let b = report("b 002", vec![1.0], (1.0, 1.0));
        let err = sum_spectra(&[a, b], "x").unwrap_err();
        assert!(matches!(err, Error::MissingTimes(name) if name == "a 001"));

        // No input has times: the sum simply has none either.
        let mut a = report("a 001", vec![1.0], (1.0, 1.0));
        let mut b = report("b 002", vec![1.0], (1.0, 1.0));
        a.times = None;
        b.times = None;
        assert_eq!(sum_spectra(&[a, b], "x").unwrap().times, None);
    }

    #[test]
    fn subtraction_clamps_at_zero_without_significance() {
        // Background [2] over 100 s, spectrum over 200 s: factor 2.
        let (registry, _) = registry_with_background("sub-clamp", &[2, 2], 100.0);
        let profile = registry.profile(DetectorKind::Small).unwrap();

        let mut sp = report("SmallDet shot", vec![10.0, 1.0], (200.0, 200.0));
        sp.detector = Some(profile);

        let result = subtract_background(&sp, 0.0, &registry).unwrap();
        assert_eq!(result.counts, vec![6.0, 0.0]);
        assert_eq!(result.name, "SmallDet shot_BG_SUBTRACTED");
        assert!(result.energies.is_some());
        assert_eq!(result.provenance, Provenance::Columnar);
    }

    #[test]
    fn significance_gate_zeroes_borderline_channels() {
        // Scaled background is 4: threshold sqrt(4) + 4 = 6. A net of
        // exactly 6 is not strictly greater, so the channel is zeroed.
        let (registry, _) = registry_with_background("sub-gate", &[2], 100.0);
        let profile = registry.profile(DetectorKind::Small).unwrap();

        let mut sp = report("SmallDet shot", vec![10.0], (200.0, 200.0));
        sp.detector = Some(profile);

        let gated = subtract_background(&sp, 3.0, &registry).unwrap();
        assert_eq!(gated.counts, vec![0.0]);

        let plain = subtract_background(&sp, 0.0, &registry).unwrap();
        assert_eq!(plain.counts, vec![6.0]);
    }

    #[test]
    fn significance_gate_substitutes_a_floor_at_zero_background() {
        // Channel 0 has zero raw background; the smallest positive
        // background (2, scaled by 1) stands in for it.
        let (registry, _) = registry_with_background("sub-floor", &[0, 2], 100.0);
        let profile = registry.profile(DetectorKind::Small).unwrap();

        let mut sp = report("SmallDet shot", vec![5.0, 10.0], (100.0, 100.0));
        sp.detector = Some(profile);

        let result = subtract_background(&sp, 1.0, &registry).unwrap();
        // net 3 <= sqrt(2) + 2, gated; net 8 > sqrt(2) + 2, kept exactly.
        assert_eq!(result.counts[0], 0.0);
        assert_eq!(result.counts[1], 8.0);
    }

    #[test]
    fn subtraction_requires_a_resolved_detector() {
        let (registry, _) = registry_with_background("sub-unresolved", &[2], 100.0);
        let sp = report("Calibration 003", vec![1.0], (100.0, 100.0));
        let err = subtract_background(&sp, 0.0, &registry).unwrap_err();
        assert!(matches!(err, Error::UnresolvedDetector(_)));
    }

    #[test]
    fn normalized_background_is_pure_scaling() {
        let (registry, _) = registry_with_background("bg-norm", &[4, 8], 100.0);
        let profile = registry.profile(DetectorKind::Small).unwrap();

        let bg = normalized_background(&profile, 50.0, &registry).unwrap();
        assert_eq!(bg.counts, vec![2.0, 4.0]);
        assert!(bg.energies.is_some());
    }

    #[test]
    fn smoothing_preserves_a_flat_spectrum() {
        let sp = report("flat", vec![5.0; 32], (1.0, 1.0));
        let smoothed = smooth(&sp);
        assert_eq!(smoothed.len(), 32);
        for c in smoothed.counts {
            assert!((c - 5.0).abs() < 1e-9, "flat signal distorted: {c}");
        }
    }

    #[test]
    fn smoothing_reduces_the_noise_estimate() {
        // Alternating spikes: maximal first-difference noise.
        let counts: Vec<f64> = (0..64).map(|i| if i % 2 == 0 { 0.0 } else { 10.0 }).collect();
        let sp = report("spiky", counts, (1.0, 1.0));
        let smoothed = smooth(&sp);
        assert!(noise_level(&smoothed.counts) < noise_level(&sp.counts));
    }

    #[test]
    fn noise_level_matches_the_robust_estimator() {
        // All successive differences are 1.
        let ramp: Vec<f64> = (0..10).map(f64::from).collect();
        assert!((noise_level(&ramp) - 1.0 / 0.6745).abs() < 1e-12);
        assert_eq!(noise_level(&[1.0]), 0.0);
    }

    #[test]
    fn file_number_finds_the_first_long_digit_run() {
        assert_eq!(file_number("Shot_21 014"), Some("014"));
        assert_eq!(file_number("SumSpectraBigDetShot_5-000_to_174"), Some("000"));
        assert_eq!(file_number("background"), None);
        assert_eq!(file_number("run 42"), None);
    }
}
