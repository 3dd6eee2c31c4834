//! Generate deterministic sample data: a directory of synthetic `.Spe`
//! acquisitions per detector, a matching detector configuration, and one
//! self-describing JSON document.

use std::path::Path;

use anyhow::{Context, Result};

use spectre_gamma::config;
use spectre_gamma::detector::{DetectorKind, DetectorRegistry};
use spectre_gamma::spectrum::{Provenance, ReportLayout, Spectrum};
use spectre_gamma::writer;

const CHANNELS: usize = 1024;
const ACQUISITION_SECONDS: i64 = 300;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Synthetic acquisition: exponential continuum plus photopeaks plus
/// counting noise, clamped to non-negative integer counts.
fn generate_counts(peaks: &[(f64, f64, f64)], rng: &mut SimpleRng) -> Vec<f64> {
    (0..CHANNELS)
        .map(|c| {
            let x = c as f64;
            let continuum = 40.0 * (-x / 400.0).exp();
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(x, mu, sigma, amp))
                .sum();
            let expected = continuum + signal;
            (expected + rng.gauss(0.0, expected.sqrt().max(1.0)))
                .round()
                .max(0.0)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn report_header(real: i64, live: i64) -> Vec<String> {
    vec![
        "$SPEC_ID:".into(),
        "Synthetic sample acquisition".into(),
        "$SPEC_REM:".into(),
        "DET# 1".into(),
        "DETDESC# MCB 129".into(),
        "AP# Maestro Version 7.01".into(),
        "$DATE_MEA:".into(),
        "01/15/2025 09:00:00".into(),
        "$MEAS_TIM:".into(),
        format!("{real} {live}"),
        "$DATA:".into(),
        format!("0 {}", CHANNELS - 1),
    ]
}

fn report_footer() -> Vec<String> {
    vec![
        "$ROI:".into(),
        "0".into(),
        "$PRESETS:".into(),
        "None".into(),
        "$ENER_FIT:".into(),
        "0.000000 0.662000".into(),
    ]
}

const DETECTOR_CONFIG: &str = r#"{
  "BigDet": {
    "background_path": "sample_data/BigDet-Background.Spe",
    "background_seconds": 62372,
    "calibration": { "intercept": -0.34, "slope": 0.3704 }
  },
  "SmallDet": {
    "background_path": "sample_data/SmallDet-Background.Spe",
    "background_seconds": 62366,
    "calibration": { "intercept": 0.0, "slope": 0.662 }
  }
}"#;

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);
    let out = Path::new("sample_data");

    let detector_peaks: Vec<(DetectorKind, Vec<(f64, f64, f64)>)> = vec![
        (
            DetectorKind::Big,
            vec![(180.0, 4.0, 900.0), (477.0, 6.0, 350.0), (662.0, 7.0, 550.0)],
        ),
        (
            DetectorKind::Small,
            vec![(240.0, 5.0, 700.0), (511.0, 6.0, 480.0)],
        ),
    ];

    // Shot series per detector.
    let mut total = 0usize;
    for (kind, peaks) in &detector_peaks {
        for shot in 0..5 {
            let counts = generate_counts(peaks, &mut rng);
            let spectrum = Spectrum {
                name: format!("{kind} Shot_21 {shot:03}"),
                detector: None,
                channels: Spectrum::default_channels(counts.len()),
                counts,
                energies: None,
                times: Some((ACQUISITION_SECONDS as f64, ACQUISITION_SECONDS as f64 - 2.0)),
                provenance: Provenance::StructuredReport {
                    header: report_header(ACQUISITION_SECONDS, ACQUISITION_SECONDS - 2),
                    footer: report_footer(),
                    layout: ReportLayout::default(),
                },
            };
            writer::save_report(&spectrum, out).context("writing sample shot")?;
            total += 1;
        }

        // Long continuum-only background reference.
        let bg_seconds = if *kind == DetectorKind::Big { 62372 } else { 62366 };
        let background = Spectrum {
            name: format!("{kind}-Background"),
            detector: None,
            channels: Spectrum::default_channels(CHANNELS),
            counts: generate_counts(&[], &mut rng),
            energies: None,
            times: Some((bg_seconds as f64, bg_seconds as f64)),
            provenance: Provenance::StructuredReport {
                header: report_header(bg_seconds, bg_seconds),
                footer: report_footer(),
                layout: ReportLayout::default(),
            },
        };
        writer::save_report(&background, out).context("writing background reference")?;
        total += 1;
    }

    std::fs::write(out.join("detectors.json"), DETECTOR_CONFIG)
        .context("writing detector configuration")?;

    // One self-describing document, re-parsed through the registry so it
    // carries a derived energy axis.
    let registry_config: config::RegistryConfig = serde_json::from_str(DETECTOR_CONFIG)?;
    let registry = DetectorRegistry::from_config(&registry_config);
    let sample = spectre_gamma::loader::load_file(&out.join("SmallDet Shot_21 000.Spe"), &registry)?;
    writer::save_document(&sample, out)?;
    total += 1;

    println!("Wrote {total} sample files to {}", out.display());
    Ok(())
}
