use std::fmt;
use std::sync::Arc;

use crate::detector::DetectorProfile;

// ---------------------------------------------------------------------------
// Provenance – which encoding produced a spectrum
// ---------------------------------------------------------------------------

/// Physical line layout of a structured report, captured at parse time so
/// re-serialization is byte-identical even for files produced on the
/// acquisition software's native platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLayout {
    /// CRLF line terminators.
    pub crlf: bool,
    /// Whether the file ended with a line terminator.
    pub trailing_newline: bool,
}

impl ReportLayout {
    pub fn eol(self) -> &'static str {
        if self.crlf {
            "\r\n"
        } else {
            "\n"
        }
    }
}

impl Default for ReportLayout {
    fn default() -> Self {
        ReportLayout {
            crlf: false,
            trailing_newline: true,
        }
    }
}

/// Source-format tag. Format-specific fields live inside their variant, so
/// a spectrum can never carry half of a structured report's metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Provenance {
    /// Fixed-layout `.Spe` report. Header and footer blocks are preserved
    /// verbatim so an unmodified spectrum re-serializes byte-for-byte.
    StructuredReport {
        header: Vec<String>,
        footer: Vec<String>,
        layout: ReportLayout,
    },
    /// Two-column delimited text, or any derived array without report
    /// metadata.
    Columnar,
    /// Self-describing JSON document.
    SelfDescribing,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::StructuredReport { .. } => write!(f, "structured report"),
            Provenance::Columnar => write!(f, "columnar"),
            Provenance::SelfDescribing => write!(f, "self-describing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Spectrum – the central entity
// ---------------------------------------------------------------------------

/// Index of the acquisition-time line inside a structured report header
/// (zero-based): two whitespace-separated integers, real then live seconds.
pub const TIME_LINE: usize = 9;

/// One gamma-ray spectrum: per-channel counts plus calibration and
/// acquisition metadata. Produced fresh by the loader or by each
/// transform; never mutated after being handed to a writer.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Logical identifier, the source filename without extension.
    pub name: String,
    /// Detector association, shared across spectra of the same detector.
    /// `None` until resolved; detector-dependent transforms refuse to run
    /// without it.
    pub detector: Option<Arc<DetectorProfile>>,
    /// Counts per channel, clamped non-negative by every transform.
    pub counts: Vec<f64>,
    /// Channel axis, same length as `counts`; synthesized as `0..N-1`
    /// when the source format has no explicit axis.
    pub channels: Vec<f64>,
    /// Calibrated energy axis (keV), same length as `counts` when present.
    pub energies: Option<Vec<f64>>,
    /// Acquisition `(real, live)` seconds; `None` for spectra of unknown
    /// provenance such as format-converted raw files.
    pub times: Option<(f64, f64)>,
    /// Which encoding produced this instance.
    pub provenance: Provenance,
}

impl Spectrum {
    /// Number of channels.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the spectrum holds no channels.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Synthesize the `0..N-1` channel axis for `n` channels.
    pub fn default_channels(n: usize) -> Vec<f64> {
        (0..n).map(|c| c as f64).collect()
    }

    /// Derive the energy axis from the detector's calibration table,
    /// truncated to this spectrum's length. No-op when the detector is
    /// unresolved, the axis was already loaded from the source file, or
    /// the spectrum is longer than the table — an axis is only attached
    /// when it can cover every channel.
    pub fn attach_energy_scale(&mut self) {
        if self.energies.is_some() {
            return;
        }
        if let Some(profile) = &self.detector {
            self.energies = profile.energy_scale(self.len());
        }
    }

    /// Same as [`attach_energy_scale`](Self::attach_energy_scale) but
    /// replaces an already-present axis. Used when a transform changed the
    /// detector association and a stale loaded axis must not survive.
    pub fn rederive_energy_scale(&mut self) {
        if let Some(profile) = &self.detector {
            if let Some(energies) = profile.energy_scale(self.len()) {
                self.energies = Some(energies);
            }
        }
    }

    /// Rewrite the acquisition-time line inside a structured-report header
    /// so the serialized file reflects `self.times`. No-op for other
    /// provenances or when times are absent.
    pub fn sync_header_times(&mut self) {
        let Some((real, live)) = self.times else {
            return;
        };
        if let Provenance::StructuredReport { header, .. } = &mut self.provenance {
            if let Some(line) = header.get_mut(TIME_LINE) {
                *line = format!("{} {}", fmt_seconds(real), fmt_seconds(live));
            }
        }
    }
}

/// Render a seconds value in the structured report's native integer form,
/// falling back to plain decimal for fractional sums.
pub fn fmt_seconds(t: f64) -> String {
    if t.fract() == 0.0 {
        format!("{}", t as i64)
    } else {
        format!("{t}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_spectrum(header: Vec<String>) -> Spectrum {
        Spectrum {
            name: "Shot_21 000".into(),
            detector: None,
            counts: vec![1.0, 2.0, 3.0],
            channels: Spectrum::default_channels(3),
            energies: None,
            times: Some((300.0, 298.0)),
            provenance: Provenance::StructuredReport {
                header,
                footer: vec!["$ROI:".into()],
                layout: ReportLayout::default(),
            },
        }
    }

    #[test]
    fn sync_header_times_rewrites_time_line() {
        let header: Vec<String> = (0..12).map(|i| format!("line {i}")).collect();
        let mut sp = report_spectrum(header);
        sp.sync_header_times();

        let Provenance::StructuredReport { header, .. } = &sp.provenance else {
            panic!("provenance changed");
        };
        assert_eq!(header[TIME_LINE], "300 298");
        assert_eq!(header[8], "line 8");
    }

    #[test]
    fn sync_header_times_without_times_is_noop() {
        let header: Vec<String> = (0..12).map(|i| format!("line {i}")).collect();
        let mut sp = report_spectrum(header.clone());
        sp.times = None;
        sp.sync_header_times();

        let Provenance::StructuredReport { header: after, .. } = &sp.provenance else {
            panic!("provenance changed");
        };
        assert_eq!(*after, header);
    }

    #[test]
    fn fmt_seconds_keeps_integers_integral() {
        assert_eq!(fmt_seconds(6160.0), "6160");
        assert_eq!(fmt_seconds(12.5), "12.5");
    }

    #[test]
    fn energy_axis_is_not_attached_past_the_calibration_table() {
        use crate::detector::{DetectorKind, DetectorProfile, CHANNELS};

        let config = crate::detector::tests::test_config();
        let profile = DetectorProfile::new(DetectorKind::Small, &config[&DetectorKind::Small]);
        let n = CHANNELS + 809;
        let mut sp = Spectrum {
            name: "SmallDet oversized".into(),
            detector: Some(Arc::new(profile)),
            counts: vec![0.0; n],
            channels: Spectrum::default_channels(n),
            energies: None,
            times: None,
            provenance: Provenance::Columnar,
        };

        // A table shorter than the spectrum cannot cover every channel.
        sp.attach_energy_scale();
        assert!(sp.energies.is_none());
        sp.rederive_energy_scale();
        assert!(sp.energies.is_none());

        // Within the table the axis is attached and spans all channels.
        let mut small = sp.clone();
        small.counts.truncate(64);
        small.channels.truncate(64);
        small.attach_energy_scale();
        assert_eq!(small.energies.unwrap().len(), 64);
    }
}
