//! Serializers: one writer per supported output encoding.
//!
//! Every entry point creates the output directory when missing and
//! overwrites any existing file, so re-running a batch is idempotent.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{Error, Result};
use crate::loader::{DocumentData, DocumentMetadata, SpectrumDocument};
use crate::spectrum::{Provenance, Spectrum};

/// Which axis accompanies the counts in columnar output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawAxis {
    Channels,
    Energies,
}

// ---------------------------------------------------------------------------
// Structured report (.Spe)
// ---------------------------------------------------------------------------

/// Write the spectrum back as a structured report: header verbatim, one
/// right-justified integer count per line, footer verbatim. Only spectra
/// with structured-report provenance can reproduce the format.
pub fn save_report(spectrum: &Spectrum, dir: &Path) -> Result<PathBuf> {
    let text = render_report(spectrum)?;
    write_out(dir, format!("{}.Spe", spectrum.name), text)
}

/// Render the report text with the source file's line layout. Split from
/// file handling so round-trip fidelity is testable in memory.
pub(crate) fn render_report(spectrum: &Spectrum) -> Result<String> {
    let Provenance::StructuredReport {
        header,
        footer,
        layout,
    } = &spectrum.provenance
    else {
        return Err(Error::format(
            &spectrum.name,
            "cannot serialize a structured report without preserved header and footer",
        ));
    };

    let eol = layout.eol();
    let mut text = String::new();
    for line in header {
        text.push_str(line);
        text.push_str(eol);
    }
    for &count in &spectrum.counts {
        let _ = write!(text, "{:8}", count.round() as i64);
        text.push_str(eol);
    }
    for line in footer {
        text.push_str(line);
        text.push_str(eol);
    }
    if !layout.trailing_newline && text.ends_with(eol) {
        text.truncate(text.len() - eol.len());
    }
    Ok(text)
}

// ---------------------------------------------------------------------------
// Delimited columnar (.txt / .csv)
// ---------------------------------------------------------------------------

/// Write `axis count` pairs, whitespace-separated, one channel per line.
pub fn save_raw_txt(spectrum: &Spectrum, dir: &Path, axis: RawAxis) -> Result<PathBuf> {
    let axis_values = axis_values(spectrum, axis)?;
    let mut text = String::new();
    for (a, c) in axis_values.iter().zip(&spectrum.counts) {
        let _ = writeln!(text, "{a} {c}");
    }
    write_out(dir, format!("{}_RAW.txt", spectrum.name), text)
}

/// Write `axis,count` records through the CSV writer.
pub fn save_raw_csv(spectrum: &Spectrum, dir: &Path, axis: RawAxis) -> Result<PathBuf> {
    let axis_values = axis_values(spectrum, axis)?;
    let path = prepare(dir, format!("{}_RAW.csv", spectrum.name))?;

    let mut writer = csv::Writer::from_path(&path).map_err(|e| match e.into_kind() {
        csv::ErrorKind::Io(io) => Error::io(&path, io),
        other => Error::format(&path, format!("csv: {other:?}")),
    })?;
    for (a, c) in axis_values.iter().zip(&spectrum.counts) {
        writer
            .write_record([a.to_string(), c.to_string()])
            .map_err(|e| Error::format(&path, format!("csv: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| Error::io(&path, e))?;

    info!("file saved: {}", path.display());
    Ok(path)
}

fn axis_values(spectrum: &Spectrum, axis: RawAxis) -> Result<&[f64]> {
    match axis {
        RawAxis::Channels => Ok(&spectrum.channels),
        RawAxis::Energies => spectrum
            .energies
            .as_deref()
            .ok_or_else(|| Error::format(&spectrum.name, "spectrum has no energy axis")),
    }
}

// ---------------------------------------------------------------------------
// Self-describing document (.json)
// ---------------------------------------------------------------------------

/// Write the spectrum as a self-describing JSON document bundling the
/// detector identity, acquisition times and the three parallel arrays.
pub fn save_document(spectrum: &Spectrum, dir: &Path) -> Result<PathBuf> {
    let doc = SpectrumDocument {
        metadata: DocumentMetadata {
            detector: spectrum.detector.as_ref().map(|p| p.kind),
            spectrum_recording_times: spectrum.times,
        },
        data: DocumentData {
            counts: spectrum.counts.clone(),
            channels: spectrum.channels.clone(),
            energies: spectrum.energies.clone(),
        },
    };
    let text = serde_json::to_string_pretty(&doc)
        .map_err(|e| Error::format(&spectrum.name, format!("document encoding: {e}")))?;
    write_out(dir, format!("{}.json", spectrum.name), text)
}

// ---------------------------------------------------------------------------
// Shared file handling
// ---------------------------------------------------------------------------

fn prepare(dir: &Path, filename: String) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    Ok(dir.join(filename))
}

fn write_out(dir: &Path, filename: String, text: String) -> Result<PathBuf> {
    let path = prepare(dir, filename)?;
    std::fs::write(&path, text).map_err(|e| Error::io(&path, e))?;
    info!("file saved: {}", path.display());
    Ok(path)
}
