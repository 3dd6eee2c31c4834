use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detector::{detector_from_name, DetectorKind, DetectorRegistry, DetectorResolver};
use crate::error::{Error, Result};
use crate::spectrum::{Provenance, ReportLayout, Spectrum, TIME_LINE};

/// Start-of-data sentinel of the structured report format. Numeric counts
/// begin two lines later (a channel-range line follows the sentinel).
const DATA_SENTINEL: &str = "$DATA:";
/// Start-of-footer sentinel, located by scanning from the end of the file.
const FOOTER_SENTINEL: &str = "$ROI:";

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load one spectrum from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.spe`          – structured fixed-layout report (header/data/footer)
/// * `.txt`          – two whitespace-separated columns: axis value, count
/// * `.csv`          – two comma-separated columns: axis value, count
/// * `.json`         – self-describing document with explicit metadata
///
/// The detector association is resolved from the filename (or, for JSON,
/// from the document itself) but a non-matching filename is not an error
/// here: the spectrum is returned unresolved and detector-dependent
/// transforms will refuse it.
pub fn load_file(path: &Path, registry: &DetectorRegistry) -> Result<Spectrum> {
    load_file_with(path, registry, detector_from_name)
}

/// [`load_file`] with an injectable filename-to-detector resolver.
pub fn load_file_with(
    path: &Path,
    registry: &DetectorRegistry,
    resolver: DetectorResolver,
) -> Result<Spectrum> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut spectrum = match ext.as_str() {
        "spe" => load_report(path, registry, resolver)?,
        "txt" => load_columnar_txt(path)?,
        "csv" => load_columnar_csv(path)?,
        "json" => load_document(path, registry, resolver)?,
        other => return Err(Error::UnsupportedFormat(other.to_string())),
    };

    // Columnar files carry no detector hint beyond their name.
    if spectrum.detector.is_none() {
        if let Some(kind) = resolver(&file_name(path)) {
            spectrum.detector = registry.profile(kind).ok();
        }
    }
    spectrum.attach_energy_scale();
    Ok(spectrum)
}

/// All `.Spe` files in a directory (case-insensitive extension match),
/// sorted by name so acquisition order follows naming order.
pub fn spe_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let is_spe = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("spe"));
        if path.is_file() && is_spe {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("spectrum")
        .to_string()
}

// ---------------------------------------------------------------------------
// Structured report (.Spe)
// ---------------------------------------------------------------------------

fn load_report(
    path: &Path,
    registry: &DetectorRegistry,
    resolver: DetectorResolver,
) -> Result<Spectrum> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let detector = resolver(&file_name(path)).and_then(|kind| registry.profile(kind).ok());
    let mut spectrum = parse_report(file_stem(path), path, &text)?;
    spectrum.detector = detector;
    Ok(spectrum)
}

/// Parse the structured report text. Split out from file handling so the
/// format logic is testable on in-memory fixtures.
pub(crate) fn parse_report(name: String, path: &Path, text: &str) -> Result<Spectrum> {
    let lines: Vec<&str> = text.lines().collect();

    let sentinel = lines
        .iter()
        .position(|l| l.starts_with(DATA_SENTINEL))
        .ok_or_else(|| Error::format(path, format!("missing '{DATA_SENTINEL}' sentinel")))?;
    let data_start = sentinel + 2;

    let footer_start = lines
        .iter()
        .rposition(|l| l.starts_with(FOOTER_SENTINEL))
        .ok_or_else(|| Error::format(path, format!("missing '{FOOTER_SENTINEL}' sentinel")))?;

    if footer_start < data_start {
        return Err(Error::format(
            path,
            "footer sentinel precedes the data block",
        ));
    }

    let times = parse_time_line(path, &lines)?;

    let mut counts = Vec::with_capacity(footer_start - data_start);
    for (offset, line) in lines[data_start..footer_start].iter().enumerate() {
        let value: i64 = line.trim().parse().map_err(|_| {
            Error::format(
                path,
                format!("channel {offset}: '{}' is not an integer count", line.trim()),
            )
        })?;
        counts.push(value as f64);
    }

    let header = lines[..data_start].iter().map(|l| l.to_string()).collect();
    let footer = lines[footer_start..].iter().map(|l| l.to_string()).collect();

    // `lines()` strips the terminators, so the physical layout is captured
    // here for byte-identical re-serialization.
    let layout = ReportLayout {
        crlf: text.contains("\r\n"),
        trailing_newline: text.ends_with('\n'),
    };

    let channels = Spectrum::default_channels(counts.len());
    Ok(Spectrum {
        name,
        detector: None,
        counts,
        channels,
        energies: None,
        times: Some(times),
        provenance: Provenance::StructuredReport {
            header,
            footer,
            layout,
        },
    })
}

/// The fixed acquisition-time line: two whitespace-separated integers,
/// real-time then live-time, in seconds.
fn parse_time_line(path: &Path, lines: &[&str]) -> Result<(f64, f64)> {
    let line = lines
        .get(TIME_LINE)
        .ok_or_else(|| Error::format(path, "file shorter than the acquisition-time line"))?;
    let mut fields = line.split_whitespace();
    let mut next = || -> Result<f64> {
        fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| {
                Error::format(path, format!("malformed acquisition-time line: '{line}'"))
            })
    };
    Ok((next()?, next()?))
}

// ---------------------------------------------------------------------------
// Delimited columnar (.txt / .csv)
// ---------------------------------------------------------------------------

fn load_columnar_txt(path: &Path) -> Result<Spectrum> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    let mut channels = Vec::new();
    let mut counts = Vec::new();
    for (row, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let &[axis, count] = fields.as_slice() else {
            return Err(Error::format(
                path,
                format!("row {row}: expected 2 fields, got {}", fields.len()),
            ));
        };
        channels.push(parse_field(path, row, axis)?);
        counts.push(parse_field(path, row, count)?);
    }

    Ok(columnar_spectrum(file_stem(path), channels, counts))
}

fn load_columnar_csv(path: &Path) -> Result<Spectrum> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| match e.into_kind() {
            csv::ErrorKind::Io(io) => Error::io(path, io),
            other => Error::format(path, format!("opening CSV: {other:?}")),
        })?;

    let mut channels = Vec::new();
    let mut counts = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| Error::format(path, format!("row {row}: {e}")))?;
        if record.len() != 2 {
            return Err(Error::format(
                path,
                format!("row {row}: expected 2 fields, got {}", record.len()),
            ));
        }
        channels.push(parse_field(path, row, &record[0])?);
        counts.push(parse_field(path, row, &record[1])?);
    }

    Ok(columnar_spectrum(file_stem(path), channels, counts))
}

fn parse_field(path: &Path, row: usize, field: &str) -> Result<f64> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::format(path, format!("row {row}: '{field}' is not a number")))
}

fn columnar_spectrum(name: String, channels: Vec<f64>, counts: Vec<f64>) -> Spectrum {
    Spectrum {
        name,
        detector: None,
        counts,
        channels,
        energies: None,
        // No acquisition metadata is recoverable from a columnar file.
        times: None,
        provenance: Provenance::Columnar,
    }
}

// ---------------------------------------------------------------------------
// Self-describing document (.json)
// ---------------------------------------------------------------------------

/// On-disk schema of the self-describing format.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SpectrumDocument {
    pub metadata: DocumentMetadata,
    pub data: DocumentData,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector: Option<DetectorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectrum_recording_times: Option<(f64, f64)>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocumentData {
    pub counts: Vec<f64>,
    pub channels: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energies: Option<Vec<f64>>,
}

fn load_document(
    path: &Path,
    registry: &DetectorRegistry,
    resolver: DetectorResolver,
) -> Result<Spectrum> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let doc: SpectrumDocument =
        serde_json::from_str(&text).map_err(|e| Error::format(path, format!("invalid document: {e}")))?;

    let n = doc.data.counts.len();
    if doc.data.channels.len() != n {
        return Err(Error::format(
            path,
            format!(
                "counts has {n} values but channels has {}",
                doc.data.channels.len()
            ),
        ));
    }
    if let Some(energies) = &doc.data.energies {
        if energies.len() != n {
            return Err(Error::format(
                path,
                format!("counts has {n} values but energies has {}", energies.len()),
            ));
        }
    }

    // The document names its detector; the named value still goes through
    // the registry so an unconfigured tag fails loudly.
    let detector = match doc.metadata.detector {
        Some(kind) => Some(registry.profile(kind)?),
        None => resolver(&file_name(path)).and_then(|kind| registry.profile(kind).ok()),
    };

    Ok(Spectrum {
        name: file_stem(path),
        detector,
        counts: doc.data.counts,
        channels: doc.data.channels,
        energies: doc.data.energies,
        times: doc.metadata.spectrum_recording_times,
        provenance: Provenance::SelfDescribing,
    })
}
