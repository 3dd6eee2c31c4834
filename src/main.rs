//! Batch command-line front end over the processing pipeline.
//!
//! Each file's outcome is independent: a malformed or unreadable input is
//! reported and the rest of the batch continues.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{error, info, warn};

use spectre_gamma::detector::DetectorRegistry;
use spectre_gamma::writer::RawAxis;
use spectre_gamma::{config, loader, transform, writer, Provenance, Spectrum};

const USAGE: &str = "\
Usage: spectre-gamma <command> <path> [options]

Commands:
  sum <dir>         sum all .Spe files in a directory into one spectrum
  subtract <path>   subtract the detector background (file or directory)
  raw <path>        strip header/footer, write two-column text
  smooth <path>     apply gaussian noise smoothing
  json <path>       convert to the self-describing document format

Options:
  --config <file>        detector configuration (default: detectors.json)
  --out <dir>            output directory (default: alongside the input)
  --modifier <name>      name modifier for summed spectra
  --significance <n>     poisson significance gate for subtraction
  --energy               use the energy axis in columnar output
";

struct Options {
    command: String,
    path: PathBuf,
    config: PathBuf,
    out: Option<PathBuf>,
    modifier: Option<String>,
    significance: f64,
    energy: bool,
}

fn parse_args() -> Result<Options> {
    let mut args = std::env::args().skip(1);
    let command = args.next().context(USAGE)?;
    let path = PathBuf::from(args.next().context(USAGE)?);

    let mut options = Options {
        command,
        path,
        config: PathBuf::from("detectors.json"),
        out: None,
        modifier: None,
        significance: 0.0,
        energy: false,
    };

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--config" => {
                options.config = PathBuf::from(args.next().context("--config needs a value")?)
            }
            "--out" => options.out = Some(PathBuf::from(args.next().context("--out needs a value")?)),
            "--modifier" => options.modifier = Some(args.next().context("--modifier needs a value")?),
            "--significance" => {
                options.significance = args
                    .next()
                    .context("--significance needs a value")?
                    .parse()
                    .context("--significance must be numeric")?
            }
            "--energy" => options.energy = true,
            other => bail!("unknown option '{other}'\n{USAGE}"),
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    env_logger::init();

    let options = parse_args()?;
    let registry = config::load_config(&options.config)
        .map(|cfg| DetectorRegistry::from_config(&cfg))
        .with_context(|| format!("loading detector configuration {}", options.config.display()))?;

    match options.command.as_str() {
        "sum" => sum(&options, &registry),
        "subtract" => for_each_spectrum(&options, &registry, |sp, out| {
            let result = transform::subtract_background(sp, options.significance, &registry)?;
            writer::save_raw_csv(&result, out, axis(&options, &result))?;
            Ok(())
        }),
        "raw" => for_each_spectrum(&options, &registry, |sp, out| {
            writer::save_raw_txt(sp, out, axis(&options, sp))?;
            Ok(())
        }),
        "smooth" => for_each_spectrum(&options, &registry, |sp, out| {
            let result = transform::smooth(sp);
            match &result.provenance {
                Provenance::StructuredReport { .. } => writer::save_report(&result, out)?,
                _ => writer::save_raw_txt(&result, out, RawAxis::Channels)?,
            };
            Ok(())
        }),
        "json" => for_each_spectrum(&options, &registry, |sp, out| {
            writer::save_document(sp, out)?;
            Ok(())
        }),
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }
}

fn axis(options: &Options, spectrum: &Spectrum) -> RawAxis {
    if options.energy && spectrum.energies.is_some() {
        RawAxis::Energies
    } else {
        if options.energy {
            warn!("'{}' has no energy axis, writing channels", spectrum.name);
        }
        RawAxis::Channels
    }
}

fn output_dir<'a>(options: &'a Options, input: &'a Path) -> &'a Path {
    options.out.as_deref().unwrap_or_else(|| {
        if input.is_dir() {
            input
        } else {
            input.parent().unwrap_or(Path::new("."))
        }
    })
}

/// Sum every `.Spe` file in the input directory into a single report.
fn sum(options: &Options, registry: &DetectorRegistry) -> Result<()> {
    let spectra = load_batch(&options.path, registry)?;
    if spectra.is_empty() {
        bail!("no readable .Spe files in {}", options.path.display());
    }
    info!("summing {} spectra", spectra.len());

    // Default modifier: the shot name, i.e. the first whitespace-separated
    // token of the first filename.
    let modifier = options.modifier.clone().unwrap_or_else(|| {
        spectra[0]
            .name
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string()
    });

    let result = transform::sum_spectra(&spectra, &modifier)?;
    let path = writer::save_report(&result, output_dir(options, &options.path))?;
    info!("summed spectrum written to {}", path.display());
    Ok(())
}

/// Run `process` over every spectrum under the input path, continuing past
/// per-file failures.
fn for_each_spectrum(
    options: &Options,
    registry: &DetectorRegistry,
    process: impl Fn(&Spectrum, &Path) -> Result<()>,
) -> Result<()> {
    let spectra = load_batch(&options.path, registry)?;
    if spectra.is_empty() {
        bail!("no readable input files in {}", options.path.display());
    }

    let out = output_dir(options, &options.path);
    let mut failures = 0usize;
    for spectrum in &spectra {
        if let Err(e) = process(spectrum, out) {
            error!("processing '{}' failed: {e:#}", spectrum.name);
            failures += 1;
        }
    }
    if failures > 0 {
        warn!("{failures} of {} files failed", spectra.len());
    }
    Ok(())
}

/// Load one file, or every `.Spe` file in a directory. Unreadable batch
/// members are reported and skipped; a single-file input propagates its
/// error.
fn load_batch(path: &Path, registry: &DetectorRegistry) -> Result<Vec<Spectrum>> {
    if path.is_file() {
        let spectrum = loader::load_file(path, registry)
            .with_context(|| format!("loading {}", path.display()))?;
        return Ok(vec![spectrum]);
    }

    let mut spectra = Vec::new();
    for file in loader::spe_files(path)? {
        match loader::load_file(&file, registry) {
            Ok(spectrum) => spectra.push(spectrum),
            Err(e) => error!("skipping {}: {e}", file.display()),
        }
    }
    Ok(spectra)
}
