//! Core pipeline for gamma-ray spectrum processing.
//!
//! Architecture:
//! ```text
//!  .Spe / .txt / .csv / .json
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → Spectrum (detector resolved by name)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ transform │  sum / subtract background / smooth → new Spectrum
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  writer   │  serialize back to any supported encoding
//!   └──────────┘
//! ```
//!
//! Detector calibration and background references come from an external
//! configuration file ([`config`]); profiles are immutable and shared by
//! reference across spectra. All operations are synchronous and fail fast
//! per call — batch-level continuation is the caller's decision.

pub mod config;
pub mod detector;
pub mod error;
pub mod loader;
pub mod spectrum;
pub mod transform;
pub mod writer;

pub use error::{Error, Result};
pub use spectrum::{Provenance, Spectrum};
