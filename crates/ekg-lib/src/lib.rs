//! Synthetic 12-lead ECG generation and ECG measurement.
//!
//! [`synth::synthesize`] renders a record with known ground truth for an
//! age, diagnosis and seed; [`measure::measure`] recovers beats, a median
//! beat, fiducials and clinical intervals from any normalized record.

pub mod config;
pub mod detectors;
pub mod dsp;
pub mod error;
pub mod measure;
pub mod metrics;
pub mod record;
pub mod roundtrip;
pub mod signal;
pub mod synth;

pub use config::{MeasureConfig, SynthConfig, Tolerances};
pub use error::{EcgError, Result};
pub use measure::{measure, normalize, validate, Measurement, ValidationWarning};
pub use record::{EcgRecord, Lead, LeadSet};
pub use roundtrip::{roundtrip, RoundTripReport};
pub use signal::*;
pub use synth::{synthesize, Diagnosis};
