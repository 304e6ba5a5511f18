//! Synthesis and measurement configuration, loadable from TOML.

use serde::{Deserialize, Serialize};

use crate::detectors::ecg::DetectorConfig;
use crate::error::{EcgError, Result};
use crate::measure::fiducials::FiducialConfig;
use crate::measure::median::MedianConfig;
use crate::synth::device::DeviceOptions;
use crate::synth::lead_field::ElectrodeGeometry;
use crate::synth::params::EctopyConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub fs: f64,
    pub duration_s: f64,
    pub device: DeviceOptions,
    /// Also emit V3R, V4R and V7.
    pub extended_leads: bool,
    /// Overrides the diagnosis' own ectopy.
    pub ectopy: Option<EctopyConfig>,
    pub geometry: ElectrodeGeometry,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            fs: 1000.0,
            duration_s: 10.0,
            device: DeviceOptions::default(),
            extended_leads: false,
            ectopy: None,
            geometry: ElectrodeGeometry::standard(),
        }
    }
}

impl SynthConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fs.is_finite() && self.fs > 0.0) {
            return Err(EcgError::InvalidSamplingRate(self.fs));
        }
        if !(self.duration_s.is_finite() && self.duration_s > 0.0) {
            return Err(EcgError::InvalidDuration(self.duration_s));
        }
        if let Some(ectopy) = &self.ectopy {
            if !(0.0..=1.0).contains(&ectopy.probability) {
                return Err(EcgError::InvalidConfig(format!(
                    "ectopy probability {} is outside [0, 1]",
                    ectopy.probability
                )));
            }
        }
        if let Some(gain) = self.device.gain {
            if !(gain.is_finite() && gain > 0.0) {
                return Err(EcgError::InvalidConfig(format!("device gain {gain} must be positive")));
            }
        }
        if !(self.device.mains_hz.is_finite() && self.device.mains_hz > 0.0) {
            return Err(EcgError::InvalidConfig(format!(
                "mains frequency {} must be positive",
                self.device.mains_hz
            )));
        }
        self.geometry.validate()
    }
}

/// Allowed |measured − target| per field for round-trip checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    pub hr_bpm: f64,
    pub pr_ms: f64,
    pub qrs_ms: f64,
    pub qt_ms: f64,
    pub qtc_ms: f64,
    pub axis_deg: f64,
    pub einthoven_uv: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            hr_bpm: 5.0,
            pr_ms: 20.0,
            qrs_ms: 20.0,
            qt_ms: 30.0,
            qtc_ms: 35.0,
            axis_deg: 20.0,
            einthoven_uv: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    pub detector: DetectorConfig,
    pub median: MedianConfig,
    pub fiducials: FiducialConfig,
    pub tolerances: Tolerances,
}

impl MeasureConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if !(d.lowcut_hz >= 0.0 && d.highcut_hz > d.lowcut_hz) {
            return Err(EcgError::InvalidConfig(format!(
                "detector band {}–{} Hz is empty",
                d.lowcut_hz, d.highcut_hz
            )));
        }
        if !(d.refractory_s > 0.0 && d.integration_window_s > 0.0) {
            return Err(EcgError::InvalidConfig(
                "detector windows must be positive".to_string(),
            ));
        }
        if self.median.min_beats == 0 {
            return Err(EcgError::InvalidConfig("median.min_beats must be at least 1".to_string()));
        }
        if !(self.fiducials.qrs_threshold > 0.0 && self.fiducials.qrs_threshold < 1.0) {
            return Err(EcgError::InvalidConfig(format!(
                "fiducials.qrs_threshold {} is outside (0, 1)",
                self.fiducials.qrs_threshold
            )));
        }
        Ok(())
    }
}
