//! Electrode potentials from the cardiac dipole.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{EcgError, Result};
use crate::synth::waves::Vcg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Electrode {
    RA,
    LA,
    LL,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
}

impl Electrode {
    pub const REQUIRED: [Electrode; 9] = [
        Electrode::RA,
        Electrode::LA,
        Electrode::LL,
        Electrode::V1,
        Electrode::V2,
        Electrode::V3,
        Electrode::V4,
        Electrode::V5,
        Electrode::V6,
    ];
}

impl fmt::Display for Electrode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Lead-field vector of one electrode: potential = gain · (V · direction).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectrodeSpec {
    pub electrode: Electrode,
    pub direction: [f64; 3],
    pub gain: f64,
}

/// Electrode placement expressed as lead-field directions.
///
/// The default puts the limb electrodes on an Einthoven triangle (RA at
/// -150°, LA at -30°, LL at +90° in the frontal plane, gain 1/√3) so that
/// lead I equals the x dipole component and WCT is identically zero. Chest
/// electrodes lie in the horizontal plane at V6 0°, V5 30°, V4 55°, V3 75°,
/// V2 95°, V1 115° measured from the left toward the front, gain 1.4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectrodeGeometry {
    pub electrodes: Vec<ElectrodeSpec>,
}

impl Default for ElectrodeGeometry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ElectrodeGeometry {
    pub fn standard() -> Self {
        let limb_gain = 1.0 / 3.0_f64.sqrt();
        let limb = |electrode, deg: f64| ElectrodeSpec {
            electrode,
            direction: [deg.to_radians().cos(), deg.to_radians().sin(), 0.0],
            gain: limb_gain,
        };
        let chest = |electrode, deg: f64| ElectrodeSpec {
            electrode,
            direction: [deg.to_radians().cos(), 0.0, deg.to_radians().sin()],
            gain: 1.4,
        };
        Self {
            electrodes: vec![
                limb(Electrode::RA, -150.0),
                limb(Electrode::LA, -30.0),
                limb(Electrode::LL, 90.0),
                chest(Electrode::V1, 115.0),
                chest(Electrode::V2, 95.0),
                chest(Electrode::V3, 75.0),
                chest(Electrode::V4, 55.0),
                chest(Electrode::V5, 30.0),
                chest(Electrode::V6, 0.0),
            ],
        }
    }

    pub fn spec(&self, electrode: Electrode) -> Option<&ElectrodeSpec> {
        self.electrodes.iter().find(|e| e.electrode == electrode)
    }

    /// Every required electrode must be present; non-unit directions are
    /// accepted but logged.
    pub fn validate(&self) -> Result<()> {
        for electrode in Electrode::REQUIRED {
            let spec = self
                .spec(electrode)
                .ok_or_else(|| EcgError::MissingElectrode(electrode.to_string()))?;
            let norm = spec.direction.iter().map(|d| d * d).sum::<f64>().sqrt();
            if (norm - 1.0).abs() > 1e-3 {
                warn!("electrode {electrode} direction has norm {norm:.3}");
            }
            if !spec.gain.is_finite() {
                return Err(EcgError::InvalidConfig(format!(
                    "electrode {electrode} gain is not finite"
                )));
            }
        }
        Ok(())
    }

    pub fn project(&self, vcg: &Vcg) -> Result<ElectrodePotentials> {
        self.validate()?;
        let mut potentials = BTreeMap::new();
        for electrode in Electrode::REQUIRED {
            let Some(spec) = self.spec(electrode) else {
                return Err(EcgError::MissingElectrode(electrode.to_string()));
            };
            let [dx, dy, dz] = spec.direction;
            let samples: Vec<f64> = (0..vcg.len())
                .map(|i| spec.gain * (vcg.x[i] * dx + vcg.y[i] * dy + vcg.z[i] * dz))
                .collect();
            potentials.insert(electrode, samples);
        }
        Ok(ElectrodePotentials {
            fs: vcg.fs,
            potentials,
        })
    }
}

/// One potential sequence per electrode.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrodePotentials {
    pub fs: f64,
    pub potentials: BTreeMap<Electrode, Vec<f64>>,
}

impl ElectrodePotentials {
    pub fn get(&self, electrode: Electrode) -> Result<&[f64]> {
        self.potentials
            .get(&electrode)
            .map(Vec::as_slice)
            .ok_or_else(|| EcgError::MissingElectrode(electrode.to_string()))
    }

    pub fn len(&self) -> usize {
        self.potentials.values().next().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    fn dipole(v: [f64; 3]) -> Vcg {
        Vcg {
            fs: 500.0,
            x: vec![v[0]],
            y: vec![v[1]],
            z: vec![v[2]],
        }
    }

    #[test]
    fn limb_triangle_maps_x_onto_lead_i_and_cancels_wct() {
        let phi = ElectrodeGeometry::standard()
            .project(&dipole([300.0, 700.0, -200.0]))
            .unwrap();
        let ra = phi.get(Electrode::RA).unwrap()[0];
        let la = phi.get(Electrode::LA).unwrap()[0];
        let ll = phi.get(Electrode::LL).unwrap()[0];
        assert_close(la - ra, 300.0, 1e-9);
        assert_close(ra + la + ll, 0.0, 1e-9);
        // lead II at +60 degrees
        let expected_ii = 300.0 * 0.5 + 700.0 * 3.0_f64.sqrt() / 2.0;
        assert_close(ll - ra, expected_ii, 1e-9);
    }

    #[test]
    fn chest_leads_see_anterior_forces_in_v1() {
        let phi = ElectrodeGeometry::standard()
            .project(&dipole([0.0, 0.0, 100.0]))
            .unwrap();
        assert!(phi.get(Electrode::V1).unwrap()[0] > 100.0);
        assert_close(phi.get(Electrode::V6).unwrap()[0], 0.0, 1e-9);
    }

    #[test]
    fn missing_electrode_is_a_hard_error() {
        let mut geometry = ElectrodeGeometry::standard();
        geometry.electrodes.retain(|e| e.electrode != Electrode::V4);
        let err = geometry.project(&dipole([1.0, 0.0, 0.0])).unwrap_err();
        assert!(matches!(err, EcgError::MissingElectrode(ref name) if name == "V4"));
    }

    #[test]
    fn geometry_round_trips_through_json() {
        let geometry = ElectrodeGeometry::standard();
        let json = serde_json::to_string(&geometry).unwrap();
        let back: ElectrodeGeometry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, geometry);
    }
}
